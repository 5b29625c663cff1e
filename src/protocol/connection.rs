//! Framed command channel over a local socket
//!
//! [`Connection`] exposes discrete `(command, payload)` tasks on top of a Unix
//! stream. Payloads larger than [`STANDARD_BUFFER_SIZE`] are split into
//! continued frames on send and reassembled on receive, so a single
//! `send_command` always arrives as a single task. Tasks are delivered in send
//! order.

use futures::{FutureExt, SinkExt, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use super::codec::{Frame, FrameCodec, STANDARD_BUFFER_SIZE};
use super::commands::command_name;
use super::error::ProtocolError;
use crate::error::ConnectionError;

static SOCKET_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn send_error(e: ProtocolError) -> ConnectionError {
	match e {
		ProtocolError::Io(io) => ConnectionError::from(io),
		other => ConnectionError::Protocol(other),
	}
}

/// One fully reassembled command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
	pub cmd: u8,
	pub data: Vec<u8>,
}

/// Bidirectional command channel. Once closed it cannot be reused.
pub struct Connection {
	framed: Option<Framed<UnixStream, FrameCodec>>,
	/// Command and bytes of a task still waiting for continuation frames
	partial: Option<(u8, Vec<u8>)>,
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection").field("connected", &self.is_connected()).finish()
	}
}

impl Connection {
	pub fn from_stream(stream: UnixStream) -> Self {
		Connection { framed: Some(Framed::new(stream, FrameCodec)), partial: None }
	}

	/// Two connected endpoints on the current runtime
	pub fn pair() -> Result<(Connection, Connection), ConnectionError> {
		let (a, b) = UnixStream::pair()?;
		Ok((Connection::from_stream(a), Connection::from_stream(b)))
	}

	/// Adopt a std socket. Must be called on the runtime that will drive the
	/// connection, so in-process workers convert their end on their own thread.
	pub fn from_std(stream: std::os::unix::net::UnixStream) -> Result<Self, ConnectionError> {
		stream.set_nonblocking(true)?;
		Ok(Connection::from_stream(UnixStream::from_std(stream)?))
	}

	/// Connect to an address advertised by [`ConnectionServer::listen_for_remote`]
	pub async fn connect_to_remote(address: &Path) -> Result<Self, ConnectionError> {
		let stream = UnixStream::connect(address).await.map_err(|source| {
			ConnectionError::ConnectFailed { address: address.to_path_buf(), source }
		})?;
		debug!("Connected to {}", address.display());
		Ok(Connection::from_stream(stream))
	}

	pub fn is_connected(&self) -> bool {
		self.framed.is_some()
	}

	/// Send one logical command, splitting it into continued frames if needed
	pub async fn send_command(&mut self, cmd: u8, data: &[u8]) -> Result<(), ConnectionError> {
		let framed = self.framed.as_mut().ok_or(ConnectionError::Disconnected)?;
		trace!("send {} ({} bytes)", command_name(cmd), data.len());

		if data.len() <= STANDARD_BUFFER_SIZE {
			framed.feed(Frame::new(cmd, data.to_vec())).await.map_err(send_error)?;
		} else {
			let mut chunks = data.chunks(STANDARD_BUFFER_SIZE).peekable();
			while let Some(chunk) = chunks.next() {
				let more = chunks.peek().is_some();
				framed.feed(Frame { cmd, more, payload: chunk.to_vec() }).await.map_err(send_error)?;
			}
		}

		framed.flush().await.map_err(send_error)
	}

	/// Receive the next complete task. `Ok(None)` means the peer closed the
	/// connection. Cancel safe: partial reassembly survives a dropped call.
	pub async fn recv(&mut self) -> Result<Option<Task>, ConnectionError> {
		loop {
			let framed = match self.framed.as_mut() {
				Some(framed) => framed,
				None => return Ok(None),
			};

			let next = framed.next().await;
			let frame = match next {
				Some(Ok(frame)) => frame,
				Some(Err(ProtocolError::Io(e))) => {
					self.close();
					return Err(ConnectionError::from(e));
				}
				Some(Err(e)) => {
					self.close();
					return Err(ConnectionError::Protocol(e));
				}
				None => {
					let truncated = self.partial.take().is_some();
					self.close();
					if truncated {
						return Err(ConnectionError::Protocol(ProtocolError::ProtocolViolation(
							"connection closed inside a continued command".to_string(),
						)));
					}
					return Ok(None);
				}
			};

			match self.partial.take() {
				Some((cmd, mut data)) => {
					if frame.cmd != cmd {
						self.close();
						return Err(ConnectionError::Protocol(ProtocolError::ProtocolViolation(
							format!(
								"continuation of {} carries {}",
								command_name(cmd),
								command_name(frame.cmd)
							),
						)));
					}
					data.extend_from_slice(&frame.payload);
					if frame.more {
						self.partial = Some((cmd, data));
					} else {
						return Ok(Some(Task { cmd, data }));
					}
				}
				None if frame.more => self.partial = Some((frame.cmd, frame.payload)),
				None => {
					trace!("recv {} ({} bytes)", command_name(frame.cmd), frame.payload.len());
					return Ok(Some(Task { cmd: frame.cmd, data: frame.payload }));
				}
			}
		}
	}

	/// Release the transport. Pending data is not flushed. Closing twice is a no-op.
	pub fn close(&mut self) {
		if self.framed.take().is_some() {
			trace!("connection closed");
		}
		self.partial = None;
	}
}

/// Listening endpoint handing out one [`Connection`] per peer
pub struct ConnectionServer {
	listener: UnixListener,
	address: PathBuf,
}

impl ConnectionServer {
	/// Create a uniquely named listening socket in `socket_dir`
	pub fn listen_for_remote(socket_dir: &Path, app_name: &str) -> Result<Self, ConnectionError> {
		let unique = uuid::Uuid::new_v4().simple().to_string();
		let counter = SOCKET_COUNTER.fetch_add(1, Ordering::Relaxed);
		let address =
			socket_dir.join(format!("{}-{}.{}.worker.socket", app_name, &unique[..8], counter));

		let listener = UnixListener::bind(&address)
			.map_err(|source| ConnectionError::ListenFailed { address: address.clone(), source })?;
		debug!("Listening on {}", address.display());

		Ok(ConnectionServer { listener, address })
	}

	pub fn address(&self) -> &Path {
		&self.address
	}

	/// Accept a queued peer without waiting; `None` when nobody is pending
	pub fn next_pending_connection(&self) -> Option<Connection> {
		match self.listener.accept().now_or_never() {
			Some(Ok((stream, _))) => Some(Connection::from_stream(stream)),
			Some(Err(e)) => {
				debug!("accept on {} failed: {}", self.address.display(), e);
				None
			}
			None => None,
		}
	}

	/// Wait for the next peer to connect
	pub async fn wait_for_connection(&self, timeout: Duration) -> Result<Connection, ConnectionError> {
		let (stream, _) = tokio::time::timeout(timeout, self.listener.accept())
			.await
			.map_err(|_| ConnectionError::Timeout)??;
		Ok(Connection::from_stream(stream))
	}
}

impl Drop for ConnectionServer {
	fn drop(&mut self) {
		let _ = std::fs::remove_file(&self.address);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::commands::{cmd, msg};

	#[tokio::test]
	async fn test_small_and_empty_payloads() {
		let (mut a, mut b) = Connection::pair().unwrap();
		a.send_command(cmd::GET, b"abc").await.unwrap();
		a.send_command(msg::DATA, b"").await.unwrap();

		assert_eq!(b.recv().await.unwrap(), Some(Task { cmd: cmd::GET, data: b"abc".to_vec() }));
		assert_eq!(b.recv().await.unwrap(), Some(Task { cmd: msg::DATA, data: vec![] }));
	}

	#[tokio::test]
	async fn test_large_payload_reassembled() {
		let (mut a, mut b) = Connection::pair().unwrap();
		let payload: Vec<u8> = (0..STANDARD_BUFFER_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();

		let sent = payload.clone();
		let writer = tokio::spawn(async move {
			a.send_command(msg::DATA, &sent).await.unwrap();
			a.send_command(msg::FINISHED, b"").await.unwrap();
			a
		});

		let task = b.recv().await.unwrap().unwrap();
		assert_eq!(task.cmd, msg::DATA);
		assert_eq!(task.data, payload);
		assert_eq!(b.recv().await.unwrap().unwrap().cmd, msg::FINISHED);
		writer.await.unwrap();
	}

	#[tokio::test]
	async fn test_close_is_idempotent() {
		let (mut a, mut b) = Connection::pair().unwrap();
		a.close();
		a.close();
		assert!(!a.is_connected());
		assert!(matches!(a.send_command(cmd::GET, b"").await, Err(ConnectionError::Disconnected)));
		assert_eq!(b.recv().await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_listen_and_connect() {
		let dir = tempfile::TempDir::new().unwrap();
		let server = ConnectionServer::listen_for_remote(dir.path(), "test").unwrap();
		assert!(server.next_pending_connection().is_none());

		let address = server.address().to_path_buf();
		let mut client = Connection::connect_to_remote(&address).await.unwrap();
		let mut accepted = server.wait_for_connection(Duration::from_secs(5)).await.unwrap();

		client.send_command(cmd::STAT, b"x").await.unwrap();
		assert_eq!(accepted.recv().await.unwrap().unwrap().data, b"x");

		drop(server);
		assert!(!address.exists());
	}

	#[tokio::test]
	async fn test_connect_to_missing_socket_fails() {
		let dir = tempfile::TempDir::new().unwrap();
		let result = Connection::connect_to_remote(&dir.path().join("nope.socket")).await;
		assert!(matches!(result, Err(ConnectionError::ConnectFailed { .. })));
	}
}

// vim: ts=4
