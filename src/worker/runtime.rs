//! Worker dispatch loop
//!
//! Reads one command at a time and runs it to completion before reading the
//! next, so a worker never interleaves two jobs.

use std::path::PathBuf;

use super::{KillSwitch, WorkerContext, WorkerProtocol, WorkerResult};
use crate::error::{ConnectionError, ErrorCode, JobError};
use crate::logging::*;
use crate::metadata::MetaData;
use crate::protocol::commands::{cmd, command_name, msg};
use crate::protocol::connection::{Connection, Task};
use crate::protocol::messages::{decode_text, encode_error, HostInfo, WorkerCommand};

/// Why [`WorkerRuntime::run`] returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunExit {
	/// The application closed the connection
	Disconnected,
	/// CMD_SLAVE_CONNECT: continue on another application socket
	Reconnect(PathBuf),
	/// The kill switch was thrown
	Killed,
}

pub struct WorkerRuntime {
	protocol: Box<dyn WorkerProtocol>,
	ctx: WorkerContext,
}

impl WorkerRuntime {
	pub fn new(protocol_name: &str, protocol: Box<dyn WorkerProtocol>, conn: Connection, kill: KillSwitch) -> Self {
		WorkerRuntime { protocol, ctx: WorkerContext::new(conn, protocol_name, kill) }
	}

	/// Swap in a new application connection, keeping host and configuration
	pub fn set_connection(&mut self, conn: Connection) {
		self.ctx.conn = conn;
	}

	pub fn context(&self) -> &WorkerContext {
		&self.ctx
	}

	/// Serve commands until the connection drops, a reconnect is requested or
	/// the worker is killed
	pub async fn run(&mut self) -> Result<RunExit, ConnectionError> {
		loop {
			if self.ctx.was_killed() {
				return Ok(RunExit::Killed);
			}
			let next = tokio::select! {
				biased;
				_ = self.ctx.kill.killed() => return Ok(RunExit::Killed),
				next = self.ctx.conn.recv() => next?,
			};
			let task = match next {
				Some(task) => task,
				None => {
					debug!("Application closed the connection");
					return Ok(RunExit::Disconnected);
				}
			};

			if let Some(exit) = self.dispatch(task).await? {
				return Ok(exit);
			}
		}
	}

	async fn dispatch(&mut self, task: Task) -> Result<Option<RunExit>, ConnectionError> {
		trace!("dispatch {}", command_name(task.cmd));
		match task.cmd {
			cmd::HOST => {
				let host: HostInfo = serde_json::from_slice(&task.data)
					.map_err(crate::protocol::error::ProtocolError::from)?;
				debug!("Host set to '{}'", host.host);
				self.protocol.set_host(&mut self.ctx, &host).await;
				self.ctx.host = host;
			}
			cmd::CONNECT => match self.protocol.open_connection(&mut self.ctx).await {
				Ok(()) => {
					self.ctx.connected = true;
					self.ctx.send(msg::CONNECTED, &[]).await?;
				}
				Err(err) => self.ctx.send(msg::ERROR, &encode_error(&err)?).await?,
			},
			cmd::DISCONNECT => {
				self.protocol.close_connection(&mut self.ctx).await;
				self.ctx.connected = false;
			}
			cmd::CONFIG => {
				self.ctx.config = MetaData::decode(&task.data)?;
				self.protocol.reparse_configuration(&mut self.ctx).await;
			}
			cmd::REPARSECONFIGURATION => self.protocol.reparse_configuration(&mut self.ctx).await,
			cmd::META_DATA => self.ctx.incoming.merge(&MetaData::decode(&task.data)?),
			cmd::SLAVE_STATUS => self.ctx.send_status().await?,
			cmd::SLAVE_CONNECT => {
				let address = decode_text(&task.data)?;
				info!("Switching to application socket {}", address);
				return Ok(Some(RunExit::Reconnect(PathBuf::from(address))));
			}
			code if WorkerCommand::is_operation(code) => {
				let result = match WorkerCommand::decode(code, &task.data) {
					Ok(command) => self.operation(command).await,
					Err(e) => Err(JobError::from(e)),
				};
				self.ctx.finish(result).await?;
			}
			// Answers that arrive after the operation that wanted them
			cmd::NONE | cmd::RESUMEANSWER | cmd::MESSAGEBOXANSWER | msg::DATA => {
				debug!("Ignoring stray {}", command_name(task.cmd));
			}
			other => {
				warn!("Unknown command {} ({})", other, command_name(other));
				let err = JobError::new(ErrorCode::ProtocolViolation, format!("unknown command {}", other));
				self.ctx.send(msg::ERROR, &encode_error(&err)?).await?;
			}
		}
		Ok(None)
	}

	async fn operation(&mut self, command: WorkerCommand) -> WorkerResult {
		let ctx = &mut self.ctx;
		let protocol = &mut self.protocol;
		match command {
			WorkerCommand::Get { url } => protocol.get(ctx, &url).await,
			WorkerCommand::Put { url, permissions, overwrite, resume } => {
				protocol.put(ctx, &url, permissions, overwrite, resume).await
			}
			WorkerCommand::Stat { url } => protocol.stat(ctx, &url).await,
			WorkerCommand::Mimetype { url } => protocol.mimetype(ctx, &url).await,
			WorkerCommand::ListDir { url } => protocol.list_dir(ctx, &url).await,
			WorkerCommand::Mkdir { url, permissions } => protocol.mkdir(ctx, &url, permissions).await,
			WorkerCommand::Rename { src, dest, overwrite } => protocol.rename(ctx, &src, &dest, overwrite).await,
			WorkerCommand::Symlink { target, dest, overwrite } => {
				protocol.symlink(ctx, &target, &dest, overwrite).await
			}
			WorkerCommand::Chmod { url, permissions } => protocol.chmod(ctx, &url, permissions).await,
			WorkerCommand::SetModificationTime { url, mtime } => {
				protocol.set_modification_time(ctx, &url, mtime).await
			}
			WorkerCommand::Copy { src, dest, permissions, overwrite } => {
				protocol.copy(ctx, &src, &dest, permissions, overwrite).await
			}
			WorkerCommand::Del { url, is_file } => protocol.del(ctx, &url, is_file).await,
			WorkerCommand::Special { data } => protocol.special(ctx, &data).await,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::messages::{decode_error, WorkerStatus};
	use crate::udsentry::{decode_entries, field, UdsEntry};
	use async_trait::async_trait;
	use url::Url;

	/// Lists three entries, fails on get
	struct Mock;

	#[async_trait]
	impl WorkerProtocol for Mock {
		async fn list_dir(&mut self, ctx: &mut WorkerContext, _url: &Url) -> WorkerResult {
			for name in &["a", "b", "c"] {
				let mut e = UdsEntry::new();
				e.insert_str(field::NAME, *name);
				ctx.list_entry(e).await?;
			}
			Ok(())
		}

		async fn get(&mut self, _ctx: &mut WorkerContext, url: &Url) -> WorkerResult {
			Err(JobError::new(ErrorCode::DoesNotExist, url.path()))
		}
	}

	fn start() -> (Connection, tokio::task::JoinHandle<RunExit>, KillSwitch) {
		let (app, worker) = Connection::pair().unwrap();
		let kill = KillSwitch::new();
		let mut runtime = WorkerRuntime::new("mock", Box::new(Mock), worker, kill.clone());
		let handle = tokio::spawn(async move { runtime.run().await.unwrap() });
		(app, handle, kill)
	}

	async fn send(app: &mut Connection, command: WorkerCommand) {
		app.send_command(command.code(), &command.encode().unwrap()).await.unwrap();
	}

	fn url(s: &str) -> Url {
		Url::parse(s).unwrap()
	}

	#[tokio::test]
	async fn test_list_then_finished() {
		let (mut app, handle, _kill) = start();
		send(&mut app, WorkerCommand::ListDir { url: url("mock://h/dir") }).await;

		let task = app.recv().await.unwrap().unwrap();
		assert_eq!(task.cmd, msg::LIST_ENTRIES);
		assert_eq!(decode_entries(&task.data).unwrap().len(), 3);
		assert_eq!(app.recv().await.unwrap().unwrap().cmd, msg::FINISHED);

		app.close();
		assert_eq!(handle.await.unwrap(), RunExit::Disconnected);
	}

	#[tokio::test]
	async fn test_error_then_next_operation() {
		let (mut app, _handle, _kill) = start();
		send(&mut app, WorkerCommand::Get { url: url("mock://h/missing") }).await;
		let task = app.recv().await.unwrap().unwrap();
		assert_eq!(task.cmd, msg::ERROR);
		assert_eq!(decode_error(&task.data).unwrap().code(), ErrorCode::DoesNotExist);

		// Worker keeps serving after an application-level error
		send(&mut app, WorkerCommand::ListDir { url: url("mock://h/") }).await;
		assert_eq!(app.recv().await.unwrap().unwrap().cmd, msg::LIST_ENTRIES);
	}

	#[tokio::test]
	async fn test_default_operations_unsupported() {
		let (mut app, _handle, _kill) = start();
		send(&mut app, WorkerCommand::Mkdir { url: url("mock://h/d"), permissions: None }).await;
		let task = app.recv().await.unwrap().unwrap();
		let err = decode_error(&task.data).unwrap();
		assert_eq!(err.code(), ErrorCode::UnsupportedAction);
		assert_eq!(err.text(), "Creating folders is not supported with protocol mock.");
	}

	#[tokio::test]
	async fn test_host_and_status() {
		let (mut app, _handle, _kill) = start();
		let host = HostInfo { host: "example.org".into(), ..Default::default() };
		app.send_command(cmd::HOST, &serde_json::to_vec(&host).unwrap()).await.unwrap();
		app.send_command(cmd::SLAVE_STATUS, &[]).await.unwrap();

		let task = app.recv().await.unwrap().unwrap();
		assert_eq!(task.cmd, msg::WORKER_STATUS);
		let status: WorkerStatus = serde_json::from_slice(&task.data).unwrap();
		assert_eq!(status.host, "example.org");
		assert_eq!(status.protocol, "mock");
		assert!(!status.connected);
	}

	#[tokio::test]
	async fn test_connect_unsupported_reports_error() {
		let (mut app, _handle, _kill) = start();
		app.send_command(cmd::CONNECT, &[]).await.unwrap();
		assert_eq!(app.recv().await.unwrap().unwrap().cmd, msg::ERROR);
	}

	#[tokio::test]
	async fn test_mismatched_payload_is_error() {
		let (mut app, _handle, _kill) = start();
		let payload = WorkerCommand::Stat { url: url("mock://h/") }.encode().unwrap();
		app.send_command(cmd::GET, &payload).await.unwrap();
		let task = app.recv().await.unwrap().unwrap();
		assert_eq!(decode_error(&task.data).unwrap().code(), ErrorCode::ProtocolViolation);
	}

	#[tokio::test]
	async fn test_kill_stops_loop() {
		let (_app, handle, kill) = start();
		kill.kill();
		assert_eq!(handle.await.unwrap(), RunExit::Killed);
	}

	#[tokio::test]
	async fn test_slave_connect_requests_reconnect() {
		let (mut app, handle, _kill) = start();
		app.send_command(cmd::SLAVE_CONNECT, b"/tmp/other.socket").await.unwrap();
		assert_eq!(handle.await.unwrap(), RunExit::Reconnect(PathBuf::from("/tmp/other.socket")));
	}
}

// vim: ts=4
