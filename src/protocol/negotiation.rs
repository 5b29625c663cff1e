//! Worker handshake
//!
//! Right after a worker connects it announces itself and the protocol versions
//! it speaks; the application picks one and the worker confirms:
//!
//! ```text
//! worker -> MSG_HELLO  "IORELAY:1;pid=4242;protocol=file"
//! app    -> CMD_USE    "USE:1"
//! worker -> MSG_READY  "READY"
//! ```

use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

use super::commands::{cmd, msg};
use super::connection::Connection;
use super::error::ProtocolError;
use super::messages::decode_text;
use crate::error::ConnectionError;

/// Protocol versions supported by this implementation
pub const SUPPORTED_VERSIONS: &[u32] = &[1];

const HELLO_PREFIX: &str = "IORELAY:";

/// Check if a protocol version is supported by this implementation
pub fn is_version_supported(version: u32) -> bool {
	SUPPORTED_VERSIONS.contains(&version)
}

/// Highest version offered by the peer that we support as well
pub fn select_version(offered: &[u32]) -> Result<u32, ProtocolError> {
	let ours: BTreeSet<u32> = SUPPORTED_VERSIONS.iter().cloned().collect();
	offered
		.iter()
		.filter(|v| ours.contains(v))
		.max()
		.cloned()
		.ok_or_else(|| ProtocolError::NoCommonVersion { offered: offered.to_vec() })
}

/// Worker announcement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHello {
	pub versions: Vec<u32>,
	pub pid: u32,
	pub protocol: String,
}

impl WorkerHello {
	pub fn new(protocol: &str) -> Self {
		WorkerHello {
			versions: SUPPORTED_VERSIONS.to_vec(),
			pid: std::process::id(),
			protocol: protocol.to_string(),
		}
	}

	/// Parse from wire format: "IORELAY:1,2;pid=42;protocol=ftp"
	pub fn parse(s: &str) -> Result<Self, ProtocolError> {
		let rest = s.strip_prefix(HELLO_PREFIX).ok_or_else(|| {
			ProtocolError::InvalidVersionFormat(format!("Expected {} prefix, got: {}", HELLO_PREFIX, s))
		})?;

		let mut parts = rest.split(';');
		let versions: Result<Vec<u32>, _> =
			parts.next().unwrap_or("").split(',').map(|v| v.trim().parse::<u32>()).collect();
		let versions = match versions {
			Ok(v) if !v.is_empty() => v,
			Ok(_) => {
				return Err(ProtocolError::InvalidVersionFormat("Version list is empty".to_string()))
			}
			Err(e) => {
				return Err(ProtocolError::InvalidVersionFormat(format!(
					"Failed to parse versions: {}",
					e
				)))
			}
		};

		let mut pid = None;
		let mut protocol = None;
		for part in parts {
			match part.split_once('=') {
				Some(("pid", v)) => {
					pid = Some(v.trim().parse::<u32>().map_err(|e| {
						ProtocolError::InvalidVersionFormat(format!("Bad pid '{}': {}", v, e))
					})?)
				}
				Some(("protocol", v)) => protocol = Some(v.trim().to_string()),
				_ => debug!("Ignoring unknown hello field '{}'", part),
			}
		}

		Ok(WorkerHello {
			versions,
			pid: pid.ok_or_else(|| ProtocolError::InvalidVersionFormat("Missing pid".to_string()))?,
			protocol: protocol
				.ok_or_else(|| ProtocolError::InvalidVersionFormat("Missing protocol".to_string()))?,
		})
	}
}

impl std::fmt::Display for WorkerHello {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"{}{};pid={};protocol={}",
			HELLO_PREFIX,
			self.versions.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(","),
			self.pid,
			self.protocol
		)
	}
}

/// Application command to use a specific protocol version
#[derive(Debug, Clone)]
pub struct VersionSelection {
	pub version: u32,
}

impl VersionSelection {
	pub fn new(version: u32) -> Self {
		Self { version }
	}

	/// Parse from wire format: "USE:1"
	pub fn parse(s: &str) -> Result<Self, ProtocolError> {
		let version_str = s.strip_prefix("USE:").ok_or_else(|| {
			ProtocolError::InvalidVersionFormat(format!("Expected USE: prefix, got: {}", s))
		})?;
		match version_str.trim().parse::<u32>() {
			Ok(v) => Ok(Self { version: v }),
			Err(e) => Err(ProtocolError::InvalidVersionFormat(format!(
				"Failed to parse version number: {}",
				e
			))),
		}
	}
}

impl std::fmt::Display for VersionSelection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "USE:{}", self.version)
	}
}

const READY: &str = "READY";

async fn expect_text(
	conn: &mut Connection,
	code: u8,
	expected: &'static str,
) -> Result<String, ConnectionError> {
	let task = conn.recv().await?.ok_or(ConnectionError::Disconnected)?;
	if task.cmd != code {
		return Err(ProtocolError::UnexpectedCommand { expected, got: task.cmd }.into());
	}
	Ok(decode_text(&task.data)?)
}

/// Worker side of the handshake. Returns the version chosen by the application.
pub async fn worker_handshake(conn: &mut Connection, protocol: &str) -> Result<u32, ConnectionError> {
	let hello = WorkerHello::new(protocol);
	conn.send_command(msg::HELLO, hello.to_string().as_bytes()).await?;

	let text = expect_text(conn, cmd::USE, "CMD_USE").await?;
	let selection = VersionSelection::parse(&text)?;
	if !is_version_supported(selection.version) {
		return Err(ConnectionError::HandshakeFailed {
			message: format!("application selected unsupported version {}", selection.version),
		});
	}

	conn.send_command(msg::READY, READY.as_bytes()).await?;
	debug!("Handshake done, protocol version {}", selection.version);
	Ok(selection.version)
}

/// Application side of the handshake, bounded by `timeout`
pub async fn app_handshake(
	conn: &mut Connection,
	timeout: Duration,
) -> Result<WorkerHello, ConnectionError> {
	let exchange = async {
		let text = expect_text(conn, msg::HELLO, "MSG_HELLO").await?;
		let hello = WorkerHello::parse(&text)?;
		let version = select_version(&hello.versions)?;

		conn.send_command(cmd::USE, VersionSelection::new(version).to_string().as_bytes()).await?;

		let ack = expect_text(conn, msg::READY, "MSG_READY").await?;
		if ack.trim() != READY {
			return Err(ConnectionError::HandshakeFailed {
				message: format!("worker answered '{}'", ack),
			});
		}
		debug!("Worker pid {} ({}) ready", hello.pid, hello.protocol);
		Ok(hello)
	};

	tokio::time::timeout(timeout, exchange).await.map_err(|_| ConnectionError::Timeout)?
}

#[cfg(test)]
mod tests {
	use super::*;

	// ─── WorkerHello Tests ───

	#[test]
	fn test_worker_hello_serialize() {
		let hello = WorkerHello { versions: vec![1, 2], pid: 42, protocol: "ftp".into() };
		assert_eq!(hello.to_string(), "IORELAY:1,2;pid=42;protocol=ftp");
	}

	#[test]
	fn test_worker_hello_roundtrip() {
		let hello = WorkerHello::new("file");
		let parsed = WorkerHello::parse(&hello.to_string()).unwrap();
		assert_eq!(parsed, hello);
	}

	#[test]
	fn test_worker_hello_ignores_unknown_fields() {
		let hello = WorkerHello::parse("IORELAY:1;pid=7;flavor=x;protocol=http").unwrap();
		assert_eq!(hello.pid, 7);
		assert_eq!(hello.protocol, "http");
	}

	#[test]
	fn test_invalid_worker_hello() {
		assert!(WorkerHello::parse("SyNcR:1;pid=1;protocol=x").is_err());
		assert!(WorkerHello::parse("IORELAY:;pid=1;protocol=x").is_err());
		assert!(WorkerHello::parse("IORELAY:1;protocol=x").is_err());
		assert!(WorkerHello::parse("IORELAY:1;pid=abc;protocol=x").is_err());
	}

	// ─── VersionSelection Tests ───

	#[test]
	fn test_version_selection_roundtrip() {
		let sel = VersionSelection::new(5);
		assert_eq!(sel.to_string(), "USE:5");
		assert_eq!(VersionSelection::parse("USE:5").unwrap().version, 5);
	}

	#[test]
	fn test_invalid_version_selection() {
		assert!(VersionSelection::parse("WRONG:2").is_err());
		assert!(VersionSelection::parse("USE:abc").is_err());
	}

	// ─── Version Selection Logic ───

	#[test]
	fn test_select_version() {
		assert_eq!(select_version(&[1]).unwrap(), 1);
		assert_eq!(select_version(&[1, 7]).unwrap(), 1);
		assert!(select_version(&[7, 8]).is_err());
		assert!(select_version(&[]).is_err());
	}

	// ─── Full Exchange ───

	#[tokio::test]
	async fn test_handshake_over_pair() {
		let (mut app, mut worker) = Connection::pair().unwrap();
		let worker_side = tokio::spawn(async move {
			let v = worker_handshake(&mut worker, "ftp").await.unwrap();
			(v, worker)
		});

		let hello = app_handshake(&mut app, Duration::from_secs(5)).await.unwrap();
		assert_eq!(hello.protocol, "ftp");
		assert_eq!(hello.pid, std::process::id());

		let (version, _worker) = worker_side.await.unwrap();
		assert_eq!(version, 1);
	}

	#[tokio::test]
	async fn test_handshake_times_out_on_silent_worker() {
		let (mut app, _worker) = Connection::pair().unwrap();
		let result = app_handshake(&mut app, Duration::from_millis(50)).await;
		assert!(matches!(result, Err(ConnectionError::Timeout)));
	}
}

// vim: ts=4
