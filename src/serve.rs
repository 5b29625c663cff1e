//! Worker process entry
//!
//! `iorelay worker <protocol-id> <protocol> <pool-socket> <app-socket>`
//! connects to the application socket (or the pool socket when no
//! application socket is given), performs the handshake and serves commands.
//! When the application goes away and a pool socket is known, the worker
//! reconnects there and waits to be handed to the next application.

use std::error::Error;
use std::path::{Path, PathBuf};

use crate::error::ConnectionError;
use crate::logging::*;
use crate::protocol::connection::Connection;
use crate::protocol::negotiation::worker_handshake;
use crate::worker::{KillSwitch, RunExit, WorkerProtocol, WorkerRuntime};
use crate::worker::registry::ProtocolRegistry;

/// Command-line arguments of a worker process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerArgs {
	/// Identifies the implementation; built-in protocols use their own name
	pub protocol_id: String,
	pub protocol: String,
	pub pool_socket: Option<PathBuf>,
	pub app_socket: Option<PathBuf>,
}

impl WorkerArgs {
	pub fn new(protocol_id: &str, protocol: &str, pool_socket: &str, app_socket: &str) -> Self {
		let non_empty = |s: &str| if s.is_empty() { None } else { Some(PathBuf::from(s)) };
		WorkerArgs {
			protocol_id: protocol_id.to_string(),
			protocol: protocol.to_string(),
			pool_socket: non_empty(pool_socket),
			app_socket: non_empty(app_socket),
		}
	}
}

/// Throw the kill switch on SIGTERM/SIGINT. The loop stops after the current command.
pub fn setup_signal_handlers(kill: KillSwitch) {
	tokio::spawn(async move {
		use tokio::signal;

		let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(stream) => stream,
			Err(e) => {
				warn!("Failed to setup SIGTERM handler: {}. Worker will not stop gracefully.", e);
				return;
			}
		};

		let mut sigint = match signal::unix::signal(signal::unix::SignalKind::interrupt()) {
			Ok(stream) => stream,
			Err(e) => {
				warn!("Failed to setup SIGINT handler: {}. Worker will not stop gracefully.", e);
				return;
			}
		};

		tokio::select! {
			_ = sigterm.recv() => debug!("Received SIGTERM, stopping worker"),
			_ = sigint.recv() => debug!("Received SIGINT, stopping worker"),
		}
		kill.kill();
	});
}

async fn connect(address: &Path, protocol: &str) -> Result<Connection, ConnectionError> {
	let mut conn = Connection::connect_to_remote(address).await?;
	worker_handshake(&mut conn, protocol).await?;
	Ok(conn)
}

/// Serve one protocol over an established (not yet handshaken) connection.
/// Used directly by in-process workers.
pub async fn run_worker(
	mut conn: Connection,
	protocol_name: &str,
	protocol: Box<dyn WorkerProtocol>,
	kill: KillSwitch,
	pool_socket: Option<PathBuf>,
) -> Result<(), ConnectionError> {
	worker_handshake(&mut conn, protocol_name).await?;
	let mut runtime = WorkerRuntime::new(protocol_name, protocol, conn, kill);

	loop {
		let next = match runtime.run().await? {
			RunExit::Killed => {
				debug!("Worker for {} killed", protocol_name);
				return Ok(());
			}
			RunExit::Reconnect(address) => address,
			RunExit::Disconnected => match &pool_socket {
				Some(pool) => pool.clone(),
				None => return Ok(()),
			},
		};

		debug!("Worker for {} reconnecting to {}", protocol_name, next.display());
		match connect(&next, protocol_name).await {
			Ok(conn) => runtime.set_connection(conn),
			Err(e) => {
				info!("Cannot reconnect to {}: {}", next.display(), e);
				return Ok(());
			}
		}
	}
}

/// Entry point of `iorelay worker`
pub async fn serve(args: WorkerArgs) -> Result<(), Box<dyn Error>> {
	let registry = ProtocolRegistry::builtin();
	let info = registry
		.get(&args.protocol_id)
		.or_else(|| registry.get(&args.protocol))
		.ok_or_else(|| format!("Unknown protocol '{}'", args.protocol_id))?;

	let address = args
		.app_socket
		.clone()
		.or_else(|| args.pool_socket.clone())
		.ok_or("worker: either a pool or an application socket is required")?;

	let kill = KillSwitch::new();
	setup_signal_handlers(kill.clone());

	debug!("Worker {} (pid {}) connecting to {}", args.protocol, std::process::id(), address.display());
	let conn = Connection::connect_to_remote(&address).await?;
	run_worker(conn, &args.protocol, info.create(), kill, args.pool_socket.clone()).await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::commands::msg;
	use crate::protocol::connection::ConnectionServer;
	use crate::protocol::messages::WorkerCommand;
	use crate::protocol::negotiation::app_handshake;
	use std::time::Duration;
	use tempfile::TempDir;

	#[test]
	fn test_worker_args_empty_sockets() {
		let args = WorkerArgs::new("file", "file", "", "/tmp/app.socket");
		assert_eq!(args.pool_socket, None);
		assert_eq!(args.app_socket, Some(PathBuf::from("/tmp/app.socket")));
	}

	#[tokio::test]
	async fn test_worker_reconnects_on_slave_connect() {
		let dir = TempDir::new().unwrap();
		let first = ConnectionServer::listen_for_remote(dir.path(), "first").unwrap();
		let second = ConnectionServer::listen_for_remote(dir.path(), "second").unwrap();

		let args = WorkerArgs::new("file", "file", "", &first.address().display().to_string());
		let worker = tokio::spawn(async move { serve(args).await.map_err(|e| e.to_string()) });

		let mut app = first.wait_for_connection(Duration::from_secs(5)).await.unwrap();
		app_handshake(&mut app, Duration::from_secs(5)).await.unwrap();
		let target = second.address().display().to_string();
		app.send_command(crate::protocol::commands::cmd::SLAVE_CONNECT, target.as_bytes())
			.await
			.unwrap();

		let mut app2 = second.wait_for_connection(Duration::from_secs(5)).await.unwrap();
		let hello = app_handshake(&mut app2, Duration::from_secs(5)).await.unwrap();
		assert_eq!(hello.protocol, "file");

		let stat = WorkerCommand::Stat { url: url::Url::from_file_path(dir.path()).unwrap() };
		app2.send_command(stat.code(), &stat.encode().unwrap()).await.unwrap();
		assert_eq!(app2.recv().await.unwrap().unwrap().cmd, msg::STAT_ENTRY);
		assert_eq!(app2.recv().await.unwrap().unwrap().cmd, msg::FINISHED);

		app2.close();
		worker.await.unwrap().unwrap();
	}
}

// vim: ts=4
