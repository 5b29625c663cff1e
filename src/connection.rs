//! Client-side handles to worker processes

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use crate::error::ConnectionError;
use crate::logging::*;
use crate::protocol::connection::{Connection, ConnectionServer, Task};
use crate::protocol::messages::HostInfo;
use crate::protocol::negotiation::app_handshake;
use crate::worker::registry::ProtocolInfo;
use crate::worker::KillSwitch;

/// Lifecycle of a worker as seen by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
	/// Pooled, no job bound
	Idle,
	/// Spawned, handshake in progress
	Connecting,
	/// Bound to a job
	Dispatching,
	/// Being torn down; never reassigned
	Dying,
}

enum Backing {
	Process(tokio::process::Child),
	Thread(KillSwitch),
}

/// One live worker and its command channel
pub struct Worker {
	id: u64,
	pid: Option<u32>,
	protocol: String,
	conn: Connection,
	backing: Backing,
	state: WorkerState,
	host: Option<HostInfo>,
	idle_since: Instant,
}

impl std::fmt::Debug for Worker {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Worker")
			.field("id", &self.id)
			.field("pid", &self.pid)
			.field("protocol", &self.protocol)
			.field("state", &self.state)
			.finish()
	}
}

impl Worker {
	pub fn id(&self) -> u64 {
		self.id
	}

	/// OS process id; `None` for in-process workers
	pub fn pid(&self) -> Option<u32> {
		self.pid
	}

	pub fn protocol(&self) -> &str {
		&self.protocol
	}

	pub fn state(&self) -> WorkerState {
		self.state
	}

	pub(crate) fn set_state(&mut self, state: WorkerState) {
		if self.state != WorkerState::Dying {
			self.state = state;
		}
		if state == WorkerState::Idle {
			self.idle_since = Instant::now();
		}
	}

	pub fn idle_for(&self) -> Duration {
		self.idle_since.elapsed()
	}

	/// Host the worker was last pointed at with CMD_HOST
	pub fn host(&self) -> Option<&HostInfo> {
		self.host.as_ref()
	}

	pub(crate) fn set_host(&mut self, host: HostInfo) {
		self.host = Some(host);
	}

	pub fn connection(&mut self) -> &mut Connection {
		&mut self.conn
	}

	pub async fn send(&mut self, cmd: u8, data: &[u8]) -> Result<(), ConnectionError> {
		self.conn.send_command(cmd, data).await
	}

	pub async fn recv(&mut self) -> Result<Option<Task>, ConnectionError> {
		self.conn.recv().await
	}

	/// Connected and, for processes, not exited
	pub fn is_alive(&mut self) -> bool {
		if self.state == WorkerState::Dying || !self.conn.is_connected() {
			return false;
		}
		match &mut self.backing {
			Backing::Process(child) => matches!(child.try_wait(), Ok(None)),
			Backing::Thread(kill) => !kill.is_killed(),
		}
	}

	/// Ask the worker to stop and drop the channel. Processes get SIGTERM now
	/// and SIGKILL when the handle is dropped.
	pub fn terminate(&mut self) {
		if self.state == WorkerState::Dying {
			return;
		}
		debug!("Terminating worker {} ({})", self.id, self.protocol);
		self.state = WorkerState::Dying;
		match &mut self.backing {
			Backing::Process(child) => {
				if let Some(pid) = child.id() {
					// SAFETY: plain kill(2) on our own child
					unsafe {
						libc::kill(pid as libc::pid_t, libc::SIGTERM);
					}
				}
			}
			Backing::Thread(kill) => kill.kill(),
		}
		self.conn.close();
	}
}

impl Drop for Worker {
	fn drop(&mut self) {
		self.terminate();
	}
}

/// How new workers are started
#[derive(Clone, Debug)]
pub enum Launcher {
	/// `<binary> worker <protocol> <protocol> "" <socket>` per worker
	Process { binary: PathBuf, socket_dir: PathBuf },
	/// A thread with its own runtime per worker; reaches protocols that only
	/// exist in this process
	InProcess,
}

impl Launcher {
	pub async fn launch(
		&self,
		id: u64,
		info: &ProtocolInfo,
		timeout: Duration,
	) -> Result<Worker, ConnectionError> {
		match self {
			Launcher::Process { binary, socket_dir } => {
				launch_process(id, info, binary, socket_dir, timeout).await
			}
			Launcher::InProcess => launch_thread(id, info, timeout).await,
		}
	}
}

async fn launch_process(
	id: u64,
	info: &ProtocolInfo,
	binary: &PathBuf,
	socket_dir: &PathBuf,
	timeout: Duration,
) -> Result<Worker, ConnectionError> {
	let server = ConnectionServer::listen_for_remote(socket_dir, "iorelay")?;

	let mut child = tokio::process::Command::new(binary)
		.arg("worker")
		.arg(&info.name)
		.arg(&info.name)
		.arg("")
		.arg(server.address())
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.kill_on_drop(true)
		.spawn()
		.map_err(|source| ConnectionError::SpawnFailed {
			cmd: format!("{} worker {}", binary.display(), info.name),
			source,
		})?;
	let pid = child.id();

	let conn = tokio::select! {
		conn = server.wait_for_connection(timeout) => conn?,
		status = child.wait() => {
			return Err(ConnectionError::HandshakeFailed {
				message: format!("worker for {} exited before connecting ({:?})", info.name, status.ok()),
			});
		}
	};
	let mut worker = Worker {
		id,
		pid,
		protocol: info.name.clone(),
		conn,
		backing: Backing::Process(child),
		state: WorkerState::Connecting,
		host: None,
		idle_since: Instant::now(),
	};

	let hello = app_handshake(&mut worker.conn, timeout).await?;
	if hello.protocol != info.name {
		return Err(ConnectionError::HandshakeFailed {
			message: format!("expected a {} worker, got {}", info.name, hello.protocol),
		});
	}
	info!("Spawned worker {} for {} (pid {})", id, info.name, hello.pid);
	Ok(worker)
}

async fn launch_thread(id: u64, info: &ProtocolInfo, timeout: Duration) -> Result<Worker, ConnectionError> {
	let (ours, theirs) = std::os::unix::net::UnixStream::pair()?;
	let kill = KillSwitch::new();
	let protocol = info.create();
	let name = info.name.clone();
	let worker_kill = kill.clone();

	std::thread::Builder::new()
		.name(format!("iorelay-worker-{}", id))
		.spawn(move || {
			let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
				Ok(rt) => rt,
				Err(e) => {
					warn!("Cannot start runtime for worker {}: {}", id, e);
					return;
				}
			};
			rt.block_on(async move {
				let conn = match Connection::from_std(theirs) {
					Ok(conn) => conn,
					Err(e) => {
						warn!("Worker {} cannot adopt its socket: {}", id, e);
						return;
					}
				};
				if let Err(e) = crate::serve::run_worker(conn, &name, protocol, worker_kill, None).await {
					debug!("In-process worker {} ended: {}", id, e);
				}
			});
		})
		.map_err(|source| ConnectionError::SpawnFailed { cmd: format!("thread for {}", info.name), source })?;

	let mut worker = Worker {
		id,
		pid: None,
		protocol: info.name.clone(),
		conn: Connection::from_std(ours)?,
		backing: Backing::Thread(kill),
		state: WorkerState::Connecting,
		host: None,
		idle_since: Instant::now(),
	};
	app_handshake(&mut worker.conn, timeout).await?;
	debug!("Started in-process worker {} for {}", id, info.name);
	Ok(worker)
}


// vim: ts=4
