//! Worker side of the protocol
//!
//! A worker process runs exactly one [`WorkerProtocol`] implementation. The
//! [`runtime`] loop decodes commands into trait calls; the implementation
//! talks back through the [`WorkerContext`] it is handed. The value an
//! operation returns is its only terminal signal: `Ok(())` becomes
//! `MSG_FINISHED`, `Err` becomes `MSG_ERROR`, so an operation can never report
//! both.

pub mod file;
pub mod registry;
pub mod runtime;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use url::Url;

use crate::error::{ConnectionError, ErrorCode, JobError};
use crate::logging::*;
use crate::metadata::MetaData;
use crate::protocol::commands::{cmd, command_name, inf, msg};
use crate::protocol::connection::{Connection, Task};
use crate::protocol::error::ProtocolError;
use crate::protocol::messages::{
	encode_error, encode_u64, AuthInfo, AuthRequest, HostInfo, MessageBoxAnswer, MessageBoxRequest, WorkerStatus,
};
use crate::udsentry::{encode_entries, UdsEntry};

pub use registry::{ProtocolFactory, ProtocolInfo, ProtocolRegistry};
pub use runtime::{RunExit, WorkerRuntime};

pub type WorkerResult = Result<(), JobError>;

/// List entries are sent in batches of this many...
const LIST_BATCH_SIZE: usize = 200;
/// ...or when the oldest pending entry is this old
const LIST_BATCH_DELAY: Duration = Duration::from_millis(300);

/// Everything an operation can report before it terminates
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
	/// Output chunk; empty marks end of stream
	Data(Vec<u8>),
	MimeType(String),
	StatEntry(UdsEntry),
	ListEntry(UdsEntry),
	TotalSize(u64),
	ProcessedSize(u64),
	/// Bytes per second
	Speed(u64),
	Redirection(Url),
	Warning(String),
	InfoMessage(String),
	/// Outgoing metadata, delivered before the next data or the terminal message
	MetaData(String, String),
}

/// Cooperative kill flag shared between a worker loop and whoever may stop it
#[derive(Clone, Default)]
pub struct KillSwitch(Arc<KillState>);

#[derive(Default)]
struct KillState {
	killed: AtomicBool,
	notify: Notify,
}

impl KillSwitch {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn kill(&self) {
		self.0.killed.store(true, Ordering::SeqCst);
		self.0.notify.notify_waiters();
	}

	pub fn is_killed(&self) -> bool {
		self.0.killed.load(Ordering::SeqCst)
	}

	/// Resolves once [`kill`](Self::kill) has been called
	pub async fn killed(&self) {
		loop {
			let notified = self.0.notify.notified();
			if self.is_killed() {
				return;
			}
			notified.await;
		}
	}
}

fn unsupported(text: String) -> WorkerResult {
	Err(JobError::new(ErrorCode::UnsupportedAction, text))
}

/// One backend protocol. Every operation defaults to `UnsupportedAction`.
#[async_trait]
pub trait WorkerProtocol: Send {
	/// New connection parameters; the next operation targets this host
	async fn set_host(&mut self, _ctx: &mut WorkerContext, _host: &HostInfo) {}

	async fn open_connection(&mut self, ctx: &mut WorkerContext) -> WorkerResult {
		unsupported(format!("Opening connections is not supported with the protocol {}.", ctx.protocol()))
	}

	async fn close_connection(&mut self, _ctx: &mut WorkerContext) {}

	/// Protocol configuration was replaced
	async fn reparse_configuration(&mut self, _ctx: &mut WorkerContext) {}

	async fn get(&mut self, ctx: &mut WorkerContext, _url: &Url) -> WorkerResult {
		unsupported(format!("Retrieving data from {} is not supported.", ctx.protocol()))
	}

	async fn put(
		&mut self,
		ctx: &mut WorkerContext,
		_url: &Url,
		_permissions: Option<u32>,
		_overwrite: bool,
		_resume: bool,
	) -> WorkerResult {
		unsupported(format!("Writing to {} is not supported.", ctx.protocol()))
	}

	async fn stat(&mut self, ctx: &mut WorkerContext, _url: &Url) -> WorkerResult {
		unsupported(format!("Accessing files is not supported with the protocol {}.", ctx.protocol()))
	}

	async fn mimetype(&mut self, ctx: &mut WorkerContext, _url: &Url) -> WorkerResult {
		unsupported(format!("Accessing files is not supported with the protocol {}.", ctx.protocol()))
	}

	async fn list_dir(&mut self, ctx: &mut WorkerContext, _url: &Url) -> WorkerResult {
		unsupported(format!("Listing folders is not supported for protocol {}.", ctx.protocol()))
	}

	async fn mkdir(&mut self, ctx: &mut WorkerContext, _url: &Url, _permissions: Option<u32>) -> WorkerResult {
		unsupported(format!("Creating folders is not supported with protocol {}.", ctx.protocol()))
	}

	async fn rename(&mut self, ctx: &mut WorkerContext, _src: &Url, _dest: &Url, _overwrite: bool) -> WorkerResult {
		unsupported(format!("Renaming or moving files within {} is not supported.", ctx.protocol()))
	}

	async fn symlink(&mut self, ctx: &mut WorkerContext, _target: &str, _dest: &Url, _overwrite: bool) -> WorkerResult {
		unsupported(format!("Creating symlinks is not supported with protocol {}.", ctx.protocol()))
	}

	async fn chmod(&mut self, ctx: &mut WorkerContext, _url: &Url, _permissions: u32) -> WorkerResult {
		unsupported(format!(
			"Changing the attributes of files is not supported with protocol {}.",
			ctx.protocol()
		))
	}

	async fn set_modification_time(&mut self, ctx: &mut WorkerContext, _url: &Url, _mtime: i64) -> WorkerResult {
		unsupported(format!(
			"Changing the modification time of files is not supported with protocol {}.",
			ctx.protocol()
		))
	}

	async fn copy(
		&mut self,
		ctx: &mut WorkerContext,
		_src: &Url,
		_dest: &Url,
		_permissions: Option<u32>,
		_overwrite: bool,
	) -> WorkerResult {
		unsupported(format!("Copying files within {} is not supported.", ctx.protocol()))
	}

	async fn del(&mut self, ctx: &mut WorkerContext, _url: &Url, _is_file: bool) -> WorkerResult {
		unsupported(format!("Deleting files from {} is not supported.", ctx.protocol()))
	}

	async fn special(&mut self, ctx: &mut WorkerContext, _data: &[u8]) -> WorkerResult {
		unsupported(format!("There are no special actions available for protocol {}.", ctx.protocol()))
	}
}

/// Channel back to the job, plus per-operation bookkeeping
pub struct WorkerContext {
	conn: Connection,
	protocol: String,
	host: HostInfo,
	connected: bool,
	kill: KillSwitch,

	/// Protocol configuration from CMD_CONFIG
	config: MetaData,
	/// Job metadata for the current operation
	incoming: MetaData,
	/// Metadata waiting to be sent with INF_META_DATA
	outgoing: MetaData,

	pending_entries: Vec<UdsEntry>,
	last_entry_flush: Instant,
	mime_sent: bool,
	data_sent: bool,
	processed: u64,
	resume_announced: bool,
}

impl WorkerContext {
	pub fn new(conn: Connection, protocol: &str, kill: KillSwitch) -> Self {
		WorkerContext {
			conn,
			protocol: protocol.to_string(),
			host: HostInfo::default(),
			connected: false,
			kill,
			config: MetaData::new(),
			incoming: MetaData::new(),
			outgoing: MetaData::new(),
			pending_entries: Vec::new(),
			last_entry_flush: Instant::now(),
			mime_sent: false,
			data_sent: false,
			processed: 0,
			resume_announced: false,
		}
	}

	pub fn protocol(&self) -> &str {
		&self.protocol
	}

	pub fn host(&self) -> &HostInfo {
		&self.host
	}

	pub fn was_killed(&self) -> bool {
		self.kill.is_killed()
	}

	/// Job metadata if it has `key`, the protocol configuration otherwise
	fn lookup(&self, key: &str) -> &MetaData {
		if self.incoming.contains_key(key) {
			&self.incoming
		} else {
			&self.config
		}
	}

	/// Job metadata for `key`, falling back to the protocol configuration
	pub fn meta_data(&self, key: &str) -> Option<&str> {
		self.lookup(key).get(key)
	}

	pub fn has_meta_data(&self, key: &str) -> bool {
		self.meta_data(key).is_some()
	}

	pub fn config_value(&self, key: &str) -> Option<&str> {
		self.config.get(key)
	}

	pub fn config_bool(&self, key: &str, default: bool) -> bool {
		self.lookup(key).get_bool(key).unwrap_or(default)
	}

	pub fn config_u64(&self, key: &str, default: u64) -> u64 {
		self.lookup(key).get_u64(key).unwrap_or(default)
	}

	pub async fn emit(&mut self, event: WorkerEvent) -> Result<(), JobError> {
		match event {
			WorkerEvent::Data(bytes) => {
				self.flush_meta_data().await?;
				if !bytes.is_empty() {
					self.data_sent = true;
				}
				self.send(msg::DATA, &bytes).await?;
			}
			WorkerEvent::MimeType(mime) => {
				if self.mime_sent || self.data_sent {
					debug!("Dropping late mime type '{}'", mime);
					return Ok(());
				}
				self.mime_sent = true;
				self.flush_meta_data().await?;
				self.send(inf::MIME_TYPE, mime.as_bytes()).await?;
			}
			WorkerEvent::StatEntry(entry) => {
				self.send(msg::STAT_ENTRY, &entry.to_bytes()).await?;
			}
			WorkerEvent::ListEntry(entry) => {
				if self.pending_entries.is_empty() {
					self.last_entry_flush = Instant::now();
				}
				self.pending_entries.push(entry);
				if self.pending_entries.len() >= LIST_BATCH_SIZE
					|| self.last_entry_flush.elapsed() >= LIST_BATCH_DELAY
				{
					self.flush_entries().await?;
				}
			}
			WorkerEvent::TotalSize(n) => self.send(inf::TOTAL_SIZE, &encode_u64(n)).await?,
			WorkerEvent::ProcessedSize(n) => {
				if n < self.processed {
					trace!("Dropping processed size regression {} < {}", n, self.processed);
					return Ok(());
				}
				self.processed = n;
				self.send(inf::PROCESSED_SIZE, &encode_u64(n)).await?;
			}
			WorkerEvent::Speed(n) => self.send(inf::SPEED, &encode_u64(n)).await?,
			WorkerEvent::Redirection(url) => self.send(inf::REDIRECTION, url.as_str().as_bytes()).await?,
			WorkerEvent::Warning(text) => self.send(inf::WARNING, text.as_bytes()).await?,
			WorkerEvent::InfoMessage(text) => self.send(inf::INFOMESSAGE, text.as_bytes()).await?,
			WorkerEvent::MetaData(key, value) => self.outgoing.insert(key, value),
		}
		Ok(())
	}

	pub async fn data(&mut self, bytes: Vec<u8>) -> Result<(), JobError> {
		self.emit(WorkerEvent::Data(bytes)).await
	}

	pub async fn mime_type(&mut self, mime: &str) -> Result<(), JobError> {
		self.emit(WorkerEvent::MimeType(mime.to_string())).await
	}

	pub async fn stat_entry(&mut self, entry: UdsEntry) -> Result<(), JobError> {
		self.emit(WorkerEvent::StatEntry(entry)).await
	}

	pub async fn list_entry(&mut self, entry: UdsEntry) -> Result<(), JobError> {
		self.emit(WorkerEvent::ListEntry(entry)).await
	}

	pub async fn total_size(&mut self, n: u64) -> Result<(), JobError> {
		self.emit(WorkerEvent::TotalSize(n)).await
	}

	pub async fn processed_size(&mut self, n: u64) -> Result<(), JobError> {
		self.emit(WorkerEvent::ProcessedSize(n)).await
	}

	pub async fn speed(&mut self, bytes_per_sec: u64) -> Result<(), JobError> {
		self.emit(WorkerEvent::Speed(bytes_per_sec)).await
	}

	pub async fn redirection(&mut self, url: Url) -> Result<(), JobError> {
		self.emit(WorkerEvent::Redirection(url)).await
	}

	pub async fn warning(&mut self, text: &str) -> Result<(), JobError> {
		self.emit(WorkerEvent::Warning(text.to_string())).await
	}

	pub async fn info_message(&mut self, text: &str) -> Result<(), JobError> {
		self.emit(WorkerEvent::InfoMessage(text.to_string())).await
	}

	pub async fn set_meta_data(&mut self, key: &str, value: &str) -> Result<(), JobError> {
		self.emit(WorkerEvent::MetaData(key.to_string(), value.to_string())).await
	}

	/// Ask the job for the next chunk of upload data. Empty means done.
	pub async fn data_req(&mut self) -> Result<Vec<u8>, JobError> {
		if self.kill.is_killed() {
			return Err(JobError::canceled());
		}
		if !self.resume_announced {
			self.resume_announced = true;
			self.send(msg::RESUME, &encode_u64(0)).await?;
		}
		self.flush_meta_data().await?;
		self.send(msg::DATA_REQ, &[]).await?;
		let task = self.wait_for_answer(&[msg::DATA]).await?;
		Ok(task.data)
	}

	/// Offer to continue a partial upload at `offset`. Returns whether the
	/// job accepted; with `offset == 0` nothing is asked.
	pub async fn can_resume(&mut self, offset: u64) -> Result<bool, JobError> {
		self.resume_announced = true;
		self.send(msg::RESUME, &encode_u64(offset)).await?;
		if offset == 0 {
			return Ok(false);
		}
		let task = self.wait_for_answer(&[cmd::RESUMEANSWER, cmd::NONE]).await?;
		debug!("Resume at {} {}", offset, if task.cmd == cmd::RESUMEANSWER { "accepted" } else { "refused" });
		Ok(task.cmd == cmd::RESUMEANSWER)
	}

	/// Get side: the requested start offset is honoured
	pub async fn can_resume_ack(&mut self, offset: u64) -> Result<(), JobError> {
		self.send(msg::CANRESUME, &encode_u64(offset)).await?;
		Ok(())
	}

	pub async fn message_box(&mut self, request: &MessageBoxRequest) -> Result<MessageBoxAnswer, JobError> {
		let payload = serde_json::to_vec(request).map_err(ProtocolError::from)?;
		self.send(inf::MESSAGEBOX, &payload).await?;
		let task = self.wait_for_answer(&[cmd::MESSAGEBOXANSWER]).await?;
		let answer = serde_json::from_slice(&task.data).map_err(ProtocolError::from)?;
		Ok(answer)
	}

	// ─── Credentials ───

	/// Ask the user for credentials. `info` carries the prompt out and the
	/// answer back. Fails with `UserCanceled` when the user declines or the
	/// job set the `no-auth-prompt` metadata.
	pub async fn open_password_dialog(&mut self, info: &mut AuthInfo, error_message: &str) -> WorkerResult {
		if self.config_bool("no-auth-prompt", false) {
			debug!("Password prompt suppressed for {}", self.protocol);
			return Err(JobError::canceled());
		}
		let request = AuthRequest { info: info.clone(), error_message: error_message.to_string() };
		let payload = serde_json::to_vec(&request).map_err(ProtocolError::from)?;
		self.send(inf::AUTH_DIALOG, &payload).await?;
		match self.auth_answer().await? {
			Some(answer) => {
				fill_auth(info, answer);
				Ok(())
			}
			None => Err(JobError::canceled()),
		}
	}

	/// Look up credentials stored earlier in this session. On a hit `info`
	/// gets the username and password.
	pub async fn check_cached_authentication(&mut self, info: &mut AuthInfo) -> Result<bool, JobError> {
		let payload = serde_json::to_vec(&*info).map_err(ProtocolError::from)?;
		self.send(inf::CHECK_AUTH, &payload).await?;
		match self.auth_answer().await? {
			Some(answer) => {
				fill_auth(info, answer);
				Ok(true)
			}
			None => Ok(false),
		}
	}

	/// Store credentials that worked, for later lookups by any worker
	pub async fn cache_authentication(&mut self, info: &AuthInfo) -> WorkerResult {
		let payload = serde_json::to_vec(info).map_err(ProtocolError::from)?;
		self.send(inf::CACHE_AUTH, &payload).await?;
		Ok(())
	}

	async fn auth_answer(&mut self) -> Result<Option<AuthInfo>, JobError> {
		let task = self.wait_for_answer(&[cmd::AUTHANSWER]).await?;
		Ok(serde_json::from_slice(&task.data).map_err(ProtocolError::from)?)
	}

	// ─── Internals used by the runtime ───

	async fn send(&mut self, code: u8, data: &[u8]) -> Result<(), ConnectionError> {
		self.conn.send_command(code, data).await
	}

	/// Block for one of `expected`, servicing metadata, config and status
	/// requests that arrive in between.
	async fn wait_for_answer(&mut self, expected: &[u8]) -> Result<Task, JobError> {
		loop {
			let next = tokio::select! {
				biased;
				_ = self.kill.killed() => return Err(JobError::canceled()),
				next = self.conn.recv() => next?,
			};
			let task = match next {
				Some(task) => task,
				None => return Err(JobError::new(ErrorCode::ConnectionBroken, self.protocol.clone())),
			};

			if expected.contains(&task.cmd) {
				return Ok(task);
			}
			match task.cmd {
				cmd::META_DATA => self.incoming.merge(&MetaData::decode(&task.data)?),
				cmd::CONFIG => self.config = MetaData::decode(&task.data)?,
				cmd::SLAVE_STATUS => self.send_status().await?,
				other => {
					warn!("Got {} while waiting for an answer", command_name(other));
					return Err(JobError::new(
						ErrorCode::ProtocolViolation,
						format!("unexpected {} while waiting for an answer", command_name(other)),
					));
				}
			}
		}
	}

	async fn send_status(&mut self) -> Result<(), ConnectionError> {
		let status = WorkerStatus {
			pid: std::process::id(),
			protocol: self.protocol.clone(),
			host: self.host.host.clone(),
			connected: self.connected,
		};
		let payload = serde_json::to_vec(&status).map_err(ProtocolError::from)?;
		self.send(msg::WORKER_STATUS, &payload).await
	}

	async fn flush_entries(&mut self) -> Result<(), ConnectionError> {
		if self.pending_entries.is_empty() {
			return Ok(());
		}
		let payload = encode_entries(&self.pending_entries);
		trace!("Flushing {} list entries", self.pending_entries.len());
		self.pending_entries.clear();
		self.last_entry_flush = Instant::now();
		self.send(msg::LIST_ENTRIES, &payload).await
	}

	async fn flush_meta_data(&mut self) -> Result<(), ConnectionError> {
		if self.outgoing.is_empty() {
			return Ok(());
		}
		let payload = self.outgoing.encode()?;
		self.outgoing.clear();
		self.send(inf::META_DATA, &payload).await
	}

	/// Terminal message for the current operation
	async fn finish(&mut self, result: WorkerResult) -> Result<(), ConnectionError> {
		let outcome = match result {
			Ok(()) => {
				self.flush_entries().await?;
				self.flush_meta_data().await?;
				self.send(msg::FINISHED, &[]).await
			}
			Err(err) => {
				debug!("Operation failed: {}", err);
				self.flush_meta_data().await?;
				self.send(msg::ERROR, &encode_error(&err)?).await
			}
		};
		self.reset_operation();
		outcome
	}

	fn reset_operation(&mut self) {
		self.incoming.clear();
		self.outgoing.clear();
		self.pending_entries.clear();
		self.mime_sent = false;
		self.data_sent = false;
		self.processed = 0;
		self.resume_announced = false;
	}
}

/// Take the answer, keeping the resource URL when the answer has none
fn fill_auth(info: &mut AuthInfo, answer: AuthInfo) {
	let url = info.url.take();
	*info = answer;
	if info.url.is_none() {
		info.url = url;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::messages::{decode_u64, MessageBoxKind};
	use crate::udsentry::{decode_entries, field};

	fn context() -> (WorkerContext, Connection) {
		let (app, worker) = Connection::pair().unwrap();
		(WorkerContext::new(worker, "test", KillSwitch::new()), app)
	}

	fn entry(name: &str) -> UdsEntry {
		let mut e = UdsEntry::new();
		e.insert_str(field::NAME, name);
		e
	}

	#[tokio::test]
	async fn test_mime_type_only_once_and_before_data() {
		let (mut ctx, mut app) = context();
		ctx.mime_type("text/plain").await.unwrap();
		ctx.mime_type("text/html").await.unwrap();
		ctx.data(b"x".to_vec()).await.unwrap();
		ctx.finish(Ok(())).await.unwrap();

		let first = app.recv().await.unwrap().unwrap();
		assert_eq!(first.cmd, inf::MIME_TYPE);
		assert_eq!(first.data, b"text/plain");
		assert_eq!(app.recv().await.unwrap().unwrap().cmd, msg::DATA);
		assert_eq!(app.recv().await.unwrap().unwrap().cmd, msg::FINISHED);
	}

	#[tokio::test]
	async fn test_processed_size_never_decreases() {
		let (mut ctx, mut app) = context();
		ctx.processed_size(10).await.unwrap();
		ctx.processed_size(5).await.unwrap();
		ctx.processed_size(12).await.unwrap();
		ctx.finish(Ok(())).await.unwrap();

		let mut sizes = vec![];
		loop {
			let task = app.recv().await.unwrap().unwrap();
			if task.cmd == msg::FINISHED {
				break;
			}
			sizes.push(decode_u64(&task.data).unwrap());
		}
		assert_eq!(sizes, vec![10, 12]);
	}

	#[tokio::test]
	async fn test_list_entries_batched_and_flushed_before_finish() {
		let (mut ctx, mut app) = context();
		for i in 0..250 {
			ctx.list_entry(entry(&format!("f{}", i))).await.unwrap();
		}
		ctx.finish(Ok(())).await.unwrap();

		let mut total = 0;
		let mut batches = 0;
		loop {
			let task = app.recv().await.unwrap().unwrap();
			if task.cmd == msg::FINISHED {
				break;
			}
			assert_eq!(task.cmd, msg::LIST_ENTRIES);
			total += decode_entries(&task.data).unwrap().len();
			batches += 1;
		}
		assert_eq!(total, 250);
		assert!(batches >= 2);
	}

	#[tokio::test]
	async fn test_error_drops_pending_entries() {
		let (mut ctx, mut app) = context();
		ctx.list_entry(entry("a")).await.unwrap();
		ctx.finish(Err(JobError::new(ErrorCode::CannotRead, "x"))).await.unwrap();
		assert_eq!(app.recv().await.unwrap().unwrap().cmd, msg::ERROR);
	}

	#[tokio::test]
	async fn test_outgoing_meta_data_precedes_finish() {
		let (mut ctx, mut app) = context();
		ctx.set_meta_data("content-type", "text/plain").await.unwrap();
		ctx.finish(Ok(())).await.unwrap();

		let task = app.recv().await.unwrap().unwrap();
		assert_eq!(task.cmd, inf::META_DATA);
		assert_eq!(MetaData::decode(&task.data).unwrap().get("content-type"), Some("text/plain"));
		assert_eq!(app.recv().await.unwrap().unwrap().cmd, msg::FINISHED);
	}

	#[tokio::test]
	async fn test_data_req_announces_resume_and_services_meta_data() {
		let (mut ctx, mut app) = context();
		let job = tokio::spawn(async move {
			let resume = app.recv().await.unwrap().unwrap();
			assert_eq!(resume.cmd, msg::RESUME);
			assert_eq!(decode_u64(&resume.data).unwrap(), 0);
			assert_eq!(app.recv().await.unwrap().unwrap().cmd, msg::DATA_REQ);

			let md: MetaData = vec![("k", "v")].into_iter().collect();
			app.send_command(cmd::META_DATA, &md.encode().unwrap()).await.unwrap();
			app.send_command(msg::DATA, b"chunk").await.unwrap();
			app
		});

		assert_eq!(ctx.data_req().await.unwrap(), b"chunk");
		assert_eq!(ctx.meta_data("k"), Some("v"));
		job.await.unwrap();
	}

	#[tokio::test]
	async fn test_can_resume_waits_for_answer() {
		let (mut ctx, mut app) = context();
		let job = tokio::spawn(async move {
			let offer = app.recv().await.unwrap().unwrap();
			assert_eq!(decode_u64(&offer.data).unwrap(), 6);
			app.send_command(cmd::RESUMEANSWER, &encode_u64(6)).await.unwrap();
			app
		});
		assert!(ctx.can_resume(6).await.unwrap());
		job.await.unwrap();
	}

	#[tokio::test]
	async fn test_message_box_round_trip() {
		let (mut ctx, mut app) = context();
		let job = tokio::spawn(async move {
			let task = app.recv().await.unwrap().unwrap();
			assert_eq!(task.cmd, inf::MESSAGEBOX);
			let answer = serde_json::to_vec(&MessageBoxAnswer::Secondary).unwrap();
			app.send_command(cmd::MESSAGEBOXANSWER, &answer).await.unwrap();
			app
		});
		let request = MessageBoxRequest {
			kind: MessageBoxKind::QuestionTwoActions,
			text: "Trust?".into(),
			title: "Certificate".into(),
			primary: "Yes".into(),
			secondary: "No".into(),
		};
		assert_eq!(ctx.message_box(&request).await.unwrap(), MessageBoxAnswer::Secondary);
		job.await.unwrap();
	}

	#[tokio::test]
	async fn test_wait_aborts_when_killed() {
		let (app, worker) = Connection::pair().unwrap();
		let kill = KillSwitch::new();
		let mut ctx = WorkerContext::new(worker, "test", kill.clone());
		kill.kill();
		let err = ctx.data_req().await.unwrap_err();
		assert_eq!(err.code(), ErrorCode::UserCanceled);
		drop(app);
	}

	#[tokio::test]
	async fn test_password_dialog_round_trip() {
		let (mut ctx, mut app) = context();
		let job = tokio::spawn(async move {
			let task = app.recv().await.unwrap().unwrap();
			assert_eq!(task.cmd, inf::AUTH_DIALOG);
			let request: AuthRequest = serde_json::from_slice(&task.data).unwrap();
			assert_eq!(request.error_message, "wrong password");
			let mut answer = request.info;
			answer.username = "alice".into();
			answer.password = "secret".into();
			answer.url = None;
			app.send_command(cmd::AUTHANSWER, &serde_json::to_vec(&Some(answer)).unwrap()).await.unwrap();

			let task = app.recv().await.unwrap().unwrap();
			assert_eq!(task.cmd, inf::AUTH_DIALOG);
			app.send_command(cmd::AUTHANSWER, b"null").await.unwrap();
			app
		});

		let mut info = AuthInfo { url: Some(Url::parse("ftp://h/").unwrap()), ..Default::default() };
		ctx.open_password_dialog(&mut info, "wrong password").await.unwrap();
		assert_eq!(info.username, "alice");
		assert_eq!(info.password, "secret");
		assert_eq!(info.url.as_ref().map(|u| u.as_str()), Some("ftp://h/"));

		let err = ctx.open_password_dialog(&mut info, "").await.unwrap_err();
		assert_eq!(err.code(), ErrorCode::UserCanceled);
		job.await.unwrap();
	}

	#[tokio::test]
	async fn test_password_prompt_suppressed_by_meta_data() {
		let (mut ctx, _app) = context();
		ctx.incoming.insert("no-auth-prompt", "true");
		let mut info = AuthInfo::default();
		let err = ctx.open_password_dialog(&mut info, "").await.unwrap_err();
		assert_eq!(err.code(), ErrorCode::UserCanceled);
	}

	#[tokio::test]
	async fn test_cached_authentication_miss() {
		let (mut ctx, mut app) = context();
		let job = tokio::spawn(async move {
			let task = app.recv().await.unwrap().unwrap();
			assert_eq!(task.cmd, inf::CHECK_AUTH);
			app.send_command(cmd::AUTHANSWER, b"null").await.unwrap();
			app
		});
		let mut info = AuthInfo { username: "bob".into(), ..Default::default() };
		assert!(!ctx.check_cached_authentication(&mut info).await.unwrap());
		assert_eq!(info.username, "bob");
		job.await.unwrap();
	}

	#[tokio::test]
	async fn test_config_fallback() {
		let (mut ctx, _app) = context();
		ctx.config.insert("MarkPartial", "false");
		ctx.incoming.insert("MinimumKeepSize", "10");
		assert!(!ctx.config_bool("MarkPartial", true));
		assert_eq!(ctx.config_u64("MinimumKeepSize", 5000), 10);
		assert_eq!(ctx.config_u64("Missing", 7), 7);
	}
}

// vim: ts=4
