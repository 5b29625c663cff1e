//! Client-side jobs
//!
//! A [`Job`] is the application's handle on one operation. Each job runs as a
//! detached task that walks `Created → Scheduled → Running → Finished`,
//! reporting through an event stream that always ends with exactly one
//! [`JobEvent::Finished`]. [`Job::kill`] finishes the job on the spot and
//! drops the task, which tears down the bound worker instead of pooling it.
//!
//! Transfers, stats, listings and deletes follow redirections: once the
//! worker finishes after `INF_REDIRECTION`, the command runs again against
//! the new URL on a worker bound to it.

pub mod copy;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use url::Url;

use crate::auth::AuthCache;
use crate::callbacks::{NoUiDelegate, TransferSource, UiDelegate};
use crate::connection::Worker;
use crate::error::{ErrorCode, JobError};
use crate::logging::*;
use crate::metadata::MetaData;
use crate::protocol::commands::{cmd, command_name, inf, msg};
use crate::protocol::error::ProtocolError;
use crate::protocol::messages::{
	decode_error, decode_text, decode_u64, encode_u64, AuthInfo, AuthRequest, MessageBoxRequest, WorkerCommand,
};
use crate::scheduler::{Reservation, Scheduler};
use crate::udsentry::{decode_entries, UdsEntry};
use crate::worker::KillSwitch;

pub type JobId = u64;

/// Redirections a job follows before it fails with `CyclicLink`
const MAX_REDIRECTIONS: usize = 20;
/// Earlier redirections to one URL after which another one is a cycle
const MAX_SAME_REDIRECTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
	Created,
	/// Waiting for a worker
	Scheduled,
	/// Worker bound, commands flowing
	Running,
	Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
	Data(Vec<u8>),
	MimeType(String),
	StatEntry(UdsEntry),
	Entries(Vec<UdsEntry>),
	TotalSize(u64),
	ProcessedSize(u64),
	Speed(u64),
	Redirection(Url),
	Warning(String),
	InfoMessage(String),
	MetaData(MetaData),
	/// A transfer continues at this offset instead of starting over
	CanResume(u64),
	Finished(Result<(), JobError>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobFlags {
	/// No TotalSize/ProcessedSize/Speed events
	pub hide_progress_info: bool,
	/// Cached content is acceptable
	pub no_reload: bool,
	/// Bypass caches
	pub reload: bool,
	/// Replace an existing destination
	pub overwrite: bool,
	/// Continue a partial transfer
	pub resume: bool,
}

impl JobFlags {
	pub fn overwrite() -> Self {
		JobFlags { overwrite: true, ..Default::default() }
	}

	pub fn resume() -> Self {
		JobFlags { resume: true, ..Default::default() }
	}
}

#[derive(Clone, Default)]
pub struct JobOptions {
	pub flags: JobFlags,
	/// Sent to the worker with CMD_META_DATA
	pub meta_data: MetaData,
	pub ui: Option<Arc<dyn UiDelegate>>,
	/// Composite job this one belongs to
	pub parent: Option<JobId>,
}

impl From<JobFlags> for JobOptions {
	fn from(flags: JobFlags) -> Self {
		JobOptions { flags, ..Default::default() }
	}
}

impl JobOptions {
	pub fn ui(&self) -> Arc<dyn UiDelegate> {
		match &self.ui {
			Some(ui) => ui.clone(),
			None => Arc::new(NoUiDelegate),
		}
	}

	/// Options for a sub-job: same flags and delegate, no metadata
	pub fn child_of(&self, parent: JobId) -> JobOptions {
		JobOptions { flags: self.flags, meta_data: MetaData::new(), ui: self.ui.clone(), parent: Some(parent) }
	}

	fn outgoing_meta_data(&self) -> MetaData {
		let mut meta = self.meta_data.clone();
		if self.flags.reload {
			meta.insert("cache", "reload");
		} else if self.flags.no_reload && !meta.contains_key("cache") {
			meta.insert("cache", "cache");
		}
		meta
	}
}

/// Everything a job produced, collected by [`Job::result`]
#[derive(Debug, Clone, Default)]
pub struct JobOutcome {
	pub data: Vec<u8>,
	pub mime_type: Option<String>,
	pub stat: Option<UdsEntry>,
	pub entries: Vec<UdsEntry>,
	pub meta_data: MetaData,
	pub redirection: Option<Url>,
	pub warnings: Vec<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	match mutex.lock() {
		Ok(guard) => guard,
		Err(poisoned) => poisoned.into_inner(),
	}
}

struct JobShared {
	id: JobId,
	state: Mutex<JobState>,
	worker_id: Mutex<Option<u64>>,
	/// Taken when Finished is sent; nothing is delivered afterwards
	sender: Mutex<Option<UnboundedSender<JobEvent>>>,
	kill: KillSwitch,
}

impl JobShared {
	fn finish(&self, result: Result<(), JobError>) -> bool {
		let sender = match lock(&self.sender).take() {
			Some(sender) => sender,
			None => return false,
		};
		*lock(&self.state) = JobState::Finished;
		match &result {
			Ok(()) => debug!("Job {} finished", self.id),
			Err(e) => debug!("Job {} failed: {}", self.id, e),
		}
		let _ = sender.send(JobEvent::Finished(result));
		true
	}
}

/// Write side of a job, held by its task
#[derive(Clone)]
pub(crate) struct JobSink(Arc<JobShared>);

impl JobSink {
	pub(crate) fn id(&self) -> JobId {
		self.0.id
	}

	pub(crate) fn emit(&self, event: JobEvent) {
		if let Some(sender) = lock(&self.0.sender).as_ref() {
			let _ = sender.send(event);
		}
	}

	fn set_state(&self, state: JobState) {
		let mut current = lock(&self.0.state);
		if *current != JobState::Finished {
			*current = state;
		}
	}

	fn bind(&self, worker_id: Option<u64>) {
		*lock(&self.0.worker_id) = worker_id;
	}
}

pub struct Job {
	shared: Arc<JobShared>,
	events: UnboundedReceiver<JobEvent>,
}

impl std::fmt::Debug for Job {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Job").field("id", &self.id()).field("state", &self.state()).finish()
	}
}

impl Job {
	fn create(scheduler: &Scheduler) -> (Job, JobSink) {
		let (sender, events) = unbounded_channel();
		let shared = Arc::new(JobShared {
			id: scheduler.next_job_id(),
			state: Mutex::new(JobState::Created),
			worker_id: Mutex::new(None),
			sender: Mutex::new(Some(sender)),
			kill: KillSwitch::new(),
		});
		let sink = JobSink(shared.clone());
		(Job { shared, events }, sink)
	}

	/// Run `body` as the job's task. Its result becomes the Finished event.
	pub(crate) fn spawn<F, Fut>(scheduler: &Scheduler, body: F) -> Job
	where
		F: FnOnce(JobSink) -> Fut,
		Fut: Future<Output = Result<(), JobError>> + Send + 'static,
	{
		let (job, sink) = Job::create(scheduler);
		let task = body(sink.clone());
		let kill = job.shared.kill.clone();
		tokio::spawn(async move {
			let result = tokio::select! {
				biased;
				_ = kill.killed() => return,
				result = task => result,
			};
			sink.0.finish(result);
		});
		job
	}

	/// A job that failed before it was ever scheduled
	pub(crate) fn failed(scheduler: &Scheduler, err: JobError) -> Job {
		let (job, sink) = Job::create(scheduler);
		sink.0.finish(Err(err));
		job
	}

	fn command(
		scheduler: &Scheduler,
		url: &Url,
		command: WorkerCommand,
		options: JobOptions,
		source: Option<Box<dyn TransferSource>>,
	) -> Job {
		Job::command_in(scheduler, url, command, options, source, None)
	}

	/// Run `command` on a worker bound inside `reservation`, or on one that
	/// waits for its own slot when there is none
	pub(crate) fn command_in(
		scheduler: &Scheduler,
		url: &Url,
		command: WorkerCommand,
		options: JobOptions,
		source: Option<Box<dyn TransferSource>>,
		reservation: Option<Arc<Reservation>>,
	) -> Job {
		if scheduler.protocol_info(url.scheme()).is_none() {
			return Job::failed(scheduler, JobError::new(ErrorCode::UnsupportedProtocol, url.scheme()));
		}
		let scheduler_ = scheduler.clone();
		let url = url.clone();
		Job::spawn(scheduler, move |sink| run_command(scheduler_, sink, url, command, options, source, reservation))
	}

	// ─── Constructors ───

	pub fn get(scheduler: &Scheduler, url: &Url, options: JobOptions) -> Job {
		Job::command(scheduler, url, WorkerCommand::Get { url: url.clone() }, options, None)
	}

	/// Upload the chunks of `source` to `url`
	pub fn put(
		scheduler: &Scheduler,
		url: &Url,
		source: Box<dyn TransferSource>,
		permissions: Option<u32>,
		options: JobOptions,
	) -> Job {
		let command = WorkerCommand::Put {
			url: url.clone(),
			permissions,
			overwrite: options.flags.overwrite,
			resume: options.flags.resume,
		};
		Job::command(scheduler, url, command, options, Some(source))
	}

	pub fn stat(scheduler: &Scheduler, url: &Url, options: JobOptions) -> Job {
		Job::command(scheduler, url, WorkerCommand::Stat { url: url.clone() }, options, None)
	}

	pub fn mimetype(scheduler: &Scheduler, url: &Url, options: JobOptions) -> Job {
		Job::command(scheduler, url, WorkerCommand::Mimetype { url: url.clone() }, options, None)
	}

	pub fn list_dir(scheduler: &Scheduler, url: &Url, options: JobOptions) -> Job {
		Job::command(scheduler, url, WorkerCommand::ListDir { url: url.clone() }, options, None)
	}

	pub fn mkdir(scheduler: &Scheduler, url: &Url, permissions: Option<u32>, options: JobOptions) -> Job {
		Job::command(scheduler, url, WorkerCommand::Mkdir { url: url.clone(), permissions }, options, None)
	}

	/// Delete a file, or an empty folder when `is_file` is false
	pub fn del(scheduler: &Scheduler, url: &Url, is_file: bool, options: JobOptions) -> Job {
		Job::command(scheduler, url, WorkerCommand::Del { url: url.clone(), is_file }, options, None)
	}

	/// Rename within one protocol and host
	pub fn rename(scheduler: &Scheduler, src: &Url, dest: &Url, options: JobOptions) -> Job {
		let command = WorkerCommand::Rename {
			src: src.clone(),
			dest: dest.clone(),
			overwrite: options.flags.overwrite,
		};
		Job::command(scheduler, src, command, options, None)
	}

	pub fn symlink(scheduler: &Scheduler, target: &str, dest: &Url, options: JobOptions) -> Job {
		let command = WorkerCommand::Symlink {
			target: target.to_string(),
			dest: dest.clone(),
			overwrite: options.flags.overwrite,
		};
		Job::command(scheduler, dest, command, options, None)
	}

	pub fn chmod(scheduler: &Scheduler, url: &Url, permissions: u32, options: JobOptions) -> Job {
		Job::command(scheduler, url, WorkerCommand::Chmod { url: url.clone(), permissions }, options, None)
	}

	/// `mtime` in seconds since the epoch
	pub fn set_modification_time(scheduler: &Scheduler, url: &Url, mtime: i64, options: JobOptions) -> Job {
		let command = WorkerCommand::SetModificationTime { url: url.clone(), mtime };
		Job::command(scheduler, url, command, options, None)
	}

	/// Protocol-specific command; `url` only selects the worker
	pub fn special(scheduler: &Scheduler, url: &Url, data: Vec<u8>, options: JobOptions) -> Job {
		Job::command(scheduler, url, WorkerCommand::Special { data }, options, None)
	}

	// ─── Handle ───

	pub fn id(&self) -> JobId {
		self.shared.id
	}

	pub fn state(&self) -> JobState {
		*lock(&self.shared.state)
	}

	pub fn is_finished(&self) -> bool {
		self.state() == JobState::Finished
	}

	/// Worker bound to this job, if it got that far
	pub fn worker_id(&self) -> Option<u64> {
		*lock(&self.shared.worker_id)
	}

	/// Cancel the job. It finishes with `UserCanceled` right away; calling
	/// this again, or after the job finished, does nothing.
	pub fn kill(&self) {
		if self.shared.finish(Err(JobError::canceled())) {
			info!("Job {} killed", self.shared.id);
			self.shared.kill.kill();
		}
	}

	/// Next event; `None` after Finished has been delivered
	pub async fn next_event(&mut self) -> Option<JobEvent> {
		self.events.recv().await
	}

	/// Drain the job into its outcome
	pub async fn result(mut self) -> Result<JobOutcome, JobError> {
		let mut outcome = JobOutcome::default();
		while let Some(event) = self.next_event().await {
			match event {
				JobEvent::Data(bytes) => outcome.data.extend_from_slice(&bytes),
				JobEvent::MimeType(mime) => outcome.mime_type = Some(mime),
				JobEvent::StatEntry(entry) => outcome.stat = Some(entry),
				JobEvent::Entries(entries) => outcome.entries.extend(entries),
				JobEvent::MetaData(meta) => outcome.meta_data.merge(&meta),
				JobEvent::Redirection(url) => outcome.redirection = Some(url),
				JobEvent::Warning(text) => outcome.warnings.push(text),
				JobEvent::Finished(result) => return result.map(|()| outcome),
				_ => {}
			}
		}
		Err(JobError::new(ErrorCode::Internal, format!("job {} ended without a result", self.id())))
	}
}

impl Drop for Job {
	fn drop(&mut self) {
		self.kill();
	}
}

// ─── Driving a single worker command ───

async fn run_command(
	scheduler: Scheduler,
	sink: JobSink,
	mut url: Url,
	mut command: WorkerCommand,
	mut options: JobOptions,
	mut source: Option<Box<dyn TransferSource>>,
	reservation: Option<Arc<Reservation>>,
) -> Result<(), JobError> {
	let mut redirections: Vec<Url> = Vec::new();
	loop {
		sink.set_state(JobState::Scheduled);
		let meta = options.outgoing_meta_data();
		let mut lease = match &reservation {
			Some(reservation) => scheduler.acquire_reserved(&url, &meta, reservation).await?,
			None => scheduler.acquire(&url, &meta).await?,
		};
		sink.bind(lease.worker_id());
		sink.set_state(JobState::Running);
		trace!("Job {} running {} on worker {:?}", sink.id(), command_name(command.code()), lease.worker_id());

		let mut redirection = None;
		let exchanged = exchange(
			lease.worker()?,
			&sink,
			&command,
			&options,
			source.as_deref_mut(),
			scheduler.auth_cache(),
			&mut redirection,
		)
		.await;
		match exchanged {
			Ok(reply) => {
				let fatal = reply.as_ref().err().map(|e| e.is_fatal()).unwrap_or(false);
				scheduler.release(lease, fatal);
				reply?;
			}
			Err(e) => {
				debug!("Job {} lost its worker: {}", sink.id(), e);
				scheduler.release(lease, true);
				return Err(e);
			}
		}

		let (to, next) = match redirection.and_then(|to| command.redirected(&to).map(|next| (to, next))) {
			Some(redirected) => redirected,
			None => return Ok(()),
		};
		let visits = redirections.iter().filter(|seen| **seen == to).count();
		if visits > MAX_SAME_REDIRECTIONS || redirections.len() >= MAX_REDIRECTIONS {
			warn!("Job {} stopped following redirections at {}", sink.id(), to);
			return Err(JobError::new(ErrorCode::CyclicLink, url.to_string()));
		}
		info!("Job {} redirected from {} to {}", sink.id(), url, to);
		redirections.push(to.clone());
		if !options.flags.reload && options.meta_data.get("cache") != Some("reload") {
			options.meta_data.insert("cache", "refresh");
		}
		url = to;
		command = next;
	}
}

/// Send `command` and translate the worker's messages into events until it
/// terminates. The inner result is the worker's answer; the outer error means
/// the exchange itself broke and the worker is unusable.
async fn exchange(
	worker: &mut Worker,
	sink: &JobSink,
	command: &WorkerCommand,
	options: &JobOptions,
	mut source: Option<&mut (dyn TransferSource + 'static)>,
	auth: &AuthCache,
	redirection: &mut Option<Url>,
) -> Result<Result<(), JobError>, JobError> {
	worker.send(command.code(), &command.encode()?).await?;
	let progress = !options.flags.hide_progress_info;
	let ui = options.ui();

	loop {
		let task = match worker.recv().await? {
			Some(task) => task,
			None => return Err(JobError::new(ErrorCode::WorkerDied, worker.protocol())),
		};
		match task.cmd {
			msg::FINISHED => return Ok(Ok(())),
			msg::ERROR => return Ok(Err(decode_error(&task.data)?)),
			msg::DATA => {
				if !task.data.is_empty() {
					sink.emit(JobEvent::Data(task.data));
				}
			}
			msg::DATA_REQ => {
				let chunk = match source.as_mut() {
					Some(source) => source.next_chunk().await?,
					None => Vec::new(),
				};
				worker.send(msg::DATA, &chunk).await?;
			}
			msg::RESUME => {
				let offset = decode_u64(&task.data)?;
				let accepted = match source.as_mut() {
					Some(source) => source.resume(offset).await,
					None => false,
				};
				if offset > 0 {
					if accepted {
						sink.emit(JobEvent::CanResume(offset));
						worker.send(cmd::RESUMEANSWER, &encode_u64(offset)).await?;
					} else {
						worker.send(cmd::NONE, &[]).await?;
					}
				}
			}
			msg::CANRESUME => sink.emit(JobEvent::CanResume(decode_u64(&task.data)?)),
			msg::STAT_ENTRY => sink.emit(JobEvent::StatEntry(UdsEntry::from_bytes(&task.data)?)),
			msg::LIST_ENTRIES => sink.emit(JobEvent::Entries(decode_entries(&task.data)?)),
			inf::MIME_TYPE => sink.emit(JobEvent::MimeType(decode_text(&task.data)?)),
			inf::TOTAL_SIZE => {
				if progress {
					sink.emit(JobEvent::TotalSize(decode_u64(&task.data)?));
				}
			}
			inf::PROCESSED_SIZE => {
				if progress {
					sink.emit(JobEvent::ProcessedSize(decode_u64(&task.data)?));
				}
			}
			inf::SPEED => {
				if progress {
					sink.emit(JobEvent::Speed(decode_u64(&task.data)?));
				}
			}
			inf::REDIRECTION => {
				let text = decode_text(&task.data)?;
				let url = Url::parse(&text).map_err(|_| JobError::new(ErrorCode::MalformedUrl, text))?;
				*redirection = Some(url.clone());
				sink.emit(JobEvent::Redirection(url));
			}
			inf::WARNING => sink.emit(JobEvent::Warning(decode_text(&task.data)?)),
			inf::INFOMESSAGE => sink.emit(JobEvent::InfoMessage(decode_text(&task.data)?)),
			inf::META_DATA => sink.emit(JobEvent::MetaData(MetaData::decode(&task.data)?)),
			inf::MESSAGEBOX => {
				let request: MessageBoxRequest =
					serde_json::from_slice(&task.data).map_err(ProtocolError::from)?;
				let answer = ui.message_box(&request);
				let payload = serde_json::to_vec(&answer).map_err(ProtocolError::from)?;
				worker.send(cmd::MESSAGEBOXANSWER, &payload).await?;
			}
			inf::CHECK_AUTH => {
				let query: AuthInfo = serde_json::from_slice(&task.data).map_err(ProtocolError::from)?;
				let cached = auth.lookup(&query);
				let payload = serde_json::to_vec(&cached).map_err(ProtocolError::from)?;
				worker.send(cmd::AUTHANSWER, &payload).await?;
			}
			inf::AUTH_DIALOG => {
				let request: AuthRequest = serde_json::from_slice(&task.data).map_err(ProtocolError::from)?;
				let answer = ui.ask_password(&request);
				if answer.is_none() {
					debug!("Job {} password prompt canceled", sink.id());
				}
				let payload = serde_json::to_vec(&answer).map_err(ProtocolError::from)?;
				worker.send(cmd::AUTHANSWER, &payload).await?;
			}
			inf::CACHE_AUTH => {
				let info: AuthInfo = serde_json::from_slice(&task.data).map_err(ProtocolError::from)?;
				auth.store(&info);
			}
			msg::CONNECTED | msg::WORKER_STATUS => trace!("Ignoring {}", command_name(task.cmd)),
			other => {
				return Err(JobError::new(
					ErrorCode::ProtocolViolation,
					format!("unexpected {} from worker", command_name(other)),
				));
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::callbacks::BytesSource;
	use crate::config::{Config, LaunchMode};
	use crate::udsentry::field;
	use tempfile::TempDir;

	fn scheduler() -> Scheduler {
		let mut config = Config::default();
		config.scheduler.launch_mode = LaunchMode::InProcess;
		Scheduler::new(config).unwrap()
	}

	fn file_url(path: &std::path::Path) -> Url {
		Url::from_file_path(path).unwrap()
	}

	#[tokio::test]
	async fn test_unknown_protocol_never_scheduled() {
		let sched = scheduler();
		let job = Job::get(&sched, &Url::parse("nope://h/x").unwrap(), JobOptions::default());
		assert_eq!(job.state(), JobState::Finished);
		let err = job.result().await.unwrap_err();
		assert_eq!(err.code(), ErrorCode::UnsupportedProtocol);
		assert_eq!(sched.spawned_count(), 0);
	}

	#[tokio::test]
	async fn test_get_streams_data() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("a.txt");
		std::fs::write(&path, b"hello").unwrap();

		let sched = scheduler();
		let outcome = Job::get(&sched, &file_url(&path), JobOptions::default()).result().await.unwrap();
		assert_eq!(outcome.data, b"hello");
		assert_eq!(outcome.mime_type.as_deref(), Some("text/plain"));
	}

	#[tokio::test]
	async fn test_put_then_stat() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("up.bin");

		let sched = scheduler();
		let source = Box::new(BytesSource::new(b"0123456789".to_vec()).with_chunk_size(4));
		Job::put(&sched, &file_url(&path), source, Some(0o600), JobOptions::default())
			.result()
			.await
			.unwrap();
		assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");

		let outcome = Job::stat(&sched, &file_url(&path), JobOptions::default()).result().await.unwrap();
		let entry = outcome.stat.unwrap();
		assert_eq!(entry.size(), Some(10));
		assert_eq!(entry.string_value(field::NAME), Some("up.bin"));
	}

	#[tokio::test]
	async fn test_error_does_not_poison_pool() {
		let dir = TempDir::new().unwrap();
		let sched = scheduler();
		let missing = file_url(&dir.path().join("missing"));

		let err = Job::stat(&sched, &missing, JobOptions::default()).result().await.unwrap_err();
		assert_eq!(err.code(), ErrorCode::DoesNotExist);
		Job::stat(&sched, &file_url(dir.path()), JobOptions::default()).result().await.unwrap();
		assert_eq!(sched.spawned_count(), 1);
	}

	#[tokio::test]
	async fn test_kill_twice_finishes_once() {
		let dir = TempDir::new().unwrap();
		let sched = scheduler();
		let mut job = Job::list_dir(&sched, &file_url(dir.path()), JobOptions::default());
		job.kill();
		job.kill();
		assert_eq!(job.state(), JobState::Finished);

		let mut finished = 0;
		while let Some(event) = job.next_event().await {
			if let JobEvent::Finished(result) = event {
				assert_eq!(result.unwrap_err().code(), ErrorCode::UserCanceled);
				finished += 1;
			}
		}
		assert_eq!(finished, 1);
	}

	#[tokio::test]
	async fn test_hide_progress_info() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("a");
		std::fs::write(&path, b"abc").unwrap();

		let sched = scheduler();
		let options = JobOptions::from(JobFlags { hide_progress_info: true, ..Default::default() });
		let mut job = Job::get(&sched, &file_url(&path), options);
		while let Some(event) = job.next_event().await {
			assert!(!matches!(event, JobEvent::TotalSize(_) | JobEvent::ProcessedSize(_)));
		}
	}

	#[test]
	fn test_reload_flag_becomes_meta_data() {
		let options = JobOptions::from(JobFlags { reload: true, ..Default::default() });
		assert_eq!(options.outgoing_meta_data().get("cache"), Some("reload"));
		assert!(JobOptions::default().outgoing_meta_data().is_empty());
	}
}

// vim: ts=4
