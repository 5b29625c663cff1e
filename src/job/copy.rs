//! Transfers built out of simpler jobs
//!
//! [`file_copy`] pumps a `get` into a `put`, continuing a partial destination
//! when both sides agree on the offset. Both workers run inside one
//! reservation, so a pump never holds one slot while waiting for another. [`copy`] walks a tree, [`file_move`]
//! renames where the protocol can and copies then deletes where it cannot.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use url::Url;

use super::{run_command, Job, JobEvent, JobOptions, JobSink, JobState};
use crate::callbacks::{SkipDecision, TransferSource};
use crate::error::{ErrorCode, JobError};
use crate::logging::*;
use crate::metadata::RANGE_START;
use crate::protocol::messages::WorkerCommand;
use crate::scheduler::{Reservation, Scheduler};
use crate::udsentry::{field, UdsEntry};

/// Same protocol, host, port and user
fn same_origin(a: &Url, b: &Url) -> bool {
	a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.port() == b.port() && a.username() == b.username()
}

fn child_url(base: &Url, name: &str) -> Result<Url, JobError> {
	let mut url = base.clone();
	url.path_segments_mut()
		.map_err(|_| JobError::new(ErrorCode::MalformedUrl, base.to_string()))?
		.pop_if_empty()
		.push(name);
	Ok(url)
}

fn permissions_of(entry: &UdsEntry) -> Option<u32> {
	entry.number_value(field::ACCESS).map(|mode| (mode & 0o7777) as u32)
}

async fn stat(scheduler: &Scheduler, url: &Url, options: &JobOptions) -> Result<UdsEntry, JobError> {
	Job::stat(scheduler, url, options.clone())
		.result()
		.await?
		.stat
		.ok_or_else(|| JobError::new(ErrorCode::CannotStat, url.to_string()))
}

/// Children of a folder, without `.` and `..`, sorted by name
async fn children(scheduler: &Scheduler, url: &Url, options: &JobOptions) -> Result<Vec<UdsEntry>, JobError> {
	let mut entries: Vec<UdsEntry> = Job::list_dir(scheduler, url, options.clone())
		.result()
		.await?
		.entries
		.into_iter()
		.filter(|e| !matches!(e.name(), None | Some(".") | Some("..")))
		.collect();
	entries.sort_by(|a, b| a.name().cmp(&b.name()));
	Ok(entries)
}

// ─── Single file ───

/// Copy one file. Uses the protocol's own copy when source and destination
/// share a worker kind that supports it and no resume was asked for.
pub fn file_copy(
	scheduler: &Scheduler,
	src: &Url,
	dest: &Url,
	permissions: Option<u32>,
	options: JobOptions,
) -> Job {
	for url in &[src, dest] {
		if scheduler.protocol_info(url.scheme()).is_none() {
			return Job::failed(scheduler, JobError::new(ErrorCode::UnsupportedProtocol, url.scheme()));
		}
	}
	let scheduler_ = scheduler.clone();
	let (src, dest) = (src.clone(), dest.clone());
	Job::spawn(scheduler, move |sink| run_file_copy(scheduler_, sink, src, dest, permissions, options))
}

async fn run_file_copy(
	scheduler: Scheduler,
	sink: JobSink,
	src: Url,
	dest: Url,
	permissions: Option<u32>,
	options: JobOptions,
) -> Result<(), JobError> {
	let child = options.child_of(sink.id());
	let native = same_origin(&src, &dest)
		&& !options.flags.resume
		&& scheduler.protocol_info(src.scheme()).map(|i| i.supports_copy).unwrap_or(false);
	if native {
		let command = WorkerCommand::Copy {
			src: src.clone(),
			dest: dest.clone(),
			permissions,
			overwrite: options.flags.overwrite,
		};
		match run_command(scheduler.clone(), sink.clone(), src.clone(), command, options.clone(), None, None).await {
			Err(e) if e.code() == ErrorCode::UnsupportedAction => {
				debug!("Native copy of {} unavailable, pumping data", src);
			}
			other => return other,
		}
	}

	sink.set_state(JobState::Running);
	let entry = stat(&scheduler, &src, &child).await?;
	if entry.is_dir() {
		return Err(JobError::new(ErrorCode::IsDirectory, src.to_string()));
	}
	let size = entry.size();
	if let (Some(size), false) = (size, options.flags.hide_progress_info) {
		sink.emit(JobEvent::TotalSize(size));
	}

	let mut put_options = child.clone();
	if let Some(mtime) = entry.number_value(field::MODIFICATION_TIME) {
		put_options.meta_data.insert("modified", mtime.to_string());
	}
	let reservation = Arc::new(scheduler.reserve(&[&src, &dest]).await?);
	let source = CopySource {
		scheduler: scheduler.clone(),
		reservation: reservation.clone(),
		src: src.clone(),
		dest: dest.clone(),
		size,
		auto_resume: scheduler.config().scheduler.auto_resume,
		options: child,
		sink: sink.clone(),
		get: None,
		pending: None,
		done: None,
		processed: 0,
	};

	let command = WorkerCommand::Put {
		url: dest.clone(),
		permissions,
		overwrite: put_options.flags.overwrite,
		resume: put_options.flags.resume,
	};
	let mut put = Job::command_in(&scheduler, &dest, command, put_options, Some(Box::new(source)), Some(reservation));
	while let Some(event) = put.next_event().await {
		match event {
			JobEvent::Finished(result) => return result,
			JobEvent::CanResume(offset) => sink.emit(JobEvent::CanResume(offset)),
			event @ JobEvent::Warning(_) | event @ JobEvent::InfoMessage(_) | event @ JobEvent::MetaData(_) => {
				sink.emit(event)
			}
			_ => {}
		}
	}
	Err(JobError::new(ErrorCode::Internal, format!("upload of {} ended without a result", dest)))
}

/// Feeds a put job from a get job on the source
struct CopySource {
	scheduler: Scheduler,
	/// Slots shared with the put job
	reservation: Arc<Reservation>,
	src: Url,
	dest: Url,
	size: Option<u64>,
	auto_resume: bool,
	options: JobOptions,
	/// Parent copy job, for progress
	sink: JobSink,
	get: Option<Job>,
	/// First chunk of a ranged get the source did not honour
	pending: Option<Vec<u8>>,
	done: Option<Result<(), JobError>>,
	processed: u64,
}

impl CopySource {
	fn start_get(&mut self, offset: u64) {
		let mut options = self.options.clone();
		if offset > 0 {
			options.meta_data.insert(RANGE_START, offset.to_string());
		}
		let command = WorkerCommand::Get { url: self.src.clone() };
		let reservation = Some(self.reservation.clone());
		self.get = Some(Job::command_in(&self.scheduler, &self.src, command, options, None, reservation));
		self.done = None;
	}

	fn wants_resume(&self, offset: u64) -> bool {
		if self.options.flags.overwrite {
			return false;
		}
		let size = match self.size {
			Some(size) if offset < size => size,
			_ => return false,
		};
		self.options.flags.resume || self.auto_resume || self.options.ui().ask_resume(&self.dest, offset, size)
	}

	async fn next_get_event(&mut self) -> Option<JobEvent> {
		match self.get.as_mut() {
			Some(get) => get.next_event().await,
			None => None,
		}
	}

	fn progress(&mut self, n: usize) {
		self.processed += n as u64;
		if !self.options.flags.hide_progress_info {
			self.sink.emit(JobEvent::ProcessedSize(self.processed));
		}
	}
}

#[async_trait]
impl TransferSource for CopySource {
	async fn resume(&mut self, offset: u64) -> bool {
		if offset == 0 || !self.wants_resume(offset) {
			self.start_get(0);
			return false;
		}

		self.start_get(offset);
		// The get either acknowledges the offset or starts sending from 0
		loop {
			match self.next_get_event().await {
				Some(JobEvent::CanResume(at)) if at == offset => {
					debug!("Resuming {} at {}", self.dest, offset);
					self.processed = offset;
					return true;
				}
				Some(JobEvent::Data(chunk)) => {
					self.pending = Some(chunk);
					return false;
				}
				Some(JobEvent::Finished(Ok(()))) | None => {
					self.done = Some(Ok(()));
					return false;
				}
				Some(JobEvent::Finished(Err(e))) => {
					debug!("Ranged read of {} failed ({}), starting over", self.src, e);
					self.start_get(0);
					return false;
				}
				Some(_) => {}
			}
		}
	}

	async fn next_chunk(&mut self) -> Result<Vec<u8>, JobError> {
		if let Some(chunk) = self.pending.take() {
			self.progress(chunk.len());
			return Ok(chunk);
		}
		if self.get.is_none() && self.done.is_none() {
			self.start_get(0);
		}
		loop {
			if let Some(done) = &self.done {
				return done.clone().map(|()| Vec::new());
			}
			match self.next_get_event().await {
				Some(JobEvent::Data(chunk)) => {
					self.progress(chunk.len());
					return Ok(chunk);
				}
				Some(JobEvent::Finished(result)) => self.done = Some(result),
				None => self.done = Some(Ok(())),
				Some(_) => {}
			}
		}
	}
}

// ─── Trees ───

/// Copy a file, symlink or folder tree. `dest` names the copy itself, not
/// the folder it goes into.
pub fn copy(scheduler: &Scheduler, src: &Url, dest: &Url, options: JobOptions) -> Job {
	let scheduler_ = scheduler.clone();
	let (src, dest) = (src.clone(), dest.clone());
	Job::spawn(scheduler, move |sink| async move {
		sink.set_state(JobState::Running);
		let mut tree = TreeCopy::new(scheduler_, sink, options);
		tree.copy_url(src, dest).await
	})
}

/// Move by renaming, or by copying and deleting the source when the
/// protocol cannot rename across the two URLs
pub fn file_move(scheduler: &Scheduler, src: &Url, dest: &Url, options: JobOptions) -> Job {
	let scheduler_ = scheduler.clone();
	let (src, dest) = (src.clone(), dest.clone());
	Job::spawn(scheduler, move |sink| async move {
		sink.set_state(JobState::Running);
		let child = options.child_of(sink.id());
		if same_origin(&src, &dest) {
			match Job::rename(&scheduler_, &src, &dest, child.clone()).result().await {
				Ok(_) => return Ok(()),
				Err(e) if e.code() == ErrorCode::UnsupportedAction => {
					debug!("Cannot rename {} to {}, copying", src, dest);
				}
				Err(e) => return Err(e),
			}
		}
		let entry = stat(&scheduler_, &src, &child).await?;
		let mut tree = TreeCopy::new(scheduler_.clone(), sink, options);
		tree.copy_url(src.clone(), dest).await?;
		remove_tree(&scheduler_, &src, &entry, &child).await
	})
}

/// Delete a file, symlink or whole folder tree
pub fn remove(scheduler: &Scheduler, url: &Url, options: JobOptions) -> Job {
	let scheduler_ = scheduler.clone();
	let url = url.clone();
	Job::spawn(scheduler, move |sink| async move {
		sink.set_state(JobState::Running);
		let child = options.child_of(sink.id());
		let entry = stat(&scheduler_, &url, &child).await?;
		remove_tree(&scheduler_, &url, &entry, &child).await
	})
}

fn remove_tree<'a>(
	scheduler: &'a Scheduler,
	url: &'a Url,
	entry: &'a UdsEntry,
	options: &'a JobOptions,
) -> BoxFuture<'a, Result<(), JobError>> {
	Box::pin(async move {
		if !entry.is_dir() || entry.is_link() {
			Job::del(scheduler, url, true, options.clone()).result().await?;
			return Ok(());
		}
		for child in children(scheduler, url, options).await? {
			let name = child.name().unwrap_or_default().to_string();
			remove_tree(scheduler, &child_url(url, &name)?, &child, options).await?;
		}
		Job::del(scheduler, url, false, options.clone()).result().await?;
		Ok(())
	})
}

struct TreeCopy {
	scheduler: Scheduler,
	sink: JobSink,
	options: JobOptions,
	child: JobOptions,
	auto_skip: bool,
}

impl TreeCopy {
	fn new(scheduler: Scheduler, sink: JobSink, options: JobOptions) -> Self {
		let child = options.child_of(sink.id());
		TreeCopy { scheduler, sink, options, child, auto_skip: false }
	}

	fn copy_url(&mut self, src: Url, dest: Url) -> BoxFuture<'_, Result<(), JobError>> {
		Box::pin(async move {
			let entry = stat(&self.scheduler, &src, &self.child).await?;

			if entry.is_link() {
				let target = entry.string_value(field::LINK_DEST).unwrap_or_default().to_string();
				return Job::symlink(&self.scheduler, &target, &dest, self.child.clone()).result().await.map(|_| ());
			}

			if !entry.is_dir() {
				let job = file_copy(&self.scheduler, &src, &dest, permissions_of(&entry), self.child.clone());
				return job.result().await.map(|_| ());
			}

			match Job::mkdir(&self.scheduler, &dest, permissions_of(&entry), self.child.clone()).result().await {
				Ok(_) => {}
				Err(e) if e.code() == ErrorCode::DirAlreadyExist => trace!("Merging into {}", dest),
				Err(e) => return Err(e),
			}
			for child in children(&self.scheduler, &src, &self.child).await? {
				let name = child.name().unwrap_or_default().to_string();
				let (child_src, child_dest) = (child_url(&src, &name)?, child_url(&dest, &name)?);
				self.copy_child(child_src, child_dest).await?;
			}
			Ok(())
		})
	}

	/// Copy one item of a tree, letting the delegate skip or retry failures
	async fn copy_child(&mut self, src: Url, dest: Url) -> Result<(), JobError> {
		loop {
			let err = match self.copy_url(src.clone(), dest.clone()).await {
				Ok(()) => return Ok(()),
				Err(e) if e.code() == ErrorCode::UserCanceled => return Err(e),
				Err(e) => e,
			};
			let decision = if self.auto_skip {
				SkipDecision::Skip
			} else {
				self.options.ui().ask_skip(&src, &err)
			};
			match decision {
				SkipDecision::Retry => debug!("Retrying {}", src),
				SkipDecision::Cancel => return Err(err),
				SkipDecision::Skip | SkipDecision::AutoSkip => {
					if decision == SkipDecision::AutoSkip {
						self.auto_skip = true;
					}
					warn!("Skipping {}: {}", src, err);
					self.sink.emit(JobEvent::Warning(err.to_string()));
					return Ok(());
				}
			}
		}
	}
}


// vim: ts=4
