//! Callback traits for user interaction and upload data

use async_trait::async_trait;
use url::Url;

use crate::error::JobError;
use crate::protocol::messages::{AuthInfo, AuthRequest, MessageBoxAnswer, MessageBoxKind, MessageBoxRequest};

/// Decision for a failing child of a composite job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipDecision {
	/// Skip this item, ask again on the next failure
	Skip,
	/// Skip this and every later failing item
	AutoSkip,
	/// Run the failed item again
	Retry,
	/// Abort the whole job with this error
	Cancel,
}

/// Interruption points a job exposes to the application
pub trait UiDelegate: Send + Sync {
	/// Called when one item of a copy/move tree fails
	fn ask_skip(&self, _url: &Url, _error: &JobError) -> SkipDecision {
		SkipDecision::Cancel
	}

	/// Called when a partial destination of `offset` bytes exists and the
	/// source has `size` bytes. Return true to append from `offset`.
	fn ask_resume(&self, _dest: &Url, _offset: u64, _size: u64) -> bool {
		false
	}

	/// Answer a question raised by a worker
	fn message_box(&self, request: &MessageBoxRequest) -> MessageBoxAnswer {
		match request.kind {
			MessageBoxKind::Information => MessageBoxAnswer::Primary,
			_ => MessageBoxAnswer::Cancel,
		}
	}

	/// Ask the user for credentials. Return the filled-in `request.info`, or
	/// `None` to cancel; the worker then fails with `UserCanceled`.
	fn ask_password(&self, _request: &AuthRequest) -> Option<AuthInfo> {
		None
	}
}

/// Delegate that never asks anything and takes the defaults
pub struct NoUiDelegate;

impl UiDelegate for NoUiDelegate {}

/// Supplies upload data to a put job, one chunk per worker data request
#[async_trait]
pub trait TransferSource: Send {
	/// The worker offers to continue a partial upload at `offset`.
	/// Return true to skip the first `offset` bytes. Called with 0 when the
	/// worker has nothing to resume; the answer is ignored in that case.
	async fn resume(&mut self, _offset: u64) -> bool {
		false
	}

	/// Next chunk; an empty chunk ends the upload
	async fn next_chunk(&mut self) -> Result<Vec<u8>, JobError>;
}

/// In-memory upload source
pub struct BytesSource {
	data: Vec<u8>,
	pos: usize,
	chunk_size: usize,
}

impl BytesSource {
	pub fn new(data: impl Into<Vec<u8>>) -> Self {
		BytesSource { data: data.into(), pos: 0, chunk_size: crate::protocol::codec::STANDARD_BUFFER_SIZE }
	}

	pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
		self.chunk_size = chunk_size.max(1);
		self
	}
}

#[async_trait]
impl TransferSource for BytesSource {
	async fn resume(&mut self, offset: u64) -> bool {
		if offset == 0 || offset as usize > self.data.len() {
			return false;
		}
		self.pos = offset as usize;
		true
	}

	async fn next_chunk(&mut self) -> Result<Vec<u8>, JobError> {
		let end = (self.pos + self.chunk_size).min(self.data.len());
		let chunk = self.data[self.pos..end].to_vec();
		self.pos = end;
		Ok(chunk)
	}
}


// vim: ts=4
