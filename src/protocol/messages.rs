//! Typed payloads
//!
//! Operation commands travel as JSON documents of [`WorkerCommand`]; the frame
//! code duplicates the variant so a worker can reject a payload that does not
//! match its header. Small replies use fixed encodings: numbers are 8 byte
//! big-endian, texts are raw UTF-8.

use serde::{Deserialize, Serialize};
use url::Url;

use super::commands::{cmd, command_name};
use super::error::{ProtocolError, ProtocolResult};
use crate::error::{ErrorCode, JobError};

/// Operation commands sent from a job to its worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkerCommand {
	Get { url: Url },
	Put { url: Url, permissions: Option<u32>, overwrite: bool, resume: bool },
	Stat { url: Url },
	Mimetype { url: Url },
	ListDir { url: Url },
	Mkdir { url: Url, permissions: Option<u32> },
	Rename { src: Url, dest: Url, overwrite: bool },
	Symlink { target: String, dest: Url, overwrite: bool },
	Chmod { url: Url, permissions: u32 },
	SetModificationTime { url: Url, mtime: i64 },
	Copy { src: Url, dest: Url, permissions: Option<u32>, overwrite: bool },
	Del { url: Url, is_file: bool },
	Special { data: Vec<u8> },
}

impl WorkerCommand {
	pub fn code(&self) -> u8 {
		match self {
			WorkerCommand::Get { .. } => cmd::GET,
			WorkerCommand::Put { .. } => cmd::PUT,
			WorkerCommand::Stat { .. } => cmd::STAT,
			WorkerCommand::Mimetype { .. } => cmd::MIMETYPE,
			WorkerCommand::ListDir { .. } => cmd::LISTDIR,
			WorkerCommand::Mkdir { .. } => cmd::MKDIR,
			WorkerCommand::Rename { .. } => cmd::RENAME,
			WorkerCommand::Symlink { .. } => cmd::SYMLINK,
			WorkerCommand::Chmod { .. } => cmd::CHMOD,
			WorkerCommand::SetModificationTime { .. } => cmd::SETMODIFICATIONTIME,
			WorkerCommand::Copy { .. } => cmd::COPY,
			WorkerCommand::Del { .. } => cmd::DEL,
			WorkerCommand::Special { .. } => cmd::SPECIAL,
		}
	}

	/// Whether `code` names one of the operation commands
	pub fn is_operation(code: u8) -> bool {
		matches!(
			code,
			cmd::GET
				| cmd::PUT | cmd::STAT
				| cmd::MIMETYPE | cmd::LISTDIR
				| cmd::MKDIR | cmd::RENAME
				| cmd::SYMLINK | cmd::CHMOD
				| cmd::SETMODIFICATIONTIME
				| cmd::COPY | cmd::DEL
				| cmd::SPECIAL
		)
	}

	/// The same command aimed at `to`, for the commands that follow a
	/// redirection
	pub fn redirected(&self, to: &Url) -> Option<WorkerCommand> {
		let url = to.clone();
		let command = match self {
			WorkerCommand::Get { .. } => WorkerCommand::Get { url },
			WorkerCommand::Put { permissions, overwrite, resume, .. } => {
				WorkerCommand::Put { url, permissions: *permissions, overwrite: *overwrite, resume: *resume }
			}
			WorkerCommand::Stat { .. } => WorkerCommand::Stat { url },
			WorkerCommand::Mimetype { .. } => WorkerCommand::Mimetype { url },
			WorkerCommand::ListDir { .. } => WorkerCommand::ListDir { url },
			WorkerCommand::Del { is_file, .. } => WorkerCommand::Del { url, is_file: *is_file },
			_ => return None,
		};
		Some(command)
	}

	pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
		Ok(serde_json::to_vec(self)?)
	}

	pub fn decode(code: u8, data: &[u8]) -> ProtocolResult<WorkerCommand> {
		let command: WorkerCommand = serde_json::from_slice(data)?;
		if command.code() != code {
			return Err(ProtocolError::ProtocolViolation(format!(
				"{} frame carries a {} payload",
				command_name(code),
				command_name(command.code())
			)));
		}
		Ok(command)
	}
}

/// Connection parameters sent with `CMD_HOST`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
	pub host: String,
	pub port: Option<u16>,
	pub user: Option<String>,
	pub password: Option<String>,
}

impl HostInfo {
	pub fn from_url(url: &Url) -> Self {
		HostInfo {
			host: url.host_str().unwrap_or("").to_string(),
			port: url.port(),
			user: if url.username().is_empty() { None } else { Some(url.username().to_string()) },
			password: url.password().map(|p| p.to_string()),
		}
	}
}

/// `MSG_ERROR` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ErrorReply {
	code: i32,
	text: String,
}

pub fn encode_error(err: &JobError) -> ProtocolResult<Vec<u8>> {
	Ok(serde_json::to_vec(&ErrorReply { code: err.code().to_raw(), text: err.text().to_string() })?)
}

pub fn decode_error(data: &[u8]) -> ProtocolResult<JobError> {
	let reply: ErrorReply = serde_json::from_slice(data)?;
	Ok(JobError::new(ErrorCode::from_raw(reply.code), reply.text))
}

/// `MSG_WORKER_STATUS` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
	pub pid: u32,
	pub protocol: String,
	pub host: String,
	pub connected: bool,
}

/// Question a worker asks the user through `INF_MESSAGEBOX`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBoxRequest {
	pub kind: MessageBoxKind,
	pub text: String,
	pub title: String,
	pub primary: String,
	pub secondary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageBoxKind {
	QuestionTwoActions,
	WarningTwoActions,
	WarningContinueCancel,
	Information,
}

/// Reply to a [`MessageBoxRequest`], sent with `CMD_MESSAGEBOXANSWER`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageBoxAnswer {
	Primary,
	Secondary,
	Cancel,
}

/// Credentials exchanged for `INF_CHECK_AUTH`, `INF_AUTH_DIALOG` and
/// `INF_CACHE_AUTH`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthInfo {
	/// Resource the credentials are for; only scheme, host and port matter
	pub url: Option<Url>,
	pub username: String,
	pub password: String,
	pub prompt: String,
	pub caption: String,
	pub comment: String,
	/// Authentication realm; credentials never cross realms
	pub realm_value: String,
	/// Match cached credentials by path prefix as well
	pub verify_path: bool,
	/// The user may not change the username
	pub read_only: bool,
	/// Ask to keep the password beyond this session
	pub keep_password: bool,
}

/// `INF_AUTH_DIALOG` payload. The answer is `null` when the user canceled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
	pub info: AuthInfo,
	/// Why the last attempt failed, empty on the first prompt
	pub error_message: String,
}

pub fn encode_u64(n: u64) -> Vec<u8> {
	n.to_be_bytes().to_vec()
}

pub fn decode_u64(data: &[u8]) -> ProtocolResult<u64> {
	if data.len() != 8 {
		return Err(ProtocolError::MalformedPayload(format!(
			"expected 8 byte number, got {} bytes",
			data.len()
		)));
	}
	let mut bytes = [0u8; 8];
	bytes.copy_from_slice(data);
	Ok(u64::from_be_bytes(bytes))
}

pub fn decode_text(data: &[u8]) -> ProtocolResult<String> {
	Ok(String::from_utf8(data.to_vec())?)
}


// vim: ts=4
