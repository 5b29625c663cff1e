//! Error types for iorelay operations
//!
//! Every failure that reaches a job carries an [`ErrorCode`] (stable across the
//! wire) and a display text. The code drives programmatic decisions through
//! [`ErrorKind`]; the text is meant for humans only.

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::protocol::error::ProtocolError;

/// Offset added to every code except `UserCanceled`
const USER_DEFINED: i32 = 100;

/// Coarse error taxonomy used for branching (retry, skip, pooling)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	ConnectionFailed,
	ProtocolError,
	NotFound,
	AlreadyExists,
	PermissionDenied,
	MalformedUrl,
	UnsupportedProtocol,
	UnsupportedAction,
	UserCanceled,
	InternalServerError,
	WriteFailed,
	DiskFull,
	Other,
}

/// Stable numeric error codes exchanged between workers and jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
	UserCanceled,
	CannotOpenForReading,
	CannotOpenForWriting,
	CannotLaunchProcess,
	Internal,
	MalformedUrl,
	UnsupportedProtocol,
	UnsupportedAction,
	IsDirectory,
	IsFile,
	DoesNotExist,
	FileAlreadyExist,
	DirAlreadyExist,
	UnknownHost,
	AccessDenied,
	WriteAccessDenied,
	CyclicLink,
	CannotConnect,
	ConnectionBroken,
	CannotRead,
	CannotWrite,
	CannotStat,
	CannotMkdir,
	CannotRmdir,
	CannotResume,
	CannotRename,
	CannotChmod,
	CannotDelete,
	WorkerDied,
	CannotAuthenticate,
	Aborted,
	InternalServer,
	ServerTimeout,
	Unknown,
	CannotRenamePartial,
	CannotSymlink,
	DiskFull,
	CannotSeek,
	CannotSetTime,
	ProtocolViolation,
}

const CODE_TABLE: &[(ErrorCode, i32)] = &[
	(ErrorCode::CannotOpenForReading, 1),
	(ErrorCode::CannotOpenForWriting, 2),
	(ErrorCode::CannotLaunchProcess, 3),
	(ErrorCode::Internal, 4),
	(ErrorCode::MalformedUrl, 5),
	(ErrorCode::UnsupportedProtocol, 6),
	(ErrorCode::UnsupportedAction, 8),
	(ErrorCode::IsDirectory, 9),
	(ErrorCode::IsFile, 10),
	(ErrorCode::DoesNotExist, 11),
	(ErrorCode::FileAlreadyExist, 12),
	(ErrorCode::DirAlreadyExist, 13),
	(ErrorCode::UnknownHost, 14),
	(ErrorCode::AccessDenied, 15),
	(ErrorCode::WriteAccessDenied, 16),
	(ErrorCode::CyclicLink, 19),
	(ErrorCode::CannotConnect, 23),
	(ErrorCode::ConnectionBroken, 24),
	(ErrorCode::CannotRead, 28),
	(ErrorCode::CannotWrite, 29),
	(ErrorCode::CannotStat, 34),
	(ErrorCode::CannotMkdir, 37),
	(ErrorCode::CannotRmdir, 38),
	(ErrorCode::CannotResume, 39),
	(ErrorCode::CannotRename, 40),
	(ErrorCode::CannotChmod, 41),
	(ErrorCode::CannotDelete, 42),
	(ErrorCode::WorkerDied, 43),
	(ErrorCode::CannotAuthenticate, 46),
	(ErrorCode::Aborted, 47),
	(ErrorCode::InternalServer, 48),
	(ErrorCode::ServerTimeout, 49),
	(ErrorCode::Unknown, 51),
	(ErrorCode::CannotRenamePartial, 57),
	(ErrorCode::CannotSymlink, 59),
	(ErrorCode::DiskFull, 61),
	(ErrorCode::CannotSeek, 66),
	(ErrorCode::CannotSetTime, 67),
	(ErrorCode::ProtocolViolation, 90),
];

impl ErrorCode {
	/// Numeric value sent on the wire
	pub fn to_raw(self) -> i32 {
		if self == ErrorCode::UserCanceled {
			return 1;
		}
		CODE_TABLE
			.iter()
			.find(|(code, _)| *code == self)
			.map(|(_, n)| USER_DEFINED + n)
			.unwrap_or(USER_DEFINED + 51)
	}

	/// Decode a wire value. Unknown numbers map to `Unknown`.
	pub fn from_raw(raw: i32) -> Self {
		if raw == 1 {
			return ErrorCode::UserCanceled;
		}
		CODE_TABLE
			.iter()
			.find(|(_, n)| USER_DEFINED + n == raw)
			.map(|(code, _)| *code)
			.unwrap_or(ErrorCode::Unknown)
	}

	pub fn kind(self) -> ErrorKind {
		use ErrorCode::*;
		match self {
			CannotLaunchProcess | CannotConnect | ConnectionBroken | WorkerDied | UnknownHost
			| ServerTimeout => ErrorKind::ConnectionFailed,
			ProtocolViolation => ErrorKind::ProtocolError,
			DoesNotExist => ErrorKind::NotFound,
			FileAlreadyExist | DirAlreadyExist => ErrorKind::AlreadyExists,
			AccessDenied | WriteAccessDenied | CannotAuthenticate => ErrorKind::PermissionDenied,
			MalformedUrl => ErrorKind::MalformedUrl,
			UnsupportedProtocol => ErrorKind::UnsupportedProtocol,
			UnsupportedAction => ErrorKind::UnsupportedAction,
			UserCanceled | Aborted => ErrorKind::UserCanceled,
			InternalServer => ErrorKind::InternalServerError,
			CannotOpenForWriting | CannotWrite | CannotRenamePartial => ErrorKind::WriteFailed,
			DiskFull => ErrorKind::DiskFull,
			_ => ErrorKind::Other,
		}
	}

	/// Transport-level failures: the worker that produced them must not be pooled
	pub fn is_fatal(self) -> bool {
		matches!(
			self,
			ErrorCode::ConnectionBroken
				| ErrorCode::WorkerDied
				| ErrorCode::CannotLaunchProcess
				| ErrorCode::ProtocolViolation
		)
	}
}

/// Terminal error of a job or worker operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobError {
	code: ErrorCode,
	text: String,
}

impl JobError {
	pub fn new(code: ErrorCode, text: impl Into<String>) -> Self {
		JobError { code, text: text.into() }
	}

	pub fn canceled() -> Self {
		JobError::new(ErrorCode::UserCanceled, "")
	}

	/// Map an I/O error on `path` to the closest code, `fallback` otherwise
	pub fn from_io(err: &io::Error, fallback: ErrorCode, path: impl Into<String>) -> Self {
		let code = match err.kind() {
			io::ErrorKind::NotFound => ErrorCode::DoesNotExist,
			io::ErrorKind::PermissionDenied => ErrorCode::AccessDenied,
			io::ErrorKind::AlreadyExists => ErrorCode::FileAlreadyExist,
			_ if err.raw_os_error() == Some(libc::ENOSPC) => ErrorCode::DiskFull,
			_ => fallback,
		};
		JobError::new(code, path)
	}

	pub fn code(&self) -> ErrorCode {
		self.code
	}

	pub fn kind(&self) -> ErrorKind {
		self.code.kind()
	}

	/// Raw text as reported by the worker (usually a URL or path)
	pub fn text(&self) -> &str {
		&self.text
	}

	pub fn is_fatal(&self) -> bool {
		self.code.is_fatal()
	}
}

impl fmt::Display for JobError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		use ErrorCode::*;
		let t = &self.text;
		match self.code {
			UserCanceled => write!(f, "Operation canceled"),
			CannotOpenForReading | CannotRead => write!(f, "Could not read {}.", t),
			CannotOpenForWriting => write!(f, "Could not write to {}.", t),
			CannotLaunchProcess => write!(f, "Could not start process {}.", t),
			Internal => write!(f, "Internal error: {}", t),
			MalformedUrl => write!(f, "Malformed URL {}.", t),
			UnsupportedProtocol => write!(f, "The protocol {} is not supported.", t),
			UnsupportedAction => write!(f, "{}", t),
			IsDirectory => write!(f, "{} is a folder, but a file was expected.", t),
			IsFile => write!(f, "{} is a file, but a folder was expected.", t),
			DoesNotExist => write!(f, "The file or folder {} does not exist.", t),
			FileAlreadyExist => write!(f, "A file named {} already exists.", t),
			DirAlreadyExist => write!(f, "A folder named {} already exists.", t),
			UnknownHost => write!(f, "Unknown host {}", t),
			AccessDenied => write!(f, "Access denied to {}.", t),
			WriteAccessDenied => write!(f, "Access denied. Could not write to {}.", t),
			CyclicLink => write!(f, "Found a cyclic link in {}.", t),
			CannotConnect => write!(f, "Could not connect to host {}.", t),
			ConnectionBroken => write!(f, "Connection to host {} is broken.", t),
			CannotWrite => write!(f, "Could not write to file {}.", t),
			CannotStat => write!(f, "Could not access {}.", t),
			CannotMkdir => write!(f, "Could not make folder {}.", t),
			CannotRmdir => write!(f, "Could not remove folder {}.", t),
			CannotResume => write!(f, "Could not resume file {}.", t),
			CannotRename => write!(f, "Could not rename file {}.", t),
			CannotChmod => write!(f, "Could not change permissions for {}.", t),
			CannotDelete => write!(f, "Could not delete file {}.", t),
			WorkerDied => write!(f, "The process for the {} protocol died unexpectedly.", t),
			CannotAuthenticate => write!(f, "Authorization failed for {}.", t),
			Aborted => write!(f, "Action aborted: {}", t),
			InternalServer => write!(f, "Internal error in server: {}", t),
			ServerTimeout => write!(f, "Timeout on server: {}", t),
			Unknown => write!(f, "Unknown error: {}", t),
			CannotRenamePartial => write!(f, "Could not rename partial file {}.", t),
			CannotSymlink => write!(f, "Could not create symlink {}.", t),
			DiskFull => write!(f, "Could not write file {}. Disk full.", t),
			CannotSeek => write!(f, "Could not seek in {}.", t),
			CannotSetTime => write!(f, "Setting modification time of {} failed.", t),
			ProtocolViolation => write!(f, "Protocol violation: {}", t),
		}
	}
}

impl Error for JobError {}

impl From<ConnectionError> for JobError {
	fn from(e: ConnectionError) -> Self {
		match e {
			ConnectionError::SpawnFailed { cmd, .. } => {
				JobError::new(ErrorCode::CannotLaunchProcess, cmd)
			}
			ConnectionError::HandshakeFailed { message } => {
				JobError::new(ErrorCode::CannotLaunchProcess, message)
			}
			ConnectionError::Protocol(e) => JobError::from(e),
			ConnectionError::Timeout => JobError::new(ErrorCode::WorkerDied, "timeout"),
			other => JobError::new(ErrorCode::ConnectionBroken, other.to_string()),
		}
	}
}

impl From<ProtocolError> for JobError {
	fn from(e: ProtocolError) -> Self {
		JobError::new(ErrorCode::ProtocolViolation, e.to_string())
	}
}

/// Transport errors
#[derive(Debug)]
pub enum ConnectionError {
	/// Worker process could not be spawned
	SpawnFailed { cmd: String, source: io::Error },

	/// Listening socket could not be created
	ListenFailed { address: PathBuf, source: io::Error },

	/// Connecting to an advertised address failed
	ConnectFailed { address: PathBuf, source: io::Error },

	/// Worker handshake failed
	HandshakeFailed { message: String },

	/// Malformed frame or unexpected command
	Protocol(ProtocolError),

	/// Connection closed or never established
	Disconnected,

	/// Operation timeout
	Timeout,

	/// I/O error on an established connection
	Io(io::Error),
}

impl fmt::Display for ConnectionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConnectionError::SpawnFailed { cmd, source } => {
				write!(f, "Failed to spawn '{}': {}", cmd, source)
			}
			ConnectionError::ListenFailed { address, source } => {
				write!(f, "Cannot listen on {}: {}", address.display(), source)
			}
			ConnectionError::ConnectFailed { address, source } => {
				write!(f, "Cannot connect to {}: {}", address.display(), source)
			}
			ConnectionError::HandshakeFailed { message } => {
				write!(f, "Handshake failed: {}", message)
			}
			ConnectionError::Protocol(e) => write!(f, "{}", e),
			ConnectionError::Disconnected => write!(f, "Connection closed"),
			ConnectionError::Timeout => write!(f, "Connection timeout"),
			ConnectionError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for ConnectionError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			ConnectionError::SpawnFailed { source, .. }
			| ConnectionError::ListenFailed { source, .. }
			| ConnectionError::ConnectFailed { source, .. } => Some(source),
			ConnectionError::Io(e) => Some(e),
			ConnectionError::Protocol(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for ConnectionError {
	fn from(e: io::Error) -> Self {
		match e.kind() {
			io::ErrorKind::BrokenPipe
			| io::ErrorKind::ConnectionReset
			| io::ErrorKind::UnexpectedEof => ConnectionError::Disconnected,
			_ => ConnectionError::Io(e),
		}
	}
}

impl From<ProtocolError> for ConnectionError {
	fn from(e: ProtocolError) -> Self {
		ConnectionError::Protocol(e)
	}
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
	Io { path: PathBuf, source: io::Error },
	Parse { path: PathBuf, message: String },
	InvalidValue { key: String, message: String },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::Io { path, source } => {
				write!(f, "Cannot read config {}: {}", path.display(), source)
			}
			ConfigError::Parse { path, message } => {
				write!(f, "Invalid config {}: {}", path.display(), message)
			}
			ConfigError::InvalidValue { key, message } => {
				write!(f, "Invalid value for {}: {}", key, message)
			}
		}
	}
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_raw_codes_follow_user_defined_offset() {
		assert_eq!(ErrorCode::UserCanceled.to_raw(), 1);
		assert_eq!(ErrorCode::CannotOpenForReading.to_raw(), 101);
		assert_eq!(ErrorCode::DoesNotExist.to_raw(), 111);
		assert_eq!(ErrorCode::WorkerDied.to_raw(), 143);
		assert_eq!(ErrorCode::DiskFull.to_raw(), 161);
		assert_eq!(ErrorCode::CyclicLink.to_raw(), 119);
	}

	#[test]
	fn test_raw_code_decoding() {
		for (code, _) in CODE_TABLE {
			assert_eq!(ErrorCode::from_raw(code.to_raw()), *code);
		}
		assert_eq!(ErrorCode::from_raw(1), ErrorCode::UserCanceled);
		assert_eq!(ErrorCode::from_raw(4242), ErrorCode::Unknown);
	}

	#[test]
	fn test_kinds() {
		assert_eq!(ErrorCode::FileAlreadyExist.kind(), ErrorKind::AlreadyExists);
		assert_eq!(ErrorCode::DirAlreadyExist.kind(), ErrorKind::AlreadyExists);
		assert_eq!(ErrorCode::DoesNotExist.kind(), ErrorKind::NotFound);
		assert_eq!(ErrorCode::UserCanceled.kind(), ErrorKind::UserCanceled);
		assert_eq!(ErrorCode::DiskFull.kind(), ErrorKind::DiskFull);
	}

	#[test]
	fn test_fatal_only_for_transport_codes() {
		assert!(ErrorCode::ConnectionBroken.is_fatal());
		assert!(ErrorCode::WorkerDied.is_fatal());
		assert!(!ErrorCode::DoesNotExist.is_fatal());
		assert!(!ErrorCode::AccessDenied.is_fatal());
	}

	#[test]
	fn test_from_io() {
		let err = io::Error::new(io::ErrorKind::NotFound, "gone");
		let job_err = JobError::from_io(&err, ErrorCode::CannotRead, "/tmp/x");
		assert_eq!(job_err.code(), ErrorCode::DoesNotExist);
		assert_eq!(job_err.to_string(), "The file or folder /tmp/x does not exist.");

		let err = io::Error::new(io::ErrorKind::Other, "weird");
		let job_err = JobError::from_io(&err, ErrorCode::CannotRead, "/tmp/x");
		assert_eq!(job_err.code(), ErrorCode::CannotRead);
	}

	#[test]
	fn test_connection_error_conversion() {
		let job_err: JobError = ConnectionError::Disconnected.into();
		assert_eq!(job_err.code(), ErrorCode::ConnectionBroken);
		assert!(job_err.is_fatal());
	}
}

// vim: ts=4
