//! Protocol error types
//!
//! Errors raised while decoding frames, payloads and handshake messages.

use std::fmt;
use std::io;

/// Protocol error type
#[derive(Debug)]
pub enum ProtocolError {
	/// I/O error from async operations
	Io(io::Error),
	/// Frame header could not be parsed
	MalformedHeader(String),
	/// JSON payload decode error
	Json(String),
	/// Binary payload was truncated or inconsistent
	MalformedPayload(String),
	/// Command arrived that the current state does not accept
	UnexpectedCommand { expected: &'static str, got: u8 },
	/// Handshake message in the wrong format
	InvalidVersionFormat(String),
	/// Peers share no protocol version
	NoCommonVersion { offered: Vec<u32> },
	/// Protocol violation (unexpected format or state)
	ProtocolViolation(String),
}

impl fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtocolError::Io(e) => write!(f, "I/O error: {}", e),
			ProtocolError::MalformedHeader(msg) => write!(f, "Malformed frame header: {}", msg),
			ProtocolError::Json(msg) => write!(f, "JSON decode error: {}", msg),
			ProtocolError::MalformedPayload(msg) => write!(f, "Malformed payload: {}", msg),
			ProtocolError::UnexpectedCommand { expected, got } => {
				write!(f, "Expected {}, got command {:#04x}", expected, got)
			}
			ProtocolError::InvalidVersionFormat(msg) => {
				write!(f, "Invalid version format: {}", msg)
			}
			ProtocolError::NoCommonVersion { offered } => {
				write!(f, "No common protocol version (peer offered {:?})", offered)
			}
			ProtocolError::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
		}
	}
}

impl std::error::Error for ProtocolError {}

// From implementations for automatic conversion
impl From<io::Error> for ProtocolError {
	fn from(e: io::Error) -> Self {
		ProtocolError::Io(e)
	}
}

impl From<serde_json::Error> for ProtocolError {
	fn from(e: serde_json::Error) -> Self {
		ProtocolError::Json(e.to_string())
	}
}

impl From<std::string::FromUtf8Error> for ProtocolError {
	fn from(e: std::string::FromUtf8Error) -> Self {
		ProtocolError::MalformedPayload(e.to_string())
	}
}

/// Result alias used by the codec and payload decoders
pub type ProtocolResult<T> = Result<T, ProtocolError>;

// vim: ts=4
