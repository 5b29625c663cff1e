//! Command and message codes
//!
//! A frame carries one of these codes in its header. `cmd` codes travel from
//! the application to a worker, `msg`/`inf` codes from a worker back to the
//! application. `MSG_DATA` is used in both directions.

/// Application to worker
pub mod cmd {
	pub const HOST: u8 = b'0';
	pub const CONNECT: u8 = b'1';
	pub const DISCONNECT: u8 = b'2';
	pub const SLAVE_STATUS: u8 = b'3';
	pub const SLAVE_CONNECT: u8 = b'4';
	pub const NONE: u8 = b'A';
	pub const GET: u8 = b'C';
	pub const PUT: u8 = b'D';
	pub const STAT: u8 = b'E';
	pub const MIMETYPE: u8 = b'F';
	pub const LISTDIR: u8 = b'G';
	pub const MKDIR: u8 = b'H';
	pub const RENAME: u8 = b'I';
	pub const COPY: u8 = b'J';
	pub const DEL: u8 = b'K';
	pub const CHMOD: u8 = b'L';
	pub const SPECIAL: u8 = b'M';
	pub const SETMODIFICATIONTIME: u8 = b'N';
	pub const REPARSECONFIGURATION: u8 = b'O';
	pub const META_DATA: u8 = b'P';
	pub const SYMLINK: u8 = b'Q';
	pub const MESSAGEBOXANSWER: u8 = b'S';
	pub const RESUMEANSWER: u8 = b'T';
	pub const CONFIG: u8 = b'U';
	pub const AUTHANSWER: u8 = b'V';
	pub const USE: u8 = b'W';
}

/// Worker to application: informational, never terminal
pub mod inf {
	pub const TOTAL_SIZE: u8 = 10;
	pub const PROCESSED_SIZE: u8 = 11;
	pub const SPEED: u8 = 12;
	pub const REDIRECTION: u8 = 20;
	pub const MIME_TYPE: u8 = 21;
	pub const WARNING: u8 = 23;
	pub const INFOMESSAGE: u8 = 26;
	pub const META_DATA: u8 = 27;
	pub const MESSAGEBOX: u8 = 28;
	/// Look up cached credentials; answered with CMD_AUTHANSWER
	pub const CHECK_AUTH: u8 = 40;
	/// Ask the user for credentials; answered with CMD_AUTHANSWER
	pub const AUTH_DIALOG: u8 = 41;
	/// Credentials that worked, for later lookups
	pub const CACHE_AUTH: u8 = 42;
}

/// Worker to application: data, entries and terminal messages
pub mod msg {
	pub const HELLO: u8 = 90;
	pub const READY: u8 = 91;
	pub const DATA: u8 = 100;
	pub const DATA_REQ: u8 = 101;
	pub const ERROR: u8 = 102;
	pub const CONNECTED: u8 = 103;
	pub const FINISHED: u8 = 104;
	pub const STAT_ENTRY: u8 = 105;
	pub const LIST_ENTRIES: u8 = 106;
	pub const RESUME: u8 = 108;
	pub const CANRESUME: u8 = 109;
	pub const WORKER_STATUS: u8 = 110;
}

/// Human readable name of a code, for logs
pub fn command_name(code: u8) -> &'static str {
	match code {
		cmd::HOST => "CMD_HOST",
		cmd::CONNECT => "CMD_CONNECT",
		cmd::DISCONNECT => "CMD_DISCONNECT",
		cmd::SLAVE_STATUS => "CMD_SLAVE_STATUS",
		cmd::SLAVE_CONNECT => "CMD_SLAVE_CONNECT",
		cmd::NONE => "CMD_NONE",
		cmd::GET => "CMD_GET",
		cmd::PUT => "CMD_PUT",
		cmd::STAT => "CMD_STAT",
		cmd::MIMETYPE => "CMD_MIMETYPE",
		cmd::LISTDIR => "CMD_LISTDIR",
		cmd::MKDIR => "CMD_MKDIR",
		cmd::RENAME => "CMD_RENAME",
		cmd::COPY => "CMD_COPY",
		cmd::DEL => "CMD_DEL",
		cmd::CHMOD => "CMD_CHMOD",
		cmd::SPECIAL => "CMD_SPECIAL",
		cmd::SETMODIFICATIONTIME => "CMD_SETMODIFICATIONTIME",
		cmd::REPARSECONFIGURATION => "CMD_REPARSECONFIGURATION",
		cmd::META_DATA => "CMD_META_DATA",
		cmd::SYMLINK => "CMD_SYMLINK",
		cmd::MESSAGEBOXANSWER => "CMD_MESSAGEBOXANSWER",
		cmd::RESUMEANSWER => "CMD_RESUMEANSWER",
		cmd::CONFIG => "CMD_CONFIG",
		cmd::AUTHANSWER => "CMD_AUTHANSWER",
		cmd::USE => "CMD_USE",
		inf::TOTAL_SIZE => "INF_TOTAL_SIZE",
		inf::PROCESSED_SIZE => "INF_PROCESSED_SIZE",
		inf::SPEED => "INF_SPEED",
		inf::REDIRECTION => "INF_REDIRECTION",
		inf::MIME_TYPE => "INF_MIME_TYPE",
		inf::WARNING => "INF_WARNING",
		inf::INFOMESSAGE => "INF_INFOMESSAGE",
		inf::META_DATA => "INF_META_DATA",
		inf::MESSAGEBOX => "INF_MESSAGEBOX",
		inf::CHECK_AUTH => "INF_CHECK_AUTH",
		inf::AUTH_DIALOG => "INF_AUTH_DIALOG",
		inf::CACHE_AUTH => "INF_CACHE_AUTH",
		msg::HELLO => "MSG_HELLO",
		msg::READY => "MSG_READY",
		msg::DATA => "MSG_DATA",
		msg::DATA_REQ => "MSG_DATA_REQ",
		msg::ERROR => "MSG_ERROR",
		msg::CONNECTED => "MSG_CONNECTED",
		msg::FINISHED => "MSG_FINISHED",
		msg::STAT_ENTRY => "MSG_STAT_ENTRY",
		msg::LIST_ENTRIES => "MSG_LIST_ENTRIES",
		msg::RESUME => "MSG_RESUME",
		msg::CANRESUME => "MSG_CANRESUME",
		msg::WORKER_STATUS => "MSG_WORKER_STATUS",
		_ => "UNKNOWN",
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_codes_fit_header() {
		// Header carries the code in two hex digits
		for code in [cmd::USE, msg::WORKER_STATUS, inf::MESSAGEBOX] {
			assert!(format!("{:2x}", code).len() == 2);
		}
	}

	#[test]
	fn test_names() {
		assert_eq!(command_name(cmd::GET), "CMD_GET");
		assert_eq!(command_name(msg::DATA), "MSG_DATA");
		assert_eq!(command_name(inf::AUTH_DIALOG), "INF_AUTH_DIALOG");
		assert_eq!(command_name(0xff), "UNKNOWN");
	}
}

// vim: ts=4
