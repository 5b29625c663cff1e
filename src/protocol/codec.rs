//! Frame codec
//!
//! Every frame starts with a 10 byte ASCII header followed by the payload:
//!
//! ```text
//! "%6x" length | '_' or '+' | "%2x" command | '_'
//! ```
//!
//! The length and command are lowercase hex, space padded on the left. A `+`
//! separator marks a frame that is continued by the next frame carrying the
//! same command; the last frame of a logical command uses `_`. Reassembly of
//! continued frames happens in [`super::connection::Connection`], the codec
//! only deals with single frames.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::error::ProtocolError;

/// Header length in bytes
pub const HEADER_SIZE: usize = 10;

/// Largest payload of a single frame produced by `send_command`
pub const STANDARD_BUFFER_SIZE: usize = 32 * 1024;

/// Largest payload the 6 hex digit header can describe
pub const MAX_FRAME_PAYLOAD: usize = 0xff_ffff;

const SEP_LAST: u8 = b'_';
const SEP_MORE: u8 = b'+';

/// One frame as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
	pub cmd: u8,
	/// Another frame with the same command follows
	pub more: bool,
	pub payload: Vec<u8>,
}

impl Frame {
	pub fn new(cmd: u8, payload: Vec<u8>) -> Self {
		Frame { cmd, more: false, payload }
	}
}

fn parse_hex_field(field: &[u8], what: &str) -> Result<usize, ProtocolError> {
	let text = std::str::from_utf8(field)
		.map_err(|_| ProtocolError::MalformedHeader(format!("{} is not ASCII", what)))?;
	let trimmed = text.trim_start();
	if trimmed.is_empty() {
		return Err(ProtocolError::MalformedHeader(format!("{} is empty", what)));
	}
	usize::from_str_radix(trimmed, 16)
		.map_err(|e| ProtocolError::MalformedHeader(format!("{} '{}': {}", what, text, e)))
}

/// Parse a header into (payload length, more, command)
pub fn decode_header(header: &[u8]) -> Result<(usize, bool, u8), ProtocolError> {
	if header.len() < HEADER_SIZE {
		return Err(ProtocolError::MalformedHeader(format!("short header ({} bytes)", header.len())));
	}
	let len = parse_hex_field(&header[0..6], "length")?;
	let more = match header[6] {
		SEP_LAST => false,
		SEP_MORE => true,
		other => {
			return Err(ProtocolError::MalformedHeader(format!(
				"bad separator {:?}",
				other as char
			)))
		}
	};
	let cmd = parse_hex_field(&header[7..9], "command")?;
	if header[9] != SEP_LAST {
		return Err(ProtocolError::MalformedHeader("missing trailing separator".to_string()));
	}
	Ok((len, more, cmd as u8))
}

/// Render a header for the given payload length and command
pub fn encode_header(len: usize, more: bool, cmd: u8) -> Result<[u8; HEADER_SIZE], ProtocolError> {
	if len > MAX_FRAME_PAYLOAD {
		return Err(ProtocolError::ProtocolViolation(format!(
			"frame payload {} exceeds {}",
			len, MAX_FRAME_PAYLOAD
		)));
	}
	let sep = if more { SEP_MORE } else { SEP_LAST } as char;
	let text = format!("{:6x}{}{:2x}_", len, sep, cmd);
	let mut header = [0u8; HEADER_SIZE];
	header.copy_from_slice(text.as_bytes());
	Ok(header)
}

/// Codec turning a byte stream into [`Frame`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
	type Item = Frame;
	type Error = ProtocolError;

	fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
		if src.len() < HEADER_SIZE {
			return Ok(None);
		}

		let (len, more, cmd) = decode_header(&src[..HEADER_SIZE])?;
		let total = HEADER_SIZE + len;
		if src.len() < total {
			src.reserve(total - src.len());
			return Ok(None);
		}

		src.advance(HEADER_SIZE);
		let payload = src.split_to(len).to_vec();
		Ok(Some(Frame { cmd, more, payload }))
	}
}

impl Encoder<Frame> for FrameCodec {
	type Error = ProtocolError;

	fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ProtocolError> {
		let header = encode_header(frame.payload.len(), frame.more, frame.cmd)?;
		dst.reserve(HEADER_SIZE + frame.payload.len());
		dst.put_slice(&header);
		dst.put_slice(&frame.payload);
		Ok(())
	}
}


// vim: ts=4
