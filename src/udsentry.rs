//! Directory entry records
//!
//! A [`UdsEntry`] is a sparse map from field id to a string or a 64 bit number.
//! The value type is baked into the id through tag bits, so the binary form
//! is self-describing: a receiver can decode fields it has no name for.
//!
//! Binary layout (big-endian):
//!
//! ```text
//! u32 field count
//! repeated: u32 id, then either u32 length + UTF-8 bytes (string tag)
//!           or i64 (number tag)
//! ```

use bytes::{Buf, BufMut};
use std::collections::BTreeMap;
use tracing::warn;

use crate::protocol::error::{ProtocolError, ProtocolResult};

pub const UDS_STRING: u32 = 0x0100_0000;
pub const UDS_NUMBER: u32 = 0x0200_0000;
pub const UDS_TIME: u32 = 0x0400_0000 | UDS_NUMBER;

/// Well-known field ids
pub mod field {
	use super::{UDS_NUMBER, UDS_STRING, UDS_TIME};

	pub const SIZE: u32 = 1 | UDS_NUMBER;
	pub const USER: u32 = 3 | UDS_STRING;
	pub const ICON_NAME: u32 = 4 | UDS_STRING;
	pub const GROUP: u32 = 5 | UDS_STRING;
	pub const NAME: u32 = 6 | UDS_STRING;
	pub const LOCAL_PATH: u32 = 7 | UDS_STRING;
	pub const HIDDEN: u32 = 8 | UDS_NUMBER;
	pub const ACCESS: u32 = 9 | UDS_NUMBER;
	pub const MODIFICATION_TIME: u32 = 10 | UDS_TIME;
	pub const ACCESS_TIME: u32 = 11 | UDS_TIME;
	pub const CREATION_TIME: u32 = 12 | UDS_TIME;
	pub const FILE_TYPE: u32 = 13 | UDS_NUMBER;
	pub const LINK_DEST: u32 = 14 | UDS_STRING;
	pub const URL: u32 = 15 | UDS_STRING;
	pub const MIME_TYPE: u32 = 16 | UDS_STRING;
	pub const GUESSED_MIME_TYPE: u32 = 17 | UDS_STRING;
	pub const DISPLAY_NAME: u32 = 22 | UDS_STRING;
	pub const TARGET_URL: u32 = 23 | UDS_STRING;
	pub const DISPLAY_TYPE: u32 = 24 | UDS_STRING;
	pub const COMMENT: u32 = 26 | UDS_STRING;
	pub const DEVICE_ID: u32 = 27 | UDS_NUMBER;
	pub const INODE: u32 = 28 | UDS_NUMBER;
	pub const RECURSIVE_SIZE: u32 = 29 | UDS_NUMBER;
	pub const LOCAL_USER_ID: u32 = 30 | UDS_NUMBER;
	pub const LOCAL_GROUP_ID: u32 = 31 | UDS_NUMBER;
	/// First of the protocol specific string fields
	pub const EXTRA: u32 = 100 | UDS_STRING;
	pub const EXTRA_END: u32 = 140 | UDS_STRING;
}

const FIELD_NAMES: &[(u32, &str)] = &[
	(field::SIZE, "SIZE"),
	(field::USER, "USER"),
	(field::ICON_NAME, "ICON_NAME"),
	(field::GROUP, "GROUP"),
	(field::NAME, "NAME"),
	(field::LOCAL_PATH, "LOCAL_PATH"),
	(field::HIDDEN, "HIDDEN"),
	(field::ACCESS, "ACCESS"),
	(field::MODIFICATION_TIME, "MODIFICATION_TIME"),
	(field::ACCESS_TIME, "ACCESS_TIME"),
	(field::CREATION_TIME, "CREATION_TIME"),
	(field::FILE_TYPE, "FILE_TYPE"),
	(field::LINK_DEST, "LINK_DEST"),
	(field::URL, "URL"),
	(field::MIME_TYPE, "MIME_TYPE"),
	(field::GUESSED_MIME_TYPE, "GUESSED_MIME_TYPE"),
	(field::DISPLAY_NAME, "DISPLAY_NAME"),
	(field::TARGET_URL, "TARGET_URL"),
	(field::DISPLAY_TYPE, "DISPLAY_TYPE"),
	(field::COMMENT, "COMMENT"),
	(field::DEVICE_ID, "DEVICE_ID"),
	(field::INODE, "INODE"),
	(field::RECURSIVE_SIZE, "RECURSIVE_SIZE"),
	(field::LOCAL_USER_ID, "LOCAL_USER_ID"),
	(field::LOCAL_GROUP_ID, "LOCAL_GROUP_ID"),
];

/// Debug name of a field id, e.g. `NAME` or `EXTRA+3`
pub fn field_name(id: u32) -> String {
	if let Some((_, name)) = FIELD_NAMES.iter().find(|(f, _)| *f == id) {
		return (*name).to_string();
	}
	if (field::EXTRA..=field::EXTRA_END).contains(&id) {
		return format!("EXTRA+{}", id - field::EXTRA);
	}
	format!("{:#x}", id)
}

/// File type bits as stored in `FILE_TYPE`
pub mod file_type {
	pub const DIRECTORY: i64 = libc::S_IFDIR as i64;
	pub const REGULAR: i64 = libc::S_IFREG as i64;
	pub const SYMLINK: i64 = libc::S_IFLNK as i64;
	pub const MASK: i64 = libc::S_IFMT as i64;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UdsValue {
	Str(String),
	Num(i64),
}

fn is_string_field(id: u32) -> bool {
	id & UDS_STRING != 0 && id & UDS_NUMBER == 0
}

fn is_number_field(id: u32) -> bool {
	id & UDS_NUMBER != 0 && id & UDS_STRING == 0
}

/// One file-system-like entry. Missing fields mean "unknown".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UdsEntry {
	fields: BTreeMap<u32, UdsValue>,
}

impl UdsEntry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Set a string field. Rejected (and logged) when `id` is not string typed.
	pub fn insert_str(&mut self, id: u32, value: impl Into<String>) -> bool {
		if !is_string_field(id) {
			warn!("UDS field {} is not a string field", field_name(id));
			return false;
		}
		self.fields.insert(id, UdsValue::Str(value.into()));
		true
	}

	/// Set a number field. Rejected (and logged) when `id` is not number typed.
	pub fn insert_num(&mut self, id: u32, value: i64) -> bool {
		if !is_number_field(id) {
			warn!("UDS field {} is not a number field", field_name(id));
			return false;
		}
		self.fields.insert(id, UdsValue::Num(value));
		true
	}

	pub fn string_value(&self, id: u32) -> Option<&str> {
		match self.fields.get(&id) {
			Some(UdsValue::Str(s)) => Some(s),
			_ => None,
		}
	}

	pub fn number_value(&self, id: u32) -> Option<i64> {
		match self.fields.get(&id) {
			Some(UdsValue::Num(n)) => Some(*n),
			_ => None,
		}
	}

	pub fn get(&self, id: u32) -> Option<&UdsValue> {
		self.fields.get(&id)
	}

	pub fn contains(&self, id: u32) -> bool {
		self.fields.contains_key(&id)
	}

	pub fn remove(&mut self, id: u32) -> Option<UdsValue> {
		self.fields.remove(&id)
	}

	pub fn count(&self) -> usize {
		self.fields.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	pub fn fields(&self) -> impl Iterator<Item = (u32, &UdsValue)> {
		self.fields.iter().map(|(id, v)| (*id, v))
	}

	pub fn name(&self) -> Option<&str> {
		self.string_value(field::NAME)
	}

	pub fn size(&self) -> Option<u64> {
		self.number_value(field::SIZE).map(|n| n.max(0) as u64)
	}

	pub fn is_dir(&self) -> bool {
		self.number_value(field::FILE_TYPE)
			.map(|t| t & file_type::MASK == file_type::DIRECTORY)
			.unwrap_or(false)
	}

	pub fn is_link(&self) -> bool {
		self.contains(field::LINK_DEST)
	}

	pub fn write_to(&self, out: &mut Vec<u8>) {
		out.put_u32(self.fields.len() as u32);
		for (id, value) in &self.fields {
			out.put_u32(*id);
			match value {
				UdsValue::Str(s) => {
					out.put_u32(s.len() as u32);
					out.put_slice(s.as_bytes());
				}
				UdsValue::Num(n) => out.put_i64(*n),
			}
		}
	}

	pub fn read_from(buf: &mut &[u8]) -> ProtocolResult<UdsEntry> {
		let count = read_u32(buf, "field count")?;
		let mut entry = UdsEntry::new();
		for _ in 0..count {
			let id = read_u32(buf, "field id")?;
			if is_string_field(id) {
				let len = read_u32(buf, "string length")? as usize;
				if buf.remaining() < len {
					return Err(truncated("string value"));
				}
				let bytes = buf[..len].to_vec();
				buf.advance(len);
				entry.fields.insert(id, UdsValue::Str(String::from_utf8(bytes)?));
			} else if is_number_field(id) {
				if buf.remaining() < 8 {
					return Err(truncated("number value"));
				}
				entry.fields.insert(id, UdsValue::Num(buf.get_i64()));
			} else {
				return Err(ProtocolError::MalformedPayload(format!(
					"UDS field {:#x} has no type tag",
					id
				)));
			}
		}
		Ok(entry)
	}

	pub fn to_bytes(&self) -> Vec<u8> {
		let mut out = Vec::new();
		self.write_to(&mut out);
		out
	}

	pub fn from_bytes(data: &[u8]) -> ProtocolResult<UdsEntry> {
		let mut buf = data;
		let entry = UdsEntry::read_from(&mut buf)?;
		if buf.has_remaining() {
			return Err(ProtocolError::MalformedPayload(format!(
				"{} trailing bytes after entry",
				buf.remaining()
			)));
		}
		Ok(entry)
	}
}

fn truncated(what: &str) -> ProtocolError {
	ProtocolError::MalformedPayload(format!("truncated {}", what))
}

fn read_u32(buf: &mut &[u8], what: &str) -> ProtocolResult<u32> {
	if buf.remaining() < 4 {
		return Err(truncated(what));
	}
	Ok(buf.get_u32())
}

/// Encode a batch of entries: u32 count followed by the entries
pub fn encode_entries(entries: &[UdsEntry]) -> Vec<u8> {
	let mut out = Vec::new();
	out.put_u32(entries.len() as u32);
	for entry in entries {
		entry.write_to(&mut out);
	}
	out
}

pub fn decode_entries(data: &[u8]) -> ProtocolResult<Vec<UdsEntry>> {
	let mut buf = data;
	let count = read_u32(&mut buf, "entry count")?;
	let mut entries = Vec::with_capacity(count.min(1024) as usize);
	for _ in 0..count {
		entries.push(UdsEntry::read_from(&mut buf)?);
	}
	Ok(entries)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample(order_reversed: bool) -> UdsEntry {
		let mut fields: Vec<(u32, UdsValue)> = vec![
			(field::NAME, UdsValue::Str("report.txt".into())),
			(field::SIZE, UdsValue::Num(1234)),
			(field::FILE_TYPE, UdsValue::Num(file_type::REGULAR)),
			(field::MODIFICATION_TIME, UdsValue::Num(1_700_000_000)),
			(field::USER, UdsValue::Str("alice".into())),
			(field::EXTRA + 2, UdsValue::Str("x-custom".into())),
		];
		if order_reversed {
			fields.reverse();
		}
		let mut entry = UdsEntry::new();
		for (id, value) in fields {
			match value {
				UdsValue::Str(s) => assert!(entry.insert_str(id, s)),
				UdsValue::Num(n) => assert!(entry.insert_num(id, n)),
			}
		}
		entry
	}

	#[test]
	fn test_insert_overwrites() {
		let mut entry = UdsEntry::new();
		entry.insert_str(field::NAME, "a");
		entry.insert_str(field::NAME, "b");
		assert_eq!(entry.count(), 1);
		assert_eq!(entry.name(), Some("b"));
	}

	#[test]
	fn test_type_tag_enforced() {
		let mut entry = UdsEntry::new();
		assert!(!entry.insert_num(field::NAME, 5));
		assert!(!entry.insert_str(field::SIZE, "5"));
		assert!(entry.is_empty());
		assert_eq!(entry.number_value(field::NAME), None);
	}

	#[test]
	fn test_serialization_preserves_fields_for_any_insertion_order() {
		for reversed in [false, true] {
			let entry = sample(reversed);
			let decoded = UdsEntry::from_bytes(&entry.to_bytes()).unwrap();
			assert_eq!(decoded.count(), 6);
			for (id, value) in entry.fields() {
				assert_eq!(decoded.get(id), Some(value), "field {}", field_name(id));
			}
		}
	}

	#[test]
	fn test_unknown_field_with_known_tag_survives() {
		let mut entry = UdsEntry::new();
		entry.insert_num(77 | UDS_NUMBER, -3);
		entry.insert_str(78 | UDS_STRING, "");
		let decoded = UdsEntry::from_bytes(&entry.to_bytes()).unwrap();
		assert_eq!(decoded.number_value(77 | UDS_NUMBER), Some(-3));
		assert_eq!(decoded.string_value(78 | UDS_STRING), Some(""));
	}

	#[test]
	fn test_untagged_field_rejected() {
		let mut data = Vec::new();
		data.put_u32(1);
		data.put_u32(42);
		data.put_i64(0);
		assert!(UdsEntry::from_bytes(&data).is_err());
	}

	#[test]
	fn test_truncated_entry_rejected() {
		let bytes = sample(false).to_bytes();
		assert!(UdsEntry::from_bytes(&bytes[..bytes.len() - 3]).is_err());
	}

	#[test]
	fn test_entry_batches() {
		let entries = vec![sample(false), UdsEntry::new(), sample(true)];
		let decoded = decode_entries(&encode_entries(&entries)).unwrap();
		assert_eq!(decoded, entries);
	}

	#[test]
	fn test_helpers() {
		let mut entry = UdsEntry::new();
		entry.insert_num(field::FILE_TYPE, file_type::DIRECTORY);
		assert!(entry.is_dir());
		assert!(!entry.is_link());
		entry.insert_str(field::LINK_DEST, "/elsewhere");
		assert!(entry.is_link());
		assert_eq!(field_name(field::NAME), "NAME");
		assert_eq!(field_name(field::EXTRA + 5), "EXTRA+5");
	}
}

// vim: ts=4
