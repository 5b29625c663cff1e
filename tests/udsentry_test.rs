//! Integration tests for the UDSEntry wire format

use iorelay::udsentry::{decode_entries, encode_entries, field, file_type, UdsValue, UDS_NUMBER, UDS_STRING};
use iorelay::UdsEntry;

fn sample(name: &str, reversed: bool) -> UdsEntry {
	let mut fields: Vec<(u32, UdsValue)> = vec![
		(field::NAME, UdsValue::Str(name.to_string())),
		(field::SIZE, UdsValue::Num(1_234_567_890_123)),
		(field::FILE_TYPE, UdsValue::Num(file_type::REGULAR)),
		(field::ACCESS, UdsValue::Num(0o644)),
		(field::MODIFICATION_TIME, UdsValue::Num(-5)),
		(field::GUESSED_MIME_TYPE, UdsValue::Str("text/plain".to_string())),
		(field::LINK_DEST, UdsValue::Str("üñí/ċødé".to_string())),
	];
	if reversed {
		fields.reverse();
	}
	let mut entry = UdsEntry::new();
	for (id, value) in fields {
		match value {
			UdsValue::Str(s) => entry.insert_str(id, s),
			UdsValue::Num(n) => entry.insert_num(id, n),
		};
	}
	entry
}

#[test]
fn test_round_trip_independent_of_insertion_order() {
	let forward = sample("a.txt", false);
	let backward = sample("a.txt", true);
	assert_eq!(forward, backward);

	let decoded = UdsEntry::from_bytes(&backward.to_bytes()).unwrap();
	assert_eq!(decoded.count(), 7);
	for (id, value) in forward.fields() {
		assert_eq!(decoded.get(id), Some(value));
	}
	assert_eq!(decoded.size(), Some(1_234_567_890_123));
	assert!(!decoded.is_dir());
}

#[test]
fn test_field_type_follows_tag_bits() {
	let mut entry = UdsEntry::new();
	assert!(!entry.insert_num(field::NAME, 3));
	assert!(!entry.insert_str(field::SIZE, "3"));
	assert!(entry.is_empty());
	assert_ne!(field::NAME & UDS_STRING, 0);
	assert_ne!(field::SIZE & UDS_NUMBER, 0);
}

#[test]
fn test_extra_fields_survive() {
	let mut entry = UdsEntry::new();
	entry.insert_str(field::EXTRA, "custom");
	entry.insert_str(field::EXTRA + 1, "another");
	let decoded = UdsEntry::from_bytes(&entry.to_bytes()).unwrap();
	assert_eq!(decoded.string_value(field::EXTRA + 1), Some("another"));
}

#[test]
fn test_batches_and_truncation() {
	let entries: Vec<UdsEntry> = (0..50).map(|i| sample(&format!("f{}", i), i % 2 == 0)).collect();
	let data = encode_entries(&entries);
	assert_eq!(decode_entries(&data).unwrap(), entries);

	assert!(decode_entries(&data[..data.len() - 3]).is_err());
	assert!(decode_entries(&encode_entries(&[])).unwrap().is_empty());
	assert!(decode_entries(&[]).is_err());
}

// vim: ts=4
