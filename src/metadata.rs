//! Job metadata
//!
//! String to string side channel between a job and its worker (request
//! headers, resume offsets, cache hints). Keys are case sensitive and kept in
//! sorted order; inserting an existing key replaces its value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::iter::FromIterator;
use std::ops::AddAssign;

use crate::protocol::error::ProtocolResult;

/// Metadata key carrying the byte offset a get should start from
pub const RANGE_START: &str = "range-start";
/// Older spelling of [`RANGE_START`], still honoured by workers
pub const RESUME: &str = "resume";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaData(BTreeMap<String, String>);

impl MetaData {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
		self.0.insert(key.into(), value.into());
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self.0.get(key).map(|s| s.as_str())
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.0.contains_key(key)
	}

	pub fn remove(&mut self, key: &str) -> Option<String> {
		self.0.remove(key)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn clear(&mut self) {
		self.0.clear()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	/// Merge another map: overlapping keys take the new value
	pub fn merge(&mut self, other: &MetaData) {
		for (k, v) in &other.0 {
			self.0.insert(k.clone(), v.clone());
		}
	}

	/// Parse a numeric value, e.g. a resume offset
	pub fn get_u64(&self, key: &str) -> Option<u64> {
		self.get(key).and_then(|v| v.trim().parse().ok())
	}

	/// Boolean in the loose "true"/"false" sense workers use for config values
	pub fn get_bool(&self, key: &str) -> Option<bool> {
		self.get(key).map(|v| {
			matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
		})
	}

	pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
		Ok(serde_json::to_vec(self)?)
	}

	pub fn decode(data: &[u8]) -> ProtocolResult<MetaData> {
		Ok(serde_json::from_slice(data)?)
	}
}

impl AddAssign<&MetaData> for MetaData {
	fn add_assign(&mut self, other: &MetaData) {
		self.merge(other);
	}
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MetaData {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		MetaData(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_overrides_and_unions() {
		let mut base: MetaData = vec![("a", "1"), ("b", "2")].into_iter().collect();
		let update: MetaData = vec![("b", "20"), ("c", "3")].into_iter().collect();
		base += &update;
		assert_eq!(base.len(), 3);
		assert_eq!(base.get("a"), Some("1"));
		assert_eq!(base.get("b"), Some("20"));
		assert_eq!(base.get("c"), Some("3"));
	}

	#[test]
	fn test_keys_are_case_sensitive() {
		let mut md = MetaData::new();
		md.insert("Cookie", "x");
		md.insert("cookie", "y");
		assert_eq!(md.len(), 2);
	}

	#[test]
	fn test_typed_getters() {
		let md: MetaData = vec![("size", " 42 "), ("flag", "Yes"), ("off", "false"), ("bad", "x")].into_iter().collect();
		assert_eq!(md.get_u64("size"), Some(42));
		assert_eq!(md.get_u64("bad"), None);
		assert_eq!(md.get_u64("missing"), None);
		assert_eq!(md.get_bool("flag"), Some(true));
		assert_eq!(md.get_bool("off"), Some(false));
		assert_eq!(md.get_bool("missing"), None);
	}

	#[test]
	fn test_wire_roundtrip() {
		let md: MetaData = vec![(RANGE_START, "6")].into_iter().collect();
		assert_eq!(MetaData::decode(&md.encode().unwrap()).unwrap(), md);
	}
}

// vim: ts=4
