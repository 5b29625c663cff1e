//! Session credential cache
//!
//! Workers store credentials that worked with `INF_CACHE_AUTH` and look them
//! up with `INF_CHECK_AUTH`, so a second worker for the same server does not
//! ask the user again. Entries are keyed by scheme, host, port and realm and
//! live as long as the scheduler; nothing is written to disk.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::logging::*;
use crate::protocol::messages::AuthInfo;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AuthKey {
	scheme: String,
	host: String,
	port: Option<u16>,
	realm: String,
}

impl AuthKey {
	fn of(info: &AuthInfo) -> Option<Self> {
		let url = info.url.as_ref()?;
		Some(AuthKey {
			scheme: url.scheme().to_string(),
			host: url.host_str().unwrap_or("").to_string(),
			port: url.port_or_known_default(),
			realm: info.realm_value.clone(),
		})
	}
}

#[derive(Default)]
pub struct AuthCache {
	entries: Mutex<HashMap<AuthKey, Vec<AuthInfo>>>,
}

impl AuthCache {
	pub fn new() -> Self {
		AuthCache::default()
	}

	fn entries(&self) -> MutexGuard<'_, HashMap<AuthKey, Vec<AuthInfo>>> {
		match self.entries.lock() {
			Ok(entries) => entries,
			Err(poisoned) => poisoned.into_inner(),
		}
	}

	/// Credentials matching `query`: same server and realm, same username
	/// when the query names one. The result is `query` with username and
	/// password filled in.
	pub fn lookup(&self, query: &AuthInfo) -> Option<AuthInfo> {
		let key = AuthKey::of(query)?;
		let entries = self.entries();
		let cached = entries.get(&key)?.iter().rev().find(|cached| covers(cached, query))?;
		trace!("Cached credentials for {}@{}", cached.username, key.host);
		let mut info = query.clone();
		info.username = cached.username.clone();
		info.password = cached.password.clone();
		Some(info)
	}

	/// Remember `info`, replacing earlier credentials of the same user
	pub fn store(&self, info: &AuthInfo) {
		let key = match AuthKey::of(info) {
			Some(key) => key,
			None => {
				debug!("Not caching credentials without a URL");
				return;
			}
		};
		debug!("Caching credentials for {}@{}", info.username, key.host);
		let mut entries = self.entries();
		let list = entries.entry(key).or_default();
		list.retain(|cached| cached.username != info.username);
		list.push(info.clone());
	}

	pub fn len(&self) -> usize {
		self.entries().values().map(Vec::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn clear(&self) {
		self.entries().clear();
	}
}

fn covers(cached: &AuthInfo, query: &AuthInfo) -> bool {
	if !query.username.is_empty() && cached.username != query.username {
		return false;
	}
	if !cached.verify_path {
		return true;
	}
	// Only the cached folder and what lies below it
	let base = cached.url.as_ref().map(|u| folder(u.path())).unwrap_or("/");
	let path = query.url.as_ref().map(|u| u.path()).unwrap_or("/");
	path.starts_with(base)
}

fn folder(path: &str) -> &str {
	match path.rfind('/') {
		Some(i) => &path[..=i],
		None => "/",
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use url::Url;

	fn info(url: &str, user: &str, password: &str) -> AuthInfo {
		AuthInfo {
			url: Some(Url::parse(url).unwrap()),
			username: user.into(),
			password: password.into(),
			..Default::default()
		}
	}

	#[test]
	fn test_lookup_by_server() {
		let cache = AuthCache::new();
		cache.store(&info("ftp://h/pub/a", "alice", "secret"));

		let found = cache.lookup(&info("ftp://h:21/other", "", "")).unwrap();
		assert_eq!(found.username, "alice");
		assert_eq!(found.password, "secret");
		assert_eq!(found.url.unwrap().path(), "/other");

		assert!(cache.lookup(&info("ftp://h2/pub/a", "", "")).is_none());
		assert!(cache.lookup(&info("sftp://h/pub/a", "", "")).is_none());
		assert!(cache.lookup(&info("ftp://h/pub/a", "bob", "")).is_none());
	}

	#[test]
	fn test_realms_are_separate() {
		let cache = AuthCache::new();
		let mut stored = info("http://h/", "alice", "secret");
		stored.realm_value = "admin".into();
		cache.store(&stored);

		assert!(cache.lookup(&info("http://h/", "", "")).is_none());
		let mut query = info("http://h/", "", "");
		query.realm_value = "admin".into();
		assert!(cache.lookup(&query).is_some());
	}

	#[test]
	fn test_verify_path_limits_to_folder() {
		let cache = AuthCache::new();
		let mut stored = info("http://h/private/index.html", "alice", "secret");
		stored.verify_path = true;
		cache.store(&stored);

		assert!(cache.lookup(&info("http://h/private/sub/x", "", "")).is_some());
		assert!(cache.lookup(&info("http://h/public/x", "", "")).is_none());
	}

	#[test]
	fn test_store_replaces_same_user() {
		let cache = AuthCache::new();
		cache.store(&info("ftp://h/", "alice", "old"));
		cache.store(&info("ftp://h/", "alice", "new"));
		cache.store(&info("ftp://h/", "bob", "other"));
		assert_eq!(cache.len(), 2);
		assert_eq!(cache.lookup(&info("ftp://h/", "alice", "")).unwrap().password, "new");

		// Without a URL there is nothing to key on
		cache.store(&AuthInfo::default());
		assert_eq!(cache.len(), 2);
		cache.clear();
		assert!(cache.is_empty());
	}
}

// vim: ts=4
