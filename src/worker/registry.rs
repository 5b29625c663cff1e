//! Table of protocol implementations keyed by URL scheme

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::file::FileProtocol;
use super::WorkerProtocol;
use crate::config::Config;

pub type ProtocolFactory = Arc<dyn Fn() -> Box<dyn WorkerProtocol> + Send + Sync>;

/// Static description of one protocol
#[derive(Clone)]
pub struct ProtocolInfo {
	pub name: String,
	/// Workers may be reused by later jobs with the same pool key
	pub poolable: bool,
	pub max_workers: usize,
	pub max_workers_per_host: usize,
	/// The worker implements CMD_COPY within the protocol
	pub supports_copy: bool,
	pub factory: ProtocolFactory,
}

impl ProtocolInfo {
	pub fn new<F>(name: &str, factory: F) -> Self
	where
		F: Fn() -> Box<dyn WorkerProtocol> + Send + Sync + 'static,
	{
		ProtocolInfo {
			name: name.to_string(),
			poolable: true,
			max_workers: 10,
			max_workers_per_host: 3,
			supports_copy: false,
			factory: Arc::new(factory),
		}
	}

	pub fn poolable(mut self, poolable: bool) -> Self {
		self.poolable = poolable;
		self
	}

	pub fn supports_copy(mut self, supports_copy: bool) -> Self {
		self.supports_copy = supports_copy;
		self
	}

	pub fn limits(mut self, max_workers: usize, max_workers_per_host: usize) -> Self {
		self.max_workers = max_workers;
		self.max_workers_per_host = max_workers_per_host;
		self
	}

	pub fn create(&self) -> Box<dyn WorkerProtocol> {
		(self.factory)()
	}
}

impl fmt::Debug for ProtocolInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProtocolInfo")
			.field("name", &self.name)
			.field("poolable", &self.poolable)
			.field("max_workers", &self.max_workers)
			.field("max_workers_per_host", &self.max_workers_per_host)
			.field("supports_copy", &self.supports_copy)
			.finish()
	}
}

#[derive(Clone, Debug, Default)]
pub struct ProtocolRegistry {
	protocols: BTreeMap<String, ProtocolInfo>,
}

impl ProtocolRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Protocols compiled into this binary
	pub fn builtin() -> Self {
		let mut registry = ProtocolRegistry::new();
		registry.register(
			ProtocolInfo::new("file", || Box::new(FileProtocol::new()))
				.supports_copy(true)
				.limits(10, 10),
		);
		registry
	}

	/// Add or replace a protocol
	pub fn register(&mut self, info: ProtocolInfo) {
		self.protocols.insert(info.name.clone(), info);
	}

	pub fn get(&self, scheme: &str) -> Option<&ProtocolInfo> {
		self.protocols.get(scheme)
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.protocols.keys().map(|k| k.as_str())
	}

	/// Fold per-protocol overrides from the configuration into the table.
	/// Global limits apply where a protocol has no override of its own.
	pub fn apply_config(&mut self, config: &Config) {
		for info in self.protocols.values_mut() {
			info.max_workers = info.max_workers.min(config.scheduler.max_workers);
			info.max_workers_per_host =
				info.max_workers_per_host.min(config.scheduler.max_workers_per_host.max(1));
			if let Some(overrides) = config.protocol(&info.name) {
				if let Some(n) = overrides.max_workers {
					info.max_workers = n;
				}
				if let Some(n) = overrides.max_workers_per_host {
					info.max_workers_per_host = n;
				}
				if let Some(p) = overrides.poolable {
					info.poolable = p;
				}
			}
			info.max_workers = info.max_workers.max(1);
			info.max_workers_per_host = info.max_workers_per_host.max(1).min(info.max_workers);
		}
	}
}


// vim: ts=4
