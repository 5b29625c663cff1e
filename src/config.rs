//! Configuration for iorelay
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (~/.config/iorelay/config.toml or config.json5)
//! 3. Environment variables (IORELAY_* prefix)
//! 4. CLI flags (highest priority)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::logging::*;
use crate::metadata::MetaData;

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// Worker spawning, pooling and limits
	pub scheduler: SchedulerConfig,

	/// Per-protocol overrides, keyed by URL scheme
	pub protocols: BTreeMap<String, ProtocolConfig>,

	/// Log level (trace, debug, info, warn, error) when RUST_LOG is unset
	pub log_level: String,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			scheduler: SchedulerConfig::default(),
			protocols: BTreeMap::new(),
			log_level: "info".to_string(),
		}
	}
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
	/// Launch workers as child processes or as threads of this process
	pub launch_mode: LaunchMode,

	/// Binary executed for process workers (defaults to the current executable)
	pub worker_binary: Option<PathBuf>,

	/// Directory for worker sockets (defaults to $XDG_RUNTIME_DIR, else the temp dir)
	pub socket_dir: Option<PathBuf>,

	/// Concurrently running jobs per protocol
	pub max_workers: usize,

	/// Concurrently running jobs per (protocol, host)
	pub max_workers_per_host: usize,

	/// Idle workers kept per pool key
	pub max_idle_per_key: usize,

	/// Which idle worker to drop when a pool key is over its cap
	pub idle_eviction: IdleEviction,

	/// Idle workers older than this are terminated by the reaper
	pub max_idle_lifetime_secs: u64,

	/// How often the reaper scans the idle pool
	pub reaper_interval_secs: u64,

	/// Bound on spawn + handshake
	pub connect_timeout_secs: u64,

	/// Resume partial uploads without asking
	pub auto_resume: bool,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		SchedulerConfig {
			launch_mode: LaunchMode::Process,
			worker_binary: None,
			socket_dir: None,
			max_workers: 10,
			max_workers_per_host: 3,
			max_idle_per_key: 2,
			idle_eviction: IdleEviction::Oldest,
			max_idle_lifetime_secs: 180,
			reaper_interval_secs: 90,
			connect_timeout_secs: 10,
			auto_resume: true,
		}
	}
}

impl SchedulerConfig {
	pub fn connect_timeout(&self) -> Duration {
		Duration::from_secs(self.connect_timeout_secs)
	}

	pub fn max_idle_lifetime(&self) -> Duration {
		Duration::from_secs(self.max_idle_lifetime_secs)
	}

	pub fn reaper_interval(&self) -> Duration {
		Duration::from_secs(self.reaper_interval_secs.max(1))
	}

	pub fn socket_dir(&self) -> PathBuf {
		self.socket_dir.clone().unwrap_or_else(|| {
			std::env::var_os("XDG_RUNTIME_DIR")
				.map(PathBuf::from)
				.filter(|p| p.is_dir())
				.unwrap_or_else(std::env::temp_dir)
		})
	}

	pub fn worker_binary(&self) -> Result<PathBuf, ConfigError> {
		match &self.worker_binary {
			Some(path) => Ok(path.clone()),
			None => std::env::current_exe()
				.map_err(|source| ConfigError::Io { path: PathBuf::from("<current exe>"), source }),
		}
	}
}

/// Per-protocol overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProtocolConfig {
	pub max_workers: Option<usize>,
	pub max_workers_per_host: Option<usize>,
	pub poolable: Option<bool>,

	/// Forwarded to the worker with CMD_CONFIG (e.g. MarkPartial, MinimumKeepSize)
	pub settings: BTreeMap<String, String>,
}

// ============================================================================
// ENUMERATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchMode {
	#[default]
	Process,
	InProcess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IdleEviction {
	#[default]
	Oldest,
	Newest,
}

impl std::str::FromStr for LaunchMode {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim() {
			"process" => Ok(LaunchMode::Process),
			"in-process" => Ok(LaunchMode::InProcess),
			other => Err(ConfigError::InvalidValue {
				key: "launchMode".to_string(),
				message: format!("expected 'process' or 'in-process', got '{}'", other),
			}),
		}
	}
}

// ============================================================================
// LOADING
// ============================================================================

impl Config {
	/// Load a config file: `.toml` files are TOML, anything else JSON5
	pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
		let text = std::fs::read_to_string(path)
			.map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;

		let parse_error =
			|message: String| ConfigError::Parse { path: path.to_path_buf(), message };
		let config = match path.extension().and_then(|e| e.to_str()) {
			Some("toml") => toml::from_str(&text).map_err(|e| parse_error(e.to_string()))?,
			_ => json5::from_str(&text).map_err(|e| parse_error(e.to_string()))?,
		};
		debug!("Loaded config from {}", path.display());
		Ok(config)
	}

	/// Explicit path if given, otherwise the first default location that
	/// exists, otherwise built-in defaults. Environment overrides apply last.
	pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
		let mut config = match explicit {
			Some(path) => Config::from_file(path)?,
			None => match Config::default_paths().into_iter().find(|p| p.is_file()) {
				Some(path) => Config::from_file(&path)?,
				None => Config::default(),
			},
		};
		config.apply_env(|key| std::env::var(key).ok())?;
		Ok(config)
	}

	fn default_paths() -> Vec<PathBuf> {
		let base = std::env::var_os("XDG_CONFIG_HOME")
			.map(PathBuf::from)
			.or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")));
		match base {
			Some(base) => {
				let dir = base.join("iorelay");
				vec![dir.join("config.toml"), dir.join("config.json5"), dir.join("config.json")]
			}
			None => vec![],
		}
	}

	/// Apply IORELAY_* overrides. `lookup` is the environment in production.
	pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(mode) = lookup("IORELAY_LAUNCH_MODE") {
			self.scheduler.launch_mode = mode.parse()?;
		}
		if let Some(binary) = lookup("IORELAY_WORKER_BINARY") {
			self.scheduler.worker_binary = Some(PathBuf::from(binary));
		}
		if let Some(dir) = lookup("IORELAY_SOCKET_DIR") {
			self.scheduler.socket_dir = Some(PathBuf::from(dir));
		}
		if let Some(max) = lookup("IORELAY_MAX_WORKERS") {
			self.scheduler.max_workers =
				max.trim().parse().map_err(|e| ConfigError::InvalidValue {
					key: "IORELAY_MAX_WORKERS".to_string(),
					message: format!("{}", e),
				})?;
		}
		Ok(())
	}

	pub fn protocol(&self, name: &str) -> Option<&ProtocolConfig> {
		self.protocols.get(name)
	}

	/// Settings forwarded to a worker of `protocol` with CMD_CONFIG
	pub fn worker_settings(&self, protocol: &str) -> MetaData {
		self.protocol(protocol)
			.map(|p| p.settings.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect())
			.unwrap_or_default()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	#[test]
	fn test_config_default() {
		let config = Config::default();
		assert_eq!(config.scheduler.launch_mode, LaunchMode::Process);
		assert_eq!(config.scheduler.max_workers, 10);
		assert_eq!(config.scheduler.max_workers_per_host, 3);
		assert_eq!(config.scheduler.max_idle_per_key, 2);
		assert_eq!(config.scheduler.idle_eviction, IdleEviction::Oldest);
		assert!(config.scheduler.auto_resume);
		assert_eq!(config.log_level, "info");
	}

	#[test]
	fn test_config_serialization() {
		let config = Config::default();
		let json = serde_json::to_string(&config).expect("Failed to serialize");
		assert!(json.contains("\"maxIdlePerKey\""));
		let deserialized: Config = serde_json::from_str(&json).expect("Failed to deserialize");
		assert_eq!(config.scheduler.max_workers, deserialized.scheduler.max_workers);
	}

	#[test]
	fn test_partial_json5_keeps_defaults() {
		let config: Config = json5::from_str(
			r#"{
				// comments are fine
				scheduler: { launchMode: "in-process", idleEviction: "newest" },
				protocols: { file: { settings: { MarkPartial: "false" } } },
			}"#,
		)
		.unwrap();
		assert_eq!(config.scheduler.launch_mode, LaunchMode::InProcess);
		assert_eq!(config.scheduler.idle_eviction, IdleEviction::Newest);
		assert_eq!(config.scheduler.max_workers, 10);
		assert_eq!(config.worker_settings("file").get("MarkPartial"), Some("false"));
		assert!(config.worker_settings("ftp").is_empty());
	}

	#[test]
	fn test_env_overrides() {
		let env: HashMap<&str, &str> =
			vec![("IORELAY_LAUNCH_MODE", "in-process"), ("IORELAY_MAX_WORKERS", "4")]
				.into_iter()
				.collect();
		let mut config = Config::default();
		config.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
		assert_eq!(config.scheduler.launch_mode, LaunchMode::InProcess);
		assert_eq!(config.scheduler.max_workers, 4);
	}

	#[test]
	fn test_invalid_env_value() {
		let mut config = Config::default();
		let result = config.apply_env(|k| {
			if k == "IORELAY_LAUNCH_MODE" {
				Some("sideways".to_string())
			} else {
				None
			}
		});
		assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
	}
}

// vim: ts=4
