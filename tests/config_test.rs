//! Integration tests for configuration files

use std::io::Write;
use tempfile::{Builder, TempDir};
use url::Url;

use iorelay::config::{IdleEviction, LaunchMode};
use iorelay::{Config, ConfigError, Job, JobOptions, Scheduler};

#[test]
fn test_load_toml_file() {
	let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
	writeln!(
		file,
		r#"
logLevel = "debug"

[scheduler]
launchMode = "in-process"
maxWorkersPerHost = 1
idleEviction = "newest"

[protocols.file]
maxWorkers = 4

[protocols.file.settings]
MinimumKeepSize = "0"
"#
	)
	.unwrap();

	let config = Config::load(Some(file.path())).unwrap();
	assert_eq!(config.log_level, "debug");
	assert_eq!(config.scheduler.launch_mode, LaunchMode::InProcess);
	assert_eq!(config.scheduler.max_workers_per_host, 1);
	assert_eq!(config.scheduler.idle_eviction, IdleEviction::Newest);
	assert_eq!(config.protocol("file").and_then(|p| p.max_workers), Some(4));
	assert_eq!(config.worker_settings("file").get("MinimumKeepSize"), Some("0"));
}

#[test]
fn test_load_json5_file() {
	let mut file = Builder::new().suffix(".json5").tempfile().unwrap();
	file.write_all(br#"{ scheduler: { maxIdlePerKey: 5, autoResume: false, }, }"#).unwrap();

	let config = Config::load(Some(file.path())).unwrap();
	assert_eq!(config.scheduler.max_idle_per_key, 5);
	assert!(!config.scheduler.auto_resume);
	assert_eq!(config.scheduler.max_workers, 10);
}

#[test]
fn test_bad_files_are_reported() {
	let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
	file.write_all(b"scheduler = [").unwrap();
	assert!(matches!(Config::load(Some(file.path())), Err(ConfigError::Parse { .. })));

	let dir = TempDir::new().unwrap();
	let missing = dir.path().join("none.toml");
	assert!(matches!(Config::load(Some(&missing)), Err(ConfigError::Io { .. })));
}

#[tokio::test]
async fn test_scheduler_from_loaded_config() {
	let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
	file.write_all(b"[scheduler]\nlaunchMode = \"in-process\"\n").unwrap();
	let sched = Scheduler::new(Config::load(Some(file.path())).unwrap()).unwrap();

	let dir = TempDir::new().unwrap();
	let path = dir.path().join("x");
	std::fs::write(&path, b"x").unwrap();
	let outcome = Job::stat(&sched, &Url::from_file_path(&path).unwrap(), JobOptions::default())
		.result()
		.await
		.unwrap();
	assert_eq!(outcome.stat.and_then(|e| e.size()), Some(1));
}

// vim: ts=4
