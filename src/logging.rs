//! Logging prelude module for convenient access to tracing macros.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("Worker {} spawned", id);
//! debug!("Reusing idle worker");
//! ```

pub use tracing::{debug, error, info, trace, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// Logs go to stderr: `iorelay get` writes file data to stdout, and worker
/// processes inherit the parent's stderr. Control the level with `RUST_LOG`:
///
/// ```bash
/// RUST_LOG=debug iorelay ls file:///tmp
/// RUST_LOG=iorelay::scheduler=debug,iorelay::protocol=trace iorelay get file:///etc/hosts
/// ```
///
/// `default_level` applies when `RUST_LOG` is unset. Calling this twice is harmless.
pub fn init_tracing(default_level: &str) {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
		)
		.with_writer(std::io::stderr)
		.try_init();
}

// vim: ts=4
