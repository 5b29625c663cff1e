//! # iorelay - Out-of-Process I/O Workers
//!
//! iorelay runs file-system-like operations (get, put, stat, list, copy, ...)
//! in separate worker processes, one protocol per worker, and hands the
//! application an asynchronous [`Job`] per operation. Workers are pooled per
//! protocol, host, port and user and reused between jobs.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use iorelay::{Config, Job, JobOptions, Scheduler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scheduler = Scheduler::new(Config::load(None)?)?;
//!     let url = url::Url::parse("file:///etc/hosts")?;
//!     let outcome = Job::get(&scheduler, &url, JobOptions::default()).result().await?;
//!     println!("{} bytes", outcome.data.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Copying with resume
//!
//! ```rust,ignore
//! use iorelay::job::{copy, JobFlags};
//!
//! let job = copy::file_copy(&scheduler, &src, &dest, None, JobFlags::resume().into());
//! job.result().await?;
//! ```

pub mod auth;
pub mod callbacks;
pub mod config;
pub mod connection;
pub mod error;
pub mod job;
pub mod logging;
pub mod metadata;
pub mod protocol;
pub mod scheduler;
pub mod serve;
pub mod udsentry;
pub mod worker;

// Re-export commonly used types
pub use auth::AuthCache;
pub use callbacks::{BytesSource, NoUiDelegate, SkipDecision, TransferSource, UiDelegate};
pub use config::Config;
pub use error::{ConfigError, ConnectionError, ErrorCode, ErrorKind, JobError};
pub use job::{Job, JobEvent, JobFlags, JobOptions, JobOutcome, JobState};
pub use metadata::MetaData;
pub use protocol::{AuthInfo, AuthRequest};
pub use scheduler::{PoolKey, Reservation, Scheduler};
pub use udsentry::UdsEntry;
pub use worker::{WorkerContext, WorkerProtocol};

// vim: ts=4
