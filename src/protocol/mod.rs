//! Worker wire protocol
//!
//! Framed command channel between a job-side [`Connection`] and a worker
//! process, plus the typed payloads and the handshake that run over it.
//!
//! # Example Usage
//!
//! ```ignore
//! use iorelay::protocol::{cmd, Connection, WorkerCommand};
//!
//! let (mut app, mut worker) = Connection::pair()?;
//! let command = WorkerCommand::Stat { url: "file:///tmp".parse()? };
//! app.send_command(command.code(), &command.encode()?).await?;
//! let task = worker.recv().await?;
//! ```

pub mod codec;
pub mod commands;
pub mod connection;
pub mod error;
pub mod messages;
pub mod negotiation;

// Re-export public API
pub use commands::{cmd, command_name, inf, msg};
pub use connection::{Connection, ConnectionServer, Task};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
	AuthInfo, AuthRequest, HostInfo, MessageBoxAnswer, MessageBoxKind, MessageBoxRequest, WorkerCommand, WorkerStatus,
};

// vim: ts=4
