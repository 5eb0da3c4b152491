//! Agent subprocess sessions.

pub mod command;
pub mod driver;

pub use command::{SpawnConfig, build_args, build_command};
pub use driver::{ProcessSession, SessionUpdate};

/// Errors raised while preparing an agent process.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to serialize invocation argument: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Failed to spawn agent process: {reason}")]
    SpawnFailed { reason: String },
}
