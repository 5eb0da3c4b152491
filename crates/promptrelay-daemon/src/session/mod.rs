//! Session state tracking.

mod state;

pub use state::{FailureCause, SessionState, SessionStatus};
