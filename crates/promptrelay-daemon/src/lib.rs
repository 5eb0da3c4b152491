//! promptrelay Daemon Library
//!
//! Runs the agent CLI as a subprocess per request and exposes it over HTTP:
//! - Process sessions with deadline and cancellation
//! - Aggregated responses for one-shot callers
//! - Live NDJSON relay for streaming callers

pub mod relay;
pub mod responder;
pub mod server;
pub mod session;
pub mod subprocess;
