//! `promptrelay` Core Library
//!
//! Shared functionality for the promptrelay daemon:
//! - NDJSON decoding and classification of the agent's stream-json output
//! - Invocation request model and agent-definition merging
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod agents;
pub mod config;
pub mod error;
pub mod mcp;
pub mod ndjson;
pub mod request;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use request::InvocationRequest;
