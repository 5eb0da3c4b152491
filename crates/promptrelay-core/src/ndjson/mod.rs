//! NDJSON decoding for the agent's stream-json protocol.
//!
//! Raw stdout bytes go through [`EventDecoder`], which yields one
//! [`DecodedEvent`] per line; each event is classified into a canonical
//! [`Message`] with a tolerant reader.

mod decoder;
mod parser;
mod types;

pub use decoder::EventDecoder;
pub use parser::{parse_line, parse_value};
pub use types::*;
