//! External endpoint (MCP server) definitions.
//!
//! Endpoints come from configuration and, optionally, from the request.
//! They are passed through to the agent as one JSON blob keyed by endpoint
//! name.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One endpoint the agent may connect to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServer {
    pub name: String,
    #[serde(flatten)]
    pub transport: McpTransport,
}

/// Transport-specific connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum McpTransport {
    /// Direct HTTP calls.
    Http { url: String },
    /// Request/response over server-sent events.
    Sse { url: String },
    /// A local subprocess speaking over stdio.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
}

/// Serialize endpoints into the agent's `--mcp-config` shape.
///
/// Returns `None` when no endpoint is configured. A later definition with the
/// same name replaces an earlier one.
pub fn mcp_config_blob(servers: &[McpServer]) -> Option<Value> {
    if servers.is_empty() {
        return None;
    }
    let mut blob = Map::new();
    for server in servers {
        let entry = serde_json::to_value(&server.transport).unwrap_or(Value::Null);
        blob.insert(server.name.clone(), entry);
    }
    Some(Value::Object(blob))
}
