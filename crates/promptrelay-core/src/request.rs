//! Invocation request model.
//!
//! Client bodies are parsed leniently: only `prompt` is required. Optional
//! fields with the wrong shape are ignored rather than rejected.

use serde_json::Value;
use tracing::debug;

use crate::agents::{AgentDefinition, AgentMap};
use crate::error::{Error, Result};
use crate::mcp::McpServer;

const PROMPT_REQUIRED: &str = "Prompt is required and must be a string";

/// One client-submitted prompt plus options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    pub prompt: String,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub system_prompt: Option<String>,
    pub append_system_prompt: Option<String>,
    pub agents: AgentMap,
    pub use_default_agents: bool,
    /// Endpoints added on top of the configured ones.
    pub mcp_servers: Vec<McpServer>,
}

impl InvocationRequest {
    /// A request with only a prompt and default options.
    pub fn new(prompt: impl Into<String>) -> Result<Self> {
        let prompt = prompt.into();
        if prompt.is_empty() {
            return Err(Error::Validation(PROMPT_REQUIRED.into()));
        }
        Ok(Self {
            prompt,
            allowed_tools: Vec::new(),
            disallowed_tools: Vec::new(),
            system_prompt: None,
            append_system_prompt: None,
            agents: AgentMap::new(),
            use_default_agents: true,
            mcp_servers: Vec::new(),
        })
    }

    /// Parse a raw request body.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| Error::Validation(format!("Request body must be a JSON object: {e}")))?;
        Self::from_json(&value)
    }

    /// Build a request from a decoded JSON body.
    pub fn from_json(body: &Value) -> Result<Self> {
        let prompt = body
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation(PROMPT_REQUIRED.into()))?;
        let mut request = Self::new(prompt)?;

        request.allowed_tools = string_list(body.get("allowedTools"));
        request.disallowed_tools = string_list(body.get("disallowedTools"));
        request.system_prompt = non_empty_string(body.get("systemPrompt"));
        request.append_system_prompt = non_empty_string(body.get("appendSystemPrompt"));
        request.agents = agent_map(body.get("agents"));
        request.use_default_agents = body
            .get("useDefaultAgents")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        request.mcp_servers = endpoint_list(body.get("mcpServers"));

        Ok(request)
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn agent_map(value: Option<&Value>) -> AgentMap {
    let Some(obj) = value.and_then(Value::as_object) else {
        return AgentMap::new();
    };
    obj.iter()
        .filter_map(|(name, def)| {
            match serde_json::from_value::<AgentDefinition>(def.clone()) {
                Ok(definition) => Some((name.clone(), definition)),
                Err(e) => {
                    debug!(agent = %name, error = %e, "Ignoring malformed agent definition");
                    None
                }
            }
        })
        .collect()
}

fn endpoint_list(value: Option<&Value>) -> Vec<McpServer> {
    let Some(arr) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(|def| match serde_json::from_value::<McpServer>(def.clone()) {
            Ok(server) => Some(server),
            Err(e) => {
                debug!(error = %e, "Ignoring malformed endpoint definition");
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::agents::AgentModel;
    use serde_json::json;

    #[test]
    fn prompt_only_uses_defaults() {
        let req = InvocationRequest::from_json(&json!({"prompt": "2+2"})).unwrap();
        assert_eq!(req.prompt, "2+2");
        assert!(req.allowed_tools.is_empty());
        assert!(req.system_prompt.is_none());
        assert!(req.agents.is_empty());
        assert!(req.use_default_agents);
    }

    #[test]
    fn missing_or_empty_prompt_is_rejected() {
        for body in [json!({}), json!({"prompt": ""}), json!({"prompt": 42})] {
            let err = InvocationRequest::from_json(&body).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{body}");
        }
    }

    #[test]
    fn non_json_body_is_a_validation_error() {
        let err = InvocationRequest::from_slice(b"prompt=hi").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn all_options_are_read() {
        let body = json!({
            "prompt": "summarize",
            "allowedTools": ["WebSearch", "Read"],
            "disallowedTools": ["Edit"],
            "systemPrompt": "be brief",
            "appendSystemPrompt": "cite sources",
            "useDefaultAgents": false,
            "agents": {
                "news": {
                    "description": "News researcher",
                    "prompt": "Find news",
                    "tools": ["WebSearch"],
                    "model": "haiku"
                }
            }
        });
        let req = InvocationRequest::from_json(&body).unwrap();
        assert_eq!(req.allowed_tools, vec!["WebSearch", "Read"]);
        assert_eq!(req.disallowed_tools, vec!["Edit"]);
        assert_eq!(req.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(req.append_system_prompt.as_deref(), Some("cite sources"));
        assert!(!req.use_default_agents);
        assert_eq!(req.agents["news"].model, Some(AgentModel::Haiku));
    }

    #[test]
    fn malformed_optional_fields_are_ignored() {
        let body = json!({
            "prompt": "hi",
            "allowedTools": "Read",
            "disallowedTools": ["Edit", 3, null],
            "systemPrompt": 7,
            "useDefaultAgents": "no",
            "agents": {
                "broken": {"description": "missing prompt"},
                "bad-model": {"description": "d", "prompt": "p", "model": "gpt"},
                "ok": {"description": "d", "prompt": "p"}
            }
        });
        let req = InvocationRequest::from_json(&body).unwrap();
        assert!(req.allowed_tools.is_empty());
        assert_eq!(req.disallowed_tools, vec!["Edit"]);
        assert!(req.system_prompt.is_none());
        assert!(req.use_default_agents);
        assert_eq!(req.agents.keys().collect::<Vec<_>>(), vec!["ok"]);
    }

    #[test]
    fn endpoints_are_read_and_malformed_ones_skipped() {
        let body = json!({
            "prompt": "hi",
            "mcpServers": [
                {"name": "docs", "transport": "sse", "url": "https://docs.example.com/sse"},
                {"name": "broken", "transport": "carrier-pigeon"},
                {"name": "local", "transport": "stdio", "command": "mcp-local"}
            ]
        });
        let req = InvocationRequest::from_json(&body).unwrap();
        let names: Vec<&str> = req.mcp_servers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["docs", "local"]);
    }
}
