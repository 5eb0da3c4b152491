//! Named sub-agent definitions and their merge rule.
//!
//! Built-in defaults come from configuration and are handed to each session
//! explicitly. User definitions overlay them by name: last writer wins.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Agent definitions keyed by agent name.
pub type AgentMap = BTreeMap<String, AgentDefinition>;

/// One named sub-agent, serialized in the shape the agent CLI expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub description: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disallowed_tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<AgentModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<PermissionMode>,
}

/// Model selector for a sub-agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentModel {
    Sonnet,
    Opus,
    Haiku,
    Inherit,
}

/// Permission mode for a sub-agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    BypassPermissions,
    Plan,
}

/// The agents shipped with a fresh configuration.
pub fn builtin_agents() -> AgentMap {
    let mut agents = AgentMap::new();
    agents.insert(
        "financial-analyst".to_string(),
        AgentDefinition {
            description: "Financial analysis specialist. Use for stocks, economic indicators \
                          and market trend analysis."
                .to_string(),
            prompt: "You are a financial analyst. Cite data sources, call out risks and \
                     include a disclaimer."
                .to_string(),
            tools: Some(vec!["WebSearch".to_string(), "WebFetch".to_string()]),
            disallowed_tools: None,
            model: Some(AgentModel::Sonnet),
            permission_mode: None,
        },
    );
    agents
}

/// Build the agent set for one invocation.
///
/// Copies `defaults` when `use_defaults` is set, then overwrites by key with
/// every user definition.
pub fn merge_agents(defaults: &AgentMap, user: &AgentMap, use_defaults: bool) -> AgentMap {
    let mut merged = if use_defaults {
        defaults.clone()
    } else {
        AgentMap::new()
    };
    for (name, definition) in user {
        merged.insert(name.clone(), definition.clone());
    }
    merged
}
