//! Agent command-line construction.
//!
//! Translates an [`InvocationRequest`] plus the daemon's [`SpawnConfig`] into
//! the argument vector and environment of one agent process.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use promptrelay_core::Config;
use promptrelay_core::InvocationRequest;
use promptrelay_core::agents::{AgentMap, merge_agents};
use promptrelay_core::mcp::{McpServer, mcp_config_blob};
use tokio::process::Command;
use tracing::warn;

use super::SessionError;

const FALLBACK_PATH: &str = "/opt/homebrew/bin:/usr/local/bin:/usr/bin:/bin";
const FALLBACK_HOME: &str = "/root";
const TERM_HINT: &str = "xterm-256color";

/// Immutable settings shared by every session the daemon starts.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Path to the agent binary.
    pub agent_bin: PathBuf,
    /// Fixed model identifier.
    pub model: String,
    /// Deadline for one run.
    pub timeout: Duration,
    /// Emit the permission-bypass flag.
    pub skip_permissions: bool,
    /// Working directory for the agent process.
    pub working_directory: PathBuf,
    /// Cap on captured stderr text.
    pub stderr_limit_bytes: usize,
    /// Built-in agents merged under user definitions.
    pub default_agents: AgentMap,
    /// Endpoints handed to the agent.
    pub mcp_servers: Vec<McpServer>,
}

impl SpawnConfig {
    pub fn from_config(config: &Config) -> Self {
        let session = &config.session;
        Self {
            agent_bin: session.agent_bin.clone(),
            model: session.model.clone(),
            timeout: session.timeout(),
            skip_permissions: session.skip_permissions,
            working_directory: session
                .working_directory
                .clone()
                .unwrap_or_else(current_dir_or_dot),
            stderr_limit_bytes: session.stderr_limit_bytes,
            default_agents: config.agents.clone(),
            mcp_servers: config.mcp_servers.clone(),
        }
    }
}

fn current_dir_or_dot() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|e| {
        warn!(error = %e, "Cannot resolve current directory; agent will run in \".\"");
        PathBuf::from(".")
    })
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Build the agent's argument vector. The prompt is always last.
pub fn build_args(
    request: &InvocationRequest,
    config: &SpawnConfig,
) -> Result<Vec<String>, SessionError> {
    let mut args: Vec<String> = [
        "--print",
        "--output-format",
        "stream-json",
        "--verbose",
        "--include-partial-messages",
        "--model",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    args.push(config.model.clone());

    if config.skip_permissions {
        args.push("--dangerously-skip-permissions".into());
    }

    if !request.allowed_tools.is_empty() {
        args.push("--allowedTools".into());
        args.push(request.allowed_tools.join(","));
    }

    if !request.disallowed_tools.is_empty() {
        args.push("--disallowedTools".into());
        args.push(request.disallowed_tools.join(","));
    }

    if let Some(ref system_prompt) = request.system_prompt {
        args.push("--system-prompt".into());
        args.push(system_prompt.clone());
    }

    if let Some(ref append) = request.append_system_prompt {
        args.push("--append-system-prompt".into());
        args.push(append.clone());
    }

    let endpoints: Vec<McpServer> = config
        .mcp_servers
        .iter()
        .chain(&request.mcp_servers)
        .cloned()
        .collect();
    if let Some(blob) = mcp_config_blob(&endpoints) {
        args.push("--mcp-config".into());
        args.push(serde_json::to_string(&blob).map_err(SessionError::Serialization)?);
    }

    let agents = merge_agents(
        &config.default_agents,
        &request.agents,
        request.use_default_agents,
    );
    if !agents.is_empty() {
        args.push("--agents".into());
        args.push(serde_json::to_string(&agents).map_err(SessionError::Serialization)?);
    }

    args.push(request.prompt.clone());
    Ok(args)
}

/// Build the command for one agent process.
///
/// The ambient environment is inherited; `PATH` and `HOME` fall back to
/// fixed values when missing. All three standard streams are piped.
pub fn build_command(
    request: &InvocationRequest,
    config: &SpawnConfig,
) -> Result<Command, SessionError> {
    let args = build_args(request, config)?;

    let path = std::env::var("PATH")
        .ok()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| FALLBACK_PATH.to_string());
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from(FALLBACK_HOME));

    let mut cmd = Command::new(&config.agent_bin);
    cmd.args(&args)
        .current_dir(&config.working_directory)
        .env("PATH", path)
        .env("HOME", home)
        .env("TERM", TERM_HINT)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    Ok(cmd)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use promptrelay_core::agents::AgentDefinition;
    use promptrelay_core::mcp::McpTransport;

    fn bare_config() -> SpawnConfig {
        SpawnConfig {
            agent_bin: "claude".into(),
            model: "test-model".into(),
            timeout: Duration::from_secs(5),
            skip_permissions: false,
            working_directory: std::env::temp_dir(),
            stderr_limit_bytes: 1024,
            default_agents: AgentMap::new(),
            mcp_servers: Vec::new(),
        }
    }

    fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn unset_working_directory_resolves_to_a_usable_path() {
        let config = SpawnConfig::from_config(&Config::default());
        assert!(!config.working_directory.as_os_str().is_empty());
        assert!(config.working_directory.is_dir());
    }

    #[test]
    fn minimal_request_has_base_flags_and_prompt_last() {
        let req = InvocationRequest::new("2+2").unwrap();
        let args = build_args(&req, &bare_config()).unwrap();
        assert_eq!(
            args,
            vec![
                "--print",
                "--output-format",
                "stream-json",
                "--verbose",
                "--include-partial-messages",
                "--model",
                "test-model",
                "2+2",
            ]
        );
    }

    #[test]
    fn optional_flags_follow_request() {
        let mut req = InvocationRequest::new("go").unwrap();
        req.allowed_tools = vec!["Read".into(), "WebSearch".into()];
        req.disallowed_tools = vec!["Edit".into()];
        req.system_prompt = Some("sys".into());
        req.append_system_prompt = Some("more".into());
        let mut config = bare_config();
        config.skip_permissions = true;

        let args = build_args(&req, &config).unwrap();
        assert!(args.contains(&"--dangerously-skip-permissions".to_string()));
        assert_eq!(flag_value(&args, "--allowedTools"), Some("Read,WebSearch"));
        assert_eq!(flag_value(&args, "--disallowedTools"), Some("Edit"));
        assert_eq!(flag_value(&args, "--system-prompt"), Some("sys"));
        assert_eq!(flag_value(&args, "--append-system-prompt"), Some("more"));
        assert_eq!(args.last().map(String::as_str), Some("go"));
        assert!(flag_value(&args, "--mcp-config").is_none());
        assert!(flag_value(&args, "--agents").is_none());
    }

    #[test]
    fn agents_blob_merges_defaults_under_user_definitions() {
        let def = |d: &str| AgentDefinition {
            description: d.into(),
            prompt: "p".into(),
            tools: None,
            disallowed_tools: None,
            model: None,
            permission_mode: None,
        };
        let mut config = bare_config();
        config.default_agents.insert("A".into(), def("d1"));
        let mut req = InvocationRequest::new("go").unwrap();
        req.agents.insert("A".into(), def("d2"));
        req.agents.insert("B".into(), def("d3"));

        let args = build_args(&req, &config).unwrap();
        let blob: serde_json::Value =
            serde_json::from_str(flag_value(&args, "--agents").unwrap()).unwrap();
        assert_eq!(blob["A"]["description"], "d2");
        assert_eq!(blob["B"]["description"], "d3");

        req.use_default_agents = false;
        req.agents.clear();
        let args = build_args(&req, &config).unwrap();
        assert!(flag_value(&args, "--agents").is_none());
    }

    #[test]
    fn endpoint_blob_only_when_configured() {
        let mut config = bare_config();
        config.mcp_servers.push(McpServer {
            name: "docs".into(),
            transport: McpTransport::Http {
                url: "https://docs.example.com/mcp".into(),
            },
        });
        let req = InvocationRequest::new("go").unwrap();
        let args = build_args(&req, &config).unwrap();
        let blob: serde_json::Value =
            serde_json::from_str(flag_value(&args, "--mcp-config").unwrap()).unwrap();
        assert_eq!(blob["docs"]["transport"], "http");
    }

    #[test]
    fn request_endpoints_replace_configured_ones_by_name() {
        let mut config = bare_config();
        config.mcp_servers.push(McpServer {
            name: "docs".into(),
            transport: McpTransport::Http {
                url: "https://docs.example.com/mcp".into(),
            },
        });
        let mut req = InvocationRequest::new("go").unwrap();
        req.mcp_servers.push(McpServer {
            name: "docs".into(),
            transport: McpTransport::Sse {
                url: "https://mirror.example.com/sse".into(),
            },
        });
        let args = build_args(&req, &config).unwrap();
        let blob: serde_json::Value =
            serde_json::from_str(flag_value(&args, "--mcp-config").unwrap()).unwrap();
        assert_eq!(blob["docs"]["transport"], "sse");
        assert_eq!(blob["docs"]["url"], "https://mirror.example.com/sse");
    }
}
