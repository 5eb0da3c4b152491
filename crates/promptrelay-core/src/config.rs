//! Configuration resolution for promptrelay.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config dir>/promptrelay/settings.json`)
//! 3. Project config (`.promptrelay/settings.json`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the daemon binary)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agents::{AgentMap, builtin_agents};
use crate::error::{Error, Result};
use crate::mcp::McpServer;

/// Complete promptrelay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// Agent definitions offered to every invocation. The built-ins come
    /// from `Config::default()`, not from deserialization.
    #[serde(default)]
    pub agents: AgentMap,
    #[serde(default)]
    pub mcp_servers: Vec<McpServer>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            session: SessionConfig::default(),
            agents: builtin_agents(),
            mcp_servers: Vec::new(),
        }
    }
}

/// HTTP daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub addr: SocketAddr,
    pub log_level: String,
    pub max_body_bytes: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_level: "info".to_string(),
            max_body_bytes: 1024 * 1024, // 1 MiB
        }
    }
}

/// Per-invocation agent process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Path or name of the agent executable.
    pub agent_bin: PathBuf,
    /// Model identifier passed with `--model`.
    pub model: String,
    /// Hard deadline for one run.
    pub timeout_secs: u64,
    /// Pass `--dangerously-skip-permissions`.
    pub skip_permissions: bool,
    /// Working directory for the agent; the daemon's cwd when unset.
    pub working_directory: Option<PathBuf>,
    /// Cap on captured stderr kept for diagnostics.
    pub stderr_limit_bytes: usize,
}

impl SessionConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            agent_bin: PathBuf::from("claude"),
            model: "claude-opus-4-5-20251101".to_string(),
            timeout_secs: 20 * 60,
            skip_permissions: true,
            working_directory: None,
            stderr_limit_bytes: 64 * 1024,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut config = load_files(global_config_path().as_deref(), project_dir)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("promptrelay").join("settings.json"))
}

fn load_files(global_path: Option<&Path>, project_dir: Option<&Path>) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())
        .map_err(|e| Error::Config(format!("Failed to serialize default config: {e}")))?;

    if let Some(global_path) = global_path
        && global_path.exists()
    {
        merge_config(&mut merged, load_config_file(global_path)?);
    }

    if let Some(dir) = project_dir {
        let project_path = dir.join(".promptrelay").join("settings.json");
        if project_path.exists() {
            merge_config(&mut merged, load_config_file(&project_path)?);
        }
    }

    serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("Invalid configuration: {e}")))
}

/// Read one settings file as a JSON object, without applying defaults.
fn load_config_file(path: &Path) -> Result<Map<String, Value>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(Error::Config(format!(
            "Config file {} must contain a JSON object",
            path.display()
        ))),
    }
}

/// Overlay one file on the merged tree. Fields the file leaves out keep the
/// lower layer's value; agents are replaced whole, by name.
fn merge_config(base: &mut Value, overlay: Map<String, Value>) {
    let Value::Object(base) = base else {
        return;
    };
    for (key, value) in overlay {
        match base.get_mut(&key) {
            Some(slot) if key == "agents" => match (slot, value) {
                (Value::Object(agents), Value::Object(overlay_agents)) => {
                    agents.extend(overlay_agents);
                }
                (slot, value) => *slot = value,
            },
            Some(slot) => merge_value(slot, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}

fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("PROMPTRELAY_ADDR")
        && let Ok(addr) = val.parse()
    {
        config.daemon.addr = addr;
    }
    if let Some(val) = var("PROMPTRELAY_LOG_LEVEL") {
        config.daemon.log_level = val;
    }
    if let Some(val) = var("PROMPTRELAY_AGENT_BIN") {
        config.session.agent_bin = PathBuf::from(val);
    }
    if let Some(val) = var("PROMPTRELAY_MODEL") {
        config.session.model = val;
    }
    if let Some(val) = var("PROMPTRELAY_TIMEOUT_SECS")
        && let Ok(secs) = val.parse()
    {
        config.session.timeout_secs = secs;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn write_project_config(dir: &Path, json: &str) {
        let config_dir = dir.join(".promptrelay");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join("settings.json"), json).unwrap();
    }

    #[test]
    fn default_config_has_twenty_minute_deadline() {
        let config = Config::default();
        assert_eq!(config.session.timeout(), Duration::from_secs(1200));
        assert!(config.session.skip_permissions);
        assert!(config.agents.contains_key("financial-analyst"));
        assert!(config.mcp_servers.is_empty());
    }

    #[test]
    fn project_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_project_config(
            dir.path(),
            r#"{
                "session": {"agent_bin": "/usr/local/bin/agent", "timeout_secs": 30},
                "agents": {"reviewer": {"description": "Reviews", "prompt": "Review code"}},
                "mcp_servers": [{"name": "docs", "transport": "http", "url": "https://docs.example.com/mcp"}]
            }"#,
        );
        let config = load_files(None, Some(dir.path())).unwrap();
        assert_eq!(config.session.agent_bin, PathBuf::from("/usr/local/bin/agent"));
        assert_eq!(config.session.timeout_secs, 30);
        assert_eq!(config.session.model, "claude-opus-4-5-20251101");
        assert!(config.agents.contains_key("reviewer"));
        assert!(config.agents.contains_key("financial-analyst"));
        assert_eq!(config.mcp_servers.len(), 1);
    }

    #[test]
    fn project_file_layers_over_global_file() {
        let global_dir = tempfile::tempdir().unwrap();
        let global_path = global_dir.path().join("settings.json");
        std::fs::write(
            &global_path,
            r#"{
                "daemon": {"addr": "0.0.0.0:8080"},
                "session": {"model": "global-model", "timeout_secs": 60},
                "agents": {"financial-analyst": {"description": "custom", "prompt": "p"}}
            }"#,
        )
        .unwrap();
        let project = tempfile::tempdir().unwrap();
        write_project_config(project.path(), r#"{"session": {"timeout_secs": 30}}"#);

        let config = load_files(Some(&global_path), Some(project.path())).unwrap();
        assert_eq!(config.daemon.addr.port(), 8080);
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.session.model, "global-model");
        assert_eq!(config.session.timeout_secs, 30);
        assert_eq!(config.agents["financial-analyst"].description, "custom");
        assert!(config.agents["financial-analyst"].tools.is_none());
    }

    #[test]
    fn non_object_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        write_project_config(dir.path(), "[1, 2]");
        let err = load_files(None, Some(dir.path())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        write_project_config(dir.path(), "{ not json");
        let err = load_files(None, Some(dir.path())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_files(Some(&dir.path().join("absent.json")), Some(dir.path())).unwrap();
        assert_eq!(config.daemon.log_level, "info");
    }

    #[test]
    fn env_overrides_apply_and_ignore_unparseable_values() {
        let vars: HashMap<&str, &str> = [
            ("PROMPTRELAY_MODEL", "claude-sonnet-4-5"),
            ("PROMPTRELAY_TIMEOUT_SECS", "soon"),
            ("PROMPTRELAY_ADDR", "0.0.0.0:8080"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| vars.get(key).map(|v| (*v).to_string()));
        assert_eq!(config.session.model, "claude-sonnet-4-5");
        assert_eq!(config.session.timeout_secs, 1200);
        assert_eq!(config.daemon.addr.port(), 8080);
    }
}
