//! Stub agent executables for integration tests.
//!
//! Each stub is a `/bin/sh` script in a temp dir that ignores its flags and
//! prints canned stream-json lines.

#![allow(dead_code, clippy::unwrap_used)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use promptrelay_core::agents::AgentMap;
use promptrelay_daemon::subprocess::SpawnConfig;
use tempfile::TempDir;

pub const INIT: &str = r#"{"type":"system","subtype":"init","session_id":"stub","cwd":"/tmp","tools":["Read","WebSearch"],"model":"stub-model","permissionMode":"bypassPermissions"}"#;
pub const DELTA_4: &str = r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"4"}}}"#;
pub const DELTA_DOT: &str = r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"."}}}"#;
pub const RESULT_4: &str = r#"{"type":"result","subtype":"success","is_error":false,"result":"4","session_id":"stub","duration_ms":15,"num_turns":1,"total_cost_usd":0.001}"#;

pub struct StubAgent {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl StubAgent {
    /// Write `body` as the script after the shebang.
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, path }
    }

    /// A stub that prints `lines` and exits 0.
    pub fn printing(lines: &[&str]) -> Self {
        Self::new(&format!("cat <<'EOF'\n{}\nEOF", lines.join("\n")))
    }

    /// The canned "2+2" run: init, two text deltas, result.
    pub fn two_plus_two() -> Self {
        Self::printing(&[INIT, DELTA_4, DELTA_DOT, RESULT_4])
    }

    /// Path of a file inside the stub's directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn config(&self) -> SpawnConfig {
        spawn_config(&self.path, self.dir.path())
    }
}

pub fn spawn_config(agent: &Path, cwd: &Path) -> SpawnConfig {
    SpawnConfig {
        agent_bin: agent.to_path_buf(),
        model: "stub-model".into(),
        timeout: Duration::from_secs(10),
        skip_permissions: false,
        working_directory: cwd.to_path_buf(),
        stderr_limit_bytes: 4096,
        default_agents: AgentMap::new(),
        mcp_servers: Vec::new(),
    }
}
