//! Aggregating responder: turns a finished session into one response object.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::session::{FailureCause, SessionState, SessionStatus};
use crate::subprocess::ProcessSession;

/// Characters of stdout echoed back when no result record was decoded.
pub const RAW_PREVIEW_CHARS: usize = 1000;

/// Why no consolidated response could be produced.
#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("Request timed out")]
    TimedOut,

    #[error("{0}")]
    Launch(String),

    #[error("{0}")]
    ProcessFailed(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("{0}")]
    Io(String),

    /// The process exited cleanly but never emitted a result record.
    #[error("No result in agent response")]
    MissingResult { raw: String },

    #[error("session has not terminated")]
    StillRunning,
}

/// Full outcome of one aggregated run.
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidatedResponse {
    pub success: bool,
    pub result: String,
    pub messages: Vec<Value>,
    pub stream_events: Vec<Value>,
    pub raw_output: String,
    pub metadata: ResponseMetadata,
    pub init: InitSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetadata {
    pub session_id: String,
    pub duration_ms: u64,
    pub duration_api_ms: u64,
    pub num_turns: u64,
    pub cost_usd: f64,
    pub tools_used: Vec<String>,
    pub model: String,
    pub usage: Value,
    #[serde(rename = "modelUsage")]
    pub model_usage: Value,
    pub permission_denials: Vec<Value>,
}

/// Fields of the init record, empty when none was seen.
#[derive(Debug, Clone, Serialize)]
pub struct InitSummary {
    pub cwd: String,
    pub tools: Vec<String>,
    pub agents: Vec<String>,
    pub slash_commands: Vec<String>,
    pub mcp_servers: Vec<String>,
    pub model: String,
    #[serde(rename = "permissionMode")]
    pub permission_mode: String,
    pub claude_code_version: String,
    pub output_style: String,
}

/// Build the response for a terminated session.
///
/// `model` is the configured model identifier; it fills `metadata.model`
/// and stands in for `init.model` when the agent did not report one.
pub fn aggregate(state: &SessionState, model: &str) -> Result<ConsolidatedResponse, ResponderError> {
    match state.status() {
        SessionStatus::Completed { .. } => {}
        SessionStatus::TimedOut => return Err(ResponderError::TimedOut),
        SessionStatus::Failed(cause) => return Err(failure(cause)),
        SessionStatus::Building | SessionStatus::Running => {
            return Err(ResponderError::StillRunning);
        }
    }

    let Some(result) = state.result() else {
        let raw: String = state.raw_output().chars().take(RAW_PREVIEW_CHARS).collect();
        return Err(ResponderError::MissingResult { raw });
    };

    let events = state.events();
    let messages = events.iter().map(|e| e.raw.clone()).collect();
    let stream_events = events
        .iter()
        .filter(|e| e.is_stream_event())
        .map(|e| e.raw.clone())
        .collect();

    let init = state.init().cloned().unwrap_or_default();
    let init_model = if init.model.is_empty() {
        model.to_string()
    } else {
        init.model
    };

    Ok(ConsolidatedResponse {
        success: result.success(),
        result: result.result.clone(),
        messages,
        stream_events,
        raw_output: state.raw_output(),
        metadata: ResponseMetadata {
            session_id: result.session_id.clone(),
            duration_ms: result.duration_ms,
            duration_api_ms: result.duration_api_ms,
            num_turns: result.num_turns,
            cost_usd: result.cost_usd,
            tools_used: state.tools_used().to_vec(),
            model: model.to_string(),
            usage: result.usage.clone(),
            model_usage: result.model_usage.clone(),
            permission_denials: result.permission_denials.clone(),
        },
        init: InitSummary {
            cwd: init.cwd,
            tools: init.tools,
            agents: init.agents,
            slash_commands: init.slash_commands,
            mcp_servers: init.mcp_servers,
            model: init_model,
            permission_mode: init.permission_mode,
            claude_code_version: init.agent_version,
            output_style: init.output_style,
        },
    })
}

/// Drive `session` to termination, then aggregate.
pub async fn respond(
    session: ProcessSession,
    model: &str,
) -> Result<ConsolidatedResponse, ResponderError> {
    let state = session.wait().await;
    aggregate(&state, model)
}

fn failure(cause: &FailureCause) -> ResponderError {
    match cause {
        FailureCause::Launch(reason) => ResponderError::Launch(reason.clone()),
        FailureCause::Exited { .. } => ResponderError::ProcessFailed(cause.to_string()),
        FailureCause::Io(_) => ResponderError::Io(cause.to_string()),
        FailureCause::Cancelled => ResponderError::Cancelled,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use promptrelay_core::ndjson::parse_line;

    const INIT: &str = r#"{"type":"system","subtype":"init","session_id":"s1","cwd":"/work","tools":["Read","Bash"],"mcp_servers":[{"name":"docs","status":"connected"}],"model":"claude-opus","permissionMode":"bypassPermissions","claude_code_version":"2.0.1"}"#;
    const DELTA: &str = r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"4"}}}"#;
    const TOOL: &str = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"WebSearch","input":{"query":"x"}}]}}"#;
    const RESULT: &str = r#"{"type":"result","subtype":"success","is_error":false,"result":"4","session_id":"s1","duration_ms":1200,"duration_api_ms":900,"num_turns":1,"total_cost_usd":0.02,"usage":{"input_tokens":10}}"#;

    fn completed(lines: &[&str]) -> SessionState {
        let mut state = SessionState::new();
        state.mark_running();
        for line in lines {
            state.append_raw(line.as_bytes());
            state.append_raw(b"\n");
            state.record(parse_line(line).unwrap());
        }
        state.finish(SessionStatus::Completed { exit_code: 0 });
        state
    }

    #[test]
    fn full_run_is_consolidated() {
        let state = completed(&[INIT, DELTA, DELTA, TOOL, RESULT]);
        let response = aggregate(&state, "configured-model").unwrap();

        assert!(response.success);
        assert_eq!(response.result, "4");
        assert_eq!(response.messages.len(), 5);
        assert_eq!(response.stream_events.len(), 2);
        assert_eq!(response.metadata.session_id, "s1");
        assert_eq!(response.metadata.duration_ms, 1200);
        assert_eq!(response.metadata.num_turns, 1);
        assert_eq!(response.metadata.tools_used, vec!["WebSearch"]);
        assert_eq!(response.metadata.model, "configured-model");
        assert_eq!(response.init.cwd, "/work");
        assert_eq!(response.init.mcp_servers, vec!["docs"]);
        assert_eq!(response.init.model, "claude-opus");
        assert_eq!(response.init.claude_code_version, "2.0.1");
        assert!(response.raw_output.ends_with('\n'));
    }

    #[test]
    fn absent_fields_serialize_as_empty_values() {
        let state = completed(&[r#"{"type":"result","result":"ok"}"#]);
        let json = serde_json::to_value(aggregate(&state, "m").unwrap()).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["metadata"]["session_id"], "");
        assert_eq!(json["metadata"]["cost_usd"], 0.0);
        assert_eq!(json["metadata"]["usage"], serde_json::json!({}));
        assert_eq!(json["metadata"]["modelUsage"], serde_json::json!({}));
        assert_eq!(json["metadata"]["permission_denials"], serde_json::json!([]));
        assert_eq!(json["init"]["cwd"], "");
        assert_eq!(json["init"]["tools"], serde_json::json!([]));
        assert_eq!(json["init"]["model"], "m");
        assert_eq!(json["init"]["permissionMode"], "");
    }

    #[test]
    fn error_result_is_reported_unsuccessful() {
        let state = completed(&[
            r#"{"type":"result","subtype":"error_max_turns","is_error":true,"result":""}"#,
        ]);
        let response = aggregate(&state, "m").unwrap();
        assert!(!response.success);
    }

    #[test]
    fn clean_exit_without_result_is_an_error() {
        let state = completed(&[INIT, DELTA]);
        match aggregate(&state, "m").unwrap_err() {
            ResponderError::MissingResult { raw } => assert!(raw.starts_with(r#"{"type":"system""#)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn missing_result_preview_is_truncated() {
        let mut state = SessionState::new();
        state.mark_running();
        state.append_raw("x".repeat(5000).as_bytes());
        state.finish(SessionStatus::Completed { exit_code: 0 });
        match aggregate(&state, "m").unwrap_err() {
            ResponderError::MissingResult { raw } => assert_eq!(raw.len(), RAW_PREVIEW_CHARS),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn failures_map_to_distinct_errors() {
        let finished = |status| {
            let mut state = SessionState::new();
            state.mark_running();
            state.finish(status);
            state
        };

        let err = aggregate(&finished(SessionStatus::TimedOut), "m").unwrap_err();
        assert!(matches!(err, ResponderError::TimedOut));

        let exited = SessionStatus::Failed(FailureCause::Exited {
            code: Some(1),
            signal: None,
            stderr: "bad flag".into(),
        });
        let err = aggregate(&finished(exited), "m").unwrap_err();
        assert_eq!(err.to_string(), "Process exited with code 1\nStderr: bad flag");

        let err = aggregate(&SessionState::new(), "m").unwrap_err();
        assert!(matches!(err, ResponderError::StillRunning));
    }
}
