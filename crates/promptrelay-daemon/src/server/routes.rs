use std::convert::Infallible;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use promptrelay_core::InvocationRequest;
use serde_json::{Value, json};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use super::{ApiError, AppState};
use crate::relay::LiveRelay;
use crate::responder::{self, ConsolidatedResponse};
use crate::subprocess::ProcessSession;

const AVAILABLE_TOOLS: &[&str] = &[
    "Task",
    "Bash",
    "Glob",
    "Grep",
    "Read",
    "Edit",
    "Write",
    "NotebookEdit",
    "WebFetch",
    "WebSearch",
    "TodoWrite",
    "Skill",
];

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}

/// `GET /api/claude`: describes the service and its request schema.
pub async fn docs(State(state): State<AppState>) -> Json<Value> {
    let spawn = &state.spawn;
    let mcp_servers: Vec<&str> = spawn.mcp_servers.iter().map(|s| s.name.as_str()).collect();
    let default_agents: Vec<&str> = spawn.default_agents.keys().map(String::as_str).collect();

    Json(json!({
        "message": "Agent CLI API wrapper",
        "model": format!("{} (fixed)", spawn.model),
        "mcp_servers": mcp_servers,
        "default_agents": default_agents,
        "usage": "POST /api/claude with { \"prompt\": \"your prompt here\" }",
        "streaming": "POST /api/claude/stream with the same body; one JSON record per line",
        "options": {
            "prompt": "string (required) - The prompt to send to the agent",
            "allowedTools": "string[] (optional) - Tools to allow (e.g., [\"WebSearch\", \"Read\"])",
            "disallowedTools": "string[] (optional) - Tools to block (e.g., [\"Edit\", \"Write\"])",
            "systemPrompt": "string (optional) - Custom system prompt",
            "appendSystemPrompt": "string (optional) - Append to default system prompt",
            "agents": "Record<string, AgentDefinition> (optional) - Custom subagents",
            "useDefaultAgents": "boolean (optional, default: true) - Include default agents",
            "mcpServers": "McpServer[] (optional) - Extra endpoints, by name over the configured ones",
        },
        "agent_schema": {
            "description": "string (required) - When the agent should be delegated to",
            "prompt": "string (required) - System prompt for the agent",
            "tools": "string[] (optional) - Allowed tools",
            "disallowedTools": "string[] (optional) - Blocked tools",
            "model": "sonnet | opus | haiku | inherit (optional)",
            "permissionMode": "default | acceptEdits | bypassPermissions | plan (optional)",
        },
        "available_tools": AVAILABLE_TOOLS,
    }))
}

/// `POST /api/claude`: run to completion and return one consolidated object.
pub async fn invoke(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ConsolidatedResponse>, ApiError> {
    let request = InvocationRequest::from_slice(&body)?;
    let session = ProcessSession::start(&request, &state.spawn);
    info!(session_id = %session.id(), prompt_len = request.prompt.len(), "Aggregated invocation");

    let response = responder::respond(session, &state.spawn.model).await?;
    Ok(Json(response))
}

/// `POST /api/claude/stream`: relay each decoded record as it arrives.
///
/// Validation errors are the only HTTP-level failures; everything after the
/// body starts is reported in-band.
pub async fn stream(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request = InvocationRequest::from_slice(&body)?;
    let session = ProcessSession::start(&request, &state.spawn);
    info!(session_id = %session.id(), prompt_len = request.prompt.len(), "Streaming invocation");

    let (relay, rx) = LiveRelay::channel(state.relay_buffer);
    tokio::spawn(relay.run(session));

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    Ok((
        [
            (CONTENT_TYPE, "text/plain; charset=utf-8"),
            (CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}
