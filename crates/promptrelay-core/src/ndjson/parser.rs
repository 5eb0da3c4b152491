//! Classifier for the agent's stream-json protocol.
//!
//! Implements tolerant reader pattern: unknown fields ignored, unknown types
//! kept as [`Message::Unknown`] so they can still be relayed.

use serde_json::{Map, Value};

use super::types::*;
use crate::error::Result;

/// Parse a single NDJSON line from the agent's stdout.
pub fn parse_line(line: &str) -> Result<DecodedEvent> {
    let raw: Value = serde_json::from_str(line)?;
    Ok(DecodedEvent::new(raw))
}

/// Classify a JSON value into a canonical message.
pub fn parse_value(raw: &Value) -> Message {
    let msg_type = str_field(raw, "type");

    match msg_type.as_str() {
        "system" if raw.get("subtype").and_then(Value::as_str) == Some("init") => {
            Message::SystemInit(parse_system_init(raw))
        }
        "assistant" => Message::Assistant(parse_assistant(raw)),
        "user" => Message::User(parse_user(raw)),
        "stream_event" => Message::StreamEvent(parse_stream_event(raw)),
        "result" => Message::Result(parse_result(raw)),
        _ => Message::Unknown { msg_type },
    }
}

fn str_field(raw: &Value, key: &str) -> String {
    raw.get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn u64_field(raw: &Value, key: &str) -> u64 {
    raw.get(key).and_then(Value::as_u64).unwrap_or(0)
}

/// Collect a list of names. Entries may be plain strings or objects with a
/// `name` field (the agent reports endpoints as `{name, status}`).
fn name_list(raw: &Value, key: &str) -> Vec<String> {
    let Some(arr) = raw.get(key).and_then(Value::as_array) else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(|entry| match entry {
            Value::String(name) => Some(name.clone()),
            Value::Object(obj) => obj.get("name").and_then(Value::as_str).map(String::from),
            _ => None,
        })
        .collect()
}

fn parse_system_init(raw: &Value) -> SystemInit {
    SystemInit {
        session_id: str_field(raw, "session_id"),
        cwd: str_field(raw, "cwd"),
        tools: name_list(raw, "tools"),
        agents: name_list(raw, "agents"),
        slash_commands: name_list(raw, "slash_commands"),
        mcp_servers: name_list(raw, "mcp_servers"),
        model: str_field(raw, "model"),
        permission_mode: str_field(raw, "permissionMode"),
        agent_version: str_field(raw, "claude_code_version"),
        output_style: str_field(raw, "output_style"),
    }
}

fn parse_assistant(raw: &Value) -> AssistantMessage {
    let msg = raw.get("message").unwrap_or(raw);

    AssistantMessage {
        content: parse_content_blocks(msg.get("content")),
        stop_reason: parse_stop_reason(msg.get("stop_reason")),
    }
}

fn parse_content_blocks(content: Option<&Value>) -> Vec<ContentBlock> {
    let Some(arr) = content.and_then(Value::as_array) else {
        return Vec::new();
    };

    arr.iter()
        .filter_map(|block| {
            let block_type = block.get("type")?.as_str()?;
            match block_type {
                "text" => {
                    let text = block.get("text")?.as_str()?.to_string();
                    Some(ContentBlock::Text { text })
                }
                "tool_use" => {
                    let name = block.get("name")?.as_str()?.to_string();
                    if name.is_empty() {
                        return None;
                    }
                    let id = str_field(block, "id");
                    let input = block.get("input").cloned().unwrap_or(Value::Null);
                    Some(ContentBlock::ToolUse { id, name, input })
                }
                _ => None,
            }
        })
        .collect()
}

fn parse_stop_reason(val: Option<&Value>) -> StopReason {
    match val.and_then(Value::as_str) {
        Some("end_turn") | None => StopReason::EndTurn,
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        Some(other) => StopReason::Unknown(other.to_string()),
    }
}

fn parse_user(raw: &Value) -> UserMessage {
    let msg = raw.get("message").unwrap_or(raw);
    let content = msg
        .get("content")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|block| {
                    if block.get("type")?.as_str()? != "tool_result" {
                        return None;
                    }
                    Some(ToolResult {
                        tool_use_id: block.get("tool_use_id")?.as_str()?.to_string(),
                        content: str_field(block, "content"),
                        is_error: block
                            .get("is_error")
                            .and_then(Value::as_bool)
                            .unwrap_or(false),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    UserMessage { content }
}

fn index_field(event: &Value) -> u32 {
    u32::try_from(u64_field(event, "index")).unwrap_or(u32::MAX)
}

fn parse_stream_event(raw: &Value) -> StreamEvent {
    let event = raw.get("event").unwrap_or(raw);
    let event_type = str_field(event, "type");

    let stream_type = match event_type.as_str() {
        "content_block_start" => StreamEventType::ContentBlockStart {
            index: index_field(event),
            block_type: event
                .get("content_block")
                .map(|b| str_field(b, "type"))
                .unwrap_or_default(),
        },
        "content_block_delta" => {
            let delta = event.get("delta").unwrap_or(&Value::Null);
            let delta = match str_field(delta, "type").as_str() {
                "text_delta" => Delta::Text(str_field(delta, "text")),
                "input_json_delta" => Delta::InputJson(str_field(delta, "partial_json")),
                other => Delta::Unknown(other.to_string()),
            };
            StreamEventType::ContentBlockDelta {
                index: index_field(event),
                delta,
            }
        }
        "content_block_stop" => StreamEventType::ContentBlockStop {
            index: index_field(event),
        },
        "message_start" => StreamEventType::MessageStart,
        "message_delta" => StreamEventType::MessageDelta {
            stop_reason: event
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(Value::as_str)
                .map(String::from),
        },
        "message_stop" => StreamEventType::MessageStop,
        _ => StreamEventType::Unknown(event_type),
    };

    StreamEvent {
        event_type: stream_type,
    }
}

fn parse_result(raw: &Value) -> SessionResult {
    let subtype = match raw.get("subtype").and_then(Value::as_str) {
        Some("success") | None => ResultSubtype::Success,
        Some("error") => ResultSubtype::Error,
        Some(other) => ResultSubtype::Unknown(other.to_string()),
    };

    let is_error = raw
        .get("is_error")
        .and_then(Value::as_bool)
        .unwrap_or(subtype != ResultSubtype::Success);

    let object_or_empty = |key: &str| {
        raw.get(key)
            .filter(|v| v.is_object())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    };

    SessionResult {
        subtype,
        is_error,
        result: str_field(raw, "result"),
        session_id: str_field(raw, "session_id"),
        duration_ms: u64_field(raw, "duration_ms"),
        duration_api_ms: u64_field(raw, "duration_api_ms"),
        num_turns: u64_field(raw, "num_turns"),
        cost_usd: raw
            .get("total_cost_usd")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        usage: object_or_empty("usage"),
        model_usage: object_or_empty("modelUsage"),
        permission_denials: raw
            .get("permission_denials")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    }
}
