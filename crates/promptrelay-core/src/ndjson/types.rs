//! Message types for the agent's stream-json NDJSON protocol.

use serde_json::Value;

/// One decoded record from the agent's stdout.
///
/// Keeps the original JSON alongside its classification so that relays can
/// forward the record verbatim while aggregators read typed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub raw: Value,
    pub message: Message,
}

impl DecodedEvent {
    /// Classify a raw JSON record.
    pub fn new(raw: Value) -> Self {
        let message = super::parser::parse_value(&raw);
        Self { raw, message }
    }

    /// The record's `type` field, or `""` when absent.
    pub fn kind(&self) -> &str {
        self.raw.get("type").and_then(Value::as_str).unwrap_or("")
    }

    pub const fn is_stream_event(&self) -> bool {
        matches!(self.message, Message::StreamEvent(_))
    }
}

/// Canonical message kinds emitted by the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    SystemInit(SystemInit),
    Assistant(AssistantMessage),
    User(UserMessage),
    StreamEvent(StreamEvent),
    Result(SessionResult),
    Unknown { msg_type: String },
}

/// `system`/`init` message describing the agent's environment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SystemInit {
    pub session_id: String,
    pub cwd: String,
    pub tools: Vec<String>,
    pub agents: Vec<String>,
    pub slash_commands: Vec<String>,
    pub mcp_servers: Vec<String>,
    pub model: String,
    pub permission_mode: String,
    pub agent_version: String,
    pub output_style: String,
}

/// Complete assistant turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantMessage {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
}

impl AssistantMessage {
    /// Tool invocations in block order, as `(name, input)` pairs.
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolUse { name, input, .. } => Some((name.as_str(), input)),
            ContentBlock::Text { .. } => None,
        })
    }
}

/// Content block in an assistant turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
}

/// Reason the assistant stopped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    EndTurn,
    ToolUse,
    MaxTokens,
    Unknown(String),
}

/// User turn (tool results echo). Carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub content: Vec<ToolResult>,
}

/// Tool execution result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: String,
    pub is_error: bool,
}

/// Partial-stream update for real-time output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub event_type: StreamEventType,
}

impl StreamEvent {
    /// The text fragment carried by a `text_delta`, if any.
    pub fn text_delta(&self) -> Option<&str> {
        match &self.event_type {
            StreamEventType::ContentBlockDelta {
                delta: Delta::Text(text),
                ..
            } => Some(text),
            _ => None,
        }
    }
}

/// Stream event types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventType {
    ContentBlockStart { index: u32, block_type: String },
    ContentBlockDelta { index: u32, delta: Delta },
    ContentBlockStop { index: u32 },
    MessageStart,
    MessageDelta { stop_reason: Option<String> },
    MessageStop,
    Unknown(String),
}

/// Delta content in streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    Text(String),
    InputJson(String),
    Unknown(String),
}

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResult {
    pub subtype: ResultSubtype,
    pub is_error: bool,
    pub result: String,
    pub session_id: String,
    pub duration_ms: u64,
    pub duration_api_ms: u64,
    pub num_turns: u64,
    pub cost_usd: f64,
    /// Raw usage counters, `{}` when absent.
    pub usage: Value,
    /// Per-model usage breakdown, `{}` when absent.
    pub model_usage: Value,
    pub permission_denials: Vec<Value>,
}

impl SessionResult {
    pub const fn success(&self) -> bool {
        !self.is_error
    }
}

/// Result subtype.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResultSubtype {
    #[default]
    Success,
    Error,
    Unknown(String),
}
