//! Per-session state owned by one process session's driver loop.

use std::fmt;

use promptrelay_core::ndjson::{DecodedEvent, Message, SessionResult, StreamEventType, SystemInit};

/// Lifecycle of one agent process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Building,
    Running,
    Completed { exit_code: i32 },
    TimedOut,
    Failed(FailureCause),
}

impl SessionStatus {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Building | Self::Running)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Building => f.write_str("building"),
            Self::Running => f.write_str("running"),
            Self::Completed { exit_code } => write!(f, "completed (exit code {exit_code})"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Failed(cause) => write!(f, "failed: {cause}"),
        }
    }
}

/// Why a session failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The process could not be started.
    Launch(String),
    /// The process exited nonzero or was killed by a signal.
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
        stderr: String,
    },
    /// Reading the process output failed.
    Io(String),
    /// A caller cancelled the session.
    Cancelled,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Launch(reason) => write!(f, "failed to launch agent: {reason}"),
            Self::Exited {
                code,
                signal,
                stderr,
            } => {
                match (code, signal) {
                    (Some(code), _) => write!(f, "Process exited with code {code}")?,
                    (None, Some(signal)) => write!(f, "Process killed by signal {signal}")?,
                    (None, None) => f.write_str("Process exited abnormally")?,
                }
                if !stderr.is_empty() {
                    write!(f, "\nStderr: {stderr}")?;
                }
                Ok(())
            }
            Self::Io(reason) => write!(f, "failed to read agent output: {reason}"),
            Self::Cancelled => f.write_str("Request cancelled"),
        }
    }
}

/// Everything observed about one session.
///
/// Mutated only by the session's driver; frozen once the status is terminal.
#[derive(Debug, Clone)]
pub struct SessionState {
    status: SessionStatus,
    events: Vec<DecodedEvent>,
    init: Option<SystemInit>,
    result: Option<SessionResult>,
    tools_used: Vec<String>,
    partial_text: String,
    raw_output: Vec<u8>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Building,
            events: Vec::new(),
            init: None,
            result: None,
            tools_used: Vec::new(),
            partial_text: String::new(),
            raw_output: Vec::new(),
        }
    }

    /// Launch transition. Only valid from `Building`.
    pub fn mark_running(&mut self) -> bool {
        if self.status != SessionStatus::Building {
            return false;
        }
        self.status = SessionStatus::Running;
        true
    }

    /// Move to a terminal status. The first transition wins; later calls
    /// return `false` and change nothing.
    pub fn finish(&mut self, status: SessionStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }

    /// Keep a copy of stdout as received.
    pub fn append_raw(&mut self, chunk: &[u8]) {
        if !self.status.is_terminal() {
            self.raw_output.extend_from_slice(chunk);
        }
    }

    /// Apply one decoded event.
    pub fn record(&mut self, event: DecodedEvent) {
        if self.status.is_terminal() {
            return;
        }
        match &event.message {
            // A repeated init replaces the earlier one.
            Message::SystemInit(init) => self.init = Some(init.clone()),
            Message::StreamEvent(stream) => {
                if matches!(stream.event_type, StreamEventType::MessageStart) {
                    self.partial_text.clear();
                } else if let Some(text) = stream.text_delta() {
                    self.partial_text.push_str(text);
                }
            }
            Message::Assistant(assistant) => {
                for (name, _) in assistant.tool_uses() {
                    if !self.tools_used.iter().any(|t| t == name) {
                        self.tools_used.push(name.to_string());
                    }
                }
            }
            Message::Result(result) => self.result = Some(result.clone()),
            Message::User(_) | Message::Unknown { .. } => {}
        }
        self.events.push(event);
    }

    pub const fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn events(&self) -> &[DecodedEvent] {
        &self.events
    }

    pub const fn init(&self) -> Option<&SystemInit> {
        self.init.as_ref()
    }

    pub const fn result(&self) -> Option<&SessionResult> {
        self.result.as_ref()
    }

    /// Distinct tool names in first-seen order.
    pub fn tools_used(&self) -> &[String] {
        &self.tools_used
    }

    /// Concatenated text deltas of the current turn.
    pub fn partial_text(&self) -> &str {
        &self.partial_text
    }

    /// Stdout as text, with invalid UTF-8 replaced.
    pub fn raw_output(&self) -> String {
        String::from_utf8_lossy(&self.raw_output).into_owned()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
