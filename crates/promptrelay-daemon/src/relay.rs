//! Live relay: forwards session events to one client connection as they
//! are decoded, one JSON record per line.
//!
//! The client side is a bounded channel of byte chunks that the HTTP layer
//! turns into a chunked body. Once the receiver is gone every further emit
//! is a no-op and the session is cancelled; the relay keeps draining
//! updates until the driver reports termination.

use axum::body::Bytes;
use promptrelay_core::ndjson::Message;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::session::{FailureCause, SessionStatus};
use crate::subprocess::{ProcessSession, SessionUpdate};

/// Summary of one relayed session.
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    /// Records written to the client, including a synthesized error record.
    pub delivered: usize,
    pub client_disconnected: bool,
    pub status: SessionStatus,
}

pub struct LiveRelay {
    sink: mpsc::Sender<Bytes>,
    connected: bool,
    delivered: usize,
}

impl LiveRelay {
    /// Create a relay and the receiving half for the client body.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (sink, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                sink,
                connected: true,
                delivered: 0,
            },
            rx,
        )
    }

    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Write one record followed by a newline. Returns `false` once the
    /// client is gone.
    pub async fn emit(&mut self, record: &Value) -> bool {
        if !self.connected {
            return false;
        }
        let mut line = match serde_json::to_vec(record) {
            Ok(line) => line,
            Err(e) => {
                debug!(error = %e, "Skipping unserializable record");
                return true;
            }
        };
        line.push(b'\n');
        if self.sink.send(Bytes::from(line)).await.is_err() {
            debug!("Stream client disconnected");
            self.connected = false;
            return false;
        }
        self.delivered += 1;
        true
    }

    /// Relay `session` until it terminates.
    pub async fn run(mut self, mut session: ProcessSession) -> RelayOutcome {
        let mut saw_result = false;
        let status = loop {
            let update = tokio::select! {
                update = session.next_update() => update,
                () = self.sink.closed(), if self.connected => {
                    debug!(session_id = %session.id(), "Stream client disconnected");
                    self.connected = false;
                    session.cancel();
                    continue;
                }
            };
            match update {
                Some(SessionUpdate::Event(event)) => {
                    if matches!(event.message, Message::Result(_)) {
                        saw_result = true;
                    }
                    if !self.emit(&event.raw).await {
                        session.cancel();
                    }
                }
                Some(SessionUpdate::Finished(status)) => break status,
                None => break session.status().await,
            }
        };

        if let Some(message) = error_message(&status, saw_result) {
            self.emit(&json!({ "type": "error", "message": message }))
                .await;
        }

        info!(
            session_id = %session.id(),
            status = %status,
            delivered = self.delivered,
            client_disconnected = !self.connected,
            "Stream relay finished"
        );
        RelayOutcome {
            delivered: self.delivered,
            client_disconnected: !self.connected,
            status,
        }
    }
}

/// In-band error text for a terminal status, if the client needs one.
pub fn error_message(status: &SessionStatus, saw_result: bool) -> Option<String> {
    match status {
        SessionStatus::Completed { .. } if saw_result => None,
        SessionStatus::Completed { .. } => Some("No result in agent response".to_string()),
        SessionStatus::TimedOut => Some("Request timed out".to_string()),
        SessionStatus::Failed(FailureCause::Exited {
            code: Some(code), ..
        }) => Some(format!("Process exited with code {code}")),
        SessionStatus::Failed(FailureCause::Launch(reason)) => Some(reason.clone()),
        SessionStatus::Failed(cause) => Some(cause.to_string()),
        SessionStatus::Building | SessionStatus::Running => None,
    }
}
