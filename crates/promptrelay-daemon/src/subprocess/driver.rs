//! Process session: one agent process from launch to termination.
//!
//! Data flow:
//! ```text
//! agent stdout → EventDecoder → SessionState → update channel → consumer
//! agent stderr → warn! log + captured text for failure reports
//! deadline / cancel → same select loop → forced termination
//! ```
//!
//! A single driver task owns the child process and is the only writer of the
//! session state. The deadline and cancellation are polled in the same loop
//! as the stdout reads, so exactly one terminal transition ever happens.
//! Updates go through an unbounded channel: a slow consumer never stalls the
//! pipe reads.

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};

use promptrelay_core::InvocationRequest;
use promptrelay_core::ndjson::{DecodedEvent, EventDecoder, SessionResult, SystemInit};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::SessionError;
use super::command::{SpawnConfig, build_command};
use crate::session::{FailureCause, SessionState, SessionStatus};

const READ_CHUNK_BYTES: usize = 8 * 1024;
/// Stderr read size, also the longest stderr line logged in one piece.
const STDERR_READ_BYTES: usize = 4 * 1024;
/// How long to wait for the stderr reader after the process is gone.
const STDERR_GRACE: Duration = Duration::from_secs(2);

/// Something a session consumer can observe, in order.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    /// A newly decoded record.
    Event(DecodedEvent),
    /// The terminal status. Always the last update.
    Finished(SessionStatus),
}

/// Handle to one running (or finished) agent invocation.
///
/// Dropping the handle cancels the session and kills the process.
pub struct ProcessSession {
    id: String,
    state: Arc<RwLock<SessionState>>,
    updates: mpsc::UnboundedReceiver<SessionUpdate>,
    cancel: CancellationToken,
}

impl ProcessSession {
    /// Build the invocation, launch the agent and start the driver.
    ///
    /// Launch failures do not error here: the returned session is already
    /// `Failed` and yields a single `Finished` update.
    pub fn start(request: &InvocationRequest, config: &SpawnConfig) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let mut state = SessionState::new();
        let (tx, updates) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        match launch(request, config) {
            Ok((child, stdout, stderr)) => {
                state.mark_running();
                info!(
                    session_id = %id,
                    pid = ?child.id(),
                    agent_bin = %config.agent_bin.display(),
                    timeout_secs = config.timeout.as_secs(),
                    "Agent process started"
                );
                let state = Arc::new(RwLock::new(state));
                let driver = Driver {
                    id: id.clone(),
                    state: Arc::clone(&state),
                    tx,
                    cancel: cancel.clone(),
                    timeout: config.timeout,
                    stderr_limit: config.stderr_limit_bytes,
                };
                tokio::spawn(driver.run(child, stdout, stderr));
                Self {
                    id,
                    state,
                    updates,
                    cancel,
                }
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "Agent process failed to launch");
                let status = SessionStatus::Failed(FailureCause::Launch(e.to_string()));
                state.finish(status.clone());
                let _ = tx.send(SessionUpdate::Finished(status));
                Self {
                    id,
                    state: Arc::new(RwLock::new(state)),
                    updates,
                    cancel,
                }
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next update, or `None` once the driver has finished and every update
    /// has been taken.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        self.updates.recv().await
    }

    /// Request forced termination. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.read().await.status().clone()
    }

    /// Events decoded so far, in arrival order.
    pub async fn events(&self) -> Vec<DecodedEvent> {
        self.state.read().await.events().to_vec()
    }

    pub async fn init(&self) -> Option<SystemInit> {
        self.state.read().await.init().cloned()
    }

    pub async fn result(&self) -> Option<SessionResult> {
        self.state.read().await.result().cloned()
    }

    pub async fn tools_used(&self) -> Vec<String> {
        self.state.read().await.tools_used().to_vec()
    }

    /// Copy of the full session state.
    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    /// Drive the session to termination and return its final state.
    pub async fn wait(mut self) -> SessionState {
        while let Some(update) = self.updates.recv().await {
            if matches!(update, SessionUpdate::Finished(_)) {
                break;
            }
        }
        self.snapshot().await
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn launch(
    request: &InvocationRequest,
    config: &SpawnConfig,
) -> Result<(Child, ChildStdout, Option<ChildStderr>), SessionError> {
    let mut cmd = build_command(request, config)?;
    let mut child = cmd.spawn().map_err(|e| SessionError::SpawnFailed {
        reason: format!("{}: {e}", config.agent_bin.display()),
    })?;

    // No interactive input is ever sent.
    drop(child.stdin.take());

    let Some(stdout) = child.stdout.take() else {
        let _ = child.start_kill();
        return Err(SessionError::SpawnFailed {
            reason: "Failed to capture stdout".to_string(),
        });
    };
    let stderr = child.stderr.take();
    Ok((child, stdout, stderr))
}

/// How the read phase ended.
enum Outcome {
    Exited(ExitStatus),
    Forced(SessionStatus),
}

struct Driver {
    id: String,
    state: Arc<RwLock<SessionState>>,
    tx: mpsc::UnboundedSender<SessionUpdate>,
    cancel: CancellationToken,
    timeout: Duration,
    stderr_limit: usize,
}

impl Driver {
    async fn run(self, mut child: Child, mut stdout: ChildStdout, stderr: Option<ChildStderr>) {
        let started = Instant::now();
        let stderr_task = stderr.map(|s| {
            tokio::spawn(capture_stderr(self.id.clone(), s, self.stderr_limit))
        });

        let mut decoder = EventDecoder::new();
        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let forced = loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    break Some(SessionStatus::Failed(FailureCause::Cancelled));
                }
                () = &mut deadline => {
                    warn!(session_id = %self.id, timeout_secs = self.timeout.as_secs(), "Agent process timed out");
                    break Some(SessionStatus::TimedOut);
                }
                read = stdout.read(&mut buf) => match read {
                    Ok(0) => break None,
                    Ok(n) => {
                        let events = decoder.push(&buf[..n]);
                        self.publish(&buf[..n], events).await;
                    }
                    Err(e) => {
                        warn!(session_id = %self.id, error = %e, "Failed to read agent stdout");
                        break Some(SessionStatus::Failed(FailureCause::Io(e.to_string())));
                    }
                },
            }
        };

        let outcome = if let Some(status) = forced {
            self.kill(&mut child).await;
            Outcome::Forced(status)
        } else {
            if let Some(event) = decoder.finish() {
                self.publish(&[], vec![event]).await;
            }
            tokio::select! {
                exit = child.wait() => match exit {
                    Ok(exit) => Outcome::Exited(exit),
                    Err(e) => Outcome::Forced(SessionStatus::Failed(FailureCause::Io(e.to_string()))),
                },
                () = self.cancel.cancelled() => {
                    self.kill(&mut child).await;
                    Outcome::Forced(SessionStatus::Failed(FailureCause::Cancelled))
                }
                () = &mut deadline => {
                    warn!(session_id = %self.id, "Agent process timed out after closing stdout");
                    self.kill(&mut child).await;
                    Outcome::Forced(SessionStatus::TimedOut)
                }
            }
        };

        let stderr = match stderr_task {
            Some(task) => collect_stderr(&self.id, task).await,
            None => String::new(),
        };
        let status = match outcome {
            Outcome::Exited(exit) => status_from_exit(exit, stderr),
            Outcome::Forced(status) => status,
        };

        let (finished, event_count) = {
            let mut state = self.state.write().await;
            (state.finish(status.clone()), state.events().len())
        };
        if finished {
            info!(
                session_id = %self.id,
                status = %status,
                event_count,
                discarded = decoder.discarded(),
                elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Agent session finished"
            );
            let _ = self.tx.send(SessionUpdate::Finished(status));
        }
    }

    async fn publish(&self, chunk: &[u8], events: Vec<DecodedEvent>) {
        {
            let mut state = self.state.write().await;
            state.append_raw(chunk);
            for event in &events {
                state.record(event.clone());
            }
        }
        for event in events {
            // A dropped receiver means the handle is gone and cancellation
            // is already under way.
            let _ = self.tx.send(SessionUpdate::Event(event));
        }
    }

    async fn kill(&self, child: &mut Child) {
        if let Err(e) = child.kill().await {
            warn!(session_id = %self.id, error = %e, "Failed to kill agent process");
        } else {
            debug!(session_id = %self.id, "Agent process killed");
        }
    }
}

fn status_from_exit(exit: ExitStatus, stderr: String) -> SessionStatus {
    if exit.success() {
        return SessionStatus::Completed { exit_code: 0 };
    }
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        exit.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    SessionStatus::Failed(FailureCause::Exited {
        code: exit.code(),
        signal,
        stderr,
    })
}

/// Read stderr to the end, logging each line and keeping the first `limit`
/// bytes for diagnostics. Memory stays bounded however long a line runs.
async fn capture_stderr<R>(session_id: String, mut stderr: R, limit: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; STDERR_READ_BYTES];
    let mut line = Vec::new();
    let mut captured = Vec::new();
    loop {
        let n = match stderr.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "stderr reader failed");
                break;
            }
        };
        let chunk = &buf[..n];
        let room = limit.saturating_sub(captured.len());
        captured.extend_from_slice(&chunk[..room.min(n)]);

        for &byte in chunk {
            if byte == b'\n' || line.len() >= STDERR_READ_BYTES {
                log_stderr_line(&session_id, &line);
                line.clear();
            }
            if byte != b'\n' {
                line.push(byte);
            }
        }
    }
    if !line.is_empty() {
        log_stderr_line(&session_id, &line);
    }
    debug!(session_id = %session_id, "stderr reader finished");
    String::from_utf8_lossy(&captured).trim_end().to_string()
}

fn log_stderr_line(session_id: &str, line: &[u8]) {
    warn!(session_id, "stderr: {}", String::from_utf8_lossy(line).trim_end());
}

async fn collect_stderr(session_id: &str, task: JoinHandle<String>) -> String {
    let abort = task.abort_handle();
    match tokio::time::timeout(STDERR_GRACE, task).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            debug!(session_id, error = %e, "stderr task failed");
            String::new()
        }
        Err(_) => {
            // A grandchild may still hold the pipe open.
            abort.abort();
            String::new()
        }
    }
}
