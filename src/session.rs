//! Conversion session: one engine process driven by a dedicated task.
//!
//! ## Shape
//!
//! ```text
//!  RasterTransform ──commands──▶ session task ──write_all──▶ engine stdin
//!        ▲                           │
//!        │                           └── owns Child, latched error, state
//!        └──────── output ◀── stdout pump task ◀──────────── engine stdout
//! ```
//!
//! The consumer-facing [`crate::transform::RasterTransform`] never touches the
//! child directly. It sends [`SessionCommand`]s and awaits the reply, so the
//! session task is the single owner of every piece of mutable state: the
//! child handle, the stdin pipe, the first latched error and the
//! [`SessionState`].
//!
//! stdout is copied by its own task from the moment the engine starts. An
//! engine that emits output before it has consumed all of its input would
//! otherwise fill the stdout pipe while we are blocked writing stdin.
//!
//! ## States
//!
//! `Spawning → Running → Draining → Completed`, with `Failed` reachable from
//! `Running` and `Draining`. `Completed` and `Failed` are terminal.

use crate::command::EngineInvocation;
use crate::error::RasterError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Read size for the stdout pump.
const STDOUT_BUF_SIZE: usize = 64 * 1024;

/// Lifecycle of a conversion session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The engine process is being started.
    Spawning,
    /// The engine is running and accepts input.
    Running,
    /// Input has ended; waiting for the engine to finish its output.
    Draining,
    /// Output ended and the engine exited successfully.
    Completed,
    /// A terminal error was latched.
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Spawning => "spawning",
            SessionState::Running => "running",
            SessionState::Draining => "draining",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

type Reply = oneshot::Sender<Result<(), RasterError>>;

/// Requests sent from the transform to its session task.
pub(crate) enum SessionCommand {
    /// Forward a chunk of PDF bytes to the engine.
    Write { chunk: Vec<u8>, reply: Reply },
    /// End of input: close stdin, drain stdout, wait for exit.
    Finish { reply: Reply },
}

/// The transform's side of a running session.
pub(crate) struct SessionLink {
    pub commands: mpsc::Sender<SessionCommand>,
    pub output: mpsc::UnboundedReceiver<Vec<u8>>,
    pub state: watch::Receiver<SessionState>,
    pub pid: Option<u32>,
}

/// Start the engine and the task that drives it.
///
/// Must be called from within a Tokio runtime. A spawn failure is returned
/// as [`RasterError::SpawnFailed`]; the caller decides how to surface it.
pub(crate) fn spawn_session(
    engine: &Path,
    invocation: &EngineInvocation,
    forward_stderr: bool,
) -> Result<SessionLink, RasterError> {
    let (state_tx, state_rx) = watch::channel(SessionState::Spawning);

    let stderr = if forward_stderr {
        Stdio::inherit()
    } else {
        Stdio::null()
    };

    let mut child = Command::new(engine)
        .args(invocation.args())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(stderr)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RasterError::SpawnFailed {
            path: engine.to_path_buf(),
            source: Arc::new(e),
        })?;

    let pid = child.id();
    let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
        (Some(i), Some(o)) => (i, o),
        _ => {
            let _ = child.start_kill();
            return Err(RasterError::Internal(
                "engine started without piped stdio".into(),
            ));
        }
    };

    info!(
        "Started engine {} (pid {:?}): {}",
        engine.display(),
        pid,
        invocation
    );

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let pump = tokio::spawn(pump_stdout(stdout, out_tx));

    let (cmd_tx, cmd_rx) = mpsc::channel(1);
    let session = ConversionSession {
        engine: engine.to_path_buf(),
        child,
        stdin: Some(stdin),
        pump,
        pumped: None,
        exit: None,
        latched: None,
        state: state_tx,
    };
    session.set_state(SessionState::Running);
    tokio::spawn(session.run(cmd_rx));

    Ok(SessionLink {
        commands: cmd_tx,
        output: out_rx,
        state: state_rx,
        pid,
    })
}

/// Copy engine stdout into the output channel until EOF.
///
/// Keeps reading after the receiver is gone so the engine never blocks on a
/// full pipe.
async fn pump_stdout(
    mut stdout: ChildStdout,
    out: mpsc::UnboundedSender<Vec<u8>>,
) -> Result<u64, RasterError> {
    let mut buf = vec![0u8; STDOUT_BUF_SIZE];
    let mut total = 0u64;
    loop {
        let n = stdout
            .read(&mut buf)
            .await
            .map_err(RasterError::stdout_read)?;
        if n == 0 {
            debug!("Engine stdout closed after {} bytes", total);
            return Ok(total);
        }
        total += n as u64;
        let _ = out.send(buf[..n].to_vec());
    }
}

/// Session state owned by the driving task.
struct ConversionSession {
    engine: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
    pump: JoinHandle<Result<u64, RasterError>>,
    /// Set once the pump task has been joined.
    pumped: Option<Result<u64, RasterError>>,
    /// Set once the child has been reaped.
    exit: Option<ExitStatus>,
    /// First error wins; never overwritten.
    latched: Option<RasterError>,
    state: watch::Sender<SessionState>,
}

impl ConversionSession {
    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(SessionCommand::Write { chunk, mut reply }) => {
                        // An engine that stops reading stdin would block the
                        // write forever; give up once the caller is gone.
                        let result = tokio::select! {
                            r = self.write(&chunk) => r,
                            _ = reply.closed() => {
                                debug!("Caller went away during a write");
                                self.teardown();
                                return;
                            }
                        };
                        let failed = result.is_err();
                        let _ = reply.send(result);
                        if failed {
                            self.teardown();
                            return;
                        }
                    }
                    Some(SessionCommand::Finish { reply }) => {
                        let result = self.finish().await;
                        if result.is_err() {
                            self.teardown();
                        }
                        let _ = reply.send(result);
                        return;
                    }
                    None => {
                        debug!("Transform dropped while {}", self.current_state());
                        self.teardown();
                        return;
                    }
                },
                status = self.child.wait(), if self.exit.is_none() && self.latched.is_none() => {
                    self.on_exit_while_running(status);
                }
                joined = &mut self.pump, if self.pumped.is_none() => {
                    let result = flatten_join(joined);
                    if let Err(e) = &result {
                        self.latch(e.clone());
                    }
                    self.pumped = Some(result);
                }
            }
        }
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), RasterError> {
        if let Some(e) = &self.latched {
            return Err(e.clone());
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(RasterError::InputClosed);
        };
        if chunk.is_empty() {
            return Ok(());
        }

        if let Err(e) = stdin.write_all(chunk).await {
            // A dead engine shows up as EPIPE; report the exit status instead
            // when it is already known.
            let err = match self.child.try_wait() {
                Ok(Some(status)) if !status.success() => exited(status),
                _ => RasterError::stdin_write(e),
            };
            return Err(self.latch(err));
        }
        debug!("Forwarded {} bytes to engine stdin", chunk.len());
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), RasterError> {
        if let Some(e) = &self.latched {
            return Err(e.clone());
        }
        self.set_state(SessionState::Draining);

        // EOF on stdin tells the engine the document is complete.
        drop(self.stdin.take());

        let pumped = match self.pumped.take() {
            Some(r) => r,
            None => flatten_join((&mut self.pump).await),
        };
        let total = match pumped {
            Ok(n) => n,
            Err(e) => return Err(self.latch(e)),
        };

        let status = match self.exit {
            Some(s) => s,
            None => match self.child.wait().await {
                Ok(s) => {
                    self.exit = Some(s);
                    s
                }
                Err(e) => {
                    return Err(self.latch(RasterError::Internal(format!(
                        "failed to wait for engine: {e}"
                    ))))
                }
            },
        };
        if !status.success() {
            return Err(self.latch(exited(status)));
        }

        info!(
            "Engine {} finished: {} bytes of output",
            self.engine.display(),
            total
        );
        self.set_state(SessionState::Completed);
        Ok(())
    }

    fn on_exit_while_running(&mut self, status: std::io::Result<ExitStatus>) {
        match status {
            Ok(s) => {
                self.exit = Some(s);
                if s.success() {
                    debug!("Engine exited before end of input");
                } else {
                    self.latch(exited(s));
                }
            }
            Err(e) => {
                self.latch(RasterError::Internal(format!(
                    "failed to wait for engine: {e}"
                )));
            }
        }
    }

    /// Record `err` unless an earlier error is already latched, and return
    /// whichever error is now the session's terminal error.
    fn latch(&mut self, err: RasterError) -> RasterError {
        let latched = self.latched.get_or_insert_with(|| {
            warn!("Conversion failed: {}", err);
            err
        });
        let latched = latched.clone();
        self.set_state(SessionState::Failed);
        latched
    }

    /// Kill the engine and stop copying its output.
    fn teardown(&mut self) {
        drop(self.stdin.take());
        if self.exit.is_none() {
            if let Err(e) = self.child.start_kill() {
                debug!("Engine kill skipped: {}", e);
            }
        }
        self.pump.abort();
        if !self.current_state().is_terminal() {
            self.set_state(SessionState::Failed);
        }
    }

    fn set_state(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!("Session {} -> {}", prev, next);
        }
    }

    fn current_state(&self) -> SessionState {
        *self.state.borrow()
    }
}

fn flatten_join(
    joined: Result<Result<u64, RasterError>, tokio::task::JoinError>,
) -> Result<u64, RasterError> {
    joined.map_err(|e| RasterError::Internal(format!("stdout pump task failed: {e}")))?
}

fn exited(status: ExitStatus) -> RasterError {
    RasterError::EngineExited {
        code: status.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Spawning.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert!(!SessionState::Draining.is_terminal());
    }

    #[test]
    fn state_display() {
        assert_eq!(SessionState::Draining.to_string(), "draining");
        assert_eq!(SessionState::Failed.to_string(), "failed");
    }
}
