//! Process lifecycle for one CLI invocation
//!
//! The supervisor owns the child from spawn to reap. Stdout lines flow to the
//! caller through a bounded channel, so a slow consumer stops the reader and,
//! once the pipe buffer fills, the child itself. Stderr is collected on the
//! side for failure classification.

use std::process::Stdio;
use std::time::Duration;

use bridge_config::CliConfig;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::classify::classify_failure;
use crate::error::{CliError, TimeoutKind};
use crate::invocation::Invocation;

/// Upper bound on retained stderr
const STDERR_LIMIT: usize = 64 * 1024;

/// Limits applied to every supervised process
#[derive(Debug, Clone, Copy)]
pub struct SupervisorSettings {
    pub timeout: Duration,
    pub idle_timeout: Duration,
    pub kill_grace: Duration,
    pub channel_capacity: usize,
}

impl From<&CliConfig> for SupervisorSettings {
    fn from(config: &CliConfig) -> Self {
        Self {
            timeout: config.timeout,
            idle_timeout: config.idle_timeout,
            kill_grace: config.kill_grace,
            channel_capacity: config.channel_capacity,
        }
    }
}

/// What the supervisor reports about a running process
#[derive(Debug)]
pub enum SupervisorEvent {
    /// One stdout line, without its terminator
    Line(String),
    /// The process exited with status 0
    Completed,
    /// The process failed, timed out, or could not be read
    Failed(CliError),
}

/// Spawns and watches CLI processes
#[derive(Debug, Clone, Copy)]
pub struct Supervisor {
    settings: SupervisorSettings,
}

impl Supervisor {
    pub const fn new(settings: SupervisorSettings) -> Self {
        Self { settings }
    }

    pub const fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Start `invocation` and begin streaming its output
    ///
    /// Cancelling `cancel`, or dropping the returned handle, kills the process
    /// and ends the event stream without a terminal event.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::NotFound`] when the executable is missing or not
    /// executable, and [`CliError::Io`] for other spawn failures
    pub async fn spawn(&self, invocation: Invocation, cancel: &CancellationToken) -> Result<SupervisedProcess, CliError> {
        let mut command = invocation.command();
        command
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = spawn_with_retry(&mut command).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => CliError::NotFound {
                path: invocation.executable.display().to_string(),
            },
            _ => CliError::Io(e),
        })?;

        let pid = child.id();
        tracing::debug!(pid, executable = %invocation.executable.display(), "spawned claude CLI");

        if let (Some(stdin), Some(payload)) = (child.stdin.take(), invocation.stdin) {
            tokio::spawn(write_stdin(stdin, payload));
        }

        let token = cancel.child_token();
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let task = tokio::spawn(supervise(child, self.settings, token.clone(), tx));

        Ok(SupervisedProcess {
            events: rx,
            pid,
            task,
            cancel_on_drop: token.drop_guard(),
        })
    }
}

/// Handle to a supervised process
///
/// Dropping it cancels the process.
pub struct SupervisedProcess {
    events: mpsc::Receiver<SupervisorEvent>,
    pid: Option<u32>,
    task: JoinHandle<()>,
    cancel_on_drop: DropGuard,
}

impl SupervisedProcess {
    /// Next event, or `None` once the process is finished or cancelled
    pub async fn next_event(&mut self) -> Option<SupervisorEvent> {
        self.events.recv().await
    }

    /// OS process id at spawn time
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Cancel the process and wait until it has been reaped
    pub async fn shutdown(self) {
        let Self {
            events,
            task,
            cancel_on_drop,
            ..
        } = self;
        drop(events);
        drop(cancel_on_drop);
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "supervisor task failed");
        }
    }
}

/// Spawn, retrying briefly while the executable is still open for writing
///
/// A script written just before it is run can report `ETXTBSY` when another
/// thread forked while the write handle was open.
async fn spawn_with_retry(command: &mut tokio::process::Command) -> std::io::Result<Child> {
    let mut backoff = Duration::from_millis(2);
    let mut attempt = 0;
    loop {
        match command.spawn() {
            Err(e) if is_text_busy(&e) && attempt < 4 => {
                attempt += 1;
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_millis(50));
            }
            result => return result,
        }
    }
}

pub(crate) fn is_text_busy(error: &std::io::Error) -> bool {
    error.kind() == std::io::ErrorKind::ExecutableFileBusy || error.raw_os_error() == Some(26)
}

async fn write_stdin(mut stdin: ChildStdin, payload: String) {
    if let Err(e) = stdin.write_all(payload.as_bytes()).await {
        tracing::debug!(error = %e, "claude CLI closed stdin early");
        return;
    }
    if let Err(e) = stdin.shutdown().await {
        tracing::debug!(error = %e, "failed to close claude CLI stdin");
    }
}

/// How the read loop ended
enum Outcome {
    Eof,
    Cancelled,
    TimedOut(TimeoutKind),
    ReadFailed(std::io::Error),
}

async fn supervise(
    mut child: Child,
    settings: SupervisorSettings,
    cancel: CancellationToken,
    tx: mpsc::Sender<SupervisorEvent>,
) {
    let started = Instant::now();
    let deadline = tokio::time::sleep(settings.timeout);
    tokio::pin!(deadline);

    let stderr = child.stderr.take().map(|pipe| tokio::spawn(collect_stderr(pipe)));

    let outcome = match child.stdout.take() {
        Some(stdout) => pump_stdout(stdout, &settings, &cancel, deadline.as_mut(), &tx).await,
        None => Outcome::Eof,
    };

    let status = match outcome {
        Outcome::Eof => tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            () = deadline.as_mut() => {
                terminate(&mut child, settings.kill_grace).await;
                let _ = tx.send(SupervisorEvent::Failed(timeout_error(TimeoutKind::Deadline, &settings))).await;
                return;
            }
            status = child.wait() => Some(status),
        },
        Outcome::Cancelled => None,
        Outcome::TimedOut(kind) => {
            tracing::warn!(?kind, elapsed = ?started.elapsed(), "claude CLI exceeded its time limit");
            terminate(&mut child, settings.kill_grace).await;
            let _ = tx.send(SupervisorEvent::Failed(timeout_error(kind, &settings))).await;
            return;
        }
        Outcome::ReadFailed(e) => {
            terminate(&mut child, settings.kill_grace).await;
            let _ = tx.send(SupervisorEvent::Failed(CliError::Io(e))).await;
            return;
        }
    };

    let Some(status) = status else {
        terminate(&mut child, settings.kill_grace).await;
        tracing::debug!("claude CLI cancelled");
        return;
    };

    let event = match status {
        Ok(status) if status.success() => {
            tracing::debug!(elapsed = ?started.elapsed(), "claude CLI completed");
            SupervisorEvent::Completed
        }
        Ok(status) => {
            let stderr = match stderr {
                Some(handle) => tokio::time::timeout(settings.kill_grace, handle)
                    .await
                    .ok()
                    .and_then(Result::ok)
                    .unwrap_or_default(),
                None => String::new(),
            };
            tracing::warn!(code = status.code(), %stderr, "claude CLI exited with failure");
            SupervisorEvent::Failed(classify_failure(status.code(), &stderr, None))
        }
        Err(e) => SupervisorEvent::Failed(CliError::Io(e)),
    };

    let _ = tx.send(event).await;
}

/// Forward stdout lines until EOF, cancellation, a timeout, or a read error
async fn pump_stdout<R>(
    stdout: R,
    settings: &SupervisorSettings,
    cancel: &CancellationToken,
    mut deadline: std::pin::Pin<&mut Sleep>,
    tx: &mpsc::Sender<SupervisorEvent>,
) -> Outcome
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let idle = tokio::time::sleep(settings.idle_timeout);

        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => return Outcome::Cancelled,
            () = deadline.as_mut() => return Outcome::TimedOut(TimeoutKind::Deadline),
            () = idle => return Outcome::TimedOut(TimeoutKind::Idle),
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => return Outcome::Eof,
            Ok(_) => {}
            Err(e) => return Outcome::ReadFailed(e),
        }

        let line = String::from_utf8_lossy(&buf).trim_end_matches(['\r', '\n']).to_owned();

        // Waiting on a full channel is the consumer's delay, so only the
        // deadline applies here
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Outcome::Cancelled,
            () = deadline.as_mut() => return Outcome::TimedOut(TimeoutKind::Deadline),
            sent = tx.send(SupervisorEvent::Line(line)) => {
                if sent.is_err() {
                    return Outcome::Cancelled;
                }
            }
        }
    }
}

async fn collect_stderr<R>(pipe: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut limited = pipe.take(STDERR_LIMIT as u64);
    if let Err(e) = limited.read_to_end(&mut buf).await {
        tracing::debug!(error = %e, "failed to read claude CLI stderr");
    }
    // Keep draining so the child never blocks on a full stderr pipe
    let mut rest = limited.into_inner();
    let _ = tokio::io::copy(&mut rest, &mut tokio::io::sink()).await;

    String::from_utf8_lossy(&buf).into_owned()
}

/// Kill the child and give it `grace` to be reaped
async fn terminate(child: &mut Child, grace: Duration) {
    if let Err(e) = child.start_kill() {
        // Already exited
        tracing::trace!(error = %e, "kill skipped");
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => tracing::debug!(%status, "claude CLI reaped"),
        Ok(Err(e)) => tracing::warn!(error = %e, "failed to reap claude CLI"),
        Err(_) => tracing::warn!(?grace, "claude CLI was not reaped within the kill grace period"),
    }
}

const fn timeout_error(kind: TimeoutKind, settings: &SupervisorSettings) -> CliError {
    let limit = match kind {
        TimeoutKind::Deadline => settings.timeout,
        TimeoutKind::Idle => settings.idle_timeout,
    };
    CliError::Timeout { kind, limit }
}
