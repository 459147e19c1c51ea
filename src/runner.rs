//! Process runner: execute one invocation and capture its output
//!
//! The child's stdout and stderr are drained concurrently on their own
//! tasks while the runner waits for exit, so a chatty process can never
//! block on a full pipe. A run is finished once the child has exited *and*
//! both pipes reached EOF; the optional timeout and the cancellation signal
//! cover that whole span.
//!
//! On unix every child leads its own process group. A timeout, a cancellation
//! or dropping the run future kills the whole group, so helpers the simulator
//! started (a wrapper script's background jobs, say) die with it.

use crate::command::Invocation;
use crate::sweep::CancelSignal;
use chrono::{DateTime, Utc};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default time allowed for pipes to drain after a forced kill.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(1);

/// Why a run produced no [`RunResult`].
#[derive(Debug, Error)]
pub enum RunError {
    /// The executable could not be started
    #[error("failed to spawn: {0}")]
    Spawn(#[source] std::io::Error),

    /// The child started but waiting on it failed
    #[error("failed to wait for child: {0}")]
    Wait(#[source] std::io::Error),
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// Process exited on its own with this code
    Exited(i32),
    /// Process was terminated by a signal it did not get from the runner
    Terminated,
    /// Runner killed the process after the timeout expired
    TimedOut,
    /// Runner killed the process because the sweep was cancelled
    Cancelled,
}

impl ExitState {
    /// True only for a zero exit code.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }

    fn from_status(status: ExitStatus) -> Self {
        status.code().map_or(Self::Terminated, Self::Exited)
    }
}

/// Everything captured from one external-process run.
#[derive(Debug, Clone)]
pub struct RunResult {
    stdout: String,
    stderr: String,
    exit: ExitState,
    started_at: DateTime<Utc>,
    duration: Duration,
    pid: Option<u32>,
}

impl RunResult {
    /// Captured standard output (lossy UTF-8).
    #[must_use]
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Captured standard error (lossy UTF-8).
    #[must_use]
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// How the process ended.
    #[must_use]
    pub const fn exit(&self) -> ExitState {
        self.exit
    }

    /// Wall-clock time the process was started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Wall-clock duration from spawn to exit (or kill).
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// OS process id of the child, if it was still known after spawn.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// Runs invocations as child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
    kill_grace: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ProcessRunner {
    /// Create a runner with an optional per-invocation timeout.
    #[must_use]
    pub const fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// Set how long to wait for pipes to drain after a forced kill.
    #[must_use]
    pub const fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Get the per-invocation timeout.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Execute one invocation to completion, timeout or cancellation.
    ///
    /// Non-zero exits are not errors: they are reported in
    /// [`RunResult::exit`]. Never retries. When this future is dropped
    /// before it resolves, the child's process group is killed.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Spawn`] if the process could not be started, or
    /// [`RunError::Wait`] if the OS failed to report on a started child.
    pub async fn run(
        &self,
        invocation: &Invocation,
        cancel: &mut CancelSignal,
    ) -> Result<RunResult, RunError> {
        let mut command = Command::new(invocation.program());
        command
            .args(invocation.arg_list())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command.spawn().map_err(RunError::Spawn)?;

        let started_at = Utc::now();
        let started = Instant::now();
        let pid = child.id();
        let group = ProcessGroup::led_by(pid);
        debug!(pid = ?pid, %invocation, "spawned");

        let mut stdout = Capture::new(child.stdout.take());
        let mut stderr = Capture::new(child.stderr.take());

        let deadline = async {
            match self.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };

        let stop = tokio::select! {
            status = async {
                let status = child.wait().await?;
                stdout.finish().await;
                stderr.finish().await;
                Ok::<_, std::io::Error>(status)
            } => Stop::Finished(status.map_err(RunError::Wait)?),
            () = deadline => Stop::TimedOut,
            () = cancel.cancelled() => Stop::Cancelled,
        };

        let exit = match stop {
            Stop::Finished(status) => ExitState::from_status(status),
            Stop::TimedOut => {
                terminate(&group, &mut child, pid).await;
                ExitState::TimedOut
            }
            Stop::Cancelled => {
                terminate(&group, &mut child, pid).await;
                ExitState::Cancelled
            }
        };
        let duration = started.elapsed();

        stdout.finish_within(self.kill_grace).await;
        stderr.finish_within(self.kill_grace).await;

        Ok(RunResult {
            stdout: stdout.text,
            stderr: stderr.text,
            exit,
            started_at,
            duration,
            pid,
        })
    }
}

enum Stop {
    Finished(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Process group led by one child; killed when dropped.
///
/// Killing an already empty group is a no-op, so the guard also sweeps up
/// background jobs left behind by a child that exited normally.
struct ProcessGroup {
    #[cfg_attr(not(unix), allow(dead_code))]
    pgid: Option<i32>,
}

impl ProcessGroup {
    fn led_by(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|pid| i32::try_from(pid).ok()),
        }
    }

    #[cfg(unix)]
    fn kill(&self) {
        let Some(pgid) = self.pgid else {
            return;
        };
        // SAFETY: killpg only delivers a signal; it touches no memory.
        if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
            let e = std::io::Error::last_os_error();
            if e.raw_os_error() != Some(libc::ESRCH) {
                warn!(pgid, error = %e, "failed to kill process group");
            }
        }
    }

    #[cfg(not(unix))]
    const fn kill(&self) {}
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Kill the child's process group and reap the child.
async fn terminate(group: &ProcessGroup, child: &mut Child, pid: Option<u32>) {
    group.kill();
    // The leader may have left its group; an already reaped leader refuses.
    if let Err(e) = child.start_kill() {
        debug!(pid = ?pid, error = %e, "child not signalled directly");
    }
    if let Err(e) = child.wait().await {
        warn!(pid = ?pid, error = %e, "failed to reap child process");
    }
}

/// One output pipe, drained to EOF on its own task.
struct Capture {
    task: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    text: String,
}

impl Capture {
    fn new<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let task = pipe.map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                pipe.read_to_end(&mut buf).await?;
                Ok::<_, std::io::Error>(buf)
            })
        });
        Self {
            task,
            text: String::new(),
        }
    }

    /// Wait for EOF. Cancel-safe: an interrupted wait can be resumed.
    async fn finish(&mut self) {
        let Some(task) = self.task.as_mut() else {
            return;
        };
        let joined = task.await;
        self.task = None;
        self.text = match joined {
            Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Err(e)) => {
                warn!(error = %e, "failed to read child output");
                String::new()
            }
            Err(e) => {
                warn!(error = %e, "output drain task failed");
                String::new()
            }
        };
    }

    /// Wait at most `grace` for EOF, then abandon the pipe.
    async fn finish_within(&mut self, grace: Duration) {
        if tokio::time::timeout(grace, self.finish()).await.is_err() {
            if let Some(task) = self.task.take() {
                task.abort();
            }
            warn!("pipe still open after kill, output truncated");
        }
    }
}
