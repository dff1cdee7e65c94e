//! Process handles, exit classification and stderr draining.

use std::collections::VecDeque;
use std::fmt;
use std::process::ExitStatus;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStderr;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::args::redact_line;
use crate::STDERR_TAIL_LINES;

/// Identifies one spawned process for the lifetime of a launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub u64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which side of the pipe a process sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    Master,
    Feeder,
}

impl ProcessRole {
    pub fn name(self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Feeder => "feeder",
        }
    }
}

/// How a process went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exit code 0.
    Finished,

    /// Non-zero exit, or death by a signal nobody asked for.
    Failed { code: Option<i32> },

    /// Killed through its handle.
    Killed,
}

impl ExitOutcome {
    /// Classify a natural exit.
    pub fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            Self::Finished
        } else {
            Self::Failed {
                code: status.code(),
            }
        }
    }
}

/// Lifecycle of a handle as seen by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Spawned and not yet reported gone.
    Running,

    /// Kill requested; the exit report is still in flight.
    Killed,

    /// Exit reported.
    Exited(ExitOutcome),
}

/// Sent exactly once per spawned process.
#[derive(Debug, Clone)]
pub struct ProcessEvent {
    pub id: ProcessId,
    pub role: ProcessRole,
    pub outcome: ExitOutcome,

    /// Last stderr lines, oldest first.
    pub stderr_tail: Vec<String>,
}

/// Exclusive ownership of one child process.
///
/// Dropping the handle kills the process: the supervisor treats a closed
/// kill channel the same as an explicit kill.
pub struct ProcessHandle {
    id: ProcessId,
    role: ProcessRole,
    pid: Option<u32>,
    status: ProcessStatus,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    /// Wrap a process whose supervisor listens on the other end of `kill_tx`.
    pub fn new(
        id: ProcessId,
        role: ProcessRole,
        pid: Option<u32>,
        kill_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            id,
            role,
            pid,
            status: ProcessStatus::Running,
            kill_tx: Some(kill_tx),
        }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn role(&self) -> ProcessRole {
        self.role
    }

    /// OS pid, when known.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    /// Returns true until the exit has been recorded.
    pub fn is_alive(&self) -> bool {
        !matches!(self.status, ProcessStatus::Exited(_))
    }

    /// Ask the supervisor to kill the process. Idempotent.
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            debug!(id = %self.id, role = self.role.name(), "Kill requested");
            // The supervisor may already be gone if the process just exited.
            let _ = tx.send(());
            self.status = ProcessStatus::Killed;
        }
    }

    /// Record the reported exit.
    pub fn mark_exited(&mut self, outcome: ExitOutcome) {
        self.kill_tx = None;
        self.status = ProcessStatus::Exited(outcome);
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("pid", &self.pid)
            .field("status", &self.status)
            .finish()
    }
}

/// Ring of the most recent stderr lines.
#[derive(Debug, Default)]
pub(crate) struct StderrTail {
    lines: VecDeque<String>,
}

impl StderrTail {
    pub(crate) fn push(&mut self, line: String) {
        if self.lines.len() == STDERR_TAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub(crate) fn into_vec(self) -> Vec<String> {
        self.lines.into()
    }
}

/// Read stderr to EOF so the child never blocks on a full pipe.
///
/// Stream keys are masked before a line is logged or kept.
pub(crate) async fn drain_stderr(stderr: ChildStderr, label: String) -> Vec<String> {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = StderrTail::default();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = redact_line(&line);
                if is_progress_line(&line) {
                    trace!(target: "loopcast_ffmpeg::stderr", process = %label, "{line}");
                } else {
                    debug!(target: "loopcast_ffmpeg::stderr", process = %label, "{line}");
                    tail.push(line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(process = %label, "stderr read error: {}", e);
                break;
            }
        }
    }

    tail.into_vec()
}

fn is_progress_line(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("frame=") || line.starts_with("size=")
}
