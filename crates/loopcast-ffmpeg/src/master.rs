//! Master process: persistent encoder publishing to RTMP.

use std::process::Stdio;
use std::sync::Arc;

use crossbeam_channel::Sender;
use tokio::process::{Child, ChildStdin, Command};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info, warn};

use crate::args::{master_args, redact_args};
use crate::process::{drain_stderr, ExitOutcome, ProcessEvent, ProcessHandle, ProcessId, ProcessRole};
use crate::{FfmpegError, FfmpegResult, FfmpegSettings, MasterConfig, MasterHandle};

/// Write side of the master's stdin.
///
/// Feeders lock it for the whole of their output, so two feeders never
/// interleave bytes and the next one starts only after the previous one has
/// been fully flushed.
#[derive(Debug, Clone)]
pub struct MasterInput(pub(crate) Arc<Mutex<ChildStdin>>);

pub(crate) fn spawn_master(
    runtime: &Handle,
    settings: &FfmpegSettings,
    config: &MasterConfig,
    id: ProcessId,
    events: Sender<ProcessEvent>,
) -> FfmpegResult<MasterHandle> {
    let args = master_args(settings, config);
    info!(
        id = %id,
        endpoint = %config.endpoint().redacted(),
        bitrate_kbps = config.video_bitrate_kbps(),
        overlay = config.overlay().is_some(),
        "Spawning master"
    );
    tracing::debug!(args = ?redact_args(&args), "Master command line");

    // Child::spawn registers with the reactor, so it must run inside the runtime.
    let _guard = runtime.enter();
    let mut child = Command::new(&settings.binary)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| FfmpegError::Spawn {
            binary: settings.binary.clone(),
            source,
        })?;

    let stdin = child.stdin.take().ok_or(FfmpegError::MissingPipe("stdin"))?;
    let stderr = child.stderr.take().ok_or(FfmpegError::MissingPipe("stderr"))?;
    let pid = child.id();
    let input = MasterInput(Arc::new(Mutex::new(stdin)));

    let (kill_tx, kill_rx) = oneshot::channel();
    let label = format!("master {id}");
    runtime.spawn(supervise(child, stderr, kill_rx, id, label, events));

    Ok(MasterHandle {
        process: ProcessHandle::new(id, ProcessRole::Master, pid, kill_tx),
        input: Some(input),
    })
}

async fn supervise(
    mut child: Child,
    stderr: tokio::process::ChildStderr,
    kill_rx: oneshot::Receiver<()>,
    id: ProcessId,
    label: String,
    events: Sender<ProcessEvent>,
) {
    let drain = tokio::spawn(drain_stderr(stderr, label.clone()));

    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => ExitOutcome::from_status(status),
            Err(e) => {
                error!(process = %label, "Wait failed: {}", e);
                ExitOutcome::Failed { code: None }
            }
        },
        _ = kill_rx => {
            if let Err(e) = child.kill().await {
                warn!(process = %label, "Kill failed: {}", e);
            }
            ExitOutcome::Killed
        }
    };

    let stderr_tail = drain.await.unwrap_or_default();
    if outcome != ExitOutcome::Killed {
        warn!(process = %label, ?outcome, "Master exited unexpectedly");
        for line in &stderr_tail {
            warn!(process = %label, "  {line}");
        }
    }

    let _ = events.send(ProcessEvent {
        id,
        role: ProcessRole::Master,
        outcome,
        stderr_tail,
    });
}
