//! Feeder process: one file, stream-copied into the master's stdin.

use std::process::Stdio;
use std::time::Duration;

use crossbeam_channel::Sender;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::args::feeder_args;
use crate::master::MasterInput;
use crate::process::{drain_stderr, ExitOutcome, ProcessEvent, ProcessHandle, ProcessId, ProcessRole};
use crate::{FeederConfig, FeederHandle, FfmpegError, FfmpegResult, FfmpegSettings};

/// How long a finished feeder's remaining output may take to reach the master.
const PUMP_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn spawn_feeder(
    runtime: &Handle,
    settings: &FfmpegSettings,
    config: &FeederConfig,
    input: MasterInput,
    id: ProcessId,
    events: Sender<ProcessEvent>,
) -> FfmpegResult<FeederHandle> {
    if !config.path.exists() {
        return Err(FfmpegError::InputNotFound(config.path.clone()));
    }

    let args = feeder_args(settings, &config.path);
    info!(id = %id, file = %config.label, "Spawning feeder");
    debug!(args = ?args, "Feeder command line");

    let _guard = runtime.enter();
    let mut child = Command::new(&settings.binary)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| FfmpegError::Spawn {
            binary: settings.binary.clone(),
            source,
        })?;

    let stdout = child.stdout.take().ok_or(FfmpegError::MissingPipe("stdout"))?;
    let stderr = child.stderr.take().ok_or(FfmpegError::MissingPipe("stderr"))?;
    let pid = child.id();

    let (kill_tx, kill_rx) = oneshot::channel();
    let label = format!("feeder {id} ({})", config.label);
    runtime.spawn(supervise(child, stdout, stderr, input, kill_rx, id, label, events));

    Ok(FeederHandle {
        process: ProcessHandle::new(id, ProcessRole::Feeder, pid, kill_tx),
        path: config.path.clone(),
    })
}

#[allow(clippy::too_many_arguments)]
async fn supervise(
    mut child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    input: MasterInput,
    kill_rx: oneshot::Receiver<()>,
    id: ProcessId,
    label: String,
    events: Sender<ProcessEvent>,
) {
    let drain = tokio::spawn(drain_stderr(stderr, label.clone()));
    let mut pump = tokio::spawn(pump(stdout, input, label.clone()));

    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => ExitOutcome::from_status(status),
            Err(e) => {
                warn!(process = %label, "Wait failed: {}", e);
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

    if outcome == ExitOutcome::Killed {
        pump.abort();
    } else if timeout(PUMP_FLUSH_TIMEOUT, &mut pump).await.is_err() {
        warn!(process = %label, "Output still pending after exit, dropping it");
        pump.abort();
    }

    let stderr_tail = drain.await.unwrap_or_default();
    if let ExitOutcome::Failed { code } = outcome {
        warn!(process = %label, ?code, "Feeder failed");
        for line in &stderr_tail {
            warn!(process = %label, "  {line}");
        }
    }

    let _ = events.send(ProcessEvent {
        id,
        role: ProcessRole::Feeder,
        outcome,
        stderr_tail,
    });
}

/// Copy the feeder's MPEG-TS into the master. The master's stdin is never
/// closed here; it outlives every feeder.
async fn pump(mut stdout: ChildStdout, input: MasterInput, label: String) {
    let mut sink = input.0.lock().await;
    match tokio::io::copy(&mut stdout, &mut *sink).await {
        Ok(bytes) => {
            debug!(process = %label, bytes, "Feeder output delivered");
            if let Err(e) = sink.flush().await {
                debug!(process = %label, "Flush to master failed: {}", e);
            }
        }
        Err(e) => debug!(process = %label, "Pipe to master closed: {}", e),
    }
}
