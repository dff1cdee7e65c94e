//! Main engine orchestrator.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{after, never, select, Receiver, Sender};
use tracing::{debug, error, info, instrument, warn};

use loopcast_ffmpeg::{
    ExitOutcome, FeederConfig, MasterConfig, MediaLauncher, ProcessEvent, ProcessId, ProcessRole,
};
use loopcast_ipc::{
    BroadcastStatus, ControlError, EngineCommand, EngineEvent, EngineState, ShutdownPhase,
    SkipDirection, StartupPhase, StopReason, StreamConfig,
};
use loopcast_store::{Checkpoint, CheckpointFile, ConfigStore};

use crate::error::{EngineError, EngineResult};
use crate::metrics::MetricsCollector;
use crate::playhead::Playhead;
use crate::poller::{ConfigDelta, ConfigPoller, PollUpdate};
use crate::resolver::{PlaylistResolver, ResolvedEntry, Validated};
use crate::state::{FeederSlot, Session};
use crate::status::StatusHandle;
use crate::EngineSettings;

/// Everything the coordinator reacts to.
#[derive(Debug)]
pub(crate) enum Input {
    Command(EngineCommand),
    Poll(PollUpdate),
    Process(ProcessEvent),
    FeederTimer,
    RestartDue,
}

/// The broadcast coordinator.
///
/// Owns the session exclusively and is driven from a single thread: commands,
/// poll results, process exits and timers are all serialized through
/// [`Engine::run`].
pub struct Engine {
    settings: EngineSettings,
    command_rx: Receiver<EngineCommand>,
    event_tx: Sender<EngineEvent>,
    store: Arc<dyn ConfigStore>,
    launcher: Box<dyn MediaLauncher>,
    resolver: PlaylistResolver,
    checkpoint: CheckpointFile,
    state: EngineState,
    session: Option<Session>,
    latest: Option<StreamConfig>,
    restart_due: Option<Receiver<Instant>>,
    poller: Option<ConfigPoller>,
    poll_tx: Sender<PollUpdate>,
    poll_rx: Receiver<PollUpdate>,
    process_tx: Sender<ProcessEvent>,
    process_rx: Receiver<ProcessEvent>,
    metrics: Arc<MetricsCollector>,
    status: StatusHandle,
}

impl Engine {
    /// Create a new engine.
    pub fn new(
        settings: EngineSettings,
        store: Arc<dyn ConfigStore>,
        launcher: Box<dyn MediaLauncher>,
        command_rx: Receiver<EngineCommand>,
        event_tx: Sender<EngineEvent>,
    ) -> Self {
        let (poll_tx, poll_rx) = crossbeam_channel::bounded(4);
        let (process_tx, process_rx) = crossbeam_channel::unbounded();

        Self {
            resolver: PlaylistResolver::new(
                &settings.video_dir,
                &settings.audio_dir,
                settings.url_prefix.clone(),
            ),
            checkpoint: CheckpointFile::new(&settings.checkpoint_path),
            settings,
            command_rx,
            event_tx,
            store,
            launcher,
            state: EngineState::Idle,
            session: None,
            latest: None,
            restart_due: None,
            poller: None,
            poll_tx,
            poll_rx,
            process_tx,
            process_rx,
            metrics: Arc::new(MetricsCollector::new()),
            status: StatusHandle::default(),
        }
    }

    /// Status view that stays valid after the engine moves to its thread.
    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Run the engine (blocking) until a shutdown command arrives or the
    /// command channel disconnects.
    #[instrument(name = "engine_run", skip(self))]
    pub fn run(&mut self) {
        info!(
            launcher = self.launcher.name(),
            store = %self.store.describe(),
            "Engine starting"
        );

        match ConfigPoller::spawn(
            Arc::clone(&self.store),
            self.settings.poll_interval(),
            self.poll_tx.clone(),
        ) {
            Ok(poller) => self.poller = Some(poller),
            Err(e) => {
                error!("Engine cannot start: {}", e);
                self.send_event(EngineEvent::Error {
                    recoverable: false,
                    message: e.to_string(),
                });
                self.send_event(EngineEvent::Shutdown);
                return;
            }
        }

        self.send_event(EngineEvent::Ready);
        self.publish_status();

        let commands = self.command_rx.clone();
        let polls = self.poll_rx.clone();
        let exits = self.process_rx.clone();

        loop {
            let feeder_timer = self
                .session
                .as_ref()
                .and_then(|s| s.feeder.timer().cloned())
                .unwrap_or_else(never);
            let restart_timer = self.restart_due.clone().unwrap_or_else(never);

            let input = select! {
                recv(commands) -> msg => match msg {
                    Ok(command) => Input::Command(command),
                    Err(_) => {
                        info!("Command channel disconnected, shutting down");
                        Input::Command(EngineCommand::Shutdown)
                    }
                },
                recv(polls) -> msg => match msg {
                    Ok(update) => Input::Poll(update),
                    Err(_) => continue,
                },
                recv(exits) -> msg => match msg {
                    Ok(event) => Input::Process(event),
                    Err(_) => continue,
                },
                recv(feeder_timer) -> _ => Input::FeederTimer,
                recv(restart_timer) -> _ => Input::RestartDue,
            };

            if !self.dispatch(input) {
                break;
            }
        }

        info!("Engine stopped");
    }

    /// Handle one input. Returns false if the engine should stop.
    pub(crate) fn dispatch(&mut self, input: Input) -> bool {
        let keep_running = match input {
            Input::Command(command) => self.handle_command(command),
            Input::Poll(update) => {
                self.on_poll(update);
                true
            }
            Input::Process(event) => {
                self.on_process_exit(event);
                true
            }
            Input::FeederTimer => {
                self.on_feeder_timer();
                true
            }
            Input::RestartDue => {
                self.on_restart_due();
                true
            }
        };
        self.publish_status();
        keep_running
    }

    fn handle_command(&mut self, command: EngineCommand) -> bool {
        debug!(?command, "Handling command");

        match command {
            EngineCommand::Skip(direction) => {
                if let Err(e) = self.skip(direction) {
                    info!(?direction, "Skip rejected: {}", e);
                    self.send_event(EngineEvent::Error {
                        recoverable: true,
                        message: format!("Skip rejected: {e}"),
                    });
                }
            }
            EngineCommand::GetStatus => {
                let status = self.build_status();
                self.send_event(EngineEvent::Status(status));
            }
            EngineCommand::Shutdown => {
                self.shutdown();
                return false;
            }
        }

        true
    }

    fn on_poll(&mut self, update: PollUpdate) {
        if update.current.is_none() && update.previous.is_some() {
            info!("Config record disappeared");
        }
        self.latest = update.current.clone();

        let Some(config) = update.current.filter(|c| c.is_active) else {
            self.restart_due = None;
            if self.session.is_some() {
                self.stop_session(StopReason::Deactivated);
            }
            return;
        };

        if self.session.is_none() {
            if self.restart_due.is_some() {
                debug!("Restart settling, not starting yet");
            } else {
                self.start_session(config);
            }
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let delta = ConfigDelta::between(&session.applied, &config);
        if delta.requires_restart() {
            info!(fields = ?delta.critical, "Master settings changed, restarting");
            self.stop_session(StopReason::CriticalChange {
                fields: delta.critical,
            });
            self.restart_due = Some(after(self.settings.restart_settle()));
        } else if delta.playlist_changed {
            self.reload_playlist(config);
        } else {
            session.applied = config;
        }

        if self.session.is_some() {
            self.emit_metrics();
        }
    }

    fn on_restart_due(&mut self) {
        self.restart_due = None;
        if self.session.is_some() {
            return;
        }
        match self.latest.clone() {
            Some(config) if config.is_active => self.start_session(config),
            _ => debug!("Config no longer active after settle delay"),
        }
    }

    /// Bring up a session. On failure everything started so far is dropped
    /// and the next poll tries again.
    #[instrument(name = "start_session", skip(self, config))]
    fn start_session(&mut self, config: StreamConfig) {
        if self.session.is_some() || self.state.is_starting() {
            debug!("Already streaming or starting, ignoring");
            return;
        }

        info!(
            endpoint = %config.rtmp_endpoint.redacted(),
            entries = config.playlist.len(),
            "Starting broadcast"
        );

        match self.try_start(config) {
            Ok(()) => info!("Broadcast live"),
            Err(e) => {
                error!("Broadcast start failed: {}", e);
                if let Some(session) = self.session.take() {
                    self.teardown(session, Vec::new());
                }
                self.transition_to(EngineState::Idle);
                self.send_event(EngineEvent::Error {
                    recoverable: true,
                    message: e.to_string(),
                });
            }
        }
    }

    fn try_start(&mut self, config: StreamConfig) -> EngineResult<()> {
        let mut phase = StartupPhase::ResolvePlaylist;
        self.transition_to(EngineState::Starting { phase });

        let validated = self.resolver.validate(&config.playlist);
        self.write_back(&config, &validated);
        if validated.entries.is_empty() {
            return Err(EngineError::NoPlayableEntries {
                removed: validated.removed(),
            });
        }

        phase = next_phase(phase);
        self.transition_to(EngineState::Starting { phase });
        let start = self.resume_position(&validated.entries);

        phase = next_phase(phase);
        self.transition_to(EngineState::Starting { phase });
        let overlay = self.resolver.resolve_overlay(&config.audio_overlay);
        let master_config = MasterConfig::new(&config, overlay)?;
        let master = self
            .launcher
            .start_master(&master_config, self.process_tx.clone())?;
        info!(master = %master.process.id(), pid = ?master.process.pid(), "Master started");

        let endpoint = config.rtmp_endpoint.redacted();
        let total_entries = validated.entries.len();
        self.session = Some(Session::new(
            master,
            Playhead::new(validated.entries, start),
            config,
        ));
        self.metrics.start();

        phase = next_phase(phase);
        self.transition_to(EngineState::Starting { phase });
        self.start_feeder(start);

        self.transition_to(EngineState::Streaming {
            endpoint,
            total_entries,
        });
        Ok(())
    }

    fn resume_position(&self, entries: &[ResolvedEntry]) -> usize {
        match self.checkpoint.load() {
            Ok(Some(checkpoint)) => {
                let position = Playhead::resume_position(entries, &checkpoint.last_played_entry_id);
                info!(
                    last_played = %checkpoint.last_played_entry_id,
                    start = position,
                    "Resuming playlist"
                );
                position
            }
            Ok(None) => 0,
            Err(e) => {
                warn!("Resume checkpoint unreadable, starting from the top: {}", e);
                0
            }
        }
    }

    fn save_checkpoint(&self, entry: &ResolvedEntry) {
        if let Err(e) = self.checkpoint.save(&Checkpoint::now(entry.identity())) {
            warn!(
                path = %self.checkpoint.path().display(),
                "Failed to write resume checkpoint: {}", e
            );
        }
    }

    fn write_back(&self, config: &StreamConfig, validated: &Validated) {
        if validated.missing.is_empty() || !self.settings.write_back_cleanup {
            return;
        }
        let cleaned = validated.without_missing(&config.playlist);
        match self.store.patch_playlist(&cleaned) {
            Ok(()) => info!(
                removed = validated.missing.len(),
                "Removed entries with missing files from the stored playlist"
            ),
            Err(e) => warn!("Playlist write-back failed: {}", e),
        }
    }

    /// Spawn a feeder for `target` (clamped to the snapshot).
    fn start_feeder(&mut self, target: usize) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if session.playhead.is_empty() {
            warn!(
                retry_ms = self.settings.empty_playlist_retry_ms,
                "No playable entries, waiting"
            );
            session.feeder =
                FeederSlot::AwaitingEntries(after(self.settings.empty_playlist_retry()));
            return;
        }

        let index = session.playhead.jump_to(target);
        let Some(entry) = session.playhead.current().cloned() else {
            return;
        };
        let feeder_config = FeederConfig::new(&entry.path, entry.label());

        let started = match self.launcher.start_feeder(
            &feeder_config,
            &session.master,
            self.process_tx.clone(),
        ) {
            Ok(handle) => {
                info!(
                    index,
                    total = session.playhead.len(),
                    entry = %entry.label(),
                    feeder = %handle.process.id(),
                    "Now playing"
                );
                session.feeder = FeederSlot::Playing(handle);
                self.metrics.record_entry_started();
                true
            }
            Err(e) => {
                warn!(index, entry = %entry.label(), "Feeder failed to start: {}", e);
                self.metrics.record_feeder_failure();
                session.feeder = FeederSlot::Backoff(after(self.settings.feeder_retry_backoff()));
                false
            }
        };

        if started {
            self.save_checkpoint(&entry);
            self.send_event(EngineEvent::NowPlaying {
                index,
                entry: entry.summary(),
            });
        }
    }

    fn on_process_exit(&mut self, event: ProcessEvent) {
        let Some(session) = self.session.as_mut() else {
            debug!(id = %event.id, role = event.role.name(), "Exit from a finished session");
            return;
        };

        match event.role {
            ProcessRole::Master if session.master.process.id() == event.id => {
                session.master.process.mark_exited(event.outcome);
                self.on_master_exit(event);
            }
            ProcessRole::Feeder
                if session.feeder.playing().map(|f| f.process.id()) == Some(event.id) =>
            {
                self.on_feeder_exit(event.outcome);
            }
            _ => debug!(
                id = %event.id,
                role = event.role.name(),
                "Ignoring exit of a superseded process"
            ),
        }
    }

    fn on_feeder_exit(&mut self, outcome: ExitOutcome) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let FeederSlot::Playing(mut handle) =
            std::mem::replace(&mut session.feeder, FeederSlot::Vacant)
        {
            handle.process.mark_exited(outcome);
        }

        if let Some(target) = session.playhead.take_skip() {
            debug!(target, ?outcome, "Feeder stopped for skip");
            self.start_feeder(target);
            return;
        }

        match outcome {
            ExitOutcome::Finished => {
                self.metrics.record_entry_completed();
                let next = session.playhead.next_index();
                self.start_feeder(next);
            }
            ExitOutcome::Failed { code } => {
                self.metrics.record_feeder_failure();
                warn!(
                    ?code,
                    backoff_ms = self.settings.feeder_retry_backoff_ms,
                    "Feeder failed, advancing after backoff"
                );
                session.feeder = FeederSlot::Backoff(after(self.settings.feeder_retry_backoff()));
            }
            ExitOutcome::Killed => debug!("Feeder killed with no skip pending"),
        }
    }

    fn on_feeder_timer(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let target = match session.feeder {
            FeederSlot::Backoff(_) => session.playhead.next_index(),
            FeederSlot::AwaitingEntries(_) => session.playhead.index(),
            FeederSlot::Vacant | FeederSlot::Playing(_) => return,
        };
        session.feeder = FeederSlot::Vacant;
        self.start_feeder(target);
    }

    fn on_master_exit(&mut self, event: ProcessEvent) {
        let message = describe_exit(event.outcome, &event.stderr_tail);
        error!(outcome = ?event.outcome, "Master exited unexpectedly: {}", message);
        self.metrics.record_master_failure();

        self.stop_session(StopReason::MasterExited {
            message: message.clone(),
        });
        self.send_event(EngineEvent::Error {
            recoverable: true,
            message: format!("Master exited: {message}"),
        });
    }

    fn skip(&mut self, direction: SkipDirection) -> Result<usize, ControlError> {
        if !self.state.is_streaming() {
            return Err(ControlError::NotStreaming);
        }
        let session = self.session.as_mut().ok_or(ControlError::NotStreaming)?;
        let target = session
            .playhead
            .request_skip(direction)
            .ok_or(ControlError::EmptyPlaylist)?;
        self.metrics.record_skip();

        if let FeederSlot::Playing(handle) = &mut session.feeder {
            info!(?direction, target, feeder = %handle.process.id(), "Skipping");
            handle.process.kill();
            return Ok(target);
        }

        info!(?direction, target, "Skipping with no feeder running");
        session.playhead.clear_skip();
        session.feeder = FeederSlot::Vacant;
        self.start_feeder(target);
        Ok(target)
    }

    #[instrument(name = "reload_playlist", skip(self, config))]
    fn reload_playlist(&mut self, config: StreamConfig) {
        let validated = self.resolver.validate(&config.playlist);
        self.write_back(&config, &validated);
        let removed = validated.removed();

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.applied = config;

        if validated.entries[..] == session.playhead.snapshot()[..] {
            debug!("Playlist edit leaves the playable set unchanged");
            return;
        }

        let adoption = session.playhead.adopt(validated.entries);
        let total = session.playhead.len();
        self.metrics.record_reload();
        info!(
            total,
            removed,
            index = adoption.index,
            retained = adoption.retained,
            "Playlist reloaded"
        );
        self.send_event(EngineEvent::PlaylistReloaded {
            total,
            removed,
            index: adoption.index,
        });
    }

    /// Tear the session down: feeder first, then master.
    #[instrument(name = "stop_session", skip(self))]
    fn stop_session(&mut self, reason: StopReason) {
        let Some(mut session) = self.session.take() else {
            debug!("No session to stop");
            return;
        };
        info!(reason = %reason.message(), "Stopping broadcast");

        let mut pending = Vec::new();

        self.transition_to(EngineState::Stopping {
            reason: reason.clone(),
            phase: ShutdownPhase::StopFeeder,
        });
        if let FeederSlot::Playing(mut handle) =
            std::mem::replace(&mut session.feeder, FeederSlot::Vacant)
        {
            handle.process.kill();
            pending.push(handle.process.id());
        }

        self.transition_to(EngineState::Stopping {
            reason,
            phase: ShutdownPhase::StopMaster,
        });
        self.teardown(session, pending);

        self.transition_to(EngineState::Idle);
        info!("Broadcast stopped");
    }

    fn teardown(&mut self, mut session: Session, mut pending: Vec<ProcessId>) {
        if session.master.process.is_alive() {
            session.master.process.kill();
            pending.push(session.master.process.id());
        }
        self.await_exits(pending);
        self.metrics.stop();
    }

    /// Wait for exit reports, up to the shutdown grace period.
    fn await_exits(&self, mut pending: Vec<ProcessId>) {
        let deadline = Instant::now() + self.settings.shutdown_grace();

        while !pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(?pending, "Processes did not confirm exit in time");
                return;
            }
            match self.process_rx.recv_timeout(remaining) {
                Ok(event) => {
                    debug!(
                        id = %event.id,
                        role = event.role.name(),
                        outcome = ?event.outcome,
                        "Process exited"
                    );
                    pending.retain(|id| *id != event.id);
                }
                Err(_) => {
                    warn!(?pending, "Processes did not confirm exit in time");
                    return;
                }
            }
        }
    }

    fn shutdown(&mut self) {
        info!("Engine shutting down");
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
        self.restart_due = None;
        self.stop_session(StopReason::Shutdown);
        self.send_event(EngineEvent::Shutdown);
    }

    fn build_status(&self) -> BroadcastStatus {
        let session = self.session.as_ref();
        let playhead = session.map(|s| &s.playhead);

        BroadcastStatus {
            is_streaming: self.state.is_streaming(),
            state: self.state.name().to_string(),
            current_index: playhead.filter(|p| !p.is_empty()).map(Playhead::index),
            total_entries: playhead.map_or(0, Playhead::len),
            current_entry: playhead
                .and_then(Playhead::current)
                .map(ResolvedEntry::summary),
            next_entry: playhead
                .and_then(Playhead::peek_next)
                .map(ResolvedEntry::summary),
            metrics: self.metrics.snapshot(),
        }
    }

    fn publish_status(&self) {
        self.status.publish(self.build_status());
    }

    fn emit_metrics(&self) {
        self.send_event(EngineEvent::Metrics(self.metrics.snapshot()));
    }

    fn transition_to(&mut self, new_state: EngineState) {
        let previous = std::mem::replace(&mut self.state, new_state.clone());

        debug!(
            previous = %previous.name(),
            current = %new_state.name(),
            "State transition"
        );

        self.send_event(EngineEvent::StateChanged {
            previous: Box::new(previous),
            current: Box::new(new_state),
        });
    }

    fn send_event(&self, event: EngineEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("Failed to send event: {}", e);
        }
    }
}

fn next_phase(phase: StartupPhase) -> StartupPhase {
    phase.next().unwrap_or(phase)
}

fn describe_exit(outcome: ExitOutcome, stderr_tail: &[String]) -> String {
    let summary = match outcome {
        ExitOutcome::Finished => "exited with code 0".to_string(),
        ExitOutcome::Failed { code: Some(code) } => format!("exited with code {code}"),
        ExitOutcome::Failed { code: None } => "terminated by signal".to_string(),
        ExitOutcome::Killed => "killed".to_string(),
    };
    match stderr_tail.last() {
        Some(line) => format!("{summary}: {line}"),
        None => summary,
    }
}

#[cfg(test)]
mod tests;
