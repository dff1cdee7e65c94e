use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::oneshot;

use loopcast_ffmpeg::{
    ExitOutcome, FeederConfig, FeederHandle, FfmpegError, FfmpegResult, MasterConfig,
    MasterHandle, MediaLauncher, ProcessEvent, ProcessHandle, ProcessId, ProcessRole,
};
use loopcast_ipc::{
    EngineCommand, EngineEvent, PlaylistEntry, RtmpEndpoint, SkipDirection,
    StreamConfig,
};
use loopcast_store::{Checkpoint, CheckpointFile, MemoryConfigStore};

use super::{Engine, Input};
use crate::poller::PollUpdate;
use crate::EngineSettings;

#[derive(Default)]
struct Launched {
    next_id: u64,
    masters: Vec<(ProcessId, MasterConfig)>,
    feeders: Vec<(ProcessId, PathBuf)>,
    live: Vec<(ProcessId, ProcessRole, oneshot::Receiver<()>)>,
    fail_feeders: bool,
}

/// Records launches; processes only "exit" when a test says so or when
/// their handle asks for a kill.
#[derive(Clone, Default)]
struct FakeLauncher {
    inner: Arc<Mutex<Launched>>,
}

impl FakeLauncher {
    fn spawn(&self, role: ProcessRole) -> ProcessHandle {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = ProcessId(inner.next_id);
        let (kill_tx, kill_rx) = oneshot::channel();
        inner.live.push((id, role, kill_rx));
        ProcessHandle::new(id, role, None, kill_tx)
    }

    fn master_count(&self) -> usize {
        self.inner.lock().masters.len()
    }

    fn last_master(&self) -> ProcessId {
        self.inner.lock().masters.last().unwrap().0
    }

    fn last_feeder(&self) -> ProcessId {
        self.inner.lock().feeders.last().unwrap().0
    }

    /// File names fed so far, in order.
    fn played(&self) -> Vec<String> {
        self.inner
            .lock()
            .feeders
            .iter()
            .map(|(_, path)| path.file_stem().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    /// Exit reports for every process whose handle requested a kill or was dropped.
    fn killed(&self) -> Vec<ProcessEvent> {
        let mut inner = self.inner.lock();
        let mut events = Vec::new();
        inner.live.retain_mut(|(id, role, kill_rx)| match kill_rx.try_recv() {
            Err(oneshot::error::TryRecvError::Empty) => true,
            _ => {
                events.push(ProcessEvent {
                    id: *id,
                    role: *role,
                    outcome: ExitOutcome::Killed,
                    stderr_tail: Vec::new(),
                });
                false
            }
        });
        events
    }

    fn forget(&self, id: ProcessId) {
        self.inner.lock().live.retain(|(live, _, _)| *live != id);
    }

    fn set_fail_feeders(&self, fail: bool) {
        self.inner.lock().fail_feeders = fail;
    }
}

impl MediaLauncher for FakeLauncher {
    fn start_master(
        &self,
        config: &MasterConfig,
        _events: crossbeam_channel::Sender<ProcessEvent>,
    ) -> FfmpegResult<MasterHandle> {
        let process = self.spawn(ProcessRole::Master);
        self.inner.lock().masters.push((process.id(), config.clone()));
        Ok(MasterHandle {
            process,
            input: None,
        })
    }

    fn start_feeder(
        &self,
        config: &FeederConfig,
        _master: &MasterHandle,
        _events: crossbeam_channel::Sender<ProcessEvent>,
    ) -> FfmpegResult<FeederHandle> {
        if self.inner.lock().fail_feeders {
            return Err(FfmpegError::InputNotFound(config.path.clone()));
        }
        let process = self.spawn(ProcessRole::Feeder);
        self.inner
            .lock()
            .feeders
            .push((process.id(), config.path.clone()));
        Ok(FeederHandle {
            process,
            path: config.path.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

struct Harness {
    engine: Engine,
    launcher: FakeLauncher,
    store: MemoryConfigStore,
    events: Receiver<EngineEvent>,
    dir: TempDir,
    _commands: crossbeam_channel::Sender<EngineCommand>,
}

impl Harness {
    /// Engine over a temp media dir containing `<name>.mp4` for each of `files`.
    fn new(files: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let videos = dir.path().join("videos");
        fs::create_dir_all(&videos).unwrap();
        for name in files {
            fs::write(videos.join(format!("{name}.mp4")), b"").unwrap();
        }

        let settings = EngineSettings {
            poll_interval_ms: 10,
            feeder_retry_backoff_ms: 0,
            restart_settle_ms: 0,
            empty_playlist_retry_ms: 0,
            shutdown_grace_ms: 0,
            video_dir: videos,
            audio_dir: dir.path().join("audio"),
            url_prefix: "/videos/".to_string(),
            checkpoint_path: dir.path().join("data/resume.json"),
            write_back_cleanup: true,
        };

        let launcher = FakeLauncher::default();
        let store = MemoryConfigStore::default();
        let (command_tx, command_rx) = loopcast_ipc::command_channel();
        let (event_tx, events) = crossbeam_channel::unbounded();
        let engine = Engine::new(
            settings,
            Arc::new(store.clone()),
            Box::new(launcher.clone()),
            command_rx,
            event_tx,
        );

        Self {
            engine,
            launcher,
            store,
            events,
            dir,
            _commands: command_tx,
        }
    }

    fn config(names: &[&str]) -> StreamConfig {
        StreamConfig {
            is_active: true,
            rtmp_endpoint: RtmpEndpoint {
                base_url: "rtmp://live.example.com/app".to_string(),
                key: "abcd-1234".to_string(),
            },
            playlist: names
                .iter()
                .map(|name| PlaylistEntry::file(format!("{name}.mp4")).with_id(*name))
                .collect(),
            ..StreamConfig::default()
        }
    }

    fn poll(&mut self, config: Option<StreamConfig>) {
        self.store.set(config.clone());
        self.engine.dispatch(Input::Poll(PollUpdate {
            previous: None,
            current: config,
        }));
    }

    fn feeder_exits(&mut self, outcome: ExitOutcome) {
        let id = self.launcher.last_feeder();
        self.launcher.forget(id);
        self.engine.dispatch(Input::Process(ProcessEvent {
            id,
            role: ProcessRole::Feeder,
            outcome,
            stderr_tail: Vec::new(),
        }));
    }

    fn deliver_kills(&mut self) {
        for event in self.launcher.killed() {
            self.engine.dispatch(Input::Process(event));
        }
    }

    fn command(&mut self, command: EngineCommand) -> bool {
        self.engine.dispatch(Input::Command(command))
    }

    fn checkpoint(&self) -> Option<String> {
        CheckpointFile::new(self.dir.path().join("data/resume.json"))
            .load()
            .unwrap()
            .map(|c| c.last_played_entry_id)
    }

    fn drain(&self) -> Vec<EngineEvent> {
        self.events.try_iter().collect()
    }
}

#[test]
fn test_plays_in_order_and_wraps() {
    let mut h = Harness::new(&["a", "b", "c"]);
    h.poll(Some(Harness::config(&["a", "b", "c"])));

    assert!(h.engine.state().is_streaming());
    assert_eq!(h.launcher.master_count(), 1);

    for _ in 0..3 {
        h.feeder_exits(ExitOutcome::Finished);
    }
    assert_eq!(h.launcher.played(), vec!["a", "b", "c", "a"]);
    assert_eq!(h.checkpoint().as_deref(), Some("a"));

    let status = h.engine.status_handle().get();
    assert!(status.is_streaming);
    assert_eq!(status.current_index, Some(0));
    assert_eq!(status.next_entry.unwrap().file, "b.mp4");
    assert_eq!(status.metrics.entries_completed, 3);
}

#[test]
fn test_startup_emits_phases_then_now_playing() {
    let mut h = Harness::new(&["a"]);
    h.poll(Some(Harness::config(&["a"])));

    let events = h.drain();
    let states: Vec<&'static str> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::StateChanged { current, .. } => Some(current.name()),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec!["Starting", "Starting", "Starting", "Starting", "Streaming"]
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::NowPlaying { index: 0, .. })));
}

#[test]
fn test_resumes_after_checkpointed_entry() {
    let mut h = Harness::new(&["a", "b", "c"]);
    CheckpointFile::new(h.dir.path().join("data/resume.json"))
        .save(&Checkpoint::now("b"))
        .unwrap();

    h.poll(Some(Harness::config(&["a", "b", "c"])));
    assert_eq!(h.launcher.played(), vec!["c"]);
}

#[test]
fn test_unknown_checkpoint_starts_from_top() {
    let mut h = Harness::new(&["a", "b"]);
    CheckpointFile::new(h.dir.path().join("data/resume.json"))
        .save(&Checkpoint::now("deleted"))
        .unwrap();

    h.poll(Some(Harness::config(&["a", "b"])));
    assert_eq!(h.launcher.played(), vec!["a"]);
}

#[test]
fn test_failed_feeder_advances_after_backoff() {
    let mut h = Harness::new(&["a", "b"]);
    h.poll(Some(Harness::config(&["a", "b"])));

    h.feeder_exits(ExitOutcome::Failed { code: Some(1) });
    assert_eq!(h.launcher.played(), vec!["a"]);
    assert!(h.engine.state().is_streaming());

    h.engine.dispatch(Input::FeederTimer);
    assert_eq!(h.launcher.played(), vec!["a", "b"]);
    assert_eq!(h.engine.metrics().snapshot().feeder_failures, 1);
}

#[test]
fn test_feeder_spawn_failure_backs_off() {
    let mut h = Harness::new(&["a", "b"]);
    h.poll(Some(Harness::config(&["a", "b"])));

    h.launcher.set_fail_feeders(true);
    h.feeder_exits(ExitOutcome::Finished);
    assert_eq!(h.launcher.played(), vec!["a"]);

    h.launcher.set_fail_feeders(false);
    h.engine.dispatch(Input::FeederTimer);
    assert_eq!(h.launcher.played(), vec!["a", "a"]);
}

#[test]
fn test_skip_next_and_previous() {
    let mut h = Harness::new(&["a", "b", "c"]);
    h.poll(Some(Harness::config(&["a", "b", "c"])));

    h.command(EngineCommand::Skip(SkipDirection::Next));
    h.deliver_kills();
    assert_eq!(h.launcher.played(), vec!["a", "b"]);

    h.command(EngineCommand::Skip(SkipDirection::Previous));
    h.deliver_kills();
    h.command(EngineCommand::Skip(SkipDirection::Previous));
    h.deliver_kills();
    assert_eq!(h.launcher.played(), vec!["a", "b", "a", "c"]);
    assert_eq!(h.engine.metrics().snapshot().skips, 3);
    assert_eq!(h.launcher.master_count(), 1);
}

#[test]
fn test_skip_wins_over_natural_exit() {
    let mut h = Harness::new(&["a", "b", "c"]);
    h.poll(Some(Harness::config(&["a", "b", "c"])));

    h.command(EngineCommand::Skip(SkipDirection::Previous));
    // The feeder finished on its own before the kill landed.
    h.feeder_exits(ExitOutcome::Finished);
    assert_eq!(h.launcher.played(), vec!["a", "c"]);
}

#[test]
fn test_skip_rejected_when_not_streaming() {
    let mut h = Harness::new(&[]);
    assert!(h.command(EngineCommand::Skip(SkipDirection::Next)));

    let rejected = h.drain().into_iter().any(|e| match e {
        EngineEvent::Error {
            recoverable,
            message,
        } => recoverable && message.contains("not streaming"),
        _ => false,
    });
    assert!(rejected);
    assert!(h.launcher.played().is_empty());
}

#[test]
fn test_hot_reload_after_removing_playing_entry() {
    let mut h = Harness::new(&["a", "b", "c"]);
    h.poll(Some(Harness::config(&["a", "b", "c"])));
    h.feeder_exits(ExitOutcome::Finished);
    assert_eq!(h.launcher.played(), vec!["a", "b"]);
    h.drain();

    h.poll(Some(Harness::config(&["a", "c"])));
    let reload = h.drain().into_iter().find_map(|e| match e {
        EngineEvent::PlaylistReloaded { total, index, .. } => Some((total, index)),
        _ => None,
    });
    assert_eq!(reload, Some((2, 0)));
    assert_eq!(h.launcher.master_count(), 1);

    // b keeps playing until it ends, then c follows.
    h.feeder_exits(ExitOutcome::Finished);
    assert_eq!(h.launcher.played(), vec!["a", "b", "c"]);
}

#[test]
fn test_hot_reload_keeps_position_on_insert() {
    let mut h = Harness::new(&["a", "b", "c", "x"]);
    h.poll(Some(Harness::config(&["a", "b", "c"])));
    h.feeder_exits(ExitOutcome::Finished);

    h.poll(Some(Harness::config(&["x", "a", "b", "c"])));
    h.feeder_exits(ExitOutcome::Finished);
    assert_eq!(h.launcher.played(), vec!["a", "b", "c"]);
    assert_eq!(h.engine.metrics().snapshot().playlist_reloads, 1);
}

#[test]
fn test_critical_change_restarts_after_settle() {
    let mut h = Harness::new(&["a", "b", "c"]);
    h.poll(Some(Harness::config(&["a", "b", "c"])));
    h.feeder_exits(ExitOutcome::Finished);
    let first_master = h.launcher.last_master();

    let mut changed = Harness::config(&["a", "b", "c"]);
    changed.video_bitrate_kbps = 4500;
    h.poll(Some(changed.clone()));
    assert!(h.engine.state().is_idle());
    assert!(!h.engine.status_handle().is_streaming());

    // Settle delay pending: another poll does not start a session yet.
    h.poll(Some(changed));
    assert_eq!(h.launcher.master_count(), 1);

    h.engine.dispatch(Input::RestartDue);
    assert_eq!(h.launcher.master_count(), 2);
    assert_ne!(h.launcher.last_master(), first_master);
    assert_eq!(
        h.launcher.inner.lock().masters[1].1.video_bitrate_kbps(),
        4500
    );
    // Resumes after b, the last entry that started.
    assert_eq!(h.launcher.played(), vec!["a", "b", "c"]);

    // The old master's late kill report is ignored.
    h.deliver_kills();
    assert!(h.engine.state().is_streaming());
}

#[test]
fn test_deactivation_and_missing_record_stop() {
    let mut h = Harness::new(&["a"]);
    h.poll(Some(Harness::config(&["a"])));

    let mut inactive = Harness::config(&["a"]);
    inactive.is_active = false;
    h.poll(Some(inactive));
    assert!(h.engine.state().is_idle());

    h.poll(Some(Harness::config(&["a"])));
    assert!(h.engine.state().is_streaming());

    h.poll(None);
    assert!(h.engine.state().is_idle());
    assert_eq!(h.launcher.master_count(), 2);
}

#[test]
fn test_master_exit_tears_down_then_next_poll_restarts() {
    let mut h = Harness::new(&["a", "b"]);
    h.poll(Some(Harness::config(&["a", "b"])));
    h.drain();

    let master = h.launcher.last_master();
    h.launcher.forget(master);
    h.engine.dispatch(Input::Process(ProcessEvent {
        id: master,
        role: ProcessRole::Master,
        outcome: ExitOutcome::Failed { code: Some(1) },
        stderr_tail: vec!["Connection refused".to_string()],
    }));

    assert!(h.engine.state().is_idle());
    let message = h.drain().into_iter().find_map(|e| match e {
        EngineEvent::Error { message, .. } => Some(message),
        _ => None,
    });
    assert_eq!(
        message.as_deref(),
        Some("Master exited: exited with code 1: Connection refused")
    );
    assert_eq!(h.engine.metrics().snapshot().master_failures, 1);

    h.poll(Some(Harness::config(&["a", "b"])));
    assert_eq!(h.launcher.master_count(), 2);
    assert_eq!(h.launcher.played(), vec!["a", "b"]);
}

#[test]
fn test_missing_endpoint_never_spawns() {
    let mut h = Harness::new(&["a"]);
    let mut config = Harness::config(&["a"]);
    config.rtmp_endpoint.key.clear();
    h.poll(Some(config));

    assert_eq!(h.launcher.master_count(), 0);
    assert!(h.engine.state().is_idle());
    assert!(h
        .drain()
        .iter()
        .any(|e| matches!(e, EngineEvent::Error { message, .. } if message.contains("stream key"))));
}

#[test]
fn test_empty_playlist_does_not_start() {
    let mut h = Harness::new(&[]);
    h.poll(Some(Harness::config(&["gone"])));
    assert_eq!(h.launcher.master_count(), 0);
    assert!(h.engine.state().is_idle());
}

#[test]
fn test_playlist_emptied_while_streaming_waits() {
    let mut h = Harness::new(&["a"]);
    h.poll(Some(Harness::config(&["a"])));

    h.poll(Some(Harness::config(&[])));
    h.feeder_exits(ExitOutcome::Finished);
    assert!(h.engine.state().is_streaming());
    assert_eq!(h.launcher.played(), vec!["a"]);

    h.poll(Some(Harness::config(&["a"])));
    h.engine.dispatch(Input::FeederTimer);
    assert_eq!(h.launcher.played(), vec!["a", "a"]);
    assert_eq!(h.launcher.master_count(), 1);
}

#[test]
fn test_missing_files_are_written_back() {
    let mut h = Harness::new(&["a", "c"]);
    h.poll(Some(Harness::config(&["a", "b", "c"])));

    let stored = h.store.get().unwrap();
    let ids: Vec<_> = stored.playlist.iter().filter_map(|e| e.id.clone()).collect();
    assert_eq!(ids, vec!["a", "c"]);

    // The cleaned record polls back without a reload.
    h.poll(Some(stored));
    assert_eq!(h.engine.metrics().snapshot().playlist_reloads, 0);
}

#[test]
fn test_shutdown_stops_session() {
    let mut h = Harness::new(&["a"]);
    h.poll(Some(Harness::config(&["a"])));

    assert!(!h.command(EngineCommand::Shutdown));
    assert!(h.engine.state().is_idle());
    assert!(h
        .drain()
        .iter()
        .any(|e| matches!(e, EngineEvent::Shutdown)));
    assert_eq!(h.launcher.killed().len(), 2);
}

#[test]
fn test_get_status() {
    let mut h = Harness::new(&["a", "b"]);
    h.poll(Some(Harness::config(&["a", "b"])));
    h.drain();

    h.command(EngineCommand::GetStatus);
    let status = h.drain().into_iter().find_map(|e| match e {
        EngineEvent::Status(status) => Some(status),
        _ => None,
    });
    let status = status.unwrap();
    assert_eq!(status.state, "Streaming");
    assert_eq!(status.total_entries, 2);
    assert_eq!(status.current_entry.unwrap().id.as_deref(), Some("a"));
}
