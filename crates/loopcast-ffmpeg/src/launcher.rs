//! ffmpeg-backed [`MediaLauncher`].

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::Sender;
use tokio::runtime::{Builder, Runtime};
use tracing::info;

use crate::feeder::spawn_feeder;
use crate::master::spawn_master;
use crate::process::{ProcessEvent, ProcessId};
use crate::{
    FeederConfig, FeederHandle, FfmpegError, FfmpegResult, FfmpegSettings, MasterConfig,
    MasterHandle, MediaLauncher,
};

/// Spawns real ffmpeg processes and supervises them on a private runtime.
pub struct FfmpegLauncher {
    settings: FfmpegSettings,
    runtime: Runtime,
    next_id: AtomicU64,
}

impl FfmpegLauncher {
    /// Create a launcher with its own supervision runtime.
    pub fn new(settings: FfmpegSettings) -> FfmpegResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("loopcast-ffmpeg")
            .enable_all()
            .build()
            .map_err(FfmpegError::Io)?;

        info!(binary = %settings.binary.display(), "ffmpeg launcher ready");

        Ok(Self {
            settings,
            runtime,
            next_id: AtomicU64::new(1),
        })
    }

    fn allocate_id(&self) -> ProcessId {
        ProcessId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl MediaLauncher for FfmpegLauncher {
    fn start_master(
        &self,
        config: &MasterConfig,
        events: Sender<ProcessEvent>,
    ) -> FfmpegResult<MasterHandle> {
        spawn_master(
            self.runtime.handle(),
            &self.settings,
            config,
            self.allocate_id(),
            events,
        )
    }

    fn start_feeder(
        &self,
        config: &FeederConfig,
        master: &MasterHandle,
        events: Sender<ProcessEvent>,
    ) -> FfmpegResult<FeederHandle> {
        let input = master.input.clone().ok_or(FfmpegError::MasterNotRunning)?;
        spawn_feeder(
            self.runtime.handle(),
            &self.settings,
            config,
            input,
            self.allocate_id(),
            events,
        )
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}
