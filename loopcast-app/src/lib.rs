//! loopcast daemon library.
//!
//! Wires settings, logging, the config store and the ffmpeg launcher into an
//! engine thread, then waits for a signal or a console `quit`.

pub mod commands;
pub mod settings;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::Receiver;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use loopcast_engine::create_engine;
use loopcast_ffmpeg::FfmpegLauncher;
use loopcast_ipc::{command_channel, event_channel, EngineEvent};
use loopcast_store::{ConfigStore, FileConfigStore, HttpConfigStore};

use crate::commands::{run_console, ControlHandle};
use crate::settings::{LoggingSettings, Settings, StoreKind, StoreSettings};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "loopcast", version, about = "24/7 playlist-to-RTMP broadcaster")]
pub struct Args {
    /// Settings file (TOML, YAML or JSON).
    #[arg(short, long, env = "LOOPCAST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter, overriding `logging.filter`.
    #[arg(long)]
    pub log_filter: Option<String>,

    /// Do not read operator commands from stdin.
    #[arg(long)]
    pub no_console: bool,
}

/// Initialize logging.
fn init_logging(logging: &LoggingSettings, filter_override: Option<&str>) -> Result<()> {
    let configured = filter_override.unwrap_or(&logging.filter);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured))
        .with_context(|| format!("Invalid log filter '{configured}'"))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };
    installed.context("Failed to install log subscriber")
}

fn build_store(store: &StoreSettings) -> Result<Arc<dyn ConfigStore>> {
    Ok(match store.kind {
        StoreKind::File => Arc::new(FileConfigStore::new(&store.path)),
        StoreKind::Http => Arc::new(
            HttpConfigStore::new(&store.base_url, Duration::from_millis(store.timeout_ms))
                .context("Failed to build HTTP config store client")?,
        ),
    })
}

/// Log what the engine reports until it shuts down.
fn log_events(events: Receiver<EngineEvent>) {
    for event in events {
        match event {
            EngineEvent::Ready => info!("Engine ready"),
            EngineEvent::StateChanged { previous, current } => {
                info!(from = previous.name(), to = current.name(), "Engine state")
            }
            EngineEvent::NowPlaying { index, entry } => info!(
                index,
                file = %entry.file,
                title = entry.title.as_deref().unwrap_or("-"),
                "Now playing"
            ),
            EngineEvent::PlaylistReloaded {
                total,
                removed,
                index,
            } => info!(total, removed, index, "Playlist reloaded"),
            EngineEvent::Status(status) => debug!(?status, "Status"),
            EngineEvent::Metrics(metrics) => debug!(?metrics, "Playout metrics"),
            EngineEvent::Error {
                recoverable: true,
                message,
            } => warn!("{}", message),
            EngineEvent::Error { message, .. } => error!("{}", message),
            EngineEvent::Shutdown => {
                info!("Engine shut down");
                break;
            }
        }
    }
}

/// Resolve when the process is asked to stop.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Run the daemon until shutdown.
pub fn run() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    init_logging(&settings.logging, args.log_filter.as_deref())?;
    info!(version = env!("CARGO_PKG_VERSION"), "loopcast starting");

    let store = build_store(&settings.store)?;
    let launcher =
        FfmpegLauncher::new(settings.ffmpeg.clone()).context("Failed to start process runtime")?;

    let (command_tx, command_rx) = command_channel();
    let (event_tx, event_rx) = event_channel();

    let mut engine = create_engine(
        settings.engine.clone(),
        store,
        Box::new(launcher),
        command_rx,
        event_tx,
    );
    let control = ControlHandle::new(command_tx, engine.status_handle());

    let engine_thread = thread::Builder::new()
        .name("loopcast-engine".into())
        .spawn(move || engine.run())
        .context("Failed to spawn engine thread")?;
    let events_thread = thread::Builder::new()
        .name("loopcast-events".into())
        .spawn(move || log_events(event_rx))
        .context("Failed to spawn event thread")?;

    if !args.no_console {
        let console = control.clone();
        thread::Builder::new()
            .name("loopcast-console".into())
            .spawn(move || run_console(console))
            .context("Failed to spawn console thread")?;
    }

    let signals = control.clone();
    thread::Builder::new()
        .name("loopcast-signals".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Cannot watch for signals: {}", e);
                    return;
                }
            };
            runtime.block_on(shutdown_signal());
            info!("Shutdown signal received");
            if let Err(e) = signals.shutdown() {
                debug!("Engine already gone: {}", e);
            }
        })
        .context("Failed to spawn signal thread")?;

    if engine_thread.join().is_err() {
        anyhow::bail!("Engine thread panicked");
    }
    if events_thread.join().is_err() {
        warn!("Event thread panicked");
    }

    info!("loopcast stopped");
    Ok(())
}
