//! Operator controls: the command handle and the stdin console.

use std::io::{self, BufRead};

use crossbeam_channel::Sender;
use tracing::{debug, info, instrument};

use loopcast_engine::StatusHandle;
use loopcast_ipc::{BroadcastStatus, ControlError, EngineCommand, SkipDirection};

/// What a control surface holds to drive the engine.
#[derive(Clone)]
pub struct ControlHandle {
    command_tx: Sender<EngineCommand>,
    status: StatusHandle,
}

impl ControlHandle {
    pub fn new(command_tx: Sender<EngineCommand>, status: StatusHandle) -> Self {
        Self { command_tx, status }
    }

    /// Skip in `direction`. Rejected locally when nothing is streaming.
    #[instrument(skip(self))]
    pub fn skip(&self, direction: SkipDirection) -> Result<(), ControlError> {
        let status = self.status.get();
        if !status.is_streaming {
            return Err(ControlError::NotStreaming);
        }
        if status.total_entries == 0 {
            return Err(ControlError::EmptyPlaylist);
        }
        self.send(EngineCommand::Skip(direction))
    }

    pub fn status(&self) -> BroadcastStatus {
        self.status.get()
    }

    pub fn shutdown(&self) -> Result<(), ControlError> {
        self.send(EngineCommand::Shutdown)
    }

    fn send(&self, command: EngineCommand) -> Result<(), ControlError> {
        debug!(?command, "Sending command");
        self.command_tx
            .send(command)
            .map_err(|e| ControlError::EngineUnavailable(e.to_string()))
    }
}

/// One line typed at the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Skip(SkipDirection),
    Status,
    Quit,
    Help,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let word = line.trim().to_ascii_lowercase();
        if let Some(direction) = SkipDirection::parse(&word) {
            return Some(Self::Skip(direction));
        }
        match word.as_str() {
            "status" | "s" => Some(Self::Status),
            "quit" | "exit" | "q" => Some(Self::Quit),
            "help" | "h" | "?" => Some(Self::Help),
            _ => None,
        }
    }
}

const HELP: &str = "commands: next, prev, status, quit";

/// Read commands from stdin until `quit` or EOF.
pub fn run_console(control: ControlHandle) {
    println!("{HELP}");

    for line in io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match ConsoleCommand::parse(&line) {
            Some(ConsoleCommand::Skip(direction)) => match control.skip(direction) {
                Ok(()) => println!("skipping {direction:?}"),
                Err(e) => println!("skip rejected: {e}"),
            },
            Some(ConsoleCommand::Status) => println!("{}", render_status(&control.status())),
            Some(ConsoleCommand::Quit) => {
                info!("Shutdown requested from console");
                if let Err(e) = control.shutdown() {
                    println!("{e}");
                }
                break;
            }
            Some(ConsoleCommand::Help) | None => println!("{HELP}"),
        }
    }

    debug!("Console closed");
}

/// Human-readable status block.
pub fn render_status(status: &BroadcastStatus) -> String {
    let describe = |entry: &Option<loopcast_ipc::EntrySummary>| match entry {
        Some(entry) => entry.title.clone().unwrap_or_else(|| entry.file.clone()),
        None => "-".to_string(),
    };

    let position = match status.current_index {
        Some(index) => format!("{}/{}", index + 1, status.total_entries),
        None => "-".to_string(),
    };

    format!(
        "state: {}\nstreaming: {}\nposition: {}\nnow: {}\nnext: {}\nuptime: {}s, started: {}, skips: {}, failures: {}",
        status.state,
        status.is_streaming,
        position,
        describe(&status.current_entry),
        describe(&status.next_entry),
        status.metrics.uptime_seconds,
        status.metrics.entries_started,
        status.metrics.skips,
        status.metrics.feeder_failures + status.metrics.master_failures,
    )
}
