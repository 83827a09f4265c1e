use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use obun_core::BuildRecord;

/// Where the watch loop is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchState {
    /// No successful build yet.
    Idle,
    Building,
    /// A `run` build's process is alive.
    Running,
    /// Last build succeeded and nothing is running.
    Built,
    Stopped,
}

impl fmt::Display for WatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WatchState::Idle => "idle",
            WatchState::Building => "building",
            WatchState::Running => "running",
            WatchState::Built => "built",
            WatchState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Progress reported by [`WatchLoop`](super::WatchLoop).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WatchEvent {
    StateChanged { state: WatchState },
    /// A debounced batch of edits to watched fragments.
    ChangeDetected { paths: Vec<PathBuf> },
    Built { record: BuildRecord },
    BuildFailed { message: String, exit_code: i32 },
    ProcessStarted { pid: u32, artifact: PathBuf },
    ProcessFailed { message: String },
    /// The process ended by itself.
    ProcessExited { pid: u32, code: i32 },
    /// The process was stopped by the loop (restart or shutdown).
    ProcessTerminated { pid: u32, code: i32 },
}
