//! Running and watching obun artifacts.
//!
//! [`ProcessRunner`] executes a built artifact with its interpreter and
//! stops it with SIGTERM, escalating to SIGKILL after a grace period.
//! [`WatchLoop`] rebuilds whenever a fragment from the last build changes,
//! keeping at most one artifact process alive.

pub mod error;
pub mod process;
pub mod watch;

pub use error::RunnerError;
pub use process::{exit_code, ProcessRunner, RunningProcess};
pub use watch::{WatchEvent, WatchLoop, WatchState};
