mod event;
mod listener;
mod supervisor;

pub use event::{WatchEvent, WatchState};
pub use listener::{detect_changes, fingerprint_file, spawn_listener, ChangeEvent, WatchSet};
pub use supervisor::WatchLoop;
