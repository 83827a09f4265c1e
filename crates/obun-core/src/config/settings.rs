use std::time::Duration;

/// Opening line of the manifest block.
pub const MANIFEST_OPEN: &str = "0o ---";
/// Closing line of the manifest block.
pub const MANIFEST_CLOSE: &str = "--- o0";
/// Prefix that marks a directive line.
pub const DIRECTIVE_MARKER: &str = "#:";

pub const DEFAULT_ENTRY_FILE: &str = "index.obun";
pub const DEFAULT_ARTIFACT_NAME: &str = "dist.py";
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
pub const DEFAULT_POLL_MS: u64 = 250;
pub const DEFAULT_GRACE_MS: u64 = 3000;

/// Tunables for building and watching. Nothing here is persisted; the
/// CLI fills it from flags and `OBUN_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// File looked up when the input is a directory.
    pub entry_file_name: String,
    /// Artifact name used when neither `-o` nor `artifact-name` is given.
    pub default_artifact_name: String,
    /// Quiet window that coalesces a burst of change events.
    pub debounce: Duration,
    /// How often the listener re-fingerprints the watched fragments.
    pub poll_interval: Duration,
    /// Time a child gets to exit after SIGTERM before it is killed.
    pub grace_period: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            entry_file_name: DEFAULT_ENTRY_FILE.to_string(),
            default_artifact_name: DEFAULT_ARTIFACT_NAME.to_string(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
            grace_period: Duration::from_millis(DEFAULT_GRACE_MS),
        }
    }
}

impl Settings {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}
