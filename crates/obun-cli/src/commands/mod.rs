pub mod build;
pub mod watch;

use obun_core::{BuildRequest, Settings};

use crate::output::OutputFormat;

/// Everything a command needs, resolved from the command line.
pub struct Invocation {
    pub request: BuildRequest,
    pub settings: Settings,
    pub format: OutputFormat,
}
