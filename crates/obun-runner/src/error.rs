use obun_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("Failed to start `{program}`: {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stop process {pid}: {source}")]
    Terminate {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Process exit code for this error, following `sysexits.h`.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunnerError::Core(e) => e.exit_code(),
            RunnerError::ProcessSpawn { .. } => 69,
            RunnerError::Terminate { .. } => 71,
            RunnerError::Io(_) => 74,
        }
    }
}
