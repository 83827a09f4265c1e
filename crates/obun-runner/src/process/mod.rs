mod runner;

pub use runner::{command_for, exit_code, ProcessRunner, RunningProcess};
