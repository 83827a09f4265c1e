use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Cyclic inclusion: {}", format_chain(.chain))]
    CyclicInclusion { chain: Vec<PathBuf> },

    #[error(
        "Section not found: {} (included from {}:{line})",
        .missing.display(),
        .including.display()
    )]
    SectionNotFound {
        including: PathBuf,
        line: usize,
        missing: PathBuf,
    },

    #[error("Unmatched #:endif at {}:{line}", .path.display())]
    UnmatchedEndif { path: PathBuf, line: usize },

    #[error("Unmatched #:else at {}:{line}", .path.display())]
    UnmatchedElse { path: PathBuf, line: usize },

    #[error(
        "Duplicate #:else at {}:{line} (first #:else on line {first_else})",
        .path.display()
    )]
    DuplicateElse {
        path: PathBuf,
        line: usize,
        first_else: usize,
    },

    #[error(
        "Unterminated #:if opened at {}:{opened_at}",
        .path.display()
    )]
    UnterminatedConditional { path: PathBuf, opened_at: usize },

    #[error("Malformed directive at {}:{line}: {reason}", .path.display())]
    MalformedDirective {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Manifest error at {}:{line}: {reason}", .path.display())]
    ManifestParse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Invalid build mode `{0}` (expected `run` or `prod`)")]
    InvalidBuildMode(String),

    #[error("Failed to read fragment {}: {source}", .path.display())]
    FragmentRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Fragment is not valid UTF-8: {}", .path.display())]
    FragmentEncoding { path: PathBuf },

    #[error("Cannot find entry fragment {}", .0.display())]
    EntryNotFound(PathBuf),

    #[error("Failed to write artifact {}: {source}", .path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CoreError {
    /// Process exit code for this error, following `sysexits.h`.
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::CyclicInclusion { .. }
            | CoreError::SectionNotFound { .. }
            | CoreError::UnmatchedEndif { .. }
            | CoreError::UnmatchedElse { .. }
            | CoreError::DuplicateElse { .. }
            | CoreError::UnterminatedConditional { .. }
            | CoreError::MalformedDirective { .. }
            | CoreError::FragmentEncoding { .. } => 65,
            CoreError::EntryNotFound(_) => 66,
            CoreError::FragmentRead { .. } => 74,
            CoreError::OutputWrite { .. } => 73,
            CoreError::ManifestParse { .. } | CoreError::InvalidBuildMode(_) => 78,
        }
    }

    /// Fragment paths this error points at. A watcher adds these to its
    /// watch set so that fixing the offending file triggers a rebuild.
    pub fn involved_paths(&self) -> Vec<&Path> {
        match self {
            CoreError::CyclicInclusion { chain } => chain.iter().map(PathBuf::as_path).collect(),
            CoreError::SectionNotFound {
                including, missing, ..
            } => vec![including.as_path(), missing.as_path()],
            CoreError::UnmatchedEndif { path, .. }
            | CoreError::UnmatchedElse { path, .. }
            | CoreError::DuplicateElse { path, .. }
            | CoreError::UnterminatedConditional { path, .. }
            | CoreError::MalformedDirective { path, .. }
            | CoreError::ManifestParse { path, .. }
            | CoreError::FragmentRead { path, .. }
            | CoreError::FragmentEncoding { path } => vec![path.as_path()],
            CoreError::EntryNotFound(path) => vec![path.as_path()],
            CoreError::InvalidBuildMode(_) | CoreError::OutputWrite { .. } => Vec::new(),
        }
    }

    /// True for failures caused by the environment rather than the
    /// fragments themselves. A watch loop cannot recover from these by
    /// waiting for edits.
    pub fn is_environmental(&self) -> bool {
        matches!(self, CoreError::OutputWrite { .. })
    }
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
