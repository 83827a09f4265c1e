use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::assembly::Assembler;
use crate::config::Settings;
use crate::error::CoreError;
use crate::model::{BuildMode, BuildRecord, FlagSet, Manifest};
use crate::project::project_root;
use crate::storage::FragmentStore;

/// Inputs of one build. Values given here win over the manifest.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Absolute path of the entry fragment.
    pub entry: PathBuf,
    pub flags: FlagSet,
    /// `-o`: explicit artifact path, relative to the project root if relative.
    pub output: Option<PathBuf>,
    /// `-B`: build mode override.
    pub mode: Option<BuildMode>,
}

impl BuildRequest {
    pub fn new(entry: impl Into<PathBuf>) -> Self {
        Self {
            entry: entry.into(),
            flags: FlagSet::new(),
            output: None,
            mode: None,
        }
    }

    pub fn with_flags(mut self, flags: FlagSet) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_mode(mut self, mode: BuildMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// A written artifact and the record of how it was made.
#[derive(Debug, Clone)]
pub struct BuiltArtifact {
    pub manifest: Manifest,
    pub record: BuildRecord,
}

impl BuiltArtifact {
    pub fn path(&self) -> &Path {
        &self.record.artifact
    }

    pub fn mode(&self) -> BuildMode {
        self.record.mode
    }
}

/// Assembles the entry fragment and writes the artifact.
pub struct ArtifactBuilder<S> {
    store: S,
    settings: Settings,
}

impl<S: FragmentStore> ArtifactBuilder<S> {
    pub fn new(store: S, settings: Settings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run one full build. The artifact is always written, whatever the
    /// mode; executing it is the caller's business.
    pub fn build(&self, request: &BuildRequest) -> Result<BuiltArtifact, CoreError> {
        let assembled =
            Assembler::new(&self.store, &request.flags).assemble_entry(&request.entry)?;
        let manifest = assembled.manifest;

        let root = project_root(&assembled.entry);
        let path = output_path(
            root,
            request.output.as_deref(),
            &manifest,
            &self.settings.default_artifact_name,
        );
        let mode = request.mode.unwrap_or_else(|| manifest.mode());
        let bytes = render(&manifest, &assembled.assembly.text);

        write_atomic(&path, bytes.as_bytes(), manifest.shebang.is_some())?;
        info!(
            artifact = %path.display(),
            %mode,
            fragments = assembled.assembly.fragments.len(),
            "Artifact written"
        );

        Ok(BuiltArtifact {
            record: BuildRecord {
                entry: assembled.entry.clone(),
                artifact: path,
                mode,
                shebang: manifest.shebang.clone(),
                fragments: assembled.assembly.fragments,
                built_at: Utc::now(),
            },
            manifest,
        })
    }
}

/// Final artifact text: the shebang line, if any, then the resolved body.
pub fn render(manifest: &Manifest, body: &str) -> String {
    match manifest.shebang_line() {
        Some(line) => {
            let mut out = String::with_capacity(line.len() + 1 + body.len());
            out.push_str(&line);
            out.push('\n');
            out.push_str(body);
            out
        }
        None => body.to_string(),
    }
}

/// `-o` beats `artifact-name`, which beats the built-in default. Relative
/// results are placed under `root`.
pub fn output_path(
    root: &Path,
    explicit: Option<&Path>,
    manifest: &Manifest,
    default_name: &str,
) -> PathBuf {
    let chosen = explicit
        .map(Path::to_path_buf)
        .or_else(|| manifest.artifact_name.as_deref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(default_name));
    root.join(chosen)
}

/// Write `bytes` next to `path` under a temporary name, then rename it into
/// place. A process still running the previous artifact keeps its inode.
pub fn write_atomic(path: &Path, bytes: &[u8], executable: bool) -> Result<(), CoreError> {
    let write_err = |source| CoreError::OutputWrite {
        path: path.to_path_buf(),
        source,
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            write_err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "artifact path has no file name",
            ))
        })?;
    let tmp = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().as_simple()));
    debug!(tmp = %tmp.display(), "Staging artifact");

    let staged = fs::write(&tmp, bytes).and_then(|()| {
        if executable {
            set_executable(&tmp)
        } else {
            Ok(())
        }
    });
    if let Err(e) = staged.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(write_err(e));
    }
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
