use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::CoreError;
use crate::storage::normalize_path;

/// Turn the user's input into an absolute entry fragment path.
///
/// A directory means `<dir>/<entry_file_name>`; anything else is taken as
/// the entry itself.
pub fn resolve_entry(input: &Path, settings: &Settings) -> Result<PathBuf, CoreError> {
    let candidate = if input.is_dir() {
        input.join(&settings.entry_file_name)
    } else {
        input.to_path_buf()
    };

    if !candidate.is_file() {
        return Err(CoreError::EntryNotFound(candidate));
    }

    let absolute = std::path::absolute(&candidate).map_err(|source| CoreError::FragmentRead {
        path: candidate.clone(),
        source,
    })?;
    Ok(normalize_path(&absolute))
}

/// Directory that relative output paths are resolved against.
pub fn project_root(entry: &Path) -> &Path {
    entry.parent().unwrap_or_else(|| Path::new("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directory_resolves_to_index() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("index.obun"), "x\n").unwrap();

        let entry = resolve_entry(tmp.path(), &Settings::default()).unwrap();
        assert!(entry.is_absolute());
        assert_eq!(entry.file_name().unwrap(), "index.obun");
        assert_eq!(project_root(&entry), normalize_path(&std::path::absolute(tmp.path()).unwrap()));
    }

    #[test]
    fn test_file_input_is_used_as_is() {
        let tmp = TempDir::new().unwrap();
        let main = tmp.path().join("main.obun");
        std::fs::write(&main, "x\n").unwrap();

        let entry = resolve_entry(&main, &Settings::default()).unwrap();
        assert_eq!(entry.file_name().unwrap(), "main.obun");
    }

    #[test]
    fn test_missing_entry() {
        let tmp = TempDir::new().unwrap();
        let err = resolve_entry(tmp.path(), &Settings::default()).unwrap_err();
        assert!(matches!(err, CoreError::EntryNotFound(p) if p.ends_with("index.obun")));
    }
}
