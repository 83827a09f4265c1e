use std::path::Path;

use crate::config::settings::{MANIFEST_CLOSE, MANIFEST_OPEN};
use crate::error::CoreError;
use crate::model::{BuildMode, Manifest};

/// Result of splitting an entry fragment into manifest and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted<'a> {
    pub manifest: Manifest,
    /// Everything after the manifest block (the whole text if there is none).
    pub body: &'a str,
    /// 1-based line number of the body's first line in the original text.
    pub body_first_line: usize,
}

/// 1-based line of the manifest open marker, when the first non-blank
/// line is one.
pub fn manifest_open_line(text: &str) -> Option<usize> {
    text.lines()
        .enumerate()
        .find(|(_, l)| !l.trim().is_empty())
        .filter(|(_, l)| l.trim() == MANIFEST_OPEN)
        .map(|(idx, _)| idx + 1)
}

/// Strip and decode a leading manifest block.
///
/// The block must be the first non-blank content. Inside it every
/// non-blank line is a `key: value` pair; later duplicates win and keys
/// other than `shebang`, `artifact-name` and `build-mode` are kept in
/// [`Manifest::extra`].
pub fn extract_manifest<'a>(path: &Path, text: &'a str) -> Result<Extracted<'a>, CoreError> {
    let mut lines = text.split_inclusive('\n').enumerate();
    let mut offset = 0;

    let open_line = loop {
        match lines.next() {
            None => return Ok(no_manifest(text)),
            Some((idx, line)) => {
                offset += line.len();
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed != MANIFEST_OPEN {
                    return Ok(no_manifest(text));
                }
                break idx + 1;
            }
        }
    };

    let mut manifest = Manifest::default();
    for (idx, line) in lines {
        offset += line.len();
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == MANIFEST_CLOSE {
            return Ok(Extracted {
                manifest,
                body: &text[offset..],
                body_first_line: line_no + 1,
            });
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            return Err(manifest_error(
                path,
                line_no,
                format!("expected `key: value`, got `{trimmed}`"),
            ));
        };
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() {
            return Err(manifest_error(path, line_no, "empty key".to_string()));
        }
        apply(&mut manifest, key, value)
            .map_err(|reason| manifest_error(path, line_no, reason))?;
    }

    Err(manifest_error(
        path,
        open_line,
        format!("manifest block is not closed with `{MANIFEST_CLOSE}`"),
    ))
}

fn apply(manifest: &mut Manifest, key: &str, value: &str) -> Result<(), String> {
    let value = (!value.is_empty()).then(|| value.to_string());
    match key {
        "shebang" => manifest.shebang = value,
        "artifact-name" => manifest.artifact_name = value,
        "build-mode" => {
            manifest.build_mode = value
                .map(|v| v.parse::<BuildMode>().map_err(|e| e.to_string()))
                .transpose()?;
        }
        other => {
            tracing::debug!(key = other, "Ignoring unrecognized manifest key");
            manifest
                .extra
                .insert(other.to_string(), value.unwrap_or_default());
        }
    }
    Ok(())
}

fn no_manifest(text: &str) -> Extracted<'_> {
    Extracted {
        manifest: Manifest::default(),
        body: text,
        body_first_line: 1,
    }
}

fn manifest_error(path: &Path, line: usize, reason: String) -> CoreError {
    CoreError::ManifestParse {
        path: path.to_path_buf(),
        line,
        reason,
    }
}
