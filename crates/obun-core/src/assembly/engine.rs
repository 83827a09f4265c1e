use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::directive::{parse_line, Directive};
use super::manifest::{extract_manifest, manifest_open_line};
use crate::error::CoreError;
use crate::model::{FlagSet, Fingerprint, Manifest};
use crate::storage::{normalize_path, FragmentStore};

/// Output of one assembly pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    /// Resolved text: content lines only, depth-first, each ending in `\n`.
    pub text: String,
    /// Every fragment read, with the fingerprint of the bytes seen.
    pub fragments: BTreeMap<PathBuf, Fingerprint>,
}

/// Assembly of an entry fragment, with its manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryAssembly {
    pub entry: PathBuf,
    pub manifest: Manifest,
    pub assembly: Assembly,
}

/// Resolves `#:section` and `#:if` directives against a fixed flag set.
pub struct Assembler<'f, S> {
    store: S,
    flags: &'f FlagSet,
}

/// State threaded through a single pass and dropped afterwards.
#[derive(Default)]
struct Context {
    stack: Vec<PathBuf>,
    out: String,
    fragments: BTreeMap<PathBuf, Fingerprint>,
}

struct Frame {
    condition: bool,
    opened_at: usize,
    else_at: Option<usize>,
}

impl Frame {
    fn is_live(&self) -> bool {
        self.condition != self.else_at.is_some()
    }
}

impl<'f, S: FragmentStore> Assembler<'f, S> {
    pub fn new(store: S, flags: &'f FlagSet) -> Self {
        Self { store, flags }
    }

    /// Assemble an entry fragment: strip its manifest, then resolve the body.
    pub fn assemble_entry(&self, entry: &Path) -> Result<EntryAssembly, CoreError> {
        let entry = normalize_path(entry);
        let mut ctx = Context::default();
        let text = self.load(&mut ctx, &entry, None)?;
        let extracted = extract_manifest(&entry, &text)?;

        self.resolve(&mut ctx, &entry, extracted.body, extracted.body_first_line)?;

        Ok(EntryAssembly {
            entry,
            manifest: extracted.manifest,
            assembly: Assembly {
                text: ctx.out,
                fragments: ctx.fragments,
            },
        })
    }

    /// Assemble a fragment that carries no manifest.
    pub fn assemble(&self, path: &Path) -> Result<Assembly, CoreError> {
        let path = normalize_path(path);
        let mut ctx = Context::default();
        let text = self.load(&mut ctx, &path, None)?;
        reject_manifest(&path, &text)?;
        self.resolve(&mut ctx, &path, &text, 1)?;
        Ok(Assembly {
            text: ctx.out,
            fragments: ctx.fragments,
        })
    }

    fn resolve(
        &self,
        ctx: &mut Context,
        path: &Path,
        body: &str,
        first_line: usize,
    ) -> Result<(), CoreError> {
        check_cycle(&ctx.stack, path)?;
        ctx.stack.push(path.to_path_buf());
        debug!(fragment = %path.display(), depth = ctx.stack.len(), "Resolving fragment");

        let mut frames: Vec<Frame> = Vec::new();

        for (idx, line) in body.lines().enumerate() {
            let line_no = first_line + idx;
            let live = frames.iter().all(Frame::is_live);

            match parse_line(path, line_no, line)? {
                None => {
                    if live {
                        ctx.out.push_str(line.strip_suffix('\r').unwrap_or(line));
                        ctx.out.push('\n');
                    }
                }
                Some(Directive::Section(target)) => {
                    if !live {
                        trace!(fragment = %path.display(), line = line_no, "Skipping section in dead branch");
                        continue;
                    }
                    let target = section_path(path, target);
                    // before reading: an entry re-included is a cycle, not a stray manifest
                    check_cycle(&ctx.stack, &target)?;
                    let text = self.load(ctx, &target, Some((path, line_no)))?;
                    reject_manifest(&target, &text)?;
                    self.resolve(ctx, &target, &text, 1)?;
                }
                Some(Directive::If(flag)) => {
                    frames.push(Frame {
                        condition: self.flags.is_set(flag),
                        opened_at: line_no,
                        else_at: None,
                    });
                }
                Some(Directive::Else) => {
                    let Some(frame) = frames.last_mut() else {
                        return Err(CoreError::UnmatchedElse {
                            path: path.to_path_buf(),
                            line: line_no,
                        });
                    };
                    if let Some(first_else) = frame.else_at {
                        return Err(CoreError::DuplicateElse {
                            path: path.to_path_buf(),
                            line: line_no,
                            first_else,
                        });
                    }
                    frame.else_at = Some(line_no);
                }
                Some(Directive::Endif) => {
                    if frames.pop().is_none() {
                        return Err(CoreError::UnmatchedEndif {
                            path: path.to_path_buf(),
                            line: line_no,
                        });
                    }
                }
            }
        }

        if let Some(frame) = frames.last() {
            return Err(CoreError::UnterminatedConditional {
                path: path.to_path_buf(),
                opened_at: frame.opened_at,
            });
        }

        ctx.stack.pop();
        Ok(())
    }

    /// Read a fragment and record its fingerprint. `including` names the
    /// fragment and line of the `#:section` that asked for it.
    fn load(
        &self,
        ctx: &mut Context,
        path: &Path,
        including: Option<(&Path, usize)>,
    ) -> Result<String, CoreError> {
        let bytes = self.store.read(path).map_err(|e| match (e.kind(), including) {
            (io::ErrorKind::NotFound, Some((from, line))) => CoreError::SectionNotFound {
                including: from.to_path_buf(),
                line,
                missing: path.to_path_buf(),
            },
            (io::ErrorKind::NotFound, None) => CoreError::EntryNotFound(path.to_path_buf()),
            _ => CoreError::FragmentRead {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        ctx.fragments
            .insert(path.to_path_buf(), Fingerprint::of(&bytes));

        String::from_utf8(bytes).map_err(|_| CoreError::FragmentEncoding {
            path: path.to_path_buf(),
        })
    }
}

fn section_path(including: &Path, target: &str) -> PathBuf {
    let base = including.parent().unwrap_or_else(|| Path::new(""));
    normalize_path(&base.join(target))
}

fn check_cycle(stack: &[PathBuf], path: &Path) -> Result<(), CoreError> {
    if stack.iter().any(|open| open == path) {
        let mut chain = stack.to_vec();
        chain.push(path.to_path_buf());
        return Err(CoreError::CyclicInclusion { chain });
    }
    Ok(())
}

fn reject_manifest(path: &Path, text: &str) -> Result<(), CoreError> {
    match manifest_open_line(text) {
        Some(line) => Err(CoreError::ManifestParse {
            path: path.to_path_buf(),
            line,
            reason: "a manifest block is only allowed in the entry fragment".to_string(),
        }),
        None => Ok(()),
    }
}
