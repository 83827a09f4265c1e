use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Source of fragment bytes. Reads are never cached: every build asks
/// again, because fragments change between builds.
pub trait FragmentStore {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

impl<S: FragmentStore + ?Sized> FragmentStore for &S {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        (**self).read(path)
    }
}

/// Reads fragments straight from the file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStore;

impl FragmentStore for FsStore {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// In-memory fragments keyed by normalized path.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, text: impl Into<Vec<u8>>) -> &mut Self {
        self.files.insert(normalize_path(path.as_ref()), text.into());
        self
    }
}

impl FragmentStore for MemoryStore {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no fragment at {}", path.display()),
                )
            })
    }
}

/// Lexically resolve `.` and `..` so that one file has one identity in the
/// inclusion stack regardless of how a `#:section` spelled it.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
