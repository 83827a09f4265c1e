pub mod fragments;

pub use fragments::{normalize_path, FragmentStore, FsStore, MemoryStore};
