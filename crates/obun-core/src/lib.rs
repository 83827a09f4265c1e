//! Core of obun: turns an entry fragment and the fragments it pulls in with
//! `#:section` into one resolved text, honoring `#:if` / `#:else` /
//! `#:endif` against a set of flags, and writes the result as an artifact.
//!
//! # Example
//! ```no_run
//! use obun_core::{ArtifactBuilder, BuildRequest, FsStore, Settings};
//!
//! let request = BuildRequest::new("/work/app/index.obun")
//!     .with_flags(["DEBUG"].into_iter().collect());
//! let built = ArtifactBuilder::new(FsStore, Settings::default())
//!     .build(&request)
//!     .unwrap();
//! println!("{} ({} fragments)", built.path().display(), built.record.fragments.len());
//! ```

pub mod artifact;
pub mod assembly;
pub mod config;
pub mod error;
pub mod model;
pub mod project;
pub mod storage;

pub use artifact::{ArtifactBuilder, BuildRequest, BuiltArtifact};
pub use assembly::{Assembler, Assembly, EntryAssembly};
pub use config::Settings;
pub use error::CoreError;
pub use model::{BuildMode, BuildRecord, Fingerprint, FlagSet, Manifest};
pub use project::resolve_entry;
pub use storage::{FragmentStore, FsStore, MemoryStore};
