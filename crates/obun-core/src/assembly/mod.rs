pub mod directive;
pub mod engine;
pub mod manifest;

pub use directive::{parse_line, Directive};
pub use engine::{Assembler, Assembly, EntryAssembly};
pub use manifest::{extract_manifest, Extracted};
