pub mod flags;
pub mod manifest;
pub mod record;

pub use flags::FlagSet;
pub use manifest::{BuildMode, Manifest};
pub use record::{BuildRecord, Fingerprint};
