use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use sha2::digest::Output;
use sha2::{Digest, Sha256};

use super::manifest::BuildMode;

/// SHA-256 of a fragment's bytes as they were read.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(Output<Sha256>);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes))
    }

    pub fn to_hex(&self) -> String {
        format!("{:x}", self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// What the last successful build produced and which fragments fed it.
/// Replaced wholesale after every rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct BuildRecord {
    pub entry: PathBuf,
    pub artifact: PathBuf,
    pub mode: BuildMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shebang: Option<String>,
    /// Every fragment read, with the fingerprint of the bytes the build saw.
    pub fragments: BTreeMap<PathBuf, Fingerprint>,
    pub built_at: DateTime<Utc>,
}
