use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// What happens after the artifact is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Write the artifact and execute it.
    Run,
    /// Write the artifact only.
    #[default]
    Prod,
}

impl FromStr for BuildMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "run" => Ok(BuildMode::Run),
            "prod" => Ok(BuildMode::Prod),
            other => Err(CoreError::InvalidBuildMode(other.to_string())),
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMode::Run => write!(f, "run"),
            BuildMode::Prod => write!(f, "prod"),
        }
    }
}

/// Configuration decoded from the entry fragment's manifest block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shebang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_mode: Option<BuildMode>,
    /// Keys this version does not understand, kept as written.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Manifest {
    /// Build mode with the `prod` default applied.
    pub fn mode(&self) -> BuildMode {
        self.build_mode.unwrap_or_default()
    }

    /// The first line of the artifact, if a shebang is configured.
    pub fn shebang_line(&self) -> Option<String> {
        self.shebang.as_deref().map(|s| {
            if s.starts_with("#!") {
                s.to_string()
            } else {
                format!("#!{s}")
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_mode_parse() {
        assert_eq!("run".parse::<BuildMode>().unwrap(), BuildMode::Run);
        assert_eq!("prod".parse::<BuildMode>().unwrap(), BuildMode::Prod);
        assert!(matches!(
            "Run".parse::<BuildMode>(),
            Err(CoreError::InvalidBuildMode(v)) if v == "Run"
        ));
    }

    #[test]
    fn test_defaults() {
        let m = Manifest::default();
        assert_eq!(m.mode(), BuildMode::Prod);
        assert!(m.shebang_line().is_none());
    }

    #[test]
    fn test_shebang_line_prefix() {
        let m = Manifest {
            shebang: Some("/usr/bin/env python3".into()),
            ..Default::default()
        };
        assert_eq!(m.shebang_line().as_deref(), Some("#!/usr/bin/env python3"));

        let m = Manifest {
            shebang: Some("#!/bin/sh".into()),
            ..Default::default()
        };
        assert_eq!(m.shebang_line().as_deref(), Some("#!/bin/sh"));
    }
}
