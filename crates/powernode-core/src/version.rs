// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Firmware version comparison

use crate::error::{NodeError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Version embedded in this build
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// How a remote version string is ordered against the running one.
///
/// `Lexicographic` compares the raw strings, so "1.10.0" sorts before
/// "1.9.0". It is the deployed behavior and stays the default; `Semantic`
/// parses `X.Y.Z` numerically.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VersionComparator {
    #[default]
    Lexicographic,
    Semantic,
}

impl VersionComparator {
    /// Returns true if `remote` should replace `current`
    pub fn is_newer(self, current: &str, remote: &str) -> Result<bool> {
        match self {
            Self::Lexicographic => Ok(remote > current),
            Self::Semantic => {
                let ordering = parse_version(remote)?.cmp(&parse_version(current)?);
                Ok(ordering == Ordering::Greater)
            }
        }
    }
}

/// Parse semver-like version strings (e.g., "1.0.2", "v1.0.2")
pub fn parse_version(s: &str) -> Result<(u32, u32, u32)> {
    let s = s.trim().trim_start_matches(['v', 'V']);
    let parts: Vec<&str> = s.split('.').collect();

    let [major, minor, patch] = parts.as_slice() else {
        return Err(NodeError::VersionParse(format!(
            "Invalid version format: {s}, expected X.Y.Z"
        )));
    };

    let number = |part: &str, name: &str| {
        part.parse::<u32>()
            .map_err(|_| NodeError::VersionParse(format!("Invalid {name} version: {part}")))
    };

    Ok((
        number(*major, "major")?,
        number(*minor, "minor")?,
        number(*patch, "patch")?,
    ))
}
