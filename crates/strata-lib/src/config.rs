//! Repository configuration
//!
//! Stored in the `[config]` table of `meta/repository.toml`; every field has
//! a default so an empty table is a valid configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default bound on nested indirection during a single resolution.
pub const DEFAULT_MAX_INDIRECTION_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// How many indirections one resolution may follow before failing.
    pub max_indirection_depth: usize,
    /// Recorded as creator of stores and versions.
    pub default_creator: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            max_indirection_depth: DEFAULT_MAX_INDIRECTION_DEPTH,
            default_creator: default_creator(),
        }
    }
}

impl RepositoryConfig {
    pub fn with_max_indirection_depth(mut self, depth: usize) -> Self {
        self.max_indirection_depth = depth;
        self
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.default_creator = creator.into();
        self
    }
}

fn default_creator() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "system".to_string())
}

/// Where repositories live when no directory is given.
///
/// Default location: `~/.local/share/strata`
pub fn default_repository_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("strata")
}
