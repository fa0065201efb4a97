//! Error types for Strata
//!
//! Every fallible operation in the library returns [`StoreError`]. Errors are
//! local to one operation: the transaction that raised one is rolled back
//! before the error reaches the caller.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Cannot modify committed version: {0}")]
    ImmutableVersion(String),

    #[error("Layering cycle detected while resolving {0}")]
    LayeringCycle(String),

    #[error("Indirection depth limit of {limit} exceeded while resolving {path}")]
    IndirectionTooDeep { path: String, limit: usize },

    #[error("Cannot purge version {version} of store {store}: {reason}")]
    PurgeActiveVersion {
        store: String,
        version: u32,
        reason: &'static str,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        StoreError::NotFound(what.into())
    }

    pub(crate) fn invalid(what: impl Into<String>) -> Self {
        StoreError::InvalidArgument(what.into())
    }

    /// True for errors that mean "nothing is there", as opposed to a
    /// structural failure such as a cycle.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
