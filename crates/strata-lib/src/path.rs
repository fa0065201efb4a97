//! Qualified repository paths
//!
//! Every path handed to the repository names its store explicitly:
//!
//! ```text
//! site1:/www/index.html      head of store "site1"
//! site1@3:/www/index.html    committed version 3 of store "site1"
//! ```
//!
//! Indirection targets of layered nodes use the same syntax; a target
//! written without a store prefix (`/www`) is qualified with the store of
//! the directory it is created in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Which version of a store an operation looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionSpec {
    /// The mutable head under construction.
    Head,
    /// A committed snapshot.
    Version(u32),
}

impl VersionSpec {
    /// Convert the conventional integer form, where `-1` means head.
    pub fn from_i64(raw: i64) -> Result<Self> {
        match raw {
            -1 => Ok(VersionSpec::Head),
            n if n < 0 => Err(StoreError::invalid(format!("negative version id {}", n))),
            n => u32::try_from(n)
                .map(VersionSpec::Version)
                .map_err(|_| StoreError::invalid(format!("version id {} out of range", n))),
        }
    }

    pub fn is_head(&self) -> bool {
        matches!(self, VersionSpec::Head)
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSpec::Head => write!(f, "head"),
            VersionSpec::Version(v) => write!(f, "{}", v),
        }
    }
}

/// A parsed `store[@version]:/a/b` path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedPath {
    store: String,
    version: Option<u32>,
    segments: Vec<String>,
}

impl QualifiedPath {
    /// The root directory of a store's head.
    pub fn root(store: &str) -> Result<Self> {
        validate_store_name(store)?;
        Ok(Self {
            store: store.to_string(),
            version: None,
            segments: Vec::new(),
        })
    }

    /// Parse a fully qualified path.
    pub fn parse(raw: &str) -> Result<Self> {
        let (prefix, path) = raw
            .split_once(':')
            .ok_or_else(|| StoreError::invalid(format!("path {:?} has no store prefix", raw)))?;
        let (store, version) = match prefix.split_once('@') {
            Some((store, version)) => {
                let version = version.parse::<u32>().map_err(|_| {
                    StoreError::invalid(format!("bad version {:?} in path {:?}", version, raw))
                })?;
                (store, Some(version))
            }
            None => (prefix, None),
        };
        validate_store_name(store)?;
        Ok(Self {
            store: store.to_string(),
            version,
            segments: split_segments(path)?,
        })
    }

    /// Parse a path that may omit its store prefix, in which case it is
    /// taken relative to `default_store`.
    pub fn parse_relative(raw: &str, default_store: &str) -> Result<Self> {
        if raw.starts_with('/') {
            validate_store_name(default_store)?;
            Ok(Self {
                store: default_store.to_string(),
                version: None,
                segments: split_segments(raw)?,
            })
        } else {
            Self::parse(raw)
        }
    }

    pub fn store(&self) -> &str {
        &self.store
    }

    /// The explicit `@version` of the path, if any.
    pub fn version(&self) -> Option<u32> {
        self.version
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The last segment, `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// A child path one level down.
    pub fn join(&self, name: &str) -> Result<Self> {
        validate_name(name)?;
        let mut child = self.clone();
        child.segments.push(name.to_string());
        Ok(child)
    }

    /// Split into the parent path and the final name.
    pub fn split_last(&self) -> Option<(Self, &str)> {
        let (name, rest) = self.segments.split_last()?;
        Some((
            Self {
                store: self.store.clone(),
                version: self.version,
                segments: rest.to_vec(),
            },
            name.as_str(),
        ))
    }

    /// Same path with the explicit version dropped.
    pub fn at_head(&self) -> Self {
        Self {
            version: None,
            ..self.clone()
        }
    }

    /// Same path pinned to a committed version.
    pub fn at_version(&self, version: u32) -> Self {
        Self {
            version: Some(version),
            ..self.clone()
        }
    }

    /// The `/a/b` part without store prefix.
    pub fn path_part(&self) -> String {
        if self.segments.is_empty() {
            "/".to_string()
        } else {
            let mut out = String::new();
            for segment in &self.segments {
                out.push('/');
                out.push_str(segment);
            }
            out
        }
    }

    /// True if `self` is `other` or lies beneath it (same store, ignoring
    /// version).
    pub fn starts_with(&self, other: &QualifiedPath) -> bool {
        self.store == other.store
            && self.segments.len() >= other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }
}

impl fmt::Display for QualifiedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(v) => write!(f, "{}@{}:{}", self.store, v, self.path_part()),
            None => write!(f, "{}:{}", self.store, self.path_part()),
        }
    }
}

impl FromStr for QualifiedPath {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn split_segments(path: &str) -> Result<Vec<String>> {
    if !path.is_empty() && !path.starts_with('/') {
        return Err(StoreError::invalid(format!(
            "path {:?} must be absolute",
            path
        )));
    }
    let mut segments = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        validate_name(segment)?;
        segments.push(segment.to_string());
    }
    Ok(segments)
}

/// Check a single entry name.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(StoreError::invalid(format!("bad entry name {:?}", name)));
    }
    Ok(())
}

/// Check a store name.
pub fn validate_store_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains([':', '/', '@']) {
        return Err(StoreError::invalid(format!("bad store name {:?}", name)));
    }
    Ok(())
}

/// Append `name` to a qualified indirection target, keeping its store and
/// version prefix.
pub fn join_target(target: &str, name: &str) -> Result<String> {
    Ok(QualifiedPath::parse(target)?.join(name)?.to_string())
}
