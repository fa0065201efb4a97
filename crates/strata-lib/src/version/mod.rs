//! Stores and their version history
//!
//! A store is a named tree with a mutable head and an ordered list of
//! committed versions. Version ids are slots in `versions`; purging a
//! version empties its slot, so `versions.len()` is always the id the head
//! will receive when it is next snapshotted.
//!
//! ## Modules
//!
//! - [`index`]: snapshot, purge, listing and store-level operations

pub mod index;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::node::{NodeId, PropertyValue, QName};
use crate::path::VersionSpec;

/// Internal store identity; stable across renames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(pub u64);

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

/// An immutable snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub id: u32,
    pub root: NodeId,
    pub created: DateTime<Utc>,
    pub creator: String,
    pub label: Option<String>,
    pub comment: Option<String>,
    /// Version of every other store a layer in this version reads through
    /// without naming one itself.
    #[serde(default)]
    pub pins: BTreeMap<StoreId, u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreData {
    pub id: StoreId,
    pub name: String,
    pub creator: String,
    pub created: DateTime<Utc>,
    pub properties: BTreeMap<QName, PropertyValue>,
    /// Root of the head under construction.
    pub head_root: NodeId,
    /// Nodes owned by the head; frozen on the next snapshot.
    pub head_nodes: BTreeSet<NodeId>,
    pub versions: Vec<Option<Version>>,
}

impl StoreData {
    /// Id the head will get when snapshotted.
    pub fn next_version_id(&self) -> u32 {
        self.versions.len() as u32
    }

    /// Highest committed version still present.
    pub fn latest_snapshot_id(&self) -> Option<u32> {
        self.versions.iter().rev().flatten().next().map(|v| v.id)
    }

    pub fn version(&self, id: u32) -> Option<&Version> {
        self.versions.get(id as usize).and_then(Option::as_ref)
    }

    pub fn live_versions(&self) -> impl DoubleEndedIterator<Item = &Version> {
        self.versions.iter().flatten()
    }

    /// Root node of a version or of the head.
    pub fn root_at(&self, version: VersionSpec) -> Result<NodeId> {
        match version {
            VersionSpec::Head => Ok(self.head_root),
            VersionSpec::Version(v) => self.version(v).map(|v| v.root).ok_or_else(|| {
                StoreError::not_found(format!("version {} of store {}", v, self.name))
            }),
        }
    }

    pub fn descriptor(&self) -> StoreDescriptor {
        StoreDescriptor {
            name: self.name.clone(),
            creator: self.creator.clone(),
            created: self.created,
            next_version_id: self.next_version_id(),
            latest_snapshot_id: self.latest_snapshot_id(),
            version_count: self.live_versions().count(),
        }
    }
}

/// Value description of a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDescriptor {
    pub name: String,
    pub creator: String,
    pub created: DateTime<Utc>,
    pub next_version_id: u32,
    pub latest_snapshot_id: Option<u32>,
    pub version_count: usize,
}

/// Value description of a committed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDescriptor {
    pub store: String,
    pub id: u32,
    pub root: NodeId,
    pub created: DateTime<Utc>,
    pub creator: String,
    pub label: Option<String>,
    pub comment: Option<String>,
}

impl VersionDescriptor {
    pub fn new(store: &str, version: &Version) -> Self {
        Self {
            store: store.to_string(),
            id: version.id,
            root: version.root,
            created: version.created,
            creator: version.creator.clone(),
            label: version.label.clone(),
            comment: version.comment.clone(),
        }
    }
}

/// SQL `LIKE` matching: `%` is any run, `_` any single character, `\`
/// escapes the next character. Runs in O(pattern * text).
pub fn like_match(pattern: &str, text: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    // reachable[i]: the pattern read so far matches exactly text[..i]
    let mut reachable = vec![false; text.len() + 1];
    reachable[0] = true;
    for token in like_tokens(pattern) {
        let mut next = vec![false; text.len() + 1];
        match token {
            LikeToken::AnyRun => {
                let mut seen = false;
                for (i, slot) in next.iter_mut().enumerate() {
                    seen |= reachable[i];
                    *slot = seen;
                }
            }
            LikeToken::AnyChar => {
                for i in 0..text.len() {
                    next[i + 1] = reachable[i];
                }
            }
            LikeToken::Literal(c) => {
                for i in 0..text.len() {
                    next[i + 1] = reachable[i] && text[i] == c;
                }
            }
        }
        reachable = next;
    }
    reachable[text.len()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LikeToken {
    AnyRun,
    AnyChar,
    Literal(char),
}

fn like_tokens(pattern: &str) -> Vec<LikeToken> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => LikeToken::AnyRun,
            '_' => LikeToken::AnyChar,
            '\\' => LikeToken::Literal(chars.next().unwrap_or('\\')),
            c => LikeToken::Literal(c),
        });
    }
    tokens
}
