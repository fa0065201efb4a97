//! Node graph for Strata
//!
//! Files and directories (plain or layered) live in a single arena keyed
//! by [`NodeId`]. Directory entries, indirection targets and predecessor
//! links are plain ids or path strings, never owning references, so the
//! graph can contain sharing and cycles without any ownership tangles.
//!
//! ## Modules
//!
//! - [`graph`]: the arena itself, ownership checks and copy helpers

pub mod graph;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::ContentRef;
use crate::error::{Result, StoreError};
use crate::path::VersionSpec;
use crate::version::StoreId;

pub use graph::NodeGraph;

/// Globally unique node identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    PlainFile,
    PlainDirectory,
    LayeredFile,
    LayeredDirectory,
}

impl NodeKind {
    pub fn is_directory(&self) -> bool {
        matches!(self, NodeKind::PlainDirectory | NodeKind::LayeredDirectory)
    }

    pub fn is_file(&self) -> bool {
        !self.is_directory()
    }

    pub fn is_layered(&self) -> bool {
        matches!(self, NodeKind::LayeredFile | NodeKind::LayeredDirectory)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::PlainFile => "file",
            NodeKind::PlainDirectory => "directory",
            NodeKind::LayeredFile => "layered-file",
            NodeKind::LayeredDirectory => "layered-directory",
        };
        f.pad(s)
    }
}

/// Qualified property or aspect name, conventionally `{namespace}local`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QName(String);

impl QName {
    pub fn new(namespace: &str, local: &str) -> Self {
        if namespace.is_empty() {
            QName(local.to_string())
        } else {
            QName(format!("{{{}}}{}", namespace, local))
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        let rest = self.0.strip_prefix('{')?;
        rest.split_once('}').map(|(ns, _)| ns)
    }

    pub fn local_name(&self) -> &str {
        match self.0.strip_prefix('{').and_then(|r| r.split_once('}')) {
            Some((_, local)) => local,
            None => &self.0,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for QName {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(StoreError::invalid("empty qualified name"));
        }
        if s.starts_with('{') && !s.contains('}') {
            return Err(StoreError::invalid(format!("unterminated namespace in {:?}", s)));
        }
        Ok(QName(s.to_string()))
    }
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(DateTime<Utc>),
    List(Vec<PropertyValue>),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => write!(f, "null"),
            PropertyValue::Text(s) => write!(f, "{}", s),
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::Float(x) => write!(f, "{}", x),
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Date(d) => write!(f, "{}", d.to_rfc3339()),
            PropertyValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// File payload shared by plain files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    /// Absent means the file is empty.
    pub content: Option<ContentRef>,
    pub mime_type: Option<String>,
    pub encoding: Option<String>,
}

/// Local entries of a directory, ordered by name.
pub type Entries = BTreeMap<String, NodeId>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayeredDirectory {
    pub entries: Entries,
    /// Whiteouts: names hidden from the indirection target.
    pub deleted: BTreeSet<String>,
    /// Explicit target; `None` means the target is derived from the
    /// parent's effective indirection at resolution time.
    pub indirection: Option<String>,
    pub opaque: bool,
}

impl LayeredDirectory {
    pub fn primary(target: String) -> Self {
        Self {
            entries: Entries::new(),
            deleted: BTreeSet::new(),
            indirection: Some(target),
            opaque: false,
        }
    }

    pub fn non_primary() -> Self {
        Self {
            entries: Entries::new(),
            deleted: BTreeSet::new(),
            indirection: None,
            opaque: false,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.indirection.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeBody {
    PlainFile(FileData),
    PlainDirectory(Entries),
    LayeredFile { target: String },
    LayeredDirectory(LayeredDirectory),
}

/// A node in the arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub body: NodeBody,
    /// `Some(store)` while the node belongs to that store's mutable head.
    pub owner: Option<StoreId>,
    /// The node this one was copy-on-write derived from.
    pub predecessor: Option<NodeId>,
    pub guid: String,
    pub properties: BTreeMap<QName, PropertyValue>,
    pub aspects: BTreeSet<QName>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::PlainFile(_) => NodeKind::PlainFile,
            NodeBody::PlainDirectory(_) => NodeKind::PlainDirectory,
            NodeBody::LayeredFile { .. } => NodeKind::LayeredFile,
            NodeBody::LayeredDirectory(_) => NodeKind::LayeredDirectory,
        }
    }

    /// Local entries, for either directory kind.
    pub fn entries(&self) -> Option<&Entries> {
        match &self.body {
            NodeBody::PlainDirectory(entries) => Some(entries),
            NodeBody::LayeredDirectory(dir) => Some(&dir.entries),
            _ => None,
        }
    }

    pub fn entries_mut(&mut self) -> Option<&mut Entries> {
        match &mut self.body {
            NodeBody::PlainDirectory(entries) => Some(entries),
            NodeBody::LayeredDirectory(dir) => Some(&mut dir.entries),
            _ => None,
        }
    }

    pub fn layered_dir(&self) -> Option<&LayeredDirectory> {
        match &self.body {
            NodeBody::LayeredDirectory(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn layered_dir_mut(&mut self) -> Option<&mut LayeredDirectory> {
        match &mut self.body {
            NodeBody::LayeredDirectory(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn file_data(&self) -> Option<&FileData> {
        match &self.body {
            NodeBody::PlainFile(data) => Some(data),
            _ => None,
        }
    }

    pub fn file_data_mut(&mut self) -> Option<&mut FileData> {
        match &mut self.body {
            NodeBody::PlainFile(data) => Some(data),
            _ => None,
        }
    }

    pub fn touch(&mut self) {
        self.modified = Utc::now();
    }
}

/// What kind of node a create operation should produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewNode {
    PlainFile,
    PlainDirectory,
    LayeredFile { target: String },
    LayeredDirectory { target: String },
}

impl NewNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            NewNode::PlainFile => NodeKind::PlainFile,
            NewNode::PlainDirectory => NodeKind::PlainDirectory,
            NewNode::LayeredFile { .. } => NodeKind::LayeredFile,
            NewNode::LayeredDirectory { .. } => NodeKind::LayeredDirectory,
        }
    }
}

/// Value snapshot of a node handed to callers. Holds no reference into
/// the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Qualified path the node was reached by, when known.
    pub path: Option<String>,
    /// Version the path was resolved in, when known.
    pub version: Option<VersionSpec>,
    pub name: Option<String>,
    pub guid: String,
    pub predecessor: Option<NodeId>,
    /// Effective indirection of a layered node.
    pub indirection: Option<String>,
    pub primary_indirection: bool,
    pub opaque: bool,
    pub content: Option<ContentRef>,
    pub mime_type: Option<String>,
    pub encoding: Option<String>,
    /// Number of local entries (directories only).
    pub entry_count: usize,
    /// True while the node can still be edited in place.
    pub mutable: bool,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl NodeDescriptor {
    /// Build a descriptor from a node. `indirection` is the effective
    /// indirection computed by the resolver.
    pub fn from_node(node: &Node, indirection: Option<String>) -> Self {
        let (primary, opaque) = match &node.body {
            NodeBody::LayeredDirectory(dir) => (dir.is_primary(), dir.opaque),
            NodeBody::LayeredFile { .. } => (true, false),
            _ => (false, false),
        };
        let file = node.file_data();
        Self {
            id: node.id,
            kind: node.kind(),
            path: None,
            version: None,
            name: None,
            guid: node.guid.clone(),
            predecessor: node.predecessor,
            indirection,
            primary_indirection: primary,
            opaque,
            content: file.and_then(|f| f.content.clone()),
            mime_type: file.and_then(|f| f.mime_type.clone()),
            encoding: file.and_then(|f| f.encoding.clone()),
            entry_count: node.entries().map(|e| e.len()).unwrap_or(0),
            mutable: node.owner.is_some(),
            created: node.created,
            modified: node.modified,
        }
    }

    pub(crate) fn at(mut self, path: String, version: VersionSpec, name: Option<String>) -> Self {
        self.path = Some(path);
        self.version = Some(version);
        self.name = name;
        self
    }

    pub fn is_directory(&self) -> bool {
        self.kind.is_directory()
    }

    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }
}
