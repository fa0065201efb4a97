//! Strata: a versioned, layered, copy-on-write content store
//!
//! A repository holds named stores. Each store is a tree of files and
//! directories with a mutable head and a list of immutable versions.
//! Layered directories overlay another path (in any store, at any version)
//! and only record what differs from it.

pub mod ancestry;
pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod gc;
pub mod metadata;
pub mod mutation;
pub mod node;
pub mod path;
pub mod project;
pub mod repository;
pub mod resolve;
pub mod version;

pub use config::RepositoryConfig;
pub use content::{ContentRef, ContentStore, DirContentStore, MemoryContentStore};
pub use error::{Result, StoreError};
pub use gc::GcStats;
pub use metadata::{AspectDictionary, MetadataValidator, PermissiveValidator};
pub use mutation::Transaction;
pub use node::{NewNode, NodeDescriptor, NodeId, NodeKind, PropertyValue, QName};
pub use path::{QualifiedPath, VersionSpec};
pub use project::StrataProject;
pub use repository::{LayeringInfo, Reader, Repository};
pub use version::{StoreDescriptor, VersionDescriptor};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
