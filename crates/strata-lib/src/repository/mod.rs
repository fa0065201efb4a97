//! The repository facade
//!
//! `Repository` owns the whole state behind one `RwLock`. Reads share the
//! lock through a [`Reader`]; writes take it exclusively through a
//! [`Transaction`]. Every single-call write method below is its own
//! transaction; use [`Repository::transaction`] to group several.
//!
//! ## Modules
//!
//! - [`state`]: the serialized state
//! - [`reader`]: read-only operations

pub mod reader;
pub mod state;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::config::RepositoryConfig;
use crate::content::{ContentRef, ContentStore, MemoryContentStore};
use crate::error::Result;
use crate::gc::{self, GcStats};
use crate::metadata::{MetadataValidator, PermissiveValidator};
use crate::mutation::Transaction;
use crate::node::{NewNode, NodeDescriptor, NodeId, PropertyValue, QName};
use crate::path::{QualifiedPath, VersionSpec};
use crate::version::{StoreDescriptor, VersionDescriptor};

pub use reader::{LayeringInfo, Reader};
pub use state::RepoState;

pub struct Repository {
    state: RwLock<RepoState>,
    config: RepositoryConfig,
    validator: Box<dyn MetadataValidator>,
    content: Box<dyn ContentStore>,
    /// Where committed transactions are written, if anywhere.
    state_path: Option<PathBuf>,
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

impl Repository {
    /// An empty in-memory repository.
    pub fn new() -> Self {
        Self::with_config(RepositoryConfig::default())
    }

    pub fn with_config(config: RepositoryConfig) -> Self {
        Self::with_validator(config, Box::new(PermissiveValidator))
    }

    pub fn with_validator(config: RepositoryConfig, validator: Box<dyn MetadataValidator>) -> Self {
        Self::from_state(RepoState::default(), config, validator)
    }

    fn from_state(
        state: RepoState,
        config: RepositoryConfig,
        validator: Box<dyn MetadataValidator>,
    ) -> Self {
        Self {
            state: RwLock::new(state),
            config,
            validator,
            content: Box::new(MemoryContentStore::new()),
            state_path: None,
        }
    }

    /// Use `content` for file bytes instead of the in-memory default.
    pub fn with_content_store(mut self, content: Box<dyn ContentStore>) -> Self {
        self.content = content;
        self
    }

    /// Write the state to `path` after every committed transaction.
    pub fn persist_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    /// Load a state written by [`Repository::save`].
    pub fn load(path: &Path, config: RepositoryConfig) -> Result<Self> {
        let state = RepoState::load(path)?;
        info!(
            "Loaded {} stores and {} nodes from {}",
            state.stores.len(),
            state.nodes.len(),
            path.display()
        );
        Ok(Self::from_state(state, config, Box::new(PermissiveValidator)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.save(path)?;
        debug!("Repository::save path={}", path.display());
        Ok(())
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn content_store(&self) -> &dyn ContentStore {
        self.content.as_ref()
    }

    /// Open a transaction. It holds the write lock until committed,
    /// rolled back or dropped.
    pub fn begin(&self) -> Transaction<'_> {
        let guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        Transaction::new(
            guard,
            &self.config,
            self.validator.as_ref(),
            self.state_path.as_deref(),
        )
    }

    /// Run `f` in a transaction, committing on `Ok` and rolling back on
    /// `Err`.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut txn = self.begin();
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                debug!("Repository::transaction rolling back: {}", e);
                txn.rollback();
                Err(e)
            }
        }
    }

    /// Run `f` against the state under the shared lock.
    pub fn read<T>(&self, f: impl FnOnce(&Reader<'_>) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let reader = Reader::new(&state, self.config.max_indirection_depth);
        f(&reader)
    }

    // Stores and versions

    pub fn create_store(&self, name: &str) -> Result<StoreDescriptor> {
        self.transaction(|txn| txn.create_store(name))
    }

    pub fn get_stores(&self) -> Vec<StoreDescriptor> {
        self.read(|r| r.get_stores())
    }

    pub fn get_store(&self, name: &str) -> Result<StoreDescriptor> {
        self.read(|r| r.get_store(name))
    }

    pub fn get_store_root(&self, version: VersionSpec, name: &str) -> Result<NodeDescriptor> {
        self.read(|r| r.get_store_root(version, name))
    }

    pub fn rename_store(&self, from: &str, to: &str) -> Result<()> {
        self.transaction(|txn| txn.rename_store(from, to))
    }

    pub fn purge_store(&self, name: &str) -> Result<GcStats> {
        let stats = self.transaction(|txn| txn.purge_store(name))?;
        self.release_content(&stats);
        Ok(stats)
    }

    pub fn create_snapshot(
        &self,
        store: &str,
        label: Option<&str>,
        comment: Option<&str>,
    ) -> Result<u32> {
        self.transaction(|txn| txn.create_snapshot(store, label, comment))
    }

    pub fn get_store_versions(&self, store: &str) -> Result<Vec<VersionDescriptor>> {
        self.read(|r| r.get_store_versions(store))
    }

    pub fn get_store_versions_between(
        &self,
        store: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<VersionDescriptor>> {
        self.read(|r| r.get_store_versions_between(store, from, to))
    }

    pub fn purge_version(&self, store: &str, version: u32) -> Result<GcStats> {
        let stats = self.transaction(|txn| txn.purge_version(store, version))?;
        self.release_content(&stats);
        Ok(stats)
    }

    pub fn get_latest_snapshot_id(&self, store: &str) -> Result<Option<u32>> {
        self.read(|r| r.get_latest_snapshot_id(store))
    }

    pub fn get_next_version_id(&self, store: &str) -> Result<u32> {
        self.read(|r| r.get_next_version_id(store))
    }

    pub fn set_store_property(&self, store: &str, name: QName, value: PropertyValue) -> Result<()> {
        self.transaction(|txn| txn.set_store_property(store, name, value))
    }

    pub fn set_store_properties(
        &self,
        store: &str,
        properties: BTreeMap<QName, PropertyValue>,
    ) -> Result<()> {
        self.transaction(|txn| txn.set_store_properties(store, properties))
    }

    pub fn get_store_property(&self, store: &str, name: &QName) -> Result<Option<PropertyValue>> {
        self.read(|r| r.get_store_property(store, name))
    }

    pub fn get_store_properties(&self, store: &str) -> Result<BTreeMap<QName, PropertyValue>> {
        self.read(|r| r.get_store_properties(store))
    }

    pub fn delete_store_property(&self, store: &str, name: &QName) -> Result<()> {
        self.transaction(|txn| txn.delete_store_property(store, name))
    }

    pub fn query_store_property_key(
        &self,
        store: &str,
        pattern: &str,
    ) -> Result<BTreeMap<QName, PropertyValue>> {
        self.read(|r| r.query_store_property_key(store, pattern))
    }

    pub fn query_stores_property_key(
        &self,
        pattern: &str,
    ) -> BTreeMap<String, BTreeMap<QName, PropertyValue>> {
        self.read(|r| r.query_stores_property_key(pattern))
    }

    // Resolution

    pub fn lookup(&self, version: VersionSpec, path: &QualifiedPath) -> Result<NodeDescriptor> {
        self.read(|r| r.lookup(version, path))
    }

    pub fn lookup_child(&self, dir: &NodeDescriptor, name: &str) -> Result<NodeDescriptor> {
        self.read(|r| r.lookup_child(dir, name))
    }

    pub fn get_node(&self, id: NodeId) -> Result<NodeDescriptor> {
        self.read(|r| r.get_node(id))
    }

    pub fn get_directory_listing(
        &self,
        version: VersionSpec,
        path: &QualifiedPath,
    ) -> Result<BTreeMap<String, NodeDescriptor>> {
        self.read(|r| r.get_directory_listing(version, path))
    }

    pub fn get_directory_listing_direct(
        &self,
        version: VersionSpec,
        path: &QualifiedPath,
    ) -> Result<BTreeMap<String, NodeDescriptor>> {
        self.read(|r| r.get_directory_listing_direct(version, path))
    }

    pub fn get_directory_listing_of(
        &self,
        dir: &NodeDescriptor,
    ) -> Result<BTreeMap<String, NodeDescriptor>> {
        self.read(|r| r.get_directory_listing_of(dir))
    }

    pub fn get_deleted(&self, version: VersionSpec, path: &QualifiedPath) -> Result<Vec<String>> {
        self.read(|r| r.get_deleted(version, path))
    }

    pub fn get_indirection_path(&self, version: VersionSpec, path: &QualifiedPath) -> Result<String> {
        self.read(|r| r.get_indirection_path(version, path))
    }

    pub fn get_layering_info(
        &self,
        version: VersionSpec,
        path: &QualifiedPath,
    ) -> Result<LayeringInfo> {
        self.read(|r| r.get_layering_info(version, path))
    }

    pub fn get_a_path(&self, id: NodeId) -> Result<Option<(VersionSpec, QualifiedPath)>> {
        self.read(|r| r.get_a_path(id))
    }

    pub fn get_content_ref(
        &self,
        version: VersionSpec,
        path: &QualifiedPath,
    ) -> Result<Option<ContentRef>> {
        self.read(|r| r.get_content_ref(version, path))
    }

    // Structural edits

    pub fn create_node(
        &self,
        parent: &QualifiedPath,
        name: &str,
        new: NewNode,
    ) -> Result<NodeDescriptor> {
        self.transaction(|txn| txn.create_node(parent, name, new))
    }

    pub fn create_file(&self, parent: &QualifiedPath, name: &str) -> Result<NodeDescriptor> {
        self.transaction(|txn| txn.create_file(parent, name))
    }

    pub fn create_directory(&self, parent: &QualifiedPath, name: &str) -> Result<NodeDescriptor> {
        self.transaction(|txn| txn.create_directory(parent, name))
    }

    pub fn create_layered_file(
        &self,
        target: &str,
        parent: &QualifiedPath,
        name: &str,
    ) -> Result<NodeDescriptor> {
        self.transaction(|txn| txn.create_layered_file(target, parent, name))
    }

    pub fn create_layered_directory(
        &self,
        target: &str,
        parent: &QualifiedPath,
        name: &str,
    ) -> Result<NodeDescriptor> {
        self.transaction(|txn| txn.create_layered_directory(target, parent, name))
    }

    pub fn remove_node(&self, parent: &QualifiedPath, name: &str) -> Result<()> {
        self.transaction(|txn| txn.remove_node(parent, name))
    }

    pub fn rename(
        &self,
        src_parent: &QualifiedPath,
        src_name: &str,
        dst_parent: &QualifiedPath,
        dst_name: &str,
    ) -> Result<()> {
        self.transaction(|txn| txn.rename(src_parent, src_name, dst_parent, dst_name))
    }

    pub fn uncover(&self, dir: &QualifiedPath, name: &str) -> Result<()> {
        self.transaction(|txn| txn.uncover(dir, name))
    }

    pub fn set_opacity(&self, path: &QualifiedPath, opaque: bool) -> Result<()> {
        self.transaction(|txn| txn.set_opacity(path, opaque))
    }

    pub fn retarget_layered_directory(&self, path: &QualifiedPath, target: &str) -> Result<()> {
        self.transaction(|txn| txn.retarget_layered_directory(path, target))
    }

    pub fn make_primary(&self, path: &QualifiedPath) -> Result<()> {
        self.transaction(|txn| txn.make_primary(path))
    }

    pub fn create_branch(
        &self,
        version: VersionSpec,
        src_path: &QualifiedPath,
        dst_parent: &QualifiedPath,
        name: &str,
    ) -> Result<NodeDescriptor> {
        self.transaction(|txn| txn.create_branch(version, src_path, dst_parent, name))
    }

    pub fn revert(&self, path: &QualifiedPath, to_revert_to: NodeId) -> Result<NodeDescriptor> {
        self.transaction(|txn| txn.revert(path, to_revert_to))
    }

    // Metadata

    pub fn set_node_property(
        &self,
        path: &QualifiedPath,
        name: QName,
        value: PropertyValue,
    ) -> Result<()> {
        self.transaction(|txn| txn.set_node_property(path, name, value))
    }

    pub fn set_node_properties(
        &self,
        path: &QualifiedPath,
        properties: BTreeMap<QName, PropertyValue>,
    ) -> Result<()> {
        self.transaction(|txn| txn.set_node_properties(path, properties))
    }

    pub fn get_node_property(
        &self,
        version: VersionSpec,
        path: &QualifiedPath,
        name: &QName,
    ) -> Result<Option<PropertyValue>> {
        self.read(|r| r.get_node_property(version, path, name))
    }

    pub fn get_node_properties(
        &self,
        version: VersionSpec,
        path: &QualifiedPath,
    ) -> Result<BTreeMap<QName, PropertyValue>> {
        self.read(|r| r.get_node_properties(version, path))
    }

    pub fn delete_node_property(&self, path: &QualifiedPath, name: &QName) -> Result<()> {
        self.transaction(|txn| txn.delete_node_property(path, name))
    }

    pub fn delete_node_properties(&self, path: &QualifiedPath) -> Result<()> {
        self.transaction(|txn| txn.delete_node_properties(path))
    }

    pub fn add_aspect(&self, path: &QualifiedPath, aspect: QName) -> Result<()> {
        self.transaction(|txn| txn.add_aspect(path, aspect))
    }

    pub fn remove_aspect(&self, path: &QualifiedPath, aspect: &QName) -> Result<()> {
        self.transaction(|txn| txn.remove_aspect(path, aspect))
    }

    pub fn has_aspect(
        &self,
        version: VersionSpec,
        path: &QualifiedPath,
        aspect: &QName,
    ) -> Result<bool> {
        self.read(|r| r.has_aspect(version, path, aspect))
    }

    pub fn get_aspects(&self, version: VersionSpec, path: &QualifiedPath) -> Result<Vec<QName>> {
        self.read(|r| r.get_aspects(version, path))
    }

    pub fn set_guid(&self, path: &QualifiedPath, guid: &str) -> Result<()> {
        self.transaction(|txn| txn.set_guid(path, guid))
    }

    pub fn set_mime_type(&self, path: &QualifiedPath, mime_type: &str) -> Result<()> {
        self.transaction(|txn| txn.set_mime_type(path, mime_type))
    }

    pub fn set_encoding(&self, path: &QualifiedPath, encoding: &str) -> Result<()> {
        self.transaction(|txn| txn.set_encoding(path, encoding))
    }

    pub fn set_content(&self, path: &QualifiedPath, content: ContentRef) -> Result<()> {
        self.transaction(|txn| txn.set_content(path, content))
    }

    /// Store `data` and point `parent/name` at it, creating the file if it
    /// is not visible yet.
    pub fn write_file(&self, parent: &QualifiedPath, name: &str, data: &[u8]) -> Result<NodeDescriptor> {
        let content = self.content.put(data)?;
        let path = parent.join(name)?;
        let written = self.transaction(|txn| {
            let previous = match txn.reader().lookup(VersionSpec::Head, &path) {
                Ok(desc) => Some(desc),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            };
            if previous.is_none() {
                txn.create_file(parent, name)?;
            }
            txn.set_content(&path, content.clone())?;
            let desc = txn.reader().lookup(VersionSpec::Head, &path)?;
            Ok((desc, previous.and_then(|d| d.content)))
        });
        let (desc, replaced) = match written {
            Ok(written) => written,
            Err(e) => {
                self.release_unused(&[content]);
                return Err(e);
            }
        };
        if let Some(old) = replaced {
            self.release_unused(&[old]);
        }
        Ok(desc)
    }

    /// Bytes of the file at `path`; an empty file reads as no bytes.
    pub fn read_file(&self, version: VersionSpec, path: &QualifiedPath) -> Result<Vec<u8>> {
        match self.get_content_ref(version, path)? {
            Some(content) => self.content.get(&content),
            None => Ok(Vec::new()),
        }
    }

    // Ancestry

    pub fn get_common_ancestor(&self, left: NodeId, right: NodeId) -> Result<Option<NodeDescriptor>> {
        self.read(|r| r.get_common_ancestor(left, right))
    }

    pub fn get_history(&self, id: NodeId, count: usize) -> Result<Vec<NodeDescriptor>> {
        self.read(|r| r.get_history(id, count))
    }

    // Garbage collection

    pub fn collect_garbage(&self) -> Result<GcStats> {
        let stats = self.transaction(|txn| txn.collect_garbage())?;
        self.release_content(&stats);
        Ok(stats)
    }

    pub fn gc_dry_run(&self) -> GcStats {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        gc::dry_run(&state)
    }

    /// Release blobs among `candidates` that no node refers to any more.
    fn release_unused(&self, candidates: &[ContentRef]) {
        let unused: Vec<ContentRef> = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            candidates
                .iter()
                .filter(|c| !gc::content_in_use(&state, c))
                .cloned()
                .collect()
        };
        for content in &unused {
            if let Err(e) = self.content.delete(content) {
                warn!("Failed to release content {}: {}", content, e);
            }
        }
    }

    /// Drop blobs no surviving node refers to. Failures only cost space.
    fn release_content(&self, stats: &GcStats) {
        for content in &stats.released_content {
            if let Err(e) = self.content.delete(content) {
                warn!("Failed to release content {}: {}", content, e);
            }
        }
    }
}
