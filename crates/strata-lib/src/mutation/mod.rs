//! Mutation engine
//!
//! All writes go through a [`Transaction`]. A transaction holds the
//! repository's write lock for its whole lifetime and records the first
//! before-image of every node and store it touches. Committing keeps the
//! changes; returning an error from [`crate::Repository::transaction`],
//! calling [`Transaction::rollback`] or simply dropping the transaction
//! restores the before-images.
//!
//! ## Modules
//!
//! - [`promote`]: copy-on-write promotion of a resolved path into the head
//! - [`ops`]: structural edits (create, remove, rename, layering, branch,
//!   revert)
//! - [`props`]: node properties, aspects and file metadata

pub mod ops;
pub mod promote;
pub mod props;

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLockWriteGuard;

use log::{debug, warn};

use crate::config::RepositoryConfig;
use crate::error::{Result, StoreError};
use crate::metadata::MetadataValidator;
use crate::node::{Node, NodeBody, NodeId};
use crate::path::{QualifiedPath, VersionSpec};
use crate::repository::reader::Reader;
use crate::repository::state::RepoState;
use crate::resolve::{Resolved, Resolver};
use crate::version::{StoreData, StoreId};

/// First-touch before-images.
#[derive(Debug, Default)]
struct UndoLog {
    nodes: BTreeMap<NodeId, Option<Node>>,
    stores: BTreeMap<StoreId, Option<StoreData>>,
    names: Option<BTreeMap<String, StoreId>>,
}

impl UndoLog {
    fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.stores.is_empty() && self.names.is_none()
    }
}

pub struct Transaction<'a> {
    state: RwLockWriteGuard<'a, RepoState>,
    config: &'a RepositoryConfig,
    validator: &'a dyn MetadataValidator,
    persist: Option<&'a Path>,
    undo: UndoLog,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(
        state: RwLockWriteGuard<'a, RepoState>,
        config: &'a RepositoryConfig,
        validator: &'a dyn MetadataValidator,
        persist: Option<&'a Path>,
    ) -> Self {
        Self {
            state,
            config,
            validator,
            persist,
            undo: UndoLog::default(),
            finished: false,
        }
    }

    /// Keep every change. A repository opened from disk writes its state
    /// file here; if that fails the transaction is rolled back.
    pub fn commit(mut self) -> Result<()> {
        if let Some(path) = self.persist {
            if !self.undo.is_empty() {
                if let Err(e) = self.state.save(path) {
                    warn!("Failed to persist state to {}: {}", path.display(), e);
                    self.undo();
                    self.finished = true;
                    return Err(e);
                }
            }
        }
        debug!(
            "Transaction::commit nodes={} stores={}",
            self.undo.nodes.len(),
            self.undo.stores.len()
        );
        self.undo = UndoLog::default();
        self.finished = true;
        Ok(())
    }

    /// Discard every change made so far.
    pub fn rollback(mut self) {
        self.undo();
        self.finished = true;
    }

    fn undo(&mut self) {
        let undo = std::mem::take(&mut self.undo);
        debug!(
            "Transaction::rollback nodes={} stores={}",
            undo.nodes.len(),
            undo.stores.len()
        );
        let state = &mut *self.state;
        for (id, before) in undo.nodes {
            match before {
                Some(node) => {
                    state.nodes.insert(node);
                }
                None => {
                    state.nodes.remove(id);
                }
            }
        }
        for (id, before) in undo.stores {
            match before {
                Some(store) => {
                    state.stores.insert(id, store);
                }
                None => {
                    state.stores.remove(&id);
                }
            }
        }
        if let Some(names) = undo.names {
            state.names = names;
        }
    }

    pub fn config(&self) -> &RepositoryConfig {
        self.config
    }

    pub(crate) fn validator(&self) -> &dyn MetadataValidator {
        self.validator
    }

    pub(crate) fn state(&self) -> &RepoState {
        &self.state
    }

    /// Read access to the state as modified so far.
    pub fn reader(&self) -> Reader<'_> {
        Reader::new(&self.state, self.config.max_indirection_depth)
    }

    pub(crate) fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.state, self.config.max_indirection_depth)
    }

    pub(crate) fn resolve(&self, path: &QualifiedPath, version: VersionSpec) -> Result<Resolved> {
        self.resolver().resolve(path, version)
    }

    /// Resolve a path that is about to be written. Writes always address
    /// the head.
    pub(crate) fn resolve_for_write(&self, path: &QualifiedPath) -> Result<Resolved> {
        if let Some(v) = path.version() {
            return Err(StoreError::ImmutableVersion(format!(
                "{} is committed version {}",
                path, v
            )));
        }
        self.resolve(path, VersionSpec::Head)
    }

    fn record_node(&mut self, id: NodeId) {
        if let Entry::Vacant(slot) = self.undo.nodes.entry(id) {
            slot.insert(self.state.nodes.get(id).ok().cloned());
        }
    }

    fn record_store(&mut self, id: StoreId) {
        if let Entry::Vacant(slot) = self.undo.stores.entry(id) {
            slot.insert(self.state.stores.get(&id).cloned());
        }
    }

    /// Mutable access to a node owned by `store`'s head.
    pub(crate) fn node_mut(&mut self, id: NodeId, store: StoreId) -> Result<&mut Node> {
        self.record_node(id);
        self.state.nodes.get_owned_mut(id, store)
    }

    /// Insert a freshly built node, tracking it as part of its owner's head.
    pub(crate) fn insert_node(&mut self, node: Node) -> Result<NodeId> {
        let id = node.id;
        let owner = node.owner;
        self.record_node(id);
        self.state.nodes.insert(node);
        if let Some(store) = owner {
            self.store_mut(store)?.head_nodes.insert(id);
        }
        Ok(id)
    }

    pub(crate) fn remove_node_raw(&mut self, id: NodeId) -> Option<Node> {
        self.record_node(id);
        self.state.nodes.remove(id)
    }

    pub(crate) fn new_node(&mut self, body: NodeBody, owner: Option<StoreId>) -> Node {
        self.state.nodes.new_node(body, owner)
    }

    pub(crate) fn derive_node(&mut self, id: NodeId, owner: Option<StoreId>) -> Result<Node> {
        self.state.nodes.derive(id, owner)
    }

    pub(crate) fn store_mut(&mut self, id: StoreId) -> Result<&mut StoreData> {
        self.record_store(id);
        self.state
            .stores
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(format!("{}", id)))
    }

    pub(crate) fn insert_store(&mut self, store: StoreData) {
        self.record_store(store.id);
        self.record_names();
        self.state.names.insert(store.name.clone(), store.id);
        self.state.stores.insert(store.id, store);
    }

    pub(crate) fn remove_store_raw(&mut self, id: StoreId) -> Option<StoreData> {
        self.record_store(id);
        self.record_names();
        let store = self.state.stores.remove(&id)?;
        self.state.names.remove(&store.name);
        Some(store)
    }

    pub(crate) fn names_mut(&mut self) -> &mut BTreeMap<String, StoreId> {
        self.record_names();
        &mut self.state.names
    }

    fn record_names(&mut self) {
        if self.undo.names.is_none() {
            self.undo.names = Some(self.state.names.clone());
        }
    }

    pub(crate) fn allocate_store_id(&mut self) -> StoreId {
        self.state.allocate_store_id()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished && !self.undo.is_empty() {
            debug!("Transaction dropped without commit, rolling back");
            self.undo();
        }
    }
}
