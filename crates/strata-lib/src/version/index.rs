//! Store lifecycle, snapshots and purging

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use log::{debug, info};

use super::{StoreData, StoreDescriptor, StoreId, Version};
use crate::error::{Result, StoreError};
use crate::gc::GcStats;
use crate::mutation::Transaction;
use crate::node::{Entries, NodeBody, PropertyValue, QName};
use crate::path::{validate_store_name, QualifiedPath};
use crate::repository::state::RepoState;
use crate::resolve::own_indirection;

impl Transaction<'_> {
    /// Create an empty store. The empty root is committed as version 0.
    pub fn create_store(&mut self, name: &str) -> Result<StoreDescriptor> {
        validate_store_name(name)?;
        if self.state().names.contains_key(name) {
            return Err(StoreError::AlreadyExists(format!("store {}", name)));
        }
        let id = self.allocate_store_id();
        let root = self.new_node(NodeBody::PlainDirectory(Entries::new()), None);
        let root_id = root.id;
        self.insert_node(root)?;

        let now = Utc::now();
        let creator = self.config().default_creator.clone();
        let store = StoreData {
            id,
            name: name.to_string(),
            creator: creator.clone(),
            created: now,
            properties: BTreeMap::new(),
            head_root: root_id,
            head_nodes: BTreeSet::new(),
            versions: vec![Some(Version {
                id: 0,
                root: root_id,
                created: now,
                creator,
                label: None,
                comment: None,
                pins: BTreeMap::new(),
            })],
        };
        let descriptor = store.descriptor();
        self.insert_store(store);
        info!("Created store {}", name);
        Ok(descriptor)
    }

    /// Freeze the head of `store` into a new version and return its id.
    ///
    /// Layers that read another store's head without naming a version are
    /// pinned: that store is snapshotted too (unless its head is unchanged
    /// since its latest version) and the new version records which version
    /// it saw.
    pub fn create_snapshot(
        &mut self,
        store: &str,
        label: Option<&str>,
        comment: Option<&str>,
    ) -> Result<u32> {
        let store_id = self.state().store_id(store)?;
        self.snapshot_store(store_id, label, comment, &mut BTreeMap::new())
    }

    fn snapshot_store(
        &mut self,
        store_id: StoreId,
        label: Option<&str>,
        comment: Option<&str>,
        pinned: &mut BTreeMap<StoreId, u32>,
    ) -> Result<u32> {
        let id = self.state().store(store_id)?.next_version_id();
        pinned.insert(store_id, id);

        let mut pins = BTreeMap::new();
        for dep in layer_dependencies(self.state(), store_id)? {
            let known = pinned.get(&dep).copied();
            let version = match known {
                Some(version) => version,
                None => match unchanged_head(self.state(), dep, &mut BTreeSet::new())? {
                    Some(latest) => latest,
                    None => self.snapshot_store(dep, None, None, pinned)?,
                },
            };
            pins.insert(dep, version);
        }

        let head_nodes: Vec<_> = self.state().store(store_id)?.head_nodes.iter().copied().collect();
        for node in &head_nodes {
            self.node_mut(*node, store_id)?.owner = None;
        }

        let creator = self.config().default_creator.clone();
        let data = self.store_mut(store_id)?;
        let root = data.head_root;
        data.head_nodes.clear();
        data.versions.push(Some(Version {
            id,
            root,
            created: Utc::now(),
            creator,
            label: label.map(str::to_string),
            comment: comment.map(str::to_string),
            pins,
        }));
        info!(
            "Snapshot {} of store {} ({} nodes frozen)",
            id,
            data.name,
            head_nodes.len()
        );
        Ok(id)
    }

    /// Drop a committed version and collect what it alone kept alive.
    pub fn purge_version(&mut self, store: &str, version: u32) -> Result<GcStats> {
        let store_id = self.state().store_id(store)?;
        let data = self.state().store(store_id)?;
        if version == data.next_version_id() {
            return Err(StoreError::PurgeActiveVersion {
                store: store.to_string(),
                version,
                reason: "it is the head version",
            });
        }
        if data.version(version).is_none() {
            return Err(StoreError::not_found(format!(
                "version {} of store {}",
                version, store
            )));
        }
        if data.live_versions().count() == 1 {
            return Err(StoreError::PurgeActiveVersion {
                store: store.to_string(),
                version,
                reason: "it is the only remaining version",
            });
        }

        self.store_mut(store_id)?.versions[version as usize] = None;
        info!("Purged version {} of store {}", version, store);
        self.collect_garbage()
    }

    /// Remove a store with all its versions.
    pub fn purge_store(&mut self, store: &str) -> Result<GcStats> {
        let store_id = self.state().store_id(store)?;
        self.remove_store_raw(store_id);
        info!("Purged store {}", store);
        self.collect_garbage()
    }

    /// Give a store a new name. Indirection targets naming the old store are
    /// left as they are.
    pub fn rename_store(&mut self, from: &str, to: &str) -> Result<()> {
        validate_store_name(to)?;
        let store_id = self.state().store_id(from)?;
        if self.state().names.contains_key(to) {
            return Err(StoreError::AlreadyExists(format!("store {}", to)));
        }
        let names = self.names_mut();
        names.remove(from);
        names.insert(to.to_string(), store_id);
        self.store_mut(store_id)?.name = to.to_string();
        info!("Renamed store {} to {}", from, to);
        Ok(())
    }

    pub fn set_store_property(
        &mut self,
        store: &str,
        name: QName,
        value: PropertyValue,
    ) -> Result<()> {
        debug!("Transaction::set_store_property store={} name={}", store, name);
        self.validator().validate_property(&name, &value)?;
        let store_id = self.state().store_id(store)?;
        self.store_mut(store_id)?.properties.insert(name, value);
        Ok(())
    }

    pub fn set_store_properties(
        &mut self,
        store: &str,
        properties: BTreeMap<QName, PropertyValue>,
    ) -> Result<()> {
        debug!(
            "Transaction::set_store_properties store={} count={}",
            store,
            properties.len()
        );
        for (name, value) in &properties {
            self.validator().validate_property(name, value)?;
        }
        let store_id = self.state().store_id(store)?;
        self.store_mut(store_id)?.properties.extend(properties);
        Ok(())
    }

    pub fn delete_store_property(&mut self, store: &str, name: &QName) -> Result<()> {
        debug!("Transaction::delete_store_property store={} name={}", store, name);
        let store_id = self.state().store_id(store)?;
        if self.store_mut(store_id)?.properties.remove(name).is_none() {
            return Err(StoreError::not_found(format!(
                "property {} of store {}",
                name, store
            )));
        }
        Ok(())
    }
}

/// Other stores the head of `store` reads through layers that name no
/// version. Dangling and malformed targets are skipped.
fn layer_dependencies(state: &RepoState, store: StoreId) -> Result<BTreeSet<StoreId>> {
    let mut deps = BTreeSet::new();
    let mut seen = BTreeSet::new();
    let mut queue = vec![state.store(store)?.head_root];
    while let Some(id) = queue.pop() {
        if !seen.insert(id) {
            continue;
        }
        let Ok(node) = state.nodes.get(id) else {
            continue;
        };
        if let Some(target) = own_indirection(node) {
            if let Ok(path) = QualifiedPath::parse(&target) {
                match state.names.get(path.store()) {
                    Some(&dep) if dep != store && path.version().is_none() => {
                        deps.insert(dep);
                    }
                    _ => {}
                }
            }
        }
        if let Some(entries) = node.entries() {
            queue.extend(entries.values().copied());
        }
    }
    Ok(deps)
}

/// The latest version of `store` if its head still equals it, including
/// everything its layers read through.
fn unchanged_head(
    state: &RepoState,
    store: StoreId,
    visiting: &mut BTreeSet<StoreId>,
) -> Result<Option<u32>> {
    let data = state.store(store)?;
    let Some(latest) = data.live_versions().next_back() else {
        return Ok(None);
    };
    if !data.head_nodes.is_empty() || latest.root != data.head_root {
        return Ok(None);
    }
    if !visiting.insert(store) {
        return Ok(Some(latest.id));
    }
    for dep in layer_dependencies(state, store)? {
        let current = unchanged_head(state, dep, visiting)?;
        if current.is_none() || current != latest.pins.get(&dep).copied() {
            debug!("Store {} reads through a changed store {}", data.name, dep);
            return Ok(None);
        }
    }
    Ok(Some(latest.id))
}
