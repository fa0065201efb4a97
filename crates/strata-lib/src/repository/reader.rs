//! Read-only operations
//!
//! A [`Reader`] borrows the repository state, either under the shared lock
//! taken by [`super::Repository`] or from inside a [`crate::Transaction`],
//! where it sees the transaction's uncommitted changes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::RepoState;
use crate::ancestry;
use crate::content::ContentRef;
use crate::error::{Result, StoreError};
use crate::node::{NodeDescriptor, NodeId, PropertyValue, QName};
use crate::path::{QualifiedPath, VersionSpec};
use crate::resolve::{own_indirection, Resolved, Resolver, Step};
use crate::version::{like_match, StoreDescriptor, VersionDescriptor};

/// How a path relates to layering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayeringInfo {
    /// Reached through an indirection rather than through local entries.
    pub background: bool,
    /// Store named by the path.
    pub path_store: String,
    /// Store the node was actually found in.
    pub native_store: String,
}

pub struct Reader<'a> {
    state: &'a RepoState,
    max_depth: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(state: &'a RepoState, max_depth: usize) -> Self {
        Self { state, max_depth }
    }

    fn resolver(&self) -> Resolver<'a> {
        Resolver::new(self.state, self.max_depth)
    }

    fn resolve(&self, version: VersionSpec, path: &QualifiedPath) -> Result<Resolved> {
        self.resolver().resolve(path, version)
    }

    fn describe(&self, resolved: &Resolved) -> Result<NodeDescriptor> {
        self.resolver()
            .describe(resolved.last(), &resolved.path, resolved.version)
    }

    pub fn lookup(&self, version: VersionSpec, path: &QualifiedPath) -> Result<NodeDescriptor> {
        let resolved = self.resolve(version, path)?;
        self.describe(&resolved)
    }

    /// Look up `name` in a directory described earlier.
    pub fn lookup_child(&self, dir: &NodeDescriptor, name: &str) -> Result<NodeDescriptor> {
        let (path, version) = located(dir)?;
        self.lookup(version, &path.join(name)?)
    }

    /// Describe a node by id. Without a path the effective indirection of
    /// a non-primary layered directory is unknown.
    pub fn get_node(&self, id: NodeId) -> Result<NodeDescriptor> {
        let node = self.state.nodes.get(id)?;
        Ok(NodeDescriptor::from_node(node, own_indirection(node)))
    }

    pub fn get_directory_listing(
        &self,
        version: VersionSpec,
        path: &QualifiedPath,
    ) -> Result<BTreeMap<String, NodeDescriptor>> {
        let resolved = self.resolve(version, path)?;
        let mut resolver = self.resolver();
        let listing = resolver.listing(resolved.last())?;
        self.describe_listing(&resolver, &resolved, listing)
    }

    /// Local entries only, ignoring any indirection.
    pub fn get_directory_listing_direct(
        &self,
        version: VersionSpec,
        path: &QualifiedPath,
    ) -> Result<BTreeMap<String, NodeDescriptor>> {
        let resolved = self.resolve(version, path)?;
        let resolver = self.resolver();
        let listing = resolver.direct_listing(resolved.last())?;
        self.describe_listing(&resolver, &resolved, listing)
    }

    pub fn get_directory_listing_of(
        &self,
        dir: &NodeDescriptor,
    ) -> Result<BTreeMap<String, NodeDescriptor>> {
        let (path, version) = located(dir)?;
        self.get_directory_listing(version, &path)
    }

    fn describe_listing(
        &self,
        resolver: &Resolver<'_>,
        dir: &Resolved,
        listing: BTreeMap<String, Step>,
    ) -> Result<BTreeMap<String, NodeDescriptor>> {
        listing
            .into_iter()
            .map(|(name, step)| {
                let path = dir.path.join(&name)?;
                let desc = resolver.describe(&step, &path, dir.version)?;
                Ok((name, desc))
            })
            .collect()
    }

    /// Whiteouts of a layered directory; empty for plain directories.
    pub fn get_deleted(&self, version: VersionSpec, path: &QualifiedPath) -> Result<Vec<String>> {
        let resolved = self.resolve(version, path)?;
        let node = self.state.nodes.get(resolved.last().node)?;
        if !node.kind().is_directory() {
            return Err(StoreError::invalid(format!("{} is not a directory", path)));
        }
        Ok(node
            .layered_dir()
            .map(|d| d.deleted.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Effective indirection of a layered node, not followed.
    pub fn get_indirection_path(&self, version: VersionSpec, path: &QualifiedPath) -> Result<String> {
        let resolved = self.resolve(version, path)?;
        if !self.state.nodes.get(resolved.last().node)?.kind().is_layered() {
            return Err(StoreError::invalid(format!("{} is not layered", path)));
        }
        resolved
            .last()
            .indirection
            .clone()
            .ok_or_else(|| StoreError::invalid(format!("{} has no effective indirection", path)))
    }

    pub fn get_layering_info(&self, version: VersionSpec, path: &QualifiedPath) -> Result<LayeringInfo> {
        let resolved = self.resolve(version, path)?;
        let native = self.state.store(resolved.last().ctx.store)?;
        Ok(LayeringInfo {
            background: resolved.background(),
            path_store: path.store().to_string(),
            native_store: native.name.clone(),
        })
    }

    /// Some version and path under which `id` is reachable.
    pub fn get_a_path(&self, id: NodeId) -> Result<Option<(VersionSpec, QualifiedPath)>> {
        self.state.nodes.get(id)?;
        self.resolver().find_path(id)
    }

    /// Content of a file, following layered files.
    pub fn get_content_ref(
        &self,
        version: VersionSpec,
        path: &QualifiedPath,
    ) -> Result<Option<ContentRef>> {
        let resolved = self.resolve(version, path)?;
        Ok(self.resolver().file_data(resolved.last())?.content)
    }

    pub fn get_node_property(
        &self,
        version: VersionSpec,
        path: &QualifiedPath,
        name: &QName,
    ) -> Result<Option<PropertyValue>> {
        let resolved = self.resolve(version, path)?;
        Ok(self
            .state
            .nodes
            .get(resolved.last().node)?
            .properties
            .get(name)
            .cloned())
    }

    pub fn get_node_properties(
        &self,
        version: VersionSpec,
        path: &QualifiedPath,
    ) -> Result<BTreeMap<QName, PropertyValue>> {
        let resolved = self.resolve(version, path)?;
        Ok(self.state.nodes.get(resolved.last().node)?.properties.clone())
    }

    pub fn has_aspect(&self, version: VersionSpec, path: &QualifiedPath, aspect: &QName) -> Result<bool> {
        let resolved = self.resolve(version, path)?;
        Ok(self
            .state
            .nodes
            .get(resolved.last().node)?
            .aspects
            .contains(aspect))
    }

    pub fn get_aspects(&self, version: VersionSpec, path: &QualifiedPath) -> Result<Vec<QName>> {
        let resolved = self.resolve(version, path)?;
        Ok(self
            .state
            .nodes
            .get(resolved.last().node)?
            .aspects
            .iter()
            .cloned()
            .collect())
    }

    pub fn get_stores(&self) -> Vec<StoreDescriptor> {
        self.state.stores.values().map(|s| s.descriptor()).collect()
    }

    pub fn get_store(&self, name: &str) -> Result<StoreDescriptor> {
        Ok(self.state.store_by_name(name)?.descriptor())
    }

    pub fn get_store_root(&self, version: VersionSpec, name: &str) -> Result<NodeDescriptor> {
        self.lookup(version, &QualifiedPath::root(name)?)
    }

    pub fn get_store_versions(&self, store: &str) -> Result<Vec<VersionDescriptor>> {
        let data = self.state.store_by_name(store)?;
        Ok(data
            .live_versions()
            .map(|v| VersionDescriptor::new(&data.name, v))
            .collect())
    }

    /// Versions created within `from..=to`; either bound may be open.
    pub fn get_store_versions_between(
        &self,
        store: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<VersionDescriptor>> {
        let data = self.state.store_by_name(store)?;
        Ok(data
            .live_versions()
            .filter(|v| from.map_or(true, |f| v.created >= f))
            .filter(|v| to.map_or(true, |t| v.created <= t))
            .map(|v| VersionDescriptor::new(&data.name, v))
            .collect())
    }

    pub fn get_latest_snapshot_id(&self, store: &str) -> Result<Option<u32>> {
        Ok(self.state.store_by_name(store)?.latest_snapshot_id())
    }

    pub fn get_next_version_id(&self, store: &str) -> Result<u32> {
        Ok(self.state.store_by_name(store)?.next_version_id())
    }

    pub fn get_store_property(&self, store: &str, name: &QName) -> Result<Option<PropertyValue>> {
        Ok(self.state.store_by_name(store)?.properties.get(name).cloned())
    }

    pub fn get_store_properties(&self, store: &str) -> Result<BTreeMap<QName, PropertyValue>> {
        Ok(self.state.store_by_name(store)?.properties.clone())
    }

    /// Store properties whose key matches a SQL `LIKE` pattern.
    pub fn query_store_property_key(
        &self,
        store: &str,
        pattern: &str,
    ) -> Result<BTreeMap<QName, PropertyValue>> {
        Ok(self
            .state
            .store_by_name(store)?
            .properties
            .iter()
            .filter(|(k, _)| like_match(pattern, k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Matching store properties across every store, keyed by store name.
    /// Stores without a match are left out.
    pub fn query_stores_property_key(
        &self,
        pattern: &str,
    ) -> BTreeMap<String, BTreeMap<QName, PropertyValue>> {
        self.state
            .stores
            .values()
            .filter_map(|s| {
                let found: BTreeMap<_, _> = s
                    .properties
                    .iter()
                    .filter(|(k, _)| like_match(pattern, k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                (!found.is_empty()).then(|| (s.name.clone(), found))
            })
            .collect()
    }

    pub fn get_common_ancestor(&self, left: NodeId, right: NodeId) -> Result<Option<NodeDescriptor>> {
        ancestry::common_ancestor(&self.state.nodes, left, right)?
            .map(|id| self.get_node(id))
            .transpose()
    }

    pub fn get_history(&self, id: NodeId, count: usize) -> Result<Vec<NodeDescriptor>> {
        ancestry::history(&self.state.nodes, id, count)?
            .into_iter()
            .map(|id| self.get_node(id))
            .collect()
    }
}

/// Path and version a descriptor was resolved under.
fn located(desc: &NodeDescriptor) -> Result<(QualifiedPath, VersionSpec)> {
    let path = desc
        .path
        .as_deref()
        .ok_or_else(|| StoreError::invalid(format!("descriptor of {} carries no path", desc.id)))?;
    let path = QualifiedPath::parse(path)?;
    let version = desc.version.unwrap_or(VersionSpec::Head);
    Ok((path, version))
}
