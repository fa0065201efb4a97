//! Path resolution through plain and layered directories
//!
//! A lookup walks the path one segment at a time from the root of the
//! requested version. Plain directories answer from their local entries.
//! Layered directories answer from their local entries first, then from
//! their whiteouts (a hit means "gone"), and finally by following their
//! indirection target and asking the directory found there.
//!
//! Every time resolution follows an indirection it records the
//! `(target, store, version, name)` it is chasing. Seeing the same key twice
//! on the current chain means the layering loops; the chain length is also
//! capped, so a pathological but acyclic chain fails instead of recursing
//! forever.
//!
//! A committed version reads another store through the version it pinned
//! when it was snapshotted, so its view never changes afterwards.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::error::{Result, StoreError};
use crate::node::{FileData, Node, NodeBody, NodeDescriptor, NodeId};
use crate::path::{join_target, QualifiedPath, VersionSpec};
use crate::repository::state::RepoState;
use crate::version::StoreId;

/// Store and version a node was reached in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ctx {
    pub store: StoreId,
    pub version: VersionSpec,
}

/// One resolved path component.
#[derive(Debug, Clone)]
pub struct Step {
    /// Entry name; empty for a root.
    pub name: String,
    pub node: NodeId,
    /// Found in the local entries of the previous step rather than through
    /// an indirection target.
    pub local: bool,
    /// Effective indirection of a layered node.
    pub indirection: Option<String>,
    pub ctx: Ctx,
}

/// A fully resolved path.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub path: QualifiedPath,
    pub store: StoreId,
    pub version: VersionSpec,
    pub steps: Vec<Step>,
}

impl Resolved {
    pub fn last(&self) -> &Step {
        // resolve_steps always yields at least the root
        &self.steps[self.steps.len() - 1]
    }

    /// The resolution of the parent directory, `None` for a root.
    pub fn parent(&self) -> Option<Resolved> {
        let (parent_path, _) = self.path.split_last()?;
        Some(Resolved {
            path: parent_path,
            store: self.store,
            version: self.version,
            steps: self.steps[..self.steps.len() - 1].to_vec(),
        })
    }

    /// Whether any step on the path was reached through an indirection.
    pub fn background(&self) -> bool {
        self.steps.iter().any(|s| !s.local)
    }
}

type WalkKey = (String, StoreId, VersionSpec, String);

pub struct Resolver<'a> {
    state: &'a RepoState,
    visiting: Vec<WalkKey>,
    max_depth: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(state: &'a RepoState, max_depth: usize) -> Self {
        Self {
            state,
            visiting: Vec::new(),
            max_depth,
        }
    }

    /// Combine an explicit `@version` in the path with the version asked
    /// for by the caller.
    pub fn version_for(path: &QualifiedPath, version: VersionSpec) -> Result<VersionSpec> {
        match (path.version(), version) {
            (None, v) => Ok(v),
            (Some(p), VersionSpec::Head) => Ok(VersionSpec::Version(p)),
            (Some(p), VersionSpec::Version(v)) if p == v => Ok(version),
            (Some(p), VersionSpec::Version(v)) => Err(StoreError::invalid(format!(
                "path {} names version {} but version {} was requested",
                path, p, v
            ))),
        }
    }

    /// Resolve a qualified path.
    pub fn resolve(&mut self, path: &QualifiedPath, version: VersionSpec) -> Result<Resolved> {
        let version = Self::version_for(path, version)?;
        let store = self.state.store_id(path.store())?;
        let steps = self.resolve_steps(path, Ctx { store, version })?;
        Ok(Resolved {
            path: path.clone(),
            store,
            version,
            steps,
        })
    }

    pub fn root_step(&self, ctx: Ctx) -> Result<Step> {
        let root = self.state.store(ctx.store)?.root_at(ctx.version)?;
        let node = self.state.nodes.get(root)?;
        Ok(Step {
            name: String::new(),
            node: root,
            local: true,
            indirection: own_indirection(node),
            ctx,
        })
    }

    fn resolve_steps(&mut self, path: &QualifiedPath, ctx: Ctx) -> Result<Vec<Step>> {
        let mut steps = vec![self.root_step(ctx)?];
        for (i, segment) in path.segments().iter().enumerate() {
            match self.child(&steps[i], segment)? {
                Some(step) => steps.push(step),
                None => {
                    let mut missing = QualifiedPath::root(path.store())?;
                    for s in &path.segments()[..=i] {
                        missing = missing.join(s)?;
                    }
                    return Err(StoreError::not_found(format!(
                        "{} (version {})",
                        missing, ctx.version
                    )));
                }
            }
        }
        Ok(steps)
    }

    /// Look `name` up in the directory at `parent`.
    pub fn child(&mut self, parent: &Step, name: &str) -> Result<Option<Step>> {
        let state = self.state;
        let node = state.nodes.get(parent.node)?;
        match &node.body {
            NodeBody::PlainDirectory(entries) => match entries.get(name) {
                Some(&id) => Ok(Some(self.local_step(parent, name, id)?)),
                None => Ok(None),
            },
            NodeBody::LayeredDirectory(dir) => {
                if let Some(&id) = dir.entries.get(name) {
                    return Ok(Some(self.local_step(parent, name, id)?));
                }
                if dir.deleted.contains(name) {
                    return Ok(None);
                }
                match &parent.indirection {
                    Some(target) => self.through(target, parent.ctx, name),
                    None => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }

    pub(crate) fn local_step(&self, parent: &Step, name: &str, id: NodeId) -> Result<Step> {
        let parent_node = self.state.nodes.get(parent.node)?;
        let child = self.state.nodes.get(id)?;
        let indirection = match &child.body {
            NodeBody::LayeredDirectory(dir) if dir.indirection.is_none() => {
                inherited_indirection(parent_node, parent, name)?
            }
            _ => own_indirection(child),
        };
        Ok(Step {
            name: name.to_string(),
            node: id,
            local: true,
            indirection,
            ctx: parent.ctx,
        })
    }

    /// Whether the indirection of the layered directory at `dir` exposes
    /// `name`, ignoring its local entries and whiteouts.
    pub(crate) fn exposed_by_target(&mut self, dir: &Step, name: &str) -> Result<bool> {
        match &dir.indirection {
            Some(target) => Ok(self.through(target, dir.ctx, name)?.is_some()),
            None => Ok(false),
        }
    }

    /// Look `name` up inside the directory an indirection points at.
    fn through(&mut self, target: &str, from: Ctx, name: &str) -> Result<Option<Step>> {
        let Some((target_path, ctx)) = self.target_context(target, from)? else {
            return Ok(None);
        };
        self.enter(target, ctx, name)?;
        let result = self.through_inner(&target_path, ctx, name);
        self.leave();
        result
    }

    fn through_inner(
        &mut self,
        target_path: &QualifiedPath,
        ctx: Ctx,
        name: &str,
    ) -> Result<Option<Step>> {
        let steps = match self.resolve_steps(target_path, ctx) {
            Ok(steps) => steps,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let dir = &steps[steps.len() - 1];
        Ok(self
            .child(dir, name)?
            .map(|step| Step { local: false, ..step }))
    }

    /// Where an indirection target lives: its store and the version it is
    /// read at when seen from `from`. `None` if the store, or the version
    /// pinned for it, no longer exists.
    fn target_context(&self, target: &str, from: Ctx) -> Result<Option<(QualifiedPath, Ctx)>> {
        let target_path = QualifiedPath::parse(target)?;
        let Some(&store) = self.state.names.get(target_path.store()) else {
            debug!("Indirection target {} names a missing store", target);
            return Ok(None);
        };
        let version = match target_path.version() {
            Some(v) => VersionSpec::Version(v),
            None if store == from.store => from.version,
            None => match from.version {
                VersionSpec::Head => VersionSpec::Head,
                VersionSpec::Version(v) => {
                    let pin = self
                        .state
                        .store(from.store)?
                        .version(v)
                        .and_then(|version| version.pins.get(&store).copied());
                    let target_store = self.state.store(store)?;
                    match pin {
                        Some(pin) if target_store.version(pin).is_some() => {
                            VersionSpec::Version(pin)
                        }
                        Some(pin) => {
                            debug!("Indirection target {} pinned at purged version {}", target, pin);
                            return Ok(None);
                        }
                        // No pin: an older state file, or the name now means another store.
                        None => target_store
                            .latest_snapshot_id()
                            .map(VersionSpec::Version)
                            .unwrap_or(VersionSpec::Head),
                    }
                }
            },
        };
        Ok(Some((target_path, Ctx { store, version })))
    }

    fn enter(&mut self, target: &str, ctx: Ctx, name: &str) -> Result<()> {
        let key = (target.to_string(), ctx.store, ctx.version, name.to_string());
        if self.visiting.contains(&key) {
            return Err(StoreError::LayeringCycle(format!(
                "{} (version {})",
                target, ctx.version
            )));
        }
        if self.visiting.len() >= self.max_depth {
            return Err(StoreError::IndirectionTooDeep {
                path: target.to_string(),
                limit: self.max_depth,
            });
        }
        self.visiting.push(key);
        Ok(())
    }

    fn leave(&mut self) {
        self.visiting.pop();
    }

    /// Merged listing: local entries over the target's listing minus
    /// whiteouts.
    pub fn listing(&mut self, dir: &Step) -> Result<BTreeMap<String, Step>> {
        let state = self.state;
        let node = state.nodes.get(dir.node)?;
        match &node.body {
            NodeBody::PlainDirectory(_) => self.direct_listing(dir),
            NodeBody::LayeredDirectory(layered) => {
                let mut out = BTreeMap::new();
                if let Some(target) = &dir.indirection {
                    for (name, step) in self.target_listing(target, dir.ctx)? {
                        if !layered.deleted.contains(&name) {
                            out.insert(name, Step { local: false, ..step });
                        }
                    }
                }
                out.extend(self.direct_listing(dir)?);
                Ok(out)
            }
            _ => Err(not_a_directory(node)),
        }
    }

    /// Local entries only.
    pub fn direct_listing(&self, dir: &Step) -> Result<BTreeMap<String, Step>> {
        let node = self.state.nodes.get(dir.node)?;
        let entries = node.entries().ok_or_else(|| not_a_directory(node))?;
        entries
            .iter()
            .map(|(name, &id)| Ok((name.clone(), self.local_step(dir, name, id)?)))
            .collect()
    }

    fn target_listing(&mut self, target: &str, from: Ctx) -> Result<BTreeMap<String, Step>> {
        let Some((target_path, ctx)) = self.target_context(target, from)? else {
            warn!("Skipping dangling indirection {} in listing", target);
            return Ok(BTreeMap::new());
        };
        self.enter(target, ctx, "")?;
        let result = self.target_listing_inner(&target_path, ctx);
        self.leave();
        result
    }

    fn target_listing_inner(
        &mut self,
        target_path: &QualifiedPath,
        ctx: Ctx,
    ) -> Result<BTreeMap<String, Step>> {
        let steps = match self.resolve_steps(target_path, ctx) {
            Ok(steps) => steps,
            Err(e) if e.is_not_found() => {
                warn!("Skipping dangling indirection {} in listing", target_path);
                return Ok(BTreeMap::new());
            }
            Err(e) => return Err(e),
        };
        let dir = &steps[steps.len() - 1];
        if !self.state.nodes.get(dir.node)?.kind().is_directory() {
            return Ok(BTreeMap::new());
        }
        self.listing(dir)
    }

    /// File payload at a step, following layered files to their target.
    pub fn file_data(&mut self, step: &Step) -> Result<FileData> {
        let state = self.state;
        let node = state.nodes.get(step.node)?;
        match &node.body {
            NodeBody::PlainFile(data) => Ok(data.clone()),
            NodeBody::LayeredFile { target } => {
                let Some((target_path, ctx)) = self.target_context(target, step.ctx)? else {
                    return Err(StoreError::not_found(format!("layered file target {}", target)));
                };
                self.enter(target, ctx, "")?;
                let result = self
                    .resolve_steps(&target_path, ctx)
                    .and_then(|steps| self.file_data(&steps[steps.len() - 1]));
                self.leave();
                result
            }
            _ => Err(StoreError::invalid(format!("node {} is not a file", node.id))),
        }
    }

    /// Descriptor for a step reached as `path` in `version`.
    pub fn describe(
        &self,
        step: &Step,
        path: &QualifiedPath,
        version: VersionSpec,
    ) -> Result<NodeDescriptor> {
        let node = self.state.nodes.get(step.node)?;
        let name = path.name().map(str::to_string);
        Ok(NodeDescriptor::from_node(node, step.indirection.clone()).at(
            path.to_string(),
            version,
            name,
        ))
    }

    /// Some `(version, path)` under which `id` is reachable through local
    /// entries, searching every store head first, then committed versions
    /// newest first.
    pub fn find_path(&self, id: NodeId) -> Result<Option<(VersionSpec, QualifiedPath)>> {
        for store in self.state.stores.values() {
            let mut roots = vec![(VersionSpec::Head, store.head_root)];
            roots.extend(
                store
                    .live_versions()
                    .rev()
                    .map(|v| (VersionSpec::Version(v.id), v.root)),
            );
            for (version, root) in roots {
                let base = QualifiedPath::root(&store.name)?;
                if let Some(found) = self.search(root, id, base)? {
                    let found = match version {
                        VersionSpec::Head => found,
                        VersionSpec::Version(v) => found.at_version(v),
                    };
                    return Ok(Some((version, found)));
                }
            }
        }
        Ok(None)
    }

    fn search(&self, at: NodeId, id: NodeId, path: QualifiedPath) -> Result<Option<QualifiedPath>> {
        if at == id {
            return Ok(Some(path));
        }
        let Ok(node) = self.state.nodes.get(at) else {
            return Ok(None);
        };
        if let Some(entries) = node.entries() {
            for (name, &child) in entries {
                if let Some(found) = self.search(child, id, path.join(name)?)? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }
}

/// Indirection a node carries itself.
pub fn own_indirection(node: &Node) -> Option<String> {
    match &node.body {
        NodeBody::LayeredDirectory(dir) => dir.indirection.clone(),
        NodeBody::LayeredFile { target } => Some(target.clone()),
        _ => None,
    }
}

/// Derived indirection of a non-primary layered directory named `name`
/// inside `parent`. Opaque parents pass nothing down.
fn inherited_indirection(parent_node: &Node, parent: &Step, name: &str) -> Result<Option<String>> {
    match (&parent_node.body, &parent.indirection) {
        (NodeBody::LayeredDirectory(dir), Some(target)) if !dir.opaque => {
            Ok(Some(join_target(target, name)?))
        }
        _ => Ok(None),
    }
}

fn not_a_directory(node: &Node) -> StoreError {
    StoreError::invalid(format!("node {} is not a directory", node.id))
}
