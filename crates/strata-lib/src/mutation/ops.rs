//! Structural edits against a store's head

use log::debug;

use super::Transaction;
use crate::error::{Result, StoreError};
use crate::node::{
    Entries, FileData, LayeredDirectory, NewNode, NodeBody, NodeDescriptor, NodeId,
};
use crate::path::{validate_name, QualifiedPath, VersionSpec};
use crate::resolve::{Resolved, Step};
use crate::version::StoreId;

impl Transaction<'_> {
    /// Create a node of the given kind as `parent/name`.
    pub fn create_node(
        &mut self,
        parent: &QualifiedPath,
        name: &str,
        new: NewNode,
    ) -> Result<NodeDescriptor> {
        debug!("Transaction::create_node parent={} name={} kind={}", parent, name, new.kind());
        validate_name(name)?;
        let path = parent.join(name)?;
        let resolved = self.resolve_for_write(parent)?;
        let dir = resolved.last().clone();
        let dir_node = self.state().nodes.get(dir.node)?;
        let entries = dir_node
            .entries()
            .ok_or_else(|| StoreError::invalid(format!("{} is not a directory", parent)))?;
        if entries.contains_key(name) {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        let passes_indirection = dir_node
            .layered_dir()
            .map(|d| !d.opaque && dir.indirection.is_some())
            .unwrap_or(false);

        let store_name = self.state().store(resolved.store)?.name.clone();
        let body = match new {
            NewNode::PlainFile => NodeBody::PlainFile(FileData::default()),
            NewNode::PlainDirectory if passes_indirection => {
                NodeBody::LayeredDirectory(LayeredDirectory::non_primary())
            }
            NewNode::PlainDirectory => NodeBody::PlainDirectory(Entries::new()),
            NewNode::LayeredFile { target } => NodeBody::LayeredFile {
                target: qualify(&target, &store_name)?,
            },
            NewNode::LayeredDirectory { target } => NodeBody::LayeredDirectory(
                LayeredDirectory::primary(qualify(&target, &store_name)?),
            ),
        };

        let steps = self.promote(&resolved)?;
        let dir = &steps[steps.len() - 1];
        let node = self.new_node(body, Some(resolved.store));
        let id = self.insert_node(node)?;
        self.link(dir.node, resolved.store, name, id)?;
        self.describe_child(dir, name, id, &path)
    }

    pub fn create_file(&mut self, parent: &QualifiedPath, name: &str) -> Result<NodeDescriptor> {
        self.create_node(parent, name, NewNode::PlainFile)
    }

    /// Inside a non-opaque layered directory the new directory is a
    /// non-primary layered directory, so it keeps merging with whatever the
    /// target holds under the same name.
    pub fn create_directory(
        &mut self,
        parent: &QualifiedPath,
        name: &str,
    ) -> Result<NodeDescriptor> {
        self.create_node(parent, name, NewNode::PlainDirectory)
    }

    pub fn create_layered_file(
        &mut self,
        target: &str,
        parent: &QualifiedPath,
        name: &str,
    ) -> Result<NodeDescriptor> {
        self.create_node(
            parent,
            name,
            NewNode::LayeredFile {
                target: target.to_string(),
            },
        )
    }

    pub fn create_layered_directory(
        &mut self,
        target: &str,
        parent: &QualifiedPath,
        name: &str,
    ) -> Result<NodeDescriptor> {
        self.create_node(
            parent,
            name,
            NewNode::LayeredDirectory {
                target: target.to_string(),
            },
        )
    }

    /// Remove `name` from `parent`. In a layered directory a name still
    /// exposed by the target is whited out.
    pub fn remove_node(&mut self, parent: &QualifiedPath, name: &str) -> Result<()> {
        debug!("Transaction::remove_node parent={} name={}", parent, name);
        let resolved = self.resolve_for_write(parent)?;
        let (has_local, whited_out, layered) = {
            let node = self.state().nodes.get(resolved.last().node)?;
            let entries = node
                .entries()
                .ok_or_else(|| StoreError::invalid(format!("{} is not a directory", parent)))?;
            let layered = node.layered_dir();
            (
                entries.contains_key(name),
                layered.map(|d| d.deleted.contains(name)).unwrap_or(false),
                layered.is_some(),
            )
        };
        let exposed = layered && self.resolver().exposed_by_target(resolved.last(), name)?;
        if !has_local && (!exposed || whited_out) {
            return Err(StoreError::not_found(parent.join(name)?.to_string()));
        }

        let steps = self.promote(&resolved)?;
        let dir = steps[steps.len() - 1].node;
        self.unlink(dir, resolved.store, name, exposed)
    }

    fn unlink(
        &mut self,
        dir: NodeId,
        store: StoreId,
        name: &str,
        whiteout: bool,
    ) -> Result<()> {
        let node = self.node_mut(dir, store)?;
        match &mut node.body {
            NodeBody::PlainDirectory(entries) => {
                entries.remove(name);
            }
            NodeBody::LayeredDirectory(layered) => {
                layered.entries.remove(name);
                if whiteout {
                    layered.deleted.insert(name.to_string());
                }
            }
            _ => return Err(StoreError::invalid(format!("node {} is not a directory", dir))),
        }
        node.touch();
        Ok(())
    }

    /// Move `src_parent/src_name` to `dst_parent/dst_name` within one store.
    pub fn rename(
        &mut self,
        src_parent: &QualifiedPath,
        src_name: &str,
        dst_parent: &QualifiedPath,
        dst_name: &str,
    ) -> Result<()> {
        debug!(
            "Transaction::rename {}/{} -> {}/{}",
            src_parent, src_name, dst_parent, dst_name
        );
        validate_name(dst_name)?;
        if src_parent.store() != dst_parent.store() {
            return Err(StoreError::invalid(format!(
                "cannot rename across stores ({} -> {})",
                src_parent.store(),
                dst_parent.store()
            )));
        }
        let src_path = src_parent.join(src_name)?;
        let dst_path = dst_parent.join(dst_name)?;
        if dst_parent.at_head().starts_with(&src_path.at_head()) {
            return Err(StoreError::invalid(format!(
                "cannot move {} into itself",
                src_path
            )));
        }

        let src = self.resolve_for_write(&src_path)?;
        let dst = self.resolve_for_write(dst_parent)?;
        if !self.state().nodes.get(dst.last().node)?.kind().is_directory() {
            return Err(StoreError::invalid(format!("{} is not a directory", dst_parent)));
        }
        if self.resolver().child(dst.last(), dst_name)?.is_some() {
            return Err(StoreError::AlreadyExists(dst_path.to_string()));
        }

        let moved = self.detach_for_move(&src)?;

        let src_dir = self.resolve_for_write(src_parent)?;
        let exposed = self.state().nodes.get(src_dir.last().node)?.layered_dir().is_some()
            && self.resolver().exposed_by_target(src_dir.last(), src_name)?;
        let steps = self.promote(&src_dir)?;
        self.unlink(steps[steps.len() - 1].node, src.store, src_name, exposed)?;

        let dst = self.resolve_for_write(dst_parent)?;
        let steps = self.promote(&dst)?;
        self.link(steps[steps.len() - 1].node, dst.store, dst_name, moved)
    }

    /// The node to link at a rename destination. Head-owned local nodes move
    /// as they are, frozen ones are shared, anything else is cloned into the
    /// head. A non-primary layered directory keeps its current view by
    /// taking its derived indirection as primary.
    fn detach_for_move(&mut self, src: &Resolved) -> Result<NodeId> {
        let step = src.last();
        let store = src.store;
        let node = self.state().nodes.get(step.node)?;
        let owner = node.owner;
        let non_primary = node.layered_dir().map(|d| !d.is_primary()).unwrap_or(false);
        let fixed = if non_primary { step.indirection.clone() } else { None };

        if step.local && owner == Some(store) {
            if let Some(target) = fixed {
                if let Some(dir) = self.node_mut(step.node, store)?.layered_dir_mut() {
                    dir.indirection = Some(target);
                }
            }
            Ok(step.node)
        } else if owner.is_none() && !non_primary {
            Ok(step.node)
        } else {
            self.clone_tree(step.node, store, Some(step.node), fixed)
        }
    }

    /// Remove a whiteout. Nothing happens if `name` is not whited out.
    pub fn uncover(&mut self, dir: &QualifiedPath, name: &str) -> Result<()> {
        debug!("Transaction::uncover dir={} name={}", dir, name);
        let resolved = self.resolve_for_write(dir)?;
        let whited_out = self
            .layered_at(&resolved)?
            .deleted
            .contains(name);
        if !whited_out {
            debug!("Transaction::uncover {} is not whited out in {}", name, dir);
            return Ok(());
        }
        let node = self.promote_layered(&resolved)?;
        node.deleted.remove(name);
        Ok(())
    }

    pub fn set_opacity(&mut self, path: &QualifiedPath, opaque: bool) -> Result<()> {
        debug!("Transaction::set_opacity path={} opaque={}", path, opaque);
        let resolved = self.resolve_for_write(path)?;
        self.layered_at(&resolved)?;
        self.promote_layered(&resolved)?.opaque = opaque;
        Ok(())
    }

    /// Give a layered directory a new primary indirection.
    pub fn retarget_layered_directory(&mut self, path: &QualifiedPath, target: &str) -> Result<()> {
        debug!("Transaction::retarget path={} target={}", path, target);
        let resolved = self.resolve_for_write(path)?;
        self.layered_at(&resolved)?;
        let target = qualify(target, path.store())?;
        self.promote_layered(&resolved)?.indirection = Some(target);
        Ok(())
    }

    /// Turn the derived indirection of a non-primary layered directory into
    /// a primary one.
    pub fn make_primary(&mut self, path: &QualifiedPath) -> Result<()> {
        debug!("Transaction::make_primary path={}", path);
        let resolved = self.resolve_for_write(path)?;
        if self.layered_at(&resolved)?.is_primary() {
            return Ok(());
        }
        let target = resolved.last().indirection.clone().ok_or_else(|| {
            StoreError::invalid(format!("{} has no indirection to make primary", path))
        })?;
        self.promote_layered(&resolved)?.indirection = Some(target);
        Ok(())
    }

    /// Copy the node at `src_path` (as of `version`) to `dst_parent/name`.
    /// The copy's predecessor is the source node.
    pub fn create_branch(
        &mut self,
        version: VersionSpec,
        src_path: &QualifiedPath,
        dst_parent: &QualifiedPath,
        name: &str,
    ) -> Result<NodeDescriptor> {
        debug!(
            "Transaction::create_branch src={} version={} dst={}/{}",
            src_path, version, dst_parent, name
        );
        validate_name(name)?;
        let path = dst_parent.join(name)?;
        let src = self.resolve(src_path, version)?;
        let dst = self.resolve_for_write(dst_parent)?;
        let dst_node = self.state().nodes.get(dst.last().node)?;
        let entries = dst_node
            .entries()
            .ok_or_else(|| StoreError::invalid(format!("{} is not a directory", dst_parent)))?;
        if entries.contains_key(name) {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }

        let source = src.last().clone();
        let non_primary = self
            .state()
            .nodes
            .get(source.node)?
            .layered_dir()
            .map(|d| !d.is_primary())
            .unwrap_or(false);
        let fixed = if non_primary { source.indirection.clone() } else { None };
        let id = self.clone_tree(source.node, dst.store, Some(source.node), fixed)?;

        let steps = self.promote(&dst)?;
        let dir = &steps[steps.len() - 1];
        self.link(dir.node, dst.store, name, id)?;
        self.describe_child(dir, name, id, &path)
    }

    /// Replace the head node at `path` by a copy of `to_revert_to`. The copy's
    /// predecessor is the node it replaces.
    pub fn revert(&mut self, path: &QualifiedPath, to_revert_to: NodeId) -> Result<NodeDescriptor> {
        debug!("Transaction::revert path={} to={}", path, to_revert_to);
        let resolved = self.resolve_for_write(path)?;
        let previous = resolved.last().node;
        let replacement = self.state().nodes.get(to_revert_to)?;
        let store = resolved.store;

        match resolved.parent() {
            None => {
                if !replacement.kind().is_directory() {
                    return Err(StoreError::invalid(format!(
                        "cannot revert root of {} to non-directory {}",
                        path.store(),
                        to_revert_to
                    )));
                }
                let id = self.clone_tree(to_revert_to, store, Some(previous), None)?;
                self.store_mut(store)?.head_root = id;
                let root = self.resolver().root_step(resolved.last().ctx)?;
                self.resolver().describe(&root, path, VersionSpec::Head)
            }
            Some(parent) => {
                let name = path
                    .name()
                    .ok_or_else(|| StoreError::invalid(format!("{} has no name", path)))?;
                let id = self.clone_tree(to_revert_to, store, Some(previous), None)?;
                let steps = self.promote(&parent)?;
                let dir = &steps[steps.len() - 1];
                self.link(dir.node, store, name, id)?;
                self.describe_child(dir, name, id, path)
            }
        }
    }

    fn layered_at(&self, resolved: &Resolved) -> Result<&LayeredDirectory> {
        self.state()
            .nodes
            .get(resolved.last().node)?
            .layered_dir()
            .ok_or_else(|| {
                StoreError::invalid(format!("{} is not a layered directory", resolved.path))
            })
    }

    /// Promote the path and hand back the layered directory at its end.
    fn promote_layered(&mut self, resolved: &Resolved) -> Result<&mut LayeredDirectory> {
        let steps = self.promote(resolved)?;
        let id = steps[steps.len() - 1].node;
        let node = self.node_mut(id, resolved.store)?;
        node.touch();
        node.layered_dir_mut()
            .ok_or_else(|| StoreError::invalid(format!("{} is not a layered directory", id)))
    }

    pub(crate) fn describe_child(
        &self,
        dir: &Step,
        name: &str,
        id: NodeId,
        path: &QualifiedPath,
    ) -> Result<NodeDescriptor> {
        let resolver = self.resolver();
        let step = resolver.local_step(dir, name, id)?;
        resolver.describe(&step, path, VersionSpec::Head)
    }
}

/// Qualify a relative indirection target with `store`.
fn qualify(target: &str, store: &str) -> Result<String> {
    Ok(QualifiedPath::parse_relative(target, store)?.to_string())
}
