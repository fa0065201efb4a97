//! Copy-on-write promotion
//!
//! Before anything on a path is changed, every node on that path has to
//! belong to the head of the store being edited. [`Transaction::promote`]
//! walks a resolved path from the root and:
//!
//! - keeps nodes the head already owns,
//! - replaces frozen or foreign local nodes by a derived copy whose
//!   predecessor is the original,
//! - materializes nodes that were only visible through an indirection as
//!   local overrides (directories become layered directories that keep
//!   pointing at what they override).
//!
//! Parents are rewritten to point at the new copies as the walk goes down.

use log::debug;

use super::Transaction;
use crate::error::{Result, StoreError};
use crate::node::{LayeredDirectory, NodeBody, NodeId};
use crate::path::join_target;
use crate::resolve::{Resolved, Step};
use crate::version::StoreId;

impl Transaction<'_> {
    /// Make every node on `resolved` head-owned. Returns the promoted
    /// steps, all local.
    pub(crate) fn promote(&mut self, resolved: &Resolved) -> Result<Vec<Step>> {
        if !resolved.version.is_head() {
            return Err(StoreError::ImmutableVersion(format!(
                "{} (version {})",
                resolved.path, resolved.version
            )));
        }
        let store = resolved.store;
        let mut promoted = Vec::with_capacity(resolved.steps.len());

        let root = &resolved.steps[0];
        let root_id = if self.state().nodes.get(root.node)?.owner == Some(store) {
            root.node
        } else {
            let copy = self.derive_node(root.node, Some(store))?;
            let id = self.insert_node(copy)?;
            self.store_mut(store)?.head_root = id;
            debug!("Transaction::promote root {} -> {}", root.node, id);
            id
        };
        promoted.push(Step {
            node: root_id,
            ..root.clone()
        });

        for original in &resolved.steps[1..] {
            let parent = promoted[promoted.len() - 1].clone();
            let local = self
                .state()
                .nodes
                .get(parent.node)?
                .entries()
                .and_then(|e| e.get(&original.name))
                .copied();

            let id = match local {
                Some(id) if self.state().nodes.get(id)?.owner == Some(store) => id,
                Some(id) => {
                    let copy = self.derive_node(id, Some(store))?;
                    let copy = self.insert_node(copy)?;
                    self.link(parent.node, store, &original.name, copy)?;
                    copy
                }
                None => {
                    let copy = self.make_override(&parent, original, store)?;
                    self.link(parent.node, store, &original.name, copy)?;
                    copy
                }
            };
            let step = self.resolver().local_step(&parent, &original.name, id)?;
            promoted.push(step);
        }
        Ok(promoted)
    }

    /// Point `name` in the head-owned directory `dir` at `child`.
    pub(crate) fn link(
        &mut self,
        dir: NodeId,
        store: StoreId,
        name: &str,
        child: NodeId,
    ) -> Result<()> {
        let node = self.node_mut(dir, store)?;
        let entries = node
            .entries_mut()
            .ok_or_else(|| StoreError::invalid(format!("node {} is not a directory", dir)))?;
        entries.insert(name.to_string(), child);
        node.touch();
        Ok(())
    }

    /// Local stand-in for a node that was only visible through the
    /// indirection of `parent`.
    fn make_override(&mut self, parent: &Step, source: &Step, store: StoreId) -> Result<NodeId> {
        let source_node = self.state().nodes.get(source.node)?.clone();
        if !source_node.kind().is_directory() {
            let copy = self.derive_node(source.node, Some(store))?;
            debug!(
                "Transaction::make_override file {} -> {}",
                source.node, copy.id
            );
            return self.insert_node(copy);
        }

        let parent_opaque = self
            .state()
            .nodes
            .get(parent.node)?
            .layered_dir()
            .map(|d| d.opaque)
            .unwrap_or(false);
        let layered = match (&parent.indirection, parent_opaque) {
            (Some(target), true) => LayeredDirectory::primary(join_target(target, &source.name)?),
            (Some(_), false) => LayeredDirectory::non_primary(),
            (None, _) => match &source.indirection {
                Some(target) => LayeredDirectory::primary(target.clone()),
                None => {
                    return Err(StoreError::invalid(format!(
                        "cannot override {} without an indirection",
                        source.name
                    )))
                }
            },
        };
        let mut node = self.new_node(NodeBody::LayeredDirectory(layered), Some(store));
        node.predecessor = Some(source.node);
        node.properties = source_node.properties;
        node.aspects = source_node.aspects;
        debug!(
            "Transaction::make_override directory {} -> {}",
            source.node, node.id
        );
        self.insert_node(node)
    }

    /// Copy `id` into `store`'s head. Head-owned descendants are copied
    /// too, frozen ones are shared. The top copy gets `predecessor` and,
    /// for a non-primary layered directory, the explicit `indirection`.
    pub(crate) fn clone_tree(
        &mut self,
        id: NodeId,
        store: StoreId,
        predecessor: Option<NodeId>,
        indirection: Option<String>,
    ) -> Result<NodeId> {
        let mut copy = self.derive_node(id, Some(store))?;
        copy.predecessor = predecessor;
        if let (NodeBody::LayeredDirectory(dir), Some(target)) = (&mut copy.body, indirection) {
            if dir.indirection.is_none() {
                dir.indirection = Some(target);
            }
        }
        let children: Vec<(String, NodeId)> = copy
            .entries()
            .map(|e| e.iter().map(|(n, &c)| (n.clone(), c)).collect())
            .unwrap_or_default();
        for (name, child) in children {
            if self.state().nodes.get(child)?.owner.is_some() {
                let cloned = self.clone_tree(child, store, Some(child), None)?;
                if let Some(entries) = copy.entries_mut() {
                    entries.insert(name, cloned);
                }
            }
        }
        self.insert_node(copy)
    }
}
