//! Mark-sweep garbage collection for the node arena
//!
//! Roots are every store's head root and every live version root. Marking
//! follows directory entries only: predecessor links and indirection
//! targets are weak, so a node kept alive solely by history or by a layered
//! directory pointing at it is collected.

use std::collections::BTreeSet;

use log::{debug, info};

use crate::content::ContentRef;
use crate::error::Result;
use crate::mutation::Transaction;
use crate::node::NodeId;
use crate::repository::state::RepoState;

/// Statistics from a garbage collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Nodes still reachable.
    pub retained: usize,
    /// Nodes removed.
    pub collected: usize,
    /// Nodes before collection.
    pub total_before: usize,
    /// Content referenced only by collected nodes.
    pub released_content: Vec<ContentRef>,
}

impl GcStats {
    pub fn did_collect(&self) -> bool {
        self.collected > 0
    }
}

fn roots(state: &RepoState) -> Vec<NodeId> {
    let mut roots = Vec::new();
    for store in state.stores.values() {
        roots.push(store.head_root);
        roots.extend(store.live_versions().map(|v| v.root));
    }
    roots
}

/// Every node reachable from a live root.
pub fn mark(state: &RepoState) -> BTreeSet<NodeId> {
    let mut reachable = BTreeSet::new();
    let mut queue = Vec::new();

    for root in roots(state) {
        if state.nodes.contains(root) && reachable.insert(root) {
            queue.push(root);
        }
    }

    while let Some(id) = queue.pop() {
        let Ok(node) = state.nodes.get(id) else {
            continue;
        };
        if let Some(entries) = node.entries() {
            for &child in entries.values() {
                if state.nodes.contains(child) && reachable.insert(child) {
                    queue.push(child);
                }
            }
        }
    }

    reachable
}

/// Compute what a collection would remove without removing anything.
pub fn dry_run(state: &RepoState) -> GcStats {
    let total_before = state.nodes.len();
    let reachable = mark(state);
    GcStats {
        retained: reachable.len(),
        collected: total_before - reachable.len(),
        total_before,
        released_content: Vec::new(),
    }
}

/// Whether any node in the arena refers to `content`.
pub(crate) fn content_in_use(state: &RepoState, content: &ContentRef) -> bool {
    state.nodes.ids().any(|id| {
        state
            .nodes
            .get(id)
            .ok()
            .and_then(|node| node.file_data())
            .and_then(|data| data.content.as_ref())
            == Some(content)
    })
}

fn content_of(state: &RepoState, ids: impl Iterator<Item = NodeId>) -> BTreeSet<ContentRef> {
    ids.filter_map(|id| state.nodes.get(id).ok())
        .filter_map(|node| node.file_data().and_then(|d| d.content.clone()))
        .collect()
}

impl Transaction<'_> {
    /// Remove every node no live root can reach.
    pub fn collect_garbage(&mut self) -> Result<GcStats> {
        let total_before = self.state().nodes.len();
        let reachable = mark(self.state());
        let garbage: Vec<NodeId> = self
            .state()
            .nodes
            .ids()
            .filter(|id| !reachable.contains(id))
            .collect();

        let kept_content = content_of(self.state(), reachable.iter().copied());
        let released_content: Vec<ContentRef> = content_of(self.state(), garbage.iter().copied())
            .into_iter()
            .filter(|c| !kept_content.contains(c))
            .collect();

        for &id in &garbage {
            if let Some(node) = self.remove_node_raw(id) {
                if let Some(store) = node.owner {
                    if self.state().stores.contains_key(&store) {
                        self.store_mut(store)?.head_nodes.remove(&id);
                    }
                }
            }
        }

        let stats = GcStats {
            retained: total_before - garbage.len(),
            collected: garbage.len(),
            total_before,
            released_content,
        };
        if stats.did_collect() {
            info!(
                "Collected {} of {} nodes ({} content blobs released)",
                stats.collected,
                stats.total_before,
                stats.released_content.len()
            );
        } else {
            debug!("Transaction::collect_garbage nothing to collect");
        }
        Ok(stats)
    }
}
