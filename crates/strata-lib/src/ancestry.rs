//! Predecessor chains
//!
//! Every copy-on-write copy, branch and revert records the node it came
//! from. These links are weak: the predecessor may have been collected, in
//! which case a chain simply ends there.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::node::{NodeGraph, NodeId};

/// The most recent node both chains share, or `None` if they never meet.
///
/// Both chains are stepped alternately, each starting at its own node; the
/// first node one side reaches that the other side has already seen wins.
pub fn common_ancestor(nodes: &NodeGraph, left: NodeId, right: NodeId) -> Result<Option<NodeId>> {
    nodes.get(left)?;
    nodes.get(right)?;

    let mut seen_left = BTreeSet::new();
    let mut seen_right = BTreeSet::new();
    let mut l = Some(left);
    let mut r = Some(right);

    while l.is_some() || r.is_some() {
        if let Some(id) = l {
            if seen_right.contains(&id) {
                return Ok(Some(id));
            }
            if !seen_left.insert(id) {
                l = None;
            } else {
                l = predecessor(nodes, id);
            }
        }
        if let Some(id) = r {
            if seen_left.contains(&id) {
                return Ok(Some(id));
            }
            if !seen_right.insert(id) {
                r = None;
            } else {
                r = predecessor(nodes, id);
            }
        }
    }
    Ok(None)
}

/// Up to `count` ancestors of `id`, most recent first, not including `id`.
pub fn history(nodes: &NodeGraph, id: NodeId, count: usize) -> Result<Vec<NodeId>> {
    let mut out = Vec::new();
    let mut current = nodes.get(id)?.predecessor;
    while let Some(ancestor) = current {
        if out.len() >= count || !nodes.contains(ancestor) || out.contains(&ancestor) {
            break;
        }
        out.push(ancestor);
        current = predecessor(nodes, ancestor);
    }
    Ok(out)
}

fn predecessor(nodes: &NodeGraph, id: NodeId) -> Option<NodeId> {
    nodes
        .get(id)
        .ok()
        .and_then(|n| n.predecessor)
        .filter(|p| nodes.contains(*p))
}
