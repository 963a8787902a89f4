//! Cascade-delete engine.
//!
//! Deleting a node must remove exactly the nodes that become unreachable,
//! and never a node still held by a surviving pointer from outside the
//! deletion set, even though back-reference edges make the graph cyclic.
//!
//! The candidate set is refined to a fixed point: a candidate with a
//! surviving parent outside the shrinking set is rescued, and a rescue can
//! cascade to nodes reachable only through the rescued node. A single
//! forward/backward pass is not enough: when a candidate's second parent
//! is itself doomed, one pass under-deletes shared nodes in deep chains.
//! The worklist keeps propagating rescues until none remain.
//!
//! A candidate whose only outside parent is a back-reference keeps its
//! content by promotion: the surviving link becomes the tree-defining
//! edge, so the shared node moves under the linking parent instead of
//! dangling or being lost.
//!
//! All traversals use explicit worklists; chains of several hundred nodes
//! must not touch the call stack.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::dialog::{Dialog, EdgeKind, NodeId};
use crate::error::{DlgError, DlgResult};
use crate::orphan::{
    ensure_orphan_container_excluding, identify_orphaned_link_children, rehouse_orphans,
};
use crate::registry::LinkRegistry;

/// Result of one cascade deletion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Nodes physically removed, the seed included.
    pub removed: BTreeSet<NodeId>,
    /// Pointers dropped from surviving nodes because their target died.
    pub dropped_pointers: usize,
    /// Shared nodes kept alive by promoting a surviving link to a tree
    /// edge.
    pub promoted: Vec<NodeId>,
    /// Link-only children rehoused under the orphan container instead of
    /// being stranded.
    pub rehoused: Vec<NodeId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Parent {
    Start,
    Node(NodeId, EdgeKind),
}

/// Computes the exact set of nodes that deleting `node` removes, without
/// mutating anything. Unknown nodes yield an empty set.
pub fn compute_cascade_set(dialog: &Dialog, node: NodeId) -> BTreeSet<NodeId> {
    cascade_plan(dialog, node).0
}

/// The deletion set plus the survivors that need a link promoted to a tree
/// edge to stay anchored.
fn cascade_plan(dialog: &Dialog, node: NodeId) -> (BTreeSet<NodeId>, Vec<NodeId>) {
    if dialog.node(node).is_none() {
        return (BTreeSet::new(), Vec::new());
    }

    // Seed: the node plus its tree-defining closure, via an explicit stack.
    let mut candidates: BTreeSet<NodeId> = BTreeSet::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if !candidates.insert(current) {
            continue;
        }
        if let Some(current_node) = dialog.node(current) {
            for pointer in &current_node.pointers {
                if !pointer.edge.is_link() && dialog.node(pointer.target).is_some() {
                    stack.push(pointer.target);
                }
            }
        }
    }

    // Incoming parents per candidate. Start pointers count as parents that
    // can never be deleted.
    let mut parents: BTreeMap<NodeId, Vec<Parent>> = BTreeMap::new();
    for pointer in dialog.starts() {
        if candidates.contains(&pointer.target) {
            parents.entry(pointer.target).or_default().push(Parent::Start);
        }
    }
    for (&source, source_node) in &dialog.nodes {
        for pointer in &source_node.pointers {
            if candidates.contains(&pointer.target) {
                parents
                    .entry(pointer.target)
                    .or_default()
                    .push(Parent::Node(source, pointer.edge));
            }
        }
    }

    // Fixed point: rescue candidates with any surviving outside parent,
    // then re-examine the tree children of everything rescued.
    let mut rescue_queue: VecDeque<NodeId> = candidates
        .iter()
        .copied()
        .filter(|&candidate| {
            candidate != node && outside_parent(&parents, &candidates, candidate).is_some()
        })
        .collect();

    while let Some(rescued) = rescue_queue.pop_front() {
        if !candidates.remove(&rescued) {
            continue;
        }
        let Some(rescued_node) = dialog.node(rescued) else {
            continue;
        };
        for pointer in &rescued_node.pointers {
            if pointer.edge.is_link() {
                continue;
            }
            let child = pointer.target;
            if child != node && candidates.contains(&child) {
                rescue_queue.push_back(child);
            }
        }
    }

    // Survivors of the original closure whose every remaining tree parent
    // is doomed stay alive only through a back-reference; that link gets
    // promoted.
    let mut promotions = Vec::new();
    for (&survivor, survivor_parents) in &parents {
        if candidates.contains(&survivor) {
            continue;
        }
        let has_tree_anchor = survivor_parents.iter().any(|parent| match parent {
            Parent::Start => true,
            Parent::Node(source, edge) => {
                !edge.is_link() && !candidates.contains(source)
            }
        });
        if !has_tree_anchor {
            promotions.push(survivor);
        }
    }

    (candidates, promotions)
}

fn outside_parent(
    parents: &BTreeMap<NodeId, Vec<Parent>>,
    candidates: &BTreeSet<NodeId>,
    node: NodeId,
) -> Option<Parent> {
    parents.get(&node).and_then(|list| {
        list.iter()
            .find(|parent| match parent {
                Parent::Start => true,
                Parent::Node(source, _) => !candidates.contains(source),
            })
            .copied()
    })
}

/// Deletes `node` and everything that becomes unreachable with it.
///
/// Validates before mutating: an unknown node leaves the graph unchanged.
/// Shared nodes held by a surviving link are kept by promoting that link;
/// link-only children of the deleted set are rehoused under the orphan
/// container; then the candidates are removed, dangling pointers dropped,
/// indices recomputed, and the registry rebuilt. Always terminates, on any
/// cyclic or shared structure.
pub fn cascade_delete(
    dialog: &mut Dialog,
    registry: &mut LinkRegistry,
    node: NodeId,
) -> DlgResult<DeleteOutcome> {
    if dialog.node(node).is_none() {
        return Err(DlgError::UnknownNode(node.raw()));
    }

    let (pending, promoted) = cascade_plan(dialog, node);
    let rehoused = identify_orphaned_link_children(dialog, node, &pending);

    promote_links(dialog, &pending, &promoted);
    if !rehoused.is_empty() {
        let container = ensure_orphan_container_excluding(dialog, registry, &pending)?;
        rehouse_orphans(dialog, registry, container, &rehoused)?;
    }

    for &doomed in &pending {
        dialog.remove_node_raw(doomed);
        registry.forget_node(doomed);
    }

    let dropped_pointers = crate::orphan::remove_orphaned_pointers(dialog, registry);
    dialog.reindex_pointers();
    registry.rebuild(dialog);

    Ok(DeleteOutcome {
        removed: pending,
        dropped_pointers,
        promoted,
        rehoused,
    })
}

/// Flips one surviving link per promoted node into the tree-defining edge.
/// Deterministic: the lowest-id outside source wins, first pointer in its
/// list order.
fn promote_links(dialog: &mut Dialog, pending: &BTreeSet<NodeId>, promoted: &[NodeId]) {
    for &target in promoted {
        let source = dialog
            .nodes
            .iter()
            .find(|(source, source_node)| {
                !pending.contains(*source)
                    && source_node
                        .pointers
                        .iter()
                        .any(|pointer| pointer.edge.is_link() && pointer.target == target)
            })
            .map(|(&source, _)| source);
        let Some(source) = source else {
            continue;
        };
        if let Some(source_node) = dialog.node_mut_internal(source) {
            if let Some(pointer) = source_node
                .pointers
                .iter_mut()
                .find(|pointer| pointer.edge.is_link() && pointer.target == target)
            {
                pointer.edge = EdgeKind::Tree;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orphan::reachable_from_starts;

    fn registry_for(dialog: &Dialog) -> LinkRegistry {
        let mut registry = LinkRegistry::new();
        registry.rebuild(dialog);
        registry
    }

    #[test]
    fn unknown_node_is_rejected_without_mutation() {
        let mut dialog = Dialog::new();
        let entry = dialog.add_entry();
        dialog.add_start(entry).expect("start");
        let mut registry = registry_for(&dialog);
        let before = dialog.clone();

        let ghost = NodeId(999);
        assert!(matches!(
            cascade_delete(&mut dialog, &mut registry, ghost),
            Err(DlgError::UnknownNode(999))
        ));
        assert_eq!(dialog, before);
    }

    #[test]
    fn deleting_a_leaf_removes_only_the_leaf() {
        let mut dialog = Dialog::new();
        let entry = dialog.add_entry();
        let reply = dialog.add_reply();
        dialog.add_start(entry).expect("start");
        dialog.add_pointer(entry, reply, EdgeKind::Tree).expect("pointer");
        let mut registry = registry_for(&dialog);

        let outcome = cascade_delete(&mut dialog, &mut registry, reply).expect("delete");
        assert_eq!(outcome.removed, [reply].into_iter().collect());
        assert_eq!(outcome.dropped_pointers, 1);
        assert!(dialog.node(entry).is_some());
        assert!(dialog.node(entry).expect("node").pointers.is_empty());
    }

    #[test]
    fn shared_node_is_kept_by_promoting_the_surviving_link() {
        // Entry A --tree--> Reply S, Entry B --link--> S. Deleting A alone
        // preserves S: B's link becomes the tree edge. Deleting B then
        // removes S.
        let mut dialog = Dialog::new();
        let a = dialog.add_entry();
        let b = dialog.add_entry();
        let s = dialog.add_reply();
        dialog.add_start(a).expect("start");
        dialog.add_start(b).expect("start");
        dialog.add_pointer(a, s, EdgeKind::Tree).expect("tree");
        dialog.add_pointer(b, s, EdgeKind::Link).expect("link");
        let mut registry = registry_for(&dialog);

        let outcome = cascade_delete(&mut dialog, &mut registry, a).expect("delete");
        assert_eq!(outcome.removed, [a].into_iter().collect());
        assert_eq!(outcome.promoted, vec![s]);
        let b_pointer = &dialog.node(b).expect("node").pointers[0];
        assert_eq!(b_pointer.target, s);
        assert_eq!(b_pointer.edge, EdgeKind::Tree);

        let outcome = cascade_delete(&mut dialog, &mut registry, b).expect("delete");
        assert!(outcome.removed.contains(&s));
        assert_eq!(dialog.node_count(), 0);
    }

    #[test]
    fn rescue_propagates_through_rescued_subtrees() {
        // Deleting A must keep r1 (second tree parent C) and, through it,
        // B and r2, nodes reachable only via the rescued node.
        let mut dialog = Dialog::new();
        let a = dialog.add_entry();
        let b = dialog.add_entry();
        let c = dialog.add_entry();
        let r1 = dialog.add_reply();
        let r2 = dialog.add_reply();
        dialog.add_start(a).expect("start");
        dialog.add_start(c).expect("start");
        dialog.add_pointer(a, r1, EdgeKind::Tree).expect("tree");
        dialog.add_pointer(c, r1, EdgeKind::Tree).expect("tree");
        dialog.add_pointer(r1, b, EdgeKind::Tree).expect("tree");
        dialog.add_pointer(b, r2, EdgeKind::Tree).expect("tree");
        let mut registry = registry_for(&dialog);

        let outcome = cascade_delete(&mut dialog, &mut registry, a).expect("delete");
        assert_eq!(outcome.removed, [a].into_iter().collect());
        assert!(outcome.promoted.is_empty());
        for survivor in [r1, b, r2] {
            assert!(dialog.node(survivor).is_some());
        }
    }

    #[test]
    fn fixed_point_deletes_node_whose_second_parent_is_also_doomed() {
        // r2 has two tree parents, but both lie inside the doomed closure.
        // A pass that merely counts parents keeps r2 alive; the fixed
        // point deletes the whole chain.
        let mut dialog = Dialog::new();
        let a = dialog.add_entry();
        dialog.add_start(a).expect("start");
        let r1 = dialog.add_reply();
        let e1 = dialog.add_entry();
        let r2 = dialog.add_reply();
        dialog.add_pointer(a, r1, EdgeKind::Tree).expect("tree");
        dialog.add_pointer(r1, e1, EdgeKind::Tree).expect("tree");
        dialog.add_pointer(e1, r2, EdgeKind::Tree).expect("tree");
        dialog.add_pointer(a, r2, EdgeKind::Tree).expect("tree");
        let mut registry = registry_for(&dialog);

        let outcome = cascade_delete(&mut dialog, &mut registry, a).expect("delete");
        assert_eq!(
            outcome.removed,
            [a, r1, e1, r2].into_iter().collect::<BTreeSet<_>>()
        );
        assert_eq!(dialog.node_count(), 0);
    }

    #[test]
    fn cycles_terminate_and_delete_cleanly() {
        let mut dialog = Dialog::new();
        let a = dialog.add_entry();
        let r = dialog.add_reply();
        dialog.add_start(a).expect("start");
        dialog.add_pointer(a, r, EdgeKind::Tree).expect("tree");
        dialog.add_pointer(r, a, EdgeKind::Link).expect("link");
        let mut registry = registry_for(&dialog);

        let outcome = cascade_delete(&mut dialog, &mut registry, a).expect("delete");
        assert_eq!(outcome.removed, [a, r].into_iter().collect());
        assert_eq!(dialog.node_count(), 0);
        assert!(dialog.starts().is_empty());
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let mut dialog = Dialog::new();
        let root = dialog.add_entry();
        dialog.add_start(root).expect("start");
        let mut previous = root;
        for step in 0..600 {
            let next = if step % 2 == 0 {
                dialog.add_reply()
            } else {
                dialog.add_entry()
            };
            dialog.add_pointer(previous, next, EdgeKind::Tree).expect("tree");
            previous = next;
        }
        let mut registry = registry_for(&dialog);

        let outcome = cascade_delete(&mut dialog, &mut registry, root).expect("delete");
        assert_eq!(outcome.removed.len(), 601);
        assert_eq!(dialog.node_count(), 0);
    }

    #[test]
    fn every_survivor_stays_reachable() {
        let mut dialog = Dialog::new();
        let a = dialog.add_entry();
        let b = dialog.add_entry();
        let shared = dialog.add_reply();
        let tail = dialog.add_entry();
        dialog.add_start(a).expect("start");
        dialog.add_start(b).expect("start");
        dialog.add_pointer(a, shared, EdgeKind::Tree).expect("tree");
        dialog.add_pointer(b, shared, EdgeKind::Link).expect("link");
        dialog.add_pointer(shared, tail, EdgeKind::Tree).expect("tree");
        let mut registry = registry_for(&dialog);

        cascade_delete(&mut dialog, &mut registry, a).expect("delete");
        let reachable = reachable_from_starts(&dialog, false);
        for id in dialog.node_ids().collect::<Vec<_>>() {
            assert!(reachable.contains(&id), "{id:?} must stay reachable");
        }
        assert!(registry.is_consistent(&dialog));
        assert!(dialog.indices_consistent());
    }
}
