//! Orphan management: reachability analysis, orphan removal, and the
//! orphan-container convention.
//!
//! An orphan is a node no Start can reach through tree-defining edges.
//! Instead of discarding content, callers can rehouse orphans under a
//! reserved container subtree that is inert at runtime (its start pointer
//! is guarded by a script that always evaluates false) but preserved on
//! round-trip and excluded from later orphan scans.

use std::collections::{BTreeSet, VecDeque};

use crate::dialog::{Dialog, EdgeKind, NodeId, NodeKind};
use crate::error::DlgResult;
use crate::gff::{LocString, ResRef};
use crate::registry::{LinkRegistry, PointerOwner, PointerRef};

/// Reserved comment token marking the orphan-container nodes.
pub const ORPHAN_CONTAINER_COMMENT: &str = "[OrphanContainer]";

/// Condition script guaranteed to evaluate false at runtime, keeping the
/// container's start pointer inert.
pub const ORPHAN_GUARD_SCRIPT: &str = "dlg_never";

/// The container's two attachment points: replies hang off the entry root,
/// entries off the reply hub, so rehousing never violates alternation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrphanContainer {
    pub root: NodeId,
    pub hub: NodeId,
}

// =============================================================================
// Reachability
// =============================================================================

/// Nodes reachable from the given seeds. `follow_links` decides whether
/// back-reference edges are traversed; orphan analysis passes `false`.
pub fn reachable_from(
    dialog: &Dialog,
    seeds: impl IntoIterator<Item = NodeId>,
    follow_links: bool,
) -> BTreeSet<NodeId> {
    let mut visited = BTreeSet::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();
    for seed in seeds {
        if dialog.node(seed).is_some() && visited.insert(seed) {
            queue.push_back(seed);
        }
    }
    while let Some(current) = queue.pop_front() {
        let Some(node) = dialog.node(current) else {
            continue;
        };
        for pointer in &node.pointers {
            if pointer.edge.is_link() && !follow_links {
                continue;
            }
            if dialog.node(pointer.target).is_some() && visited.insert(pointer.target) {
                queue.push_back(pointer.target);
            }
        }
    }
    visited
}

/// Nodes reachable from any Start pointer.
pub fn reachable_from_starts(dialog: &Dialog, follow_links: bool) -> BTreeSet<NodeId> {
    let seeds: Vec<NodeId> = dialog.starts().iter().map(|pointer| pointer.target).collect();
    reachable_from(dialog, seeds, follow_links)
}

// =============================================================================
// Orphan container
// =============================================================================

/// Finds the container's entry root, ignoring nodes in `exclude` (used when
/// the existing container is itself pending deletion).
fn find_root_excluding(dialog: &Dialog, exclude: &BTreeSet<NodeId>) -> Option<NodeId> {
    dialog.entries().iter().copied().find(|id| {
        !exclude.contains(id)
            && dialog
                .node(*id)
                .is_some_and(|node| node.comment.contains(ORPHAN_CONTAINER_COMMENT))
    })
}

/// Finds the orphan container's entry root, if the dialog has one.
pub fn find_orphan_container(dialog: &Dialog) -> Option<NodeId> {
    find_root_excluding(dialog, &BTreeSet::new())
}

/// Finds or creates the container, returning both attachment points.
pub fn ensure_orphan_container(
    dialog: &mut Dialog,
    registry: &mut LinkRegistry,
) -> DlgResult<OrphanContainer> {
    ensure_orphan_container_excluding(dialog, registry, &BTreeSet::new())
}

pub(crate) fn ensure_orphan_container_excluding(
    dialog: &mut Dialog,
    registry: &mut LinkRegistry,
    exclude: &BTreeSet<NodeId>,
) -> DlgResult<OrphanContainer> {
    let root = match find_root_excluding(dialog, exclude) {
        Some(root) => root,
        None => {
            let root = dialog.add_entry();
            if let Some(node) = dialog.node_mut(root) {
                node.comment = ORPHAN_CONTAINER_COMMENT.to_string();
                node.text = LocString::with_text(0, "Orphaned conversation nodes");
            }
            dialog.add_start(root)?;
            if let Some(start) = dialog.starts_mut().last_mut() {
                start.condition = ResRef::new(ORPHAN_GUARD_SCRIPT);
                let start = start.clone();
                registry.register(PointerOwner::Start, &start);
            }
            root
        }
    };

    // The hub is the root's first tagged tree child; rehoused entries
    // attach under it.
    let existing_hub = dialog.node(root).and_then(|node| {
        node.pointers
            .iter()
            .filter(|pointer| !pointer.edge.is_link() && !exclude.contains(&pointer.target))
            .map(|pointer| pointer.target)
            .find(|target| {
                dialog
                    .node(*target)
                    .is_some_and(|node| node.comment.contains(ORPHAN_CONTAINER_COMMENT))
            })
    });
    let hub = match existing_hub {
        Some(hub) => hub,
        None => {
            let hub = dialog.add_reply();
            if let Some(node) = dialog.node_mut(hub) {
                node.comment = ORPHAN_CONTAINER_COMMENT.to_string();
            }
            let pointer_id = dialog.add_pointer(root, hub, EdgeKind::Tree)?;
            register_node_pointer(dialog, registry, root, pointer_id);
            hub
        }
    };

    Ok(OrphanContainer { root, hub })
}

/// The container root plus everything it reaches through tree edges. Empty
/// when the dialog has no container.
pub fn container_subtree(dialog: &Dialog) -> BTreeSet<NodeId> {
    match find_orphan_container(dialog) {
        Some(root) => reachable_from(dialog, [root], false),
        None => BTreeSet::new(),
    }
}

/// Attaches each node under the container side that keeps alternation
/// intact: replies under the entry root, entries under the reply hub.
pub(crate) fn rehouse_orphans(
    dialog: &mut Dialog,
    registry: &mut LinkRegistry,
    container: OrphanContainer,
    orphans: &[NodeId],
) -> DlgResult<()> {
    for &orphan in orphans {
        let Some(kind) = dialog.node(orphan).map(|node| node.kind) else {
            continue;
        };
        let parent = match kind {
            NodeKind::Reply => container.root,
            NodeKind::Entry => container.hub,
        };
        let pointer_id = dialog.add_pointer(parent, orphan, EdgeKind::Tree)?;
        register_node_pointer(dialog, registry, parent, pointer_id);
    }
    Ok(())
}

/// Registers a node-owned pointer that was just created.
fn register_node_pointer(
    dialog: &Dialog,
    registry: &mut LinkRegistry,
    owner: NodeId,
    pointer: crate::dialog::PointerId,
) {
    let r = PointerRef {
        owner: PointerOwner::Node(owner),
        pointer,
    };
    if let Some(found) = r.resolve(dialog) {
        let found = found.clone();
        registry.register(PointerOwner::Node(owner), &found);
    }
}

// =============================================================================
// Orphan removal
// =============================================================================

/// Removes every node unreachable from the Starts via tree edges, except
/// the orphan container and its contents. Returns the removed ids.
/// Idempotent: running it twice removes nothing the second time.
pub fn remove_orphaned_nodes(dialog: &mut Dialog, registry: &mut LinkRegistry) -> Vec<NodeId> {
    let mut keep = reachable_from_starts(dialog, false);
    keep.extend(container_subtree(dialog));

    let doomed: Vec<NodeId> = dialog
        .node_ids()
        .filter(|id| !keep.contains(id))
        .collect();
    if doomed.is_empty() {
        return doomed;
    }
    for &id in &doomed {
        dialog.remove_node_raw(id);
        registry.forget_node(id);
    }
    remove_orphaned_pointers(dialog, registry);
    dialog.reindex_pointers();
    registry.rebuild(dialog);
    doomed
}

/// Drops every pointer whose target no longer exists. Returns how many
/// were dropped.
pub fn remove_orphaned_pointers(dialog: &mut Dialog, registry: &mut LinkRegistry) -> usize {
    let mut dropped = 0;
    let live: BTreeSet<NodeId> = dialog.node_ids().collect();

    let starts = dialog.starts_mut();
    let before = starts.len();
    starts.retain(|pointer| live.contains(&pointer.target));
    dropped += before - starts.len();

    let ids: Vec<NodeId> = dialog.node_ids().collect();
    for id in ids {
        if let Some(node) = dialog.node_mut_internal(id) {
            let before = node.pointers.len();
            node.pointers.retain(|pointer| live.contains(&pointer.target));
            dropped += before - node.pointers.len();
        }
    }
    if dropped > 0 {
        registry.rebuild(dialog);
    }
    dropped
}

/// Before a deletion is applied, finds the nodes outside `pending` that
/// only the pending set still ties to the graph: they are targeted by a
/// back-reference edge from a pending node and have no tree-defining
/// parent (Start included) outside `pending`. Deleting without rehousing
/// them would silently strand their subtrees.
pub fn identify_orphaned_link_children(
    dialog: &Dialog,
    deleting: NodeId,
    pending: &BTreeSet<NodeId>,
) -> Vec<NodeId> {
    debug_assert!(pending.contains(&deleting) || dialog.node(deleting).is_none());

    let mut link_children: BTreeSet<NodeId> = BTreeSet::new();
    for &source in pending {
        let Some(node) = dialog.node(source) else {
            continue;
        };
        for pointer in &node.pointers {
            if pointer.edge.is_link()
                && !pending.contains(&pointer.target)
                && dialog.node(pointer.target).is_some()
            {
                link_children.insert(pointer.target);
            }
        }
    }
    if link_children.is_empty() {
        return Vec::new();
    }

    // A surviving tree parent (or a Start) keeps a candidate anchored.
    let mut anchored: BTreeSet<NodeId> = BTreeSet::new();
    for pointer in dialog.starts() {
        anchored.insert(pointer.target);
    }
    for (&source, node) in &dialog.nodes {
        if pending.contains(&source) {
            continue;
        }
        for pointer in &node.pointers {
            if !pointer.edge.is_link() {
                anchored.insert(pointer.target);
            }
        }
    }

    link_children
        .into_iter()
        .filter(|candidate| !anchored.contains(candidate))
        .collect()
}
