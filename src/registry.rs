//! Link registry: reverse index of incoming pointers per node.
//!
//! The registry answers "who points at this node" in O(1) without walking
//! the graph. It is maintained incrementally through
//! [`LinkRegistry::register`]/[`LinkRegistry::unregister`] and rebuilt in
//! full after any bulk mutation that bypasses them.
//!
//! # Contracts
//! - **Consistency**: at any point where the registry is known-consistent,
//!   its reverse index equals the set of pointers reachable by enumerating
//!   the start list plus every node's outgoing pointer list.

use std::collections::BTreeMap;

use crate::dialog::{Dialog, NodeId, Pointer, PointerId};

/// The owning side of a pointer: the dialog's start list or a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PointerOwner {
    Start,
    Node(NodeId),
}

/// A stable reference to one pointer: its owner plus its pointer id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct PointerRef {
    pub owner: PointerOwner,
    pub pointer: PointerId,
}

impl PointerRef {
    /// Resolves this reference against the dialog it was taken from.
    pub fn resolve(self, dialog: &Dialog) -> Option<&Pointer> {
        let list = match self.owner {
            PointerOwner::Start => dialog.starts(),
            PointerOwner::Node(id) => &dialog.node(id)?.pointers,
        };
        list.iter().find(|pointer| pointer.id == self.pointer)
    }

    pub(crate) fn resolve_mut(self, dialog: &mut Dialog) -> Option<&mut Pointer> {
        let list = match self.owner {
            PointerOwner::Start => dialog.starts_mut(),
            PointerOwner::Node(id) => &mut dialog.node_mut_internal(id)?.pointers,
        };
        list.iter_mut().find(|pointer| pointer.id == self.pointer)
    }
}

/// Reverse index: target node → every pointer currently aimed at it.
#[derive(Clone, Debug, Default)]
pub struct LinkRegistry {
    inbound: BTreeMap<NodeId, Vec<PointerRef>>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the whole index from the live graph in O(V + E).
    pub fn rebuild(&mut self, dialog: &Dialog) {
        self.inbound.clear();
        for pointer in dialog.starts() {
            self.register(PointerOwner::Start, pointer);
        }
        for (&id, node) in &dialog.nodes {
            for pointer in &node.pointers {
                self.register(PointerOwner::Node(id), pointer);
            }
        }
    }

    /// Records one pointer in the reverse index.
    pub fn register(&mut self, owner: PointerOwner, pointer: &Pointer) {
        self.inbound.entry(pointer.target).or_default().push(PointerRef {
            owner,
            pointer: pointer.id,
        });
    }

    /// Removes one pointer from the reverse index.
    pub fn unregister(&mut self, owner: PointerOwner, pointer: PointerId, target: NodeId) {
        if let Some(refs) = self.inbound.get_mut(&target) {
            refs.retain(|r| !(r.owner == owner && r.pointer == pointer));
            if refs.is_empty() {
                self.inbound.remove(&target);
            }
        }
    }

    /// All pointers currently targeting `node`: start pointers, tree
    /// edges, and back-reference links alike.
    pub fn links_to(&self, node: NodeId) -> &[PointerRef] {
        self.inbound.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drops the inbound entry of a node that no longer exists.
    pub(crate) fn forget_node(&mut self, node: NodeId) {
        self.inbound.remove(&node);
    }

    /// Rewrites the cached index on every pointer aimed at `node` after its
    /// position in the owning list changed.
    pub fn update_node_index(&self, dialog: &mut Dialog, node: NodeId, new_index: u32) {
        let refs: Vec<PointerRef> = self.links_to(node).to_vec();
        for r in refs {
            if let Some(pointer) = r.resolve_mut(dialog) {
                pointer.index = new_index;
            }
        }
    }

    /// Whether the index currently matches the live graph. O(V + E); used
    /// by save-time validation and tests.
    pub fn is_consistent(&self, dialog: &Dialog) -> bool {
        let mut fresh = LinkRegistry::new();
        fresh.rebuild(dialog);
        if fresh.inbound.len() != self.inbound.len() {
            return false;
        }
        fresh.inbound.iter().all(|(target, refs)| {
            let mut expected = refs.clone();
            expected.sort();
            let Some(actual) = self.inbound.get(target) else {
                return false;
            };
            let mut actual = actual.clone();
            actual.sort();
            actual == expected
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::EdgeKind;

    #[test]
    fn rebuild_indexes_starts_and_node_pointers() {
        let mut dialog = Dialog::new();
        let entry = dialog.add_entry();
        let reply = dialog.add_reply();
        dialog.add_start(entry).expect("start");
        dialog.add_pointer(entry, reply, EdgeKind::Tree).expect("pointer");
        dialog.add_pointer(reply, entry, EdgeKind::Link).expect("link");

        let mut registry = LinkRegistry::new();
        registry.rebuild(&dialog);

        let to_entry = registry.links_to(entry);
        assert_eq!(to_entry.len(), 2);
        assert!(to_entry.iter().any(|r| r.owner == PointerOwner::Start));
        assert!(to_entry
            .iter()
            .any(|r| r.owner == PointerOwner::Node(reply)));
        assert_eq!(registry.links_to(reply).len(), 1);
        assert!(registry.is_consistent(&dialog));
    }

    #[test]
    fn incremental_maintenance_matches_rebuild() {
        let mut dialog = Dialog::new();
        let entry = dialog.add_entry();
        let reply = dialog.add_reply();

        let mut registry = LinkRegistry::new();
        let start_id = dialog.add_start(entry).expect("start");
        registry.register(
            PointerOwner::Start,
            dialog.starts().last().expect("start pointer"),
        );
        dialog.add_pointer(entry, reply, EdgeKind::Tree).expect("pointer");
        let node_ptr = dialog
            .node(entry)
            .expect("node")
            .pointers
            .last()
            .expect("pointer")
            .clone();
        registry.register(PointerOwner::Node(entry), &node_ptr);

        assert!(registry.is_consistent(&dialog));

        registry.unregister(PointerOwner::Start, start_id, entry);
        assert!(!registry.is_consistent(&dialog));
        assert!(registry.links_to(entry).is_empty());
    }

    #[test]
    fn update_node_index_rewrites_every_inbound_cache() {
        let mut dialog = Dialog::new();
        let first = dialog.add_entry();
        let second = dialog.add_entry();
        let reply = dialog.add_reply();
        dialog.add_start(second).expect("start");
        dialog.add_pointer(reply, second, EdgeKind::Tree).expect("pointer");

        let mut registry = LinkRegistry::new();
        registry.rebuild(&dialog);

        dialog.move_node_raw(second, 0).expect("move");
        registry.update_node_index(&mut dialog, second, 0);
        registry.update_node_index(&mut dialog, first, 1);

        assert!(dialog.indices_consistent());
        assert_eq!(dialog.starts()[0].index, 0);
        assert_eq!(dialog.node(reply).expect("node").pointers[0].index, 0);
    }
}
