//! Dialogue graph model: dialogs, nodes, and pointers.
//!
//! A [`Dialog`] owns its nodes in an arena keyed by stable [`NodeId`]s and
//! keeps the ordered entry/reply lists the container format serializes.
//! Pointers reference nodes by id; the numeric index the file stores is a
//! cache, recomputed from list positions whenever structure changes.
//!
//! # Contracts
//! - **Alternation**: an Entry's outgoing pointers target only Replies and
//!   vice versa; start pointers target only Entries. Enforced on every
//!   mutation, not just on load.
//! - **Lifecycle**: nodes are created through the factory methods here and
//!   removed only by the cascade-delete and orphan engines, which keep the
//!   link registry consistent.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{DlgError, DlgResult};
use crate::gff::{LocString, ResRef};

/// Per-node delay sentinel meaning "use the dialog-wide default".
pub const DEFAULT_DELAY: u32 = 0xFFFF_FFFF;

/// Stable identifier of a node within one [`Dialog`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Rebuilds an id from its raw value, for callers that persisted one.
    /// Ids are only meaningful against the dialog they came from.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

/// Stable identifier of a pointer within one [`Dialog`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PointerId(pub(crate) u32);

/// Process-unique identity of a [`Dialog`] instance, used to reject
/// clipboard links across dialogs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DialogId(u64);

static NEXT_DIALOG_ID: AtomicU64 = AtomicU64::new(1);

/// Whether a node is NPC-spoken or player-spoken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Entry,
    Reply,
}

impl NodeKind {
    /// The kind a pointer from this side must target.
    pub fn opposite(self) -> Self {
        match self {
            Self::Entry => Self::Reply,
            Self::Reply => Self::Entry,
        }
    }
}

/// Edge classification. `Tree` edges define the conversation tree; `Link`
/// edges are back-references or shared copies and never confer ownership.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    Tree,
    Link,
}

impl EdgeKind {
    pub fn is_link(self) -> bool {
        matches!(self, Self::Link)
    }
}

/// A directed edge to a node, from another node or from the start list.
#[derive(Clone, Debug, PartialEq)]
pub struct Pointer {
    pub id: PointerId,
    pub target: NodeId,
    pub target_kind: NodeKind,
    /// Cached position of the target in its owning list. Kept current by
    /// the link registry; validated (and corrected) before every save.
    pub index: u32,
    pub edge: EdgeKind,
    /// Appearance condition script; empty means always shown.
    pub condition: ResRef,
    pub condition_params: BTreeMap<String, String>,
    pub comment: String,
}

/// A conversation node: one NPC or player line plus its outgoing pointers.
#[derive(Clone, Debug, PartialEq)]
pub struct DialogNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub text: LocString,
    /// Speaker tag; empty means the conversation owner. Entries only.
    pub speaker: String,
    pub animation: u32,
    pub animation_loop: bool,
    /// Action script run when the line plays.
    pub action: ResRef,
    pub action_params: BTreeMap<String, String>,
    pub comment: String,
    pub sound: ResRef,
    pub quest: String,
    pub quest_entry: Option<u32>,
    pub delay: u32,
    pub pointers: Vec<Pointer>,
}

impl DialogNode {
    fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            text: LocString::new(),
            speaker: String::new(),
            animation: 0,
            animation_loop: false,
            action: ResRef::default(),
            action_params: BTreeMap::new(),
            comment: String::new(),
            sound: ResRef::default(),
            quest: String::new(),
            quest_entry: None,
            delay: DEFAULT_DELAY,
            pointers: Vec::new(),
        }
    }
}

/// Aggregate counts over a dialog, for callers that surface summaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub entry_count: usize,
    pub reply_count: usize,
    pub start_count: usize,
    pub pointer_count: usize,
    pub link_count: usize,
    pub word_count: u32,
}

/// The root aggregate: node arena, ordered lists, start pointers, and the
/// scalar global properties the container stores.
#[derive(Clone, Debug, PartialEq)]
pub struct Dialog {
    id: DialogId,
    pub(crate) nodes: BTreeMap<NodeId, DialogNode>,
    pub(crate) entries: Vec<NodeId>,
    pub(crate) replies: Vec<NodeId>,
    pub(crate) starts: Vec<Pointer>,
    next_node: u32,
    next_pointer: u32,
    pub delay_entry: u32,
    pub delay_reply: u32,
    pub script_end: ResRef,
    pub script_abort: ResRef,
    pub prevent_zoom: bool,
    pub word_count: u32,
}

impl Default for Dialog {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialog {
    pub fn new() -> Self {
        Self {
            id: DialogId(NEXT_DIALOG_ID.fetch_add(1, Ordering::Relaxed)),
            nodes: BTreeMap::new(),
            entries: Vec::new(),
            replies: Vec::new(),
            starts: Vec::new(),
            next_node: 0,
            next_pointer: 0,
            delay_entry: 0,
            delay_reply: 0,
            script_end: ResRef::default(),
            script_abort: ResRef::default(),
            prevent_zoom: false,
            word_count: 0,
        }
    }

    pub fn id(&self) -> DialogId {
        self.id
    }

    // =========================================================================
    // Factories
    // =========================================================================

    /// Creates an NPC line and appends it to the entry list.
    pub fn add_entry(&mut self) -> NodeId {
        self.add_node(NodeKind::Entry)
    }

    /// Creates a player line and appends it to the reply list.
    pub fn add_reply(&mut self) -> NodeId {
        self.add_node(NodeKind::Reply)
    }

    fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(id, DialogNode::new(id, kind));
        self.list_of_mut(kind).push(id);
        id
    }

    /// Appends an outgoing pointer from `source` to `target`, enforcing
    /// speaker alternation. Callers owning a registry must register the
    /// returned pointer.
    pub fn add_pointer(
        &mut self,
        source: NodeId,
        target: NodeId,
        edge: EdgeKind,
    ) -> DlgResult<PointerId> {
        let source_kind = self.node(source).ok_or(DlgError::UnknownNode(source.0))?.kind;
        let pointer = self.make_pointer(target, edge, source_kind.opposite())?;
        let id = pointer.id;
        self.node_mut_internal(source)
            .ok_or(DlgError::UnknownNode(source.0))?
            .pointers
            .push(pointer);
        Ok(id)
    }

    /// Appends a start pointer. Starts always target entries with a tree
    /// edge; the optional condition makes an entry point conditional.
    pub fn add_start(&mut self, target: NodeId) -> DlgResult<PointerId> {
        let pointer = self.make_pointer(target, EdgeKind::Tree, NodeKind::Entry)?;
        let id = pointer.id;
        self.starts.push(pointer);
        Ok(id)
    }

    fn make_pointer(
        &mut self,
        target: NodeId,
        edge: EdgeKind,
        required: NodeKind,
    ) -> DlgResult<Pointer> {
        let target_kind = self.node(target).ok_or(DlgError::UnknownNode(target.0))?.kind;
        if target_kind != required {
            return Err(DlgError::Alternation(format!(
                "pointer must target a {required:?}, node {} is a {target_kind:?}",
                target.0
            )));
        }
        let index = self
            .position_of(target)
            .ok_or(DlgError::UnknownNode(target.0))?;
        let id = PointerId(self.next_pointer);
        self.next_pointer += 1;
        Ok(Pointer {
            id,
            target,
            target_kind,
            index,
            edge,
            condition: ResRef::default(),
            condition_params: BTreeMap::new(),
            comment: String::new(),
        })
    }

    // =========================================================================
    // Access
    // =========================================================================

    pub fn node(&self, id: NodeId) -> Option<&DialogNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut_internal(&mut self, id: NodeId) -> Option<&mut DialogNode> {
        self.nodes.get_mut(&id)
    }

    /// Mutable node access for editing scalar content (text, scripts,
    /// comments). Structural changes go through the engines.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut DialogNode> {
        self.nodes.get_mut(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn entries(&self) -> &[NodeId] {
        &self.entries
    }

    pub fn replies(&self) -> &[NodeId] {
        &self.replies
    }

    pub fn starts(&self) -> &[Pointer] {
        &self.starts
    }

    pub(crate) fn starts_mut(&mut self) -> &mut Vec<Pointer> {
        &mut self.starts
    }

    pub fn list_of(&self, kind: NodeKind) -> &[NodeId] {
        match kind {
            NodeKind::Entry => &self.entries,
            NodeKind::Reply => &self.replies,
        }
    }

    fn list_of_mut(&mut self, kind: NodeKind) -> &mut Vec<NodeId> {
        match kind {
            NodeKind::Entry => &mut self.entries,
            NodeKind::Reply => &mut self.replies,
        }
    }

    /// Position of a node in its owning list.
    pub fn position_of(&self, id: NodeId) -> Option<u32> {
        let kind = self.node(id)?.kind;
        self.list_of(kind)
            .iter()
            .position(|&candidate| candidate == id)
            .map(|pos| pos as u32)
    }

    // =========================================================================
    // Structural primitives (crate-internal; engines keep the registry
    // consistent around these)
    // =========================================================================

    /// Detaches a node from the arena and its owning list. List positions
    /// after it shift; callers must reindex.
    pub(crate) fn remove_node_raw(&mut self, id: NodeId) -> Option<DialogNode> {
        let node = self.nodes.remove(&id)?;
        let list = self.list_of_mut(node.kind);
        list.retain(|&candidate| candidate != id);
        Some(node)
    }

    /// Moves a node to a new position in its owning list. Cached pointer
    /// indices are the caller's to fix (`LinkRegistry::update_node_index`).
    pub(crate) fn move_node_raw(&mut self, id: NodeId, new_index: usize) -> DlgResult<()> {
        let kind = self.node(id).ok_or(DlgError::UnknownNode(id.0))?.kind;
        let list = self.list_of_mut(kind);
        let from = list
            .iter()
            .position(|&candidate| candidate == id)
            .ok_or(DlgError::UnknownNode(id.0))?;
        if new_index >= list.len() {
            return Err(DlgError::Validation(format!(
                "move target {new_index} outside list of {} nodes",
                list.len()
            )));
        }
        let node = list.remove(from);
        list.insert(new_index, node);
        Ok(())
    }

    /// Recomputes every cached pointer index from current list positions.
    /// O(V + E); used after bulk structural mutation and before saving.
    pub(crate) fn reindex_pointers(&mut self) {
        let mut positions: BTreeMap<NodeId, u32> = BTreeMap::new();
        for (pos, &id) in self.entries.iter().enumerate() {
            positions.insert(id, pos as u32);
        }
        for (pos, &id) in self.replies.iter().enumerate() {
            positions.insert(id, pos as u32);
        }
        for pointer in &mut self.starts {
            if let Some(&pos) = positions.get(&pointer.target) {
                pointer.index = pos;
            }
        }
        for node in self.nodes.values_mut() {
            for pointer in &mut node.pointers {
                if let Some(&pos) = positions.get(&pointer.target) {
                    pointer.index = pos;
                }
            }
        }
    }

    /// True when every pointer's cached index matches its target's current
    /// list position and every target exists.
    pub fn indices_consistent(&self) -> bool {
        let check = |pointer: &Pointer| -> bool {
            self.position_of(pointer.target)
                .is_some_and(|pos| pos == pointer.index)
        };
        self.starts.iter().all(check)
            && self
                .nodes
                .values()
                .all(|node| node.pointers.iter().all(check))
    }

    // =========================================================================
    // Derived data
    // =========================================================================

    /// Recounts words across all node texts and stores the result in the
    /// dialog's word-count property.
    pub fn recount_words(&mut self) -> u32 {
        let total: u32 = self
            .nodes
            .values()
            .flat_map(|node| node.text.texts.values())
            .map(|text| text.split_whitespace().count() as u32)
            .sum();
        self.word_count = total;
        total
    }

    pub fn stats(&self) -> GraphStats {
        let mut pointer_count = self.starts.len();
        let mut link_count = 0;
        for node in self.nodes.values() {
            pointer_count += node.pointers.len();
            link_count += node
                .pointers
                .iter()
                .filter(|pointer| pointer.edge.is_link())
                .count();
        }
        GraphStats {
            entry_count: self.entries.len(),
            reply_count: self.replies.len(),
            start_count: self.starts.len(),
            pointer_count,
            link_count,
            word_count: self.word_count,
        }
    }
}
