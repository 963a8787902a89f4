//! Cycle-safe deep cloning and the clipboard.
//!
//! A clone copies every scalar field and parameter map by value, recreates
//! pointers against the cloned targets, and keeps a source→clone map so a
//! node reached twice (a back-reference cycle or a shared target) is
//! cloned once and reused. Depth is bounded: structure deeper than the
//! configured limit is truncated instead of recursed into.
//!
//! The clipboard holds a detached copy, so the source dialog can mutate
//! freely between copy and paste. Pasting as a link references the
//! original node and is refused when the payload came from a cut or from
//! another dialog.

use std::collections::BTreeMap;

use crate::dialog::{Dialog, DialogId, NodeId, Pointer};
use crate::error::{DlgError, DlgResult};

/// A link whose target lay outside the cloned subtree. It can only be
/// re-attached when pasting back into the dialog the copy came from.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PendingLink {
    /// Owning node, as an id in the clipboard graph.
    pub from: NodeId,
    /// Target in the source dialog.
    pub original_target: NodeId,
    pub template: Pointer,
}

/// Result of cloning a subtree into another dialog.
pub(crate) struct CloneResult {
    pub root: NodeId,
    pub map: BTreeMap<NodeId, NodeId>,
    pub external_links: Vec<PendingLink>,
}

/// Clones the tree-defining subtree under `root` from `source` into
/// `target`, up to `max_depth` levels. Link edges whose target falls
/// inside the cloned set are recreated against the clones; the rest are
/// reported as external.
pub(crate) fn clone_into(
    source: &Dialog,
    root: NodeId,
    target: &mut Dialog,
    max_depth: u32,
) -> DlgResult<CloneResult> {
    if source.node(root).is_none() {
        return Err(DlgError::UnknownNode(root.raw()));
    }

    // Phase 1: clone the depth-bounded tree closure, scalars only.
    let mut map: BTreeMap<NodeId, NodeId> = BTreeMap::new();
    let mut stack: Vec<(NodeId, u32)> = vec![(root, 0)];
    while let Some((current, depth)) = stack.pop() {
        if map.contains_key(&current) {
            continue;
        }
        let Some(node) = source.node(current) else {
            continue;
        };
        let clone_id = match node.kind {
            crate::dialog::NodeKind::Entry => target.add_entry(),
            crate::dialog::NodeKind::Reply => target.add_reply(),
        };
        if let Some(clone) = target.node_mut(clone_id) {
            clone.text = node.text.clone();
            clone.speaker = node.speaker.clone();
            clone.animation = node.animation;
            clone.animation_loop = node.animation_loop;
            clone.action = node.action.clone();
            clone.action_params = node.action_params.clone();
            clone.comment = node.comment.clone();
            clone.sound = node.sound.clone();
            clone.quest = node.quest.clone();
            clone.quest_entry = node.quest_entry;
            clone.delay = node.delay;
        }
        map.insert(current, clone_id);

        if depth >= max_depth {
            // Deeper structure is truncated, not recursed into.
            continue;
        }
        // Reverse push keeps child visit order stable for the stack.
        for pointer in node.pointers.iter().rev() {
            if !pointer.edge.is_link() {
                stack.push((pointer.target, depth + 1));
            }
        }
    }

    // Phase 2: recreate pointers between clones, in source order.
    let mut external_links = Vec::new();
    for (&source_id, &clone_id) in &map {
        let Some(node) = source.node(source_id) else {
            continue;
        };
        for pointer in &node.pointers {
            match map.get(&pointer.target) {
                Some(&cloned_target) => {
                    attach_pointer(target, clone_id, cloned_target, pointer)?;
                }
                None if pointer.edge.is_link() => {
                    external_links.push(PendingLink {
                        from: clone_id,
                        original_target: pointer.target,
                        template: pointer.clone(),
                    });
                }
                // Tree child truncated by the depth bound: dropped.
                None => {}
            }
        }
    }

    Ok(CloneResult {
        root: map[&root],
        map,
        external_links,
    })
}

/// Adds a pointer carrying the template's edge kind, condition, and
/// comment.
pub(crate) fn attach_pointer(
    dialog: &mut Dialog,
    from: NodeId,
    to: NodeId,
    template: &Pointer,
) -> DlgResult<crate::dialog::PointerId> {
    let id = dialog.add_pointer(from, to, template.edge)?;
    if let Some(pointer) = dialog
        .node_mut_internal(from)
        .and_then(|node| node.pointers.last_mut())
    {
        pointer.condition = template.condition.clone();
        pointer.condition_params = template.condition_params.clone();
        pointer.comment = template.comment.clone();
    }
    Ok(id)
}

/// One captured subtree, detached from its source dialog.
#[derive(Clone, Debug)]
pub(crate) struct ClipboardPayload {
    /// Detached arena holding the clones.
    pub graph: Dialog,
    /// Root of the copy inside `graph`.
    pub root: NodeId,
    /// Root in the source dialog, for paste-as-link.
    pub original_root: NodeId,
    /// Links that pointed outside the copied subtree.
    pub external_links: Vec<PendingLink>,
    /// Which dialog the copy came from.
    pub source_dialog: DialogId,
    /// Whether the source was consumed by a cut.
    pub cut: bool,
}

/// The editing clipboard. One payload at a time, copy or cut.
#[derive(Clone, Debug, Default)]
pub struct Clipboard {
    pub(crate) payload: Option<ClipboardPayload>,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_none()
    }

    pub fn clear(&mut self) {
        self.payload = None;
    }

    /// Captures a detached deep copy of the subtree under `root`.
    pub(crate) fn capture(
        &mut self,
        source: &Dialog,
        root: NodeId,
        cut: bool,
        max_depth: u32,
    ) -> DlgResult<()> {
        let mut graph = Dialog::new();
        let result = clone_into(source, root, &mut graph, max_depth)?;
        self.payload = Some(ClipboardPayload {
            graph,
            root: result.root,
            original_root: root,
            external_links: result.external_links,
            source_dialog: source.id(),
            cut,
        });
        Ok(())
    }
}
