//! Editing session facade.
//!
//! One session owns one dialog plus the services that keep it honest: the
//! link registry, the undo history, and the clipboard. Every structural
//! operation validates first and mutates only after validation succeeds,
//! so a rejected operation leaves the graph exactly as it was. The graph
//! is single-threaded; load and save work on owned data and never overlap
//! a mutation.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::adapter;
use crate::cascade::{cascade_delete, DeleteOutcome};
use crate::clipboard::{clone_into, Clipboard};
use crate::dialog::{Dialog, EdgeKind, GraphStats, NodeId, PointerId};
use crate::error::{DlgError, DlgResult};
use crate::gff;
use crate::history::History;
use crate::orphan;
use crate::registry::{LinkRegistry, PointerOwner, PointerRef};

/// Tunables for deep operations. Constructed explicitly and passed in;
/// there are no process-wide knobs.
#[derive(Clone, Copy, Debug)]
pub struct EditorLimits {
    /// Maximum depth a deep clone follows before truncating.
    pub max_clone_depth: u32,
    /// How many undo snapshots are retained.
    pub max_undo_states: usize,
}

impl Default for EditorLimits {
    fn default() -> Self {
        Self {
            max_clone_depth: 100,
            max_undo_states: 64,
        }
    }
}

/// An editing session over one dialog.
#[derive(Debug)]
pub struct EditSession {
    dialog: Dialog,
    registry: LinkRegistry,
    history: History,
    clipboard: Clipboard,
    limits: EditorLimits,
}

impl EditSession {
    /// Starts a session on an empty dialog.
    pub fn new(limits: EditorLimits) -> Self {
        Self::from_dialog(Dialog::new(), limits)
    }

    /// Wraps an existing dialog, rebuilding the registry from it.
    pub fn from_dialog(dialog: Dialog, limits: EditorLimits) -> Self {
        let mut registry = LinkRegistry::new();
        registry.rebuild(&dialog);
        Self {
            dialog,
            registry,
            history: History::new(limits.max_undo_states),
            clipboard: Clipboard::new(),
            limits,
        }
    }

    // =========================================================================
    // File interface
    // =========================================================================

    /// Loads a dialogue container from disk.
    pub fn load(path: impl AsRef<Path>) -> DlgResult<Self> {
        Self::load_with_limits(path, EditorLimits::default())
    }

    pub fn load_with_limits(path: impl AsRef<Path>, limits: EditorLimits) -> DlgResult<Self> {
        let bytes = fs::read(path)?;
        let root = gff::decode(&bytes)?;
        let dialog = adapter::dialog_from_gff(&root)?;
        Ok(Self::from_dialog(dialog, limits))
    }

    /// Saves the dialog. Validation runs first (inconsistent cached
    /// indices are corrected by a full rebuild before any byte is
    /// written) and the write is atomic: encode fully, write a temp
    /// file, rename. A failed save never leaves a partial file at
    /// `path`.
    pub fn save(&mut self, path: impl AsRef<Path>) -> DlgResult<()> {
        if !self.dialog.indices_consistent() {
            self.registry.rebuild(&self.dialog);
            self.dialog.reindex_pointers();
        }
        self.dialog.recount_words();
        let root = adapter::dialog_to_gff(&self.dialog)?;
        let bytes = gff::encode(&root)?;
        atomic_write(path.as_ref(), &bytes)
    }

    /// Renders the dialog as the JSON interchange text.
    pub fn interchange_text(&self) -> DlgResult<String> {
        let root = adapter::dialog_to_gff(&self.dialog)?;
        Ok(gff::to_text(&root)?)
    }

    /// Builds a session from the JSON interchange text.
    pub fn from_interchange_text(input: &str, limits: EditorLimits) -> DlgResult<Self> {
        let root = gff::from_text(input)?;
        let dialog = adapter::dialog_from_gff(&root)?;
        Ok(Self::from_dialog(dialog, limits))
    }

    // =========================================================================
    // Access
    // =========================================================================

    pub fn dialog(&self) -> &Dialog {
        &self.dialog
    }

    /// Mutable node access for scalar edits (text, scripts, comments).
    /// Structural changes go through the session operations.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut crate::dialog::DialogNode> {
        self.dialog.node_mut(id)
    }

    pub fn registry(&self) -> &LinkRegistry {
        &self.registry
    }

    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    /// Hands this session a clipboard captured elsewhere; the editor has
    /// one clipboard across every open dialog. The payload keeps its
    /// source-dialog identity, so paste-as-link still refuses foreign
    /// content.
    pub fn adopt_clipboard(&mut self, clipboard: Clipboard) {
        self.clipboard = clipboard;
    }

    pub fn links_to(&self, node: NodeId) -> &[PointerRef] {
        self.registry.links_to(node)
    }

    pub fn stats(&self) -> GraphStats {
        self.dialog.stats()
    }

    /// Nodes unreachable from every Start via tree edges, excluding the
    /// orphan container's contents.
    pub fn orphan_count(&self) -> usize {
        let keep = self.kept_by_orphan_scan();
        self.dialog
            .node_ids()
            .filter(|id| !keep.contains(id))
            .count()
    }

    fn kept_by_orphan_scan(&self) -> BTreeSet<NodeId> {
        let mut keep = orphan::reachable_from_starts(&self.dialog, false);
        keep.extend(orphan::container_subtree(&self.dialog));
        keep
    }

    // =========================================================================
    // Factories
    // =========================================================================

    pub fn add_entry(&mut self) -> NodeId {
        self.dialog.add_entry()
    }

    pub fn add_reply(&mut self) -> NodeId {
        self.dialog.add_reply()
    }

    pub fn add_start(&mut self, target: NodeId) -> DlgResult<PointerId> {
        let id = self.dialog.add_start(target)?;
        if let Some(pointer) = self.dialog.starts().last() {
            let pointer = pointer.clone();
            self.registry.register(PointerOwner::Start, &pointer);
        }
        Ok(id)
    }

    pub fn add_pointer(
        &mut self,
        source: NodeId,
        target: NodeId,
        edge: EdgeKind,
    ) -> DlgResult<PointerId> {
        let id = self.dialog.add_pointer(source, target, edge)?;
        let r = PointerRef {
            owner: PointerOwner::Node(source),
            pointer: id,
        };
        if let Some(pointer) = r.resolve(&self.dialog) {
            let pointer = pointer.clone();
            self.registry.register(PointerOwner::Node(source), &pointer);
        }
        Ok(id)
    }

    // =========================================================================
    // Structural operations
    // =========================================================================

    /// Cascade-deletes a node; see [`crate::cascade`] for the semantics.
    pub fn delete_node(&mut self, node: NodeId) -> DlgResult<DeleteOutcome> {
        if self.dialog.node(node).is_none() {
            return Err(DlgError::UnknownNode(node.raw()));
        }
        self.checkpoint();
        self.run_rolled_back(|session| {
            cascade_delete(&mut session.dialog, &mut session.registry, node)
        })
    }

    /// Copies the subtree under `node` to the clipboard.
    pub fn copy(&mut self, node: NodeId) -> DlgResult<()> {
        self.clipboard
            .capture(&self.dialog, node, false, self.limits.max_clone_depth)
    }

    /// Copies the subtree to the clipboard, then cascade-deletes it. The
    /// payload is marked consumed-by-cut, so it can still be pasted as a
    /// duplicate but never as a link.
    pub fn cut(&mut self, node: NodeId) -> DlgResult<DeleteOutcome> {
        if self.dialog.node(node).is_none() {
            return Err(DlgError::UnknownNode(node.raw()));
        }
        self.clipboard
            .capture(&self.dialog, node, true, self.limits.max_clone_depth)?;
        self.checkpoint();
        self.run_rolled_back(|session| {
            cascade_delete(&mut session.dialog, &mut session.registry, node)
        })
    }

    /// Pastes the clipboard as a fresh deep copy under `dest`, attached by
    /// a tree-defining pointer. Returns the new subtree root.
    pub fn paste_as_duplicate(&mut self, dest: NodeId) -> DlgResult<NodeId> {
        let payload = self.clipboard.payload.as_ref().ok_or(DlgError::ClipboardEmpty)?;
        let dest_kind = self
            .dialog
            .node(dest)
            .ok_or(DlgError::UnknownNode(dest.raw()))?
            .kind;
        let root_kind = payload
            .graph
            .node(payload.root)
            .ok_or(DlgError::ClipboardEmpty)?
            .kind;
        if dest_kind.opposite() != root_kind {
            return Err(DlgError::Alternation(format!(
                "cannot paste a {root_kind:?} under a {dest_kind:?}"
            )));
        }
        let same_dialog = payload.source_dialog == self.dialog.id() && !payload.cut;

        self.checkpoint();
        self.run_rolled_back(|session| {
            let payload = session
                .clipboard
                .payload
                .clone()
                .ok_or(DlgError::ClipboardEmpty)?;
            let result = clone_into(
                &payload.graph,
                payload.root,
                &mut session.dialog,
                session.limits.max_clone_depth,
            )?;
            session.dialog.add_pointer(dest, result.root, EdgeKind::Tree)?;

            // Links that pointed outside the copied subtree re-attach only
            // when pasting back into the dialog they came from.
            if same_dialog {
                for pending in &payload.external_links {
                    let Some(&from) = result.map.get(&pending.from) else {
                        continue;
                    };
                    if session.dialog.node(pending.original_target).is_none() {
                        continue;
                    }
                    let _ = crate::clipboard::attach_pointer(
                        &mut session.dialog,
                        from,
                        pending.original_target,
                        &pending.template,
                    );
                }
            }
            session.registry.rebuild(&session.dialog);
            Ok(result.root)
        })
    }

    /// Pastes the clipboard as a back-reference to the *original* node.
    /// Refused when the payload was cut (the source is gone or going),
    /// when it came from a different dialog, or when the source node no
    /// longer exists.
    pub fn paste_as_link(&mut self, dest: NodeId) -> DlgResult<PointerId> {
        let payload = self.clipboard.payload.as_ref().ok_or(DlgError::ClipboardEmpty)?;
        if payload.cut {
            return Err(DlgError::LinkRejected(
                "the source was consumed by a cut".into(),
            ));
        }
        if payload.source_dialog != self.dialog.id() {
            return Err(DlgError::LinkRejected(
                "the clipboard came from another dialog".into(),
            ));
        }
        let original = payload.original_root;
        if self.dialog.node(original).is_none() {
            return Err(DlgError::LinkRejected(
                "the source node no longer exists".into(),
            ));
        }
        if self.dialog.node(dest).is_none() {
            return Err(DlgError::UnknownNode(dest.raw()));
        }
        // add_pointer enforces alternation and mutates nothing on error,
        // so the checkpoint only sticks for a successful paste.
        self.checkpoint();
        match self.add_pointer(dest, original, EdgeKind::Link) {
            Ok(id) => Ok(id),
            Err(err) => {
                self.history.take_last();
                Err(err)
            }
        }
    }

    /// Removes orphaned nodes; see [`orphan::remove_orphaned_nodes`].
    pub fn remove_orphaned_nodes(&mut self) -> Vec<NodeId> {
        let keep = self.kept_by_orphan_scan();
        if self.dialog.node_ids().all(|id| keep.contains(&id)) {
            return Vec::new();
        }
        self.checkpoint();
        orphan::remove_orphaned_nodes(&mut self.dialog, &mut self.registry)
    }

    /// Moves a node within its owning list, keeping every inbound cached
    /// index current through the registry.
    pub fn move_node(&mut self, node: NodeId, new_index: usize) -> DlgResult<()> {
        let kind = self
            .dialog
            .node(node)
            .ok_or(DlgError::UnknownNode(node.raw()))?
            .kind;
        let Some(old_index) = self.dialog.position_of(node) else {
            return Err(DlgError::UnknownNode(node.raw()));
        };
        if new_index >= self.dialog.list_of(kind).len() {
            return Err(DlgError::Validation(format!(
                "move target {new_index} outside list of {} nodes",
                self.dialog.list_of(kind).len()
            )));
        }
        if new_index == old_index as usize {
            return Ok(());
        }
        self.checkpoint();
        self.dialog.move_node_raw(node, new_index)?;
        // Every node between the old and new position shifted by one.
        let lo = (old_index as usize).min(new_index);
        let hi = (old_index as usize).max(new_index);
        let shifted: Vec<(NodeId, u32)> = self.dialog.list_of(kind)[lo..=hi]
            .iter()
            .enumerate()
            .map(|(offset, &id)| (id, (lo + offset) as u32))
            .collect();
        for (id, position) in shifted {
            self.registry.update_node_index(&mut self.dialog, id, position);
        }
        Ok(())
    }

    /// Rebuilds the reverse index from the live graph. Required after any
    /// bulk mutation done outside the session operations.
    pub fn rebuild_link_registry(&mut self) {
        self.registry.rebuild(&self.dialog);
    }

    // =========================================================================
    // Undo / redo
    // =========================================================================

    /// Records an undo snapshot at a caller-chosen boundary.
    pub fn save_state(&mut self) {
        self.history.save_state(&self.dialog);
    }

    pub fn undo(&mut self) -> DlgResult<()> {
        self.history.undo(&mut self.dialog)?;
        self.registry.rebuild(&self.dialog);
        Ok(())
    }

    pub fn redo(&mut self) -> DlgResult<()> {
        self.history.redo(&mut self.dialog)?;
        self.registry.rebuild(&self.dialog);
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn checkpoint(&mut self) {
        self.history.save_state(&self.dialog);
    }

    /// Runs a mutation that was already validated; if it still fails, the
    /// checkpoint taken just before is restored so the graph is unchanged.
    fn run_rolled_back<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> DlgResult<T>,
    ) -> DlgResult<T> {
        match op(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                if let Some(snapshot) = self.history.take_last() {
                    self.dialog = snapshot;
                    self.registry.rebuild(&self.dialog);
                }
                Err(err)
            }
        }
    }
}

/// Writes the full byte buffer to a temp file next to the target, then
/// renames it into place.
fn atomic_write(path: &Path, bytes: &[u8]) -> DlgResult<()> {
    let parent = path.parent().ok_or_else(|| {
        DlgError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "target path has no parent",
        ))
    })?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
