//! Snapshot-based undo/redo.
//!
//! Snapshots are full structural copies taken at mutation boundaries, not
//! diffs. Restoring one reproduces node ordering, edge kinds, and pointer
//! targets exactly; callers rebuild the link registry afterwards.

use crate::dialog::Dialog;
use crate::error::{DlgError, DlgResult};

#[derive(Clone, Debug, Default)]
pub struct History {
    undo: Vec<Dialog>,
    redo: Vec<Dialog>,
    limit: usize,
}

impl History {
    /// Creates a history keeping at most `limit` undo snapshots; the
    /// oldest is dropped first.
    pub fn new(limit: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Records the current structure. Any redo branch is discarded.
    pub fn save_state(&mut self, dialog: &Dialog) {
        if self.undo.len() == self.limit {
            self.undo.remove(0);
        }
        self.undo.push(dialog.clone());
        self.redo.clear();
    }

    /// Takes back the most recent snapshot, for callers that recorded one
    /// ahead of an operation that was then rejected or changed nothing.
    pub(crate) fn take_last(&mut self) -> Option<Dialog> {
        self.undo.pop()
    }

    pub fn undo(&mut self, current: &mut Dialog) -> DlgResult<()> {
        let snapshot = self.undo.pop().ok_or(DlgError::UndoExhausted)?;
        self.redo.push(std::mem::replace(current, snapshot));
        Ok(())
    }

    pub fn redo(&mut self, current: &mut Dialog) -> DlgResult<()> {
        let snapshot = self.redo.pop().ok_or(DlgError::RedoExhausted)?;
        self.undo.push(std::mem::replace(current, snapshot));
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.undo.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::EdgeKind;

    #[test]
    fn undo_restores_content_equality() {
        let mut dialog = Dialog::new();
        let entry = dialog.add_entry();
        dialog.add_start(entry).expect("start");
        let mut history = History::new(8);

        history.save_state(&dialog);
        let before = dialog.clone();
        let reply = dialog.add_reply();
        dialog.add_pointer(entry, reply, EdgeKind::Tree).expect("pointer");
        assert_ne!(dialog, before);

        history.undo(&mut dialog).expect("undo");
        assert_eq!(dialog, before);
        assert!(history.can_redo());

        history.redo(&mut dialog).expect("redo");
        assert_eq!(dialog.node_count(), 2);
    }

    #[test]
    fn new_mutation_clears_redo() {
        let mut dialog = Dialog::new();
        let mut history = History::new(8);
        history.save_state(&dialog);
        dialog.add_entry();
        history.undo(&mut dialog).expect("undo");
        assert!(history.can_redo());

        history.save_state(&dialog);
        dialog.add_reply();
        assert!(!history.can_redo());
        assert!(matches!(
            history.redo(&mut dialog),
            Err(DlgError::RedoExhausted)
        ));
    }

    #[test]
    fn limit_drops_oldest_snapshot() {
        let mut dialog = Dialog::new();
        let mut history = History::new(2);
        for _ in 0..4 {
            history.save_state(&dialog);
            dialog.add_entry();
        }
        assert_eq!(history.depth(), 2);
        history.undo(&mut dialog).expect("undo");
        history.undo(&mut dialog).expect("undo");
        assert!(matches!(
            history.undo(&mut dialog),
            Err(DlgError::UndoExhausted)
        ));
        // The two surviving snapshots hold 2 and 3 nodes.
        assert_eq!(dialog.node_count(), 2);
    }
}
