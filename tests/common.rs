use aurora_dlg::{Dialog, EdgeKind, EditSession, EditorLimits, NodeId};
use aurora_dlg::gff::LocString;

/// A small branching conversation:
///
/// start -> greet -> [ask, leave]; ask -> explain -> (link back to ask's
/// level via greet). Returns the dialog plus the ids tests reach for.
pub struct Branching {
    pub dialog: Dialog,
    pub greet: NodeId,
    pub ask: NodeId,
    pub leave: NodeId,
    pub explain: NodeId,
}

pub fn branching_dialog() -> Branching {
    let mut dialog = Dialog::new();
    let greet = dialog.add_entry();
    let ask = dialog.add_reply();
    let leave = dialog.add_reply();
    let explain = dialog.add_entry();

    dialog.add_start(greet).expect("start");
    dialog.add_pointer(greet, ask, EdgeKind::Tree).expect("pointer");
    dialog.add_pointer(greet, leave, EdgeKind::Tree).expect("pointer");
    dialog.add_pointer(ask, explain, EdgeKind::Tree).expect("pointer");
    dialog.add_pointer(explain, ask, EdgeKind::Link).expect("link");

    set_text(&mut dialog, greet, "Well met, stranger.");
    set_text(&mut dialog, ask, "Who are you?");
    set_text(&mut dialog, leave, "Farewell.");
    set_text(&mut dialog, explain, "A humble innkeeper.");
    dialog.recount_words();

    Branching {
        dialog,
        greet,
        ask,
        leave,
        explain,
    }
}

pub fn set_text(dialog: &mut Dialog, node: NodeId, text: &str) {
    dialog.node_mut(node).expect("node").text = LocString::with_text(0, text);
}

/// A strictly alternating linear chain of `extra` nodes under a started
/// entry. Returns the session and the chain root.
pub fn deep_chain_session(extra: usize) -> (EditSession, NodeId) {
    let mut session = EditSession::new(EditorLimits::default());
    let root = session.add_entry();
    session.add_start(root).expect("start");
    let mut previous = root;
    for step in 0..extra {
        let next = if step % 2 == 0 {
            session.add_reply()
        } else {
            session.add_entry()
        };
        session
            .add_pointer(previous, next, EdgeKind::Tree)
            .expect("pointer");
        previous = next;
    }
    (session, root)
}

pub fn session_with(dialog: Dialog) -> EditSession {
    EditSession::from_dialog(dialog, EditorLimits::default())
}
