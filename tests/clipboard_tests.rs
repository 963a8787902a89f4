//! Copy/cut/paste semantics through the session interface.

use aurora_dlg::gff::LocString;
use aurora_dlg::{DlgError, EdgeKind};

mod common;
use common::{branching_dialog, deep_chain_session, session_with};

#[test]
fn paste_as_duplicate_creates_an_independent_copy() {
    let built = branching_dialog();
    let mut session = session_with(built.dialog);
    let before = session.dialog().node_count();

    session.copy(built.explain).expect("copy");
    let pasted = session.paste_as_duplicate(built.leave).expect("paste");

    assert_eq!(session.dialog().node_count(), before + 1);
    assert_ne!(pasted, built.explain);

    // Editing the copy leaves the original alone.
    if let Some(node) = session.node_mut(pasted) {
        node.text = LocString::with_text(0, "changed");
    }
    let original = session.dialog().node(built.explain).expect("node");
    assert_eq!(original.text.text(0), Some("A humble innkeeper."));
}

#[test]
fn cut_then_paste_moves_a_subtree() {
    let built = branching_dialog();
    let mut session = session_with(built.dialog);

    session.cut(built.explain).expect("cut");
    assert!(session.dialog().node(built.explain).is_none());

    let pasted = session.paste_as_duplicate(built.leave).expect("paste");
    let node = session.dialog().node(pasted).expect("node");
    assert_eq!(node.text.text(0), Some("A humble innkeeper."));
    assert!(session.registry().is_consistent(session.dialog()));
}

#[test]
fn paste_as_link_references_the_original() {
    let built = branching_dialog();
    let mut session = session_with(built.dialog);

    session.copy(built.explain).expect("copy");
    session.paste_as_link(built.leave).expect("paste link");

    let leave_node = session.dialog().node(built.leave).expect("node");
    let pointer = leave_node.pointers.last().expect("pointer");
    assert_eq!(pointer.target, built.explain);
    assert_eq!(pointer.edge, EdgeKind::Link);
    assert_eq!(session.dialog().stats().link_count, 2);
}

#[test]
fn paste_as_link_is_rejected_after_cut() {
    let built = branching_dialog();
    let mut session = session_with(built.dialog);

    session.cut(built.explain).expect("cut");
    assert!(matches!(
        session.paste_as_link(built.leave),
        Err(DlgError::LinkRejected(_))
    ));
}

#[test]
fn paste_as_link_is_rejected_across_dialogs() {
    let built = branching_dialog();
    let mut source = session_with(built.dialog);
    source.copy(built.explain).expect("copy");

    let other = branching_dialog();
    let mut destination = session_with(other.dialog);
    destination.adopt_clipboard(source.clipboard().clone());

    assert!(matches!(
        destination.paste_as_link(other.leave),
        Err(DlgError::LinkRejected(_))
    ));
    // Pasting as a duplicate is fine; the copy is self-contained.
    let pasted = destination.paste_as_duplicate(other.leave).expect("paste");
    assert!(destination.dialog().node(pasted).is_some());
}

#[test]
fn paste_rejects_alternation_violations_without_mutating() {
    let built = branching_dialog();
    let mut session = session_with(built.dialog);
    let before = aurora_dlg::dialog_to_gff(session.dialog()).expect("project");

    // explain and greet are both entries; both paste forms must refuse
    // Entry-under-Entry.
    session.copy(built.explain).expect("copy");
    assert!(matches!(
        session.paste_as_duplicate(built.greet),
        Err(DlgError::Alternation(_))
    ));
    assert!(matches!(
        session.paste_as_link(built.greet),
        Err(DlgError::Alternation(_))
    ));
    let after = aurora_dlg::dialog_to_gff(session.dialog()).expect("project");
    assert_eq!(before, after);
}

#[test]
fn empty_clipboard_is_rejected() {
    let built = branching_dialog();
    let mut session = session_with(built.dialog);
    assert!(matches!(
        session.paste_as_duplicate(built.leave),
        Err(DlgError::ClipboardEmpty)
    ));
    assert!(matches!(
        session.paste_as_link(built.leave),
        Err(DlgError::ClipboardEmpty)
    ));
}

#[test]
fn cyclic_subtree_pastes_as_a_finite_copy() {
    let built = branching_dialog();
    let mut session = session_with(built.dialog);
    // ask -> explain -> (link) ask is a 2-node cycle.
    let before = session.dialog().node_count();
    session.copy(built.ask).expect("copy");
    let pasted = session.paste_as_duplicate(built.greet).expect("paste");

    assert_eq!(session.dialog().node_count(), before + 2);
    let pasted_node = session.dialog().node(pasted).expect("node");
    let child = pasted_node.pointers[0].target;
    let back = &session.dialog().node(child).expect("node").pointers[0];
    assert_eq!(back.target, pasted);
    assert_eq!(back.edge, EdgeKind::Link);
}

#[test]
fn deep_chain_copy_truncates_at_the_depth_limit() {
    let (mut session, root) = deep_chain_session(520);
    let anchor = session.add_reply();
    let anchor_parent = session.add_entry();
    session.add_start(anchor_parent).expect("start");
    session
        .add_pointer(anchor_parent, anchor, EdgeKind::Tree)
        .expect("pointer");

    let before = session.dialog().node_count();
    session.copy(root).expect("copy");
    let pasted = session.paste_as_duplicate(anchor).expect("paste");
    // Default depth limit is 100: the copy holds the root plus 100 levels.
    assert_eq!(session.dialog().node_count(), before + 101);
    assert!(session.dialog().node(pasted).is_some());
}

#[test]
fn external_links_reattach_only_in_the_source_dialog() {
    let built = branching_dialog();
    let mut session = session_with(built.dialog);
    // explain links to ask, which lies outside the copied subtree rooted
    // at explain.
    session.copy(built.explain).expect("copy");
    let pasted = session.paste_as_duplicate(built.leave).expect("paste");
    let pasted_node = session.dialog().node(pasted).expect("node");
    assert!(
        pasted_node
            .pointers
            .iter()
            .any(|pointer| pointer.target == built.ask && pointer.edge == EdgeKind::Link),
        "external link must re-attach to the original target"
    );

    // In a different dialog the original target does not exist; the
    // external link is dropped instead of dangling.
    let other = branching_dialog();
    let mut destination = session_with(other.dialog);
    destination.adopt_clipboard(session.clipboard().clone());
    let foreign = destination.paste_as_duplicate(other.leave).expect("paste");
    let foreign_node = destination.dialog().node(foreign).expect("node");
    assert!(foreign_node
        .pointers
        .iter()
        .all(|pointer| !pointer.edge.is_link()));
    assert!(destination.registry().is_consistent(destination.dialog()));
}
