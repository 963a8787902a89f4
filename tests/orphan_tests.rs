//! Orphan detection, removal, and container round-trip behavior.

use aurora_dlg::{
    find_orphan_container, EdgeKind, EditSession, ORPHAN_CONTAINER_COMMENT, ORPHAN_GUARD_SCRIPT,
};

mod common;
use common::{branching_dialog, session_with};

#[test]
fn orphan_removal_is_idempotent() {
    let built = branching_dialog();
    let mut session = session_with(built.dialog);
    let stray_entry = session.add_entry();
    let stray_reply = session.add_reply();
    session
        .add_pointer(stray_entry, stray_reply, EdgeKind::Tree)
        .expect("pointer");

    assert_eq!(session.orphan_count(), 2);
    let removed = session.remove_orphaned_nodes();
    assert_eq!(removed.len(), 2);
    assert!(removed.contains(&stray_entry));
    assert!(removed.contains(&stray_reply));

    let second = session.remove_orphaned_nodes();
    assert!(second.is_empty());
    assert_eq!(session.orphan_count(), 0);
}

#[test]
fn no_op_scan_records_no_undo_state() {
    let built = branching_dialog();
    let mut session = session_with(built.dialog);
    assert!(session.remove_orphaned_nodes().is_empty());
    assert!(!session.can_undo());
}

#[test]
fn link_only_child_is_rehoused_on_delete() {
    // floating has no tree parent anywhere; deleting the subtree that
    // links to it must move it into the orphan container, not lose it.
    let built = branching_dialog();
    let mut session = session_with(built.dialog);
    let floating = session.add_reply();
    session
        .add_pointer(built.explain, floating, EdgeKind::Link)
        .expect("link");

    let outcome = session.delete_node(built.ask).expect("delete");
    assert_eq!(outcome.rehoused, vec![floating]);
    assert!(session.dialog().node(floating).is_some());

    let container = find_orphan_container(session.dialog()).expect("container");
    let root_node = session.dialog().node(container).expect("node");
    assert!(root_node.comment.contains(ORPHAN_CONTAINER_COMMENT));
    // The rehoused reply hangs directly under the container's entry root.
    assert!(root_node
        .pointers
        .iter()
        .any(|pointer| pointer.target == floating && pointer.edge == EdgeKind::Tree));

    // Orphan scans leave the container's contents alone.
    assert!(session.remove_orphaned_nodes().is_empty());
}

#[test]
fn container_survives_a_file_roundtrip_and_stays_exempt() {
    let built = branching_dialog();
    let mut session = session_with(built.dialog);
    let floating = session.add_reply();
    session
        .add_pointer(built.explain, floating, EdgeKind::Link)
        .expect("link");
    session.delete_node(built.ask).expect("delete");
    assert!(find_orphan_container(session.dialog()).is_some());

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("housed.dlg");
    session.save(&path).expect("save");
    let mut reloaded = EditSession::load(&path).expect("load");

    let container = find_orphan_container(reloaded.dialog()).expect("container persists");
    let guard = reloaded
        .dialog()
        .starts()
        .iter()
        .find(|pointer| pointer.target == container)
        .expect("guard start persists");
    assert_eq!(guard.condition.as_str(), ORPHAN_GUARD_SCRIPT);

    assert!(reloaded.remove_orphaned_nodes().is_empty());
}

#[test]
fn orphan_scan_removes_nodes_reached_only_through_links() {
    // A node reachable only via a link edge is an orphan by definition.
    let built = branching_dialog();
    let mut session = session_with(built.dialog);
    let lonely = session.add_entry();
    session
        .add_pointer(built.ask, lonely, EdgeKind::Link)
        .expect("link");

    assert_eq!(session.orphan_count(), 1);
    let removed = session.remove_orphaned_nodes();
    assert_eq!(removed, vec![lonely]);
    // The link that pointed at it is gone too.
    assert!(session
        .dialog()
        .node(built.ask)
        .expect("node")
        .pointers
        .iter()
        .all(|pointer| pointer.target != lonely));
    assert!(session.registry().is_consistent(session.dialog()));
}

#[test]
fn container_counts_as_regular_content_afterwards() {
    let built = branching_dialog();
    let mut session = session_with(built.dialog);
    let floating = session.add_reply();
    session
        .add_pointer(built.explain, floating, EdgeKind::Link)
        .expect("link");
    session.delete_node(built.ask).expect("delete");

    // The container counts as regular content for later edits.
    let stats = session.stats();
    assert!(stats.entry_count >= 2);
    assert_eq!(session.orphan_count(), 0);
}
