//! Cascade-delete behavior driven through the session interface.

use std::collections::BTreeSet;

use aurora_dlg::{
    compute_cascade_set, reachable_from_starts, DlgError, EdgeKind, EditSession, EditorLimits,
    NodeId,
};

mod common;
use common::{branching_dialog, deep_chain_session, session_with};

#[test]
fn deleting_a_branch_drops_exactly_its_closure() {
    let built = branching_dialog();
    let mut session = session_with(built.dialog);

    let outcome = session.delete_node(built.ask).expect("delete");
    // `explain` hangs only off `ask`, so it goes too; `leave` stays.
    assert_eq!(
        outcome.removed,
        [built.ask, built.explain].into_iter().collect::<BTreeSet<_>>()
    );
    assert!(session.dialog().node(built.leave).is_some());
    assert!(session.dialog().node(built.greet).is_some());
    assert!(session.registry().is_consistent(session.dialog()));
}

#[test]
fn pure_computation_matches_applied_deletion() {
    let built = branching_dialog();
    let expected = compute_cascade_set(&built.dialog, built.ask);
    let mut session = session_with(built.dialog);
    let outcome = session.delete_node(built.ask).expect("delete");
    assert_eq!(outcome.removed, expected);
}

#[test]
fn shared_node_survives_until_its_last_parent_goes() {
    // Entry A --tree--> Reply S, Entry B --link--> S.
    let mut session = EditSession::new(EditorLimits::default());
    let a = session.add_entry();
    let b = session.add_entry();
    let s = session.add_reply();
    session.add_start(a).expect("start");
    session.add_start(b).expect("start");
    session.add_pointer(a, s, EdgeKind::Tree).expect("tree");
    session.add_pointer(b, s, EdgeKind::Link).expect("link");

    // Deleting A alone preserves S.
    session.delete_node(a).expect("delete");
    assert!(session.dialog().node(s).is_some());

    // Deleting B afterwards removes S with it.
    let outcome = session.delete_node(b).expect("delete");
    assert!(outcome.removed.contains(&s));
    assert_eq!(session.dialog().node_count(), 0);
}

#[test]
fn deep_chain_cascade_is_stack_safe() {
    let (mut session, root) = deep_chain_session(600);
    let outcome = session.delete_node(root).expect("delete");
    assert_eq!(outcome.removed.len(), 601);
    assert_eq!(session.dialog().node_count(), 0);
    assert!(session.dialog().starts().is_empty());
}

#[test]
fn survivors_are_reachable_or_housed_after_any_delete() {
    let built = branching_dialog();
    let mut session = session_with(built.dialog);
    session.delete_node(built.ask).expect("delete");

    let reachable = reachable_from_starts(session.dialog(), false);
    let housed = aurora_dlg::container_subtree(session.dialog());
    for id in session.dialog().node_ids().collect::<Vec<_>>() {
        assert!(
            reachable.contains(&id) || housed.contains(&id),
            "{id:?} is stranded"
        );
    }
}

#[test]
fn unknown_node_fails_closed() {
    let built = branching_dialog();
    let mut session = session_with(built.dialog);
    let before = aurora_dlg::dialog_to_gff(session.dialog()).expect("project");

    let ghost = NodeId::from_raw(4096);
    assert!(matches!(
        session.delete_node(ghost),
        Err(DlgError::UnknownNode(_))
    ));
    let after = aurora_dlg::dialog_to_gff(session.dialog()).expect("project");
    assert_eq!(before, after);
    assert!(!session.can_undo(), "a rejected delete records no snapshot");
}

#[test]
fn outcome_reports_dropped_pointer_count() {
    let built = branching_dialog();
    let mut session = session_with(built.dialog);
    // greet->ask and explain->ask both die with the subtree; greet->ask is
    // inside the removed closure's inbound set.
    let outcome = session.delete_node(built.ask).expect("delete");
    assert_eq!(outcome.dropped_pointers, 1);
}
