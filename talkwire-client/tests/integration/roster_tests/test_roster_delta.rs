use talkwire_client::{CallTransitions, RosterDelta, UpdatedEntry};
use talkwire_core::InCallFlags;

use crate::utils::{idle, in_call, in_call_silent, sid};

#[test]
fn test_delta_partitions_both_snapshots() {
    let old = vec![in_call("a"), in_call_silent("b"), in_call("c")];
    let new = vec![in_call("b"), in_call("c"), in_call("d")];

    let delta = RosterDelta::compute(&old, &new);

    assert_eq!(delta.joined, vec![in_call("d")]);
    assert_eq!(
        delta.updated,
        vec![UpdatedEntry {
            previous: in_call_silent("b"),
            current: in_call("b"),
        }]
    );
    assert_eq!(delta.left, vec![in_call("a")]);
    assert_eq!(delta.unchanged, vec![in_call("c")]);
    assert_eq!(delta.len(), 4);
    assert!(!delta.is_empty());
}

#[test]
fn test_identical_snapshots_give_empty_delta() {
    let snapshot = vec![in_call("a"), idle("b")];
    let delta = RosterDelta::compute(&snapshot, &snapshot);

    assert!(delta.is_empty());
    assert_eq!(delta.unchanged.len(), 2);
}

#[test]
fn test_initial_delta_reports_everyone_joined() {
    let snapshot = vec![in_call("a"), idle("b")];
    let delta = RosterDelta::initial(&snapshot);

    assert_eq!(delta.joined, snapshot);
    assert!(delta.updated.is_empty() && delta.left.is_empty());
}

#[test]
fn test_display_name_change_is_an_update_without_transition() {
    let old = vec![in_call("a").with_user("alice", "Alice")];
    let new = vec![in_call("a").with_user("alice", "Alice Liddell")];

    let delta = RosterDelta::compute(&old, &new);
    assert_eq!(delta.updated.len(), 1);

    let transitions = delta.call_transitions(&sid("me"));
    assert!(transitions.entered.is_empty());
    assert!(transitions.exited.is_empty());
    assert!(transitions.started_publishing.is_empty());
}

#[test]
fn test_call_transitions() {
    let old = vec![
        in_call("me"),
        idle("joining"),
        in_call("leaving-call"),
        in_call_silent("unmuting"),
        in_call("gone"),
    ];
    let new = vec![
        idle("me"),
        in_call("joining"),
        idle("leaving-call"),
        in_call("unmuting"),
        in_call("fresh"),
        idle("fresh-idle"),
    ];

    let transitions = RosterDelta::compute(&old, &new).call_transitions(&sid("me"));

    let entered: Vec<_> = transitions
        .entered
        .iter()
        .map(|e| e.session_id.clone())
        .collect();
    assert_eq!(entered, vec![sid("fresh"), sid("joining")]);
    assert_eq!(transitions.exited, vec![sid("leaving-call"), sid("gone")]);
    assert_eq!(transitions.started_publishing, vec![in_call("unmuting")]);
}

#[test]
fn test_local_session_never_transitions() {
    let old = vec![idle("me")];
    let new = vec![talkwire_core::RosterEntry::new(
        "me",
        InCallFlags::IN_CALL | InCallFlags::WITH_VIDEO,
    )];

    let transitions = RosterDelta::compute(&old, &new).call_transitions(&sid("me"));
    assert_eq!(transitions, CallTransitions::default());
}
