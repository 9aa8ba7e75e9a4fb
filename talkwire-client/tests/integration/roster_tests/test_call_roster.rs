use talkwire_client::{CallRoster, RosterOutcome};

use crate::integration::init_tracing;
use crate::utils::{idle, in_call, sid};

fn delta(outcome: RosterOutcome) -> std::sync::Arc<talkwire_client::RosterDelta> {
    match outcome {
        RosterOutcome::Delta(delta) => delta,
        RosterOutcome::EndedRemotely => panic!("Unexpected remote end"),
    }
}

#[tokio::test]
async fn test_second_participant_joins() {
    init_tracing();

    let mut roster = CallRoster::new();
    let mut deltas = roster.subscribe();
    let me = sid("a");

    let first = delta(roster.apply(vec![in_call("a")], &me, true));
    assert_eq!(first.joined, vec![in_call("a")]);
    assert!(!roster.has_others_in_call(&me));

    let second = delta(roster.apply(vec![in_call("a"), in_call("b")], &me, true));
    assert_eq!(second.joined, vec![in_call("b")]);
    assert_eq!(second.unchanged, vec![in_call("a")]);
    assert!(roster.has_others_in_call(&me));

    let published = deltas.recv().await.expect("First delta");
    assert_eq!(published.joined.len(), 1);
    let published = deltas.recv().await.expect("Second delta");
    assert_eq!(published, second);
}

#[tokio::test]
async fn test_empty_delta_is_not_published() {
    init_tracing();

    let mut roster = CallRoster::new();
    let mut deltas = roster.subscribe();
    let me = sid("a");

    roster.apply(vec![in_call("a")], &me, true);
    let repeat = delta(roster.apply(vec![in_call("a")], &me, true));
    assert!(repeat.is_empty());

    deltas.recv().await.expect("First delta");
    assert!(deltas.try_recv().is_err(), "Empty delta must not be published");
}

#[tokio::test]
async fn test_local_drop_out_ends_call_remotely() {
    init_tracing();

    let mut roster = CallRoster::new();
    let me = sid("me");

    delta(roster.apply(vec![in_call("me"), in_call("b")], &me, true));
    let outcome = roster.apply(vec![in_call("b")], &me, true);
    assert_eq!(outcome, RosterOutcome::EndedRemotely);
}

#[tokio::test]
async fn test_local_flag_cleared_ends_call_remotely() {
    init_tracing();

    let mut roster = CallRoster::new();
    let me = sid("me");

    delta(roster.apply(vec![in_call("me")], &me, true));
    let outcome = roster.apply(vec![idle("me")], &me, true);
    assert_eq!(outcome, RosterOutcome::EndedRemotely);
}

#[tokio::test]
async fn test_absence_before_joining_is_not_a_remote_end() {
    init_tracing();

    let mut roster = CallRoster::new();
    let me = sid("me");

    // Never seen in call yet.
    delta(roster.apply(vec![in_call("b")], &me, true));
    delta(roster.apply(vec![in_call("b"), in_call("c")], &me, true));

    // Seen in call, but the session no longer believes it is joined.
    delta(roster.apply(vec![in_call("me")], &me, true));
    delta(roster.apply(vec![in_call("b")], &me, false));
}

#[tokio::test]
async fn test_duplicate_entries_keep_the_first() {
    init_tracing();

    let mut roster = CallRoster::new();
    let me = sid("me");

    let first = delta(roster.apply(vec![in_call("b"), idle("b"), in_call("c")], &me, false));
    assert_eq!(first.joined, vec![in_call("b"), in_call("c")]);
    assert_eq!(roster.entries().len(), 2);
    assert_eq!(roster.get(&sid("b")), Some(&in_call("b")));

    roster.reset();
    assert!(roster.entries().is_empty());
    let again = delta(roster.apply(vec![in_call("c")], &me, false));
    assert_eq!(again.joined, vec![in_call("c")]);
}
