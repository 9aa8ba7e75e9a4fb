use std::sync::{Arc, Mutex};
use talkwire_client::{Dispatch, RosterUpdate, SignalingRouter};
use talkwire_core::InboundEnvelope;

use crate::integration::init_tracing;
use crate::utils::{in_call, roster, sid};

#[tokio::test]
async fn test_roster_reaches_every_roster_listener() {
    init_tracing();

    let router = SignalingRouter::new(sid("me"));
    let seen: Arc<Mutex<Vec<(u8, RosterUpdate)>>> = Arc::new(Mutex::new(Vec::new()));

    let first = {
        let seen = seen.clone();
        router.add_roster_listener(Arc::new(move |update: RosterUpdate| {
            seen.lock().unwrap().push((1, update));
        }))
    };
    let _second = {
        let seen = seen.clone();
        router.add_roster_listener(Arc::new(move |update: RosterUpdate| {
            seen.lock().unwrap().push((2, update));
        }))
    };

    let entries = vec![in_call("me"), in_call("a")];
    assert_eq!(
        router.process(roster(entries.clone())),
        Dispatch::Roster { listeners: 2 }
    );
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert!(
        seen.lock()
            .unwrap()
            .iter()
            .all(|(_, u)| *u == RosterUpdate::Snapshot(entries.clone()))
    );

    drop(first);
    seen.lock().unwrap().clear();
    assert_eq!(
        router.process(InboundEnvelope::CallEndedForEveryone),
        Dispatch::Roster { listeners: 1 }
    );
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(2, RosterUpdate::EndedForEveryone)]
    );
}

#[tokio::test]
async fn test_session_envelopes_are_ignored() {
    init_tracing();

    let router = SignalingRouter::new(sid("me"));
    let welcome = InboundEnvelope::Welcome {
        session_id: sid("me"),
        resume_id: Some("r".to_owned()),
    };
    assert_eq!(router.process(welcome), Dispatch::Ignored);
    assert_eq!(
        router.process(InboundEnvelope::Bye { reason: None }),
        Dispatch::Ignored
    );
}
