use talkwire_client::{CallEvent, CallState, next_state};

const EVENTS: [CallEvent; 13] = [
    CallEvent::JoinAccepted,
    CallEvent::RingingTimeout,
    CallEvent::OthersActive,
    CallEvent::UserRetry,
    CallEvent::EndedRemotely,
    CallEvent::PublisherConnectionFailed,
    CallEvent::AutoRetry,
    CallEvent::TransportLostWithoutResume,
    CallEvent::TransportInterrupted,
    CallEvent::TransportResumed {
        others_active: true,
    },
    CallEvent::TransportResumed {
        others_active: false,
    },
    CallEvent::RejoinFailed,
    CallEvent::Hangup,
];

#[test]
fn test_leaving_absorbs_everything() {
    for event in EVENTS {
        assert_eq!(next_state(CallState::Leaving, &event), None, "{:?}", event);
    }
}

#[test]
fn test_global_rows() {
    for state in CallState::ALL {
        if state.is_terminal() {
            continue;
        }
        assert_eq!(
            next_state(state, &CallEvent::Hangup),
            Some(CallState::Leaving)
        );
        assert_eq!(
            next_state(state, &CallEvent::PublisherConnectionFailed),
            Some(CallState::PublisherFailed)
        );
        assert_eq!(
            next_state(state, &CallEvent::TransportLostWithoutResume),
            Some(CallState::Reconnecting)
        );
    }
}

#[test]
fn test_specific_rows() {
    use CallEvent as E;
    use CallState as S;

    let rows = [
        (S::Connecting, E::JoinAccepted, S::Joined),
        (S::Reconnecting, E::JoinAccepted, S::Joined),
        (S::Reconnecting, E::RejoinFailed, S::Leaving),
        (S::Joined, E::RingingTimeout, S::CallingTimeout),
        (S::Joined, E::OthersActive, S::InConversation),
        (S::CallingTimeout, E::UserRetry, S::Reconnecting),
        (S::PublisherFailed, E::AutoRetry, S::Reconnecting),
        (S::Joined, E::EndedRemotely, S::Leaving),
        (S::InConversation, E::EndedRemotely, S::Leaving),
        (S::Joined, E::TransportInterrupted, S::Offline),
        (S::InConversation, E::TransportInterrupted, S::Offline),
        (
            S::Offline,
            E::TransportResumed {
                others_active: true,
            },
            S::InConversation,
        ),
        (
            S::Offline,
            E::TransportResumed {
                others_active: false,
            },
            S::Joined,
        ),
    ];
    for (from, event, to) in rows {
        assert_eq!(
            next_state(from, &event),
            Some(to),
            "{} --{:?}-->",
            from,
            event
        );
    }
}

#[test]
fn test_everything_else_is_ignored() {
    use CallEvent as E;
    use CallState as S;

    let ignored = [
        (S::Connecting, E::RingingTimeout),
        (S::Connecting, E::OthersActive),
        (S::InConversation, E::RingingTimeout),
        (S::InConversation, E::OthersActive),
        (S::CallingTimeout, E::OthersActive),
        (S::CallingTimeout, E::AutoRetry),
        (S::PublisherFailed, E::UserRetry),
        (S::Joined, E::JoinAccepted),
        (S::Connecting, E::EndedRemotely),
        (S::Reconnecting, E::EndedRemotely),
        (S::Offline, E::OthersActive),
        (S::Connecting, E::TransportInterrupted),
        (
            S::Joined,
            E::TransportResumed {
                others_active: true,
            },
        ),
        (S::Joined, E::RejoinFailed),
    ];
    for (state, event) in ignored {
        assert_eq!(next_state(state, &event), None, "{} --{:?}-->", state, event);
    }
}

#[test]
fn test_table_is_total() {
    for state in CallState::ALL {
        for event in EVENTS {
            if let Some(next) = next_state(state, &event) {
                assert!(CallState::ALL.contains(&next));
            }
        }
    }
}
