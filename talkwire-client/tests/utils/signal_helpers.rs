use std::sync::{Arc, Mutex};
use std::time::Duration;
use talkwire_core::{
    IceCandidate, InCallFlags, InboundEnvelope, RosterEntry, SessionId, SignalPayload,
    SignalingMessage, StreamKind,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Timeout for anything the code under test should produce right away (ms).
pub const SIGNAL_TIMEOUT_MS: u64 = 2000;

/// Ordered record of side effects shared between several test doubles.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn new_event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn sid(id: &str) -> SessionId {
    SessionId::from(id)
}

/// Roster entry in the call, publishing audio.
pub fn in_call(id: &str) -> RosterEntry {
    RosterEntry::new(id, InCallFlags::IN_CALL | InCallFlags::WITH_AUDIO)
}

/// Roster entry in the call without any media.
pub fn in_call_silent(id: &str) -> RosterEntry {
    RosterEntry::new(id, InCallFlags::IN_CALL)
}

/// Roster entry present in the room but not in the call.
pub fn idle(id: &str) -> RosterEntry {
    RosterEntry::new(id, InCallFlags::DISCONNECTED)
}

pub fn signal(from: &str, to: &str, kind: StreamKind, payload: SignalPayload) -> SignalingMessage {
    SignalingMessage {
        from: Some(sid(from)),
        to: Some(sid(to)),
        kind,
        sid: None,
        payload,
    }
}

pub fn offer(from: &str, to: &str, sdp: &str) -> SignalingMessage {
    signal(
        from,
        to,
        StreamKind::Video,
        SignalPayload::Offer {
            sdp: sdp.to_owned(),
            nick: None,
        },
    )
}

pub fn answer(from: &str, to: &str, sdp: &str) -> SignalingMessage {
    signal(
        from,
        to,
        StreamKind::Video,
        SignalPayload::Answer {
            sdp: sdp.to_owned(),
            nick: None,
        },
    )
}

pub fn candidate(from: &str, to: &str, candidate: &str) -> SignalingMessage {
    signal(
        from,
        to,
        StreamKind::Video,
        SignalPayload::Candidate(IceCandidate {
            sdp_mid: Some("0".to_owned()),
            sdp_m_line_index: Some(0),
            candidate: candidate.to_owned(),
        }),
    )
}

pub fn roster(entries: Vec<RosterEntry>) -> InboundEnvelope {
    InboundEnvelope::Roster(entries)
}

/// Receives one item or fails the test after [`SIGNAL_TIMEOUT_MS`].
pub async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_millis(SIGNAL_TIMEOUT_MS), rx.recv())
        .await
        .expect("Timed out waiting for item")
        .expect("Channel closed")
}

/// Asserts nothing arrives for a short while.
pub async fn assert_quiet<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    let result = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(result.is_err(), "Expected no item, got {:?}", result);
}

/// Lets spawned tasks run until they are all blocked again.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Asserts `expected` passed since `start`, within timer resolution.
pub fn assert_elapsed(start: Instant, expected: Duration) {
    assert_gap(start.elapsed(), expected);
}

pub fn assert_gap(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(10),
        "Expected {:?}, got {:?}",
        expected,
        actual
    );
}
