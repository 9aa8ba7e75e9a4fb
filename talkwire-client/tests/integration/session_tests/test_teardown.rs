use talkwire_client::{CallConfig, CallState, LeaveReason};
use talkwire_core::InboundEnvelope;

use super::{converse, wait_state};
use crate::integration::{init_tracing, start_call};
use crate::utils::{assert_quiet, in_call, offer, roster};

#[tokio::test]
async fn test_teardown_order() {
    init_tracing();

    let mut call = start_call(CallConfig::default(), "200");
    converse(&mut call, "200", "100").await;

    call.handle.hangup().await.expect("Hangup failed");
    assert_eq!(
        call.task.await.expect("Call task panicked"),
        LeaveReason::Hangup
    );

    let log = call.log.lock().unwrap().clone();
    let start = log
        .iter()
        .position(|entry| entry == "transport close")
        .expect("Transport never closed");
    assert_eq!(
        &log[start..],
        &["transport close", "close 100/video", "backend leave"]
    );
    assert!(call.transport.is_closed());
    assert_eq!(call.engine.live_count(), 0);
    assert_eq!(call.handle.state(), CallState::Leaving);
    assert!(call.handle.participants().borrow().is_empty());
}

#[tokio::test]
async fn test_left_call_ignores_traffic() {
    init_tracing();

    let mut call = start_call(CallConfig::default(), "200");
    wait_state(&call.handle, CallState::Joined).await;
    call.handle.hangup().await.expect("Hangup failed");
    call.task.await.expect("Call task panicked");

    call.transport
        .deliver(roster(vec![in_call("200"), in_call("100")]))
        .await;
    call.transport
        .deliver(InboundEnvelope::Signal(offer("300", "200", "sdp")))
        .await;
    assert_quiet(&mut call.sent_rx).await;
    assert_eq!(call.engine.live_count(), 0);
    assert_eq!(call.handle.state(), CallState::Leaving);
    assert!(call.handle.hangup().await.is_err());
}
