use std::time::Duration;
use talkwire_client::{CallConfig, CallState, IceConnectionState, LocalMedia};
use talkwire_core::{
    ControlSignal, InCallFlags, InboundEnvelope, MediaKind, PeerKey, SignalPayload,
    StatusMessage, StreamKind,
};

use super::{converse, wait_state, wait_view};
use crate::integration::{init_tracing, start_call, start_call_with};
use crate::utils::{
    EngineCall, FakeEngine, MockBackend, MockTransport, assert_quiet, in_call_silent,
    new_event_log, offer, recv_within, roster, sid, signal,
};

fn statuses_sent(engine: &FakeEngine, key: &PeerKey) -> Vec<StatusMessage> {
    engine
        .calls_for(key)
        .into_iter()
        .filter_map(|call| match call {
            EngineCall::SendData(data) => StatusMessage::decode(&data).ok(),
            _ => None,
        })
        .collect()
}

fn control(from: &str, to: &str, control: ControlSignal) -> InboundEnvelope {
    InboundEnvelope::Signal(signal(
        from,
        to,
        StreamKind::Video,
        SignalPayload::Control(control),
    ))
}

#[tokio::test]
async fn test_view_follows_connection_and_data_channel() {
    init_tracing();

    let mut call = start_call(CallConfig::default(), "200");
    converse(&mut call, "200", "100").await;
    let key = PeerKey::video(sid("100"));

    let view = wait_view(&call.handle, "100", |v| !v.connected).await;
    assert!(view.audio_enabled);
    assert!(!view.video_enabled);
    assert!(!call.handle.participants().borrow().contains_key(&sid("200")));

    call.engine
        .ice_state(&key, IceConnectionState::Connected)
        .await;
    wait_view(&call.handle, "100", |v| v.connected).await;

    call.engine.data(&key, br#"{"type":"speaking"}"#).await;
    wait_view(&call.handle, "100", |v| v.speaking).await;

    call.engine.data(&key, b"not json").await;
    call.engine.data(&key, br#"{"type":"audioOff"}"#).await;
    let view = wait_view(&call.handle, "100", |v| !v.audio_enabled).await;
    assert!(!view.speaking);

    // Local media is announced once the connection is up.
    assert_eq!(
        statuses_sent(&call.engine, &key),
        vec![StatusMessage::AudioOn, StatusMessage::VideoOff]
    );

    call.handle.hangup().await.expect("Hangup failed");
    call.task.await.expect("Call task panicked");
}

#[tokio::test]
async fn test_control_signals_update_view() {
    init_tracing();

    let mut call = start_call(CallConfig::default(), "200");
    converse(&mut call, "200", "100").await;

    call.transport
        .deliver(control(
            "100",
            "200",
            ControlSignal::RaiseHand {
                state: true,
                timestamp: Some(1_700_000_000_000),
            },
        ))
        .await;
    wait_view(&call.handle, "100", |v| v.hand_raised).await;

    call.transport
        .deliver(control(
            "100",
            "200",
            ControlSignal::Mute {
                media: MediaKind::Audio,
            },
        ))
        .await;
    call.transport
        .deliver(control(
            "100",
            "200",
            ControlSignal::NickChanged {
                name: "Alice".to_owned(),
            },
        ))
        .await;
    let view = wait_view(&call.handle, "100", |v| v.display_name == "Alice").await;
    assert!(!view.audio_enabled);
    assert!(view.hand_raised);

    call.handle.hangup().await.expect("Hangup failed");
    call.task.await.expect("Call task panicked");
}

#[tokio::test]
async fn test_local_commands_reach_peers() {
    init_tracing();

    let mut call = start_call(CallConfig::default(), "200");
    converse(&mut call, "200", "100").await;
    let key = PeerKey::video(sid("100"));

    call.handle
        .set_local_media(true, true)
        .await
        .expect("Command failed");
    call.handle.raise_hand(true).await.expect("Command failed");

    let raised = recv_within(&mut call.sent_rx).await;
    assert_eq!(raised.to, Some(sid("100")));
    assert!(matches!(
        raised.payload,
        SignalPayload::Control(ControlSignal::RaiseHand { state: true, .. })
    ));

    let camera = LocalMedia {
        audio: true,
        video: true,
    };
    assert!(call.engine.calls_for(&key).contains(&EngineCall::Attach(camera)));
    assert_eq!(
        statuses_sent(&call.engine, &key),
        vec![StatusMessage::VideoOn]
    );

    call.handle.hangup().await.expect("Hangup failed");
    call.task.await.expect("Call task panicked");
}

#[tokio::test]
async fn test_failed_camera_connection_drops_participant() {
    init_tracing();

    let mut call = start_call(CallConfig::default(), "200");
    converse(&mut call, "200", "100").await;
    let video = PeerKey::video(sid("100"));
    let screen = PeerKey::screen(sid("100"));

    let mut screen_offer = offer("100", "200", "screen-sdp");
    screen_offer.kind = StreamKind::Screen;
    call.transport
        .deliver(InboundEnvelope::Signal(screen_offer))
        .await;
    let answer = recv_within(&mut call.sent_rx).await;
    assert_eq!(answer.kind, StreamKind::Screen);
    assert!(call.engine.is_live(&screen));

    call.engine.ice_state(&video, IceConnectionState::Failed).await;
    let mut views = call.handle.participants();
    tokio::time::timeout(
        Duration::from_secs(5),
        views.wait_for(|v| !v.contains_key(&sid("100"))),
    )
    .await
    .expect("View of 100 was never removed")
    .expect("Participant publisher dropped");

    assert!(!call.engine.is_live(&video));
    assert!(!call.engine.is_live(&screen));
    assert_eq!(call.handle.state(), CallState::InConversation);

    call.handle.hangup().await.expect("Hangup failed");
    call.task.await.expect("Call task panicked");
}

#[tokio::test]
async fn test_starting_media_connects_silent_call() {
    init_tracing();

    let log = new_event_log();
    let (transport, sent_rx) = MockTransport::new(log.clone());
    let mut call = start_call_with(
        CallConfig::default(),
        "200",
        FakeEngine::new(log.clone()).with_capabilities(false, false),
        transport,
        sent_rx,
        MockBackend::new(log.clone()),
        log,
    );
    wait_state(&call.handle, CallState::Joined).await;
    assert_eq!(call.backend.joins(), vec![InCallFlags::IN_CALL]);

    call.transport
        .deliver(roster(vec![in_call_silent("200"), in_call_silent("100")]))
        .await;
    wait_state(&call.handle, CallState::InConversation).await;
    assert_quiet(&mut call.sent_rx).await;
    assert_eq!(call.engine.live_count(), 0);

    call.handle
        .set_local_media(true, false)
        .await
        .expect("Command failed");
    let offer = recv_within(&mut call.sent_rx).await;
    assert_eq!(offer.to, Some(sid("100")));
    assert_eq!(offer.from, Some(sid("200")));
    assert!(matches!(offer.payload, SignalPayload::Offer { .. }));
    assert!(call.engine.is_live(&PeerKey::video(sid("100"))));

    call.handle.hangup().await.expect("Hangup failed");
    call.task.await.expect("Call task panicked");
}
