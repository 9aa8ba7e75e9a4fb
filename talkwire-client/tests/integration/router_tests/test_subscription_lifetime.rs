use std::sync::Arc;
use talkwire_client::{ChannelListener, Dispatch, SignalingRouter};
use talkwire_core::{InboundEnvelope, StreamKind};
use tokio::sync::mpsc;

use crate::integration::init_tracing;
use crate::utils::{offer, sid};

#[tokio::test]
async fn test_dropping_subscription_unregisters() {
    init_tracing();

    let router = SignalingRouter::new(sid("me"));
    let (tx, _rx) = mpsc::unbounded_channel();
    let listener = Arc::new(ChannelListener(tx));

    let subscription = router.add_listener(listener, sid("a"), Some(StreamKind::Video));
    assert!(subscription.is_active());
    assert!(router.has_listener(&sid("a"), Some(StreamKind::Video)));

    subscription.unsubscribe();
    assert!(!router.has_listener(&sid("a"), Some(StreamKind::Video)));
    assert_eq!(
        router.process(InboundEnvelope::Signal(offer("a", "me", "sdp"))),
        Dispatch::Dropped
    );
}

#[tokio::test]
async fn test_stale_subscription_keeps_newer_registration() {
    init_tracing();

    let router = SignalingRouter::new(sid("me"));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = Arc::new(ChannelListener(tx));

    let old = router.add_listener(listener.clone(), sid("a"), Some(StreamKind::Video));
    let new = router.add_listener(listener, sid("a"), Some(StreamKind::Video));
    assert!(!old.is_active(), "Replaced registration should be inactive");
    assert!(new.is_active());

    drop(old);
    assert!(new.is_active(), "Dropping the old handle must not remove the new one");
    assert_eq!(
        router.process(InboundEnvelope::Signal(offer("a", "me", "sdp"))),
        Dispatch::Scoped
    );
    assert!(rx.try_recv().is_ok());
}

#[tokio::test]
async fn test_remove_listener_is_idempotent() {
    init_tracing();

    let router = SignalingRouter::new(sid("me"));
    let (tx, _rx) = mpsc::unbounded_channel();
    let subscription = router.add_listener(Arc::new(ChannelListener(tx)), sid("a"), None);

    router.remove_listener(&sid("a"), None);
    router.remove_listener(&sid("a"), None);
    assert!(!subscription.is_active());
    assert!(!router.has_listener(&sid("a"), None));

    // The handle outliving its registration is harmless.
    drop(subscription);
}

#[tokio::test]
async fn test_subscription_outliving_router() {
    init_tracing();

    let router = SignalingRouter::new(sid("me"));
    let (tx, _rx) = mpsc::unbounded_channel();
    let subscription = router.set_fallback_listener(Arc::new(ChannelListener(tx)));

    drop(router);
    assert!(!subscription.is_active());
    drop(subscription);
}
