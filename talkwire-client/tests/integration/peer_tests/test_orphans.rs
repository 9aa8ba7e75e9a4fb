use talkwire_client::{PeerUpdate, RosterDelta, Topology};
use talkwire_core::PeerKey;

use crate::integration::{PeerHarness, init_tracing};
use crate::utils::{in_call, offer, sid};

#[tokio::test]
async fn test_offer_before_roster_entry_is_orphaned() {
    init_tracing();

    let mut h = PeerHarness::new(Topology::Mesh, "200");
    let key = PeerKey::video(sid("stranger"));

    let update = h
        .manager
        .handle_signal(offer("stranger", "200", "sdp"), false)
        .await
        .expect("Offer handling failed");
    assert_eq!(update, Some(PeerUpdate::Orphaned(key.clone())));
    assert!(h.manager.connection(&key).is_some_and(|m| m.is_orphan()));

    assert!(h.manager.expire_orphan(&key).await);
    assert!(!h.manager.contains(&key));
    assert!(!h.engine.is_live(&key));
}

#[tokio::test]
async fn test_roster_entry_adopts_orphan() {
    init_tracing();

    let mut h = PeerHarness::new(Topology::Mesh, "200");
    let key = PeerKey::video(sid("stranger"));
    h.manager
        .handle_signal(offer("stranger", "200", "sdp"), false)
        .await
        .expect("Offer handling failed");

    h.manager
        .on_roster_delta(&RosterDelta::initial(&[in_call("200"), in_call("stranger")]))
        .await
        .expect("Roster delta failed");

    assert!(h.manager.connection(&key).is_some_and(|m| !m.is_orphan()));
    assert!(!h.manager.expire_orphan(&key).await);
    assert!(h.manager.contains(&key));
}

#[tokio::test]
async fn test_known_sender_is_not_orphaned() {
    init_tracing();

    let mut h = PeerHarness::new(Topology::Mesh, "200");
    let update = h
        .manager
        .handle_signal(offer("300", "200", "sdp"), true)
        .await
        .expect("Offer handling failed");

    assert_eq!(update, None);
    assert!(
        h.manager
            .connection(&PeerKey::video(sid("300")))
            .is_some_and(|m| !m.is_orphan())
    );
}
