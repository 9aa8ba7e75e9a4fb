use talkwire_client::{LocalMedia, RosterDelta, SdpKind, Topology};
use talkwire_core::PeerKey;

use crate::integration::{PeerHarness, init_tracing};
use crate::utils::{EngineCall, answer, candidate, in_call, sid};

async fn offering_to_100() -> PeerHarness {
    let mut h = PeerHarness::new(Topology::Mesh, "200");
    h.manager
        .set_local_media(LocalMedia {
            audio: true,
            video: true,
        })
        .await;
    h.manager
        .on_roster_delta(&RosterDelta::initial(&[in_call("200"), in_call("100")]))
        .await
        .expect("Roster delta failed");
    h
}

fn negotiation_calls(calls: Vec<EngineCall>) -> Vec<EngineCall> {
    calls
        .into_iter()
        .filter(|c| matches!(c, EngineCall::SetRemote(..) | EngineCall::AddCandidate(_)))
        .collect()
}

#[tokio::test]
async fn test_early_candidates_wait_for_remote_description() {
    init_tracing();

    let mut h = offering_to_100().await;
    let key = PeerKey::video(sid("100"));

    for c in ["cand-1", "cand-2"] {
        h.manager
            .handle_signal(candidate("100", "200", c), true)
            .await
            .expect("Candidate handling failed");
    }
    assert!(negotiation_calls(h.engine.calls_for(&key)).is_empty());

    h.manager
        .handle_signal(answer("100", "200", "sdp-answer"), true)
        .await
        .expect("Answer handling failed");
    h.manager
        .handle_signal(candidate("100", "200", "cand-3"), true)
        .await
        .expect("Candidate handling failed");

    assert_eq!(
        negotiation_calls(h.engine.calls_for(&key)),
        vec![
            EngineCall::SetRemote(SdpKind::Answer, "sdp-answer".to_owned()),
            EngineCall::AddCandidate("cand-1".to_owned()),
            EngineCall::AddCandidate("cand-2".to_owned()),
            EngineCall::AddCandidate("cand-3".to_owned()),
        ]
    );
}

#[tokio::test]
async fn test_second_answer_is_ignored() {
    init_tracing();

    let mut h = offering_to_100().await;
    let key = PeerKey::video(sid("100"));

    h.manager
        .handle_signal(answer("100", "200", "first"), true)
        .await
        .expect("Answer handling failed");
    h.manager
        .handle_signal(answer("100", "200", "second"), true)
        .await
        .expect("Answer handling failed");

    assert_eq!(
        negotiation_calls(h.engine.calls_for(&key)),
        vec![EngineCall::SetRemote(SdpKind::Answer, "first".to_owned())]
    );
}

#[tokio::test]
async fn test_candidate_for_unknown_connection_is_dropped() {
    init_tracing();

    let mut h = PeerHarness::new(Topology::Mesh, "200");
    h.manager
        .handle_signal(candidate("100", "200", "cand-1"), true)
        .await
        .expect("Candidate handling failed");

    assert!(h.manager.is_empty());
    assert!(h.engine.calls().is_empty());
}
