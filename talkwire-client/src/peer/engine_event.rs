use crate::peer::media_engine::IceConnectionState;
use bytes::Bytes;
use talkwire_core::{IceCandidate, PeerKey};

/// Identifies one connection instance. The generation tells apart successive
/// connections created for the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionRef {
    pub key: PeerKey,
    pub generation: u64,
}

/// Callbacks of the media engine, posted to the call session.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    LocalCandidate(ConnectionRef, IceCandidate),
    CandidatesComplete(ConnectionRef),
    IceStateChanged(ConnectionRef, IceConnectionState),
    DataChannelMessage(ConnectionRef, Bytes),
}

impl EngineEvent {
    pub fn connection(&self) -> &ConnectionRef {
        match self {
            EngineEvent::LocalCandidate(conn, _)
            | EngineEvent::CandidatesComplete(conn)
            | EngineEvent::IceStateChanged(conn, _)
            | EngineEvent::DataChannelMessage(conn, _) => conn,
        }
    }
}
