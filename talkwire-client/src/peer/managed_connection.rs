use crate::peer::engine_event::ConnectionRef;
use crate::peer::media_engine::MediaConnection;
use crate::peer::negotiation::{Negotiation, NegotiationState};
use crate::signaling::Subscription;
use talkwire_core::PeerKey;

/// A live media connection together with its negotiation state and router
/// registration.
pub struct ManagedConnection {
    pub(crate) key: PeerKey,
    pub(crate) generation: u64,
    pub(crate) publisher: bool,
    pub(crate) offerer: bool,
    pub(crate) orphan: bool,
    pub(crate) negotiation: Negotiation,
    pub(crate) connection: Box<dyn MediaConnection>,
    pub(crate) subscription: Option<Subscription>,
}

impl ManagedConnection {
    pub fn key(&self) -> &PeerKey {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn connection_ref(&self) -> ConnectionRef {
        ConnectionRef {
            key: self.key.clone(),
            generation: self.generation,
        }
    }

    pub fn is_publisher(&self) -> bool {
        self.publisher
    }

    pub fn is_offerer(&self) -> bool {
        self.offerer
    }

    /// Created for a session that was not in the roster yet.
    pub fn is_orphan(&self) -> bool {
        self.orphan
    }

    pub fn state(&self) -> NegotiationState {
        self.negotiation.state()
    }

    /// Whether the router still delivers messages for this key to us.
    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(|s| s.is_active())
    }
}
