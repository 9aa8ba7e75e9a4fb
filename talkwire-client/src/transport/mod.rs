mod backoff;
mod polling;
mod relay;
mod transport_event;
mod ws_connector;

pub use backoff::*;
pub use polling::*;
pub use relay::*;
pub use transport_event::*;
pub use ws_connector::*;

use crate::error::TransportError;
use async_trait::async_trait;
use talkwire_core::{SessionId, SignalingMessage};
use tokio::sync::mpsc;

/// Delivers inbound envelopes and accepts outbound signaling messages.
///
/// Inbound traffic and connection health are reported on the channel handed
/// to [`SignalingTransport::connect`], in arrival order.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Starts the transport. Returns the session id assigned by the relay,
    /// if the transport assigns one.
    async fn connect(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Option<SessionId>, TransportError>;

    async fn send(&self, message: SignalingMessage) -> Result<(), TransportError>;

    /// Stops every background loop. Idempotent.
    async fn close(&self);
}
