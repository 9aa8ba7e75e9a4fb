use crate::transport::SignalingTransport;
use async_trait::async_trait;
use std::sync::Arc;
use talkwire_core::SignalingMessage;
use tracing::warn;

/// Outbound side of signaling as seen by the peer layer.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    /// Sends one addressed message. Delivery failures are reported by the
    /// transport's health events, not here.
    async fn send_signal(&self, message: SignalingMessage);
}

/// [`SignalingOutput`] writing straight into a [`SignalingTransport`].
pub struct TransportOutput {
    transport: Arc<dyn SignalingTransport>,
}

impl TransportOutput {
    pub fn new(transport: Arc<dyn SignalingTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SignalingOutput for TransportOutput {
    async fn send_signal(&self, message: SignalingMessage) {
        let kind = message.payload.type_name();
        let to = message.to.clone();
        if let Err(e) = self.transport.send(message).await {
            warn!("Failed to send {} to {:?}: {}", kind, to, e);
        }
    }
}
