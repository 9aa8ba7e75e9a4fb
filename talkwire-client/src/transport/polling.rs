use crate::error::TransportError;
use crate::transport::{
    Backoff, BackoffPolicy, ConnectionHealth, SignalingTransport, TransportEvent,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use talkwire_core::wire::internal;
use talkwire_core::{SessionId, SignalingMessage};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// HTTP side of the pull-based signaling path.
#[async_trait]
pub trait PollClient: Send + Sync + 'static {
    /// Issues one long-poll request and returns the raw response body.
    async fn pull(&self) -> Result<String, TransportError>;

    /// Posts an encoded `messages` body.
    async fn push(&self, messages: String) -> Result<(), TransportError>;
}

/// Signaling over a long-poll loop.
///
/// Successful responses immediately re-issue the request. Failures back off
/// exponentially and reset on the next success. The loop ends once the
/// transport is closed.
pub struct PollingTransport<C: PollClient> {
    client: Arc<C>,
    local: SessionId,
    policy: BackoffPolicy,
    connected: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<C: PollClient> PollingTransport<C> {
    pub fn new(client: C, local: SessionId, policy: BackoffPolicy) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            client: Arc::new(client),
            local,
            policy,
            connected,
            task: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }
}

#[async_trait]
impl<C: PollClient> SignalingTransport for PollingTransport<C> {
    async fn connect(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Option<SessionId>, TransportError> {
        self.connected.send_replace(true);

        let handle = tokio::spawn(poll_loop(
            self.client.clone(),
            self.policy.clone(),
            events,
            self.connected.subscribe(),
        ));

        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }

        info!("Polling transport started for session {}", self.local);
        Ok(None)
    }

    async fn send(&self, message: SignalingMessage) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }
        let sender = message.from.clone().unwrap_or_else(|| self.local.clone());
        let body = internal::encode_messages(&sender, &[message])?;
        self.client.push(body).await
    }

    async fn close(&self) {
        self.connected.send_replace(false);
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            info!("Polling transport stopped");
        }
    }
}

async fn poll_loop<C: PollClient>(
    client: Arc<C>,
    policy: BackoffPolicy,
    events: mpsc::Sender<TransportEvent>,
    mut connected: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::new(policy);

    while *connected.borrow() {
        let result = tokio::select! {
            r = client.pull() => r,
            _ = connected.wait_for(|c| !*c) => break,
        };

        match result {
            Ok(body) => {
                if backoff.failures() > 0 {
                    info!("Polling recovered after {} failures", backoff.failures());
                    backoff.reset();
                    if !emit(&events, TransportEvent::Health(ConnectionHealth::Connected)).await {
                        break;
                    }
                }

                match internal::decode_poll_response(&body) {
                    Ok(envelopes) => {
                        for envelope in envelopes {
                            if !emit(&events, TransportEvent::Envelope(envelope)).await {
                                return;
                            }
                        }
                    }
                    Err(e) => warn!("Dropping undecodable poll response: {}", e),
                }
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(
                    "Poll request failed ({} in a row): {}. Retrying in {:?}",
                    backoff.failures(),
                    e,
                    delay
                );

                let health = if backoff.just_exhausted() {
                    ConnectionHealth::Lost
                } else {
                    ConnectionHealth::Degraded {
                        failures: backoff.failures(),
                    }
                };
                if !emit(&events, TransportEvent::Health(health)).await {
                    break;
                }

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = connected.wait_for(|c| !*c) => break,
                }
            }
        }
    }

    debug!("Poll loop finished");
}

async fn emit(events: &mpsc::Sender<TransportEvent>, event: TransportEvent) -> bool {
    if events.send(event).await.is_err() {
        debug!("Transport event receiver dropped, stopping poll loop");
        return false;
    }
    true
}
