use crate::error::TransportError;
use crate::transport::{
    Backoff, BackoffPolicy, ConnectionHealth, SignalingTransport, TransportEvent,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use talkwire_core::wire::relay;
use talkwire_core::{InboundEnvelope, SessionId, SignalingMessage};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Text-frame pipe to the relay. Dropping `outgoing` closes the socket.
pub struct RelayChannel {
    pub outgoing: mpsc::Sender<String>,
    pub incoming: mpsc::Receiver<String>,
}

/// Opens raw socket connections to the relay.
#[async_trait]
pub trait RelayConnector: Send + Sync + 'static {
    async fn connect(&self) -> Result<RelayChannel, TransportError>;
}

#[derive(Default)]
struct RelayState {
    outgoing: Option<mpsc::Sender<String>>,
    session_id: Option<SessionId>,
    resume_id: Option<String>,
}

struct Handshake {
    channel: RelayChannel,
    session_id: SessionId,
    resume_id: Option<String>,
    resumed: bool,
}

/// Signaling over a persistent relay socket with session resumption.
///
/// A dropped socket is reported as [`ConnectionHealth::Interrupted`] and
/// reconnected with backoff. The reconnect resumes the previous session when
/// a resume id is known and the relay accepts it; otherwise it is reported
/// as [`ConnectionHealth::Reconnected`] and the call has to be rejoined.
pub struct RelayTransport<C: RelayConnector> {
    inner: Arc<RelayInner<C>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct RelayInner<C: RelayConnector> {
    connector: C,
    policy: BackoffPolicy,
    auth: Option<serde_json::Value>,
    state: Mutex<RelayState>,
    connected: watch::Sender<bool>,
}

impl<C: RelayConnector> RelayTransport<C> {
    pub fn new(connector: C, policy: BackoffPolicy, auth: Option<serde_json::Value>) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            inner: Arc::new(RelayInner {
                connector,
                policy,
                auth,
                state: Mutex::new(RelayState::default()),
                connected,
            }),
            task: Mutex::new(None),
        }
    }

    /// Session id assigned by the relay in the last handshake.
    pub async fn session_id(&self) -> Option<SessionId> {
        self.inner.state.lock().await.session_id.clone()
    }

    pub async fn resume_id(&self) -> Option<String> {
        self.inner.state.lock().await.resume_id.clone()
    }
}

#[async_trait]
impl<C: RelayConnector> SignalingTransport for RelayTransport<C> {
    async fn connect(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Option<SessionId>, TransportError> {
        let handshake = self.inner.handshake(None).await?;
        let session_id = handshake.session_id.clone();
        let incoming = self.inner.adopt(handshake).await;

        self.inner.connected.send_replace(true);
        let handle = tokio::spawn(self.inner.clone().run(incoming, events));
        if let Some(previous) = self.task.lock().await.replace(handle) {
            previous.abort();
        }

        info!("Relay transport connected as {}", session_id);
        Ok(Some(session_id))
    }

    async fn send(&self, message: SignalingMessage) -> Result<(), TransportError> {
        let frame = relay::encode_message(&message)?;
        let outgoing = self
            .inner
            .state
            .lock()
            .await
            .outgoing
            .clone()
            .ok_or(TransportError::Closed)?;
        outgoing
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&self) {
        self.inner.connected.send_replace(false);
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        let mut state = self.inner.state.lock().await;
        if state.outgoing.take().is_some() {
            info!("Relay transport closed");
        }
    }
}

impl<C: RelayConnector> RelayInner<C> {
    async fn adopt(&self, handshake: Handshake) -> mpsc::Receiver<String> {
        let mut state = self.state.lock().await;
        state.outgoing = Some(handshake.channel.outgoing);
        state.session_id = Some(handshake.session_id);
        let previous = state.resume_id.take();
        state.resume_id = match handshake.resume_id {
            Some(resume_id) => Some(resume_id),
            None if handshake.resumed => previous,
            None => None,
        };
        handshake.channel.incoming
    }

    async fn handshake(&self, resume_id: Option<String>) -> Result<Handshake, TransportError> {
        if let Some(resume_id) = resume_id {
            match self.hello(Some(&resume_id)).await {
                Ok(mut handshake) => {
                    handshake.resumed = true;
                    return Ok(handshake);
                }
                Err(TransportError::Rejected(code)) => {
                    warn!("Relay refused to resume session ({}), starting fresh", code);
                }
                Err(e) => return Err(e),
            }
        }
        self.hello(None).await
    }

    async fn hello(&self, resume_id: Option<&str>) -> Result<Handshake, TransportError> {
        let mut channel = self.connector.connect().await?;
        let frame = relay::encode_hello(resume_id, self.auth.as_ref())?;
        channel
            .outgoing
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)?;

        let reply = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            while let Some(text) = channel.incoming.recv().await {
                match relay::decode_frame(&text) {
                    Ok(Some(InboundEnvelope::Welcome {
                        session_id,
                        resume_id,
                    })) => return Ok((session_id, resume_id)),
                    Ok(Some(InboundEnvelope::Error { code, message })) => {
                        debug!("Relay handshake error {}: {:?}", code, message);
                        return Err(TransportError::Rejected(code));
                    }
                    Ok(other) => debug!("Ignoring frame before hello: {:?}", other),
                    Err(e) => warn!("Dropping malformed relay frame: {}", e),
                }
            }
            Err(TransportError::Closed)
        })
        .await
        .map_err(|_| TransportError::HandshakeTimeout)??;

        let (session_id, resume_id) = reply;
        Ok(Handshake {
            channel,
            session_id,
            resume_id,
            resumed: false,
        })
    }

    async fn run(
        self: Arc<Self>,
        mut incoming: mpsc::Receiver<String>,
        events: mpsc::Sender<TransportEvent>,
    ) {
        let mut connected = self.connected.subscribe();
        let mut backoff = Backoff::new(self.policy.clone());

        'session: loop {
            loop {
                let text = tokio::select! {
                    t = incoming.recv() => t,
                    _ = connected.wait_for(|c| !*c) => break 'session,
                };
                let Some(text) = text else { break };

                match relay::decode_frame(&text) {
                    Ok(Some(envelope)) => {
                        if events.send(TransportEvent::Envelope(envelope)).await.is_err() {
                            break 'session;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Dropping malformed relay frame: {}", e),
                }
            }

            if !*connected.borrow() {
                break;
            }

            warn!("Relay socket dropped, reconnecting");
            let resume_id = {
                let mut state = self.state.lock().await;
                state.outgoing = None;
                state.resume_id.clone()
            };
            if events
                .send(TransportEvent::Health(ConnectionHealth::Interrupted))
                .await
                .is_err()
            {
                break;
            }

            loop {
                let delay = backoff.next_delay();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = connected.wait_for(|c| !*c) => break 'session,
                }

                match self.handshake(resume_id.clone()).await {
                    Ok(handshake) => {
                        let resumed = handshake.resumed;
                        let session_id = handshake.session_id.clone();
                        incoming = self.adopt(handshake).await;
                        backoff.reset();

                        let health = if resumed {
                            info!("Relay session {} resumed", session_id);
                            ConnectionHealth::Resumed
                        } else {
                            warn!("Relay session lost, reconnected as {}", session_id);
                            ConnectionHealth::Reconnected {
                                session_id: Some(session_id),
                            }
                        };
                        if events.send(TransportEvent::Health(health)).await.is_err() {
                            break 'session;
                        }
                        continue 'session;
                    }
                    Err(e) => {
                        error!("Relay reconnect attempt {} failed: {}", backoff.failures(), e);
                        if backoff.just_exhausted()
                            && events
                                .send(TransportEvent::Health(ConnectionHealth::Lost))
                                .await
                                .is_err()
                        {
                            break 'session;
                        }
                    }
                }
            }
        }

        debug!("Relay loop finished");
    }
}

