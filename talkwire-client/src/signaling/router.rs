use crate::signaling::subscription::{Subscription, SubscriptionTarget};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use talkwire_core::{
    InboundEnvelope, RosterEntry, SessionId, SignalPayload, SignalingMessage, StreamKind,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Receives point-to-point signaling messages.
pub trait NegotiationListener: Send + Sync {
    fn on_signal(&self, message: SignalingMessage);
}

impl<F> NegotiationListener for F
where
    F: Fn(SignalingMessage) + Send + Sync,
{
    fn on_signal(&self, message: SignalingMessage) {
        self(message)
    }
}

/// Roster-level traffic.
#[derive(Debug, Clone, PartialEq)]
pub enum RosterUpdate {
    Snapshot(Vec<RosterEntry>),
    /// A moderator ended the call for everyone.
    EndedForEveryone,
}

/// Receives whole-roster snapshots.
pub trait RosterListener: Send + Sync {
    fn on_roster(&self, update: RosterUpdate);
}

impl<F> RosterListener for F
where
    F: Fn(RosterUpdate) + Send + Sync,
{
    fn on_roster(&self, update: RosterUpdate) {
        self(update)
    }
}

/// Everything the router hands to a [`ChannelListener`].
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Roster(RosterUpdate),
    Signal(SignalingMessage),
}

/// Listener forwarding into a single ordered queue.
#[derive(Clone)]
pub struct ChannelListener(pub mpsc::UnboundedSender<Routed>);

impl NegotiationListener for ChannelListener {
    fn on_signal(&self, message: SignalingMessage) {
        if self.0.send(Routed::Signal(message)).is_err() {
            debug!("Routed queue closed, dropping signal");
        }
    }
}

impl RosterListener for ChannelListener {
    fn on_roster(&self, update: RosterUpdate) {
        if self.0.send(Routed::Roster(update)).is_err() {
            debug!("Routed queue closed, dropping roster update");
        }
    }
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub(crate) enum ListenerKey {
    Stream(SessionId, StreamKind),
    Session(SessionId),
    Fallback,
}

pub(crate) struct Registration {
    pub(crate) id: u64,
    listener: Arc<dyn NegotiationListener>,
}

pub(crate) struct RouterInner {
    pub(crate) negotiation: DashMap<ListenerKey, Registration>,
    pub(crate) roster: DashMap<u64, Arc<dyn RosterListener>>,
    next_id: AtomicU64,
}

struct Identity {
    local: SessionId,
    sid: String,
}

/// How [`SignalingRouter::process`] disposed of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Roster { listeners: usize },
    Scoped,
    Unscoped,
    Fallback,
    Dropped,
    Ignored,
}

/// Demultiplexes inbound envelopes to typed listeners and tags outbound
/// messages with the local identity.
///
/// Cloning yields another handle to the same listener tables.
#[derive(Clone)]
pub struct SignalingRouter {
    inner: Arc<RouterInner>,
    identity: Arc<RwLock<Identity>>,
}

impl SignalingRouter {
    pub fn new(local: SessionId) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                negotiation: DashMap::new(),
                roster: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
            identity: Arc::new(RwLock::new(Identity {
                local,
                sid: new_sid(),
            })),
        }
    }

    pub fn local_session(&self) -> SessionId {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .local
            .clone()
    }

    pub fn set_local_session(&self, local: SessionId) {
        self.identity
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .local = local;
    }

    /// Negotiation id tagged onto outbound messages of this call attempt.
    pub fn negotiation_sid(&self) -> String {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sid
            .clone()
    }

    /// Starts a new negotiation id, used when the call is rejoined.
    pub fn renew_sid(&self) {
        self.identity
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .sid = new_sid();
    }

    /// Registers `listener` for messages from `session_id`, scoped to one
    /// stream kind or, with `None`, to every kind without a scoped listener.
    pub fn add_listener(
        &self,
        listener: Arc<dyn NegotiationListener>,
        session_id: SessionId,
        kind: Option<StreamKind>,
    ) -> Subscription {
        let key = match kind {
            Some(kind) => ListenerKey::Stream(session_id, kind),
            None => ListenerKey::Session(session_id),
        };
        self.register(key, listener)
    }

    /// Registers the last-resort listener for messages from sessions nobody
    /// listens to yet.
    pub fn set_fallback_listener(&self, listener: Arc<dyn NegotiationListener>) -> Subscription {
        self.register(ListenerKey::Fallback, listener)
    }

    pub fn add_roster_listener(&self, listener: Arc<dyn RosterListener>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.roster.insert(id, listener);
        Subscription::new(Arc::downgrade(&self.inner), SubscriptionTarget::Roster, id)
    }

    /// Removes whatever listener is registered for the key. Idempotent.
    pub fn remove_listener(&self, session_id: &SessionId, kind: Option<StreamKind>) {
        let key = match kind {
            Some(kind) => ListenerKey::Stream(session_id.clone(), kind),
            None => ListenerKey::Session(session_id.clone()),
        };
        self.inner.negotiation.remove(&key);
    }

    pub fn has_listener(&self, session_id: &SessionId, kind: Option<StreamKind>) -> bool {
        let key = match kind {
            Some(kind) => ListenerKey::Stream(session_id.clone(), kind),
            None => ListenerKey::Session(session_id.clone()),
        };
        self.inner.negotiation.contains_key(&key)
    }

    /// Detaches every listener.
    pub fn clear(&self) {
        self.inner.negotiation.clear();
        self.inner.roster.clear();
    }

    /// Dispatches one inbound envelope. Listeners run synchronously, in
    /// arrival order.
    pub fn process(&self, envelope: InboundEnvelope) -> Dispatch {
        match envelope {
            InboundEnvelope::Roster(entries) => self.dispatch_roster(RosterUpdate::Snapshot(entries)),
            InboundEnvelope::CallEndedForEveryone => {
                self.dispatch_roster(RosterUpdate::EndedForEveryone)
            }
            InboundEnvelope::Signal(message) => self.dispatch_signal(message),
            other => {
                debug!("Router ignores envelope {:?}", other);
                Dispatch::Ignored
            }
        }
    }

    /// Builds an outbound message to `to`, tagged with the local session and
    /// the current negotiation id.
    pub fn outbound(
        &self,
        to: &SessionId,
        kind: StreamKind,
        payload: SignalPayload,
    ) -> SignalingMessage {
        let identity = self.identity.read().unwrap_or_else(PoisonError::into_inner);
        SignalingMessage {
            from: Some(identity.local.clone()),
            to: Some(to.clone()),
            kind,
            sid: Some(identity.sid.clone()),
            payload,
        }
    }

    fn register(&self, key: ListenerKey, listener: Arc<dyn NegotiationListener>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if self
            .inner
            .negotiation
            .insert(key.clone(), Registration { id, listener })
            .is_some()
        {
            debug!("Replaced listener for {:?}", key);
        }
        Subscription::new(
            Arc::downgrade(&self.inner),
            SubscriptionTarget::Negotiation(key),
            id,
        )
    }

    fn dispatch_roster(&self, update: RosterUpdate) -> Dispatch {
        // Listeners are collected first so none runs while a map shard is locked.
        let listeners: Vec<Arc<dyn RosterListener>> = self
            .inner
            .roster
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        if listeners.is_empty() {
            debug!("No roster listener registered");
        }
        for listener in &listeners {
            listener.on_roster(update.clone());
        }
        Dispatch::Roster {
            listeners: listeners.len(),
        }
    }

    fn dispatch_signal(&self, message: SignalingMessage) -> Dispatch {
        let Some(sender) = message.from.clone() else {
            warn!(
                "Dropping {} without sender",
                message.payload.type_name()
            );
            return Dispatch::Dropped;
        };

        let local = self.local_session();
        if let Some(to) = &message.to {
            if *to != local {
                warn!(
                    "Dropping {} from {} addressed to {}",
                    message.payload.type_name(),
                    sender,
                    to
                );
                return Dispatch::Dropped;
            }
        }

        let mut candidates = Vec::with_capacity(3);
        if message.payload.is_negotiation() {
            candidates.push((ListenerKey::Stream(sender.clone(), message.kind), Dispatch::Scoped));
        }
        candidates.push((ListenerKey::Session(sender.clone()), Dispatch::Unscoped));
        // Messages from the local session only reach listeners registered
        // for it, such as the relay publisher connection.
        if sender != local {
            candidates.push((ListenerKey::Fallback, Dispatch::Fallback));
        }

        for (key, dispatch) in candidates {
            let listener = self
                .inner
                .negotiation
                .get(&key)
                .map(|reg| reg.listener.clone());
            if let Some(listener) = listener {
                listener.on_signal(message);
                return dispatch;
            }
        }

        debug!(
            "No listener for {} from {}/{}",
            message.payload.type_name(),
            sender,
            message.kind
        );
        Dispatch::Dropped
    }
}

fn new_sid() -> String {
    Uuid::new_v4().to_string()
}
