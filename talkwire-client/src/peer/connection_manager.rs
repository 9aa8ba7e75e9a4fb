use crate::config::{CallConfig, Topology};
use crate::error::{CallError, EngineError};
use crate::peer::engine_event::EngineEvent;
use crate::peer::managed_connection::ManagedConnection;
use crate::peer::media_engine::{
    ConnectionOptions, IceConnectionState, LocalMedia, MediaEngine, SdpKind,
};
use crate::peer::negotiation::{Negotiation, NegotiationState};
use crate::peer::offerer::is_offerer;
use crate::roster::RosterDelta;
use crate::signaling::{ChannelListener, SignalingOutput, SignalingRouter};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use talkwire_core::{
    IceCandidate, IceServerConfig, PeerKey, RosterEntry, SessionId, SignalPayload,
    SignalingMessage, StreamKind,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Connection-level outcomes the call session reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerUpdate {
    Connected(PeerKey),
    /// A remote connection failed and was ended.
    RemoteFailed(PeerKey),
    /// The local publishing connection failed.
    PublisherFailed,
    /// A connection was created for a session missing from the roster.
    Orphaned(PeerKey),
    Data(PeerKey, Bytes),
}

/// Owns every media connection of a call attempt.
///
/// At most one live connection exists per [`PeerKey`]. Connections are
/// registered with the router under their key for as long as they live.
pub struct PeerConnectionManager {
    topology: Topology,
    local: SessionId,
    engine: Arc<dyn MediaEngine>,
    output: Arc<dyn SignalingOutput>,
    router: SignalingRouter,
    listener: Arc<ChannelListener>,
    engine_events: mpsc::Sender<EngineEvent>,
    connections: HashMap<PeerKey, ManagedConnection>,
    next_generation: u64,
    local_media: LocalMedia,
    ice_servers: Vec<IceServerConfig>,
    nick: Option<String>,
}

impl PeerConnectionManager {
    pub fn new(
        config: &CallConfig,
        local: SessionId,
        engine: Arc<dyn MediaEngine>,
        output: Arc<dyn SignalingOutput>,
        router: SignalingRouter,
        listener: ChannelListener,
        engine_events: mpsc::Sender<EngineEvent>,
    ) -> Self {
        Self {
            topology: config.topology,
            local,
            engine,
            output,
            router,
            listener: Arc::new(listener),
            engine_events,
            connections: HashMap::new(),
            next_generation: 1,
            local_media: LocalMedia::default(),
            ice_servers: config.ice_servers.clone(),
            nick: config.nick.clone(),
        }
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn local_session(&self) -> &SessionId {
        &self.local
    }

    /// Adopts a new local session id after a rejoin. Existing connections
    /// must have been ended already.
    pub fn set_local_session(&mut self, local: SessionId) {
        if !self.connections.is_empty() {
            warn!(
                "Changing local session with {} live connections",
                self.connections.len()
            );
        }
        self.local = local;
    }

    pub fn local_media(&self) -> LocalMedia {
        self.local_media
    }

    pub fn connection(&self, key: &PeerKey) -> Option<&ManagedConnection> {
        self.connections.get(key)
    }

    pub fn contains(&self, key: &PeerKey) -> bool {
        self.connections.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &PeerKey> {
        self.connections.keys()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Returns the connection for `key`, creating it first if needed.
    pub async fn get_or_create(
        &mut self,
        key: PeerKey,
        publisher: bool,
    ) -> Result<&mut ManagedConnection, CallError> {
        if !self.connections.contains_key(&key) {
            let managed = self.create(key.clone(), publisher).await?;
            self.connections.insert(key.clone(), managed);
        }
        self.connections
            .get_mut(&key)
            .ok_or(CallError::ConnectionMissing(key))
    }

    /// Ends the connection for `key`. Returns false if there was none.
    pub async fn end(&mut self, key: &PeerKey) -> bool {
        let Some(mut managed) = self.connections.remove(key) else {
            return false;
        };
        drop(managed.subscription.take());
        managed.negotiation.close();
        managed.connection.close().await;
        info!("Ended connection {}", key);
        true
    }

    /// Ends both stream kinds of a participant.
    pub async fn end_participant(&mut self, session_id: &SessionId) {
        for kind in StreamKind::ALL {
            self.end(&PeerKey::new(session_id.clone(), kind)).await;
        }
    }

    pub async fn end_all(&mut self) {
        let keys: Vec<PeerKey> = self.connections.keys().cloned().collect();
        for key in keys {
            self.end(&key).await;
        }
    }

    /// Relay mode: makes sure the local publishing connection exists and
    /// has sent its offer. A no-op in mesh mode.
    pub async fn ensure_publisher(&mut self) -> Result<Option<PeerUpdate>, CallError> {
        if self.topology != Topology::Relay {
            return Ok(None);
        }
        let key = PeerKey::video(self.local.clone());
        if self.connections.contains_key(&key) {
            return Ok(None);
        }

        match self.get_or_create(key.clone(), true).await {
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!("Failed to create publisher connection: {}", e);
                return Ok(Some(PeerUpdate::PublisherFailed));
            }
            Ok(_) => {}
        }
        self.offer(&key).await
    }

    /// Reacts to a roster change: ends connections of sessions that left the
    /// call and creates or awaits connections for sessions that entered it.
    pub async fn on_roster_delta(
        &mut self,
        delta: &RosterDelta,
    ) -> Result<Vec<PeerUpdate>, CallError> {
        let mut updates = Vec::new();
        updates.extend(self.ensure_publisher().await?);

        let transitions = delta.call_transitions(&self.local);
        for session_id in &transitions.exited {
            self.end_participant(session_id).await;
        }

        let present = delta
            .joined
            .iter()
            .chain(&delta.unchanged)
            .chain(delta.updated.iter().map(|u| &u.current));
        for entry in present {
            for kind in StreamKind::ALL {
                let key = PeerKey::new(entry.session_id.clone(), kind);
                if let Some(managed) = self.connections.get_mut(&key) {
                    if managed.orphan {
                        debug!("Connection {} is no longer orphaned", key);
                        managed.orphan = false;
                    }
                }
            }
        }

        // A session that starts publishing gets the same treatment as a new
        // one; existing connections make this a no-op.
        let mut entered = transitions.entered;
        entered.extend(transitions.started_publishing);
        for entry in &entered {
            updates.extend(self.participant_entered(entry).await?);
        }
        Ok(updates)
    }

    /// Mesh mode: re-runs the join decision for every in-call session once
    /// local media starts, so pairs skipped while neither side published
    /// get connected.
    pub async fn on_local_media_started(
        &mut self,
        entries: &[RosterEntry],
    ) -> Result<Vec<PeerUpdate>, CallError> {
        let mut updates = Vec::new();
        if self.topology != Topology::Mesh || self.local_media.is_empty() {
            return Ok(updates);
        }
        for entry in entries {
            if entry.session_id == self.local || !entry.in_call.is_in_call() {
                continue;
            }
            updates.extend(self.participant_entered(entry).await?);
        }
        Ok(updates)
    }

    /// Feeds one negotiation message addressed to this client.
    ///
    /// `in_roster` tells whether the sender is currently in the roster; an
    /// offer from an unknown sender creates an orphaned connection.
    pub async fn handle_signal(
        &mut self,
        message: SignalingMessage,
        in_roster: bool,
    ) -> Result<Option<PeerUpdate>, CallError> {
        let Some(from) = message.from.clone() else {
            return Ok(None);
        };
        let key = PeerKey::new(from.clone(), message.kind);

        match message.payload {
            SignalPayload::Offer { sdp, .. } => self.on_offer(key, sdp, in_roster).await,
            SignalPayload::Answer { sdp, .. } => Ok(self.on_answer(&key, sdp).await),
            SignalPayload::Candidate(candidate) => {
                self.on_candidate(&key, candidate).await;
                Ok(None)
            }
            SignalPayload::EndOfCandidates => {
                debug!("Remote candidates of {} complete", key);
                Ok(None)
            }
            SignalPayload::UnshareScreen => {
                self.end(&PeerKey::screen(from)).await;
                Ok(None)
            }
            SignalPayload::RequestOffer => self.on_request_offer(key).await,
            SignalPayload::Control(_) => Ok(None),
        }
    }

    pub async fn handle_engine_event(&mut self, event: EngineEvent) -> Option<PeerUpdate> {
        let conn = event.connection().clone();
        let live = self
            .connections
            .get(&conn.key)
            .is_some_and(|m| m.generation == conn.generation);
        if !live {
            debug!(
                "Dropping engine event of stale connection {}#{}",
                conn.key, conn.generation
            );
            return None;
        }

        let key = conn.key;
        match event {
            EngineEvent::LocalCandidate(_, candidate) => {
                self.send(&key, SignalPayload::Candidate(candidate)).await;
                None
            }
            EngineEvent::CandidatesComplete(_) => {
                self.send(&key, SignalPayload::EndOfCandidates).await;
                None
            }
            EngineEvent::IceStateChanged(_, state) => self.ice_state_changed(key, state).await,
            EngineEvent::DataChannelMessage(_, data) => Some(PeerUpdate::Data(key, data)),
        }
    }

    /// Attaches or detaches local media on every connection that sends it.
    pub async fn set_local_media(&mut self, media: LocalMedia) {
        if media == self.local_media {
            return;
        }
        self.local_media = media;

        for managed in self.connections.values() {
            if !sends_local_media(self.topology, &managed.key, managed.publisher) {
                continue;
            }
            let result = if media.is_empty() {
                managed.connection.detach_local_media().await
            } else {
                managed.connection.attach_local_media(media).await
            };
            if let Err(e) = result {
                warn!("Failed to update local media on {}: {}", managed.key, e);
            }
        }
    }

    /// Sends a data-channel message on every connection carrying one.
    pub async fn broadcast_data(&self, data: Bytes) {
        for managed in self.connections.values() {
            if !sends_local_media(self.topology, &managed.key, managed.publisher) {
                continue;
            }
            if let Err(e) = managed.connection.send_data(data.clone()).await {
                debug!("Data channel of {} not writable: {}", managed.key, e);
            }
        }
    }

    /// Ends the participant behind `key` if its connection is still orphaned.
    pub async fn expire_orphan(&mut self, key: &PeerKey) -> bool {
        let orphaned = self.connections.get(key).is_some_and(|m| m.orphan);
        if !orphaned {
            return false;
        }
        warn!(
            "Session {} never appeared in the roster, dropping its connections",
            key.session_id
        );
        self.end_participant(&key.session_id).await;
        true
    }

    async fn create(
        &mut self,
        key: PeerKey,
        publisher: bool,
    ) -> Result<ManagedConnection, CallError> {
        let generation = self.next_generation;
        self.next_generation += 1;

        let relay = self.topology == Topology::Relay;
        let offerer = if relay {
            publisher
        } else {
            is_offerer(&self.local, &key.session_id)
        };
        let options = ConnectionOptions {
            key: key.clone(),
            generation,
            publisher,
            receive_only: relay && !publisher,
            create_data_channel: offerer && key.kind == StreamKind::Video,
            ice_servers: self.ice_servers.clone(),
        };

        let connection = self
            .engine
            .create_connection(options, self.engine_events.clone())
            .await
            .map_err(|e| {
                error!("Failed to create connection {}: {}", key, e);
                CallError::from(e)
            })?;

        if sends_local_media(self.topology, &key, publisher) && !self.local_media.is_empty() {
            if let Err(e) = connection.attach_local_media(self.local_media).await {
                warn!("Failed to attach local media to {}: {}", key, e);
            }
        }

        let subscription = self.router.add_listener(
            self.listener.clone(),
            key.session_id.clone(),
            Some(key.kind),
        );
        info!(
            "Created connection {} (publisher: {}, offerer: {})",
            key, publisher, offerer
        );

        Ok(ManagedConnection {
            key,
            generation,
            publisher,
            offerer,
            orphan: false,
            negotiation: Negotiation::new(),
            connection,
            subscription: Some(subscription),
        })
    }

    async fn participant_entered(
        &mut self,
        entry: &RosterEntry,
    ) -> Result<Option<PeerUpdate>, CallError> {
        let remote = &entry.session_id;
        match self.topology {
            Topology::Mesh => {
                if !is_offerer(&self.local, remote) {
                    debug!("Waiting for offer from {}", remote);
                    return Ok(None);
                }
                if self.local_media.is_empty() && !entry.in_call.has_audio_or_video() {
                    debug!("Neither side publishes media, not connecting to {}", remote);
                    return Ok(None);
                }
                let key = PeerKey::video(remote.clone());
                if self.connections.contains_key(&key) {
                    return Ok(None);
                }
                self.create_and_offer(key).await
            }
            Topology::Relay => {
                if !entry.in_call.has_audio_or_video() {
                    debug!("{} publishes nothing, not subscribing", remote);
                    return Ok(None);
                }
                self.subscribe_remote(PeerKey::video(remote.clone())).await
            }
        }
    }

    async fn create_and_offer(&mut self, key: PeerKey) -> Result<Option<PeerUpdate>, CallError> {
        if let Err(e) = self.get_or_create(key.clone(), false).await {
            if e.is_fatal() {
                return Err(e);
            }
            warn!("Not offering to {}: {}", key, e);
            return Ok(None);
        }
        self.offer(&key).await
    }

    /// Relay mode: creates a receive-only connection and asks the relay to
    /// offer the remote stream on it.
    async fn subscribe_remote(&mut self, key: PeerKey) -> Result<Option<PeerUpdate>, CallError> {
        if self.connections.contains_key(&key) {
            return Ok(None);
        }
        if let Err(e) = self.get_or_create(key.clone(), false).await {
            if e.is_fatal() {
                return Err(e);
            }
            warn!("Not subscribing to {}: {}", key, e);
            return Ok(None);
        }
        self.send(&key, SignalPayload::RequestOffer).await;
        Ok(None)
    }

    async fn offer(&mut self, key: &PeerKey) -> Result<Option<PeerUpdate>, CallError> {
        let Some(managed) = self.connections.get_mut(key) else {
            return Err(CallError::ConnectionMissing(key.clone()));
        };
        if !managed.negotiation.start_offer() {
            debug!("Connection {} already negotiating ({})", key, managed.state());
            return Ok(None);
        }

        let result = managed.connection.create_offer().await;
        let sdp = match result {
            Ok(sdp) => sdp,
            Err(e) => return Ok(self.negotiation_failed(key, e).await),
        };
        let nick = self.nick.clone();
        self.send(key, SignalPayload::Offer { sdp, nick }).await;
        Ok(None)
    }

    async fn on_offer(
        &mut self,
        key: PeerKey,
        sdp: String,
        in_roster: bool,
    ) -> Result<Option<PeerUpdate>, CallError> {
        if self.topology == Topology::Relay && key.session_id == self.local {
            warn!("Ignoring offer addressed to own publisher {}", key);
            return Ok(None);
        }

        let created = !self.connections.contains_key(&key);
        let managed = match self.get_or_create(key.clone(), false).await {
            Ok(managed) => managed,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Cannot answer offer from {}: {}", key, e);
                return Ok(None);
            }
        };

        let orphaned = created && !in_roster;
        if orphaned {
            debug!("Offer from {} arrived before its roster entry", key);
            managed.orphan = true;
        }
        if !managed.negotiation.accept_remote_offer(managed.offerer) {
            info!("Ignoring competing offer from {}, own offer pending", key);
            return Ok(None);
        }

        if let Err(e) = self.apply_remote(&key, SdpKind::Offer, sdp).await {
            return Ok(self.negotiation_failed(&key, e).await);
        }
        let result = match self.connections.get(&key) {
            Some(managed) => managed.connection.create_answer().await,
            None => Err(EngineError::Closed),
        };
        let sdp = match result {
            Ok(sdp) => sdp,
            Err(e) => return Ok(self.negotiation_failed(&key, e).await),
        };
        let nick = self.nick.clone();
        self.send(&key, SignalPayload::Answer { sdp, nick }).await;

        Ok(orphaned.then_some(PeerUpdate::Orphaned(key)))
    }

    async fn on_answer(&mut self, key: &PeerKey, sdp: String) -> Option<PeerUpdate> {
        let Some(managed) = self.connections.get(key) else {
            debug!("Answer for unknown connection {}", key);
            return None;
        };
        if !managed.negotiation.accept_remote_answer() {
            warn!(
                "Unexpected answer for {} in state {}",
                key,
                managed.state()
            );
            return None;
        }
        if let Err(e) = self.apply_remote(key, SdpKind::Answer, sdp).await {
            return self.negotiation_failed(key, e).await;
        }
        None
    }

    async fn on_candidate(&mut self, key: &PeerKey, candidate: IceCandidate) {
        let Some(managed) = self.connections.get_mut(key) else {
            debug!("Candidate for unknown connection {}", key);
            return;
        };
        let Some(candidate) = managed.negotiation.remote_candidate(candidate) else {
            debug!(
                "Queued candidate for {} ({} pending)",
                key,
                managed.negotiation.pending_candidates()
            );
            return;
        };
        let result = managed.connection.add_ice_candidate(candidate).await;
        if let Err(e) = result {
            warn!("Failed to add ICE candidate for {}: {}", key, e);
        }
    }

    /// Mesh mode: the remote lost its end of the connection and asks for a
    /// fresh offer.
    async fn on_request_offer(&mut self, key: PeerKey) -> Result<Option<PeerUpdate>, CallError> {
        if self.topology == Topology::Relay {
            debug!("Ignoring offer request from {} in relay mode", key);
            return Ok(None);
        }
        let stale = self
            .connections
            .get(&key)
            .is_some_and(|m| m.state() != NegotiationState::New);
        if stale {
            self.end(&key).await;
        }
        self.create_and_offer(key).await
    }

    async fn apply_remote(
        &mut self,
        key: &PeerKey,
        kind: SdpKind,
        sdp: String,
    ) -> Result<(), EngineError> {
        let Some(managed) = self.connections.get_mut(key) else {
            return Err(EngineError::Closed);
        };
        managed.connection.set_remote_description(kind, sdp).await?;
        for candidate in managed.negotiation.remote_description_applied() {
            if let Err(e) = managed.connection.add_ice_candidate(candidate).await {
                warn!("Failed to add queued ICE candidate for {}: {}", key, e);
            }
        }
        Ok(())
    }

    async fn ice_state_changed(
        &mut self,
        key: PeerKey,
        state: IceConnectionState,
    ) -> Option<PeerUpdate> {
        let managed = self.connections.get_mut(&key)?;
        debug!("ICE state of {} is now {:?}", key, state);
        if !managed.negotiation.ice_state_changed(state) {
            return None;
        }

        match managed.state() {
            NegotiationState::Connected => {
                info!("Connection {} established", key);
                Some(PeerUpdate::Connected(key))
            }
            NegotiationState::Failed | NegotiationState::Closed => {
                let publisher = managed.publisher;
                warn!("Connection {} lost (ICE {:?})", key, state);
                Some(self.connection_failed(key, publisher).await)
            }
            _ => None,
        }
    }

    async fn negotiation_failed(&mut self, key: &PeerKey, error: EngineError) -> Option<PeerUpdate> {
        let publisher = self.connections.get(key).is_some_and(|m| m.publisher);
        warn!("Negotiation of {} failed: {}", key, error);
        if let Some(managed) = self.connections.get_mut(key) {
            managed.negotiation.fail();
        }
        Some(self.connection_failed(key.clone(), publisher).await)
    }

    /// Ends a failed connection. A failed camera connection of a remote
    /// takes the participant's screen connection down with it, matching the
    /// view that is dropped for them.
    async fn connection_failed(&mut self, key: PeerKey, publisher: bool) -> PeerUpdate {
        if publisher {
            self.end(&key).await;
            return PeerUpdate::PublisherFailed;
        }
        match key.kind {
            StreamKind::Video => self.end_participant(&key.session_id).await,
            StreamKind::Screen => {
                self.end(&key).await;
            }
        }
        PeerUpdate::RemoteFailed(key)
    }

    async fn send(&self, key: &PeerKey, payload: SignalPayload) {
        let message = self.router.outbound(&key.session_id, key.kind, payload);
        self.output.send_signal(message).await;
    }
}

/// Whether local media and the data channel flow on this connection.
fn sends_local_media(topology: Topology, key: &PeerKey, publisher: bool) -> bool {
    match topology {
        Topology::Relay => publisher,
        Topology::Mesh => key.kind == StreamKind::Video,
    }
}
