use crate::call::backend::CallBackend;
use crate::call::call_command::CallCommand;
use crate::call::call_state::{CallEvent, CallState};
use crate::call::handle::CallHandle;
use crate::call::participants::ParticipantProjector;
use crate::call::state_machine::{CallStateMachine, TimerEvent};
use crate::config::CallConfig;
use crate::error::CallError;
use crate::peer::{EngineEvent, LocalMedia, MediaEngine, PeerConnectionManager, PeerUpdate};
use crate::roster::{CallRoster, RosterDelta, RosterOutcome};
use crate::signaling::{
    ChannelListener, Routed, RosterUpdate, SignalingOutput, SignalingRouter, Subscription,
    TransportOutput,
};
use crate::transport::{ConnectionHealth, SignalingTransport, TransportEvent};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use talkwire_core::{
    ControlSignal, InCallFlags, InboundEnvelope, PeerKey, SessionId, SignalPayload,
    SignalingMessage, StatusMessage, StreamKind,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Why a call session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    Hangup,
    /// The call was ended for the local participant by someone else.
    EndedRemotely,
    MediaEngineUnavailable,
    /// The initial join was refused or the transport never connected.
    JoinFailed,
    RejoinFailed,
}

/// The serialized core of one call attempt.
///
/// A single task owns the router, roster, connections and state machine and
/// processes commands, transport events, engine events and timers one at a
/// time, in arrival order.
pub struct CallSession {
    local: SessionId,
    transport_assigned_id: bool,
    reassigned_id: Option<SessionId>,
    transport: Arc<dyn SignalingTransport>,
    backend: Arc<dyn CallBackend>,
    output: Arc<dyn SignalingOutput>,
    router: SignalingRouter,
    subscriptions: Vec<Subscription>,
    roster: CallRoster,
    peers: PeerConnectionManager,
    machine: CallStateMachine,
    participants: ParticipantProjector,
    orphan_timeout: std::time::Duration,
    orphan_timers: HashMap<PeerKey, JoinHandle<()>>,
    local_media: LocalMedia,
    leave_reason: Option<LeaveReason>,
    command_rx: mpsc::Receiver<CallCommand>,
    transport_tx: mpsc::Sender<TransportEvent>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    engine_rx: mpsc::Receiver<EngineEvent>,
    timer_tx: mpsc::UnboundedSender<TimerEvent>,
    timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
    routed_rx: mpsc::UnboundedReceiver<Routed>,
}

impl CallSession {
    pub fn new(
        config: CallConfig,
        local: SessionId,
        engine: Arc<dyn MediaEngine>,
        transport: Arc<dyn SignalingTransport>,
        backend: Arc<dyn CallBackend>,
    ) -> (Self, CallHandle) {
        let router = SignalingRouter::new(local.clone());
        let (routed_tx, routed_rx) = mpsc::unbounded_channel();
        let listener = ChannelListener(routed_tx);
        let subscriptions = vec![
            router.add_roster_listener(Arc::new(listener.clone())),
            router.set_fallback_listener(Arc::new(listener.clone())),
        ];

        let capabilities = engine.capabilities();
        let output: Arc<dyn SignalingOutput> = Arc::new(TransportOutput::new(transport.clone()));
        let (engine_tx, engine_rx) = mpsc::channel(256);
        let peers = PeerConnectionManager::new(
            &config,
            local.clone(),
            engine,
            output.clone(),
            router.clone(),
            listener,
            engine_tx,
        );

        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let machine = CallStateMachine::new(&config, timer_tx.clone());
        let roster = CallRoster::new();
        let participants = ParticipantProjector::new();

        let (command_tx, command_rx) = mpsc::channel(32);
        let (transport_tx, transport_rx) = mpsc::channel(256);

        let handle = CallHandle::new(
            command_tx,
            machine.subscribe(),
            roster.delta_sender(),
            participants.subscribe(),
        );

        let session = Self {
            local,
            transport_assigned_id: false,
            reassigned_id: None,
            transport,
            backend,
            output,
            router,
            subscriptions,
            roster,
            peers,
            machine,
            participants,
            orphan_timeout: config.orphan_timeout,
            orphan_timers: HashMap::new(),
            local_media: LocalMedia {
                audio: capabilities.audio,
                video: capabilities.video,
            },
            leave_reason: None,
            command_rx,
            transport_tx,
            transport_rx,
            engine_rx,
            timer_tx,
            timer_rx,
            routed_rx,
        };
        (session, handle)
    }

    /// Runs the call until it is left and returns why.
    pub async fn run(mut self) -> LeaveReason {
        info!("Call session for {} started", self.local);

        if let Err(reason) = self.start().await {
            return self.shutdown(reason).await;
        }

        while !self.machine.state().is_terminal() {
            let result = tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(c) => self.handle_command(c).await,
                    None => {
                        info!("Call handle dropped, hanging up");
                        self.transition(CallEvent::Hangup).await
                    }
                },

                Some(evt) = self.transport_rx.recv() => self.handle_transport_event(evt).await,

                Some(evt) = self.engine_rx.recv() => self.handle_engine_event(evt).await,

                Some(timer) = self.timer_rx.recv() => self.handle_timer(timer).await,
            };

            if let Err(e) = result {
                self.fail(e).await;
            }
        }

        let reason = self.leave_reason.unwrap_or(LeaveReason::Hangup);
        self.shutdown(reason).await
    }

    async fn start(&mut self) -> Result<(), LeaveReason> {
        match self.transport.connect(self.transport_tx.clone()).await {
            Ok(Some(session_id)) => {
                self.transport_assigned_id = true;
                self.adopt_session(session_id);
            }
            Ok(None) => {}
            Err(e) => {
                error!("Signaling transport failed to connect: {}", e);
                return Err(LeaveReason::JoinFailed);
            }
        }

        self.peers.set_local_media(self.local_media).await;

        match self.backend.join_call(self.join_flags()).await {
            Ok(session_id) => self.adopt_backend_session(session_id),
            Err(e) => {
                error!("Joining the call failed: {}", e);
                return Err(LeaveReason::JoinFailed);
            }
        }

        if let Err(e) = self.transition(CallEvent::JoinAccepted).await {
            self.fail(e).await;
        }
        Ok(())
    }

    async fn handle_command(&mut self, command: CallCommand) -> Result<(), CallError> {
        debug!("Call command {:?}", command);
        match command {
            CallCommand::Hangup => self.transition(CallEvent::Hangup).await,
            CallCommand::Retry => self.transition(CallEvent::UserRetry).await,
            CallCommand::SetLocalMedia(media) => {
                let previous = self.local_media;
                self.local_media = media;
                self.peers.set_local_media(media).await;
                let mut follow_up = None;
                if previous.is_empty() && !media.is_empty() && self.machine.state().is_active() {
                    let updates = self
                        .peers
                        .on_local_media_started(self.roster.entries())
                        .await?;
                    follow_up = self.apply_updates(updates).await;
                }
                self.announce_media(Some(previous)).await;
                match follow_up {
                    Some(event) => self.transition(event).await,
                    None => Ok(()),
                }
            }
            CallCommand::RaiseHand(raised) => {
                self.raise_hand(raised).await;
                Ok(())
            }
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) -> Result<(), CallError> {
        match event {
            TransportEvent::Envelope(envelope) => self.handle_envelope(envelope).await,
            TransportEvent::Health(health) => self.handle_health(health).await,
        }
    }

    async fn handle_envelope(&mut self, envelope: InboundEnvelope) -> Result<(), CallError> {
        match envelope {
            InboundEnvelope::Bye { reason } => {
                warn!("Relay closed the session: {:?}", reason);
                self.transition(CallEvent::TransportLostWithoutResume).await
            }
            InboundEnvelope::Error { code, message } => {
                warn!("Relay error {}: {:?}", code, message);
                Ok(())
            }
            other => {
                self.router.process(other);
                self.drain_routed().await
            }
        }
    }

    async fn handle_health(&mut self, health: ConnectionHealth) -> Result<(), CallError> {
        match health {
            ConnectionHealth::Connected => {
                info!("Signaling connection healthy again");
                Ok(())
            }
            ConnectionHealth::Degraded { failures } => {
                debug!("Signaling degraded after {} failures", failures);
                Ok(())
            }
            ConnectionHealth::Interrupted => self.transition(CallEvent::TransportInterrupted).await,
            ConnectionHealth::Resumed => {
                let others_active = self.roster.has_others_in_call(&self.local);
                self.transition(CallEvent::TransportResumed { others_active })
                    .await
            }
            ConnectionHealth::Reconnected { session_id } => {
                warn!("Signaling reconnected without resume, rejoining");
                self.reassigned_id = session_id;
                self.transition(CallEvent::TransportLostWithoutResume).await
            }
            ConnectionHealth::Lost => {
                warn!("Signaling connection lost");
                self.transition(CallEvent::TransportLostWithoutResume).await
            }
        }
    }

    async fn handle_engine_event(&mut self, event: EngineEvent) -> Result<(), CallError> {
        let Some(update) = self.peers.handle_engine_event(event).await else {
            return Ok(());
        };
        match self.on_peer_update(update).await {
            Some(event) => self.transition(event).await,
            None => Ok(()),
        }
    }

    async fn handle_timer(&mut self, timer: TimerEvent) -> Result<(), CallError> {
        match timer {
            TimerEvent::Call { epoch, event } => {
                let Some(state) = self.machine.apply_timer(epoch, event) else {
                    return Ok(());
                };
                self.entered(state, event).await
            }
            TimerEvent::OrphanExpired(key) => {
                self.orphan_timers.remove(&key);
                if self.peers.expire_orphan(&key).await {
                    self.participants.remove(&key.session_id);
                }
                Ok(())
            }
        }
    }

    async fn drain_routed(&mut self) -> Result<(), CallError> {
        while let Ok(routed) = self.routed_rx.try_recv() {
            match routed {
                Routed::Roster(update) => self.on_roster(update).await?,
                Routed::Signal(message) => self.on_signal(message).await?,
            }
        }
        Ok(())
    }

    async fn on_roster(&mut self, update: RosterUpdate) -> Result<(), CallError> {
        let entries = match update {
            RosterUpdate::EndedForEveryone => {
                info!("Call ended for everyone");
                return self.transition(CallEvent::EndedRemotely).await;
            }
            RosterUpdate::Snapshot(entries) => entries,
        };

        let active = self.machine.state().is_active();
        let delta = match self.roster.apply(entries, &self.local, active) {
            RosterOutcome::EndedRemotely => {
                return self.transition(CallEvent::EndedRemotely).await;
            }
            RosterOutcome::Delta(delta) => delta,
        };

        self.participants
            .on_roster(self.roster.entries(), &self.local);
        if !active {
            return Ok(());
        }
        if let Some(event) = self.apply_delta(&delta).await? {
            return self.transition(event).await;
        }
        if self.roster.has_others_in_call(&self.local) {
            self.transition(CallEvent::OthersActive).await?;
        }
        Ok(())
    }

    async fn on_signal(&mut self, message: SignalingMessage) -> Result<(), CallError> {
        let Some(from) = message.from.clone() else {
            return Ok(());
        };
        if let SignalPayload::Control(control) = &message.payload {
            self.participants.on_control(&from, control);
            return Ok(());
        }

        let unshare = message.payload == SignalPayload::UnshareScreen;
        let in_roster = self.roster.contains(&from);
        let update = self.peers.handle_signal(message, in_roster).await?;
        if unshare {
            self.participants.on_connection_lost(&PeerKey::screen(from));
        }

        match update {
            Some(update) => match self.on_peer_update(update).await {
                Some(event) => self.transition(event).await,
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    /// Feeds a roster delta to the connection manager. Returns the call
    /// event a connection failure asks for, if any.
    async fn apply_delta(&mut self, delta: &RosterDelta) -> Result<Option<CallEvent>, CallError> {
        let updates = self.peers.on_roster_delta(delta).await?;
        Ok(self.apply_updates(updates).await)
    }

    async fn apply_updates(&mut self, updates: Vec<PeerUpdate>) -> Option<CallEvent> {
        let mut follow_up = None;
        for update in updates {
            if let Some(event) = self.on_peer_update(update).await {
                follow_up = Some(event);
            }
        }
        follow_up
    }

    async fn on_peer_update(&mut self, update: PeerUpdate) -> Option<CallEvent> {
        match update {
            PeerUpdate::Connected(key) => {
                self.participants.on_connected(&key);
                if key.kind == StreamKind::Video {
                    self.announce_media(None).await;
                }
                None
            }
            PeerUpdate::RemoteFailed(key) => {
                self.participants.on_connection_lost(&key);
                None
            }
            PeerUpdate::PublisherFailed => Some(CallEvent::PublisherConnectionFailed),
            PeerUpdate::Orphaned(key) => {
                self.schedule_orphan_expiry(key);
                None
            }
            PeerUpdate::Data(key, data) => {
                self.participants.on_data(&key.session_id, &data);
                None
            }
        }
    }

    /// Applies `event` and runs the entry actions of every state reached,
    /// including follow-up events raised by those actions.
    async fn transition(&mut self, event: CallEvent) -> Result<(), CallError> {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            let Some(state) = self.machine.apply(event) else {
                continue;
            };
            if let Some(follow_up) = self.on_enter(state, event).await? {
                pending.push_back(follow_up);
            }
        }
        Ok(())
    }

    async fn entered(&mut self, state: CallState, cause: CallEvent) -> Result<(), CallError> {
        match self.on_enter(state, cause).await? {
            Some(follow_up) => self.transition(follow_up).await,
            None => Ok(()),
        }
    }

    async fn on_enter(
        &mut self,
        state: CallState,
        cause: CallEvent,
    ) -> Result<Option<CallEvent>, CallError> {
        match state {
            CallState::Joined => {
                if cause == (CallEvent::TransportResumed { others_active: false }) {
                    return Ok(None);
                }
                let delta = RosterDelta::initial(self.roster.entries());
                if let Some(event) = self.apply_delta(&delta).await? {
                    return Ok(Some(event));
                }
                if self.roster.has_others_in_call(&self.local) {
                    return Ok(Some(CallEvent::OthersActive));
                }
                Ok(None)
            }
            CallState::Reconnecting => Ok(Some(self.rejoin().await)),
            CallState::CallingTimeout => {
                info!("Nobody joined the call, waiting for retry");
                Ok(None)
            }
            CallState::Offline => {
                info!("Signaling interrupted, keeping connections while resuming");
                Ok(None)
            }
            CallState::Leaving => {
                let reason = match cause {
                    CallEvent::EndedRemotely => LeaveReason::EndedRemotely,
                    CallEvent::RejoinFailed => LeaveReason::RejoinFailed,
                    _ => LeaveReason::Hangup,
                };
                self.leave_reason.get_or_insert(reason);
                Ok(None)
            }
            CallState::Connecting | CallState::InConversation | CallState::PublisherFailed => {
                Ok(None)
            }
        }
    }

    /// Drops everything tied to the previous attempt and joins again.
    async fn rejoin(&mut self) -> CallEvent {
        info!("Rejoining the call");
        self.peers.end_all().await;
        self.cancel_orphan_timers();
        self.roster.reset();
        self.participants.clear();
        self.router.renew_sid();

        if let Some(session_id) = self.reassigned_id.take() {
            self.adopt_session(session_id);
        }

        match self.backend.join_call(self.join_flags()).await {
            Ok(session_id) => {
                self.adopt_backend_session(session_id);
                CallEvent::JoinAccepted
            }
            Err(e) => {
                error!("Rejoining the call failed: {}", e);
                CallEvent::RejoinFailed
            }
        }
    }

    async fn fail(&mut self, error: CallError) {
        error!("Call error: {}", error);
        if !error.is_fatal() {
            return;
        }
        if let CallError::MediaEngineUnavailable(_) = error {
            self.leave_reason = Some(LeaveReason::MediaEngineUnavailable);
        }
        if let Err(e) = self.transition(CallEvent::Hangup).await {
            warn!("Hangup after failure raised: {}", e);
        }
    }

    /// Tears the session down: transport, listeners, connections, timers,
    /// then the backend.
    async fn shutdown(mut self, reason: LeaveReason) -> LeaveReason {
        info!("Leaving call: {:?}", reason);

        self.transport.close().await;

        self.subscriptions.clear();
        self.router.clear();

        self.peers.end_all().await;

        self.machine.cancel_pending();
        self.cancel_orphan_timers();

        if let Err(e) = self.backend.leave_call().await {
            warn!("Leaving the call on the backend failed: {}", e);
        }

        self.machine.set_state(CallState::Leaving);
        self.participants.clear();
        reason
    }

    fn schedule_orphan_expiry(&mut self, key: PeerKey) {
        let timers = self.timer_tx.clone();
        let delay = self.orphan_timeout;
        let expired = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = timers.send(TimerEvent::OrphanExpired(expired));
        });
        if let Some(previous) = self.orphan_timers.insert(key, timer) {
            previous.abort();
        }
    }

    fn cancel_orphan_timers(&mut self) {
        for (_, timer) in self.orphan_timers.drain() {
            timer.abort();
        }
    }

    fn adopt_session(&mut self, session_id: SessionId) {
        if session_id == self.local {
            return;
        }
        info!("Local session is now {}", session_id);
        self.local = session_id.clone();
        self.router.set_local_session(session_id.clone());
        self.peers.set_local_session(session_id);
    }

    /// The backend's id only counts when the transport did not assign one.
    fn adopt_backend_session(&mut self, session_id: Option<SessionId>) {
        if let Some(session_id) = session_id {
            if !self.transport_assigned_id {
                self.adopt_session(session_id);
            }
        }
    }

    fn join_flags(&self) -> InCallFlags {
        let mut flags = InCallFlags::IN_CALL;
        if self.local_media.audio {
            flags = flags | InCallFlags::WITH_AUDIO;
        }
        if self.local_media.video {
            flags = flags | InCallFlags::WITH_VIDEO;
        }
        flags
    }

    /// Announces local media state on the data channels. With `previous`,
    /// only what changed is sent.
    async fn announce_media(&self, previous: Option<LocalMedia>) {
        let media = self.local_media;
        let mut messages = Vec::new();
        if previous.is_none_or(|p| p.audio != media.audio) {
            messages.push(if media.audio {
                StatusMessage::AudioOn
            } else {
                StatusMessage::AudioOff
            });
        }
        if previous.is_none_or(|p| p.video != media.video) {
            messages.push(if media.video {
                StatusMessage::VideoOn
            } else {
                StatusMessage::VideoOff
            });
        }

        for message in messages {
            match message.encode() {
                Ok(data) => self.peers.broadcast_data(Bytes::from(data)).await,
                Err(e) => warn!("Failed to encode {}: {}", message.type_name(), e),
            }
        }
    }

    async fn raise_hand(&self, raised: bool) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .ok();
        let targets: Vec<SessionId> = self
            .roster
            .others_in_call(&self.local)
            .map(|e| e.session_id.clone())
            .collect();

        for to in targets {
            let payload = SignalPayload::Control(ControlSignal::RaiseHand {
                state: raised,
                timestamp,
            });
            let message = self.router.outbound(&to, StreamKind::Video, payload);
            self.output.send_signal(message).await;
        }
    }
}
