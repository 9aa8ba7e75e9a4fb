use std::collections::BTreeMap;
use std::sync::Arc;
use talkwire_core::{
    ControlSignal, InCallFlags, MediaKind, PeerKey, RosterEntry, SessionId, StatusMessage,
    StreamKind,
};
use tokio::sync::watch;
use tracing::debug;

/// What the UI shows for one remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantView {
    pub session_id: SessionId,
    pub user_id: Option<String>,
    pub display_name: String,
    pub in_call: InCallFlags,
    /// The camera/microphone connection is established.
    pub connected: bool,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub speaking: bool,
    pub screen_shared: bool,
    pub hand_raised: bool,
    pub last_reaction: Option<String>,
}

impl ParticipantView {
    fn from_entry(entry: &RosterEntry) -> Self {
        Self {
            session_id: entry.session_id.clone(),
            user_id: entry.user_id.clone(),
            display_name: entry.display_name.clone(),
            in_call: entry.in_call,
            connected: false,
            audio_enabled: entry.in_call.contains(InCallFlags::WITH_AUDIO),
            video_enabled: entry.in_call.contains(InCallFlags::WITH_VIDEO),
            speaking: false,
            screen_shared: false,
            hand_raised: false,
            last_reaction: None,
        }
    }
}

pub type ParticipantViews = Arc<BTreeMap<SessionId, ParticipantView>>;

/// Folds roster, connection and status traffic into immutable participant
/// snapshots for the UI.
pub struct ParticipantProjector {
    views: BTreeMap<SessionId, ParticipantView>,
    publisher: watch::Sender<ParticipantViews>,
}

impl Default for ParticipantProjector {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticipantProjector {
    pub fn new() -> Self {
        let (publisher, _) = watch::channel(Arc::new(BTreeMap::new()));
        Self {
            views: BTreeMap::new(),
            publisher,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ParticipantViews> {
        self.publisher.subscribe()
    }

    pub fn snapshot(&self) -> ParticipantViews {
        self.publisher.borrow().clone()
    }

    /// Rebuilds the participant list from the roster: remote entries in the
    /// call are kept, their connection and status state carried over.
    pub fn on_roster(&mut self, entries: &[RosterEntry], local: &SessionId) {
        let mut views = BTreeMap::new();
        for entry in entries {
            if entry.session_id == *local || !entry.in_call.is_in_call() {
                continue;
            }
            let view = match self.views.remove(&entry.session_id) {
                Some(mut view) => {
                    if view.in_call != entry.in_call {
                        view.audio_enabled = entry.in_call.contains(InCallFlags::WITH_AUDIO);
                        view.video_enabled = entry.in_call.contains(InCallFlags::WITH_VIDEO);
                    }
                    view.user_id = entry.user_id.clone();
                    view.display_name = entry.display_name.clone();
                    view.in_call = entry.in_call;
                    view
                }
                None => ParticipantView::from_entry(entry),
            };
            views.insert(entry.session_id.clone(), view);
        }
        self.views = views;
        self.publish();
    }

    pub fn on_connected(&mut self, key: &PeerKey) {
        self.update(&key.session_id, |view| match key.kind {
            StreamKind::Video => view.connected = true,
            StreamKind::Screen => view.screen_shared = true,
        });
    }

    /// A connection failed or was withdrawn by the remote.
    pub fn on_connection_lost(&mut self, key: &PeerKey) {
        match key.kind {
            StreamKind::Video => {
                if self.views.remove(&key.session_id).is_some() {
                    debug!("Removed view of {} after its connection failed", key.session_id);
                    self.publish();
                }
            }
            StreamKind::Screen => self.update(&key.session_id, |view| view.screen_shared = false),
        }
    }

    pub fn remove(&mut self, session_id: &SessionId) {
        if self.views.remove(session_id).is_some() {
            self.publish();
        }
    }

    pub fn on_control(&mut self, from: &SessionId, signal: &ControlSignal) {
        self.update(from, |view| match signal {
            ControlSignal::Mute { media: MediaKind::Audio } => view.audio_enabled = false,
            ControlSignal::Mute { media: MediaKind::Video } => view.video_enabled = false,
            ControlSignal::Unmute { media: MediaKind::Audio } => view.audio_enabled = true,
            ControlSignal::Unmute { media: MediaKind::Video } => view.video_enabled = true,
            ControlSignal::RaiseHand { state, .. } => view.hand_raised = *state,
            ControlSignal::NickChanged { name } => view.display_name = name.clone(),
            ControlSignal::Reaction { reaction } => view.last_reaction = Some(reaction.clone()),
        });
    }

    /// Applies a data-channel payload. Unknown or malformed payloads are
    /// dropped.
    pub fn on_data(&mut self, from: &SessionId, data: &[u8]) {
        let status = match StatusMessage::decode(data) {
            Ok(status) => status,
            Err(e) => {
                debug!("Ignoring data channel message from {}: {}", from, e);
                return;
            }
        };
        self.update(from, |view| match status {
            StatusMessage::AudioOn => view.audio_enabled = true,
            StatusMessage::AudioOff => {
                view.audio_enabled = false;
                view.speaking = false;
            }
            StatusMessage::VideoOn => view.video_enabled = true,
            StatusMessage::VideoOff => view.video_enabled = false,
            StatusMessage::Speaking => view.speaking = true,
            StatusMessage::StoppedSpeaking => view.speaking = false,
            StatusMessage::NickChanged { name } => view.display_name = name,
        });
    }

    pub fn clear(&mut self) {
        if !self.views.is_empty() {
            self.views.clear();
            self.publish();
        }
    }

    fn update(&mut self, session_id: &SessionId, apply: impl FnOnce(&mut ParticipantView)) {
        let Some(view) = self.views.get_mut(session_id) else {
            debug!("No participant view for {}", session_id);
            return;
        };
        let before = view.clone();
        apply(view);
        if *view != before {
            self.publish();
        }
    }

    fn publish(&self) {
        self.publisher.send_replace(Arc::new(self.views.clone()));
    }
}
