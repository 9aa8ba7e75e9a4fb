use crate::error::EngineError;
use crate::peer::engine_event::EngineEvent;
use async_trait::async_trait;
use bytes::Bytes;
use talkwire_core::{IceCandidate, IceServerConfig, PeerKey};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// What the local device can capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaCapabilities {
    pub audio: bool,
    pub video: bool,
}

/// Local streams the user currently publishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalMedia {
    pub audio: bool,
    pub video: bool,
}

impl LocalMedia {
    pub fn is_empty(&self) -> bool {
        !self.audio && !self.video
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Parameters for one new connection.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub key: PeerKey,
    pub generation: u64,
    /// Local outgoing connection towards the relay.
    pub publisher: bool,
    /// Receive-only connection from the relay.
    pub receive_only: bool,
    pub create_data_channel: bool,
    pub ice_servers: Vec<IceServerConfig>,
}

/// Factory for media connections.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    fn capabilities(&self) -> MediaCapabilities;

    /// Builds a connection that posts its callbacks to `events`.
    ///
    /// [`EngineError::Unavailable`] means the engine itself is unusable and
    /// is fatal to the call attempt.
    async fn create_connection(
        &self,
        options: ConnectionOptions,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<Box<dyn MediaConnection>, EngineError>;
}

/// One media connection owned by the connection manager.
#[async_trait]
pub trait MediaConnection: Send + Sync {
    /// Creates an offer and applies it as the local description.
    async fn create_offer(&self) -> Result<String, EngineError>;

    /// Creates an answer and applies it as the local description.
    async fn create_answer(&self) -> Result<String, EngineError>;

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<(), EngineError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError>;

    async fn attach_local_media(&self, media: LocalMedia) -> Result<(), EngineError>;

    async fn detach_local_media(&self) -> Result<(), EngineError>;

    async fn send_data(&self, data: Bytes) -> Result<(), EngineError>;

    /// Releases every resource of the connection. Idempotent.
    async fn close(&self);
}
