use talkwire_core::{PeerKey, WireError};
use thiserror::Error;

/// Failures of the signaling transport.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Relay rejected session: {0}")]
    Rejected(String),

    #[error("Handshake timed out")]
    HandshakeTimeout,

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Failures reported by the media engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine could not build a connection at all.
    #[error("Media engine unavailable: {0}")]
    Unavailable(String),

    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("Connection closed")]
    Closed,
}

#[derive(Error, Debug)]
#[error("Backend request failed: {0}")]
pub struct BackendError(pub String);

/// Call-scoped failures.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("Media engine unavailable: {0}")]
    MediaEngineUnavailable(String),

    #[error("Engine error: {0}")]
    Engine(EngineError),

    #[error("No live connection for {0}")]
    ConnectionMissing(PeerKey),

    #[error("Call session is closed")]
    SessionClosed,
}

impl From<EngineError> for CallError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Unavailable(reason) => CallError::MediaEngineUnavailable(reason),
            other => CallError::Engine(other),
        }
    }
}

impl CallError {
    /// Whether the error ends the call attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CallError::MediaEngineUnavailable(_) | CallError::SessionClosed
        )
    }
}
