use thiserror::Error;

/// Errors raised while decoding or encoding signaling traffic.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Unknown signaling message type: {0}")]
    UnknownSignal(String),

    #[error("Signaling message has no recipient")]
    MissingRecipient,
}
