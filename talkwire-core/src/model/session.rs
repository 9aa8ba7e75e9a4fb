use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of one participant's signaling endpoint.
///
/// Only valid for a single call attempt; a reconnecting participant shows up
/// with a fresh id.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of media stream negotiated as an independent connection.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Camera and microphone.
    Video,
    /// Screen share.
    Screen,
}

impl StreamKind {
    pub const ALL: [StreamKind; 2] = [StreamKind::Video, StreamKind::Screen];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Screen => "screen",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of a media connection: at most one live connection exists per key.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct PeerKey {
    pub session_id: SessionId,
    pub kind: StreamKind,
}

impl PeerKey {
    pub fn new(session_id: SessionId, kind: StreamKind) -> Self {
        Self { session_id, kind }
    }

    pub fn video(session_id: SessionId) -> Self {
        Self::new(session_id, StreamKind::Video)
    }

    pub fn screen(session_id: SessionId) -> Self {
        Self::new(session_id, StreamKind::Screen)
    }
}

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_id, self.kind)
    }
}
