use crate::model::participant::RosterEntry;
use crate::model::session::SessionId;
use crate::model::signaling::SignalingMessage;

/// A decoded inbound signaling envelope, independent of the transport framing.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEnvelope {
    /// Whole-roster snapshot (`usersInRoom` / participants update).
    Roster(Vec<RosterEntry>),

    /// Point-to-point negotiation or control message.
    Signal(SignalingMessage),

    /// A moderator ended the call for every participant.
    CallEndedForEveryone,

    /// Relay handshake completed.
    Welcome {
        session_id: SessionId,
        resume_id: Option<String>,
    },

    /// Relay closed the session.
    Bye { reason: Option<String> },

    /// Relay reported an error.
    Error { code: String, message: Option<String> },
}
