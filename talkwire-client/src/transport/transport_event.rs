use talkwire_core::{InboundEnvelope, SessionId};

/// Connection health as observed by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionHealth {
    /// Traffic flows again after failures.
    Connected,

    /// Requests are failing; retrying with backoff.
    Degraded { failures: u32 },

    /// The persistent connection dropped; a resume will be attempted.
    Interrupted,

    /// The connection came back and the relay resumed the previous session.
    Resumed,

    /// The connection came back as a fresh session: there was no resume id
    /// or the relay refused it. Message continuity is lost.
    Reconnected { session_id: Option<SessionId> },

    /// Retries exhausted the escalation bound.
    Lost,
}

/// Events a transport posts to the call session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Envelope(InboundEnvelope),
    Health(ConnectionHealth),
}
