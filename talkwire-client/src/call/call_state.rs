use std::fmt;

/// Lifecycle state of one call attempt. Starts at `Connecting`, ends at
/// `Leaving`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    Connecting,
    CallingTimeout,
    Joined,
    InConversation,
    Reconnecting,
    Offline,
    PublisherFailed,
    Leaving,
}

impl CallState {
    pub const ALL: [CallState; 8] = [
        CallState::Connecting,
        CallState::CallingTimeout,
        CallState::Joined,
        CallState::InConversation,
        CallState::Reconnecting,
        CallState::Offline,
        CallState::PublisherFailed,
        CallState::Leaving,
    ];

    /// Whether the local participant is in the call and roster changes
    /// should drive connections.
    pub fn is_active(&self) -> bool {
        matches!(self, CallState::Joined | CallState::InConversation)
    }

    pub fn is_terminal(&self) -> bool {
        *self == CallState::Leaving
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything that can move the call state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEvent {
    /// The backend accepted the join request.
    JoinAccepted,
    /// Nobody else showed up while ringing.
    RingingTimeout,
    /// The roster shows at least one other participant in the call.
    OthersActive,
    /// The user asked to try again.
    UserRetry,
    /// The local participant dropped out of the roster or a moderator ended
    /// the call.
    EndedRemotely,
    PublisherConnectionFailed,
    /// Delayed retry after a publisher failure.
    AutoRetry,
    /// The transport came back without session continuity, or gave up.
    TransportLostWithoutResume,
    /// The transport dropped but may resume the session.
    TransportInterrupted,
    /// The transport resumed the previous session.
    TransportResumed { others_active: bool },
    RejoinFailed,
    Hangup,
}

/// The transition table. Returns `None` when the event does not apply to the
/// state, which leaves the state and its timers untouched.
pub fn next_state(state: CallState, event: &CallEvent) -> Option<CallState> {
    use CallEvent as E;
    use CallState as S;

    if state == S::Leaving {
        return None;
    }

    match (state, event) {
        (_, E::Hangup) => Some(S::Leaving),
        (_, E::PublisherConnectionFailed) => Some(S::PublisherFailed),
        (_, E::TransportLostWithoutResume) => Some(S::Reconnecting),

        (S::Connecting, E::JoinAccepted) => Some(S::Joined),
        (S::Reconnecting, E::JoinAccepted) => Some(S::Joined),
        (S::Reconnecting, E::RejoinFailed) => Some(S::Leaving),

        (S::Joined, E::RingingTimeout) => Some(S::CallingTimeout),
        (S::Joined, E::OthersActive) => Some(S::InConversation),
        (S::CallingTimeout, E::UserRetry) => Some(S::Reconnecting),
        (S::PublisherFailed, E::AutoRetry) => Some(S::Reconnecting),

        (S::Joined | S::InConversation, E::EndedRemotely) => Some(S::Leaving),

        (S::Joined | S::InConversation, E::TransportInterrupted) => Some(S::Offline),
        (S::Offline, E::TransportResumed { others_active: true }) => Some(S::InConversation),
        (S::Offline, E::TransportResumed { others_active: false }) => Some(S::Joined),

        _ => None,
    }
}
