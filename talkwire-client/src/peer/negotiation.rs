use crate::peer::media_engine::IceConnectionState;
use std::fmt;
use talkwire_core::IceCandidate;

/// Negotiation progress of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    New,
    /// Local offer sent, waiting for the answer.
    Offering,
    /// Remote offer applied, answer sent.
    Answering,
    Connected,
    Failed,
    Closed,
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Per-connection negotiation state machine.
///
/// Remote candidates that arrive before the remote description are held back
/// and handed out once [`Negotiation::remote_description_applied`] is called.
#[derive(Debug)]
pub struct Negotiation {
    state: NegotiationState,
    remote_description: bool,
    pending_candidates: Vec<IceCandidate>,
}

impl Default for Negotiation {
    fn default() -> Self {
        Self::new()
    }
}

impl Negotiation {
    pub fn new() -> Self {
        Self {
            state: NegotiationState::New,
            remote_description: false,
            pending_candidates: Vec::new(),
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, NegotiationState::Failed | NegotiationState::Closed)
    }

    pub fn has_remote_description(&self) -> bool {
        self.remote_description
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Starts a local offer. Only a fresh connection offers.
    pub fn start_offer(&mut self) -> bool {
        if self.state != NegotiationState::New {
            return false;
        }
        self.state = NegotiationState::Offering;
        true
    }

    /// Decides whether a remote offer is taken.
    ///
    /// An offerer with its own offer in flight ignores the competing one;
    /// the remote side gives way on its end.
    pub fn accept_remote_offer(&mut self, offerer: bool) -> bool {
        match self.state {
            NegotiationState::Offering if offerer => false,
            NegotiationState::Failed | NegotiationState::Closed => false,
            _ => {
                self.state = NegotiationState::Answering;
                self.remote_description = false;
                true
            }
        }
    }

    /// Whether an answer is expected at all.
    pub fn accept_remote_answer(&self) -> bool {
        self.state == NegotiationState::Offering && !self.remote_description
    }

    /// Marks the remote description as applied and returns the candidates
    /// held back until now, in arrival order.
    pub fn remote_description_applied(&mut self) -> Vec<IceCandidate> {
        self.remote_description = true;
        std::mem::take(&mut self.pending_candidates)
    }

    /// Returns the candidate if it can be applied right away, otherwise
    /// queues it.
    pub fn remote_candidate(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.is_terminal() {
            return None;
        }
        if self.remote_description {
            return Some(candidate);
        }
        self.pending_candidates.push(candidate);
        None
    }

    /// Folds an ICE state change in. Returns true when the negotiation state
    /// changed.
    pub fn ice_state_changed(&mut self, ice: IceConnectionState) -> bool {
        if self.is_terminal() {
            return false;
        }
        let next = match ice {
            IceConnectionState::Connected | IceConnectionState::Completed => {
                NegotiationState::Connected
            }
            IceConnectionState::Failed => NegotiationState::Failed,
            IceConnectionState::Closed => NegotiationState::Closed,
            _ => return false,
        };
        let changed = next != self.state;
        self.state = next;
        changed
    }

    pub fn fail(&mut self) {
        if self.state != NegotiationState::Closed {
            self.state = NegotiationState::Failed;
        }
        self.pending_candidates.clear();
    }

    pub fn close(&mut self) {
        self.state = NegotiationState::Closed;
        self.pending_candidates.clear();
    }
}
