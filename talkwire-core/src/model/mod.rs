mod envelope;
mod participant;
mod session;
mod signaling;
mod status;

pub use envelope::InboundEnvelope;
pub use participant::{InCallFlags, RosterEntry};
pub use session::{PeerKey, SessionId, StreamKind};
pub use signaling::{
    ControlSignal, IceCandidate, IceServerConfig, MediaKind, SignalPayload, SignalingMessage,
};
pub use status::StatusMessage;
