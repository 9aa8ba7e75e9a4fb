use crate::error::WireError;
use crate::model::session::{SessionId, StreamKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
    pub candidate: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    fn parse(name: Option<&str>) -> Result<Self, WireError> {
        match name {
            Some("audio") => Ok(MediaKind::Audio),
            Some("video") => Ok(MediaKind::Video),
            other => Err(WireError::Malformed(format!("unknown media kind {:?}", other))),
        }
    }
}

/// Participant-level signals that do not affect negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlSignal {
    Mute { media: MediaKind },
    Unmute { media: MediaKind },
    RaiseHand { state: bool, timestamp: Option<i64> },
    NickChanged { name: String },
    Reaction { reaction: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalPayload {
    Offer { sdp: String, nick: Option<String> },
    Answer { sdp: String, nick: Option<String> },
    Candidate(IceCandidate),
    EndOfCandidates,
    /// The sender stopped sharing its screen.
    UnshareScreen,
    /// Asks the relay to send an offer for the sender's stream.
    RequestOffer,
    Control(ControlSignal),
}

impl SignalPayload {
    pub fn type_name(&self) -> &'static str {
        match self {
            SignalPayload::Offer { .. } => "offer",
            SignalPayload::Answer { .. } => "answer",
            SignalPayload::Candidate(_) => "candidate",
            SignalPayload::EndOfCandidates => "endOfCandidates",
            SignalPayload::UnshareScreen => "unshareScreen",
            SignalPayload::RequestOffer => "requestoffer",
            SignalPayload::Control(ControlSignal::Mute { .. }) => "mute",
            SignalPayload::Control(ControlSignal::Unmute { .. }) => "unmute",
            SignalPayload::Control(ControlSignal::RaiseHand { .. }) => "raiseHand",
            SignalPayload::Control(ControlSignal::NickChanged { .. }) => "nickChanged",
            SignalPayload::Control(ControlSignal::Reaction { .. }) => "reaction",
        }
    }

    /// Whether this payload is part of offer/answer negotiation for a single
    /// connection.
    pub fn is_negotiation(&self) -> bool {
        matches!(
            self,
            SignalPayload::Offer { .. }
                | SignalPayload::Answer { .. }
                | SignalPayload::Candidate(_)
                | SignalPayload::EndOfCandidates
                | SignalPayload::RequestOffer
        )
    }
}

/// Point-to-point signaling message scoped to `(session, stream kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSignal", into = "RawSignal")]
pub struct SignalingMessage {
    pub from: Option<SessionId>,
    pub to: Option<SessionId>,
    pub kind: StreamKind,
    pub sid: Option<String>,
    pub payload: SignalPayload,
}

impl SignalingMessage {
    pub fn new(kind: StreamKind, payload: SignalPayload) -> Self {
        Self {
            from: None,
            to: None,
            kind,
            sid: None,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSignal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    to: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from: Option<SessionId>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    room_type: Option<StreamKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<RawPayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawPayload {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sdp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nick: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    candidate: Option<IceCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reaction: Option<String>,
}

fn missing(kind: &str, field: &str) -> WireError {
    WireError::Malformed(format!("{} without {}", kind, field))
}

impl TryFrom<RawSignal> for SignalingMessage {
    type Error = WireError;

    fn try_from(raw: RawSignal) -> Result<Self, Self::Error> {
        let payload = raw.payload.unwrap_or_default();

        let body = match raw.kind.as_str() {
            "offer" => SignalPayload::Offer {
                sdp: payload.sdp.ok_or_else(|| missing("offer", "sdp"))?,
                nick: payload.nick,
            },
            "answer" => SignalPayload::Answer {
                sdp: payload.sdp.ok_or_else(|| missing("answer", "sdp"))?,
                nick: payload.nick,
            },
            "candidate" => SignalPayload::Candidate(
                payload
                    .candidate
                    .ok_or_else(|| missing("candidate", "candidate"))?,
            ),
            "endOfCandidates" => SignalPayload::EndOfCandidates,
            "unshareScreen" => SignalPayload::UnshareScreen,
            "requestoffer" => SignalPayload::RequestOffer,
            "mute" => SignalPayload::Control(ControlSignal::Mute {
                media: MediaKind::parse(payload.name.as_deref())?,
            }),
            "unmute" => SignalPayload::Control(ControlSignal::Unmute {
                media: MediaKind::parse(payload.name.as_deref())?,
            }),
            "raiseHand" => SignalPayload::Control(ControlSignal::RaiseHand {
                state: payload.state.unwrap_or(false),
                timestamp: payload.timestamp,
            }),
            "nickChanged" => SignalPayload::Control(ControlSignal::NickChanged {
                name: payload.name.ok_or_else(|| missing("nickChanged", "name"))?,
            }),
            "reaction" => SignalPayload::Control(ControlSignal::Reaction {
                reaction: payload
                    .reaction
                    .ok_or_else(|| missing("reaction", "reaction"))?,
            }),
            other => return Err(WireError::UnknownSignal(other.to_owned())),
        };

        Ok(Self {
            from: raw.from,
            to: raw.to,
            kind: raw.room_type.unwrap_or(StreamKind::Video),
            sid: raw.sid,
            payload: body,
        })
    }
}

impl From<SignalingMessage> for RawSignal {
    fn from(msg: SignalingMessage) -> Self {
        let kind = msg.payload.type_name().to_owned();

        let payload = match msg.payload {
            SignalPayload::Offer { sdp, nick } | SignalPayload::Answer { sdp, nick } => {
                Some(RawPayload {
                    kind: Some(kind.clone()),
                    sdp: Some(sdp),
                    nick,
                    ..Default::default()
                })
            }
            SignalPayload::Candidate(candidate) => Some(RawPayload {
                kind: Some(kind.clone()),
                candidate: Some(candidate),
                ..Default::default()
            }),
            SignalPayload::EndOfCandidates
            | SignalPayload::UnshareScreen
            | SignalPayload::RequestOffer => None,
            SignalPayload::Control(ControlSignal::Mute { media })
            | SignalPayload::Control(ControlSignal::Unmute { media }) => Some(RawPayload {
                name: Some(media.as_str().to_owned()),
                ..Default::default()
            }),
            SignalPayload::Control(ControlSignal::RaiseHand { state, timestamp }) => {
                Some(RawPayload {
                    state: Some(state),
                    timestamp,
                    ..Default::default()
                })
            }
            SignalPayload::Control(ControlSignal::NickChanged { name }) => Some(RawPayload {
                name: Some(name),
                ..Default::default()
            }),
            SignalPayload::Control(ControlSignal::Reaction { reaction }) => Some(RawPayload {
                reaction: Some(reaction),
                ..Default::default()
            }),
        };

        RawSignal {
            to: msg.to,
            from: msg.from,
            kind,
            room_type: Some(msg.kind),
            sid: msg.sid,
            payload,
        }
    }
}
