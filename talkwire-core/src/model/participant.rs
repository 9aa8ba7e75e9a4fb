use crate::model::session::SessionId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Call participation bitmask as reported by the backend (`inCall`).
#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq)]
pub struct InCallFlags(pub u8);

impl InCallFlags {
    pub const DISCONNECTED: InCallFlags = InCallFlags(0);
    pub const IN_CALL: InCallFlags = InCallFlags(1);
    pub const WITH_AUDIO: InCallFlags = InCallFlags(2);
    pub const WITH_VIDEO: InCallFlags = InCallFlags(4);
    pub const WITH_PHONE: InCallFlags = InCallFlags(8);

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: InCallFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_in_call(&self) -> bool {
        self.contains(Self::IN_CALL)
    }

    /// Whether the participant publishes audio or video.
    pub fn has_audio_or_video(&self) -> bool {
        self.0 & (Self::WITH_AUDIO.0 | Self::WITH_VIDEO.0) != 0
    }

    pub fn with(self, other: InCallFlags) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for InCallFlags {
    type Output = InCallFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.with(rhs)
    }
}

impl Serialize for InCallFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

// Older backends report `inCall` as a boolean.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawInCall {
    Flags(u8),
    Legacy(bool),
}

impl<'de> Deserialize<'de> for InCallFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawInCall::deserialize(deserializer)? {
            RawInCall::Flags(bits) => InCallFlags(bits),
            RawInCall::Legacy(true) => InCallFlags::IN_CALL,
            RawInCall::Legacy(false) => InCallFlags::DISCONNECTED,
        })
    }
}

/// One participant in a whole-roster snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub session_id: SessionId,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub in_call: InCallFlags,
    #[serde(default)]
    pub internal: bool,
}

impl RosterEntry {
    pub fn new(session_id: impl Into<SessionId>, in_call: InCallFlags) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: None,
            display_name: String::new(),
            in_call,
            internal: false,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.display_name = display_name.into();
        self
    }
}

fn empty_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}
