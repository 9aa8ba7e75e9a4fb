use crate::error::WireError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Media status a participant announces over the data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    AudioOn,
    AudioOff,
    VideoOn,
    VideoOff,
    Speaking,
    StoppedSpeaking,
    NickChanged { name: String },
}

#[derive(Serialize, Deserialize)]
struct RawStatus {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
}

impl StatusMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            StatusMessage::AudioOn => "audioOn",
            StatusMessage::AudioOff => "audioOff",
            StatusMessage::VideoOn => "videoOn",
            StatusMessage::VideoOff => "videoOff",
            StatusMessage::Speaking => "speaking",
            StatusMessage::StoppedSpeaking => "stoppedSpeaking",
            StatusMessage::NickChanged { .. } => "nickChanged",
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let raw: RawStatus = serde_json::from_slice(data)?;
        Ok(match raw.kind.as_str() {
            "audioOn" => StatusMessage::AudioOn,
            "audioOff" => StatusMessage::AudioOff,
            "videoOn" => StatusMessage::VideoOn,
            "videoOff" => StatusMessage::VideoOff,
            "speaking" => StatusMessage::Speaking,
            "stoppedSpeaking" => StatusMessage::StoppedSpeaking,
            "nickChanged" => {
                // Older clients send the bare name as payload.
                let name = match raw.payload {
                    Some(Value::String(name)) => name,
                    Some(Value::Object(map)) => match map.get("name") {
                        Some(Value::String(name)) => name.clone(),
                        _ => return Err(WireError::Malformed("nickChanged without name".into())),
                    },
                    _ => return Err(WireError::Malformed("nickChanged without name".into())),
                };
                StatusMessage::NickChanged { name }
            }
            other => return Err(WireError::UnknownSignal(other.to_owned())),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let payload = match self {
            StatusMessage::NickChanged { name } => {
                let mut map = serde_json::Map::new();
                map.insert("name".to_owned(), Value::String(name.clone()));
                Some(Value::Object(map))
            }
            _ => None,
        };
        let raw = RawStatus {
            kind: self.type_name().to_owned(),
            payload,
        };
        Ok(serde_json::to_vec(&raw)?)
    }
}
