use crate::error::WireError;
use crate::model::{InboundEnvelope, RosterEntry, SessionId, SignalingMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

const EVENT_MESSAGE: &str = "message";

/// Outbound wrapper around one signaling message.
///
/// Field order is part of the wire contract: `fn`, `sessionId`, `ev`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageWrapper {
    /// JSON-escaped inner [`SignalingMessage`].
    #[serde(rename = "fn")]
    pub signaling: String,
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    pub ev: String,
}

impl MessageWrapper {
    pub fn unwrap_message(&self) -> Result<SignalingMessage, WireError> {
        Ok(serde_json::from_str(&self.signaling)?)
    }
}

pub fn wrap(local: &SessionId, msg: &SignalingMessage) -> Result<MessageWrapper, WireError> {
    Ok(MessageWrapper {
        signaling: serde_json::to_string(msg)?,
        session_id: local.clone(),
        ev: EVENT_MESSAGE.to_owned(),
    })
}

/// Encodes the `messages` body of an outbound signaling request.
pub fn encode_messages(local: &SessionId, msgs: &[SignalingMessage]) -> Result<String, WireError> {
    let wrappers = msgs
        .iter()
        .map(|m| wrap(local, m))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(serde_json::to_string(&wrappers)?)
}

/// Decodes one long-poll response body.
///
/// Accepts the OCS envelope (`{"ocs":{"data":[...]}}`) or a bare entry list.
/// Individual malformed entries are dropped; only an undecodable body is an
/// error.
pub fn decode_poll_response(body: &str) -> Result<Vec<InboundEnvelope>, WireError> {
    let root: Value = serde_json::from_str(body)?;

    let entries = match root.pointer("/ocs/data").unwrap_or(&root) {
        Value::Array(entries) => entries,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(WireError::Malformed(format!(
                "expected entry list, got {}",
                other
            )));
        }
    };

    let mut envelopes = Vec::with_capacity(entries.len());
    for entry in entries {
        match decode_entry(entry) {
            Ok(Some(envelope)) => envelopes.push(envelope),
            Ok(None) => {}
            Err(e) => warn!("Dropping malformed signaling entry: {}", e),
        }
    }
    Ok(envelopes)
}

fn decode_entry(entry: &Value) -> Result<Option<InboundEnvelope>, WireError> {
    let kind = entry
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| WireError::Malformed("entry without type".to_owned()))?;
    let data = entry.get("data").cloned().unwrap_or(Value::Null);

    match kind {
        "usersInRoom" => {
            let users: Vec<RosterEntry> = serde_json::from_value(data)?;
            Ok(Some(InboundEnvelope::Roster(users)))
        }
        "message" => {
            let msg: SignalingMessage = match data {
                Value::String(text) => serde_json::from_str(&text)?,
                other => serde_json::from_value(other)?,
            };
            Ok(Some(InboundEnvelope::Signal(msg)))
        }
        other => {
            debug!("Ignoring signaling entry of type {}", other);
            Ok(None)
        }
    }
}
