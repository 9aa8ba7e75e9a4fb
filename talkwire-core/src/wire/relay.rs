use crate::error::WireError;
use crate::model::{InboundEnvelope, RosterEntry, SessionId, SignalingMessage};
use serde_json::{Value, json};
use tracing::debug;

const PROTOCOL_VERSION: &str = "2.0";

/// Decodes one text frame received from the relay.
///
/// Returns `Ok(None)` for well-formed frames the call engine does not use.
pub fn decode_frame(text: &str) -> Result<Option<InboundEnvelope>, WireError> {
    let root: Value = serde_json::from_str(text)?;
    let kind = root
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| WireError::Malformed("frame without type".to_owned()))?;

    match kind {
        "hello" => {
            let hello = field(&root, "hello")?;
            let session_id = hello
                .get("sessionid")
                .and_then(Value::as_str)
                .ok_or_else(|| WireError::Malformed("hello without sessionid".to_owned()))?;
            Ok(Some(InboundEnvelope::Welcome {
                session_id: SessionId::from(session_id),
                resume_id: str_field(hello, "resumeid"),
            }))
        }
        "message" => {
            let message = field(&root, "message")?;
            let data = field(message, "data")?.clone();
            let mut msg: SignalingMessage = match data {
                Value::String(text) => serde_json::from_str(&text)?,
                other => serde_json::from_value(other)?,
            };
            if msg.from.is_none() {
                msg.from = message
                    .pointer("/sender/sessionid")
                    .and_then(Value::as_str)
                    .map(SessionId::from);
            }
            Ok(Some(InboundEnvelope::Signal(msg)))
        }
        "event" => decode_event(field(&root, "event")?),
        "bye" => Ok(Some(InboundEnvelope::Bye {
            reason: root.get("bye").and_then(|b| str_field(b, "reason")),
        })),
        "error" => {
            let error = field(&root, "error")?;
            Ok(Some(InboundEnvelope::Error {
                code: str_field(error, "code").unwrap_or_default(),
                message: str_field(error, "message"),
            }))
        }
        other => {
            debug!("Ignoring relay frame of type {}", other);
            Ok(None)
        }
    }
}

fn decode_event(event: &Value) -> Result<Option<InboundEnvelope>, WireError> {
    let target = event.get("target").and_then(Value::as_str);
    let kind = event.get("type").and_then(Value::as_str);
    if target != Some("participants") || kind != Some("update") {
        debug!("Ignoring relay event {:?}/{:?}", target, kind);
        return Ok(None);
    }

    let update = field(event, "update")?;
    let everyone = update.get("all").and_then(Value::as_bool).unwrap_or(false);
    if everyone {
        let in_call = match update.get("incall") {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0) != 0,
            _ => true,
        };
        if !in_call {
            return Ok(Some(InboundEnvelope::CallEndedForEveryone));
        }
        return Ok(None);
    }

    match update.get("users") {
        Some(users) => {
            let users: Vec<RosterEntry> = serde_json::from_value(users.clone())?;
            Ok(Some(InboundEnvelope::Roster(users)))
        }
        None => Ok(None),
    }
}

/// Encodes the handshake frame, resuming `resume_id` when given.
pub fn encode_hello(resume_id: Option<&str>, auth: Option<&Value>) -> Result<String, WireError> {
    let mut hello = json!({ "version": PROTOCOL_VERSION });
    if let Some(resume_id) = resume_id {
        hello["resumeid"] = Value::from(resume_id);
    } else if let Some(auth) = auth {
        hello["auth"] = auth.clone();
    }
    Ok(serde_json::to_string(&json!({ "type": "hello", "hello": hello }))?)
}

/// Encodes a signaling message addressed to its `to` session.
pub fn encode_message(msg: &SignalingMessage) -> Result<String, WireError> {
    let recipient = msg.to.as_ref().ok_or(WireError::MissingRecipient)?;
    let data = serde_json::to_value(msg)?;
    let frame = json!({
        "type": "message",
        "message": {
            "recipient": { "type": "session", "sessionid": recipient.as_str() },
            "data": data,
        }
    });
    Ok(serde_json::to_string(&frame)?)
}

fn field<'a>(value: &'a Value, name: &str) -> Result<&'a Value, WireError> {
    value
        .get(name)
        .ok_or_else(|| WireError::Malformed(format!("missing {}", name)))
}

fn str_field(value: &Value, name: &str) -> Option<String> {
    value.get(name).and_then(Value::as_str).map(str::to_owned)
}
