use serde::{Deserialize, Serialize};
use std::time::Duration;
use talkwire_core::IceServerConfig;

use crate::transport::BackoffPolicy;

/// How media connections are laid out between participants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Full mesh, one connection per remote participant and stream kind.
    #[default]
    Mesh,
    /// Star through a relay: one publishing connection plus one receive-only
    /// connection per remote publisher.
    Relay,
}

/// Configuration of one call attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    pub topology: Topology,

    /// Time spent in `Joined` without anybody else before giving up ringing.
    #[serde(with = "duration_ms", rename = "ringing_timeout_ms")]
    pub ringing_timeout: Duration,

    /// Delay before retrying after the publishing connection failed.
    #[serde(with = "duration_ms", rename = "publisher_retry_delay_ms")]
    pub publisher_retry_delay: Duration,

    /// How long a connection created for a session missing from the roster
    /// may live before it is reclaimed.
    #[serde(with = "duration_ms", rename = "orphan_timeout_ms")]
    pub orphan_timeout: Duration,

    pub backoff: BackoffPolicy,

    pub ice_servers: Vec<IceServerConfig>,

    /// Nick advertised in offers and answers.
    pub nick: Option<String>,

    /// Authentication block sent in the relay handshake.
    pub relay_auth: Option<serde_json::Value>,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            topology: Topology::Mesh,
            ringing_timeout: Duration::from_secs(45),
            publisher_retry_delay: Duration::from_secs(2),
            orphan_timeout: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
            ice_servers: vec![IceServerConfig {
                urls: vec!["stun:stun.l.google.com:19302".to_owned()],
                username: None,
                credential: None,
            }],
            nick: None,
            relay_auth: None,
        }
    }
}

impl CallConfig {
    pub fn relay() -> Self {
        Self {
            topology: Topology::Relay,
            ..Self::default()
        }
    }
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
