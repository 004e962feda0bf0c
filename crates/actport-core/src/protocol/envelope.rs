//! Command envelope (JSON).
//!
//! The sentinel defends against unrelated cross-context traffic: any inbound
//! value lacking the exact tag is not part of the protocol and decodes to
//! `None`, never to an error.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Marker distinguishing protocol envelopes from unrelated traffic.
///
/// Process-wide constant with no mutable state; both roles hardcode it.
pub const SENTINEL: &str = "__ACTIVITIES__";

/// Command envelope, identical on both transports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Protocol sentinel, always [`SENTINEL`].
    pub sentinel: String,
    /// Command name (e.g. "connect", "start", "result").
    pub cmd: String,
    /// Optional payload.
    #[serde(default)]
    pub payload: Option<Value>,
}

impl Envelope {
    pub fn new(cmd: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            sentinel: SENTINEL.to_string(),
            cmd: cmd.into(),
            payload,
        }
    }

    /// Decode an inbound value.
    ///
    /// Returns `None` when the sentinel is missing or wrong, or when the
    /// command name is absent; such traffic is ignored by design.
    pub fn decode(value: &Value) -> Option<Envelope> {
        if value.get("sentinel").and_then(Value::as_str) != Some(SENTINEL) {
            tracing::debug!("dropping inbound message without protocol sentinel");
            return None;
        }
        let cmd = value.get("cmd").and_then(Value::as_str)?.to_string();
        let payload = match value.get("payload") {
            None | Some(Value::Null) => None,
            Some(p) => Some(p.clone()),
        };
        Some(Envelope {
            sentinel: SENTINEL.to_string(),
            cmd,
            payload,
        })
    }

    /// Encode to a JSON value for posting. Infallible.
    pub fn encode(&self) -> Value {
        json!({
            "sentinel": SENTINEL,
            "cmd": self.cmd,
            "payload": self.payload,
        })
    }
}
