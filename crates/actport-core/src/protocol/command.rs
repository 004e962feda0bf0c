//! Closed command set with an explicit forward-to-handler fallback.
//!
//! The fixed command table is represented as a tagged variant so dispatch is
//! exhaustively checked, while host-defined commands stay open through
//! [`Command::Other`].

use serde_json::{json, Value};

use crate::protocol::envelope::Envelope;
use crate::result::ActivityResultCode;

/// Parsed protocol command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Peer announces readiness; `accepts_channel` advertises willingness to
    /// upgrade to a dedicated transport.
    Connect { accepts_channel: bool },
    /// Client starts the activity. The carrying event may transfer one
    /// dedicated endpoint alongside this command.
    Start { args: Option<Value> },
    /// Custom application message, delivered to the custom-message callback
    /// and never to the command handler.
    Msg { payload: Value },
    /// Peer asks this side to create the named sub-channel (wire: `cnget`).
    ChannelRequest { name: String },
    /// Peer delivers the named sub-channel endpoint (wire: `cnset`); the
    /// carrying event transfers the endpoint itself.
    ChannelGrant { name: String },
    /// Host asks the client to re-check popup liveness on a short delay.
    Check,
    /// Terminal activity outcome.
    Result {
        code: ActivityResultCode,
        data: Value,
    },
    /// Courtesy close notification after a result was delivered.
    Close,
    /// Unrecognized command, forwarded verbatim to the handler.
    Other { cmd: String, payload: Option<Value> },
}

impl Command {
    /// Wire name of this command.
    pub fn cmd(&self) -> &str {
        match self {
            Command::Connect { .. } => "connect",
            Command::Start { .. } => "start",
            Command::Msg { .. } => "msg",
            Command::ChannelRequest { .. } => "cnget",
            Command::ChannelGrant { .. } => "cnset",
            Command::Check => "check",
            Command::Result { .. } => "result",
            Command::Close => "close",
            Command::Other { cmd, .. } => cmd,
        }
    }

    /// Map an inbound envelope onto the closed command set.
    ///
    /// Infallible: malformed payloads degrade to safe defaults (missing
    /// channel name becomes `""`, an unknown result code is treated as a
    /// failure) instead of tearing down the session.
    pub fn from_envelope(env: &Envelope) -> Command {
        let payload = env.payload.as_ref();
        match env.cmd.as_str() {
            "connect" => Command::Connect {
                accepts_channel: payload
                    .and_then(|p| p.get("acceptsChannel"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            "start" => Command::Start {
                args: env.payload.clone(),
            },
            "msg" => Command::Msg {
                payload: env.payload.clone().unwrap_or(Value::Null),
            },
            "cnget" => Command::ChannelRequest {
                name: channel_name(payload),
            },
            "cnset" => Command::ChannelGrant {
                name: channel_name(payload),
            },
            "check" => Command::Check,
            "result" => {
                let code = payload
                    .and_then(|p| p.get("code"))
                    .and_then(Value::as_str)
                    .and_then(ActivityResultCode::parse)
                    .unwrap_or(ActivityResultCode::Failed);
                let data = payload
                    .and_then(|p| p.get("data"))
                    .cloned()
                    .unwrap_or(Value::Null);
                Command::Result { code, data }
            }
            "close" => Command::Close,
            other => Command::Other {
                cmd: other.to_string(),
                payload: env.payload.clone(),
            },
        }
    }

    /// Build the envelope carrying this command.
    pub fn into_envelope(self) -> Envelope {
        match self {
            Command::Connect { accepts_channel } => Envelope::new(
                "connect",
                Some(json!({ "acceptsChannel": accepts_channel })),
            ),
            Command::Start { args } => Envelope::new("start", args),
            Command::Msg { payload } => Envelope::new("msg", Some(payload)),
            Command::ChannelRequest { name } => {
                Envelope::new("cnget", Some(json!({ "name": name })))
            }
            Command::ChannelGrant { name } => {
                Envelope::new("cnset", Some(json!({ "name": name })))
            }
            Command::Check => Envelope::new("check", None),
            Command::Result { code, data } => Envelope::new(
                "result",
                Some(json!({ "code": code.as_str(), "data": data })),
            ),
            Command::Close => Envelope::new("close", None),
            Command::Other { cmd, payload } => Envelope::new(cmd, payload),
        }
    }
}

fn channel_name(payload: Option<&Value>) -> String {
    payload
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
