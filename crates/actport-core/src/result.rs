//! Activity result values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How the activity is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityMode {
    Iframe,
    Popup,
    Redirect,
}

impl ActivityMode {
    /// String representation used in serialized payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityMode::Iframe => "iframe",
            ActivityMode::Popup => "popup",
            ActivityMode::Redirect => "redirect",
        }
    }
}

/// Terminal outcome code of one activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityResultCode {
    Ok,
    Canceled,
    Failed,
}

impl ActivityResultCode {
    /// String representation used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityResultCode::Ok => "ok",
            ActivityResultCode::Canceled => "canceled",
            ActivityResultCode::Failed => "failed",
        }
    }

    /// Parse a wire code. Unknown codes yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(ActivityResultCode::Ok),
            "canceled" => Some(ActivityResultCode::Canceled),
            "failed" => Some(ActivityResultCode::Failed),
            _ => None,
        }
    }
}

/// Immutable terminal value of one activity, produced exactly once.
///
/// Invariants are normalized by [`ActivityResult::new`]: `data` is kept only
/// when the code is `Ok`, and `error` is constructed only when the code is
/// `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityResult {
    code: ActivityResultCode,
    data: Option<Value>,
    error: Option<String>,
    mode: ActivityMode,
    origin: String,
    origin_verified: bool,
    secure_channel: bool,
}

impl ActivityResult {
    pub fn new(
        code: ActivityResultCode,
        data: Option<Value>,
        mode: ActivityMode,
        origin: impl Into<String>,
        origin_verified: bool,
        secure_channel: bool,
    ) -> Self {
        let error = match code {
            // The host-provided reason, defaulting to empty string.
            ActivityResultCode::Failed => Some(match &data {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(v) => v.to_string(),
            }),
            _ => None,
        };
        let data = match code {
            ActivityResultCode::Ok => data,
            _ => None,
        };
        Self {
            code,
            data,
            error,
            mode,
            origin: origin.into(),
            origin_verified,
            secure_channel,
        }
    }

    pub fn code(&self) -> ActivityResultCode {
        self.code
    }
    /// Result payload; non-null only when `code() == Ok`.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }
    /// Host-provided failure reason; present only when `code() == Failed`.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }
    pub fn mode(&self) -> ActivityMode {
        self.mode
    }
    /// Origin of the host context that produced this result.
    pub fn origin(&self) -> &str {
        &self.origin
    }
    /// Whether the origin was established from a verified message exchange
    /// rather than declared data.
    pub fn origin_verified(&self) -> bool {
        self.origin_verified
    }
    /// Whether the result traveled over a verified message channel rather
    /// than a URL.
    pub fn secure_channel(&self) -> bool {
        self.secure_channel
    }
    pub fn ok(&self) -> bool {
        self.code == ActivityResultCode::Ok
    }
}
