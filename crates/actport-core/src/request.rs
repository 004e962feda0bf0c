//! Activity request and redirect-result payloads carried in URL fragments.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ActivityError, Result};
use crate::result::ActivityResultCode;

/// Fragment parameter carrying the serialized outbound request.
pub const REQUEST_PARAM: &str = "__WA__";
/// Fragment parameter carrying the serialized inbound result.
pub const RESULT_PARAM: &str = "__WA_RES__";

/// Outbound activity request, embedded in the destination URL fragment
/// unless the caller routes it through an alternate channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityRequest {
    #[serde(rename = "requestId")]
    pub request_id: String,
    /// Where the host should navigate back to in redirect mode.
    #[serde(rename = "returnUrl")]
    pub return_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

impl ActivityRequest {
    pub fn serialize(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ActivityError::Internal(format!("request encode failed: {e}")))
    }

    pub fn parse(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| ActivityError::Protocol(format!("invalid request json: {e}")))
    }
}

/// Inbound result recovered from the return URL fragment in redirect mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedirectResultPayload {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub code: ActivityResultCode,
    #[serde(default)]
    pub data: Option<Value>,
    /// Origin the host declares for itself; verified only against the
    /// document referrer.
    #[serde(default)]
    pub origin: Option<String>,
}

impl RedirectResultPayload {
    pub fn serialize(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ActivityError::Internal(format!("result encode failed: {e}")))
    }

    pub fn parse(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| ActivityError::Protocol(format!("invalid result json: {e}")))
    }
}
