//! Redirect-mode result recovery.
//!
//! In redirect mode there is no live messenger: the host navigates back to
//! the return URL with the result encoded in a reserved fragment parameter.
//! Recovery runs on page load, strips the parameter from the visible URL
//! best-effort, and verifies the declared origin against the document
//! referrer, the only verification available when the response travels
//! through a URL rather than a verified message channel.

use async_trait::async_trait;

use actport_core::request::{RedirectResultPayload, RESULT_PARAM};
use actport_core::{ActivityMode, ActivityResult, Result};

use crate::platform::Platform;
use crate::port::ActivityPort;
use crate::urlutil;

/// Result-bearing port returned by redirect discovery. The outcome is known
/// at construction, so `accept_result` always fulfills immediately.
pub struct ActivityWindowRedirectPort {
    result: ActivityResult,
}

impl ActivityWindowRedirectPort {
    fn new(result: ActivityResult) -> Self {
        Self { result }
    }
}

#[async_trait]
impl ActivityPort for ActivityWindowRedirectPort {
    fn mode(&self) -> ActivityMode {
        ActivityMode::Redirect
    }

    async fn accept_result(&self) -> Result<ActivityResult> {
        Ok(self.result.clone())
    }
}

/// Look for a redirect result addressed to `request_id` in the current page
/// URL. On a match, the consumed parameter is removed from the visible URL
/// (best-effort, ignoring history failures) and a result-bearing port is
/// returned.
pub fn discover_redirect_port(
    platform: &dyn Platform,
    request_id: &str,
) -> Option<ActivityWindowRedirectPort> {
    let page_url = platform.page_url();
    let (stripped, port) = recover_from_url(&page_url, &platform.referrer(), request_id)?;
    if let Err(e) = platform.replace_state(&stripped) {
        tracing::debug!(error = %e, "history rewrite failed");
    }
    Some(port)
}

/// Pure core of redirect recovery: returns the stripped URL and the
/// result-bearing port when the fragment carries a result for `request_id`.
pub fn recover_from_url(
    page_url: &str,
    referrer: &str,
    request_id: &str,
) -> Option<(String, ActivityWindowRedirectPort)> {
    let fragment_value = urlutil::get_fragment_param(page_url, RESULT_PARAM)?;
    let payload = match RedirectResultPayload::parse(&fragment_value) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "malformed redirect result ignored");
            return None;
        }
    };
    if payload.request_id != request_id {
        return None;
    }
    let origin = payload.origin.clone().unwrap_or_default();
    let origin_verified = !origin.is_empty()
        && urlutil::origin_of(referrer).ok().as_deref() == Some(origin.as_str());
    let result = ActivityResult::new(
        payload.code,
        payload.data,
        ActivityMode::Redirect,
        origin,
        origin_verified,
        false,
    );
    let stripped = urlutil::remove_fragment_param(page_url, RESULT_PARAM);
    Some((stripped, ActivityWindowRedirectPort::new(result)))
}
