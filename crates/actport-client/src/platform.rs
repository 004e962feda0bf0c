//! Environment seam: window opening, page metadata, capability probing.

use std::sync::Arc;

use async_trait::async_trait;

use actport_core::Result;

use crate::transport::ContextWindow;

/// Screen metrics used by the popup feature builder. All values in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenMetrics {
    pub width: u32,
    pub height: u32,
    /// Space actually available for application windows.
    pub avail_width: u32,
    pub avail_height: u32,
}

/// Environment the client runs in.
///
/// Every platform dependency of the activity stack flows through this trait
/// so the protocol can run against real embedders and in-memory doubles
/// alike.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Open `url` in `target` (`"_blank"`, `"_top"`, or a window name) with
    /// an optional popup feature string. Errors when the platform blocked
    /// the open.
    async fn open(
        &self,
        url: &str,
        target: &str,
        features: Option<&str>,
    ) -> Result<Arc<dyn ContextWindow>>;

    /// URL of the current document.
    fn page_url(&self) -> String;

    /// Referrer of the current document; empty when unknown.
    fn referrer(&self) -> String;

    /// Best-effort visible-URL rewrite.
    fn replace_state(&self, url: &str) -> Result<()>;

    fn screen(&self) -> ScreenMetrics;

    /// Capability probe: does this runtime need a dedicated-channel upgrade
    /// for reliable delivery.
    fn requires_channel_upgrade(&self) -> bool;

    /// Capability probe: can this runtime create two-endpoint channels.
    fn supports_message_channel(&self) -> bool;
}
