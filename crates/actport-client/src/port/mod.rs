//! Activity port capability surfaces.
//!
//! [`ActivityPort`] and [`ActivityMessagingPort`] are what client consumers
//! program against; [`ActivityHostBehavior`] is the symmetric host-side
//! surface, defined here as a collaborator interface only. Host
//! implementations live with the hosted context, not in this crate.

pub mod redirect;
pub mod window;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use actport_core::{ActivityMode, ActivityResult, Result};

use crate::messenger::ChannelPromise;
use crate::transport::ContextWindow;

pub use redirect::{discover_redirect_port, recover_from_url, ActivityWindowRedirectPort};
pub use window::{ActivityWindowPort, OpenOptions};

/// Capability set every activity port exposes.
#[async_trait]
pub trait ActivityPort: Send + Sync {
    /// How this activity is hosted.
    fn mode(&self) -> ActivityMode;

    /// The single result promise, and the sole authorized way to read the
    /// outcome. Fulfills for ok/canceled/failed outcomes; rejects only when
    /// the destination context could not be opened at all.
    async fn accept_result(&self) -> Result<ActivityResult>;
}

/// Messaging capability set of ports with a live peer context.
pub trait ActivityMessagingPort: Send + Sync {
    /// The opened context, while connected.
    fn target_win(&self) -> Option<Arc<dyn ContextWindow>>;

    /// Send a custom message to the host.
    fn message(&self, payload: Value) -> Result<()>;

    /// Register the custom-message callback.
    fn on_message(&self, callback: Box<dyn Fn(Value) + Send + Sync>) -> Result<()>;

    /// Negotiate a named sub-channel with the host.
    fn message_channel(&self, name: Option<&str>) -> Result<ChannelPromise>;
}

/// Host-side lifecycle surface, consumed symmetrically by the same protocol.
pub trait ActivityHostBehavior: Send + Sync {
    /// Accept the client's connection; messaging becomes available after.
    fn accept(&self) -> Result<()>;
    /// Signal that the host document is ready for user interaction.
    fn ready(&self) -> Result<()>;
    /// Deliver the terminal result to the client.
    fn result(&self, data: Value) -> Result<()>;
    /// Terminate with a canceled outcome.
    fn cancel(&self) -> Result<()>;
    /// Terminate with a failed outcome carrying `reason`.
    fn failed(&self, reason: &str) -> Result<()>;
    /// Send a custom message to the client.
    fn message(&self, payload: Value) -> Result<()>;
    /// Ask the client container for a new height.
    fn resize(&self, height: u32) -> Result<()>;
}
