//! Browsing-context transport seam.
//!
//! The protocol never touches a platform API directly: a [`ContextWindow`]
//! stands in for one browsing context (origin-addressed broadcast post, an
//! inbox listener, liveness, best-effort close), and a
//! [`channel::ChannelEndpoint`] stands in for one end of a transferred
//! dedicated channel. Production embedders and the test doubles implement
//! the same traits.

pub mod channel;

use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;

use actport_core::Result;

pub use channel::{ChannelEndpoint, PortDelivery};

/// Identity of a browsing context, used to match [`WindowEvent::source`]
/// against the expected peer when several same-origin contexts coexist.
pub type WindowId = u64;

/// One inbound broadcast message observed by a context's listener.
#[derive(Debug, Clone)]
pub struct WindowEvent {
    /// Origin of the sending context, asserted by the platform.
    pub origin: String,
    /// Identity of the sending context, when the platform can assert one.
    pub source: Option<WindowId>,
    /// Raw message body; envelope validation happens after delivery.
    pub data: Value,
    /// At most one transferred dedicated endpoint.
    pub transfer: Option<ChannelEndpoint>,
}

/// Handle to one browsing context.
///
/// `post` is origin-addressed fire-and-forget like the platform primitive it
/// models: implementations must silently drop the message when the target
/// origin does not match, and `"*"` addresses any origin.
pub trait ContextWindow: Send + Sync {
    /// Identity used for source matching.
    fn id(&self) -> WindowId;

    /// Post a broadcast message into this context.
    fn post(
        &self,
        data: Value,
        target_origin: &str,
        transfer: Option<ChannelEndpoint>,
    ) -> Result<()>;

    /// Subscribe to messages arriving at this context. Every call returns an
    /// independent subscription: several ports can share one page context
    /// and filter by source identity.
    fn listen(&self) -> Result<mpsc::UnboundedReceiver<WindowEvent>>;

    /// Whether the context reports itself closed. Not observable as an event
    /// in all environments; the liveness poll compensates.
    fn closed(&self) -> bool;

    /// Best-effort close; failures are swallowed (cross-origin contexts may
    /// refuse).
    fn close(&self);
}

/// Peer reference: either a resolved handle or a deferred accessor invoked
/// lazily the first time a peer handle is needed, then cached for the
/// session's lifetime.
pub struct PeerRef {
    cached: Mutex<Option<Arc<dyn ContextWindow>>>,
    producer: Option<Box<dyn Fn() -> Option<Arc<dyn ContextWindow>> + Send + Sync>>,
}

impl PeerRef {
    pub fn resolved(win: Arc<dyn ContextWindow>) -> Self {
        Self {
            cached: Mutex::new(Some(win)),
            producer: None,
        }
    }

    pub fn deferred(
        producer: impl Fn() -> Option<Arc<dyn ContextWindow>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            cached: Mutex::new(None),
            producer: Some(Box::new(producer)),
        }
    }

    /// Resolve the peer handle; a deferred accessor is retried until it
    /// first yields a handle, which is then cached.
    pub fn get(&self) -> Option<Arc<dyn ContextWindow>> {
        match self.cached.lock() {
            Ok(mut cached) => {
                if cached.is_none() {
                    if let Some(producer) = &self.producer {
                        *cached = producer();
                    }
                }
                cached.clone()
            }
            Err(_) => None,
        }
    }
}

impl fmt::Debug for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resolved = matches!(self.cached.lock(), Ok(g) if g.is_some());
        f.debug_struct("PeerRef").field("resolved", &resolved).finish()
    }
}
