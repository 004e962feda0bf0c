//! Dedicated channel endpoints.
//!
//! A [`ChannelEndpoint`] is one end of a linked pair standing in for a
//! transferred two-way message channel. Exactly one consumer may listen on
//! an endpoint; the handle itself is cheaply cloneable so the messenger can
//! route through it while a holder map retains it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;

use actport_core::{ActivityError, Result};

/// One message delivered over a dedicated endpoint. Sub-channel negotiation
/// may transfer another endpoint alongside the data.
#[derive(Debug)]
pub struct PortDelivery {
    pub data: Value,
    pub transfer: Option<ChannelEndpoint>,
}

/// One end of a dedicated two-endpoint channel.
#[derive(Clone, Debug)]
pub struct ChannelEndpoint {
    inner: Arc<EndpointInner>,
}

#[derive(Debug)]
struct EndpointInner {
    tx: mpsc::UnboundedSender<PortDelivery>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<PortDelivery>>>,
    closed: AtomicBool,
}

impl ChannelEndpoint {
    /// Create a linked pair. Messages posted on one end arrive at the other.
    pub fn pair() -> (ChannelEndpoint, ChannelEndpoint) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (Self::from_parts(a_tx, a_rx), Self::from_parts(b_tx, b_rx))
    }

    fn from_parts(
        tx: mpsc::UnboundedSender<PortDelivery>,
        rx: mpsc::UnboundedReceiver<PortDelivery>,
    ) -> Self {
        Self {
            inner: Arc::new(EndpointInner {
                tx,
                rx: Mutex::new(Some(rx)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Post a message to the peer end.
    pub fn post(&self, data: Value, transfer: Option<ChannelEndpoint>) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ActivityError::Transport("endpoint closed".into()));
        }
        self.inner
            .tx
            .send(PortDelivery { data, transfer })
            .map_err(|_| ActivityError::Transport("peer endpoint closed".into()))
    }

    /// Take the inbound receiver. A dedicated endpoint has exactly one
    /// consumer; the second take fails.
    pub fn listen(&self) -> Result<mpsc::UnboundedReceiver<PortDelivery>> {
        match self.inner.rx.lock() {
            Ok(mut guard) => guard
                .take()
                .ok_or_else(|| ActivityError::Protocol("endpoint already has a listener".into())),
            Err(_) => Err(ActivityError::Internal("endpoint lock poisoned".into())),
        }
    }

    /// Close this end. Idempotent; failures are swallowed.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        if let Ok(mut guard) = self.inner.rx.lock() {
            guard.take();
        }
    }
}
