//! Symmetric, transport-upgrading command channel.
//!
//! Both sides of an activity run the same messenger: connect → handshake →
//! optional upgrade to a dedicated endpoint → steady-state command and
//! message exchange. Trust is origin-based: the first verified inbound
//! message pins the peer origin, and mismatched traffic is silently
//! discarded from then on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use actport_core::{ActivityError, Command, Envelope, Result};

use crate::transport::{ChannelEndpoint, ContextWindow, PeerRef, PortDelivery, WindowEvent};

/// Command handler registered via [`Messenger::connect`].
pub type CommandHandler = Arc<dyn Fn(Command) + Send + Sync>;
/// Custom-message callback registered via [`Messenger::on_custom_message`].
pub type MessageHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Shared promise for a named sub-channel. Every negotiation call for the
/// same name observes the identical future, resolved exactly once with the
/// local endpoint.
pub type ChannelPromise = Shared<BoxFuture<'static, ChannelEndpoint>>;

/// Channel-upgrade capabilities supplied by the environment probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelCaps {
    /// This runtime needs a dedicated channel for reliable delivery, so the
    /// connect command advertises `acceptsChannel`.
    pub accepts_channel: bool,
    /// This runtime can create two-endpoint channels.
    pub supports_channel: bool,
}

struct ChannelHolder {
    /// Local endpoint, once created here or received from the peer.
    local: Option<ChannelEndpoint>,
    /// Remote endpoint created locally but not yet transferred.
    pending_send: Option<ChannelEndpoint>,
    /// A `cnget` has been sent for this name.
    requested: bool,
    resolver: Option<oneshot::Sender<ChannelEndpoint>>,
    promise: ChannelPromise,
}

impl ChannelHolder {
    fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        let promise = async move {
            match rx.await {
                Ok(endpoint) => endpoint,
                // Resolver released on disconnect: the promise is left
                // unresolved by design. Callers pair disconnect with their
                // own cancellation.
                Err(_) => std::future::pending().await,
            }
        }
        .boxed()
        .shared();
        Self {
            local: None,
            pending_send: None,
            requested: false,
            resolver: Some(tx),
            promise,
        }
    }
}

/// Symmetric command channel for one activity session.
///
/// Cheaply cloneable; clones share the session.
#[derive(Clone)]
pub struct Messenger {
    inner: Arc<MessengerInner>,
}

struct MessengerInner {
    /// Context whose inbox this session listens on.
    own: Arc<dyn ContextWindow>,
    /// Peer context this session posts into.
    peer: PeerRef,
    /// Pinned peer origin; starts unknown unless supplied at construction.
    target_origin: Mutex<Option<String>>,
    /// Drop events whose source is not the expected peer. Required to
    /// disambiguate several same-origin contexts.
    require_target: bool,
    caps: ChannelCaps,
    /// Peer advertised `acceptsChannel` in its connect command.
    peer_accepts_channel: AtomicBool,
    on_command: Mutex<Option<CommandHandler>>,
    on_custom_message: Mutex<Option<MessageHandler>>,
    /// Dedicated transport, installed by the upgrade.
    port: Mutex<Option<ChannelEndpoint>>,
    channels: DashMap<String, ChannelHolder>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Messenger {
    /// Build a messenger for one session.
    ///
    /// The client role passes the opened context as a resolved peer with
    /// `require_target = true`; the host role typically passes a deferred
    /// accessor for its opener and the origin it already knows, if any.
    pub fn new(
        own: Arc<dyn ContextWindow>,
        peer: PeerRef,
        pinned_origin: Option<String>,
        require_target: bool,
        caps: ChannelCaps,
    ) -> Self {
        Self {
            inner: Arc::new(MessengerInner {
                own,
                peer,
                target_origin: Mutex::new(pinned_origin),
                require_target,
                caps,
                peer_accepts_channel: AtomicBool::new(false),
                on_command: Mutex::new(None),
                on_custom_message: Mutex::new(None),
                port: Mutex::new(None),
                channels: DashMap::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register the single command handler and start listening for inbound
    /// broadcast messages. A session is not reusable: fails when called
    /// twice without an intervening disconnect.
    pub fn connect(&self, on_command: impl Fn(Command) + Send + Sync + 'static) -> Result<()> {
        {
            let mut handler = self
                .inner
                .on_command
                .lock()
                .map_err(|_| ActivityError::Internal("messenger lock poisoned".into()))?;
            if handler.is_some() {
                return Err(ActivityError::AlreadyConnected);
            }
            *handler = Some(Arc::new(on_command));
        }
        let mut events = match self.inner.own.listen() {
            Ok(events) => events,
            Err(e) => {
                if let Ok(mut handler) = self.inner.on_command.lock() {
                    handler.take();
                }
                return Err(e);
            }
        };
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                Messenger { inner }.handle_event(event);
            }
        });
        self.track(handle);
        Ok(())
    }

    /// Tear the session down. Idempotent and safe from any state.
    ///
    /// Pending channel promises are left unresolved; the endpoints behind
    /// them are closed best-effort.
    pub fn disconnect(&self) {
        if let Ok(mut handler) = self.inner.on_command.lock() {
            handler.take();
        }
        if let Ok(mut handler) = self.inner.on_custom_message.lock() {
            handler.take();
        }
        if let Ok(mut port) = self.inner.port.lock() {
            if let Some(port) = port.take() {
                port.close();
            }
        }
        for mut entry in self.inner.channels.iter_mut() {
            let holder = entry.value_mut();
            if let Some(endpoint) = holder.local.take() {
                endpoint.close();
            }
            if let Some(endpoint) = holder.pending_send.take() {
                endpoint.close();
            }
            holder.resolver.take();
        }
        self.inner.channels.clear();
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }

    /// True once a peer origin has been pinned.
    pub fn is_connected(&self) -> bool {
        matches!(self.inner.target_origin.lock(), Ok(g) if g.is_some())
    }

    /// The peer context. Fails before the peer is known.
    pub fn target(&self) -> Result<Arc<dyn ContextWindow>> {
        self.inner.peer.get().ok_or(ActivityError::NotConnected)
    }

    /// The pinned peer origin. Fails before the handshake pinned one.
    pub fn target_origin(&self) -> Result<String> {
        self.pinned_origin().ok_or(ActivityError::NotConnected)
    }

    /// Host-side entry point: announce readiness, advertising the dedicated
    /// channel upgrade only when the environment probe asked for one.
    pub fn send_connect_command(&self) -> Result<()> {
        self.send_command(
            Command::Connect {
                accepts_channel: self.inner.caps.accepts_channel,
            },
            None,
        )
    }

    /// Client-side entry point: start the activity, upgrading to a dedicated
    /// endpoint when the peer advertised `acceptsChannel` and the
    /// environment supports one.
    pub fn send_start_command(&self, args: Option<Value>) -> Result<()> {
        let pair = (self.inner.peer_accepts_channel.load(Ordering::SeqCst)
            && self.inner.caps.supports_channel)
            .then(ChannelEndpoint::pair);
        let transfer = pair.as_ref().map(|(_, remote)| remote.clone());
        self.send_command(Command::Start { args }, transfer)?;
        // Switch routing only after the send returned: switching first would
        // strand the peer's endpoint on a transport it can never receive.
        if let Some((local, _)) = pair {
            self.switch_to_channel(local);
        }
        Ok(())
    }

    /// Send a command, routed to the dedicated transport when installed and
    /// to the broadcast transport at the pinned origin otherwise. `connect`
    /// is the only command permitted a wildcard origin while the peer origin
    /// is still unknown.
    pub fn send_command(
        &self,
        command: Command,
        transfer: Option<ChannelEndpoint>,
    ) -> Result<()> {
        let is_connect = matches!(command, Command::Connect { .. });
        let data = command.into_envelope().encode();
        let port = match self.inner.port.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        if let Some(port) = port {
            port.post(data, transfer)
        } else {
            let origin = if is_connect {
                self.pinned_origin().unwrap_or_else(|| "*".to_string())
            } else {
                self.target_origin()?
            };
            self.target()?.post(data, &origin, transfer)
        }
    }

    /// Send a custom application message (`msg` command).
    pub fn custom_message(&self, payload: Value) -> Result<()> {
        self.send_command(Command::Msg { payload }, None)
    }

    /// Register the custom-message callback. Messages are delivered only
    /// while connected and only with a non-null payload.
    pub fn on_custom_message(&self, callback: impl Fn(Value) + Send + Sync + 'static) {
        if let Ok(mut handler) = self.inner.on_custom_message.lock() {
            *handler = Some(Arc::new(callback));
        }
    }

    /// Create (or reuse) the named sub-channel from this side: resolves the
    /// channel promise with the local endpoint and transfers the remote
    /// endpoint via `cnset` exactly once.
    pub fn start_channel(&self, name: &str) -> Result<ChannelPromise> {
        self.require_session()?;
        let (to_send, promise) = {
            let mut holder = self
                .inner
                .channels
                .entry(name.to_string())
                .or_insert_with(ChannelHolder::new);
            if holder.local.is_none() {
                let (local, remote) = ChannelEndpoint::pair();
                holder.local = Some(local.clone());
                holder.pending_send = Some(remote);
                if let Some(resolver) = holder.resolver.take() {
                    let _ = resolver.send(local);
                }
            }
            (holder.pending_send.take(), holder.promise.clone())
        };
        if let Some(remote) = to_send {
            if let Err(e) = self.send_command(
                Command::ChannelGrant {
                    name: name.to_string(),
                },
                Some(remote.clone()),
            ) {
                // Not delivered; keep it pending for a retry.
                if let Some(mut holder) = self.inner.channels.get_mut(name) {
                    holder.pending_send = Some(remote);
                }
                return Err(e);
            }
        }
        Ok(promise)
    }

    /// Ask the peer to create the named sub-channel (`cnget`) and wait for
    /// its `cnset`. The request is sent once per name.
    pub fn ask_channel(&self, name: &str) -> Result<ChannelPromise> {
        self.require_session()?;
        let (send_request, promise) = {
            let mut holder = self
                .inner
                .channels
                .entry(name.to_string())
                .or_insert_with(ChannelHolder::new);
            let first = holder.local.is_none() && !holder.requested;
            if first {
                holder.requested = true;
            }
            (first, holder.promise.clone())
        };
        if send_request {
            self.send_command(
                Command::ChannelRequest {
                    name: name.to_string(),
                },
                None,
            )?;
        }
        Ok(promise)
    }

    // --------------------
    // Inbound path
    // --------------------

    /// Trust filter for the broadcast transport.
    fn handle_event(&self, event: WindowEvent) {
        if self.inner.require_target {
            let expected = self.inner.peer.get().map(|peer| peer.id());
            if expected.is_none() || expected != event.source {
                return;
            }
        }
        let Some(envelope) = Envelope::decode(&event.data) else {
            return;
        };
        // A dedicated transport owns the session; only re-handshake commands
        // stay acceptable on broadcast (the peer context may have reloaded
        // and lost its endpoint).
        let port_active = matches!(self.inner.port.lock(), Ok(g) if g.is_some());
        if port_active && envelope.cmd != "connect" && envelope.cmd != "start" {
            return;
        }
        {
            let mut pinned = match self.inner.target_origin.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            if pinned.is_none() && envelope.cmd == "start" {
                *pinned = Some(event.origin.clone());
            }
            if pinned.is_none() {
                if let (Some(source), Some(peer)) = (event.source, self.inner.peer.get()) {
                    if peer.id() == source {
                        *pinned = Some(event.origin.clone());
                    }
                }
            }
            if pinned.as_deref() != Some(event.origin.as_str()) {
                tracing::debug!(origin = %event.origin, "dropping message from untrusted origin");
                return;
            }
        }
        self.handle_command(Command::from_envelope(&envelope), event.transfer);
    }

    /// Dedicated-endpoint inbound path; origin was verified at upgrade time.
    fn handle_port_delivery(&self, delivery: PortDelivery) {
        let Some(envelope) = Envelope::decode(&delivery.data) else {
            return;
        };
        self.handle_command(Command::from_envelope(&envelope), delivery.transfer);
    }

    /// Shared dispatch table for both transports and both roles.
    fn handle_command(&self, command: Command, transfer: Option<ChannelEndpoint>) {
        match command {
            Command::Connect { accepts_channel } => {
                // Reconnect tolerance: a fresh connect resets any dedicated
                // transport installed by a previous handshake.
                if let Ok(mut port) = self.inner.port.lock() {
                    if let Some(old) = port.take() {
                        old.close();
                    }
                }
                self.inner
                    .peer_accepts_channel
                    .store(accepts_channel, Ordering::SeqCst);
                self.forward(Command::Connect { accepts_channel });
            }
            Command::Start { args } => {
                if let Some(endpoint) = transfer {
                    self.switch_to_channel(endpoint);
                }
                self.forward(Command::Start { args });
            }
            Command::Msg { payload } => {
                let handler = match self.inner.on_custom_message.lock() {
                    Ok(guard) => guard.clone(),
                    Err(_) => None,
                };
                if let Some(handler) = handler {
                    if !payload.is_null() {
                        handler(payload);
                    }
                }
            }
            Command::ChannelRequest { name } => {
                // Fulfill the peer's ask as if start_channel was called here.
                if let Err(e) = self.start_channel(&name) {
                    tracing::warn!(name = %name, error = %e, "channel request failed");
                }
            }
            Command::ChannelGrant { name } => match transfer {
                Some(endpoint) => self.receive_channel(&name, endpoint),
                None => tracing::warn!(name = %name, "cnset without a transferred endpoint"),
            },
            other => self.forward(other),
        }
    }

    fn forward(&self, command: Command) {
        let handler = match self.inner.on_command.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        if let Some(handler) = handler {
            handler(command);
        }
    }

    /// Install a dedicated endpoint and pump it into the dispatch table.
    fn switch_to_channel(&self, endpoint: ChannelEndpoint) {
        if let Ok(mut port) = self.inner.port.lock() {
            if let Some(old) = port.take() {
                old.close();
            }
            *port = Some(endpoint.clone());
        }
        match endpoint.listen() {
            Ok(mut deliveries) => {
                let weak = Arc::downgrade(&self.inner);
                let handle = tokio::spawn(async move {
                    while let Some(delivery) = deliveries.recv().await {
                        let Some(inner) = weak.upgrade() else { break };
                        Messenger { inner }.handle_port_delivery(delivery);
                    }
                });
                self.track(handle);
            }
            Err(e) => tracing::warn!(error = %e, "dedicated endpoint has no usable listener"),
        }
    }

    /// Install the received endpoint as the local side of the named channel.
    fn receive_channel(&self, name: &str, endpoint: ChannelEndpoint) {
        let mut holder = self
            .inner
            .channels
            .entry(name.to_string())
            .or_insert_with(ChannelHolder::new);
        holder.pending_send = None;
        holder.local = Some(endpoint.clone());
        if let Some(resolver) = holder.resolver.take() {
            let _ = resolver.send(endpoint);
        }
    }

    fn pinned_origin(&self) -> Option<String> {
        match self.inner.target_origin.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        }
    }

    fn require_session(&self) -> Result<()> {
        match self.inner.on_command.lock() {
            Ok(guard) if guard.is_some() => Ok(()),
            Ok(_) => Err(ActivityError::Protocol(
                "messenger is not connected".into(),
            )),
            Err(_) => Err(ActivityError::Internal("messenger lock poisoned".into())),
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            tasks.push(handle);
        }
    }
}
