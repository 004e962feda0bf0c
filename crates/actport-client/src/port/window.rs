//! Client-side controller for one popup- or redirect-hosted activity.
//!
//! Responsibilities:
//! - Open the destination context, falling back once to a top-level redirect
//!   when a popup is blocked.
//! - Run the client side of the messenger handshake.
//! - Detect abandonment without a reliable close event (liveness poll +
//!   grace window).
//! - Resolve exactly one terminal result and release every resource on
//!   disconnect.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;

use actport_core::request::{ActivityRequest, REQUEST_PARAM};
use actport_core::{
    ActivityError, ActivityMode, ActivityResult, ActivityResultCode, Command, Result,
};

use crate::messenger::{ChannelCaps, ChannelPromise, Messenger};
use crate::platform::Platform;
use crate::popup;
use crate::port::{ActivityMessagingPort, ActivityPort};
use crate::settings::ClientSettings;
use crate::slot::FulfillSlot;
use crate::transport::{ContextWindow, PeerRef};
use crate::urlutil;

/// Per-request open options.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Override the return URL embedded in the request (defaults to the
    /// current page URL without its fragment).
    pub return_url: Option<String>,
    /// The caller passes the request through an alternate channel instead of
    /// the URL fragment.
    pub skip_request_in_url: bool,
    /// Requested popup width in pixels.
    pub width: Option<u32>,
    /// Requested popup height in pixels.
    pub height: Option<u32>,
    /// Do not retry a blocked popup as a top-level redirect.
    pub disable_redirect_fallback: bool,
}

/// Client-side port for one activity instance hosted in a popup or via
/// redirect. Cheaply cloneable; clones share the instance.
#[derive(Clone)]
pub struct ActivityWindowPort {
    inner: Arc<PortInner>,
}

struct PortInner {
    platform: Arc<dyn Platform>,
    /// The client page's own context; the messenger listens on its inbox.
    own: Arc<dyn ContextWindow>,
    settings: ClientSettings,
    request_id: String,
    url: String,
    open_target: String,
    args: Option<Value>,
    options: OpenOptions,
    connected: FulfillSlot<()>,
    result: FulfillSlot<Result<ActivityResult>>,
    /// The opened context; cleared on disconnect.
    target: Mutex<Option<Arc<dyn ContextWindow>>>,
    /// Owned messenger, popup mode only.
    messenger: Mutex<Option<Messenger>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    grace_task: Mutex<Option<JoinHandle<()>>>,
    check_task: Mutex<Option<JoinHandle<()>>>,
}

impl ActivityWindowPort {
    pub fn new(
        platform: Arc<dyn Platform>,
        own: Arc<dyn ContextWindow>,
        request_id: impl Into<String>,
        url: impl Into<String>,
        open_target: impl Into<String>,
        args: Option<Value>,
        options: OpenOptions,
        settings: ClientSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let open_target = open_target.into();
        if open_target == "_self" {
            return Err(ActivityError::Protocol(
                "open target must not be _self".into(),
            ));
        }
        Ok(Self {
            inner: Arc::new(PortInner {
                platform,
                own,
                settings,
                request_id: request_id.into(),
                url: url.into(),
                open_target,
                args,
                options,
                connected: FulfillSlot::new(),
                result: FulfillSlot::new(),
                target: Mutex::new(None),
                messenger: Mutex::new(None),
                poll_task: Mutex::new(None),
                grace_task: Mutex::new(None),
                check_task: Mutex::new(None),
            }),
        })
    }

    /// Open the destination context and start the client side of the
    /// protocol.
    ///
    /// In popup mode the outcome later arrives via `accept_result`. With a
    /// top-level target (requested or as popup fallback) the navigation
    /// itself leaves this page: the result promise stays pending and any
    /// eventual outcome surfaces through redirect recovery on the next
    /// load. When every attempted mode fails, the result promise is
    /// rejected.
    pub async fn open(&self) -> Result<()> {
        let inner = &self.inner;
        let url = self.build_url()?;
        let mut open_target = inner.open_target.clone();
        let features = popup::build_features(
            inner.platform.screen(),
            &inner.settings.popup,
            inner.options.width,
            inner.options.height,
        );

        let features_arg = (open_target != "_top").then_some(features.as_str());
        let mut target = match inner.platform.open(&url, &open_target, features_arg).await {
            Ok(win) => Some(win),
            Err(e) => {
                tracing::debug!(target = %open_target, error = %e, "window open failed");
                None
            }
        };
        if target.is_none() && open_target != "_top" && !inner.options.disable_redirect_fallback {
            // One retry, forcing a top-level redirect.
            open_target = "_top".to_string();
            target = match inner.platform.open(&url, &open_target, None).await {
                Ok(win) => Some(win),
                Err(e) => {
                    tracing::debug!(error = %e, "redirect fallback failed");
                    None
                }
            };
        }

        match target {
            Some(win) => {
                if let Ok(mut guard) = inner.target.lock() {
                    *guard = Some(win.clone());
                }
                if open_target != "_top" {
                    if let Err(e) = self.setup_popup(win) {
                        self.fail_internal(e.clone());
                        return Err(e);
                    }
                }
                Ok(())
            }
            None => {
                self.fail_internal(ActivityError::OpenFailed(
                    "all open modes were blocked".into(),
                ));
                Ok(())
            }
        }
    }

    /// Fulfilled once the first successful handshake completes; gates
    /// sending further messages.
    pub async fn when_connected(&self) {
        self.inner.connected.wait().await;
    }

    /// Tear everything down. Idempotent; triggered by result delivery,
    /// explicit client action, or unrecoverable failure.
    pub fn disconnect(&self) {
        self.stop_poll();
        if let Ok(mut guard) = self.inner.grace_task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
        if let Ok(mut guard) = self.inner.check_task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
        if let Ok(mut guard) = self.inner.messenger.lock() {
            if let Some(messenger) = guard.take() {
                messenger.disconnect();
            }
        }
        if let Ok(mut guard) = self.inner.target.lock() {
            if let Some(win) = guard.take() {
                // Best-effort: cross-origin contexts may refuse to close.
                win.close();
            }
        }
        // Late internal calls cannot double-resolve once the resolver is
        // released.
        self.inner.result.release();
    }

    // --------------------
    // Popup setup
    // --------------------

    fn build_url(&self) -> Result<String> {
        let inner = &self.inner;
        if inner.options.skip_request_in_url {
            return Ok(inner.url.clone());
        }
        let return_url = match &inner.options.return_url {
            Some(url) => url.clone(),
            None => urlutil::remove_fragment(&inner.platform.page_url()).to_string(),
        };
        let request = ActivityRequest {
            request_id: inner.request_id.clone(),
            return_url,
            args: inner.args.clone(),
        };
        Ok(urlutil::add_fragment_param(
            &inner.url,
            REQUEST_PARAM,
            &request.serialize()?,
        ))
    }

    fn setup_popup(&self, win: Arc<dyn ContextWindow>) -> Result<()> {
        let inner = &self.inner;
        let caps = ChannelCaps {
            accepts_channel: inner.platform.requires_channel_upgrade(),
            supports_channel: inner.platform.supports_message_channel(),
        };
        // Strict source matching: simultaneous activities must distinguish
        // their own target among same-origin contexts.
        let messenger = Messenger::new(inner.own.clone(), PeerRef::resolved(win), None, true, caps);
        if let Ok(mut guard) = inner.messenger.lock() {
            *guard = Some(messenger.clone());
        }
        let weak = Arc::downgrade(&self.inner);
        messenger.connect(move |command| {
            if let Some(inner) = weak.upgrade() {
                ActivityWindowPort { inner }.handle_command(command);
            }
        })?;
        self.start_liveness_poll();
        Ok(())
    }

    // --------------------
    // Liveness / cancellation
    // --------------------

    fn start_liveness_poll(&self) {
        let weak = Arc::downgrade(&self.inner);
        let period = Duration::from_millis(self.inner.settings.poll_interval_ms);
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if (ActivityWindowPort { inner }).check_closed() {
                    break;
                }
            }
        });
        if let Ok(mut guard) = self.inner.poll_task.lock() {
            *guard = Some(handle);
        }
    }

    fn stop_poll(&self) {
        if let Ok(mut guard) = self.inner.poll_task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }

    /// Returns true once there is nothing left to watch: the opened context
    /// reports closed (the grace timer takes over) or the port already
    /// disconnected.
    fn check_closed(&self) -> bool {
        let closed = match self.inner.target.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(win) => win.closed(),
                None => return true,
            },
            Err(_) => return true,
        };
        if !closed {
            return false;
        }
        self.stop_poll();
        self.start_grace_timer();
        true
    }

    /// Give a genuinely in-flight result a chance to arrive before treating
    /// the closed context as abandonment.
    fn start_grace_timer(&self) {
        let mut guard = match self.inner.grace_task.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        if guard.as_ref().map(|t| !t.is_finished()).unwrap_or(false) {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let delay = Duration::from_millis(self.inner.settings.grace_delay_ms);
        *guard = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                ActivityWindowPort { inner }.deliver_result(
                    ActivityResultCode::Canceled,
                    Value::Null,
                    false,
                );
            }
        }));
    }

    /// Host-initiated early closed-check, used when the host suspects the
    /// client's poll is starved.
    fn schedule_check(&self) {
        let weak = Arc::downgrade(&self.inner);
        let delay = Duration::from_millis(self.inner.settings.check_delay_ms);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                (ActivityWindowPort { inner }).check_closed();
            }
        });
        if let Ok(mut guard) = self.inner.check_task.lock() {
            if let Some(old) = guard.replace(handle) {
                old.abort();
            }
        }
    }

    // --------------------
    // Command handling / result
    // --------------------

    fn handle_command(&self, command: Command) {
        match command {
            Command::Connect { .. } => {
                // Handshake: reply with the original args, then unblock
                // callers gated on the connection.
                if let Some(messenger) = self.messenger() {
                    if let Err(e) = messenger.send_start_command(self.inner.args.clone()) {
                        self.fail_internal(e);
                        return;
                    }
                }
                self.inner.connected.fulfill(());
            }
            Command::Result { code, data } => {
                self.deliver_result(code, data, true);
            }
            Command::Check => self.schedule_check(),
            _ => {}
        }
    }

    /// Resolve the one-shot outcome. No-op once the resolver was used or
    /// released.
    fn deliver_result(&self, code: ActivityResultCode, data: Value, notify_host: bool) {
        let connected = self
            .messenger()
            .map(|m| m.is_connected())
            .unwrap_or(false);
        let origin = if connected {
            self.messenger()
                .and_then(|m| m.target_origin().ok())
                .unwrap_or_default()
        } else {
            // Never connected: fall back to the origin embedded in the
            // destination URL, unverified.
            urlutil::origin_of(&self.inner.url).unwrap_or_default()
        };
        let data = if data.is_null() { None } else { Some(data) };
        let result = ActivityResult::new(code, data, ActivityMode::Popup, origin, connected, connected);
        if self.inner.result.fulfill(Ok(result)) {
            tracing::debug!(code = code.as_str(), "activity result delivered");
            if notify_host {
                if let Some(messenger) = self.messenger() {
                    let _ = messenger.send_command(Command::Close, None);
                }
            }
            self.disconnect();
        }
    }

    fn fail_internal(&self, error: ActivityError) {
        self.inner.result.fulfill(Err(error));
        self.disconnect();
    }

    fn messenger(&self) -> Option<Messenger> {
        self.inner.messenger.lock().ok().and_then(|g| g.clone())
    }

    fn messenger_or_err(&self) -> Result<Messenger> {
        self.messenger()
            .ok_or_else(|| ActivityError::Protocol("popup is not set up".into()))
    }
}

#[async_trait]
impl ActivityPort for ActivityWindowPort {
    fn mode(&self) -> ActivityMode {
        ActivityMode::Popup
    }

    async fn accept_result(&self) -> Result<ActivityResult> {
        self.inner.result.wait().await
    }
}

impl ActivityMessagingPort for ActivityWindowPort {
    fn target_win(&self) -> Option<Arc<dyn ContextWindow>> {
        self.inner.target.lock().ok().and_then(|g| g.clone())
    }

    fn message(&self, payload: Value) -> Result<()> {
        self.messenger_or_err()?.custom_message(payload)
    }

    fn on_message(&self, callback: Box<dyn Fn(Value) + Send + Sync>) -> Result<()> {
        self.messenger_or_err()?.on_custom_message(callback);
        Ok(())
    }

    fn message_channel(&self, name: Option<&str>) -> Result<ChannelPromise> {
        self.messenger_or_err()?.ask_channel(name.unwrap_or_default())
    }
}
