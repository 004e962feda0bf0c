//! In-memory platform doubles shared by the integration tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use actport_client::messenger::ChannelCaps;
use actport_client::platform::{Platform, ScreenMetrics};
use actport_client::transport::{ChannelEndpoint, ContextWindow, WindowEvent, WindowId};
use actport_core::{ActivityError, Command, Result};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Broadcast-send log of one handle, for ordering assertions.
pub type SendLog = Arc<Mutex<Vec<Value>>>;

pub fn new_log() -> SendLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Wire command names recorded in a send log.
pub fn cmds_in(log: &SendLog) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|v| v.get("cmd").and_then(Value::as_str).map(String::from))
        .collect()
}

/// One fake browsing context with fan-out message delivery.
pub struct FakeContext {
    id: WindowId,
    origin: String,
    listeners: Mutex<Vec<mpsc::UnboundedSender<WindowEvent>>>,
    closed: AtomicBool,
}

impl FakeContext {
    pub fn new(origin: &str) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            origin: origin.to_string(),
            listeners: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn deliver(&self, event: WindowEvent) {
        for listener in self.listeners.lock().unwrap().iter() {
            let _ = listener.send(event.clone());
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<WindowEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().unwrap().push(tx);
        rx
    }

    pub fn set_closed(&self, closed: bool) {
        self.closed.store(closed, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Handle to a fake context as seen from a specific sender, mirroring the
/// origin-addressed post primitive.
pub struct FakeHandle {
    target: Arc<FakeContext>,
    sender: Arc<FakeContext>,
    log: SendLog,
}

impl FakeHandle {
    pub fn new(target: &Arc<FakeContext>, sender: &Arc<FakeContext>, log: SendLog) -> Arc<Self> {
        Arc::new(Self {
            target: Arc::clone(target),
            sender: Arc::clone(sender),
            log,
        })
    }
}

impl ContextWindow for FakeHandle {
    fn id(&self) -> WindowId {
        self.target.id
    }

    fn post(
        &self,
        data: Value,
        target_origin: &str,
        transfer: Option<ChannelEndpoint>,
    ) -> Result<()> {
        self.log.lock().unwrap().push(data.clone());
        // postMessage semantics: a mismatched target origin drops silently.
        if target_origin != "*" && target_origin != self.target.origin {
            return Ok(());
        }
        self.target.deliver(WindowEvent {
            origin: self.sender.origin.clone(),
            source: Some(self.sender.id),
            data,
            transfer,
        });
        Ok(())
    }

    fn listen(&self) -> Result<mpsc::UnboundedReceiver<WindowEvent>> {
        Ok(self.target.subscribe())
    }

    fn closed(&self) -> bool {
        self.target.is_closed()
    }

    fn close(&self) {
        self.target.set_closed(true);
    }
}

/// Two linked contexts plus the four handles a client/host pair needs.
pub struct Link {
    pub client_ctx: Arc<FakeContext>,
    pub host_ctx: Arc<FakeContext>,
    /// Listener handle for the client's own context.
    pub client_own: Arc<FakeHandle>,
    /// The client's handle to the host context.
    pub client_to_host: Arc<FakeHandle>,
    pub host_own: Arc<FakeHandle>,
    pub host_to_client: Arc<FakeHandle>,
    /// Broadcast posts the client performed.
    pub client_sends: SendLog,
    /// Broadcast posts the host performed.
    pub host_sends: SendLog,
}

pub fn link(client_origin: &str, host_origin: &str) -> Link {
    let client_ctx = FakeContext::new(client_origin);
    let host_ctx = FakeContext::new(host_origin);
    let client_sends = new_log();
    let host_sends = new_log();
    Link {
        client_own: FakeHandle::new(&client_ctx, &client_ctx, new_log()),
        client_to_host: FakeHandle::new(&host_ctx, &client_ctx, Arc::clone(&client_sends)),
        host_own: FakeHandle::new(&host_ctx, &host_ctx, new_log()),
        host_to_client: FakeHandle::new(&client_ctx, &host_ctx, Arc::clone(&host_sends)),
        client_ctx,
        host_ctx,
        client_sends,
        host_sends,
    }
}

/// Scriptable platform double.
pub struct FakePlatform {
    page_url: Mutex<String>,
    referrer: Mutex<String>,
    pub replaced: Mutex<Vec<String>>,
    open_script: Mutex<VecDeque<Option<Arc<FakeHandle>>>>,
    open_calls: Mutex<Vec<(String, String, Option<String>)>>,
    requires_upgrade: AtomicBool,
    supports_channel: AtomicBool,
}

impl FakePlatform {
    pub fn new(page_url: &str, referrer: &str) -> Arc<Self> {
        Arc::new(Self {
            page_url: Mutex::new(page_url.to_string()),
            referrer: Mutex::new(referrer.to_string()),
            replaced: Mutex::new(Vec::new()),
            open_script: Mutex::new(VecDeque::new()),
            open_calls: Mutex::new(Vec::new()),
            requires_upgrade: AtomicBool::new(false),
            supports_channel: AtomicBool::new(true),
        })
    }

    /// Queue the outcome of the next `open` call; `None` simulates a
    /// blocked open.
    pub fn script_open(&self, outcome: Option<Arc<FakeHandle>>) {
        self.open_script.lock().unwrap().push_back(outcome);
    }

    pub fn set_caps(&self, requires_upgrade: bool, supports_channel: bool) {
        self.requires_upgrade
            .store(requires_upgrade, Ordering::SeqCst);
        self.supports_channel
            .store(supports_channel, Ordering::SeqCst);
    }

    pub fn opens(&self) -> Vec<(String, String, Option<String>)> {
        self.open_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn open(
        &self,
        url: &str,
        target: &str,
        features: Option<&str>,
    ) -> Result<Arc<dyn ContextWindow>> {
        self.open_calls.lock().unwrap().push((
            url.to_string(),
            target.to_string(),
            features.map(String::from),
        ));
        match self.open_script.lock().unwrap().pop_front() {
            Some(Some(handle)) => {
                let win: Arc<dyn ContextWindow> = handle;
                Ok(win)
            }
            Some(None) => Err(ActivityError::OpenFailed("blocked by platform".into())),
            None => Err(ActivityError::OpenFailed("unscripted open".into())),
        }
    }

    fn page_url(&self) -> String {
        self.page_url.lock().unwrap().clone()
    }

    fn referrer(&self) -> String {
        self.referrer.lock().unwrap().clone()
    }

    fn replace_state(&self, url: &str) -> Result<()> {
        self.replaced.lock().unwrap().push(url.to_string());
        Ok(())
    }

    fn screen(&self) -> ScreenMetrics {
        ScreenMetrics {
            width: 1920,
            height: 1080,
            avail_width: 1920,
            avail_height: 1040,
        }
    }

    fn requires_channel_upgrade(&self) -> bool {
        self.requires_upgrade.load(Ordering::SeqCst)
    }

    fn supports_message_channel(&self) -> bool {
        self.supports_channel.load(Ordering::SeqCst)
    }
}

/// Capability shorthands.
pub fn caps(accepts_channel: bool, supports_channel: bool) -> ChannelCaps {
    ChannelCaps {
        accepts_channel,
        supports_channel,
    }
}

/// Command handler that records into a channel.
pub fn command_recorder() -> (
    impl Fn(Command) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<Command>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (move |cmd| {
        let _ = tx.send(cmd);
    }, rx)
}

/// Let spawned tasks drain their queues without advancing the clock.
pub async fn drain() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Install the test tracing subscriber (RUST_LOG-driven); repeated calls are
/// no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
