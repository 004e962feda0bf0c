//! ActivityWindowPort lifecycle tests: open, handshake, liveness, results.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::advance;

use actport_client::messenger::Messenger;
use actport_client::platform::Platform;
use actport_client::port::{
    ActivityMessagingPort, ActivityPort, ActivityWindowPort, OpenOptions,
};
use actport_client::settings::ClientSettings;
use actport_client::transport::PeerRef;
use actport_client::urlutil;
use actport_core::request::ActivityRequest;
use actport_core::{
    ActivityError, ActivityMode, ActivityResultCode, Command,
};

use common::{caps, command_recorder, drain, link, FakePlatform, Link};

fn new_port(
    platform: &Arc<FakePlatform>,
    link: &Link,
    open_target: &str,
    options: OpenOptions,
) -> ActivityWindowPort {
    let platform: Arc<dyn Platform> = platform.clone();
    ActivityWindowPort::new(
        platform,
        link.client_own.clone(),
        "req-1",
        "https://host.example/activity",
        open_target,
        Some(json!({"product": "basic"})),
        options,
        ClientSettings::default(),
    )
    .unwrap()
}

fn host_messenger(link: &Link) -> (Messenger, UnboundedReceiver<Command>) {
    let host = Messenger::new(
        link.host_own.clone(),
        PeerRef::resolved(link.host_to_client.clone()),
        None,
        false,
        caps(false, false),
    );
    let (recorder, commands) = command_recorder();
    host.connect(recorder).unwrap();
    (host, commands)
}

/// Open a popup port and complete the handshake with a real host messenger.
async fn open_popup(
    options: OpenOptions,
) -> (
    Link,
    Arc<FakePlatform>,
    ActivityWindowPort,
    Messenger,
    UnboundedReceiver<Command>,
) {
    common::init_tracing();
    let link = link("https://client.example", "https://host.example");
    let platform = FakePlatform::new("https://client.example/page#tab=2", "");
    platform.script_open(Some(link.client_to_host.clone()));

    let port = new_port(&platform, &link, "_blank", options);
    port.open().await.unwrap();

    let (host, mut host_cmds) = host_messenger(&link);
    host.send_connect_command().unwrap();
    drain().await;
    port.when_connected().await;

    // Swallow the start command of the handshake.
    match host_cmds.try_recv().unwrap() {
        Command::Start { args } => assert_eq!(args.unwrap()["product"], "basic"),
        other => panic!("wrong command: {other:?}"),
    }

    (link, platform, port, host, host_cmds)
}

#[tokio::test(start_paused = true)]
async fn open_embeds_the_request_and_popup_features() {
    let (_link, platform, _port, _host, _host_cmds) = open_popup(OpenOptions::default()).await;

    let opens = platform.opens();
    assert_eq!(opens.len(), 1);
    let (url, target, features) = &opens[0];
    assert_eq!(target, "_blank");
    assert!(features.as_deref().unwrap().contains("width=600,height=600"));

    let serialized = urlutil::get_fragment_param(url, "__WA__").unwrap();
    let request = ActivityRequest::parse(&serialized).unwrap();
    assert_eq!(request.request_id, "req-1");
    // The page's own fragment is not leaked into the return URL.
    assert_eq!(request.return_url, "https://client.example/page");
    assert_eq!(request.args.unwrap()["product"], "basic");
}

#[tokio::test(start_paused = true)]
async fn ok_result_resolves_once_and_tears_down() {
    let (link, _platform, port, host, mut host_cmds) = open_popup(OpenOptions::default()).await;

    host.send_command(
        Command::Result {
            code: ActivityResultCode::Ok,
            data: json!({"token": "t1"}),
        },
        None,
    )
    .unwrap();
    drain().await;

    let result = port.accept_result().now_or_never().unwrap().unwrap();
    assert!(result.ok());
    assert_eq!(result.code(), ActivityResultCode::Ok);
    assert_eq!(result.data(), Some(&json!({"token": "t1"})));
    assert_eq!(result.mode(), ActivityMode::Popup);
    assert_eq!(result.origin(), "https://host.example");
    assert!(result.origin_verified());
    assert!(result.secure_channel());

    // Courtesy close reached the host, and the popup was closed.
    assert!(matches!(host_cmds.try_recv().unwrap(), Command::Close));
    assert!(link.host_ctx.is_closed());

    // Duplicate results do not change the outcome.
    host.send_command(
        Command::Result {
            code: ActivityResultCode::Failed,
            data: json!("late"),
        },
        None,
    )
    .unwrap();
    drain().await;
    let again = port.accept_result().now_or_never().unwrap().unwrap();
    assert!(again.ok());
}

#[tokio::test(start_paused = true)]
async fn failed_result_carries_the_host_reason() {
    let (_link, _platform, port, host, _host_cmds) = open_popup(OpenOptions::default()).await;

    host.send_command(
        Command::Result {
            code: ActivityResultCode::Failed,
            data: json!("boom"),
        },
        None,
    )
    .unwrap();
    drain().await;

    let result = port.accept_result().now_or_never().unwrap().unwrap();
    assert!(!result.ok());
    assert_eq!(result.code(), ActivityResultCode::Failed);
    assert_eq!(result.error_message(), Some("boom"));
    assert_eq!(result.data(), None);
}

#[tokio::test(start_paused = true)]
async fn closed_popup_cancels_after_the_grace_window_not_before() {
    let (link, _platform, port, _host, _host_cmds) = open_popup(OpenOptions::default()).await;

    link.host_ctx.set_closed(true);
    // Next poll tick observes the closed context and arms the grace timer.
    advance(Duration::from_millis(500)).await;
    drain().await;

    advance(Duration::from_millis(2000)).await;
    drain().await;
    assert!(port.accept_result().now_or_never().is_none());

    advance(Duration::from_millis(999)).await;
    drain().await;
    assert!(port.accept_result().now_or_never().is_none());

    advance(Duration::from_millis(1)).await;
    drain().await;
    let result = port.accept_result().now_or_never().unwrap().unwrap();
    assert_eq!(result.code(), ActivityResultCode::Canceled);
    assert_eq!(result.data(), None);
}

#[tokio::test(start_paused = true)]
async fn host_check_detects_the_closed_popup_before_the_next_poll_tick() {
    let (link, _platform, port, host, _host_cmds) = open_popup(OpenOptions::default()).await;

    // Land just after a poll tick so the next one would be 500 ms away.
    advance(Duration::from_millis(500)).await;
    drain().await;
    link.host_ctx.set_closed(true);
    host.send_command(Command::Check, None).unwrap();
    drain().await;

    // check fires at +200, grace ends at +3200; the poll alone would have
    // pushed that to +3500.
    advance(Duration::from_millis(200)).await;
    drain().await;
    advance(Duration::from_millis(2999)).await;
    drain().await;
    assert!(port.accept_result().now_or_never().is_none());

    advance(Duration::from_millis(1)).await;
    drain().await;
    let result = port.accept_result().now_or_never().unwrap().unwrap();
    assert_eq!(result.code(), ActivityResultCode::Canceled);
}

#[tokio::test(start_paused = true)]
async fn late_result_after_cancellation_is_ignored() {
    let (link, _platform, port, host, mut host_cmds) = open_popup(OpenOptions::default()).await;

    link.host_ctx.set_closed(true);
    advance(Duration::from_millis(500)).await;
    drain().await;
    advance(Duration::from_millis(3000)).await;
    drain().await;
    let result = port.accept_result().now_or_never().unwrap().unwrap();
    assert_eq!(result.code(), ActivityResultCode::Canceled);

    host.send_command(
        Command::Result {
            code: ActivityResultCode::Ok,
            data: json!({"too": "late"}),
        },
        None,
    )
    .unwrap();
    drain().await;
    let again = port.accept_result().now_or_never().unwrap().unwrap();
    assert_eq!(again.code(), ActivityResultCode::Canceled);
    // Abandonment sends no courtesy close.
    assert!(host_cmds.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn blocked_popup_falls_back_to_a_top_level_redirect() {
    let link = link("https://client.example", "https://host.example");
    let platform = FakePlatform::new("https://client.example/page", "");
    platform.script_open(None);
    platform.script_open(Some(link.client_to_host.clone()));

    let port = new_port(&platform, &link, "_blank", OpenOptions::default());
    port.open().await.unwrap();

    let opens = platform.opens();
    assert_eq!(opens.len(), 2);
    assert_eq!(opens[0].1, "_blank");
    assert_eq!(opens[1].1, "_top");
    // The redirect leaves this page; no in-page messaging, result pending.
    assert!(port.accept_result().now_or_never().is_none());
    assert!(matches!(
        port.message(json!({"x": 1})),
        Err(ActivityError::Protocol(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn open_failure_in_all_modes_rejects_the_result() {
    let link = link("https://client.example", "https://host.example");
    let platform = FakePlatform::new("https://client.example/page", "");
    platform.script_open(None);
    platform.script_open(None);

    let port = new_port(&platform, &link, "_blank", OpenOptions::default());
    port.open().await.unwrap();

    assert!(matches!(
        port.accept_result().await,
        Err(ActivityError::OpenFailed(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn redirect_fallback_can_be_disabled() {
    let link = link("https://client.example", "https://host.example");
    let platform = FakePlatform::new("https://client.example/page", "");
    platform.script_open(None);

    let options = OpenOptions {
        disable_redirect_fallback: true,
        ..OpenOptions::default()
    };
    let port = new_port(&platform, &link, "_blank", options);
    port.open().await.unwrap();

    assert_eq!(platform.opens().len(), 1);
    assert!(matches!(
        port.accept_result().await,
        Err(ActivityError::OpenFailed(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn requested_top_level_target_skips_popup_setup() {
    let link = link("https://client.example", "https://host.example");
    let platform = FakePlatform::new("https://client.example/page", "");
    platform.script_open(Some(link.client_to_host.clone()));

    let port = new_port(&platform, &link, "_top", OpenOptions::default());
    port.open().await.unwrap();

    let opens = platform.opens();
    assert_eq!(opens[0].1, "_top");
    assert_eq!(opens[0].2, None);
    assert!(port.accept_result().now_or_never().is_none());
    assert!(port.when_connected().now_or_never().is_none());
}

#[tokio::test(start_paused = true)]
async fn request_embedding_can_be_skipped() {
    let link = link("https://client.example", "https://host.example");
    let platform = FakePlatform::new("https://client.example/page", "");
    platform.script_open(Some(link.client_to_host.clone()));

    let options = OpenOptions {
        skip_request_in_url: true,
        ..OpenOptions::default()
    };
    let port = new_port(&platform, &link, "_blank", options);
    port.open().await.unwrap();

    assert_eq!(platform.opens()[0].0, "https://host.example/activity");
}

#[tokio::test(start_paused = true)]
async fn messaging_and_sub_channels_delegate_to_the_messenger() {
    let (_link, _platform, port, host, _host_cmds) = open_popup(OpenOptions::default()).await;

    let host_seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&host_seen);
    host.on_custom_message(move |payload| sink.lock().unwrap().push(payload));

    let port_seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&port_seen);
    port.on_message(Box::new(move |payload| sink.lock().unwrap().push(payload)))
        .unwrap();

    port.message(json!({"up": 1})).unwrap();
    host.custom_message(json!({"down": 2})).unwrap();
    drain().await;

    assert_eq!(host_seen.lock().unwrap().as_slice(), &[json!({"up": 1})]);
    assert_eq!(port_seen.lock().unwrap().as_slice(), &[json!({"down": 2})]);

    let promise = port.message_channel(Some("analytics")).unwrap();
    drain().await;
    let client_end = promise.await;
    let host_end = host.start_channel("analytics").unwrap().await;
    let mut host_rx = host_end.listen().unwrap();
    client_end.post(json!("ping"), None).unwrap();
    assert_eq!(host_rx.recv().await.unwrap().data, json!("ping"));
}

#[tokio::test(start_paused = true)]
async fn disconnect_is_idempotent() {
    let (link, _platform, port, _host, _host_cmds) = open_popup(OpenOptions::default()).await;

    port.disconnect();
    port.disconnect();
    assert!(link.host_ctx.is_closed());
    // The released resolver leaves the result promise pending forever.
    assert!(port.accept_result().now_or_never().is_none());
}
