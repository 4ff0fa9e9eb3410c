//! Push channel and live view against a local WebSocket server.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chainwatch::chain::coordinator::Phase;
use chainwatch::chain::reauth::{PopupOutcome, ReauthPopup};
use chainwatch::chain::view::{ChainHandle, ChainSnapshot, ChainViewBuilder};
use chainwatch::collab::{AuthContext, NoticeLevel, RecordingNotifier, StaticToken};
use chainwatch::config::ChainConfig;
use chainwatch::error::ChainError;
use chainwatch::types::channel::SubscribeRequest;
use chainwatch::ws::channel::{ChainChannel, ChannelEvent, ConnectionState};
use chrono::NaiveDate;
use common::MockHttp;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

const WAIT: Duration = Duration::from_secs(10);

/// Accept one WebSocket client, reporting its `Authorization` header.
async fn accept_one(
    listener: TcpListener,
    auth_tx: oneshot::Sender<Option<String>>,
) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    let mut auth = None;
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        auth = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        Ok(resp)
    };
    let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .unwrap();
    let _ = auth_tx.send(auth);
    ws
}

/// Next text frame as JSON.
async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Option<Value> {
    while let Some(Ok(msg)) = ws.next().await {
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).ok();
        }
    }
    None
}

fn strike_prices(expiry: &str) -> Message {
    let mut atm = Vec::new();
    for strike in [24_950, 25_000, 25_050] {
        atm.push(json!({"instrumentKey": format!("CE{strike}"), "strikePrice": strike, "instrumentType": "CE", "ltp": 100}));
        atm.push(json!({"instrumentKey": format!("PE{strike}"), "strikePrice": strike, "instrumentType": "PE", "ltp": 90}));
    }
    let frame = json!({
        "event": "strikePrices",
        "data": {"atmStrike": 25000, "expiryDate": expiry, "atmStrikes": atm}
    });
    Message::Text(frame.to_string().into())
}

fn index_tick(ltp: f64) -> Message {
    let frame = json!({
        "event": "symbolUpdate",
        "data": {"type": "index", "instrumentKey": "NSE_INDEX|Nifty 50", "ltp": ltp, "change": 12.5, "changePercent": 0.05}
    });
    Message::Text(frame.to_string().into())
}

async fn next_event(events: &mut mpsc::Receiver<ChannelEvent>) -> Option<ChannelEvent> {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for channel event")
}

fn config_for(listener: &TcpListener) -> ChainConfig {
    let addr = listener.local_addr().unwrap();
    ChainConfig {
        ws_url: format!("ws://{addr}/ws/option-chain"),
        auto_reconnect: false,
        ..ChainConfig::default()
    }
}

#[tokio::test]
async fn test_channel_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = config_for(&listener);
    let (auth_tx, auth_rx) = oneshot::channel();
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut ws = accept_one(listener, auth_tx).await;
        let subscribe = next_json(&mut ws).await;
        let _ = seen_tx.send(subscribe);
        ws.send(strike_prices("2026-10-20")).await.unwrap();
        ws.close(None).await.unwrap();
    });

    let (channel, mut events) = ChainChannel::open(&config, "secret-token").unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        Some(ChannelEvent::Connected { epoch: 1 })
    ));
    assert_eq!(channel.state(), ConnectionState::Connected);
    assert_eq!(auth_rx.await.unwrap().as_deref(), Some("Bearer secret-token"));

    let expiry = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();
    channel
        .subscribe(&SubscribeRequest::new("NSE_INDEX|Nifty 50", "ltpc", expiry))
        .await
        .unwrap();

    let sent = seen_rx.recv().await.unwrap().unwrap();
    assert_eq!(sent["event"], "subscribe");
    assert_eq!(sent["data"]["method"], "sub");
    assert_eq!(sent["data"]["expiry"], "2026-10-20");
    assert_eq!(sent["data"]["instrumentKeys"][0], "NSE_INDEX|Nifty 50");

    let Some(ChannelEvent::Snapshot(snap)) = next_event(&mut events).await else {
        panic!("expected snapshot");
    };
    assert_eq!(snap.atm_strikes.len(), 6);

    assert!(matches!(
        next_event(&mut events).await,
        Some(ChannelEvent::Disconnected { .. })
    ));
    // No reconnect configured: the task ends.
    assert!(next_event(&mut events).await.is_none());
    assert_eq!(channel.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connection_error_and_subscribe_while_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = config_for(&listener);
    drop(listener);

    let (channel, mut events) = ChainChannel::open(&config, "t").unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        Some(ChannelEvent::ConnectionError { .. })
    ));

    let expiry = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();
    let err = channel
        .subscribe(&SubscribeRequest::new("NSE_INDEX|Nifty 50", "ltpc", expiry))
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::NotConnected));
    channel.close().await;
}

#[tokio::test]
async fn test_reconnect_increments_epoch() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = ChainConfig {
        auto_reconnect: true,
        reconnect_delay_ms: 10,
        ..config_for(&listener)
    };

    tokio::spawn(async move {
        for _ in 0..2 {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.close(None).await.unwrap();
            while ws.next().await.is_some() {}
        }
    });

    let (channel, mut events) = ChainChannel::open(&config, "t").unwrap();
    let mut epochs = Vec::new();
    while epochs.len() < 2 {
        if let Some(ChannelEvent::Connected { epoch }) = next_event(&mut events).await {
            epochs.push(epoch);
        }
    }
    assert_eq!(epochs, vec![1, 2]);
    channel.close().await;
}

#[test]
fn test_open_rejects_malformed_url() {
    let config = ChainConfig {
        ws_url: "not a url".into(),
        ..ChainConfig::default()
    };
    assert!(ChainChannel::open(&config, "t").is_err());
}

// ---------------------------------------------------------------------------
// Live view
// ---------------------------------------------------------------------------

struct NoPopup;

impl ReauthPopup for NoPopup {
    fn open(&self, _url: &str) -> oneshot::Receiver<PopupOutcome> {
        oneshot::channel().1
    }

    fn close(&self) {}
}

#[derive(Default)]
struct RecordingAuth {
    token: Option<String>,
    fatal: Mutex<Vec<String>>,
}

impl AuthContext for RecordingAuth {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }

    fn on_fatal_credential_error(&self, err: &ChainError) {
        self.fatal.lock().unwrap().push(err.to_string());
    }
}

async fn wait_for(
    updates: &mut watch::Receiver<ChainSnapshot>,
    pred: impl Fn(&ChainSnapshot) -> bool,
) -> ChainSnapshot {
    tokio::time::timeout(WAIT, async {
        loop {
            {
                let snapshot = updates.borrow_and_update();
                if pred(&snapshot) {
                    return snapshot.clone();
                }
            }
            updates.changed().await.unwrap();
        }
    })
    .await
    .expect("timed out waiting for view state")
}

#[tokio::test]
async fn test_view_subscribes_and_tracks_atm() {
    let http = MockHttp::start(vec![(200, r#"["2099-01-01","2099-01-08"]"#)]).await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_url = config_for(&listener).ws_url;
    let (auth_tx, _auth_rx) = oneshot::channel();
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut ws = accept_one(listener, auth_tx).await;
        let subscribe = next_json(&mut ws).await;
        let _ = seen_tx.send(subscribe);
        ws.send(strike_prices("2099-01-01")).await.unwrap();
        ws.send(index_tick(25_032.0)).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let notifier = Arc::new(RecordingNotifier::default());
    let (view, handle) = ChainViewBuilder::new(
        Arc::new(StaticToken("tok".into())),
        notifier.clone(),
        Arc::new(NoPopup),
    )
    .api_base_url(&http.base_url)
    .ws_url(ws_url)
    .token_poll_interval_secs(0)
    .auto_reconnect(false)
    .build()
    .unwrap();

    let mut updates = handle.updates();
    let runner = tokio::spawn(view.run());

    let state = wait_for(&mut updates, |s| s.atm_strike == Some(25_050.0)).await;
    assert_eq!(state.phase, Phase::Subscribed);
    assert_eq!(state.connection, ConnectionState::Connected);
    assert_eq!(state.selected_expiry, NaiveDate::from_ymd_opt(2099, 1, 1));
    assert_eq!(state.expiries.len(), 2);
    assert_eq!(state.quote.as_ref().unwrap().ltp, 25_032.0);
    assert_eq!(state.rows.len(), 3);
    assert_eq!(state.rows[0].strike, 25_050.0);
    assert_eq!(state.put_call_ratio, None);

    let subscribe = seen_rx.recv().await.unwrap().unwrap();
    assert_eq!(subscribe["data"]["expiry"], "2099-01-01");
    assert!(notifier.notices().is_empty());

    handle.shutdown().await.unwrap();
    runner.await.unwrap().unwrap();
    assert_eq!(handle.snapshot().connection, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_view_reports_failed_expiry_load() {
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let api_url = format!("http://{}", dead.local_addr().unwrap());
    drop(dead);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_url = config_for(&listener).ws_url;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let notifier = Arc::new(RecordingNotifier::default());
    let (view, handle) = ChainViewBuilder::new(
        Arc::new(StaticToken("tok".into())),
        notifier.clone(),
        Arc::new(NoPopup),
    )
    .api_base_url(api_url)
    .ws_url(ws_url)
    .token_poll_interval_secs(0)
    .auto_reconnect(false)
    .build()
    .unwrap();
    let mut updates = handle.updates();
    let runner = tokio::spawn(view.run());

    wait_for(&mut updates, |s| s.connection == ConnectionState::Connected).await;
    tokio::time::timeout(WAIT, async {
        while notifier.notices().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let notices = notifier.notices();
    assert_eq!(notices[0].0, NoticeLevel::Error);
    assert!(notices[0].1.starts_with("Failed to load expiry dates"));
    assert_eq!(handle.snapshot().phase, Phase::Idle);

    handle.shutdown().await.unwrap();
    runner.await.unwrap().unwrap();
}

/// Runs a view whose subscribe is answered with an HTTP fallback, and the
/// fallback POST with `status` / `body`.
async fn run_fallback_rejection(
    status: u16,
    body: &'static str,
) -> (MockHttp, Arc<RecordingAuth>, Arc<RecordingNotifier>, ChainHandle, JoinHandle<chainwatch::Result<()>>) {
    let http = MockHttp::start(vec![(200, r#"["2099-01-01"]"#), (status, body)]).await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_url = config_for(&listener).ws_url;
    let (auth_tx, _auth_rx) = oneshot::channel();

    tokio::spawn(async move {
        let mut ws = accept_one(listener, auth_tx).await;
        let _subscribe = next_json(&mut ws).await;
        let frame = json!({
            "event": "useHttpEndpoint",
            "data": {"endpoint": "/upstox/subscribe", "payload": {"expiry": "2099-01-01"}}
        });
        ws.send(Message::Text(frame.to_string().into())).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let auth = Arc::new(RecordingAuth {
        token: Some("tok".into()),
        ..RecordingAuth::default()
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let (view, handle) = ChainViewBuilder::new(auth.clone(), notifier.clone(), Arc::new(NoPopup))
        .api_base_url(&http.base_url)
        .ws_url(ws_url)
        .token_poll_interval_secs(0)
        .auto_reconnect(false)
        .build()
        .unwrap();
    let runner = tokio::spawn(view.run());
    (http, auth, notifier, handle, runner)
}

#[tokio::test]
async fn test_view_fallback_rejected_bearer_escalates() {
    let (http, auth, notifier, handle, runner) = run_fallback_rejection(401, "").await;
    let mut updates = handle.updates();

    tokio::time::timeout(WAIT, async {
        while auth.fatal.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    let state = wait_for(&mut updates, |s| {
        s.phase == Phase::Idle && s.selected_expiry.is_some()
    })
    .await;

    assert!(!state.requires_reauth);
    assert!(state.last_error.is_none());
    assert_eq!(auth.fatal.lock().unwrap().len(), 1);
    assert!(notifier.notices().is_empty());
    let requests = http.requests();
    assert_eq!(requests[1].method, "POST");
    assert_eq!(requests[1].path, "/upstox/subscribe");

    handle.shutdown().await.unwrap();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_view_fallback_broker_expiry_requires_reauth() {
    let (_http, auth, notifier, handle, runner) = run_fallback_rejection(
        401,
        r#"{"requireReauth":true,"message":"Upstox token expired"}"#,
    )
    .await;
    let mut updates = handle.updates();

    let state = wait_for(&mut updates, |s| s.requires_reauth).await;
    assert!(matches!(state.phase, Phase::Error(_)));
    assert!(auth.fatal.lock().unwrap().is_empty());

    let notices = notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].0, NoticeLevel::Error);
    assert!(notices[0].1.contains("Broker session expired"));

    handle.shutdown().await.unwrap();
    runner.await.unwrap().unwrap();
}

#[test]
fn test_view_without_credential_escalates() {
    let auth = Arc::new(RecordingAuth::default());
    let result = ChainViewBuilder::new(
        auth.clone(),
        Arc::new(RecordingNotifier::default()),
        Arc::new(NoPopup),
    )
    .build();

    assert!(matches!(result, Err(ChainError::MissingCredential)));
    assert_eq!(auth.fatal.lock().unwrap().len(), 1);
}

#[test]
fn test_view_rejects_bad_strike_step() {
    let auth = Arc::new(RecordingAuth {
        token: Some("tok".into()),
        ..RecordingAuth::default()
    });
    let result = ChainViewBuilder::new(auth, Arc::new(RecordingNotifier::default()), Arc::new(NoPopup))
        .strike_step(0.0)
        .build();
    assert!(matches!(result, Err(ChainError::InvalidArgument(_))));
}
