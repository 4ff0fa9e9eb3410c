//! Re-authentication popup flow.

mod common;

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chainwatch::chain::reauth::{
    PopupOutcome, ReauthOutcome, ReauthPopup, await_popup, reauthenticate,
};
use chainwatch::client::BackendClient;
use common::MockHttp;
use tokio::sync::oneshot;

/// Answers with a fixed outcome, or never if `answer` is `None`.
struct ScriptedPopup {
    answer: Option<PopupOutcome>,
    opened: Mutex<Vec<String>>,
    pending: Mutex<Vec<oneshot::Sender<PopupOutcome>>>,
    closed: AtomicBool,
}

impl ScriptedPopup {
    fn new(answer: Option<PopupOutcome>) -> Self {
        Self {
            answer,
            opened: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }
}

impl ReauthPopup for ScriptedPopup {
    fn open(&self, url: &str) -> oneshot::Receiver<PopupOutcome> {
        self.opened.lock().unwrap().push(url.to_owned());
        let (tx, rx) = oneshot::channel();
        match self.answer {
            Some(outcome) => {
                let _ = tx.send(outcome);
            }
            None => self.pending.lock().unwrap().push(tx),
        }
        rx
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn test_popup_times_out_and_is_closed() {
    let popup = ScriptedPopup::new(None);
    let outcome = await_popup(&popup, "https://broker/login", Duration::from_secs(300)).await;

    assert_eq!(outcome, ReauthOutcome::TimedOut);
    assert!(popup.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_popup_completion_and_cancellation() {
    let done = ScriptedPopup::new(Some(PopupOutcome::Completed));
    assert_eq!(
        await_popup(&done, "u", Duration::from_secs(300)).await,
        ReauthOutcome::Reauthenticated
    );
    assert!(!done.closed.load(Ordering::SeqCst));

    let cancelled = ScriptedPopup::new(Some(PopupOutcome::Cancelled));
    assert_eq!(
        await_popup(&cancelled, "u", Duration::from_secs(300)).await,
        ReauthOutcome::Cancelled
    );
}

#[tokio::test]
async fn test_dropped_popup_counts_as_cancelled() {
    struct Vanishing;
    impl ReauthPopup for Vanishing {
        fn open(&self, _url: &str) -> oneshot::Receiver<PopupOutcome> {
            oneshot::channel().1
        }
        fn close(&self) {}
    }

    assert_eq!(
        await_popup(&Vanishing, "u", Duration::from_secs(300)).await,
        ReauthOutcome::Cancelled
    );
}

#[tokio::test]
async fn test_reauthenticate_requests_url_then_refreshes() {
    let server = MockHttp::start(vec![
        (200, r#"{"url":"https://broker.example/consent"}"#),
        (200, r#"{"status":"ok"}"#),
    ])
    .await;
    let client = BackendClient::with_base_url("bearer-1", &server.base_url).unwrap();
    let popup = ScriptedPopup::new(Some(PopupOutcome::Completed));

    let outcome = reauthenticate(&client, &popup, true, Duration::from_secs(300))
        .await
        .unwrap();

    assert_eq!(outcome, ReauthOutcome::Reauthenticated);
    assert_eq!(
        popup.opened.lock().unwrap().as_slice(),
        ["https://broker.example/consent".to_owned()]
    );

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/auth/upstox");
    assert_eq!(requests[0].body, r#"{"forceReauth":true}"#);
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer bearer-1"));
    assert_eq!(requests[1].path, "/upstox/refresh-token");
}

#[tokio::test]
async fn test_cancelled_reauth_skips_refresh() {
    let server = MockHttp::start(vec![(200, r#"{"url":"https://broker.example/consent"}"#)]).await;
    let client = BackendClient::with_base_url("bearer-1", &server.base_url).unwrap();
    let popup = ScriptedPopup::new(Some(PopupOutcome::Cancelled));

    let outcome = reauthenticate(&client, &popup, false, Duration::from_secs(300))
        .await
        .unwrap();

    assert_eq!(outcome, ReauthOutcome::Cancelled);
    assert_eq!(server.requests().len(), 1);
}
