//! Broker re-authentication flow.
//!
//! 1. `POST /auth/upstox` for the consent URL.
//! 2. Open it in a [`ReauthPopup`] and wait for the user, capped at the
//!    configured timeout (5 minutes by default). On expiry the popup is
//!    force-closed and the flow is abandoned.
//! 3. On completion, `POST /upstox/refresh-token`.

use std::time::Duration;

use tokio::sync::oneshot;

use crate::client::BackendClient;
use crate::error::Result;

/// How the user left the popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupOutcome {
    Completed,
    Cancelled,
}

/// Presents the broker consent page to the user.
pub trait ReauthPopup: Send + Sync {
    /// Open `url`. The receiver resolves when the user finishes or closes
    /// the popup; dropping the sender counts as cancelled.
    fn open(&self, url: &str) -> oneshot::Receiver<PopupOutcome>;

    /// Force the popup closed.
    fn close(&self);
}

/// Result of a re-authentication attempt that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReauthOutcome {
    Reauthenticated,
    Cancelled,
    TimedOut,
}

/// Open the popup and wait for it, at most `cap`.
pub async fn await_popup(popup: &dyn ReauthPopup, url: &str, cap: Duration) -> ReauthOutcome {
    let rx = popup.open(url);
    match tokio::time::timeout(cap, rx).await {
        Ok(Ok(PopupOutcome::Completed)) => ReauthOutcome::Reauthenticated,
        Ok(Ok(PopupOutcome::Cancelled)) | Ok(Err(_)) => ReauthOutcome::Cancelled,
        Err(_) => {
            tracing::warn!(cap_secs = cap.as_secs(), "Re-authentication popup timed out");
            popup.close();
            ReauthOutcome::TimedOut
        }
    }
}

/// Run the full flow.
pub async fn reauthenticate(
    client: &BackendClient,
    popup: &dyn ReauthPopup,
    force: bool,
    cap: Duration,
) -> Result<ReauthOutcome> {
    let consent = client.request_auth_url(force).await?;
    tracing::info!("Opening broker consent popup");

    let outcome = await_popup(popup, &consent.url, cap).await;
    if outcome == ReauthOutcome::Reauthenticated {
        client.refresh_broker_token().await?;
        tracing::info!("Broker token refreshed");
    }
    Ok(outcome)
}
