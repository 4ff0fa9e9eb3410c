//! Push-channel connection manager.
//!
//! Holds exactly one WebSocket connection to the backend for the lifetime of
//! a [`ChainChannel`]. Frames are JSON text messages of the form
//! `{"event": <name>, "data": <payload>}`; they are parsed into
//! [`ChannelEvent`]s and delivered in arrival order on an `mpsc` receiver,
//! together with locally generated lifecycle events (`Connected`,
//! `Disconnected`, `ConnectionError`).
//!
//! # Example
//!
//! ```no_run
//! use chainwatch::config::ChainConfig;
//! use chainwatch::ws::channel::{ChainChannel, ChannelEvent};
//!
//! # #[tokio::main]
//! # async fn main() -> chainwatch::error::Result<()> {
//! let (channel, mut events) = ChainChannel::open(&ChainConfig::default(), "your-bearer-token")?;
//!
//! while let Some(event) = events.recv().await {
//!     if let ChannelEvent::Connected { epoch } = event {
//!         println!("connected (epoch {epoch})");
//!     }
//! }
//! channel.close().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::chain::coordinator::ConnectionEpoch;
use crate::config::ChainConfig;
use crate::error::{ChainError, Result};
use crate::types::channel::{HttpFallback, ServerNotice, SubscribeRequest};
use crate::types::option_chain::{StrikeSnapshot, SymbolUpdate};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A lifecycle or server event from the push channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A connection was established. `epoch` increases with every dial.
    Connected { epoch: ConnectionEpoch },
    /// An established connection dropped.
    Disconnected { reason: String },
    /// A dial attempt failed.
    ConnectionError { message: String },
    /// `error` notice from the server.
    ServerError { message: String },
    /// `useHttpEndpoint`: issue the subscribe over HTTP.
    UseHttpFallback(HttpFallback),
    /// `subscriptionConfirmed`.
    SubscriptionConfirmed(Value),
    /// `strikePrices`: a full ladder.
    Snapshot(StrikeSnapshot),
    /// `symbolUpdate`: one tick.
    Tick(SymbolUpdate),
    /// `marketData`: advisory only.
    MarketData(Value),
}

/// Connectivity of the channel as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Serialize)]
struct OutgoingMessage<'a, T> {
    event: &'a str,
    data: &'a T,
}

/// Parse one text frame.
///
/// Returns `Ok(None)` for events this client does not consume.
pub fn parse_message(text: &str) -> Result<Option<ChannelEvent>> {
    let Envelope { event, data } = serde_json::from_str(text)?;
    let parsed = match event.as_str() {
        "strikePrices" => ChannelEvent::Snapshot(serde_json::from_value(data)?),
        "symbolUpdate" => ChannelEvent::Tick(serde_json::from_value(data)?),
        "useHttpEndpoint" => ChannelEvent::UseHttpFallback(serde_json::from_value(data)?),
        "subscriptionConfirmed" => ChannelEvent::SubscriptionConfirmed(data),
        "marketData" => ChannelEvent::MarketData(data),
        "error" => {
            let message = match data {
                Value::String(s) => s,
                other => serde_json::from_value::<ServerNotice>(other)
                    .ok()
                    .and_then(|n| n.message)
                    .unwrap_or_else(|| "unknown server error".to_owned()),
            };
            ChannelEvent::ServerError { message }
        }
        other => {
            tracing::trace!(event = other, "Ignoring unhandled channel event");
            return Ok(None);
        }
    };
    Ok(Some(parsed))
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WriterHalf = SplitSink<WsStream, Message>;

/// Owner of the single push-channel connection.
///
/// The background connection task is aborted when the channel is closed or
/// dropped, so no event is delivered once the owner is gone.
pub struct ChainChannel {
    writer: Arc<Mutex<Option<WriterHalf>>>,
    state: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<()>>,
}

impl ChainChannel {
    /// Spawn the connection task and return the channel with its event
    /// receiver.
    ///
    /// The URL and credential are validated up front; dialing happens in the
    /// background and is reported through `Connected` / `ConnectionError`.
    pub fn open(
        config: &ChainConfig,
        token: &str,
    ) -> Result<(Self, mpsc::Receiver<ChannelEvent>)> {
        let dialer = Dialer::new(&config.ws_url, token)?;
        // Fail fast on a malformed URL rather than inside the task.
        dialer.request()?;

        let (events_tx, events_rx) = mpsc::channel(config.event_channel_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let writer = Arc::new(Mutex::new(None));

        let task = tokio::spawn(connection_loop(
            dialer,
            writer.clone(),
            events_tx,
            state_tx,
            config.auto_reconnect,
            config.reconnect_delay(),
        ));

        Ok((
            Self {
                writer,
                state: state_rx,
                task: Some(task),
            },
            events_rx,
        ))
    }

    /// Current connectivity.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Send a subscribe message.
    pub async fn subscribe(&self, request: &SubscribeRequest) -> Result<()> {
        let json = serde_json::to_string(&OutgoingMessage {
            event: "subscribe",
            data: request,
        })?;

        let mut guard = self.writer.lock().await;
        let w = guard.as_mut().ok_or(ChainError::NotConnected)?;
        w.send(Message::Text(json.into())).await?;

        tracing::debug!(expiry = %request.expiry, mode = %request.mode, "Sent subscribe");
        Ok(())
    }

    /// Close the connection and stop the background task.
    pub async fn close(mut self) {
        if let Some(mut w) = self.writer.lock().await.take() {
            let _ = w.send(Message::Close(None)).await;
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        tracing::info!("Push channel closed");
    }
}

impl Drop for ChainChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

/// Builds the upgrade request with the bearer credential attached.
struct Dialer {
    url: String,
    auth: HeaderValue,
}

impl Dialer {
    fn new(url: &str, token: &str) -> Result<Self> {
        let auth = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            ChainError::InvalidArgument("token contains invalid header characters".into())
        })?;
        Ok(Self {
            url: url.to_owned(),
            auth,
        })
    }

    fn request(&self) -> Result<Request> {
        let mut request = self.url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, self.auth.clone());
        Ok(request)
    }
}

async fn connection_loop(
    dialer: Dialer,
    writer: Arc<Mutex<Option<WriterHalf>>>,
    events: mpsc::Sender<ChannelEvent>,
    state: watch::Sender<ConnectionState>,
    auto_reconnect: bool,
    reconnect_delay: Duration,
) {
    let mut epoch: ConnectionEpoch = 0;

    loop {
        state.send_replace(ConnectionState::Connecting);

        let dialed = match dialer.request() {
            Ok(request) => connect_async(request).await.map_err(ChainError::from),
            Err(e) => Err(e),
        };

        let lifecycle = match dialed {
            Ok((ws, _resp)) => {
                epoch += 1;
                let (write, mut read) = ws.split();
                *writer.lock().await = Some(write);
                state.send_replace(ConnectionState::Connected);
                tracing::info!(epoch, "Connected to push channel");

                if events.send(ChannelEvent::Connected { epoch }).await.is_err() {
                    return;
                }
                let Some(reason) = read_loop(&mut read, &events).await else {
                    return;
                };

                *writer.lock().await = None;
                ChannelEvent::Disconnected { reason }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Push channel connect failed");
                ChannelEvent::ConnectionError {
                    message: e.to_string(),
                }
            }
        };

        state.send_replace(ConnectionState::Disconnected);
        if events.send(lifecycle).await.is_err() || !auto_reconnect {
            return;
        }

        tracing::info!(
            delay_ms = reconnect_delay.as_millis() as u64,
            "Attempting reconnect..."
        );
        tokio::time::sleep(reconnect_delay).await;
    }
}

/// Forward frames until the connection ends.
///
/// Returns the disconnect reason, or `None` if the event receiver is gone.
async fn read_loop(
    read: &mut SplitStream<WsStream>,
    events: &mpsc::Sender<ChannelEvent>,
) -> Option<String> {
    loop {
        let event = match read.next().await {
            Some(Ok(Message::Text(text))) => match parse_message(&text) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse channel message");
                    continue;
                }
            },
            Some(Ok(Message::Close(frame))) => {
                tracing::info!("Push channel closed by server");
                return Some(
                    frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by server".to_owned()),
                );
            }
            // Ping/pong handled automatically by tungstenite
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::error!(error = %e, "Push channel error");
                return Some(e.to_string());
            }
            None => {
                tracing::info!("Push channel stream ended");
                return Some("stream ended".to_owned());
            }
        };

        if events.send(event).await.is_err() {
            return None;
        }
    }
}
