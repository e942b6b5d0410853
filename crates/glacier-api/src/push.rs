//! Push channel with auto-reconnect and acknowledged emits.
//!
//! Connects to the server's WebSocket endpoint, decodes incoming event
//! frames into [`PushEvent`]s and fans them out through a
//! [`tokio::sync::broadcast`] channel. Outgoing requests are framed with a
//! numeric id and resolved when the matching acknowledgement arrives.
//! Reconnection uses exponential backoff with jitter.
//!
//! Frame shapes:
//!
//! ```text
//! server → client   {"event": "scan_progress", "data": {...}}
//! client → server   {"event": "start_network_scan", "data": {...}, "id": 7}
//! server → client   {"ack": 7, "data": {...}}
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use glacier_api::push::{PushChannel, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let url = url::Url::parse("wss://everyst.local/ws/")?;
//! let channel = PushChannel::connect(url, None, ReconnectConfig::default(), cancel.clone())?;
//! let mut rx = channel.subscribe();
//! while let Ok(event) = rx.recv().await {
//!     println!("{event:?}");
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::models::PushEvent;

// ── Channel capacities ───────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

type PendingAcks = DashMap<u64, oneshot::Sender<Value>>;

// ── PushState ────────────────────────────────────────────────────────

/// Connection state of the push channel. A standing condition, observed
/// through a `watch` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Disconnected,
}

impl PushState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for push reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,

    /// How long an emitted request waits for its acknowledgement. Default: 10s.
    pub ack_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
            ack_timeout: Duration::from_secs(10),
        }
    }
}

// ── Frames ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InboundFrame {
    Ack {
        ack: u64,
        #[serde(default)]
        data: Value,
    },
    Event {
        event: String,
        #[serde(default)]
        data: Value,
    },
}

#[derive(Debug, Serialize)]
struct OutboundFrame<'a> {
    event: &'a str,
    data: &'a Value,
    id: u64,
}

// ── PushChannel ──────────────────────────────────────────────────────

/// Handle to a running push channel.
///
/// One instance is shared by everything that needs server push; call
/// [`shutdown`](Self::shutdown) to tear down the background task.
pub struct PushChannel {
    event_rx: broadcast::Receiver<Arc<PushEvent>>,
    state_rx: watch::Receiver<PushState>,
    outbound_tx: mpsc::Sender<String>,
    pending: Arc<PendingAcks>,
    next_id: AtomicU64,
    ack_timeout: Duration,
    cancel: CancellationToken,
}

impl PushChannel {
    /// Spawn the connection loop and return immediately.
    ///
    /// The first connection attempt happens asynchronously; observe
    /// [`state`](Self::state) to learn when the channel is usable. The
    /// bearer token, when present, is sent as an `Authorization` header
    /// on the upgrade request.
    pub fn connect(
        ws_url: Url,
        token: Option<SecretString>,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        let uri: tungstenite::http::Uri = ws_url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::PushConnect(e.to_string()))?;

        let (event_tx, event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(PushState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let pending: Arc<PendingAcks> = Arc::new(DashMap::new());
        let ack_timeout = reconnect.ack_timeout;

        let link = Link {
            uri,
            token,
            event_tx,
            state_tx,
            pending: Arc::clone(&pending),
        };
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            push_loop(link, outbound_rx, reconnect, task_cancel).await;
        });

        Ok(Self {
            event_rx,
            state_rx,
            outbound_tx,
            pending,
            next_id: AtomicU64::new(1),
            ack_timeout,
            cancel,
        })
    }

    /// Get a new broadcast receiver for decoded events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PushEvent>> {
        self.event_rx.resubscribe()
    }

    /// Observe the connection state.
    pub fn state(&self) -> watch::Receiver<PushState> {
        self.state_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state_rx.borrow().is_connected()
    }

    /// Emit `event` with `data` and wait for the server's acknowledgement.
    ///
    /// Fails immediately with [`Error::PushUnavailable`] when the channel
    /// is not connected.
    pub async fn emit_with_ack(&self, event: &str, data: Value) -> Result<Value, Error> {
        if !self.is_connected() {
            return Err(Error::PushUnavailable);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = serde_json::to_string(&OutboundFrame {
            event,
            data: &data,
            id,
        })
        .map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        if self.outbound_tx.send(frame).await.is_err() {
            self.pending.remove(&id);
            return Err(Error::PushUnavailable);
        }
        tracing::debug!(event, id, "emitted push request");

        match tokio::time::timeout(self.ack_timeout, rx).await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(_)) => Err(Error::PushClosed {
                event: event.to_owned(),
            }),
            Err(_) => {
                self.pending.remove(&id);
                Err(Error::AckTimeout {
                    event: event.to_owned(),
                    timeout_ms: u64::try_from(self.ack_timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Derive the push endpoint from the REST base URL:
/// `http(s)://host[:port]/...` becomes `ws(s)://host[:port]/ws/`.
pub fn derive_push_url(base_url: &Url) -> Result<Url, Error> {
    let scheme = match base_url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    let host = base_url
        .host_str()
        .ok_or_else(|| Error::PushConnect(format!("no host in {base_url}")))?;
    let authority = match base_url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    Ok(Url::parse(&format!("{scheme}://{authority}/ws/"))?)
}

// ── Background loop ──────────────────────────────────────────────────

/// Everything a single connection needs, shared across reconnects.
struct Link {
    uri: tungstenite::http::Uri,
    token: Option<SecretString>,
    event_tx: broadcast::Sender<Arc<PushEvent>>,
    state_tx: watch::Sender<PushState>,
    pending: Arc<PendingAcks>,
}

/// Main loop: connect → serve → on error, backoff → reconnect.
async fn push_loop(
    link: Link,
    mut outbound_rx: mpsc::Receiver<String>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_serve(&link, &mut outbound_rx, &cancel) => result,
        };

        // In-flight requests can never be acknowledged on a dead socket.
        link.pending.clear();

        match result {
            Ok(()) if cancel.is_cancelled() => break,
            Ok(()) => {
                tracing::info!("push channel disconnected cleanly, reconnecting");
                attempt = 0;
                link.state_tx.send_replace(PushState::Reconnecting { attempt });
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "push channel error");

                if let Some(max) = reconnect.max_retries {
                    if attempt >= max {
                        tracing::error!(max_retries = max, "push reconnection limit reached, giving up");
                        break;
                    }
                }

                attempt += 1;
                link.state_tx.send_replace(PushState::Reconnecting { attempt });

                let delay = calculate_backoff(attempt - 1, &reconnect);
                tracing::info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    "waiting before reconnect"
                );

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    link.pending.clear();
    link.state_tx.send_replace(PushState::Disconnected);
    tracing::debug!("push loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

async fn connect_and_serve(
    link: &Link,
    outbound_rx: &mut mpsc::Receiver<String>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tracing::info!(uri = %link.uri, "connecting push channel");

    let mut request = ClientRequestBuilder::new(link.uri.clone());
    if let Some(ref token) = link.token {
        request = request.with_header("Authorization", format!("Bearer {}", token.expose_secret()));
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::PushConnect(e.to_string()))?;

    link.state_tx.send_replace(PushState::Connected);
    tracing::info!("push channel connected");

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(tungstenite::Message::Close(None)).await;
                return Ok(());
            }
            outbound = outbound_rx.recv() => {
                let Some(text) = outbound else { return Ok(()) };
                write
                    .send(tungstenite::Message::Text(text.into()))
                    .await
                    .map_err(|e| Error::PushConnect(e.to_string()))?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        handle_text(&text, &link.event_tx, &link.pending);
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite queues the pong; it goes out with the next write
                        tracing::trace!("push ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "push close frame received");
                        } else {
                            tracing::info!("push close frame received (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => return Err(Error::PushConnect(e.to_string())),
                    None => {
                        tracing::info!("push stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Message parsing ──────────────────────────────────────────────────

/// Route one text frame: acknowledgements resolve their pending request,
/// events are decoded and broadcast.
fn handle_text(text: &str, event_tx: &broadcast::Sender<Arc<PushEvent>>, pending: &PendingAcks) {
    match serde_json::from_str::<InboundFrame>(text) {
        Ok(InboundFrame::Ack { ack, data }) => match pending.remove(&ack) {
            Some((_, tx)) => {
                let _ = tx.send(data);
            }
            None => tracing::debug!(ack, "acknowledgement for unknown request"),
        },
        Ok(InboundFrame::Event { event, data }) => {
            // Ignore send errors -- just means no active subscribers right now
            let _ = event_tx.send(Arc::new(PushEvent::decode(&event, data)));
        }
        Err(e) => tracing::debug!(error = %e, "failed to parse push frame"),
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 ± 0.25)`
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
