//! Reconnecting WebSocket stream consumer.
//!
//! Owns a background task that keeps one connection to the server's
//! `/ws` endpoint alive, folding every message into a shared
//! [`ViewState`]. Lost connections are retried with exponential
//! backoff; a successful open resets the backoff even if the
//! connection drops again immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hive_core::{AgentEvent, AgentId, ChatState, PoolState, ServerMessage};

use crate::state::ViewState;

/// Where the consumer's connection state machine currently sits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A connect attempt is in flight.
    Connecting,
    /// The stream is open and applying messages.
    Connected,
    /// Waiting out the backoff delay before the next attempt.
    BackingOff,
    /// Torn down; no further attempts.
    Stopped,
}

/// First retry delay.
const BASE_DELAY_MS: u64 = 1_000;
/// Retry delay ceiling.
const MAX_DELAY_MS: u64 = 30_000;

/// Delay before reconnect attempt number `attempt` (zero-based):
/// `BASE_DELAY_MS * 2^attempt`, capped at [`MAX_DELAY_MS`].
pub fn reconnect_delay(attempt: u32) -> Duration {
    // 2^5 already clears the cap, so clamping the exponent avoids
    // shift overflow for large attempt counts.
    let ms = BASE_DELAY_MS.saturating_mul(1 << attempt.min(5));
    Duration::from_millis(ms.min(MAX_DELAY_MS))
}

/// Attempt counter behind [`reconnect_delay`].
///
/// `next_delay` escalates on each call; `reset` drops back to the base
/// delay after a successful open, so a long-lived connection that
/// finally fails starts over at one second.
#[derive(Debug, Default)]
struct Backoff {
    attempt: u32,
}

impl Backoff {
    fn next_delay(&mut self) -> Duration {
        let delay = reconnect_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Handle over a background task consuming the server stream.
///
/// Dropping the consumer tears the connection down.
pub struct StreamConsumer {
    state: Arc<Mutex<ViewState>>,
    status: Arc<Mutex<ConnectionStatus>>,
    revision: Arc<AtomicU64>,
    shutdown: CancellationToken,
}

impl StreamConsumer {
    /// Start consuming `ws_url` (e.g. `ws://127.0.0.1:4710/ws`).
    ///
    /// Returns immediately; the first connection attempt happens on
    /// the background task.
    pub fn connect(ws_url: impl Into<String>) -> Self {
        let state = Arc::new(Mutex::new(ViewState::new()));
        let status = Arc::new(Mutex::new(ConnectionStatus::Connecting));
        let revision = Arc::new(AtomicU64::new(0));
        let shutdown = CancellationToken::new();
        drop(tokio::spawn(run_loop(
            ws_url.into(),
            Arc::clone(&state),
            Arc::clone(&status),
            Arc::clone(&revision),
            shutdown.clone(),
        )));
        Self {
            state,
            status,
            revision,
            shutdown,
        }
    }

    /// Current position in the connect/backoff state machine.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock()
    }

    /// Clone of the full view.
    pub fn view(&self) -> ViewState {
        self.state.lock().clone()
    }

    /// Latest pool snapshot, absent before the first connect.
    pub fn pool(&self) -> Option<PoolState> {
        self.state.lock().pool.clone()
    }

    /// The conversation for one agent.
    pub fn chat(&self, agent_id: AgentId) -> ChatState {
        self.state.lock().chat(agent_id)
    }

    /// The raw event log for one agent, in arrival order.
    pub fn events(&self, agent_id: AgentId) -> Vec<AgentEvent> {
        self.state.lock().events(agent_id)
    }

    /// Counter bumped on every applied message. Lets callers detect
    /// quiescence without inspecting the view.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Stop consuming and close the connection. Idempotent.
    pub fn teardown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for StreamConsumer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_loop(
    url: String,
    state: Arc<Mutex<ViewState>>,
    status: Arc<Mutex<ConnectionStatus>>,
    revision: Arc<AtomicU64>,
    shutdown: CancellationToken,
) {
    let mut backoff = Backoff::default();
    loop {
        *status.lock() = ConnectionStatus::Connecting;
        tokio::select! {
            () = shutdown.cancelled() => break,
            result = tokio_tungstenite::connect_async(&url) => match result {
                Ok((stream, _)) => {
                    info!(url, "stream connected");
                    backoff.reset();
                    *status.lock() = ConnectionStatus::Connected;
                    consume(stream, &state, &revision, &shutdown).await;
                    if shutdown.is_cancelled() {
                        break;
                    }
                    warn!(url, "stream closed, reconnecting");
                }
                Err(e) => {
                    warn!(url, error = %e, attempt = backoff.attempt, "connect failed");
                }
            },
        }
        let delay = backoff.next_delay();
        debug!(delay_ms = delay.as_millis() as u64, "backing off");
        *status.lock() = ConnectionStatus::BackingOff;
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }
    *status.lock() = ConnectionStatus::Stopped;
    debug!(url, "stream consumer stopped");
}

async fn consume(
    mut stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    state: &Mutex<ViewState>,
    revision: &AtomicU64,
    shutdown: &CancellationToken,
) {
    loop {
        let message = tokio::select! {
            () = shutdown.cancelled() => {
                let _ = stream.close(None).await;
                return;
            }
            message = stream.next() => message,
        };
        match message {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(message) => {
                    state.lock().apply(message);
                    let _ = revision.fetch_add(1, Ordering::Release);
                }
                Err(e) => warn!(error = %e, "skipping unparseable server message"),
            },
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "websocket receive error");
                return;
            }
        }
    }
}
