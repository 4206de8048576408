//! Per-viewer WebSocket handling.
//!
//! Each connection gets a pool snapshot first, then the live event
//! stream. Viewers are read-only here; actions travel over the HTTP
//! routes. A viewer that falls behind the broadcast loses the oldest
//! events rather than stalling the pool.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use hive_core::ServerMessage;
use hive_runtime::AgentPool;

use crate::metrics::{
    WS_BROADCAST_DROPS_TOTAL, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::routes::AppState;

/// `GET /ws`: upgrade and attach the viewer to the pool.
pub async fn handle_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.pool))
}

async fn handle_socket(socket: WebSocket, pool: Arc<AgentPool>) {
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    debug!("viewer connected");

    // Subscribe before snapshotting so no event can fall between the
    // snapshot and the live stream.
    let mut events = pool.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let snapshot = ServerMessage::PoolState {
        pool: pool.get_pool(),
    };
    if send_message(&mut sender, &snapshot).await.is_ok() {
        stream_events(&mut sender, &mut receiver, &mut events).await;
    }

    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    debug!("viewer disconnected");
}

async fn stream_events(
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut SplitStream<WebSocket>,
    events: &mut tokio::sync::broadcast::Receiver<hive_runtime::PoolEvent>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let message = ServerMessage::AgentEvent {
                        agent_id: event.agent_id,
                        event: event.event,
                    };
                    if send_message(sender, &message).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    counter!(WS_BROADCAST_DROPS_TOTAL).increment(skipped);
                    warn!(skipped, "viewer fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                // Pings are answered at the protocol layer; client
                // payloads carry nothing here.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "websocket receive error");
                    break;
                }
            },
        }
    }
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(text) => sender.send(Message::Text(text.into())).await,
        Err(e) => {
            warn!(error = %e, "failed to serialize server message");
            Ok(())
        }
    }
}
