//! Router assembly and HTTP handlers.
//!
//! The HTTP surface is the client-to-server direction: short-lived
//! POSTs that act on the pool, plus read-only snapshots. The
//! server-to-client direction is the WebSocket in [`crate::ws`].

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use hive_core::wire::{Ack, SendMessageRequest, SetRunningRequest};
use hive_core::{AgentId, PoolState};
use hive_runtime::AgentPool;

use crate::error::ApiError;
use crate::ws;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The agent pool behind this server.
    pub pool: Arc<AgentPool>,
    /// Render handle for `/metrics`, absent when no recorder is
    /// installed (tests).
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// State over `pool`, optionally exposing Prometheus rendering.
    pub fn new(pool: Arc<AgentPool>, prometheus: Option<PrometheusHandle>) -> Self {
        Self { pool, prometheus }
    }
}

/// Assemble the full route table.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::handle_upgrade))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .route("/pool", get(get_pool))
        .route("/agents/{agent_id}/message", post(send_message))
        .route("/agents/{agent_id}/interrupt", post(interrupt))
        .route("/running", post(set_running))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "distribution server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

fn parse_agent(raw: &str) -> Result<AgentId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::AgentNotFound(raw.to_owned()))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

async fn get_pool(State(state): State<AppState>) -> Json<PoolState> {
    Json(state.pool.get_pool())
}

async fn send_message(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<Ack>, ApiError> {
    let agent_id = parse_agent(&agent_id)?;
    if request.text.trim().is_empty() {
        return Err(ApiError::InvalidParams("text must not be empty".into()));
    }
    state
        .pool
        .inject_message(agent_id, request.text)
        .map_err(|_| ApiError::PoolUnavailable)?;
    Ok(Json(Ack { ok: true }))
}

async fn interrupt(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    let agent_id = parse_agent(&agent_id)?;
    // Idle agents make this a no-op, which is still a success.
    let _ = state.pool.interrupt(agent_id);
    Ok(Json(Ack { ok: true }))
}

async fn set_running(
    State(state): State<AppState>,
    Json(request): Json<SetRunningRequest>,
) -> Json<Ack> {
    state.pool.set_running(request.running);
    Json(Ack { ok: true })
}
