//! Viewer wire protocol.
//!
//! Server→viewer traffic flows over one streaming WebSocket connection
//! as [`ServerMessage`] JSON. Viewer→server state changes (send a
//! message, interrupt) are separate short-lived HTTP calls whose
//! bodies also live here.

use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, PoolState};
use crate::event::AgentEvent;

/// Machine-readable error code: unknown agent id in a request path.
pub const AGENT_NOT_FOUND: &str = "AGENT_NOT_FOUND";
/// Machine-readable error code: the pool has shut down.
pub const POOL_UNAVAILABLE: &str = "POOL_UNAVAILABLE";
/// Machine-readable error code: request body malformed.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";

/// Envelope pushed to each connected viewer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full pool snapshot, sent once at connect time.
    PoolState {
        /// The snapshot.
        pool: PoolState,
    },

    /// One event, tagged with its producing agent.
    AgentEvent {
        /// Producing agent.
        #[serde(rename = "agentId")]
        agent_id: AgentId,
        /// The event.
        event: AgentEvent,
    },
}

/// Body of `POST /agents/{id}/message`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SendMessageRequest {
    /// Message text handed to the agent as its next prompt.
    pub text: String,
}

/// Body of `POST /running`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetRunningRequest {
    /// New value for the pool-wide running flag.
    pub running: bool,
}

/// Acknowledgement body for fire-and-forget control calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ack {
    /// Always true on a 2xx response.
    pub ok: bool,
}

/// Structured error body on 4xx/5xx responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code (e.g. `AGENT_NOT_FOUND`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}
