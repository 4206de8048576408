//! Shared vocabulary for the hive agent pool.
//!
//! Three families of types, consumed by every other crate:
//!
//! - **[`agent`]**: the closed set of agent identities and the pool
//!   state snapshot derived from them.
//! - **[`event`]**: the canonical [`AgentEvent`](event::AgentEvent)
//!   union produced by turn execution and broadcast to viewers.
//! - **[`wire`]**: the server→viewer envelope and the short-lived
//!   HTTP request/response bodies.
//!
//! [`reducer`] is the one piece of logic: a pure, per-viewer state
//! machine folding an ordered event slice into a renderable
//! conversation.

pub mod agent;
pub mod event;
pub mod metrics;
pub mod reducer;
pub mod wire;

pub use agent::{AgentId, LOG_TOPIC, PoolState, Role, Status, WorkerState};
pub use event::AgentEvent;
pub use reducer::{Block, ChatAction, ChatMessage, ChatState, reduce};
pub use wire::ServerMessage;
