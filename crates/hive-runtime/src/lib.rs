//! Turn execution and pool coordination.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`runtime`] | Boundary trait + wire format of the external agent runtime |
//! | [`process`] | Subprocess adapter speaking that wire format over NDJSON |
//! | [`script`] | Scripted runtime for tests and local development |
//! | [`turn`] | One streamed turn: raw runtime messages → [`AgentEvent`]s |
//! | [`pool`] | The fixed agent pool: status table, queues, fan-out, interrupt |
//!
//! [`AgentEvent`]: hive_core::AgentEvent

pub mod pool;
pub mod process;
pub mod runtime;
pub mod script;
pub mod turn;

pub use pool::{AgentPool, PoolError, PoolEvent};
pub use process::ProcessRuntime;
pub use script::ScriptedRuntime;
pub use runtime::{
    AgentConfig, AgentRuntime, ContentBlock, RuntimeError, RuntimeMessage, StreamPayload,
    TurnRequest, TurnStream,
};
pub use turn::{SIDE_CHANNEL_TOOL, TurnRunner};
