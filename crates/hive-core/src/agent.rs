//! Agent identity and pool state.
//!
//! The pool is a fixed, closed set of four agents: one supervisor and
//! three workers. Identities are never created or destroyed at runtime,
//! so they size every table and map in the system.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Broker topic shared by all agents for free-form log traffic.
pub const LOG_TOPIC: &str = "hive.log";

/// Prefix for per-agent inbound broker topics.
const AGENT_TOPIC_PREFIX: &str = "hive.agent";

/// One of the four fixed agent identities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentId {
    /// The coordinating agent.
    #[serde(rename = "supervisor")]
    Supervisor,
    /// First worker.
    #[serde(rename = "worker-0")]
    Worker0,
    /// Second worker.
    #[serde(rename = "worker-1")]
    Worker1,
    /// Third worker.
    #[serde(rename = "worker-2")]
    Worker2,
}

impl AgentId {
    /// Every agent in the pool, in canonical order.
    pub const ALL: [AgentId; 4] = [
        AgentId::Supervisor,
        AgentId::Worker0,
        AgentId::Worker1,
        AgentId::Worker2,
    ];

    /// Number of agents in the pool.
    pub const COUNT: usize = Self::ALL.len();

    /// Canonical string form (matches the serde rename).
    pub fn as_str(self) -> &'static str {
        match self {
            AgentId::Supervisor => "supervisor",
            AgentId::Worker0 => "worker-0",
            AgentId::Worker1 => "worker-1",
            AgentId::Worker2 => "worker-2",
        }
    }

    /// The agent's role, derived from its identity.
    pub fn role(self) -> Role {
        match self {
            AgentId::Supervisor => Role::Supervisor,
            _ => Role::Worker,
        }
    }

    /// The agent's inbound broker topic (`hive.agent.<id>`).
    pub fn topic(self) -> String {
        format!("{AGENT_TOPIC_PREFIX}.{}", self.as_str())
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown agent identifier.
#[derive(Debug, thiserror::Error)]
#[error("unknown agent id: {0}")]
pub struct ParseAgentIdError(String);

impl FromStr for AgentId {
    type Err = ParseAgentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ParseAgentIdError(s.to_string()))
    }
}

/// Agent role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Coordinates the workers.
    Supervisor,
    /// Executes assigned work.
    Worker,
}

/// Agent turn status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// No turn in flight.
    Idle,
    /// Exactly one turn in flight.
    Busy,
}

/// Live state of one agent, owned exclusively by the pool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerState {
    /// Agent identity.
    pub id: AgentId,
    /// Derived role.
    pub role: Role,
    /// Current turn status.
    pub status: Status,
    /// Runtime session, set after the first turn initializes and
    /// reused on every later turn for conversational continuity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl WorkerState {
    /// A fresh idle agent with no session.
    pub fn new(id: AgentId) -> Self {
        Self {
            id,
            role: id.role(),
            status: Status::Idle,
            session_id: None,
        }
    }
}

/// Point-in-time snapshot of the pool, derived on demand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoolState {
    /// Pool-wide status flag surfaced to viewers.
    pub running: bool,
    /// One entry per agent, in [`AgentId::ALL`] order.
    pub agents: Vec<WorkerState>,
}
