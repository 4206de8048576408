//! The viewer's local picture of the pool.
//!
//! Every connected viewer owns one [`ViewState`] and folds the same
//! server stream into it independently. Snapshots replace the pool
//! table wholesale; agent events run through the pure reducer, one
//! [`ChatState`] per agent.

use std::collections::HashMap;

use hive_core::{AgentEvent, AgentId, ChatAction, ChatState, PoolState, ServerMessage, reduce};

/// Everything a viewer renders: the pool table plus one conversation
/// per agent.
#[derive(Clone, Debug, Default)]
pub struct ViewState {
    /// Latest pool snapshot, absent until the first one arrives.
    pub pool: Option<PoolState>,
    /// Per-agent conversations, created lazily on first event.
    pub chats: HashMap<AgentId, ChatState>,
    /// Raw per-agent event logs, in arrival order.
    pub events: HashMap<AgentId, Vec<AgentEvent>>,
}

impl ViewState {
    /// Empty view, before any server contact.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one server message into the view.
    pub fn apply(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::PoolState { pool } => self.pool = Some(pool),
            ServerMessage::AgentEvent { agent_id, event } => {
                self.events.entry(agent_id).or_default().push(event.clone());
                reduce(
                    self.chats.entry(agent_id).or_default(),
                    ChatAction::AgentEvent { event },
                );
            }
        }
    }

    /// The conversation for one agent; empty if no events arrived yet.
    pub fn chat(&self, agent_id: AgentId) -> ChatState {
        self.chats.get(&agent_id).cloned().unwrap_or_default()
    }

    /// The raw event log for one agent, in arrival order.
    pub fn events(&self, agent_id: AgentId) -> Vec<AgentEvent> {
        self.events.get(&agent_id).cloned().unwrap_or_default()
    }
}
