//! The canonical agent event union.
//!
//! Events are immutable and produced only by turn execution, with one
//! exception: `inject` is synthesized by the pool when a message is
//! pushed to an agent out-of-band, so viewers can render the outgoing
//! text without waiting for the turn to begin.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event in an agent's stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Incremental assistant text.
    TextDelta {
        /// Text fragment.
        text: String,
    },

    /// The agent invoked a tool.
    ToolUse {
        /// Tool name.
        name: String,
        /// Structured tool input.
        input: Value,
    },

    /// A tool produced a result.
    ToolResult {
        /// Result text, if the tool produced any.
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },

    /// Terminal marker — emitted exactly once per turn, always last.
    TurnEnd,

    /// The turn failed. Still followed by `turn_end`.
    Error {
        /// Human-readable failure description.
        message: String,
    },

    /// A message was injected into the agent out-of-band.
    Inject {
        /// The injected text.
        text: String,
    },

    /// The runtime compacted the agent's context.
    Compaction {
        /// Summary of the compacted history.
        summary: String,
        /// What triggered the compaction (`auto` when unreported).
        trigger: String,
        /// Context size before compaction, in tokens.
        #[serde(rename = "preTokens")]
        pre_tokens: u64,
    },
}

impl AgentEvent {
    /// Wire tag for this event (for logging and metrics labels).
    pub fn event_type(&self) -> &'static str {
        match self {
            AgentEvent::TextDelta { .. } => "text_delta",
            AgentEvent::ToolUse { .. } => "tool_use",
            AgentEvent::ToolResult { .. } => "tool_result",
            AgentEvent::TurnEnd => "turn_end",
            AgentEvent::Error { .. } => "error",
            AgentEvent::Inject { .. } => "inject",
            AgentEvent::Compaction { .. } => "compaction",
        }
    }

    /// Whether this event ends a turn from a viewer's perspective.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::TurnEnd | AgentEvent::Error { .. })
    }
}
