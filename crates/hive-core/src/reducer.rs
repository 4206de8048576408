//! Per-viewer conversation reducer.
//!
//! A pure state machine folding an ordered event slice into a
//! renderable message list plus a busy flag. Each viewer owns its own
//! [`ChatState`] per agent and rebuilds it independently from the same
//! broadcast stream — state is never shared across viewers, so a
//! broken fold on one viewer cannot corrupt another's view.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::AgentEvent;

/// A content block inside an assistant message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Assistant text, accumulated from deltas.
    Text {
        /// The text so far.
        text: String,
    },
    /// A tool invocation.
    ToolUse {
        /// Tool name.
        name: String,
        /// Structured input.
        input: Value,
    },
    /// A tool result.
    ToolResult {
        /// Result text, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
}

/// One message in the rendered conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    /// Text sent to the agent.
    User {
        /// Message text.
        text: String,
    },
    /// Agent output, as an ordered block list.
    Assistant {
        /// Content blocks.
        blocks: Vec<Block>,
    },
    /// A context-compaction marker.
    Compaction {
        /// Summary of the compacted history.
        summary: String,
        /// What triggered the compaction.
        trigger: String,
        /// Context size before compaction, in tokens.
        #[serde(rename = "preTokens")]
        pre_tokens: u64,
    },
}

/// Renderable conversation state for one agent, one viewer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatState {
    /// Ordered message list.
    pub messages: Vec<ChatMessage>,
    /// True exactly between a send/inject and the matching
    /// `turn_end`/`error`/interrupt.
    pub busy: bool,
}

/// An input to the reducer.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatAction {
    /// The viewer sent a message and a turn is starting.
    UserSend {
        /// Message text.
        text: String,
    },
    /// A second send arrived while busy — record it without starting
    /// a turn.
    EnqueueUser {
        /// Message text.
        text: String,
    },
    /// An event arrived on the agent's stream.
    AgentEvent {
        /// The event.
        event: AgentEvent,
    },
    /// The in-flight turn was interrupted.
    Interrupted,
}

/// Fold one action into the state.
pub fn reduce(state: &mut ChatState, action: ChatAction) {
    match action {
        ChatAction::UserSend { text } => {
            state.messages.push(ChatMessage::User { text });
            // Empty assistant shell so block-producing events have a home.
            state.messages.push(ChatMessage::Assistant { blocks: vec![] });
            state.busy = true;
        }
        ChatAction::EnqueueUser { text } => {
            state.messages.push(ChatMessage::User { text });
        }
        ChatAction::AgentEvent { event } => apply_event(state, event),
        ChatAction::Interrupted => state.busy = false,
    }
}

fn apply_event(state: &mut ChatState, event: AgentEvent) {
    match event {
        AgentEvent::TextDelta { text } => {
            let blocks = last_assistant_blocks(state);
            // Consecutive deltas fold into the trailing text block;
            // a delta after a tool block starts a new one.
            if let Some(Block::Text { text: tail }) = blocks.last_mut() {
                tail.push_str(&text);
            } else {
                blocks.push(Block::Text { text });
            }
        }
        AgentEvent::ToolUse { name, input } => {
            last_assistant_blocks(state).push(Block::ToolUse { name, input });
        }
        AgentEvent::ToolResult { content } => {
            last_assistant_blocks(state).push(Block::ToolResult { content });
        }
        AgentEvent::TurnEnd => state.busy = false,
        AgentEvent::Error { message } => {
            last_assistant_blocks(state).push(Block::Text {
                text: format!("Error: {message}"),
            });
            state.busy = false;
        }
        AgentEvent::Inject { text } => {
            // Rendered exactly like a viewer-initiated send.
            state.messages.push(ChatMessage::User { text });
            state.messages.push(ChatMessage::Assistant { blocks: vec![] });
            state.busy = true;
        }
        AgentEvent::Compaction {
            summary,
            trigger,
            pre_tokens,
        } => {
            state.messages.push(ChatMessage::Compaction {
                summary,
                trigger,
                pre_tokens,
            });
        }
    }
}

/// Blocks of the most recent assistant message, scanning from the end;
/// creates an empty assistant message if none exists.
fn last_assistant_blocks(state: &mut ChatState) -> &mut Vec<Block> {
    let position = state
        .messages
        .iter()
        .rposition(|m| matches!(m, ChatMessage::Assistant { .. }));
    let index = match position {
        Some(i) => i,
        None => {
            state.messages.push(ChatMessage::Assistant { blocks: vec![] });
            state.messages.len() - 1
        }
    };
    match &mut state.messages[index] {
        ChatMessage::Assistant { blocks } => blocks,
        _ => unreachable!("index points at an assistant message"),
    }
}
