//! Boundary to the external agent runtime.
//!
//! The runtime is a black box that accepts a prompt plus a resumable
//! session id and produces a stream of typed messages. This module
//! fixes its wire format ([`RuntimeMessage`]) and the trait the rest
//! of the system depends on ([`AgentRuntime`]).

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use hive_core::AgentId;

/// `system` message subtype carrying the session id.
pub const INIT_SUBTYPE: &str = "init";
/// `system` message subtype marking a context compaction.
pub const COMPACT_SUBTYPE: &str = "compact_boundary";

/// Failures at the runtime boundary.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The runtime could not be started at all (configuration failure
    /// before any stream item was produced).
    #[error("failed to start agent runtime: {0}")]
    Spawn(String),
}

/// Static configuration for one agent.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Agent identity.
    pub id: AgentId,
    /// Model passed through to the runtime.
    pub model: String,
    /// Working directory for the runtime.
    pub cwd: PathBuf,
    /// Optional system prompt.
    pub system_prompt: Option<String>,
    /// Tool names the runtime may use. Empty means runtime default.
    pub allowed_tools: Vec<String>,
}

impl AgentConfig {
    /// A config with runtime defaults for everything but identity.
    pub fn new(id: AgentId, model: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            id,
            model: model.into(),
            cwd: cwd.into(),
            system_prompt: None,
            allowed_tools: Vec::new(),
        }
    }
}

/// One turn request handed to the runtime.
#[derive(Clone, Debug)]
pub struct TurnRequest {
    /// The agent's static configuration.
    pub config: AgentConfig,
    /// The prompt for this turn.
    pub prompt: String,
    /// Session to resume, absent on the agent's very first turn.
    pub resume_session_id: Option<String>,
}

/// An opened turn: the cancel primitive plus the message stream.
///
/// The `interrupt` token is handed back before any message is
/// consumed, so callers can cancel a turn that has not yet produced
/// output.
#[derive(Debug)]
pub struct TurnStream {
    /// Cooperative cancellation for this turn. Cancelling after the
    /// stream ends is a no-op.
    pub interrupt: CancellationToken,
    /// Typed messages, in runtime order, until the turn completes.
    pub messages: mpsc::Receiver<RuntimeMessage>,
}

/// The external agent runtime.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Open exactly one streamed turn.
    ///
    /// Returns an error only when the runtime cannot be started;
    /// failures mid-turn are reported in-stream via a `result`
    /// message with `is_error`.
    async fn start_turn(&self, request: TurnRequest) -> Result<TurnStream, RuntimeError>;
}

/// Compaction metadata reported by the runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompactMetadata {
    /// What triggered the compaction.
    pub trigger: String,
    /// Context size before compaction, in tokens.
    #[serde(rename = "preTokens", default)]
    pub pre_tokens: u64,
}

/// Payload of a `stream_event` message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamPayload {
    /// Incremental assistant text.
    TextDelta {
        /// Text fragment.
        text: String,
    },
    /// Any other streaming payload kind — carried but unused.
    #[serde(other)]
    Other,
}

/// A content block inside an `assistant` or `user` message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Complete assistant text (already covered by deltas).
    Text {
        /// Full text.
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
        #[serde(default)]
        content: Option<String>,
    },
    /// Any other block kind — carried but unused.
    #[serde(other)]
    Other,
}

/// One typed message on the runtime's stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeMessage {
    /// Lifecycle messages: `init` (session id) and `compact_boundary`.
    System {
        /// Message subtype.
        subtype: String,
        /// Session id, present on `init`.
        #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        /// Compaction summary, present on `compact_boundary`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
        /// Structured compaction metadata, sometimes omitted.
        #[serde(
            rename = "compactMetadata",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        compact_metadata: Option<CompactMetadata>,
    },

    /// Streaming partials.
    StreamEvent {
        /// The streamed payload.
        event: StreamPayload,
    },

    /// A complete assistant message.
    Assistant {
        /// Content blocks.
        content: Vec<ContentBlock>,
    },

    /// A complete user-side message (tool results).
    User {
        /// Content blocks.
        content: Vec<ContentBlock>,
    },

    /// Terminal result for the turn.
    Result {
        /// Result subtype (`success`, `error_during_execution`, ...).
        subtype: String,
        /// Whether the turn failed.
        #[serde(rename = "isError", default)]
        is_error: bool,
        /// Underlying error descriptions, possibly empty.
        #[serde(default)]
        errors: Vec<String>,
    },
}
