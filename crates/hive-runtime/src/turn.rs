//! One streamed turn against the external runtime.
//!
//! Translates the runtime's raw message stream into canonical
//! [`AgentEvent`]s, intercepts the reserved side-channel tool as a
//! broker publish, and always closes the stream with exactly one
//! `turn_end`.

use bytes::Bytes;
use metrics::counter;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use hive_broker::Broker;
use hive_core::AgentEvent;
use hive_core::metrics::{AGENT_TURNS_TOTAL, BROKER_PUBLISHES_TOTAL};

use crate::runtime::{
    AgentConfig, AgentRuntime, COMPACT_SUBTYPE, ContentBlock, INIT_SUBTYPE, RuntimeError,
    RuntimeMessage, StreamPayload, TurnRequest, TurnStream,
};

/// Reserved tool name intercepted as a broker publish.
///
/// Its input (`{topic, message}`) is published verbatim; it is never
/// surfaced as a `tool_use` event.
pub const SIDE_CHANNEL_TOOL: &str = "publish_message";

/// Placeholder when a failed turn reports no error strings.
const DEFAULT_ERROR_MESSAGE: &str = "agent turn failed";

/// Compaction trigger used when the runtime omits metadata.
const DEFAULT_COMPACTION_TRIGGER: &str = "auto";

/// Runs single turns, publishing side-channel traffic to the broker.
pub struct TurnRunner<'a> {
    runtime: &'a dyn AgentRuntime,
    broker: &'a dyn Broker,
}

impl<'a> TurnRunner<'a> {
    /// Create a runner over the given runtime and broker.
    pub fn new(runtime: &'a dyn AgentRuntime, broker: &'a dyn Broker) -> Self {
        Self { runtime, broker }
    }

    /// Run one turn to completion.
    ///
    /// `on_interrupt_ready` receives the turn's cancel token before
    /// any stream item is consumed, so the caller can interrupt a turn
    /// that has produced no output yet. `on_session_id` fires when the
    /// runtime reports its session. Every translated event goes to
    /// `on_event`, ending with exactly one `turn_end` regardless of
    /// success, failure, or interruption.
    ///
    /// Errors only if the runtime cannot be started; agent-level
    /// failures become `error` events instead.
    #[instrument(skip_all, fields(agent_id = %config.id))]
    pub async fn run(
        &self,
        config: &AgentConfig,
        session_id: Option<String>,
        prompt: String,
        mut on_event: impl FnMut(AgentEvent),
        mut on_session_id: impl FnMut(String),
        on_interrupt_ready: impl FnOnce(CancellationToken),
    ) -> Result<(), RuntimeError> {
        let TurnStream {
            interrupt,
            mut messages,
        } = self
            .runtime
            .start_turn(TurnRequest {
                config: config.clone(),
                prompt,
                resume_session_id: session_id,
            })
            .await?;

        // Hand the cancel primitive back before touching the stream.
        on_interrupt_ready(interrupt);

        while let Some(message) = messages.recv().await {
            match message {
                RuntimeMessage::System {
                    subtype,
                    session_id,
                    summary,
                    compact_metadata,
                } => {
                    if subtype == INIT_SUBTYPE {
                        if let Some(sid) = session_id {
                            on_session_id(sid);
                        }
                    } else if subtype == COMPACT_SUBTYPE {
                        let (trigger, pre_tokens) = compact_metadata
                            .map(|m| (m.trigger, m.pre_tokens))
                            .unwrap_or_else(|| (DEFAULT_COMPACTION_TRIGGER.to_string(), 0));
                        on_event(AgentEvent::Compaction {
                            summary: summary.unwrap_or_default(),
                            trigger,
                            pre_tokens,
                        });
                    }
                }
                RuntimeMessage::StreamEvent {
                    event: StreamPayload::TextDelta { text },
                } => on_event(AgentEvent::TextDelta { text }),
                RuntimeMessage::StreamEvent { .. } => {}
                RuntimeMessage::Assistant { content } | RuntimeMessage::User { content } => {
                    for block in content {
                        match block {
                            ContentBlock::ToolUse { name, input } => {
                                if name == SIDE_CHANNEL_TOOL {
                                    self.publish_side_channel(&input).await;
                                } else {
                                    on_event(AgentEvent::ToolUse { name, input });
                                }
                            }
                            ContentBlock::ToolResult { content } => {
                                on_event(AgentEvent::ToolResult { content });
                            }
                            // Full text already arrived as deltas.
                            ContentBlock::Text { .. } | ContentBlock::Other => {}
                        }
                    }
                }
                RuntimeMessage::Result {
                    is_error, errors, ..
                } => {
                    if is_error {
                        let message = if errors.is_empty() {
                            DEFAULT_ERROR_MESSAGE.to_string()
                        } else {
                            errors.join("\n")
                        };
                        on_event(AgentEvent::Error { message });
                    }
                }
            }
        }

        counter!(AGENT_TURNS_TOTAL).increment(1);
        on_event(AgentEvent::TurnEnd);
        Ok(())
    }

    /// Publish the side-channel tool input. Malformed input is dropped
    /// silently — no publish, no event, no error.
    async fn publish_side_channel(&self, input: &Value) {
        let topic = input.get("topic").and_then(Value::as_str);
        let message = input.get("message").and_then(Value::as_str);
        let (Some(topic), Some(message)) = (topic, message) else {
            debug!("malformed side-channel input dropped");
            return;
        };
        match self
            .broker
            .publish(topic, Bytes::from(message.to_string()))
            .await
        {
            Ok(()) => counter!(BROKER_PUBLISHES_TOTAL).increment(1),
            // A lost side-channel message must not fail the turn.
            Err(e) => warn!(topic, error = %e, "side-channel publish failed"),
        }
    }
}
