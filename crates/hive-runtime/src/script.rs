//! Scripted agent runtime for tests and local development.
//!
//! Plays back queued message scripts instead of talking to a real
//! runtime, and records every [`TurnRequest`] for inspection. The
//! same double backs the unit tests here and the wire-level tests in
//! the server and client crates.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::runtime::{AgentRuntime, RuntimeError, RuntimeMessage, TurnRequest, TurnStream};

enum Script {
    /// Deliver these messages, then end the turn.
    Messages(Vec<RuntimeMessage>),
    /// Deliver these messages, then hold the turn open until released
    /// (or cancelled).
    Gated {
        messages: Vec<RuntimeMessage>,
        release: oneshot::Receiver<()>,
    },
    /// Produce nothing until cancelled.
    BlockUntilCancelled,
}

/// In-memory [`AgentRuntime`] playing back prearranged scripts.
///
/// Each `start_turn` consumes the next queued script; with an empty
/// queue the turn completes immediately with no output.
#[derive(Clone, Default)]
pub struct ScriptedRuntime {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<TurnRequest>>,
    fail_next: Mutex<Option<String>>,
}

impl ScriptedRuntime {
    /// Create a runtime with no queued scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a script that delivers `messages` and ends the turn.
    pub fn push_script(&self, messages: Vec<RuntimeMessage>) {
        self.inner
            .scripts
            .lock()
            .push_back(Script::Messages(messages));
    }

    /// Queue a script that delivers `messages`, then holds the turn
    /// open until the returned sender fires (or the turn is
    /// cancelled).
    pub fn push_gated_script(&self, messages: Vec<RuntimeMessage>) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.inner.scripts.lock().push_back(Script::Gated {
            messages,
            release: rx,
        });
        tx
    }

    /// Queue a script that produces nothing until cancelled.
    pub fn push_blocking_script(&self) {
        self.inner
            .scripts
            .lock()
            .push_back(Script::BlockUntilCancelled);
    }

    /// Make the next `start_turn` fail before producing a stream.
    pub fn fail_next_start(&self, reason: impl Into<String>) {
        *self.inner.fail_next.lock() = Some(reason.into());
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<TurnRequest> {
        self.inner.requests.lock().clone()
    }

    /// Number of turns started.
    pub fn turn_count(&self) -> usize {
        self.inner.requests.lock().len()
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn start_turn(&self, request: TurnRequest) -> Result<TurnStream, RuntimeError> {
        if let Some(reason) = self.inner.fail_next.lock().take() {
            return Err(RuntimeError::Spawn(reason));
        }
        self.inner.requests.lock().push(request);

        let script = self
            .inner
            .scripts
            .lock()
            .pop_front()
            .unwrap_or(Script::Messages(vec![]));

        let interrupt = CancellationToken::new();
        let (tx, rx) = mpsc::channel(64);
        let token = interrupt.clone();
        drop(tokio::spawn(async move {
            match script {
                Script::Messages(messages) => {
                    for message in messages {
                        tokio::select! {
                            () = token.cancelled() => break,
                            result = tx.send(message) => {
                                if result.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                }
                Script::Gated { messages, release } => {
                    for message in messages {
                        tokio::select! {
                            () = token.cancelled() => return,
                            result = tx.send(message) => {
                                if result.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    tokio::select! {
                        () = token.cancelled() => {}
                        _ = release => {}
                    }
                }
                Script::BlockUntilCancelled => token.cancelled().await,
            }
            // tx drops here, closing the stream.
        }));

        Ok(TurnStream {
            interrupt,
            messages: rx,
        })
    }
}
