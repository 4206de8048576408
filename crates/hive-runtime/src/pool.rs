//! The fixed agent pool.
//!
//! Owns the four agents' runtime state (status, session id, pending
//! interrupt), subscribes each agent to its broker topic, and drives
//! one turn at a time per agent. Every translated event fans out to
//! all subscribers tagged with its agent id.
//!
//! A message arriving while its agent is busy is queued in an
//! unbounded per-agent FIFO and drained strictly one turn at a time,
//! so at-most-one turn per agent holds by construction and nothing is
//! dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use metrics::gauge;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use hive_broker::{Broker, BrokerError};
use hive_core::metrics::AGENT_TURNS_ACTIVE;
use hive_core::{AgentEvent, AgentId, PoolState, Status, WorkerState};

use crate::runtime::{AgentConfig, AgentRuntime};
use crate::turn::TurnRunner;

/// Broadcast channel capacity for pool events.
const EVENT_CAPACITY: usize = 1024;

/// Pool-level failures.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Construction was given no config for one of the fixed agents.
    #[error("no config for agent {0}")]
    MissingConfig(AgentId),

    /// The pool has shut down and accepts no more messages.
    #[error("agent pool is shut down")]
    ShutDown,

    /// The broker rejected a subscription at pool start.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// One event, tagged with its producing agent.
#[derive(Clone, Debug)]
pub struct PoolEvent {
    /// Producing agent.
    pub agent_id: AgentId,
    /// The event.
    pub event: AgentEvent,
}

/// Mutable per-agent state, owned exclusively by the pool.
struct WorkerSlot {
    status: Status,
    session_id: Option<String>,
    /// Live cancel handle for the in-flight turn, if any.
    interrupt: Option<CancellationToken>,
}

impl WorkerSlot {
    fn new() -> Self {
        Self {
            status: Status::Idle,
            session_id: None,
            interrupt: None,
        }
    }
}

/// Coordinator for the fixed set of agents.
pub struct AgentPool {
    runtime: Arc<dyn AgentRuntime>,
    broker: Arc<dyn Broker>,
    slots: Mutex<HashMap<AgentId, WorkerSlot>>,
    running: AtomicBool,
    events: broadcast::Sender<PoolEvent>,
    queues: HashMap<AgentId, mpsc::UnboundedSender<String>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for AgentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPool")
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl AgentPool {
    /// Start the pool: subscribe every agent to its broker topic and
    /// spawn one drain task per agent.
    ///
    /// Fails loudly if a broker subscription cannot be established or
    /// an agent config is missing.
    pub async fn start(
        runtime: Arc<dyn AgentRuntime>,
        broker: Arc<dyn Broker>,
        configs: Vec<AgentConfig>,
    ) -> Result<Arc<Self>, PoolError> {
        let mut by_id: HashMap<AgentId, AgentConfig> =
            configs.into_iter().map(|c| (c.id, c)).collect();

        let mut queues = HashMap::new();
        let mut drains = Vec::new();
        for id in AgentId::ALL {
            let config = by_id.remove(&id).ok_or(PoolError::MissingConfig(id))?;
            let (tx, rx) = mpsc::unbounded_channel();
            let _ = queues.insert(id, tx);
            drains.push((config, rx));
        }

        // Subscribe before spawning anything so a broker failure
        // aborts construction cleanly.
        let mut subscriptions = Vec::new();
        for id in AgentId::ALL {
            subscriptions.push((id, broker.subscribe(&id.topic()).await?));
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let pool = Arc::new(Self {
            runtime,
            broker,
            slots: Mutex::new(AgentId::ALL.into_iter().map(|id| (id, WorkerSlot::new())).collect()),
            running: AtomicBool::new(false),
            events,
            queues,
            shutdown: CancellationToken::new(),
        });

        for (config, rx) in drains {
            drop(tokio::spawn(Arc::clone(&pool).agent_loop(config, rx)));
        }
        for (id, sub) in subscriptions {
            drop(tokio::spawn(Arc::clone(&pool).topic_loop(id, sub)));
        }

        info!(agents = AgentId::COUNT, "agent pool started");
        Ok(pool)
    }

    /// Point-in-time pool snapshot.
    pub fn get_pool(&self) -> PoolState {
        let slots = self.slots.lock();
        let agents = AgentId::ALL
            .into_iter()
            .map(|id| {
                let slot = &slots[&id];
                WorkerState {
                    id,
                    role: id.role(),
                    status: slot.status,
                    session_id: slot.session_id.clone(),
                }
            })
            .collect();
        PoolState {
            running: self.running.load(Ordering::Relaxed),
            agents,
        }
    }

    /// Subscribe to every agent's events in fan-out fashion.
    ///
    /// Dropping the receiver unregisters the listener. Events for one
    /// agent arrive in the exact order its turn produced them.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    /// Number of live event subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Inject a message into an agent, exactly as if it had arrived on
    /// the agent's broker topic.
    ///
    /// Broadcasts a synthetic `inject` event first so viewers can
    /// render the outgoing text without waiting for the turn to begin.
    #[instrument(skip(self, text), fields(agent_id = %agent_id))]
    pub fn inject_message(&self, agent_id: AgentId, text: String) -> Result<(), PoolError> {
        let _ = self.events.send(PoolEvent {
            agent_id,
            event: AgentEvent::Inject { text: text.clone() },
        });
        match self.queues.get(&agent_id) {
            Some(tx) if tx.send(text).is_ok() => Ok(()),
            _ => Err(PoolError::ShutDown),
        }
    }

    /// Interrupt the agent's in-flight turn. A no-op for an idle agent.
    ///
    /// Returns whether a live turn was cancelled.
    #[instrument(skip(self), fields(agent_id = %agent_id))]
    pub fn interrupt(&self, agent_id: AgentId) -> bool {
        let token = {
            let slots = self.slots.lock();
            slots.get(&agent_id).and_then(|s| s.interrupt.clone())
        };
        match token {
            Some(token) => {
                warn!(agent_id = %agent_id, "interrupt requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Set the pool-wide running flag surfaced in snapshots. Purely a
    /// status flag — does not start or stop agents.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    /// Current value of the running flag.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Graceful shutdown: stop queue draining and cancel any in-flight
    /// turns.
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        info!("agent pool shutdown initiated");
        self.shutdown.cancel();
        let slots = self.slots.lock();
        for slot in slots.values() {
            if let Some(token) = &slot.interrupt {
                token.cancel();
            }
        }
    }

    /// Forward broker messages for one agent into its FIFO queue.
    async fn topic_loop(self: Arc<Self>, agent_id: AgentId, mut sub: mpsc::UnboundedReceiver<Bytes>) {
        loop {
            let payload = tokio::select! {
                () = self.shutdown.cancelled() => break,
                msg = sub.recv() => match msg {
                    Some(p) => p,
                    None => break,
                },
            };
            let text = String::from_utf8_lossy(&payload).into_owned();
            debug!(agent_id = %agent_id, bytes = payload.len(), "assignment received");
            if let Some(tx) = self.queues.get(&agent_id) {
                if tx.send(text).is_err() {
                    break;
                }
            }
        }
        debug!(agent_id = %agent_id, "topic loop ended");
    }

    /// Drain one agent's queue, strictly one turn at a time.
    async fn agent_loop(
        self: Arc<Self>,
        config: AgentConfig,
        mut queue: mpsc::UnboundedReceiver<String>,
    ) {
        loop {
            let prompt = tokio::select! {
                () = self.shutdown.cancelled() => break,
                msg = queue.recv() => match msg {
                    Some(p) => p,
                    None => break,
                },
            };
            self.run_one_turn(&config, prompt).await;
        }
        debug!(agent_id = %config.id, "agent loop ended");
    }

    async fn run_one_turn(&self, config: &AgentConfig, prompt: String) {
        let agent_id = config.id;
        let session_id = {
            let mut slots = self.slots.lock();
            let Some(slot) = slots.get_mut(&agent_id) else {
                return;
            };
            slot.status = Status::Busy;
            slot.session_id.clone()
        };
        gauge!(AGENT_TURNS_ACTIVE).increment(1.0);
        info!(agent_id = %agent_id, resumed = session_id.is_some(), "turn started");

        let runner = TurnRunner::new(self.runtime.as_ref(), self.broker.as_ref());
        let result = runner
            .run(
                config,
                session_id,
                prompt,
                |event| {
                    let _ = self.events.send(PoolEvent { agent_id, event });
                },
                |sid| {
                    if let Some(slot) = self.slots.lock().get_mut(&agent_id) {
                        slot.session_id = Some(sid);
                    }
                },
                |token| {
                    if let Some(slot) = self.slots.lock().get_mut(&agent_id) {
                        slot.interrupt = Some(token);
                    }
                },
            )
            .await;

        // Unconditional reset, success or failure.
        {
            let mut slots = self.slots.lock();
            if let Some(slot) = slots.get_mut(&agent_id) {
                slot.status = Status::Idle;
                slot.interrupt = None;
            }
        }
        gauge!(AGENT_TURNS_ACTIVE).decrement(1.0);

        match result {
            Ok(()) => debug!(agent_id = %agent_id, "turn completed"),
            Err(e) => {
                // Startup failure: the runner produced no events, so
                // close the turn out for viewers ourselves.
                warn!(agent_id = %agent_id, error = %e, "turn failed to start");
                let _ = self.events.send(PoolEvent {
                    agent_id,
                    event: AgentEvent::Error {
                        message: e.to_string(),
                    },
                });
                let _ = self.events.send(PoolEvent {
                    agent_id,
                    event: AgentEvent::TurnEnd,
                });
            }
        }
    }
}
