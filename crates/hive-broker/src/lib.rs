//! Broker boundary for agent-to-agent and external assignment traffic.
//!
//! The rest of the system talks to the broker through the [`Broker`]
//! trait, so production code runs against NATS ([`NatsBroker`]) while
//! tests run against the in-memory [`MemoryBroker`], which also records
//! every publish for inspection.
//!
//! Payloads are raw UTF-8 text — the assignment or message content —
//! not structured envelopes.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Broker failures, surfaced loudly to the immediate caller.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Could not establish the broker connection.
    #[error("broker connect failed: {0}")]
    Connect(String),

    /// A publish was rejected or the connection was lost mid-publish.
    #[error("publish to '{topic}' failed: {reason}")]
    Publish {
        /// Target topic.
        topic: String,
        /// Underlying failure description.
        reason: String,
    },

    /// A subscription could not be established.
    #[error("subscribe to '{topic}' failed: {reason}")]
    Subscribe {
        /// Target topic.
        topic: String,
        /// Underlying failure description.
        reason: String,
    },
}

/// Reliable publish/subscribe with at-least-once, in-order delivery
/// per topic.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish a payload to a topic.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError>;

    /// Subscribe to a topic. Messages arrive on the returned channel
    /// in publish order until the broker connection closes.
    async fn subscribe(&self, topic: &str)
    -> Result<mpsc::UnboundedReceiver<Bytes>, BrokerError>;

    /// Flush in-flight publishes. Called on graceful shutdown so
    /// nothing is lost.
    async fn flush(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// Production broker backed by an injected NATS client.
///
/// The client is constructed once by the composition root and shared
/// across all agents and topics — no hidden module state.
pub struct NatsBroker {
    client: async_nats::Client,
}

impl NatsBroker {
    /// Wrap an already-connected NATS client.
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    /// Connect to a NATS server by URL.
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        debug!(url, "connected to NATS");
        Ok(Self { client })
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError> {
        self.client
            .publish(topic.to_string(), payload)
            .await
            .map_err(|e| BrokerError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<mpsc::UnboundedReceiver<Bytes>, BrokerError> {
        let mut subscriber =
            self.client
                .subscribe(topic.to_string())
                .await
                .map_err(|e| BrokerError::Subscribe {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })?;
        let (tx, rx) = mpsc::unbounded_channel();
        let topic = topic.to_string();
        drop(tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                if tx.send(message.payload).is_err() {
                    // Receiver dropped — unsubscribe by falling out.
                    break;
                }
            }
            debug!(topic, "subscription closed");
        }));
        Ok(rx)
    }

    async fn flush(&self) -> Result<(), BrokerError> {
        self.client.flush().await.map_err(|e| BrokerError::Publish {
            topic: String::new(),
            reason: e.to_string(),
        })
    }
}

/// A message recorded by [`MemoryBroker`].
#[derive(Clone, Debug)]
pub struct PublishedMessage {
    /// Target topic.
    pub topic: String,
    /// Raw payload.
    pub payload: Bytes,
}

/// In-memory broker for tests and local development.
///
/// Delivers to live subscribers in publish order and records every
/// publish so tests can assert on what crossed the boundary.
#[derive(Default)]
pub struct MemoryBroker {
    published: Mutex<Vec<PublishedMessage>>,
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Bytes>>>>,
}

impl MemoryBroker {
    /// Create an empty in-memory broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded publishes, in order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    /// Recorded publishes for one topic.
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Number of recorded publishes.
    pub fn publish_count(&self) -> usize {
        self.published.lock().len()
    }

    /// Whether anything was published to a topic.
    pub fn was_published_to(&self, topic: &str) -> bool {
        self.published.lock().iter().any(|m| m.topic == topic)
    }

    /// Topics with at least one live subscriber.
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.subscribers.lock().keys().cloned().collect()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError> {
        self.published.lock().push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.clone(),
        });
        let mut subscribers = self.subscribers.lock();
        if let Some(senders) = subscribers.get_mut(topic) {
            senders.retain(|tx| {
                if tx.send(payload.clone()).is_err() {
                    warn!(topic, "dropping closed in-memory subscriber");
                    false
                } else {
                    true
                }
            });
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<mpsc::UnboundedReceiver<Bytes>, BrokerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_records_message() {
        let broker = MemoryBroker::new();
        broker
            .publish("hive.agent.worker-0", Bytes::from("do X"))
            .await
            .unwrap();

        assert_eq!(broker.publish_count(), 1);
        assert!(broker.was_published_to("hive.agent.worker-0"));
        assert!(!broker.was_published_to("hive.agent.worker-1"));
    }

    #[tokio::test]
    async fn subscriber_receives_in_publish_order() {
        let broker = MemoryBroker::new();
        let mut rx = broker.subscribe("t").await.unwrap();

        broker.publish("t", Bytes::from("one")).await.unwrap();
        broker.publish("t", Bytes::from("two")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), Bytes::from("one"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from("two"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let broker = MemoryBroker::new();
        broker.publish("nobody", Bytes::from("x")).await.unwrap();
        assert_eq!(broker.publish_count(), 1);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let broker = MemoryBroker::new();
        let mut rx_a = broker.subscribe("a").await.unwrap();
        let mut rx_b = broker.subscribe("b").await.unwrap();

        broker.publish("a", Bytes::from("for a")).await.unwrap();

        assert_eq!(rx_a.recv().await.unwrap(), Bytes::from("for a"));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn fan_out_to_multiple_subscribers() {
        let broker = MemoryBroker::new();
        let mut rx1 = broker.subscribe("t").await.unwrap();
        let mut rx2 = broker.subscribe("t").await.unwrap();

        broker.publish("t", Bytes::from("x")).await.unwrap();

        assert_eq!(rx1.recv().await.unwrap(), Bytes::from("x"));
        assert_eq!(rx2.recv().await.unwrap(), Bytes::from("x"));
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned() {
        let broker = MemoryBroker::new();
        let rx = broker.subscribe("t").await.unwrap();
        drop(rx);

        broker.publish("t", Bytes::from("x")).await.unwrap();
        broker.publish("t", Bytes::from("y")).await.unwrap();

        // Both publishes still recorded; no panic on the dead channel.
        assert_eq!(broker.publish_count(), 2);
    }

    #[tokio::test]
    async fn published_to_filters_by_topic() {
        let broker = MemoryBroker::new();
        broker.publish("a", Bytes::from("1")).await.unwrap();
        broker.publish("b", Bytes::from("2")).await.unwrap();
        broker.publish("a", Bytes::from("3")).await.unwrap();

        let for_a = broker.published_to("a");
        assert_eq!(for_a.len(), 2);
        assert_eq!(for_a[1].payload, Bytes::from("3"));
    }

    #[tokio::test]
    async fn flush_default_is_noop() {
        let broker = MemoryBroker::new();
        broker.flush().await.unwrap();
    }
}
