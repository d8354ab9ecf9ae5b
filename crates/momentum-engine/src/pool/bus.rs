//! In-process publish/subscribe bus between agents.
//!
//! Messages are addressed by agent id or the sentinel `all`. Delivery is
//! in send order, per pair and in aggregate, because every send goes
//! through one lock. Optional persistence appends newline-delimited JSON
//! records under a configured directory.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, Mutex};

use momentum_core::{AgentId, Event, EventKind};

use crate::config::BusConfig;
use crate::error::Result;

/// The broadcast address.
pub const BROADCAST_ADDRESS: &str = "all";

/// A message between agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Message id.
    pub id: String,
    /// Sending agent.
    pub from: AgentId,
    /// Recipient agent id, or `all`.
    pub to: String,
    /// Structured payload.
    pub body: serde_json::Value,
    /// When the bus accepted the message.
    pub timestamp: DateTime<Utc>,
}

/// History query options.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageFilter {
    /// Only messages after this instant.
    pub since: Option<DateTime<Utc>>,
    /// At most this many, newest kept.
    pub limit: Option<usize>,
    /// Exclude broadcast messages.
    pub direct_only: bool,
}

struct BusInner {
    history: Vec<AgentMessage>,
    subscribers: HashMap<String, mpsc::UnboundedSender<AgentMessage>>,
}

/// The agent message bus.
pub struct AgentBus {
    inner: Mutex<BusInner>,
    persist_dir: Option<PathBuf>,
    events: std::sync::Mutex<Option<broadcast::Sender<Event>>>,
}

impl AgentBus {
    /// Create a bus from configuration.
    #[must_use]
    pub fn new(config: &BusConfig) -> Self {
        Self {
            inner: Mutex::new(BusInner {
                history: Vec::new(),
                subscribers: HashMap::new(),
            }),
            persist_dir: config.persist_dir.clone(),
            events: std::sync::Mutex::new(None),
        }
    }

    /// Mirror bus traffic onto an engine event stream.
    pub fn attach_events(&self, sender: broadcast::Sender<Event>) {
        if let Ok(mut guard) = self.events.lock() {
            *guard = Some(sender);
        }
    }

    /// Subscribe to messages addressed to `agent_id` (and broadcasts).
    pub async fn subscribe(&self, agent_id: &AgentId) -> mpsc::UnboundedReceiver<AgentMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .await
            .subscribers
            .insert(agent_id.as_str().to_string(), tx);
        rx
    }

    /// Send a message to one agent.
    pub async fn send(
        &self,
        from: &AgentId,
        to: &str,
        body: serde_json::Value,
    ) -> Result<AgentMessage> {
        self.dispatch(from, to, body).await
    }

    /// Send a message to every agent.
    pub async fn broadcast(&self, from: &AgentId, body: serde_json::Value) -> Result<AgentMessage> {
        self.dispatch(from, BROADCAST_ADDRESS, body).await
    }

    async fn dispatch(
        &self,
        from: &AgentId,
        to: &str,
        body: serde_json::Value,
    ) -> Result<AgentMessage> {
        let message = AgentMessage {
            id: uuid::Uuid::new_v4().to_string(),
            from: from.clone(),
            to: to.to_string(),
            body,
            timestamp: Utc::now(),
        };

        {
            let mut inner = self.inner.lock().await;
            inner.history.push(message.clone());

            if to == BROADCAST_ADDRESS {
                inner.subscribers.retain(|subscriber, tx| {
                    subscriber == from.as_str() || tx.send(message.clone()).is_ok()
                });
            } else if let Some(tx) = inner.subscribers.get(to) {
                if tx.send(message.clone()).is_err() {
                    inner.subscribers.remove(to);
                }
            }
        }

        self.persist(&message)?;

        if let Ok(guard) = self.events.lock() {
            if let Some(events) = guard.as_ref() {
                let _ = events.send(
                    Event::new(EventKind::AgentMessage, format!("{from} -> {to}")).with_data(
                        serde_json::json!({
                            "from": message.from,
                            "to": message.to,
                            "id": message.id,
                        }),
                    ),
                );
            }
        }

        Ok(message)
    }

    fn persist(&self, message: &AgentMessage) -> Result<()> {
        let Some(dir) = &self.persist_dir else {
            return Ok(());
        };
        std::fs::create_dir_all(dir)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("messages.jsonl"))?;
        let line = serde_json::to_string(message)
            .map_err(|e| crate::error::Error::Store(format!("serialize message: {e}")))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Messages addressed to `agent_id`, including broadcasts unless the
    /// filter says otherwise.
    pub async fn messages_for(&self, agent_id: &AgentId, filter: MessageFilter) -> Vec<AgentMessage> {
        let inner = self.inner.lock().await;
        let mut matching: Vec<AgentMessage> = inner
            .history
            .iter()
            .filter(|m| {
                m.to == agent_id.as_str() || (!filter.direct_only && m.to == BROADCAST_ADDRESS)
            })
            .filter(|m| filter.since.map_or(true, |since| m.timestamp > since))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            let drop = matching.len().saturating_sub(limit);
            matching.drain(..drop);
        }
        matching
    }

    /// The most recent `limit` messages across all addresses.
    pub async fn history(&self, limit: usize) -> Vec<AgentMessage> {
        let inner = self.inner.lock().await;
        let start = inner.history.len().saturating_sub(limit);
        inner.history[start..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_direct_delivery_in_order() {
        let bus = AgentBus::new(&BusConfig::default());
        let alice = AgentId::new("alice");
        let bob = AgentId::new("bob");

        let mut inbox = bus.subscribe(&bob).await;
        bus.send(&alice, "bob", json!({"n": 1}))
            .await
            .unwrap_or_else(|e| panic!("send failed: {e}"));
        bus.send(&alice, "bob", json!({"n": 2}))
            .await
            .unwrap_or_else(|e| panic!("send failed: {e}"));

        let first = inbox.recv().await.map(|m| m.body["n"].clone());
        let second = inbox.recv().await.map(|m| m.body["n"].clone());
        assert_eq!(first, Some(json!(1)));
        assert_eq!(second, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let bus = AgentBus::new(&BusConfig::default());
        let alice = AgentId::new("alice");
        let bob = AgentId::new("bob");

        let mut alice_inbox = bus.subscribe(&alice).await;
        let mut bob_inbox = bus.subscribe(&bob).await;
        bus.broadcast(&alice, json!("hello"))
            .await
            .unwrap_or_else(|e| panic!("broadcast failed: {e}"));

        let received = bob_inbox.recv().await;
        assert!(received.is_some());
        assert!(alice_inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_history_and_filters() {
        let bus = AgentBus::new(&BusConfig::default());
        let alice = AgentId::new("alice");
        bus.send(&alice, "bob", json!(1))
            .await
            .unwrap_or_else(|e| panic!("send failed: {e}"));
        bus.broadcast(&alice, json!(2))
            .await
            .unwrap_or_else(|e| panic!("broadcast failed: {e}"));

        assert_eq!(bus.history(10).await.len(), 2);
        assert_eq!(bus.history(1).await.len(), 1);

        let bob = AgentId::new("bob");
        let all = bus.messages_for(&bob, MessageFilter::default()).await;
        assert_eq!(all.len(), 2);
        let direct = bus
            .messages_for(
                &bob,
                MessageFilter {
                    direct_only: true,
                    ..MessageFilter::default()
                },
            )
            .await;
        assert_eq!(direct.len(), 1);
    }

    #[tokio::test]
    async fn test_persistence_writes_jsonl() {
        let dir = std::env::temp_dir().join(format!("bus-test-{}", uuid::Uuid::new_v4()));
        let bus = AgentBus::new(&BusConfig {
            persist_dir: Some(dir.clone()),
        });
        let alice = AgentId::new("alice");
        bus.send(&alice, "bob", json!({"k": "v"}))
            .await
            .unwrap_or_else(|e| panic!("send failed: {e}"));

        let content = std::fs::read_to_string(dir.join("messages.jsonl"))
            .unwrap_or_else(|e| panic!("read failed: {e}"));
        assert_eq!(content.lines().count(), 1);
        let parsed: AgentMessage = serde_json::from_str(content.trim())
            .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(parsed.to, "bob");
        let _ = std::fs::remove_dir_all(dir);
    }
}
