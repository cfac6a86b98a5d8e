//! RealtimeHub - WebSocket Distribution
//!
//! ## Responsibilities
//!
//! - WebSocket subscriber registry
//! - Push every newly persisted event to all live subscribers
//!
//! Each subscriber owns an unbounded channel, so broadcasting never waits
//! on a slow socket. Subscribers whose channel is closed are pruned.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::event_store::EventRecord;

/// Hub message types
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HubMessage {
    /// Greeting sent once per subscriber
    Connected { message: String },
    /// A stored event
    NewEvent { data: EventRecord },
}

impl HubMessage {
    pub fn connected() -> Self {
        HubMessage::Connected {
            message: "WebSocket connected".to_string(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            HubMessage::Connected { .. } => "connected",
            HubMessage::NewEvent { .. } => "newEvent",
        }
    }
}

/// Live push capability used by the dispatch orchestrator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LiveNotifier: Send + Sync {
    /// Push a stored event to every subscriber; never fails
    async fn broadcast_event(&self, record: &EventRecord);
}

/// RealtimeHub instance
pub struct RealtimeHub {
    connections: RwLock<HashMap<Uuid, mpsc::UnboundedSender<String>>>,
    connection_count: AtomicU64,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
        }
    }

    /// Register a new subscriber; the greeting is already queued on the receiver
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        if let Ok(json) = serde_json::to_string(&HubMessage::connected()) {
            let _ = tx.send(json);
        }

        self.connections.write().await.insert(id, tx);
        self.connection_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(connection_id = %id, "WebSocket client connected");

        (id, rx)
    }

    /// Unregister a subscriber
    pub async fn unregister(&self, id: &Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(id).is_some() {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(connection_id = %id, "WebSocket client disconnected");
        }
    }

    /// Broadcast message to all subscribers
    pub async fn broadcast(&self, message: HubMessage) {
        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                return;
            }
        };

        let mut closed = Vec::new();
        {
            let connections = self.connections.read().await;
            tracing::debug!(
                message_type = message.kind(),
                client_count = connections.len(),
                "Broadcasting message to clients"
            );

            for (id, tx) in connections.iter() {
                if tx.send(json.clone()).is_err() {
                    closed.push(*id);
                }
            }
        }

        for id in closed {
            self.unregister(&id).await;
        }
    }

    /// Get connection count
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LiveNotifier for RealtimeHub {
    async fn broadcast_event(&self, record: &EventRecord) {
        self.broadcast(HubMessage::NewEvent {
            data: record.clone(),
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64) -> EventRecord {
        EventRecord {
            id,
            etype: "IN".to_string(),
            trdesc: "Access Granted IN".to_string(),
            staffname: "Jane Doe".to_string(),
            staffno: "E001".to_string(),
            cardno: Some("12345".to_string()),
            devname: "Main Door".to_string(),
            trdate: "2024-01-15".to_string(),
            trtime: "09:30:00".to_string(),
            timestamp: 1_705_311_000_000,
            raw_xml: None,
            snapshot_path: None,
            stream_url: None,
        }
    }

    #[test]
    fn test_message_shapes() {
        let connected: serde_json::Value =
            serde_json::to_value(HubMessage::connected()).unwrap();
        assert_eq!(connected["type"], "connected");
        assert_eq!(connected["message"], "WebSocket connected");

        let new_event: serde_json::Value =
            serde_json::to_value(HubMessage::NewEvent { data: record(5) }).unwrap();
        assert_eq!(new_event["type"], "newEvent");
        assert_eq!(new_event["data"]["id"], 5);
        assert_eq!(new_event["data"]["devname"], "Main Door");
    }

    #[tokio::test]
    async fn test_register_queues_greeting() {
        let hub = RealtimeHub::new();
        let (_, mut rx) = hub.register().await;
        let greeting = rx.recv().await.unwrap();
        assert!(greeting.contains("\"type\":\"connected\""));
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let hub = RealtimeHub::new();
        let (_, mut a) = hub.register().await;
        let (_, mut b) = hub.register().await;
        a.recv().await.unwrap();
        b.recv().await.unwrap();

        hub.broadcast_event(&record(1)).await;

        for rx in [&mut a, &mut b] {
            let msg: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(msg["type"], "newEvent");
            assert_eq!(msg["data"]["id"], 1);
        }
    }

    #[tokio::test]
    async fn test_closed_subscribers_are_pruned() {
        let hub = RealtimeHub::new();
        let (_, rx) = hub.register().await;
        let (_, mut alive) = hub.register().await;
        drop(rx);

        hub.broadcast_event(&record(2)).await;
        assert_eq!(hub.connection_count(), 1);

        alive.recv().await.unwrap();
        assert!(alive.recv().await.unwrap().contains("newEvent"));
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_noop() {
        let hub = RealtimeHub::new();
        hub.broadcast_event(&record(3)).await;
        assert_eq!(hub.connection_count(), 0);
    }
}
