use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

pub type ConnectionId = u64;

#[derive(Debug, Error)]
#[error("delivery to connection {id} failed: {reason}")]
pub struct DeliveryError {
    pub id: ConnectionId,
    pub reason: String,
}

/// A consumer that broadcast messages are pushed to (e.g. a WebSocket client).
#[async_trait]
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;
    async fn send(&self, message: &Value) -> Result<(), DeliveryError>;
}

struct Entry<C> {
    conn: Arc<C>,
    topics: HashSet<String>,
}

/// Registry of live connections and the topics each one subscribed to.
///
/// Delivery is best effort: only connections subscribed at broadcast time
/// receive a message, there is no backlog, and a failed send is logged
/// without affecting the other recipients.
pub struct SubscriptionManager<C: Connection> {
    entries: Mutex<HashMap<ConnectionId, Entry<C>>>,
}

impl<C: Connection> Default for SubscriptionManager<C> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<C: Connection> SubscriptionManager<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection for `broadcast_all` before it has any topics.
    pub async fn register(&self, conn: Arc<C>) {
        let mut entries = self.entries.lock().await;
        entries.entry(conn.id()).or_insert_with(|| Entry {
            conn,
            topics: HashSet::new(),
        });
    }

    pub async fn subscribe(&self, conn: Arc<C>, topic: &str) {
        let id = conn.id();
        let mut entries = self.entries.lock().await;
        entries
            .entry(id)
            .or_insert_with(|| Entry {
                conn,
                topics: HashSet::new(),
            })
            .topics
            .insert(topic.to_string());
        log::info!("connection {} subscribed to topic {}", id, topic);
    }

    pub async fn unsubscribe(&self, id: ConnectionId, topic: &str) {
        if let Some(entry) = self.entries.lock().await.get_mut(&id) {
            entry.topics.remove(topic);
        }
    }

    pub async fn remove_connection(&self, id: ConnectionId) {
        self.entries.lock().await.remove(&id);
    }

    pub async fn connection_count(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn subscribers(&self, topic: &str) -> usize {
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| e.topics.contains(topic))
            .count()
    }

    /// Send `message` to every connection subscribed to `topic`.
    /// Returns how many deliveries succeeded.
    pub async fn broadcast_to_topic(&self, topic: &str, message: &Value) -> usize {
        let targets: Vec<Arc<C>> = self
            .entries
            .lock()
            .await
            .values()
            .filter(|e| e.topics.contains(topic))
            .map(|e| e.conn.clone())
            .collect();
        deliver(&targets, message).await
    }

    /// Send `message` to every registered connection regardless of topics.
    pub async fn broadcast_all(&self, message: &Value) -> usize {
        let targets: Vec<Arc<C>> = self
            .entries
            .lock()
            .await
            .values()
            .map(|e| e.conn.clone())
            .collect();
        deliver(&targets, message).await
    }
}

async fn deliver<C: Connection>(targets: &[Arc<C>], message: &Value) -> usize {
    let mut delivered = 0;
    for conn in targets {
        match conn.send(message).await {
            Ok(()) => delivered += 1,
            Err(e) => log::error!("broadcast error: {}", e),
        }
    }
    delivered
}
