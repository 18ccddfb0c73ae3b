//! Subscriber registry and event fan-out.
//!
//! All subscribers of a volume share one broadcast channel. An event is
//! JSON-encoded once and fanned out as a shared allocation; each
//! subscriber owns an independent receiver buffering up to `capacity`
//! messages, after which a lagging receiver starts dropping (backpressure
//! is the receiver's problem, not the actor's).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::protocol::ServerEvent;

/// Identity of one registered sink.
pub type SubscriberId = Uuid;

/// Fan-out statistics.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub events_sent: u64,
    pub active_subscribers: usize,
}

/// Set of message sinks for one volume.
pub struct SubscriberRegistry {
    /// Broadcast channel sender; receivers are handed to subscribers.
    sender: broadcast::Sender<Arc<String>>,
    /// Registered subscriber ids.
    subscribers: RwLock<HashMap<SubscriberId, ()>>,
    /// Channel capacity per receiver.
    capacity: usize,
    /// Lock-free send counter.
    events_sent: AtomicU64,
}

impl SubscriberRegistry {
    /// Create a registry whose receivers buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscribers: RwLock::new(HashMap::new()),
            capacity,
            events_sent: AtomicU64::new(0),
        }
    }

    /// Register a new sink; returns its id and event receiver.
    pub async fn subscribe(&self) -> (SubscriberId, broadcast::Receiver<Arc<String>>) {
        let id = Uuid::new_v4();
        self.subscribers.write().await.insert(id, ());
        (id, self.sender.subscribe())
    }

    /// Remove a sink on disconnect.
    pub async fn unsubscribe(&self, id: &SubscriberId) -> bool {
        self.subscribers.write().await.remove(id).is_some()
    }

    /// Fan an event out to every live receiver.
    ///
    /// The event is serialised once; returns the number of receivers it
    /// reached (zero when nobody is listening).
    pub fn broadcast(&self, event: &ServerEvent) -> usize {
        let encoded = Arc::new(event.encode());
        let reached = self.sender.send(encoded).unwrap_or(0);
        self.events_sent.fetch_add(1, Ordering::Relaxed);
        reached
    }

    /// Current number of registered sinks.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Channel capacity per receiver.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of fan-out counters.
    pub async fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            events_sent: self.events_sent.load(Ordering::Relaxed),
            active_subscribers: self.subscribers.read().await.len(),
        }
    }
}
