//! Topic-based event bus.
//!
//! Every operation emits a `Start` event followed by exactly one
//! `Success` or `Failed` event on the same thread. Emission is
//! fire-and-forget: subscribers run inline and are responsible for their
//! own error handling.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validator::Issue;

/// Lifecycle phase of an operation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPhase {
    Start,
    Success,
    Failed,
}

/// One emitted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Topic, e.g. `document:create` or `subscription:register`.
    pub event_type: String,
    pub phase: EventPhase,
    pub timestamp_ms: u64,
    /// Operation name, e.g. `insert`.
    pub operation: String,
    pub collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<Issue>>,
    /// Populated on `Success` and `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Event {
    pub fn new(event_type: &str, phase: EventPhase, operation: &str, collection: &str) -> Self {
        Event {
            event_type: event_type.to_string(),
            phase,
            timestamp_ms: now_ms(),
            operation: operation.to_string(),
            collection: collection.to_string(),
            input: None,
            output: None,
            query: None,
            error: None,
            issues: None,
            duration_ms: None,
        }
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Callback invoked for each matching event.
pub type Subscriber = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle describing one registration; holds what is needed to cancel it.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: u64,
    pub label: String,
    pub event_type: String,
}

/// Many-subscriber topic bus keyed by event type string.
pub struct EventBus {
    topics: RwLock<HashMap<String, Vec<(u64, Subscriber)>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            topics: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber for one event type, returning its handle.
    pub fn subscribe(&self, event_type: &str, label: &str, subscriber: Subscriber) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut topics = self
            .topics
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        topics
            .entry(event_type.to_string())
            .or_default()
            .push((id, subscriber));
        Subscription {
            id,
            label: label.to_string(),
            event_type: event_type.to_string(),
        }
    }

    /// Remove a subscriber; returns whether it was present.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut topics = self
            .topics
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(subscribers) = topics.get_mut(&subscription.event_type) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|(id, _)| *id != subscription.id);
        before != subscribers.len()
    }

    /// Deliver an event to every subscriber of its type, in registration
    /// order, on the calling thread.
    pub fn emit(&self, event: &Event) {
        let topics = self
            .topics
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(subscribers) = topics.get(&event.event_type) {
            for (_, subscriber) in subscribers {
                subscriber(event);
            }
        }
    }

    pub fn subscriber_count(&self, event_type: &str) -> usize {
        let topics = self
            .topics
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        topics.get(event_type).map(Vec::len).unwrap_or(0)
    }
}
