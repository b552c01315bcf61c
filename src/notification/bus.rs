//! The broadcast event source owned by the logger.
//!
//! Subscribers are called synchronously, in subscription order, on the
//! thread that emitted the event. A subscriber that blocks, blocks the log
//! call. Async consumers can additionally attach to a buffered tap via
//! [`EventBus::channel`].

use crate::core::BroadcastEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

const TAP_CAPACITY: usize = 64;

/// Receives broadcast events as they are published.
pub trait BroadcastSubscriber: Send + Sync {
    fn on_broadcast(&self, event: &BroadcastEvent);
}

impl<F> BroadcastSubscriber for F
where
    F: Fn(&BroadcastEvent) + Send + Sync,
{
    fn on_broadcast(&self, event: &BroadcastEvent) {
        self(event)
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscribers = Vec<(SubscriptionId, Arc<dyn BroadcastSubscriber>)>;

/// Single-writer, multi-reader publish/subscribe channel for broadcast events.
pub struct EventBus {
    subscribers: RwLock<Subscribers>,
    next_id: AtomicU64,
    tap: broadcast::Sender<BroadcastEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tap, _rx) = broadcast::channel(TAP_CAPACITY);
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            tap,
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn BroadcastSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, subscriber));
        debug!(subscription = id.0, "Broadcast subscriber added");
        id
    }

    /// Removes a subscriber. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        before != subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// A buffered receiver for async consumers. Slow receivers lag and lose
    /// events; synchronous subscribers are unaffected.
    pub fn channel(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tap.subscribe()
    }

    /// Delivers `event` to every subscriber, then to the async tap.
    pub fn publish(&self, event: &BroadcastEvent) {
        // Snapshot so subscribers may log (and so publish) re-entrantly.
        let subscribers: Vec<Arc<dyn BroadcastSubscriber>> = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, subscriber)| subscriber.clone())
            .collect();

        for subscriber in subscribers {
            subscriber.on_broadcast(event);
        }

        // No receivers is not an error.
        let _ = self.tap.send(event.clone());
    }
}
