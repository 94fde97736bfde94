//! # Event Publisher
//!
//! Fan-out side of the bus. Publishing never waits on subscribers.

use crate::events::{AnchorEvent, EventFilter};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::trace;

/// Sink for lifecycle events.
///
/// Workers and the producer client hold this as `Arc<dyn EventPublisher>`.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one event. Returns how many subscribers were handed it.
    async fn publish(&self, event: AnchorEvent) -> usize;

    /// Events published since creation, delivered or not.
    fn events_published(&self) -> u64;
}

/// Broadcast-channel bus.
///
/// A subscriber that falls more than `capacity` events behind skips the
/// oldest ones.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<AnchorEvent>,
    published: AtomicU64,
    undelivered: AtomicU64,
    capacity: usize,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: AtomicU64::new(0),
            undelivered: AtomicU64::new(0),
            capacity,
        }
    }

    /// New subscription seeing every event published from now on that
    /// passes `filter`.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        trace!(topics = ?filter.topics, "[bus] Subscribed");
        Subscription::new(self.sender.subscribe(), filter)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Events published while nobody was subscribed.
    #[must_use]
    pub fn undelivered(&self) -> u64 {
        self.undelivered.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: AnchorEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let topic = event.topic();
        match self.sender.send(event) {
            Ok(receivers) => {
                trace!(?topic, receivers, "[bus] Event published");
                receivers
            }
            Err(_) => {
                self.undelivered.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
