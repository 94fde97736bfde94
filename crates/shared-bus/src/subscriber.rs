//! # Subscriptions
//!
//! A subscription filters the broadcast stream down to the topics it asked
//! for and counts the events it lost to lag.

use crate::events::{AnchorEvent, EventFilter};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Event bus closed")]
    Closed,
}

pub struct Subscription {
    receiver: broadcast::Receiver<AnchorEvent>,
    filter: EventFilter,
    lagged: u64,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<AnchorEvent>, filter: EventFilter) -> Self {
        Self {
            receiver,
            filter,
            lagged: 0,
        }
    }

    /// Next matching event. `None` once the bus is dropped and the buffer
    /// is drained.
    pub async fn recv(&mut self) -> Option<AnchorEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event if one is already buffered.
    pub fn try_recv(&mut self) -> Result<Option<AnchorEvent>, SubscriptionError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Ok(Some(event)),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Closed) => return Err(SubscriptionError::Closed),
            }
        }
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Events skipped because this subscriber fell behind.
    #[must_use]
    pub fn lagged(&self) -> u64 {
        self.lagged
    }

    fn record_lag(&mut self, skipped: u64) {
        self.lagged += skipped;
        warn!(skipped, total = self.lagged, "[bus] Subscriber lagged, events skipped");
    }
}
