//! # Shared Bus - Event Bus for Anchoring Notifications
//!
//! Broadcast bus carrying job lifecycle events between the anchoring
//! subsystems, telemetry and the runtime.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │   Workers    │                    │  Telemetry   │
//! │              │    publish()       │  Event log   │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! ## Delivery
//!
//! Best effort. The queue and the transaction ledger hold the durable
//! state; a lagging subscriber loses notifications, not jobs.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{subsystem, AnchorEvent, EventFilter, EventTopic};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
