//! Background tasks the runtime runs beside the worker pool.

pub mod event_monitor;
pub mod reconcile;
pub mod stats;

pub use event_monitor::EventMonitor;
pub use reconcile::ReconcileScheduler;
pub use stats::StatsSampler;
