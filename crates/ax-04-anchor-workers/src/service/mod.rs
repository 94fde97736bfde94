//! Worker services: job processing, pool lifecycle, producer façade and
//! reconciliation.

pub mod client;
pub mod handlers;
pub mod pool;
pub mod processor;
pub mod reconciler;

#[cfg(test)]
mod tests;

pub use client::QueueClient;
pub use handlers::{ConsensusSubmitHandler, FileStoreHandler};
pub use pool::WorkerPool;
pub use processor::{AnchorDependencies, JobProcessor};
pub use reconciler::Reconciler;
