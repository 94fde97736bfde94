//! Queue adapters.

pub mod persistence;

pub use persistence::JobStore;
