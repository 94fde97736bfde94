//! Key layout and cost accounting.

pub mod keys;
pub mod summary;

pub use summary::CostSummary;
