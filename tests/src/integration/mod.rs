//! Cross-crate tests over a fully wired pipeline.

pub mod audit;
pub mod delivery;
pub mod recovery;
pub mod scenarios;
