//! Ports for the Job Queue subsystem.

pub mod inbound;
pub mod outbound;
