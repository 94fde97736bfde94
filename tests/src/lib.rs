//! # Ledger Anchor Test Suite
//!
//! ```text
//! tests/src/
//! ├── harness.rs        # Wired pipeline, auditing store, fixtures
//! └── integration/
//!     ├── scenarios.rs  # Single upload: success, transient, permanent failure
//!     ├── delivery.rs   # Exactly-once outcomes, dedup, bounded retries, rate window
//!     ├── recovery.rs   # Restart, abandoned leases, reconciliation
//!     └── audit.rs      # Append-only audit trail under random behaviour
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ax-tests
//! cargo test -p ax-tests integration::audit
//! cargo bench -p ax-tests
//! ```

pub mod harness;
pub mod integration;
