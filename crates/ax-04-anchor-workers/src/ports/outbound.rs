//! Driven Ports (SPI - Outbound Dependencies)
//!
//! The two systems outside the anchoring core that workers write to.

use crate::error::EntityStoreError;
use async_trait::async_trait;
use shared_types::{EntityRef, FilePayload, LedgerError, LedgerReceipt, TopicRef};

/// Client for the external ledger network.
///
/// Both calls spend money. Failures carry a `LedgerErrorCode` whose class
/// decides between retry and dead-letter.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a message to a consensus topic.
    async fn submit_message(
        &self,
        topic: &TopicRef,
        message: &[u8],
    ) -> Result<LedgerReceipt, LedgerError>;

    /// Store a file. `ledger_id` of the receipt is the file id.
    async fn upload_file(&self, file: &FilePayload) -> Result<LedgerReceipt, LedgerError>;
}

/// The domain records that hold a ledger reference field.
///
/// This is the only write the anchoring core makes outside its own stores.
#[async_trait]
pub trait DomainEntityStore: Send + Sync {
    async fn set_ledger_reference(
        &self,
        owner: EntityRef,
        ledger_id: &str,
    ) -> Result<(), EntityStoreError>;

    async fn get_ledger_reference(&self, owner: EntityRef)
        -> Result<Option<String>, EntityStoreError>;
}
