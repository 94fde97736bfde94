//! Per-kind job handlers.
//!
//! Each handler owns one `AnchorPayload` variant. A payload of the wrong
//! variant is a malformed job and fails fatally.

use crate::ports::inbound::JobHandler;
use crate::ports::outbound::LedgerClient;
use async_trait::async_trait;
use shared_types::{
    AnchorJob, AnchorPayload, JobKind, LedgerError, LedgerErrorCode, LedgerReceipt,
};
use std::sync::Arc;

fn wrong_variant(expected: JobKind, job: &AnchorJob) -> LedgerError {
    LedgerError::new(
        LedgerErrorCode::MalformedPayload,
        format!(
            "{} handler received a {} payload",
            expected,
            job.payload().kind()
        ),
    )
}

/// Submits consensus messages.
pub struct ConsensusSubmitHandler {
    client: Arc<dyn LedgerClient>,
}

impl ConsensusSubmitHandler {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobHandler for ConsensusSubmitHandler {
    fn kind(&self) -> JobKind {
        JobKind::ConsensusSubmit
    }

    async fn execute(&self, job: &AnchorJob) -> Result<LedgerReceipt, LedgerError> {
        match job.payload() {
            AnchorPayload::ConsensusSubmit(payload) => {
                self.client
                    .submit_message(&payload.topic, &payload.message)
                    .await
            }
            AnchorPayload::FileStore(_) => Err(wrong_variant(self.kind(), job)),
        }
    }
}

/// Uploads files.
pub struct FileStoreHandler {
    client: Arc<dyn LedgerClient>,
}

impl FileStoreHandler {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobHandler for FileStoreHandler {
    fn kind(&self) -> JobKind {
        JobKind::FileStore
    }

    async fn execute(&self, job: &AnchorJob) -> Result<LedgerReceipt, LedgerError> {
        match job.payload() {
            AnchorPayload::FileStore(file) => self.client.upload_file(file).await,
            AnchorPayload::ConsensusSubmit(_) => Err(wrong_variant(self.kind(), job)),
        }
    }
}
