//! In-memory domain entity store.
//!
//! Holds the ledger reference field of each owning entity. Used by tests
//! and by the runtime when no domain database is attached.

use crate::error::EntityStoreError;
use crate::ports::outbound::DomainEntityStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::EntityRef;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct InMemoryEntityStore {
    references: RwLock<HashMap<EntityRef, String>>,
    failing: AtomicBool,
    writes: AtomicUsize,
    latency_ms: AtomicU64,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `Unavailable` until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every write by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    pub fn reference(&self, owner: &EntityRef) -> Option<String> {
        self.references.read().get(owner).cloned()
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), EntityStoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EntityStoreError::Unavailable(
                "entity store offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DomainEntityStore for InMemoryEntityStore {
    async fn set_ledger_reference(
        &self,
        owner: EntityRef,
        ledger_id: &str,
    ) -> Result<(), EntityStoreError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.check()?;
        self.references.write().insert(owner, ledger_id.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_ledger_reference(
        &self,
        owner: EntityRef,
    ) -> Result<Option<String>, EntityStoreError> {
        self.check()?;
        Ok(self.references.read().get(&owner).cloned())
    }
}
