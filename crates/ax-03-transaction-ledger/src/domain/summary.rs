//! Cost accounting over the audit log.

use shared_types::{RecordStatus, TransactionRecord};

/// Aggregate spend and outcome counts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CostSummary {
    /// Total cost in tinybars.
    pub total_cost: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Successes served from the result cache.
    pub reused: u64,
}

impl CostSummary {
    pub fn add(&mut self, record: &TransactionRecord) {
        self.total_cost = self.total_cost.saturating_add(record.cost);
        match record.status {
            RecordStatus::Success => self.succeeded += 1,
            RecordStatus::Failed => self.failed += 1,
        }
        if record.metadata.get("cache_hit").and_then(|v| v.as_bool()) == Some(true) {
            self.reused += 1;
        }
    }
}

impl<'a> FromIterator<&'a TransactionRecord> for CostSummary {
    fn from_iter<I: IntoIterator<Item = &'a TransactionRecord>>(iter: I) -> Self {
        let mut summary = Self::default();
        for record in iter {
            summary.add(record);
        }
        summary
    }
}
