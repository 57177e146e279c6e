//! In-memory trial store backed by DashMap. All data is lost on process exit.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::{NewTrial, TrialRecord, TrialStore};
use crate::ledger::LedgerResult;

/// Concurrent in-memory trial store keyed by record id.
#[derive(Debug)]
pub struct MemTrialStore {
    records: DashMap<u64, TrialRecord>,
    next_id: AtomicU64,
}

impl MemTrialStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MemTrialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TrialStore for MemTrialStore {
    fn append(&self, trial: NewTrial, created_at: u64) -> LedgerResult<TrialRecord> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = trial.into_record(id, created_at);
        self.records.insert(id, record.clone());
        Ok(record)
    }

    fn since(&self, since: u64) -> LedgerResult<Vec<TrialRecord>> {
        let mut out: Vec<_> = self
            .records
            .iter()
            .filter(|entry| entry.created_at >= since)
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(|r| r.id);
        Ok(out)
    }
}
