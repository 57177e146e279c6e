//! In-memory report store backed by DashMap.
//!
//! Records are grouped per `(subject, marker)` pair; the DashMap entry lock
//! serializes operations on one pair. All data is lost on process exit.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::{LedgerResult, NewReport, ReportRecord, ReportStore, Tally};
use crate::marker::{MarkerKey, ParticipantId};

/// Concurrent in-memory report store.
#[derive(Debug)]
pub struct MemReportStore {
    pairs: DashMap<(ParticipantId, MarkerKey), Vec<ReportRecord>>,
    next_id: AtomicU64,
}

impl MemReportStore {
    pub fn new() -> Self {
        Self {
            pairs: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Total number of records, active or expired.
    pub fn len(&self) -> usize {
        self.pairs.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for MemReportStore {
    fn default() -> Self {
        Self::new()
    }
}

fn active(records: &[ReportRecord]) -> u32 {
    records.iter().filter(|r| !r.expired).count() as u32
}

fn expire(records: &mut [ReportRecord]) -> u32 {
    let mut expired = 0;
    for record in records.iter_mut().filter(|r| !r.expired) {
        record.expired = true;
        expired += 1;
    }
    expired
}

impl ReportStore for MemReportStore {
    fn append(&self, report: NewReport, created_at: u64) -> LedgerResult<ReportRecord> {
        let mut entry = self.pairs.entry((report.subject, report.marker)).or_default();
        let record = report.into_record(self.allocate_id(), created_at);
        entry.push(record.clone());
        Ok(record)
    }

    fn count_active(&self, subject: ParticipantId, marker: MarkerKey) -> LedgerResult<u32> {
        Ok(self
            .pairs
            .get(&(subject, marker))
            .map(|records| active(&records))
            .unwrap_or(0))
    }

    fn expire_all(&self, subject: ParticipantId, marker: MarkerKey) -> LedgerResult<u32> {
        Ok(self
            .pairs
            .get_mut(&(subject, marker))
            .map(|mut records| expire(&mut records))
            .unwrap_or(0))
    }

    fn append_and_evaluate(
        &self,
        report: NewReport,
        created_at: u64,
        threshold: u32,
    ) -> LedgerResult<Tally> {
        let mut entry = self.pairs.entry((report.subject, report.marker)).or_default();
        let mut record = report.into_record(self.allocate_id(), created_at);
        entry.push(record.clone());

        let observed = active(&entry);
        let tripped = observed >= threshold;
        if tripped {
            expire(&mut entry);
            record.expired = true;
        }
        Ok(Tally {
            record,
            observed,
            tripped,
        })
    }

    fn history(&self, subject: ParticipantId) -> LedgerResult<Vec<ReportRecord>> {
        let mut records: Vec<ReportRecord> = self
            .pairs
            .iter()
            .filter(|entry| entry.key().0 == subject)
            .flat_map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }
}
