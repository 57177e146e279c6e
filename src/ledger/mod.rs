//! Report ledger: append-only record of approved misconduct reports.
//!
//! Reports are kept per `(subject, marker)` pair. Each record carries an
//! `expired` flag that is set in bulk for the whole pair when a demotion is
//! triggered, so only active records count toward the next threshold.
//!
//! Two backends implement [`ReportStore`]:
//!
//! - [`MemReportStore`](mem::MemReportStore) keeps records in a DashMap
//! - [`DurableReportStore`](durable::DurableReportStore) keeps them in redb

pub mod durable;
pub mod mem;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::marker::{MarkerKey, ParticipantId};

/// Result type for ledger operations.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// One approved report, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: u64,
    pub reporter: ParticipantId,
    pub subject: ParticipantId,
    pub marker: MarkerKey,
    pub evidence_link: Option<String>,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
    pub expired: bool,
}

/// A report about to be recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReport {
    pub subject: ParticipantId,
    pub marker: MarkerKey,
    pub reporter: ParticipantId,
    pub evidence_link: Option<String>,
}

impl NewReport {
    pub fn new(subject: ParticipantId, marker: MarkerKey, reporter: ParticipantId) -> Self {
        Self {
            subject,
            marker,
            reporter,
            evidence_link: None,
        }
    }

    pub fn with_evidence(mut self, link: impl Into<String>) -> Self {
        self.evidence_link = Some(link.into());
        self
    }

    pub(crate) fn into_record(self, id: u64, created_at: u64) -> ReportRecord {
        ReportRecord {
            id,
            reporter: self.reporter,
            subject: self.subject,
            marker: self.marker,
            evidence_link: self.evidence_link,
            created_at,
            expired: false,
        }
    }
}

/// Result of recording a report and checking it against the threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// The stored record (already expired if the threshold tripped).
    pub record: ReportRecord,
    /// Active reports for the pair, including this one, before any expiry.
    pub observed: u32,
    /// Whether the threshold was reached and the pair expired.
    pub tripped: bool,
}

/// Storage backend for report records.
///
/// Every method must be atomic with respect to the `(subject, marker)` pair
/// it touches; `append_and_evaluate` in particular appends, counts and
/// expires as one unit.
pub trait ReportStore: Send + Sync + std::fmt::Debug {
    fn append(&self, report: NewReport, created_at: u64) -> LedgerResult<ReportRecord>;

    fn count_active(&self, subject: ParticipantId, marker: MarkerKey) -> LedgerResult<u32>;

    /// Expire every active record of the pair. Returns how many were expired.
    fn expire_all(&self, subject: ParticipantId, marker: MarkerKey) -> LedgerResult<u32>;

    fn append_and_evaluate(
        &self,
        report: NewReport,
        created_at: u64,
        threshold: u32,
    ) -> LedgerResult<Tally>;

    /// Every record about `subject`, oldest first.
    fn history(&self, subject: ParticipantId) -> LedgerResult<Vec<ReportRecord>>;
}

/// Append-only report ledger over a pluggable [`ReportStore`].
#[derive(Debug)]
pub struct ReportLedger {
    store: Box<dyn ReportStore>,
}

impl ReportLedger {
    /// A ledger that forgets everything on exit.
    pub fn memory() -> Self {
        Self::with_store(mem::MemReportStore::new())
    }

    /// A ledger persisted in `data_dir`.
    pub fn durable(data_dir: &Path) -> LedgerResult<Self> {
        Ok(Self::with_store(durable::DurableReportStore::open(data_dir)?))
    }

    pub fn with_store(store: impl ReportStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    /// Append a report without evaluating any threshold.
    pub fn record(&self, report: NewReport) -> LedgerResult<ReportRecord> {
        self.store.append(report, now_secs())
    }

    pub fn count_active(&self, subject: ParticipantId, marker: MarkerKey) -> LedgerResult<u32> {
        self.store.count_active(subject, marker)
    }

    pub fn expire_all(&self, subject: ParticipantId, marker: MarkerKey) -> LedgerResult<u32> {
        self.store.expire_all(subject, marker)
    }

    /// Append a report and, if the pair's active count reaches `threshold`,
    /// expire the pair in the same atomic step.
    pub fn record_and_evaluate(&self, report: NewReport, threshold: u32) -> LedgerResult<Tally> {
        if threshold == 0 {
            return Err(LedgerError::ZeroThreshold);
        }
        let tally = self.store.append_and_evaluate(report, now_secs(), threshold)?;
        tracing::debug!(
            id = tally.record.id,
            subject = %tally.record.subject,
            marker = %tally.record.marker,
            observed = tally.observed,
            tripped = tally.tripped,
            "report recorded"
        );
        Ok(tally)
    }

    pub fn history(&self, subject: ParticipantId) -> LedgerResult<Vec<ReportRecord>> {
        self.store.history(subject)
    }
}

pub(crate) fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
