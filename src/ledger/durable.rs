//! ACID-durable report store backed by redb.
//!
//! Records are bincode-encoded under their numeric id. A multimap index keyed
//! by `(subject, marker)` holds the ids of the pair's active reports, so
//! counting and expiring a pair never decodes unrelated rows. Every operation
//! runs in a single write transaction, so appending a report, counting the
//! pair and expiring it commit together or not at all.

use std::path::Path;
use std::sync::Arc;

use redb::{
    Database, MultimapTable, MultimapTableDefinition, ReadableMultimapTable, ReadableTable, Table,
    TableDefinition,
};

use super::{LedgerResult, NewReport, ReportRecord, ReportStore, Tally};
use crate::error::LedgerError;
use crate::marker::{MarkerKey, ParticipantId};

/// Report id → bincode-encoded [`ReportRecord`].
const REPORTS: TableDefinition<u64, &[u8]> = TableDefinition::new("reports");

/// `"<subject>/<marker>"` → ids of the pair's active reports.
const ACTIVE: MultimapTableDefinition<&str, u64> = MultimapTableDefinition::new("active_reports");

/// Monotonic counters.
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

const REPORT_SEQ: &str = "report_id";

pub(crate) fn redb_err(op: &'static str) -> impl Fn(redb::Error) -> LedgerError {
    move |e| LedgerError::Redb {
        message: format!("{op} failed: {e}"),
    }
}

fn pair_key(subject: ParticipantId, marker: MarkerKey) -> String {
    format!("{subject}/{marker}")
}

fn encode(record: &ReportRecord) -> LedgerResult<Vec<u8>> {
    bincode::serialize(record).map_err(|e| LedgerError::Serialization {
        message: format!("encode report {}: {e}", record.id),
    })
}

fn decode(bytes: &[u8]) -> LedgerResult<ReportRecord> {
    bincode::deserialize(bytes).map_err(|e| LedgerError::Serialization {
        message: format!("decode report: {e}"),
    })
}

/// Durable report store using redb.
pub struct DurableReportStore {
    db: Arc<Database>,
}

impl DurableReportStore {
    /// Open or create the report database in `data_dir`.
    pub fn open(data_dir: &Path) -> LedgerResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| LedgerError::Io { source: e })?;
        let db_path = data_dir.join("rolewarden.redb");
        let db = Database::create(&db_path).map_err(|e| LedgerError::Redb {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;

        // Create every table up front so read transactions never miss them,
        // and index active rows written before the index existed.
        let txn = db.begin_write().map_err(|e| redb_err("begin_write")(e.into()))?;
        {
            let reports = txn
                .open_table(REPORTS)
                .map_err(|e| redb_err("open_table")(e.into()))?;
            let mut active = txn
                .open_multimap_table(ACTIVE)
                .map_err(|e| redb_err("open_multimap_table")(e.into()))?;
            txn.open_table(SEQUENCES)
                .map_err(|e| redb_err("open_table")(e.into()))?;
            for record in scan(&reports, |r| !r.expired)? {
                index(&mut active, &record)?;
            }
        }
        txn.commit().map_err(|e| redb_err("commit")(e.into()))?;

        tracing::debug!(path = %db_path.display(), "opened report ledger");
        Ok(Self { db: Arc::new(db) })
    }

    /// Run `f` inside one write transaction and commit its result.
    fn write<T>(&self, f: impl FnOnce(&mut Tables<'_>) -> LedgerResult<T>) -> LedgerResult<T> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| redb_err("begin_write")(e.into()))?;
        let value = {
            let mut tables = Tables {
                reports: txn
                    .open_table(REPORTS)
                    .map_err(|e| redb_err("open_table")(e.into()))?,
                active: txn
                    .open_multimap_table(ACTIVE)
                    .map_err(|e| redb_err("open_multimap_table")(e.into()))?,
                sequences: txn
                    .open_table(SEQUENCES)
                    .map_err(|e| redb_err("open_table")(e.into()))?,
            };
            f(&mut tables)?
        };
        txn.commit().map_err(|e| redb_err("commit")(e.into()))?;
        Ok(value)
    }

    /// Every stored record, in id order.
    fn read_all(&self) -> LedgerResult<Vec<ReportRecord>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| redb_err("begin_read")(e.into()))?;
        let table = txn
            .open_table(REPORTS)
            .map_err(|e| redb_err("open_table")(e.into()))?;
        scan(&table, |_| true)
    }
}

/// Tables opened by one write transaction.
struct Tables<'txn> {
    reports: Table<'txn, u64, &'static [u8]>,
    active: MultimapTable<'txn, &'static str, u64>,
    sequences: Table<'txn, &'static str, u64>,
}

/// Decode every record of `table` that satisfies `keep`, in id order.
fn scan(
    table: &impl ReadableTable<u64, &'static [u8]>,
    keep: impl Fn(&ReportRecord) -> bool,
) -> LedgerResult<Vec<ReportRecord>> {
    let mut out = Vec::new();
    let iter = table.iter().map_err(|e| redb_err("iter")(e.into()))?;
    for row in iter {
        let (_, value) = row.map_err(|e| redb_err("iter")(e.into()))?;
        let record = decode(value.value())?;
        if keep(&record) {
            out.push(record);
        }
    }
    Ok(out)
}

fn next_id(sequences: &mut Table<'_, &'static str, u64>) -> LedgerResult<u64> {
    let last = sequences
        .get(REPORT_SEQ)
        .map_err(|e| redb_err("get")(e.into()))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    let id = last + 1;
    sequences
        .insert(REPORT_SEQ, id)
        .map_err(|e| redb_err("insert")(e.into()))?;
    Ok(id)
}

fn put(reports: &mut Table<'_, u64, &'static [u8]>, record: &ReportRecord) -> LedgerResult<()> {
    let bytes = encode(record)?;
    reports
        .insert(record.id, bytes.as_slice())
        .map_err(|e| redb_err("insert")(e.into()))?;
    Ok(())
}

fn index(
    active: &mut MultimapTable<'_, &'static str, u64>,
    record: &ReportRecord,
) -> LedgerResult<()> {
    active
        .insert(pair_key(record.subject, record.marker).as_str(), record.id)
        .map_err(|e| redb_err("index")(e.into()))?;
    Ok(())
}

/// Ids of the pair's active reports, ascending.
fn active_ids(
    active: &impl ReadableMultimapTable<&'static str, u64>,
    subject: ParticipantId,
    marker: MarkerKey,
) -> LedgerResult<Vec<u64>> {
    let values = active
        .get(pair_key(subject, marker).as_str())
        .map_err(|e| redb_err("get")(e.into()))?;
    let mut ids = Vec::new();
    for id in values {
        ids.push(id.map_err(|e| redb_err("get")(e.into()))?.value());
    }
    Ok(ids)
}

/// Flag every active report of the pair expired and drop it from the index.
fn expire_pair(
    tables: &mut Tables<'_>,
    subject: ParticipantId,
    marker: MarkerKey,
) -> LedgerResult<u32> {
    let ids = active_ids(&tables.active, subject, marker)?;
    for id in &ids {
        let stored = tables
            .reports
            .get(*id)
            .map_err(|e| redb_err("get")(e.into()))?
            .map(|guard| decode(guard.value()))
            .transpose()?;
        let Some(mut record) = stored else {
            return Err(LedgerError::Redb {
                message: format!("active index names missing report {id}"),
            });
        };
        record.expired = true;
        put(&mut tables.reports, &record)?;
    }
    tables
        .active
        .remove_all(pair_key(subject, marker).as_str())
        .map_err(|e| redb_err("remove_all")(e.into()))?;
    Ok(ids.len() as u32)
}

impl ReportStore for DurableReportStore {
    fn append(&self, report: NewReport, created_at: u64) -> LedgerResult<ReportRecord> {
        self.write(|tables| {
            let record = report.into_record(next_id(&mut tables.sequences)?, created_at);
            put(&mut tables.reports, &record)?;
            index(&mut tables.active, &record)?;
            Ok(record)
        })
    }

    fn count_active(&self, subject: ParticipantId, marker: MarkerKey) -> LedgerResult<u32> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| redb_err("begin_read")(e.into()))?;
        let active = txn
            .open_multimap_table(ACTIVE)
            .map_err(|e| redb_err("open_multimap_table")(e.into()))?;
        Ok(active_ids(&active, subject, marker)?.len() as u32)
    }

    fn expire_all(&self, subject: ParticipantId, marker: MarkerKey) -> LedgerResult<u32> {
        self.write(|tables| expire_pair(tables, subject, marker))
    }

    fn append_and_evaluate(
        &self,
        report: NewReport,
        created_at: u64,
        threshold: u32,
    ) -> LedgerResult<Tally> {
        self.write(|tables| {
            let (subject, marker) = (report.subject, report.marker);
            let mut record = report.into_record(next_id(&mut tables.sequences)?, created_at);
            put(&mut tables.reports, &record)?;
            index(&mut tables.active, &record)?;

            let observed = active_ids(&tables.active, subject, marker)?.len() as u32;
            let tripped = observed >= threshold;
            if tripped {
                expire_pair(tables, subject, marker)?;
                record.expired = true;
            }
            Ok(Tally {
                record,
                observed,
                tripped,
            })
        })
    }

    fn history(&self, subject: ParticipantId) -> LedgerResult<Vec<ReportRecord>> {
        let mut all = self.read_all()?;
        all.retain(|r| r.subject == subject);
        Ok(all)
    }
}

impl std::fmt::Debug for DurableReportStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableReportStore").finish()
    }
}
