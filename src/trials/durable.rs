//! Durable trial store backed by redb.
//!
//! Trials live in their own database file next to the report ledger so the
//! two stores open and lock independently.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use super::{NewTrial, TrialRecord, TrialStore};
use crate::error::LedgerError;
use crate::ledger::durable::redb_err;
use crate::ledger::LedgerResult;

/// Trial id → bincode-encoded [`TrialRecord`].
const TRIALS: TableDefinition<u64, &[u8]> = TableDefinition::new("trials");

/// Durable trial store using redb.
pub struct DurableTrialStore {
    db: Arc<Database>,
}

impl DurableTrialStore {
    /// Open or create the trial database in `data_dir`.
    pub fn open(data_dir: &Path) -> LedgerResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| LedgerError::Io { source: e })?;
        let db_path = data_dir.join("trials.redb");
        let db = Database::create(&db_path).map_err(|e| LedgerError::Redb {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;

        let txn = db.begin_write().map_err(|e| redb_err("begin_write")(e.into()))?;
        txn.open_table(TRIALS)
            .map_err(|e| redb_err("open_table")(e.into()))?;
        txn.commit().map_err(|e| redb_err("commit")(e.into()))?;

        tracing::debug!(path = %db_path.display(), "opened trial log");
        Ok(Self { db: Arc::new(db) })
    }
}

impl TrialStore for DurableTrialStore {
    fn append(&self, trial: NewTrial, created_at: u64) -> LedgerResult<TrialRecord> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| redb_err("begin_write")(e.into()))?;
        let record = {
            let mut table = txn
                .open_table(TRIALS)
                .map_err(|e| redb_err("open_table")(e.into()))?;
            let last = table
                .last()
                .map_err(|e| redb_err("last")(e.into()))?
                .map(|(key, _)| key.value())
                .unwrap_or(0);
            let record = trial.into_record(last + 1, created_at);
            let bytes = bincode::serialize(&record).map_err(|e| LedgerError::Serialization {
                message: format!("encode trial {}: {e}", record.id),
            })?;
            table
                .insert(record.id, bytes.as_slice())
                .map_err(|e| redb_err("insert")(e.into()))?;
            record
        };
        txn.commit().map_err(|e| redb_err("commit")(e.into()))?;
        Ok(record)
    }

    fn since(&self, since: u64) -> LedgerResult<Vec<TrialRecord>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| redb_err("begin_read")(e.into()))?;
        let table = txn
            .open_table(TRIALS)
            .map_err(|e| redb_err("open_table")(e.into()))?;
        let mut out = Vec::new();
        for row in table.iter().map_err(|e| redb_err("iter")(e.into()))? {
            let (_, value) = row.map_err(|e| redb_err("iter")(e.into()))?;
            let record: TrialRecord =
                bincode::deserialize(value.value()).map_err(|e| LedgerError::Serialization {
                    message: format!("decode trial: {e}"),
                })?;
            if record.created_at >= since {
                out.push(record);
            }
        }
        Ok(out)
    }
}

impl std::fmt::Debug for DurableTrialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableTrialStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::{MarkerKey, ParticipantId};
    use tempfile::TempDir;

    #[test]
    fn trials_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let trial = NewTrial::new(ParticipantId::new(1), ParticipantId::new(2), MarkerKey::Master)
            .with_link("https://discord.com/channels/1/2/3")
            .with_participant(ParticipantId::new(3), "Base");
        {
            let store = DurableTrialStore::open(dir.path()).unwrap();
            assert_eq!(store.append(trial.clone(), 50).unwrap().id, 1);
        }
        let store = DurableTrialStore::open(dir.path()).unwrap();
        let second = store.append(trial, 60).unwrap();
        assert_eq!(second.id, 2);

        let all = store.since(0).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].participants[0].role, "Base");
        assert_eq!(store.since(55).unwrap(), vec![second]);
    }
}
