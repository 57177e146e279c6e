//! Trial log: append-only record of passed trials.
//!
//! Every tier granted through a trial leaves a [`TrialRecord`] naming the
//! trialee, the host and the team members who took part. The log answers
//! per-trialee history and the hosted/participated counts behind the trial
//! team leaderboard and upkeep checks.
//!
//! Two backends implement [`TrialStore`], mirroring the report ledger:
//!
//! - [`MemTrialStore`](mem::MemTrialStore) keeps records in a DashMap
//! - [`DurableTrialStore`](durable::DurableTrialStore) keeps them in redb

pub mod durable;
pub mod mem;

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ledger::{now_secs, LedgerResult};
use crate::marker::{MarkerKey, ParticipantId};

/// A team member who helped run a trial, and the slot they filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialParticipation {
    pub participant: ParticipantId,
    /// Team slot, e.g. `"Base"` or `"Umbra"`.
    pub role: String,
}

/// One passed trial, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub id: u64,
    pub trialee: ParticipantId,
    pub host: ParticipantId,
    pub marker: MarkerKey,
    pub link: Option<String>,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
    pub participants: Vec<TrialParticipation>,
}

impl TrialRecord {
    /// Whether `participant` hosted or joined this trial as team.
    pub fn involves(&self, participant: ParticipantId) -> bool {
        self.host == participant || self.participants.iter().any(|p| p.participant == participant)
    }
}

/// A trial about to be recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTrial {
    pub trialee: ParticipantId,
    pub host: ParticipantId,
    pub marker: MarkerKey,
    pub link: Option<String>,
    pub participants: Vec<TrialParticipation>,
}

impl NewTrial {
    pub fn new(trialee: ParticipantId, host: ParticipantId, marker: MarkerKey) -> Self {
        Self {
            trialee,
            host,
            marker,
            link: None,
            participants: Vec::new(),
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Add a team member. The trialee never counts as a participant.
    pub fn with_participant(mut self, participant: ParticipantId, role: impl Into<String>) -> Self {
        if participant != self.trialee {
            self.participants.push(TrialParticipation {
                participant,
                role: role.into(),
            });
        }
        self
    }

    pub(crate) fn into_record(self, id: u64, created_at: u64) -> TrialRecord {
        TrialRecord {
            id,
            trialee: self.trialee,
            host: self.host,
            marker: self.marker,
            link: self.link,
            created_at,
            participants: self.participants,
        }
    }
}

/// Hosted and participated counts, highest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialLeaderboard {
    pub total: u32,
    pub hosted: Vec<(ParticipantId, u32)>,
    pub participated: Vec<(ParticipantId, u32)>,
}

/// Storage backend for trial records.
pub trait TrialStore: Send + Sync + std::fmt::Debug {
    fn append(&self, trial: NewTrial, created_at: u64) -> LedgerResult<TrialRecord>;

    /// Every record created at or after `since`, oldest first.
    fn since(&self, since: u64) -> LedgerResult<Vec<TrialRecord>>;
}

/// Trial log over a pluggable [`TrialStore`].
#[derive(Debug)]
pub struct TrialLog {
    store: Box<dyn TrialStore>,
}

impl TrialLog {
    pub fn memory() -> Self {
        Self::with_store(Box::new(mem::MemTrialStore::new()))
    }

    /// Open the redb-backed log in `data_dir`.
    pub fn durable(data_dir: &Path) -> LedgerResult<Self> {
        Ok(Self::with_store(Box::new(durable::DurableTrialStore::open(data_dir)?)))
    }

    pub fn with_store(store: Box<dyn TrialStore>) -> Self {
        Self { store }
    }

    pub fn record(&self, trial: NewTrial) -> LedgerResult<TrialRecord> {
        let record = self.store.append(trial, now_secs())?;
        tracing::debug!(
            id = record.id,
            trialee = %record.trialee,
            host = %record.host,
            marker = %record.marker,
            team = record.participants.len(),
            "trial recorded"
        );
        Ok(record)
    }

    /// Trials passed by `trialee`, oldest first.
    pub fn trials_for(&self, trialee: ParticipantId) -> LedgerResult<Vec<TrialRecord>> {
        let mut all = self.store.since(0)?;
        all.retain(|t| t.trialee == trialee);
        Ok(all)
    }

    /// Trials `participant` hosted or joined since `since`.
    pub fn participation_count(&self, participant: ParticipantId, since: u64) -> LedgerResult<u32> {
        let all = self.store.since(since)?;
        Ok(all.iter().filter(|t| t.involves(participant)).count() as u32)
    }

    /// Hosted and participated counts over trials since `since`.
    pub fn leaderboard(&self, since: u64) -> LedgerResult<TrialLeaderboard> {
        let all = self.store.since(since)?;
        let mut hosted: HashMap<ParticipantId, u32> = HashMap::new();
        let mut participated: HashMap<ParticipantId, u32> = HashMap::new();
        for trial in &all {
            *hosted.entry(trial.host).or_default() += 1;
            for member in &trial.participants {
                *participated.entry(member.participant).or_default() += 1;
            }
        }
        Ok(TrialLeaderboard {
            total: all.len() as u32,
            hosted: ranked(hosted),
            participated: ranked(participated),
        })
    }
}

fn ranked(counts: HashMap<ParticipantId, u32>) -> Vec<(ParticipantId, u32)> {
    let mut out: Vec<_> = counts.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> ParticipantId {
        ParticipantId::new(raw)
    }

    #[test]
    fn trialee_is_never_a_participant() {
        let trial = NewTrial::new(id(1), id(2), MarkerKey::DuoMaster)
            .with_participant(id(1), "Base")
            .with_participant(id(3), "Umbra");
        assert_eq!(trial.participants.len(), 1);
        assert_eq!(trial.participants[0].participant, id(3));
    }

    #[test]
    fn leaderboard_ranks_hosts_and_team() {
        let log = TrialLog::memory();
        log.record(NewTrial::new(id(10), id(1), MarkerKey::DuoMaster).with_participant(id(2), "Base"))
            .unwrap();
        log.record(
            NewTrial::new(id(11), id(1), MarkerKey::ThreeSevenMaster)
                .with_participant(id(2), "Base")
                .with_participant(id(3), "Umbra"),
        )
        .unwrap();
        log.record(NewTrial::new(id(12), id(3), MarkerKey::DuoRootskips)).unwrap();

        let board = log.leaderboard(0).unwrap();
        assert_eq!(board.total, 3);
        assert_eq!(board.hosted, vec![(id(1), 2), (id(3), 1)]);
        assert_eq!(board.participated, vec![(id(2), 2), (id(3), 1)]);

        assert_eq!(log.participation_count(id(3), 0).unwrap(), 2);
        assert_eq!(log.participation_count(id(10), 0).unwrap(), 0);
        assert_eq!(log.trials_for(id(11)).unwrap()[0].marker, MarkerKey::ThreeSevenMaster);
    }

    #[test]
    fn since_filters_old_trials() {
        let store = mem::MemTrialStore::new();
        store.append(NewTrial::new(id(1), id(2), MarkerKey::DuoMaster), 100).unwrap();
        store.append(NewTrial::new(id(1), id(2), MarkerKey::Master), 200).unwrap();
        let log = TrialLog::with_store(Box::new(store));
        assert_eq!(log.participation_count(id(2), 150).unwrap(), 1);
        assert_eq!(log.leaderboard(201).unwrap(), TrialLeaderboard::default());
    }
}
