//! Plan execution against the membership authority.
//!
//! [`MutationExecutor`] applies every step of a [`MutationPlan`] and reports
//! each failure instead of stopping at the first one: all operations are
//! idempotent, so re-running a partially applied plan converges.
//!
//! [`ParticipantLocks`] provides the per-participant critical section that
//! keeps read, plan and apply for one participant from interleaving.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

use crate::error::MembershipError;
use crate::marker::ParticipantId;
use crate::membership::MembershipAuthority;
use crate::plan::{Mutation, MutationOp, MutationPlan};

/// Per-step outcome of applying a plan.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub applied: Vec<Mutation>,
    pub failed: Vec<(Mutation, MembershipError)>,
}

impl ApplyReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failures(&self) -> &[(Mutation, MembershipError)] {
        &self.failed
    }

    /// `Ok` if every step applied, otherwise the first failure.
    pub fn into_result(self) -> Result<Vec<Mutation>, MembershipError> {
        match self.failed.into_iter().next() {
            None => Ok(self.applied),
            Some((_, err)) => Err(err),
        }
    }
}

/// Applies plans through a [`MembershipAuthority`].
pub struct MutationExecutor<'a> {
    authority: &'a dyn MembershipAuthority,
}

impl<'a> MutationExecutor<'a> {
    pub fn new(authority: &'a dyn MembershipAuthority) -> Self {
        Self { authority }
    }

    /// Attempt every step of `plan` in order.
    pub fn apply(&self, participant: ParticipantId, plan: &MutationPlan) -> ApplyReport {
        let mut report = ApplyReport::default();
        for step in plan {
            let result = match step.op {
                MutationOp::Add => self.authority.add(participant, step.marker),
                MutationOp::Remove => self.authority.remove(participant, step.marker),
            };
            match result {
                Ok(()) => report.applied.push(*step),
                Err(e) => {
                    tracing::warn!(
                        %participant,
                        op = %step.op,
                        marker = %step.marker,
                        error = %e,
                        "plan step failed"
                    );
                    report.failed.push((*step, e));
                }
            }
        }
        if !plan.is_empty() {
            tracing::info!(
                %participant,
                %plan,
                failed = report.failed.len(),
                "applied plan"
            );
        }
        report
    }
}

impl std::fmt::Debug for MutationExecutor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationExecutor").finish()
    }
}

/// Per-participant mutual exclusion.
///
/// Different participants never contend; the same participant is serialized.
/// A participant's cell is dropped once no caller holds or waits on it.
#[derive(Debug, Default)]
pub struct ParticipantLocks {
    cells: DashMap<ParticipantId, Arc<Mutex<()>>>,
}

impl ParticipantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the participant's lock.
    pub fn with_participant<T>(&self, participant: ParticipantId, f: impl FnOnce() -> T) -> T {
        // Clone the cell out so the shard lock is released before blocking.
        let cell = Arc::clone(self.cells.entry(participant).or_default().value());
        let result = {
            let _guard = cell.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        drop(cell);
        // Clones are only taken under the shard lock, so a count of 1 here
        // means nobody else holds or waits on the cell.
        self.cells
            .remove_if(&participant, |_, cell| Arc::strong_count(cell) == 1);
        result
    }
}
