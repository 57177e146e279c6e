//! Warden facade: top-level API for the rolewarden engine.
//!
//! The `Warden` owns the role graph, the report ledger, the trial log and the
//! participant lock table, and wires them to an external membership authority and
//! notifier. Every mutating call follows the same shape: take the
//! participant's lock, read a fresh marker snapshot, plan, apply, announce.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::WardenConfig;
use crate::degrade::{DegradationEngine, DemotionOutcome};
use crate::dpm::{self, DpmAssessment};
use crate::error::{ReportError, WardenResult};
use crate::executor::{MutationExecutor, ParticipantLocks};
use crate::graph::{RoleCatalog, RoleGraph};
use crate::ledger::{NewReport, ReportLedger, ReportRecord};
use crate::marker::{MarkerKey, ParticipantId, Track};
use crate::membership::MembershipAuthority;
use crate::notify::{self, Announcement, GrantSource, Notifier};
use crate::plan::MutationPlan;
use crate::resolve::GrantResolver;
use crate::trials::{NewTrial, TrialLeaderboard, TrialLog, TrialRecord};

/// Result of a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantOutcome {
    pub participant: ParticipantId,
    pub requested: MarkerKey,
    pub plan: MutationPlan,
    /// Combined marker awarded in place of `requested`, if any.
    pub also: Option<MarkerKey>,
    pub announced: bool,
    /// Trial recorded for a trial-pass grant.
    pub trial: Option<TrialRecord>,
}

/// Result of an approved DPM application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpmOutcome {
    pub assessment: DpmAssessment,
    pub grant: GrantOutcome,
}

/// The role hierarchy engine.
pub struct Warden {
    config: WardenConfig,
    graph: Arc<RoleGraph>,
    ledger: ReportLedger,
    trials: TrialLog,
    authority: Arc<dyn MembershipAuthority>,
    notifier: Arc<dyn Notifier>,
    locks: ParticipantLocks,
}

impl Warden {
    /// Build a warden from its configuration.
    ///
    /// Loads the catalog file if one is configured and opens the durable
    /// ledger and trial log when `data_dir` is set.
    pub fn new(
        config: WardenConfig,
        authority: Arc<dyn MembershipAuthority>,
        notifier: Arc<dyn Notifier>,
    ) -> WardenResult<Self> {
        config.validate()?;

        let graph = match &config.catalog {
            Some(path) => RoleGraph::from_catalog(RoleCatalog::from_toml_file(path)?)?,
            None => RoleGraph::standard(),
        };
        let (ledger, trials) = match &config.data_dir {
            Some(dir) => (ReportLedger::durable(dir)?, TrialLog::durable(dir)?),
            None => (ReportLedger::memory(), TrialLog::memory()),
        };

        tracing::info!(
            catalog = config
                .catalog
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in".into()),
            persistent = config.data_dir.is_some(),
            threshold = config.report_threshold,
            "initializing rolewarden"
        );

        Ok(Self {
            config,
            graph: Arc::new(graph),
            ledger,
            trials,
            authority,
            notifier,
            locks: ParticipantLocks::new(),
        })
    }

    /// Grant a tier marker through the hierarchy.
    ///
    /// A trial-pass grant also records the trial, with `host` and no team.
    /// Use [`Warden::pass_trial`] to record the link and team members.
    pub fn grant(
        &self,
        participant: ParticipantId,
        marker: MarkerKey,
        source: GrantSource,
    ) -> WardenResult<GrantOutcome> {
        let trial = match source {
            GrantSource::TrialPass { host } => Some(NewTrial::new(participant, host, marker)),
            GrantSource::Application | GrantSource::Manual => None,
        };
        self.grant_tier(participant, marker, source, trial)
    }

    /// Grant the tier a trialee passed and record the trial.
    pub fn pass_trial(&self, trial: NewTrial) -> WardenResult<GrantOutcome> {
        let source = GrantSource::TrialPass { host: trial.host };
        self.grant_tier(trial.trialee, trial.marker, source, Some(trial))
    }

    /// The trial is recorded after the plan validates and before it is
    /// applied, matching the report path.
    fn grant_tier(
        &self,
        participant: ParticipantId,
        marker: MarkerKey,
        source: GrantSource,
        trial: Option<NewTrial>,
    ) -> WardenResult<GrantOutcome> {
        self.locks.with_participant(participant, || {
            let current = self.authority.markers(participant)?;
            let plan = GrantResolver::new(&self.graph).resolve(&current, marker)?;
            let trial = trial.map(|t| self.trials.record(t)).transpose()?;
            let mut outcome = self.finish_grant(participant, marker, plan, source)?;
            outcome.trial = trial;
            Ok(outcome)
        })
    }

    /// Grant a cosmetic marker.
    pub fn grant_cosmetic(
        &self,
        participant: ParticipantId,
        marker: MarkerKey,
        source: GrantSource,
    ) -> WardenResult<GrantOutcome> {
        self.locks.with_participant(participant, || {
            let current = self.authority.markers(participant)?;
            let plan = GrantResolver::new(&self.graph).resolve_cosmetic(&current, marker)?;
            self.finish_grant(participant, marker, plan, source)
        })
    }

    fn finish_grant(
        &self,
        participant: ParticipantId,
        requested: MarkerKey,
        plan: MutationPlan,
        source: GrantSource,
    ) -> WardenResult<GrantOutcome> {
        MutationExecutor::new(self.authority.as_ref())
            .apply(participant, &plan)
            .into_result()?;

        let also = plan.adds().find(|m| {
            *m != requested && matches!(self.graph.track_of(*m), Ok(Some(Track::Combined)))
        });
        let announced = !plan.is_empty()
            && notify::deliver(
                self.notifier.as_ref(),
                &Announcement::Granted {
                    participant,
                    marker: requested,
                    also,
                    source,
                },
            );
        Ok(GrantOutcome {
            participant,
            requested,
            plan,
            also,
            announced,
            trial: None,
        })
    }

    /// Undo a rejected approval by removing the listed markers.
    pub fn reject_grant(
        &self,
        participant: ParticipantId,
        markers: &[MarkerKey],
    ) -> WardenResult<MutationPlan> {
        self.locks.with_participant(participant, || {
            let current = self.authority.markers(participant)?;
            let plan = GrantResolver::new(&self.graph).revoke(&current, markers)?;
            MutationExecutor::new(self.authority.as_ref())
                .apply(participant, &plan)
                .into_result()?;
            Ok(plan)
        })
    }

    /// Validate a report before it goes to moderators.
    ///
    /// Returns the number of active reports already on file for the pair.
    pub fn check_report(
        &self,
        subject: ParticipantId,
        marker: MarkerKey,
        reporter: ParticipantId,
    ) -> WardenResult<u32> {
        if subject == reporter {
            return Err(ReportError::SelfReport.into());
        }
        if !self.graph.is_reportable(marker)? {
            return Err(ReportError::NotReportable { marker }.into());
        }
        let held = self.authority.markers(subject)?;
        let parent = self.graph.combination_parent_of(marker)?;
        if !held.contains(&marker) && !parent.is_some_and(|p| held.contains(&p)) {
            return Err(ReportError::NotHeld { subject, marker }.into());
        }
        Ok(self.ledger.count_active(subject, marker)?)
    }

    /// Record a moderator-approved report and demote if its pair trips.
    ///
    /// The ledger commits before the plan is applied; an apply failure is
    /// returned as an error and re-granting the target tiers repairs it.
    pub fn approve_report(&self, report: NewReport) -> WardenResult<DemotionOutcome> {
        let subject = report.subject;
        self.locks.with_participant(subject, || {
            let snapshot = self.authority.markers(subject)?;
            let engine = DegradationEngine::new(&self.graph, &self.ledger)
                .with_threshold(self.config.report_threshold);
            let reported = report.marker;
            let outcome = engine.on_report_approved(&snapshot, report)?;

            MutationExecutor::new(self.authority.as_ref())
                .apply(subject, &outcome.plan)
                .into_result()?;

            if outcome.notify {
                notify::deliver(
                    self.notifier.as_ref(),
                    &Announcement::Demoted {
                        participant: subject,
                        reported,
                        plan: outcome.plan.clone(),
                    },
                );
            }
            Ok(outcome)
        })
    }

    /// Score a DPM application and grant the tier it qualifies for.
    pub fn approve_dpm(
        &self,
        participant: ParticipantId,
        damage: &str,
        kill_time: &str,
    ) -> WardenResult<DpmOutcome> {
        let assessment = dpm::assess(&self.graph, damage, kill_time)?;
        let grant = self.grant(participant, assessment.tier, GrantSource::Application)?;
        Ok(DpmOutcome { assessment, grant })
    }

    /// Every report on file about `subject`, oldest first.
    pub fn reports_for(&self, subject: ParticipantId) -> WardenResult<Vec<ReportRecord>> {
        Ok(self.ledger.history(subject)?)
    }

    /// Trials passed by `trialee`, oldest first.
    pub fn trials_for(&self, trialee: ParticipantId) -> WardenResult<Vec<TrialRecord>> {
        Ok(self.trials.trials_for(trialee)?)
    }

    /// Trials `participant` hosted or joined since `since` (Unix seconds).
    pub fn participation_count(&self, participant: ParticipantId, since: u64) -> WardenResult<u32> {
        Ok(self.trials.participation_count(participant, since)?)
    }

    /// Hosted and participated trial counts since `since` (Unix seconds).
    pub fn trial_leaderboard(&self, since: u64) -> WardenResult<TrialLeaderboard> {
        Ok(self.trials.leaderboard(since)?)
    }

    /// Fresh snapshot of a participant's markers.
    pub fn markers(&self, participant: ParticipantId) -> WardenResult<BTreeSet<MarkerKey>> {
        Ok(self.authority.markers(participant)?)
    }

    pub fn graph(&self) -> &RoleGraph {
        &self.graph
    }

    /// Shared handle to the role graph.
    pub fn graph_arc(&self) -> Arc<RoleGraph> {
        Arc::clone(&self.graph)
    }

    pub fn ledger(&self) -> &ReportLedger {
        &self.ledger
    }

    pub fn trials(&self) -> &TrialLog {
        &self.trials
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// Summary of the running configuration.
    pub fn info(&self) -> WardenInfo {
        WardenInfo {
            tracks: self
                .graph
                .tracks()
                .map(|t| (t, self.graph.tiers(t).len()))
                .collect(),
            cosmetics: self.graph.cosmetics().count(),
            report_threshold: self.config.report_threshold,
            persistent: self.config.data_dir.is_some(),
        }
    }
}

impl std::fmt::Debug for Warden {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warden")
            .field("config", &self.config)
            .field("ledger", &self.ledger)
            .field("trials", &self.trials)
            .finish()
    }
}

/// Summary information about a warden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardenInfo {
    pub tracks: Vec<(Track, usize)>,
    pub cosmetics: usize,
    pub report_threshold: u32,
    pub persistent: bool,
}

impl std::fmt::Display for WardenInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "rolewarden info")?;
        for (track, tiers) in &self.tracks {
            writeln!(f, "  {:<12}{tiers} tiers", format!("{track}:"))?;
        }
        writeln!(f, "  cosmetics:  {}", self.cosmetics)?;
        writeln!(f, "  threshold:  {}", self.report_threshold)?;
        writeln!(f, "  persistent: {}", self.persistent)?;
        Ok(())
    }
}
