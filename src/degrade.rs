//! Report-driven demotion.
//!
//! [`DegradationEngine`] consumes an approved report, records it in the
//! [`ReportLedger`] together with the threshold decision, and once the
//! threshold is reached plans a one-tier demotion for the reported marker.
//!
//! Planning is pure: [`plan_demotion`] takes a marker snapshot and returns a
//! [`MutationPlan`]. Applying it is the caller's job.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{GrantError, ReportError, WardenResult};
use crate::graph::RoleGraph;
use crate::ledger::{NewReport, ReportLedger, ReportRecord};
use crate::marker::{MarkerKey, Track};
use crate::plan::MutationPlan;
use crate::resolve::{GrantResolver, GrantResult};

/// Approved reports per `(subject, marker)` pair that trigger a demotion.
pub const DEFAULT_REPORT_THRESHOLD: u32 = 3;

/// What a demotion does to the reported participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemotionVerdict {
    /// The reported tier is replaced by the next lower one.
    Demoted,
    /// Already at the bottom of the track; nothing changes.
    Floor,
    /// The participant holds neither the marker nor its combination marker.
    NotHeld,
}

/// A planned demotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemotionPlan {
    pub verdict: DemotionVerdict,
    pub plan: MutationPlan,
    /// Per-track tiers the participant is moved to, before any combination.
    pub targets: Vec<MarkerKey>,
}

impl DemotionPlan {
    fn unchanged(verdict: DemotionVerdict) -> Self {
        Self {
            verdict,
            plan: MutationPlan::new(),
            targets: Vec::new(),
        }
    }
}

/// Result of one report approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemotionOutcome {
    pub record: ReportRecord,
    /// Active reports for the pair after this approval.
    pub active_count: u32,
    pub threshold_reached: bool,
    pub demoted: bool,
    /// The threshold was reached but the marker has no lower tier.
    pub floor: bool,
    /// Whether the participant held the marker or its combination marker.
    pub held: bool,
    pub plan: MutationPlan,
    pub targets: Vec<MarkerKey>,
    /// Whether a demotion announcement should go out.
    pub notify: bool,
}

/// Plan the one-tier demotion of `reported` for a participant holding `snapshot`.
pub fn plan_demotion(
    graph: &RoleGraph,
    snapshot: &BTreeSet<MarkerKey>,
    reported: MarkerKey,
) -> GrantResult<DemotionPlan> {
    let Some(track) = graph.track_of(reported)? else {
        return Err(GrantError::InvalidGrant {
            marker: reported,
            reason: "cosmetic markers cannot be demoted".into(),
        });
    };
    let resolver = GrantResolver::new(graph);

    if snapshot.contains(&reported) {
        if track == Track::Combined {
            return demote_combined(graph, &resolver, snapshot, reported);
        }
        let Some(lower) = graph.next_lower(reported)? else {
            return Ok(DemotionPlan::unchanged(DemotionVerdict::Floor));
        };
        let mut working = snapshot.clone();
        working.remove(&reported);
        let after = resolver.target(&working, lower)?;
        return Ok(DemotionPlan {
            verdict: DemotionVerdict::Demoted,
            plan: MutationPlan::between(snapshot, &after),
            targets: vec![lower],
        });
    }

    // Reported through the combined marker the tier was folded into.
    if let Some(parent) = graph.combination_parent_of(reported)? {
        if snapshot.contains(&parent) {
            let mut working = snapshot.clone();
            working.remove(&parent);
            let mut targets = Vec::with_capacity(2);
            targets.extend(graph.next_lower(reported)?);
            targets.extend(graph.sibling_of(reported)?);
            for target in &targets {
                working = resolver.target(&working, *target)?;
            }
            return Ok(DemotionPlan {
                verdict: DemotionVerdict::Demoted,
                plan: MutationPlan::between(snapshot, &working),
                targets,
            });
        }
    }

    Ok(DemotionPlan::unchanged(DemotionVerdict::NotHeld))
}

/// A held combined marker drops each prerequisite track one tier. A track
/// with nothing below keeps its own prerequisite tier.
fn demote_combined(
    graph: &RoleGraph,
    resolver: &GrantResolver<'_>,
    snapshot: &BTreeSet<MarkerKey>,
    combined: MarkerKey,
) -> GrantResult<DemotionPlan> {
    let Some(pair) = graph.prerequisite_pair_of(combined)? else {
        return Ok(DemotionPlan::unchanged(DemotionVerdict::Floor));
    };

    let mut lowered = false;
    let mut targets = Vec::with_capacity(2);
    for member in pair.members() {
        let target = match graph.next_lower(member)? {
            Some(lower) => {
                lowered = true;
                lower
            }
            None => member,
        };
        if !targets.contains(&target) {
            targets.push(target);
        }
    }
    if !lowered {
        return Ok(DemotionPlan::unchanged(DemotionVerdict::Floor));
    }

    let mut working = snapshot.clone();
    working.remove(&combined);
    for target in &targets {
        working = resolver.target(&working, *target)?;
    }
    Ok(DemotionPlan {
        verdict: DemotionVerdict::Demoted,
        plan: MutationPlan::between(snapshot, &working),
        targets,
    })
}

/// Records approved reports and plans demotions once a pair trips.
#[derive(Debug, Clone, Copy)]
pub struct DegradationEngine<'a> {
    graph: &'a RoleGraph,
    ledger: &'a ReportLedger,
    threshold: u32,
}

impl<'a> DegradationEngine<'a> {
    pub fn new(graph: &'a RoleGraph, ledger: &'a ReportLedger) -> Self {
        Self {
            graph,
            ledger,
            threshold: DEFAULT_REPORT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Record an approved report and, if its pair reaches the threshold,
    /// plan the demotion against `snapshot`.
    ///
    /// The ledger is expired for the pair whenever the threshold trips, even
    /// if the participant no longer holds the marker. Only matchmaking tiers
    /// are reportable.
    pub fn on_report_approved(
        &self,
        snapshot: &BTreeSet<MarkerKey>,
        report: NewReport,
    ) -> WardenResult<DemotionOutcome> {
        let marker = report.marker;
        if !self.graph.is_reportable(marker)? {
            return Err(ReportError::NotReportable { marker }.into());
        }
        let held = snapshot.contains(&marker)
            || self
                .graph
                .combination_parent_of(marker)?
                .is_some_and(|parent| snapshot.contains(&parent));

        // Planned before recording so a plan error leaves the ledger untouched.
        let planned = plan_demotion(self.graph, snapshot, marker)?;
        let tally = self.ledger.record_and_evaluate(report, self.threshold)?;
        if !tally.tripped {
            return Ok(DemotionOutcome {
                record: tally.record,
                active_count: tally.observed,
                threshold_reached: false,
                demoted: false,
                floor: false,
                held,
                plan: MutationPlan::new(),
                targets: Vec::new(),
                notify: false,
            });
        }

        let demoted = planned.verdict == DemotionVerdict::Demoted;
        tracing::info!(
            subject = %tally.record.subject,
            %marker,
            verdict = ?planned.verdict,
            plan = %planned.plan,
            "report threshold reached"
        );
        Ok(DemotionOutcome {
            record: tally.record,
            active_count: 0,
            threshold_reached: true,
            demoted,
            floor: planned.verdict == DemotionVerdict::Floor,
            held,
            plan: planned.plan,
            targets: planned.targets,
            notify: demoted,
        })
    }
}
