//! Grant resolution: which markers to add and remove for a requested grant.
//!
//! [`GrantResolver`] is a pure planner over a marker snapshot. It keeps the
//! single-tier-per-track invariant, substitutes a combined marker once both
//! of its prerequisites are held, and never strips a marker that the
//! requested marker does not supersede.

use std::collections::BTreeSet;

use crate::error::GrantError;
use crate::graph::RoleGraph;
use crate::marker::{MarkerKey, Track};
use crate::plan::MutationPlan;

/// Result type for grant resolution.
pub type GrantResult<T> = std::result::Result<T, GrantError>;

/// Pure planner for tier and cosmetic grants.
#[derive(Debug, Clone, Copy)]
pub struct GrantResolver<'g> {
    graph: &'g RoleGraph,
}

impl<'g> GrantResolver<'g> {
    pub fn new(graph: &'g RoleGraph) -> Self {
        Self { graph }
    }

    /// Plan the grant of one tier marker.
    ///
    /// Returns an empty plan when the held markers already imply `requested`.
    pub fn resolve(
        &self,
        current: &BTreeSet<MarkerKey>,
        requested: MarkerKey,
    ) -> GrantResult<MutationPlan> {
        let target = self.target(current, requested)?;
        let plan = MutationPlan::between(current, &target);
        tracing::debug!(%requested, %plan, "resolved grant");
        Ok(plan)
    }

    /// Plan several grants as one batch.
    ///
    /// Each marker is resolved against the set produced by the previous ones,
    /// so siblings granted together collapse into their combined marker.
    pub fn resolve_all(
        &self,
        current: &BTreeSet<MarkerKey>,
        requested: &[MarkerKey],
    ) -> GrantResult<MutationPlan> {
        let mut working = current.clone();
        for marker in requested {
            working = self.target(&working, *marker)?;
        }
        Ok(MutationPlan::between(current, &working))
    }

    /// Plan an unconditional cosmetic grant.
    pub fn resolve_cosmetic(
        &self,
        current: &BTreeSet<MarkerKey>,
        requested: MarkerKey,
    ) -> GrantResult<MutationPlan> {
        if self.graph.track_of(requested)?.is_some() {
            return Err(GrantError::InvalidGrant {
                marker: requested,
                reason: "tier markers are granted through the hierarchy".into(),
            });
        }
        let mut plan = MutationPlan::new();
        if !current.contains(&requested) {
            plan.push_add(requested);
        }
        Ok(plan)
    }

    /// Plan the removal of the listed markers that are currently held.
    pub fn revoke(
        &self,
        current: &BTreeSet<MarkerKey>,
        markers: &[MarkerKey],
    ) -> GrantResult<MutationPlan> {
        let mut plan = MutationPlan::new();
        for marker in markers {
            self.graph.ensure_known(*marker)?;
            if current.contains(marker) {
                plan.push_remove(*marker);
            }
        }
        Ok(plan)
    }

    /// The marker set after granting `requested` on top of `current`.
    pub(crate) fn target(
        &self,
        current: &BTreeSet<MarkerKey>,
        requested: MarkerKey,
    ) -> GrantResult<BTreeSet<MarkerKey>> {
        let Some(track) = self.graph.track_of(requested)? else {
            return Err(GrantError::InvalidGrant {
                marker: requested,
                reason: "cosmetic markers are granted through the cosmetic path".into(),
            });
        };

        if self.graph.dominates(current, requested)? {
            return Ok(current.clone());
        }

        if track == Track::Combined {
            let pair = self.graph.prerequisite_pair_of(requested)?.ok_or_else(|| {
                GrantError::InvalidGrant {
                    marker: requested,
                    reason: "combined marker has no prerequisite pair".into(),
                }
            })?;
            if !pair.members().iter().all(|m| current.contains(m)) {
                return Err(GrantError::InvalidGrant {
                    marker: requested,
                    reason: format!(
                        "requires both {} and {} to be held",
                        pair.track_a, pair.track_b
                    ),
                });
            }
            return self.substitute(current, requested);
        }

        if let Some(parent) = self.graph.combination_parent_of(requested)? {
            if let Some(sibling) = self.graph.sibling_of(requested)? {
                if current.contains(&sibling) {
                    return self.substitute(current, parent);
                }
            }
        }

        let mut next = current.clone();
        for redundant in self.graph.removal_set_of(requested)? {
            next.remove(redundant);
        }
        next.insert(requested);
        Ok(next)
    }

    fn substitute(
        &self,
        current: &BTreeSet<MarkerKey>,
        combined: MarkerKey,
    ) -> GrantResult<BTreeSet<MarkerKey>> {
        let mut next = current.clone();
        for redundant in self.graph.removal_set_of(combined)? {
            next.remove(redundant);
        }
        if let Some(pair) = self.graph.prerequisite_pair_of(combined)? {
            for member in pair.members() {
                next.remove(&member);
            }
        }
        next.insert(combined);
        Ok(next)
    }
}
