//! Role graph: the immutable hierarchy every planner consults.
//!
//! A [`RoleGraph`] is built once at startup from a [`RoleCatalog`] and never
//! mutated afterwards. It answers placement questions (which track, which
//! tier), prerequisite questions (which combined marker a pair earns) and
//! redundancy questions (which markers a held marker makes obsolete).
//!
//! Construction validates the catalog so that lookups can rely on its shape:
//! every tier sits on exactly one track, every combined tier has a pair, and
//! every removal set covers the lower tiers it must strip.

pub mod catalog;

use std::collections::{BTreeMap, BTreeSet, HashMap};

pub use catalog::{CombinationSpec, DpmThreshold, RoleCatalog, TrackSpec};

use crate::error::GraphError;
use crate::marker::{MarkerKey, Track};

/// Result type for role graph lookups.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// The two track tiers that together earn a combined tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrerequisitePair {
    pub track_a: MarkerKey,
    pub track_b: MarkerKey,
}

impl PrerequisitePair {
    /// The other member of the pair, if `marker` is a member.
    pub fn sibling_of(&self, marker: MarkerKey) -> Option<MarkerKey> {
        if marker == self.track_a {
            Some(self.track_b)
        } else if marker == self.track_b {
            Some(self.track_a)
        } else {
            None
        }
    }

    pub fn contains(&self, marker: MarkerKey) -> bool {
        marker == self.track_a || marker == self.track_b
    }

    pub fn members(&self) -> [MarkerKey; 2] {
        [self.track_a, self.track_b]
    }
}

#[derive(Debug, Clone)]
struct Ladder {
    tiers: Vec<MarkerKey>,
    floor: Option<MarkerKey>,
}

/// Validated, immutable role hierarchy.
#[derive(Debug, Clone)]
pub struct RoleGraph {
    ladders: BTreeMap<Track, Ladder>,
    placement: HashMap<MarkerKey, (Track, usize)>,
    pairs: HashMap<MarkerKey, PrerequisitePair>,
    parents: HashMap<MarkerKey, MarkerKey>,
    removals: HashMap<MarkerKey, BTreeSet<MarkerKey>>,
    cosmetics: BTreeSet<MarkerKey>,
    /// Sorted by tier, weakest first.
    dpm_thresholds: Vec<(MarkerKey, u32)>,
    catalog: RoleCatalog,
}

impl RoleGraph {
    /// Build the graph for the built-in catalog.
    pub fn standard() -> Self {
        Self::from_catalog(RoleCatalog::standard()).expect("built-in role catalog is valid")
    }

    /// Validate a catalog and build the lookup tables.
    pub fn from_catalog(catalog: RoleCatalog) -> GraphResult<Self> {
        let mut ladders = BTreeMap::new();
        let mut placement: HashMap<MarkerKey, (Track, usize)> = HashMap::new();

        for def in &catalog.tracks {
            if def.tiers.is_empty() {
                return Err(GraphError::invalid(format!("track {} has no tiers", def.track)));
            }
            if ladders.contains_key(&def.track) {
                return Err(GraphError::invalid(format!("track {} declared twice", def.track)));
            }
            for (index, marker) in def.tiers.iter().enumerate() {
                if let Some((other, _)) = placement.insert(*marker, (def.track, index)) {
                    return Err(GraphError::invalid(format!(
                        "{marker} appears on both {other} and {}",
                        def.track
                    )));
                }
            }
            ladders.insert(
                def.track,
                Ladder {
                    tiers: def.tiers.clone(),
                    floor: def.floor,
                },
            );
        }

        for def in &catalog.tracks {
            if let Some(floor) = def.floor {
                match placement.get(&floor) {
                    None => {
                        return Err(GraphError::invalid(format!(
                            "floor {floor} of {} is not a tier of any track",
                            def.track
                        )));
                    }
                    Some((track, _)) if *track == def.track => {
                        return Err(GraphError::invalid(format!(
                            "floor {floor} of {} lies on its own track",
                            def.track
                        )));
                    }
                    Some((Track::Combined, _)) => {
                        return Err(GraphError::invalid(format!(
                            "floor {floor} of {} is a combined tier and cannot be granted directly",
                            def.track
                        )));
                    }
                    Some(_) => {}
                }
            }
        }

        let mut cosmetics = BTreeSet::new();
        for marker in &catalog.cosmetics {
            if placement.contains_key(marker) {
                return Err(GraphError::invalid(format!(
                    "{marker} is listed both as cosmetic and as a tier"
                )));
            }
            if !cosmetics.insert(*marker) {
                return Err(GraphError::invalid(format!("cosmetic {marker} listed twice")));
            }
        }

        let (pairs, parents) = Self::validate_combinations(&catalog, &placement, &ladders)?;

        let mut removals: HashMap<MarkerKey, BTreeSet<MarkerKey>> = placement
            .keys()
            .chain(cosmetics.iter())
            .map(|m| (*m, BTreeSet::new()))
            .collect();
        for (marker, redundant) in &catalog.removals {
            let Some(&(track, index)) = placement.get(marker) else {
                return Err(GraphError::invalid(format!(
                    "removal set declared for {marker}, which is not a tier"
                )));
            };
            let set = removals.entry(*marker).or_default();
            for other in redundant {
                if other == marker {
                    return Err(GraphError::invalid(format!("{marker} lists itself as redundant")));
                }
                match placement.get(other) {
                    None if cosmetics.contains(other) => {
                        return Err(GraphError::invalid(format!(
                            "{marker} would strip cosmetic {other}"
                        )));
                    }
                    None => {
                        return Err(GraphError::invalid(format!(
                            "{marker} lists {other}, which is not in the catalog"
                        )));
                    }
                    Some(&(other_track, other_index)) => {
                        if other_track == track && other_index > index {
                            return Err(GraphError::invalid(format!(
                                "{marker} would strip the higher tier {other}"
                            )));
                        }
                    }
                }
                set.insert(*other);
            }
        }

        Self::validate_coverage(&ladders, &pairs, &placement, &removals)?;
        let dpm_thresholds = Self::validate_thresholds(&catalog, &placement)?;

        Ok(Self {
            ladders,
            placement,
            pairs,
            parents,
            removals,
            cosmetics,
            dpm_thresholds,
            catalog,
        })
    }

    fn validate_combinations(
        catalog: &RoleCatalog,
        placement: &HashMap<MarkerKey, (Track, usize)>,
        ladders: &BTreeMap<Track, Ladder>,
    ) -> GraphResult<(HashMap<MarkerKey, PrerequisitePair>, HashMap<MarkerKey, MarkerKey>)> {
        let mut pairs = HashMap::new();
        let mut parents = HashMap::new();

        for combo in &catalog.combinations {
            match placement.get(&combo.combined) {
                Some((Track::Combined, _)) => {}
                _ => {
                    return Err(GraphError::invalid(format!(
                        "{} is not a tier of the combined track",
                        combo.combined
                    )));
                }
            }
            let [a, b] = combo.pair;
            let (Some(&(track_a, _)), Some(&(track_b, _))) = (placement.get(&a), placement.get(&b))
            else {
                return Err(GraphError::invalid(format!(
                    "prerequisites of {} must both be track tiers",
                    combo.combined
                )));
            };
            if track_a == track_b || track_a == Track::Combined || track_b == Track::Combined {
                return Err(GraphError::invalid(format!(
                    "prerequisites of {} must sit on two distinct non-combined tracks",
                    combo.combined
                )));
            }
            for member in combo.pair {
                if let Some(existing) = parents.insert(member, combo.combined) {
                    return Err(GraphError::invalid(format!(
                        "{member} earns both {existing} and {}",
                        combo.combined
                    )));
                }
            }
            let pair = PrerequisitePair {
                track_a: a,
                track_b: b,
            };
            if pairs.insert(combo.combined, pair).is_some() {
                return Err(GraphError::invalid(format!(
                    "{} has two prerequisite pairs",
                    combo.combined
                )));
            }
        }

        if let Some(ladder) = ladders.get(&Track::Combined) {
            let mut previous: Option<PrerequisitePair> = None;
            for combined in &ladder.tiers {
                let pair = pairs.get(combined).copied().ok_or_else(|| {
                    GraphError::invalid(format!(
                        "combined tier {combined} has no prerequisite pair"
                    ))
                })?;
                if let Some(prev) = previous {
                    let rises = |lower: MarkerKey, upper: MarkerKey| {
                        let (lt, li) = placement[&lower];
                        let (ut, ui) = placement[&upper];
                        lt == ut && ui > li
                    };
                    let aligned = (rises(prev.track_a, pair.track_a)
                        && rises(prev.track_b, pair.track_b))
                        || (rises(prev.track_a, pair.track_b) && rises(prev.track_b, pair.track_a));
                    if !aligned {
                        return Err(GraphError::invalid(format!(
                            "prerequisites of {combined} do not rise above those of the tier below"
                        )));
                    }
                }
                previous = Some(pair);
            }
        }

        Ok((pairs, parents))
    }

    /// Every tier's removal set must strip the tiers it supersedes, so that
    /// granting through the resolver keeps one tier per track.
    fn validate_coverage(
        ladders: &BTreeMap<Track, Ladder>,
        pairs: &HashMap<MarkerKey, PrerequisitePair>,
        placement: &HashMap<MarkerKey, (Track, usize)>,
        removals: &HashMap<MarkerKey, BTreeSet<MarkerKey>>,
    ) -> GraphResult<()> {
        for ladder in ladders.values() {
            for (index, marker) in ladder.tiers.iter().enumerate() {
                let set = &removals[marker];
                let mut required: Vec<MarkerKey> = ladder.tiers[..index].to_vec();
                if let Some(pair) = pairs.get(marker) {
                    for member in pair.members() {
                        let (track, member_index) = placement[&member];
                        required.extend_from_slice(&ladders[&track].tiers[..=member_index]);
                    }
                }
                if let Some(missing) = required.iter().find(|m| !set.contains(m)) {
                    return Err(GraphError::invalid(format!(
                        "removal set of {marker} must include {missing}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_thresholds(
        catalog: &RoleCatalog,
        placement: &HashMap<MarkerKey, (Track, usize)>,
    ) -> GraphResult<Vec<(MarkerKey, u32)>> {
        let mut ranked = Vec::with_capacity(catalog.dpm_thresholds.len());
        for threshold in &catalog.dpm_thresholds {
            match placement.get(&threshold.marker) {
                Some(&(Track::Dpm, index)) => {
                    ranked.push((index, threshold.marker, threshold.min_kdpm));
                }
                _ => {
                    return Err(GraphError::invalid(format!(
                        "DPM threshold declared for {}, which is not a DPM tier",
                        threshold.marker
                    )));
                }
            }
        }
        ranked.sort_by_key(|(index, _, _)| *index);
        for window in ranked.windows(2) {
            if window[0].0 == window[1].0 || window[1].2 <= window[0].2 {
                return Err(GraphError::invalid(format!(
                    "DPM threshold for {} must exceed that of {}",
                    window[1].1, window[0].1
                )));
            }
        }
        Ok(ranked.into_iter().map(|(_, marker, min)| (marker, min)).collect())
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    /// Whether the marker is part of this catalog.
    pub fn contains(&self, marker: MarkerKey) -> bool {
        self.placement.contains_key(&marker) || self.cosmetics.contains(&marker)
    }

    /// Fail with `UnknownMarker` unless the marker is in the catalog.
    pub fn ensure_known(&self, marker: MarkerKey) -> GraphResult<()> {
        if self.contains(marker) {
            Ok(())
        } else {
            Err(GraphError::unknown(marker))
        }
    }

    /// The marker's track, or `None` for cosmetics.
    pub fn track_of(&self, marker: MarkerKey) -> GraphResult<Option<Track>> {
        self.ensure_known(marker)?;
        Ok(self.placement.get(&marker).map(|(track, _)| *track))
    }

    /// Position of `marker` within `track`, weakest tier at 0.
    pub fn tier_index(&self, track: Track, marker: MarkerKey) -> GraphResult<usize> {
        self.ensure_known(marker)?;
        match self.placement.get(&marker) {
            Some(&(t, index)) if t == track => Ok(index),
            _ => Err(GraphError::NotOnTrack { marker, track }),
        }
    }

    /// Tiers of a track, weakest first. Empty if the track is not configured.
    pub fn tiers(&self, track: Track) -> &[MarkerKey] {
        self.ladders
            .get(&track)
            .map(|l| l.tiers.as_slice())
            .unwrap_or(&[])
    }

    /// Configured tracks, in `Track` order.
    pub fn tracks(&self) -> impl Iterator<Item = Track> + '_ {
        self.ladders.keys().copied()
    }

    /// Demotion floor below the lowest tier of a track.
    pub fn floor_of(&self, track: Track) -> Option<MarkerKey> {
        self.ladders.get(&track).and_then(|l| l.floor)
    }

    /// Every marker made redundant by holding `marker`.
    pub fn removal_set_of(&self, marker: MarkerKey) -> GraphResult<&BTreeSet<MarkerKey>> {
        self.removals
            .get(&marker)
            .ok_or_else(|| GraphError::unknown(marker))
    }

    /// The pair of track tiers a combined marker is earned by.
    pub fn prerequisite_pair_of(
        &self,
        combined: MarkerKey,
    ) -> GraphResult<Option<PrerequisitePair>> {
        self.ensure_known(combined)?;
        Ok(self.pairs.get(&combined).copied())
    }

    /// The combined marker a track tier contributes to.
    pub fn combination_parent_of(&self, marker: MarkerKey) -> GraphResult<Option<MarkerKey>> {
        self.ensure_known(marker)?;
        Ok(self.parents.get(&marker).copied())
    }

    /// The opposite-track tier that pairs with `marker`.
    pub fn sibling_of(&self, marker: MarkerKey) -> GraphResult<Option<MarkerKey>> {
        let Some(parent) = self.combination_parent_of(marker)? else {
            return Ok(None);
        };
        Ok(self.pairs.get(&parent).and_then(|p| p.sibling_of(marker)))
    }

    /// One tier below `marker`, falling through to the track floor.
    ///
    /// `None` means the marker is already at the bottom (or is cosmetic).
    pub fn next_lower(&self, marker: MarkerKey) -> GraphResult<Option<MarkerKey>> {
        self.ensure_known(marker)?;
        let Some(&(track, index)) = self.placement.get(&marker) else {
            return Ok(None);
        };
        if index > 0 {
            return Ok(Some(self.ladders[&track].tiers[index - 1]));
        }
        Ok(self.floor_of(track).filter(|floor| *floor != marker))
    }

    /// Highest tier position on `track` implied by the held markers.
    ///
    /// A held combined marker projects onto each prerequisite track at its
    /// pair member's position. Markers outside the catalog are ignored.
    pub fn projected_index(&self, held: &BTreeSet<MarkerKey>, track: Track) -> Option<usize> {
        held.iter()
            .filter_map(|marker| {
                let &(own_track, index) = self.placement.get(marker)?;
                if own_track == track {
                    return Some(index);
                }
                let pair = self.pairs.get(marker)?;
                pair.members().into_iter().find_map(|member| {
                    let (member_track, member_index) = self.placement[&member];
                    (member_track == track).then_some(member_index)
                })
            })
            .max()
    }

    /// Whether the held markers already imply `marker` or something above it
    /// on the same track.
    pub fn dominates(&self, held: &BTreeSet<MarkerKey>, marker: MarkerKey) -> GraphResult<bool> {
        self.ensure_known(marker)?;
        let Some(&(track, index)) = self.placement.get(&marker) else {
            return Ok(held.contains(&marker));
        };
        Ok(self
            .projected_index(held, track)
            .is_some_and(|projected| projected >= index))
    }

    /// Whether the marker is cosmetic (outside every track).
    pub fn is_cosmetic(&self, marker: MarkerKey) -> bool {
        self.cosmetics.contains(&marker)
    }

    /// Cosmetic markers, in key order.
    pub fn cosmetics(&self) -> impl Iterator<Item = MarkerKey> + '_ {
        self.cosmetics.iter().copied()
    }

    /// Whether approved reports can be filed against `marker`.
    ///
    /// Matchmaking tiers (duo, 3-7 and combined) are reportable. DPM tiers
    /// are earned by measured damage and cosmetics carry no rank.
    pub fn is_reportable(&self, marker: MarkerKey) -> GraphResult<bool> {
        Ok(matches!(
            self.track_of(marker)?,
            Some(Track::Duo | Track::ThreeSeven | Track::Combined)
        ))
    }

    /// Best DPM tier whose threshold `kdpm` meets.
    pub fn dpm_tier_for(&self, kdpm: f64) -> Option<MarkerKey> {
        self.dpm_thresholds
            .iter()
            .rev()
            .find(|(_, min)| kdpm >= f64::from(*min))
            .map(|(marker, _)| *marker)
    }

    /// Lowest DPM threshold, if any are configured.
    pub fn lowest_dpm_threshold(&self) -> Option<u32> {
        self.dpm_thresholds.first().map(|(_, min)| *min)
    }

    /// The catalog this graph was built from.
    pub fn catalog(&self) -> &RoleCatalog {
        &self.catalog
    }
}

impl Default for RoleGraph {
    fn default() -> Self {
        Self::standard()
    }
}
