//! Role catalog: the declarative description a [`RoleGraph`](super::RoleGraph) is built from.
//!
//! The catalog is plain data so it can be exported to and loaded from TOML.
//! [`RoleCatalog::standard`] is the community's built-in hierarchy.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::marker::{MarkerKey, Track};

/// One tier ladder, weakest tier first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSpec {
    pub track: Track,
    pub tiers: Vec<MarkerKey>,
    /// Marker granted when the lowest tier of this track is demoted.
    #[serde(default)]
    pub floor: Option<MarkerKey>,
}

/// A combined tier and the two track tiers that earn it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinationSpec {
    pub combined: MarkerKey,
    pub pair: [MarkerKey; 2],
}

/// Minimum damage per minute (in thousands) that qualifies for a DPM tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpmThreshold {
    pub marker: MarkerKey,
    pub min_kdpm: u32,
}

/// Declarative role hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCatalog {
    /// Markers outside every track. Granted unconditionally.
    #[serde(default)]
    pub cosmetics: Vec<MarkerKey>,
    pub tracks: Vec<TrackSpec>,
    #[serde(default)]
    pub combinations: Vec<CombinationSpec>,
    /// Markers made redundant by holding the key marker.
    #[serde(default)]
    pub removals: BTreeMap<MarkerKey, Vec<MarkerKey>>,
    #[serde(default)]
    pub dpm_thresholds: Vec<DpmThreshold>,
}

impl RoleCatalog {
    /// The built-in matchmaking, DPM and cosmetic hierarchy.
    pub fn standard() -> Self {
        use MarkerKey::*;

        let duo = vec![DuoRootskips, DuoExperienced, DuoMaster, DuoGrandmaster];
        let three_seven = vec![
            NoRealm,
            ThreeSevenRootskips,
            ThreeSevenExperienced,
            ThreeSevenMaster,
            ThreeSevenGrandmaster,
        ];
        let combined = vec![Rootskips, Experienced, Master, Grandmaster];
        let dpm = vec![Initiate, Adept, Mastery, Extreme];

        let mut removals = BTreeMap::new();
        for ladder in [&duo, &three_seven, &dpm] {
            for (i, marker) in ladder.iter().enumerate().skip(1) {
                removals.insert(*marker, ladder[..i].to_vec());
            }
        }

        // Combined tiers line up with duo[i] and three_seven[i + 1] (noRealm sits below).
        let mut combinations = Vec::with_capacity(combined.len());
        for (i, marker) in combined.iter().enumerate() {
            let pair = [duo[i], three_seven[i + 1]];
            let mut redundant = combined[..i].to_vec();
            redundant.extend_from_slice(&duo[..=i]);
            redundant.extend_from_slice(&three_seven[..=i + 1]);
            removals.insert(*marker, redundant);
            combinations.push(CombinationSpec {
                combined: *marker,
                pair,
            });
        }

        Self {
            cosmetics: vec![
                VerifiedLearner,
                SolakWrHolder,
                ErethdorsBane,
                SolakRookie,
                SolakCasual,
                SolakEnthusiast,
                SolakAddict,
                UnlockedPerdita,
                SolakFanatic,
                SolakSlave,
                SolakSimp,
                SolakLegend,
                NightOutWithMyRightHand,
                ProbablyUsesSpecialScissors,
                OneForTheBooks,
                BrokenPrinter,
                MerethielsSimp,
                ShroomDealer,
                GuardianOfTheGrove,
            ],
            tracks: vec![
                TrackSpec {
                    track: Track::Duo,
                    tiers: duo,
                    floor: Some(NoRealm),
                },
                TrackSpec {
                    track: Track::ThreeSeven,
                    tiers: three_seven,
                    floor: None,
                },
                TrackSpec {
                    track: Track::Combined,
                    tiers: combined,
                    floor: Some(NoRealm),
                },
                TrackSpec {
                    track: Track::Dpm,
                    tiers: dpm,
                    floor: None,
                },
            ],
            combinations,
            removals,
            dpm_thresholds: vec![
                DpmThreshold {
                    marker: Initiate,
                    min_kdpm: 270,
                },
                DpmThreshold {
                    marker: Adept,
                    min_kdpm: 330,
                },
                DpmThreshold {
                    marker: Mastery,
                    min_kdpm: 410,
                },
                DpmThreshold {
                    marker: Extreme,
                    min_kdpm: 475,
                },
            ],
        }
    }

    /// Parse a catalog from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Render the catalog as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Encode {
            message: e.to_string(),
        })
    }
}

impl Default for RoleCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_combined_removals_cover_both_tracks() {
        let catalog = RoleCatalog::standard();
        let master = &catalog.removals[&MarkerKey::Master];
        for expected in [
            MarkerKey::NoRealm,
            MarkerKey::Rootskips,
            MarkerKey::Experienced,
            MarkerKey::DuoRootskips,
            MarkerKey::DuoExperienced,
            MarkerKey::DuoMaster,
            MarkerKey::ThreeSevenRootskips,
            MarkerKey::ThreeSevenExperienced,
            MarkerKey::ThreeSevenMaster,
        ] {
            assert!(master.contains(&expected), "master should strip {expected}");
        }
        assert!(!master.contains(&MarkerKey::DuoGrandmaster));
        assert!(!catalog.removals.contains_key(&MarkerKey::DuoRootskips));
    }

    #[test]
    fn toml_export_loads_back() {
        let catalog = RoleCatalog::standard();
        let text = catalog.to_toml().unwrap();
        assert!(text.contains("threeSevenGrandmaster"));

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("catalog.toml");
        std::fs::write(&path, text).unwrap();
        assert_eq!(RoleCatalog::from_toml_file(&path).unwrap(), catalog);
    }

    #[test]
    fn malformed_toml_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "tracks = [ { track = \"duo\", tiers = [\"duoKing\"] } ]").unwrap();
        let err = RoleCatalog::from_toml_file(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Parse { ref path, .. } if path.ends_with("broken.toml")
        ));
    }
}
