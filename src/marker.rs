//! Core identifier types: markers, tracks and participants.
//!
//! A [`MarkerKey`] names one grantable role. The set is closed: every key the
//! community hands out is a variant here, and the string form used in
//! catalogs, CLI arguments and ledger rows is the canonical camelCase key.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Identifier of one grantable role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum MarkerKey {
    // Matchmaking tiers.
    NoRealm,
    DuoRootskips,
    ThreeSevenRootskips,
    Rootskips,
    DuoExperienced,
    ThreeSevenExperienced,
    Experienced,
    DuoMaster,
    ThreeSevenMaster,
    Master,
    DuoGrandmaster,
    ThreeSevenGrandmaster,
    Grandmaster,

    // DPM application tiers.
    Initiate,
    Adept,
    Mastery,
    Extreme,

    // Cosmetics.
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
}

impl MarkerKey {
    /// Every marker, in declaration order.
    pub const ALL: [MarkerKey; 36] = [
        Self::NoRealm,
        Self::DuoRootskips,
        Self::ThreeSevenRootskips,
        Self::Rootskips,
        Self::DuoExperienced,
        Self::ThreeSevenExperienced,
        Self::Experienced,
        Self::DuoMaster,
        Self::ThreeSevenMaster,
        Self::Master,
        Self::DuoGrandmaster,
        Self::ThreeSevenGrandmaster,
        Self::Grandmaster,
        Self::Initiate,
        Self::Adept,
        Self::Mastery,
        Self::Extreme,
        Self::VerifiedLearner,
        Self::SolakWrHolder,
        Self::ErethdorsBane,
        Self::SolakRookie,
        Self::SolakCasual,
        Self::SolakEnthusiast,
        Self::SolakAddict,
        Self::UnlockedPerdita,
        Self::SolakFanatic,
        Self::SolakSlave,
        Self::SolakSimp,
        Self::SolakLegend,
        Self::NightOutWithMyRightHand,
        Self::ProbablyUsesSpecialScissors,
        Self::OneForTheBooks,
        Self::BrokenPrinter,
        Self::MerethielsSimp,
        Self::ShroomDealer,
        Self::GuardianOfTheGrove,
    ];

    /// Canonical string key.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoRealm => "noRealm",
            Self::DuoRootskips => "duoRootskips",
            Self::ThreeSevenRootskips => "threeSevenRootskips",
            Self::Rootskips => "rootskips",
            Self::DuoExperienced => "duoExperienced",
            Self::ThreeSevenExperienced => "threeSevenExperienced",
            Self::Experienced => "experienced",
            Self::DuoMaster => "duoMaster",
            Self::ThreeSevenMaster => "threeSevenMaster",
            Self::Master => "master",
            Self::DuoGrandmaster => "duoGrandmaster",
            Self::ThreeSevenGrandmaster => "threeSevenGrandmaster",
            Self::Grandmaster => "grandmaster",
            Self::Initiate => "initiate",
            Self::Adept => "adept",
            Self::Mastery => "mastery",
            Self::Extreme => "extreme",
            Self::VerifiedLearner => "verifiedLearner",
            Self::SolakWrHolder => "solakWRHolder",
            Self::ErethdorsBane => "erethdorsBane",
            Self::SolakRookie => "solakRookie",
            Self::SolakCasual => "solakCasual",
            Self::SolakEnthusiast => "solakEnthusiast",
            Self::SolakAddict => "solakAddict",
            Self::UnlockedPerdita => "unlockedPerdita",
            Self::SolakFanatic => "solakFanatic",
            Self::SolakSlave => "solakSlave",
            Self::SolakSimp => "solakSimp",
            Self::SolakLegend => "solakLegend",
            Self::NightOutWithMyRightHand => "nightOutWithMyRightHand",
            Self::ProbablyUsesSpecialScissors => "probablyUsesSpecialScissors",
            Self::OneForTheBooks => "oneForTheBooks",
            Self::BrokenPrinter => "brokenPrinter",
            Self::MerethielsSimp => "merethielsSimp",
            Self::ShroomDealer => "shroomDealer",
            Self::GuardianOfTheGrove => "guardianOfTheGrove",
        }
    }
}

impl std::fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarkerKey {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| GraphError::UnknownMarker { key: s.to_string() })
    }
}

impl From<MarkerKey> for &'static str {
    fn from(marker: MarkerKey) -> Self {
        marker.as_str()
    }
}

impl TryFrom<String> for MarkerKey {
    type Error = GraphError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A tier ladder. Markers on one track are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Track {
    /// Duo matchmaking tiers.
    Duo,
    /// 3-7 man matchmaking tiers.
    ThreeSeven,
    /// Track-independent tiers derived from matching duo + 3-7 tiers.
    Combined,
    /// Damage-per-minute application tiers.
    Dpm,
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duo => write!(f, "duo"),
            Self::ThreeSeven => write!(f, "threeSeven"),
            Self::Combined => write!(f, "combined"),
            Self::Dpm => write!(f, "dpm"),
        }
    }
}

/// Platform identifier of a community member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ParticipantId(u64);

impl ParticipantId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ParticipantId {
    type Err = std::num::ParseIntError;

    /// Accepts a bare id (`1234`) or a mention (`<@1234>`, `<@!1234>`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let raw = trimmed
            .strip_prefix("<@")
            .and_then(|rest| rest.strip_suffix('>'))
            .map(|id| id.strip_prefix('!').unwrap_or(id))
            .unwrap_or(trimmed);
        raw.parse().map(Self)
    }
}
