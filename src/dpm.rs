//! DPM applications: kill time and damage in, qualifying tier out.
//!
//! Damage per minute is reported in thousands, rounded to two decimals
//! (`1_850_000` damage over `4:30` is `411.11`k).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::DpmError;
use crate::graph::RoleGraph;
use crate::marker::MarkerKey;

/// Minutes (0-23), seconds (0-59) and an optional tenth of a second.
static KILL_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(0?[0-9]|1[0-9]|2[0-3]):([0-9]|[0-5][0-9])(\.[0-9])?$").unwrap()
});

/// Parse an `m:ss` or `m:ss.t` kill time into fractional minutes.
pub fn parse_kill_time(input: &str) -> Result<f64, DpmError> {
    let invalid = || DpmError::InvalidTime {
        input: input.to_string(),
    };
    let caps = KILL_TIME.captures(input.trim()).ok_or_else(invalid)?;
    let minutes: f64 = caps[1].parse().map_err(|_| invalid())?;
    let whole: f64 = caps[2].parse().map_err(|_| invalid())?;
    let tenth: f64 = match caps.get(3) {
        Some(m) => m.as_str().parse().map_err(|_| invalid())?,
        None => 0.0,
    };
    let total = minutes + (whole + tenth) / 60.0;
    if total <= 0.0 {
        return Err(invalid());
    }
    Ok(total)
}

/// Parse a total damage figure. Underscores and commas are accepted as
/// digit separators.
pub fn parse_damage(input: &str) -> Result<f64, DpmError> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| *c != '_' && *c != ',')
        .collect();
    match cleaned.parse::<f64>() {
        Ok(damage) if damage.is_finite() && damage >= 0.0 => Ok(damage),
        _ => Err(DpmError::InvalidDamage {
            input: input.to_string(),
        }),
    }
}

/// Damage per minute in thousands, rounded to hundredths.
pub fn kdpm(damage: f64, minutes: f64) -> f64 {
    (damage / minutes / 10.0).round() / 100.0
}

/// A scored DPM submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpmAssessment {
    pub damage: f64,
    pub minutes: f64,
    pub kdpm: f64,
    pub tier: MarkerKey,
}

/// Score a submission and pick the best tier it qualifies for.
pub fn assess(graph: &RoleGraph, damage: &str, kill_time: &str) -> Result<DpmAssessment, DpmError> {
    let damage = parse_damage(damage)?;
    let minutes = parse_kill_time(kill_time)?;
    let kdpm = kdpm(damage, minutes);
    let tier = graph.dpm_tier_for(kdpm).ok_or(DpmError::BelowThreshold {
        kdpm,
        lowest: graph.lowest_dpm_threshold().unwrap_or(0),
    })?;
    Ok(DpmAssessment {
        damage,
        minutes,
        kdpm,
        tier,
    })
}
