//! Rich diagnostic error types for the rolewarden engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so operators know exactly
//! what went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

use crate::marker::{MarkerKey, ParticipantId, Track};

/// Top-level error type for the rolewarden engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, sources) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum WardenError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Grant(#[from] GrantError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Membership(#[from] MembershipError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Notification(#[from] NotificationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Dpm(#[from] DpmError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Role graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("unknown marker: {key}")]
    #[diagnostic(
        code(warden::graph::unknown_marker),
        help(
            "The marker is not part of the configured role catalog. \
             Run `rolewarden catalog` to list every known marker key."
        )
    )]
    UnknownMarker { key: String },

    #[error("marker {marker} is not a tier of the {track} track")]
    #[diagnostic(
        code(warden::graph::not_on_track),
        help("Tier positions are only defined within the marker's own track.")
    )]
    NotOnTrack { marker: MarkerKey, track: Track },

    #[error("invalid role catalog: {message}")]
    #[diagnostic(
        code(warden::graph::invalid_catalog),
        help(
            "The role catalog failed startup validation. Every tier, prerequisite \
             pair, removal set and DPM threshold must reference catalog members \
             consistently. Export the built-in catalog with `rolewarden catalog --toml` \
             and compare."
        )
    )]
    InvalidCatalog { message: String },
}

impl GraphError {
    pub(crate) fn unknown(marker: MarkerKey) -> Self {
        Self::UnknownMarker {
            key: marker.as_str().to_string(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidCatalog {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Grant errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GrantError {
    #[error("{marker} cannot be granted here: {reason}")]
    #[diagnostic(
        code(warden::grant::invalid),
        help(
            "Tier markers are granted through the hierarchy resolver; cosmetic markers \
             through the cosmetic path. Combined markers are only awarded once both \
             prerequisite track tiers are held."
        )
    )]
    InvalidGrant { marker: MarkerKey, reason: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

// ---------------------------------------------------------------------------
// Ledger errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LedgerError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(warden::ledger::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(warden::ledger::redb),
        help(
            "The embedded report database encountered a transaction error. \
             The report was not recorded; re-approving it is safe."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(warden::ledger::serde),
        help(
            "A report row could not be encoded or decoded. \
             This usually means the stored format changed between versions."
        )
    )]
    Serialization { message: String },

    #[error("report threshold must be at least 1")]
    #[diagnostic(
        code(warden::ledger::zero_threshold),
        help("Set `report_threshold` to a positive value (the default is 3).")
    )]
    ZeroThreshold,
}

// ---------------------------------------------------------------------------
// Membership errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum MembershipError {
    #[error("failed to read markers of participant {participant}: {message}")]
    #[diagnostic(
        code(warden::membership::read),
        help("The membership authority could not be queried. Retry once it is reachable.")
    )]
    ReadFailure {
        participant: ParticipantId,
        message: String,
    },

    #[error("failed to {op} {marker} for participant {participant}: {message}")]
    #[diagnostic(
        code(warden::membership::apply),
        help(
            "One or more plan operations were not applied. Every operation is \
             idempotent, so re-running the same grant or approval is safe."
        )
    )]
    ApplyFailure {
        participant: ParticipantId,
        op: String,
        marker: MarkerKey,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Notification errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum NotificationError {
    #[error("could not notify participant {participant}: {message}")]
    #[diagnostic(
        code(warden::notify::undeliverable),
        help("Notifications are best effort; the mutation was still applied.")
    )]
    Undeliverable {
        participant: ParticipantId,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Report intake errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ReportError {
    #[error("{marker} is not a reportable tier marker")]
    #[diagnostic(
        code(warden::report::not_reportable),
        help("Reports can only target markers that sit on a tier track.")
    )]
    NotReportable { marker: MarkerKey },

    #[error("participant {subject} holds neither {marker} nor its combination marker")]
    #[diagnostic(
        code(warden::report::not_held),
        help("A participant can only be reported for a tier they currently hold.")
    )]
    NotHeld {
        subject: ParticipantId,
        marker: MarkerKey,
    },

    #[error("participants cannot report themselves")]
    #[diagnostic(
        code(warden::report::self_report),
        help("The reporter and the reported participant must differ.")
    )]
    SelfReport,
}

// ---------------------------------------------------------------------------
// DPM application errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DpmError {
    #[error("kill time \"{input}\" is not formatted as m:ss")]
    #[diagnostic(
        code(warden::dpm::bad_time),
        help("Use minutes and seconds with an optional tenth, e.g. `4:37` or `4:37.2`.")
    )]
    InvalidTime { input: String },

    #[error("damage \"{input}\" is not a number")]
    #[diagnostic(
        code(warden::dpm::bad_damage),
        help("Provide the total damage as a plain number, e.g. `1850000`.")
    )]
    InvalidDamage { input: String },

    #[error("{kdpm}k DPM does not qualify for any tier (lowest is {lowest}k)")]
    #[diagnostic(
        code(warden::dpm::below_threshold),
        help("The submission is below every configured DPM threshold.")
    )]
    BelowThreshold { kdpm: f64, lowest: u32 },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    #[diagnostic(
        code(warden::config::io),
        help("Check that the file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    #[diagnostic(
        code(warden::config::parse),
        help("The file must be valid TOML matching the documented layout.")
    )]
    Parse { path: String, message: String },

    #[error("failed to encode TOML: {message}")]
    #[diagnostic(
        code(warden::config::encode),
        help("The value could not be represented as TOML. This is a bug; please report it.")
    )]
    Encode { message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(warden::config::invalid),
        help("Check the WardenConfig fields. {message}")
    )]
    Invalid { message: String },
}

/// Convenience alias for functions returning rolewarden results.
pub type WardenResult<T> = std::result::Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_converts_to_warden_error() {
        let err = GraphError::unknown(MarkerKey::Master);
        let warden: WardenError = err.into();
        assert!(matches!(
            warden,
            WardenError::Graph(GraphError::UnknownMarker { .. })
        ));
    }

    #[test]
    fn grant_error_wraps_graph_error() {
        let grant: GrantError = GraphError::invalid("empty track").into();
        assert!(matches!(
            grant,
            GrantError::Graph(GraphError::InvalidCatalog { .. })
        ));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = GrantError::InvalidGrant {
            marker: MarkerKey::SolakLegend,
            reason: "cosmetic marker".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("solakLegend"));
        assert!(msg.contains("cosmetic"));

        let err = MembershipError::ApplyFailure {
            participant: ParticipantId::new(42),
            op: "remove".into(),
            marker: MarkerKey::DuoMaster,
            message: "timeout".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("remove duoMaster"));
        assert!(msg.contains("42"));
    }
}
