//! Best-effort announcements of grants and demotions.
//!
//! Delivery failures never fail the operation that triggered them: the
//! mutation has already been applied by the time anyone is notified.

use serde::{Deserialize, Serialize};

use crate::error::NotificationError;
use crate::marker::{MarkerKey, ParticipantId};
use crate::plan::MutationPlan;

/// Which event produced a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantSource {
    /// Passed a trial run by `host`.
    TrialPass { host: ParticipantId },
    /// Approved application (DPM or cosmetic).
    Application,
    /// Granted directly by a moderator.
    Manual,
}

impl std::fmt::Display for GrantSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TrialPass { host } => write!(f, "trial pass hosted by <@{host}>"),
            Self::Application => write!(f, "application"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Something worth telling the community about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Announcement {
    Granted {
        participant: ParticipantId,
        marker: MarkerKey,
        /// Combined marker awarded by substitution, if any.
        also: Option<MarkerKey>,
        source: GrantSource,
    },
    Demoted {
        participant: ParticipantId,
        reported: MarkerKey,
        plan: MutationPlan,
    },
}

impl Announcement {
    pub fn participant(&self) -> ParticipantId {
        match self {
            Self::Granted { participant, .. } | Self::Demoted { participant, .. } => *participant,
        }
    }
}

impl std::fmt::Display for Announcement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Granted {
                participant,
                marker,
                also: Some(combined),
                ..
            } => write!(f, "<@{participant}> earned {marker} and with it {combined}"),
            Self::Granted {
                participant,
                marker,
                ..
            } => write!(f, "<@{participant}> earned {marker}"),
            Self::Demoted {
                participant,
                reported,
                plan,
            } => write!(f, "<@{participant}> was demoted from {reported} ({plan})"),
        }
    }
}

/// Announcement sink.
pub trait Notifier: Send + Sync {
    fn notify(&self, announcement: &Announcement) -> Result<(), NotificationError>;
}

/// Notifier that writes announcements to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, announcement: &Announcement) -> Result<(), NotificationError> {
        tracing::info!(participant = %announcement.participant(), "{announcement}");
        Ok(())
    }
}

/// Deliver an announcement, logging and swallowing any failure.
///
/// Returns whether the announcement was delivered.
pub fn deliver(notifier: &dyn Notifier, announcement: &Announcement) -> bool {
    match notifier.notify(announcement) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                participant = %announcement.participant(),
                error = %e,
                "announcement not delivered"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Refusing;

    impl Notifier for Refusing {
        fn notify(&self, announcement: &Announcement) -> Result<(), NotificationError> {
            Err(NotificationError::Undeliverable {
                participant: announcement.participant(),
                message: "channel missing".into(),
            })
        }
    }

    fn granted(also: Option<MarkerKey>) -> Announcement {
        Announcement::Granted {
            participant: ParticipantId::new(5),
            marker: MarkerKey::ThreeSevenMaster,
            also,
            source: GrantSource::TrialPass {
                host: ParticipantId::new(6),
            },
        }
    }

    #[test]
    fn failures_are_swallowed() {
        assert!(!deliver(&Refusing, &granted(None)));
        assert!(deliver(&TracingNotifier, &granted(None)));
    }

    #[test]
    fn display_mentions_combined_marker() {
        assert_eq!(
            granted(Some(MarkerKey::Master)).to_string(),
            "<@5> earned threeSevenMaster and with it master"
        );
        assert_eq!(granted(None).to_string(), "<@5> earned threeSevenMaster");
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(granted(None)).unwrap();
        assert_eq!(json["kind"], "granted");
        assert_eq!(json["source"]["trial_pass"]["host"], 6);
        assert_eq!(
            serde_json::to_value(GrantSource::Manual).unwrap(),
            serde_json::json!("manual")
        );
        assert_eq!(json["marker"], "threeSevenMaster");
    }
}
