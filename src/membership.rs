//! Membership authority: where participants' markers actually live.
//!
//! The engine never caches marker sets. It reads a fresh snapshot through
//! [`MembershipAuthority::markers`] before every resolution and writes back
//! through `add` / `remove`, both of which must be idempotent.

use std::collections::BTreeSet;

use dashmap::DashMap;

use crate::error::MembershipError;
use crate::marker::{MarkerKey, ParticipantId};

/// Result type for membership operations.
pub type MembershipResult<T> = std::result::Result<T, MembershipError>;

/// The external system of record for participant markers.
pub trait MembershipAuthority: Send + Sync {
    /// Current markers of a participant. Unknown participants hold none.
    fn markers(&self, participant: ParticipantId) -> MembershipResult<BTreeSet<MarkerKey>>;

    /// Grant a marker. Adding a held marker is a no-op.
    fn add(&self, participant: ParticipantId, marker: MarkerKey) -> MembershipResult<()>;

    /// Withdraw a marker. Removing an absent marker is a no-op.
    fn remove(&self, participant: ParticipantId, marker: MarkerKey) -> MembershipResult<()>;
}

/// Reference authority keeping marker sets in a DashMap.
#[derive(Debug, Default)]
pub struct InMemoryMembership {
    members: DashMap<ParticipantId, BTreeSet<MarkerKey>>,
}

impl InMemoryMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style seeding for tests and the CLI.
    pub fn with(self, participant: ParticipantId, markers: &[MarkerKey]) -> Self {
        self.seed(participant, markers);
        self
    }

    /// Replace a participant's markers.
    pub fn seed(&self, participant: ParticipantId, markers: &[MarkerKey]) {
        self.members
            .insert(participant, markers.iter().copied().collect());
    }

    /// Copy of a participant's markers.
    pub fn snapshot(&self, participant: ParticipantId) -> BTreeSet<MarkerKey> {
        self.members
            .get(&participant)
            .map(|set| set.clone())
            .unwrap_or_default()
    }
}

impl MembershipAuthority for InMemoryMembership {
    fn markers(&self, participant: ParticipantId) -> MembershipResult<BTreeSet<MarkerKey>> {
        Ok(self.snapshot(participant))
    }

    fn add(&self, participant: ParticipantId, marker: MarkerKey) -> MembershipResult<()> {
        self.members.entry(participant).or_default().insert(marker);
        Ok(())
    }

    fn remove(&self, participant: ParticipantId, marker: MarkerKey) -> MembershipResult<()> {
        if let Some(mut set) = self.members.get_mut(&participant) {
            set.remove(&marker);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_are_idempotent() {
        let members = InMemoryMembership::new();
        let p = ParticipantId::new(1);
        members.add(p, MarkerKey::DuoMaster).unwrap();
        members.add(p, MarkerKey::DuoMaster).unwrap();
        assert_eq!(members.markers(p).unwrap().len(), 1);

        members.remove(p, MarkerKey::DuoMaster).unwrap();
        members.remove(p, MarkerKey::DuoMaster).unwrap();
        assert!(members.markers(p).unwrap().is_empty());
    }

    #[test]
    fn unknown_participant_holds_nothing() {
        let members = InMemoryMembership::new().with(ParticipantId::new(2), &[MarkerKey::Master]);
        assert!(members.markers(ParticipantId::new(3)).unwrap().is_empty());
        members.remove(ParticipantId::new(3), MarkerKey::Master).unwrap();
        assert!(members.snapshot(ParticipantId::new(2)).contains(&MarkerKey::Master));
    }
}
