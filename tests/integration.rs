//! End-to-end integration tests for the rolewarden engine.
//!
//! These tests drive the `Warden` facade with the reference in-memory
//! membership authority and a recording notifier, checking that grants,
//! report approvals and demotions leave participants in consistent states.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use rolewarden::config::WardenConfig;
use rolewarden::error::{GrantError, MembershipError, NotificationError, WardenError};
use rolewarden::ledger::NewReport;
use rolewarden::marker::{MarkerKey, ParticipantId, Track};
use rolewarden::membership::{InMemoryMembership, MembershipAuthority, MembershipResult};
use rolewarden::notify::{Announcement, GrantSource, Notifier};
use rolewarden::warden::Warden;

use MarkerKey::*;

const HOST: ParticipantId = ParticipantId::new(1);

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Announcement>>,
    fail: bool,
}

impl Notifier for Recorder {
    fn notify(&self, announcement: &Announcement) -> Result<(), NotificationError> {
        if self.fail {
            return Err(NotificationError::Undeliverable {
                participant: announcement.participant(),
                message: "announcement channel is gone".into(),
            });
        }
        self.seen.lock().unwrap().push(announcement.clone());
        Ok(())
    }
}

struct Harness {
    warden: Warden,
    members: Arc<InMemoryMembership>,
    recorder: Arc<Recorder>,
}

fn harness_with(members: InMemoryMembership, recorder: Recorder) -> Harness {
    let members = Arc::new(members);
    let recorder = Arc::new(recorder);
    let warden = Warden::new(WardenConfig::default(), members.clone(), recorder.clone()).unwrap();
    Harness {
        warden,
        members,
        recorder,
    }
}

fn harness(p: ParticipantId, held: &[MarkerKey]) -> Harness {
    harness_with(InMemoryMembership::new().with(p, held), Recorder::default())
}

fn set(markers: &[MarkerKey]) -> BTreeSet<MarkerKey> {
    markers.iter().copied().collect()
}

fn report(subject: ParticipantId, marker: MarkerKey, reporter: u64) -> NewReport {
    NewReport::new(subject, marker, ParticipantId::new(reporter))
}

#[test]
fn sibling_grant_substitutes_combined_marker() {
    let p = ParticipantId::new(100);
    let h = harness(p, &[DuoRootskips]);

    let outcome = h
        .warden
        .grant(p, ThreeSevenRootskips, GrantSource::TrialPass { host: HOST })
        .unwrap();
    assert_eq!(outcome.plan.to_string(), "+rootskips -duoRootskips");
    assert_eq!(h.members.snapshot(p), set(&[Rootskips]));

    let seen = h.recorder.seen.lock().unwrap();
    assert_eq!(
        seen.as_slice(),
        &[Announcement::Granted {
            participant: p,
            marker: ThreeSevenRootskips,
            also: Some(Rootskips),
            source: GrantSource::TrialPass { host: HOST },
        }]
    );
}

#[test]
fn masters_on_both_tracks_become_master() {
    let p = ParticipantId::new(101);
    let h = harness(p, &[NoRealm]);
    h.warden.grant(p, DuoMaster, GrantSource::TrialPass { host: HOST }).unwrap();
    h.warden
        .grant(p, ThreeSevenMaster, GrantSource::TrialPass { host: HOST })
        .unwrap();
    assert_eq!(h.members.snapshot(p), set(&[Master]));
}

#[test]
fn repeated_grant_is_a_no_op() {
    let p = ParticipantId::new(102);
    let h = harness(p, &[]);
    h.warden.grant(p, DuoExperienced, GrantSource::Manual).unwrap();
    let again = h.warden.grant(p, DuoExperienced, GrantSource::Manual).unwrap();
    assert!(again.plan.is_empty());
    assert!(!again.announced);
    assert_eq!(h.recorder.seen.lock().unwrap().len(), 1);
}

#[test]
fn lower_grant_under_combined_marker_is_dominated() {
    let p = ParticipantId::new(103);
    let h = harness(p, &[Grandmaster, SolakLegend]);
    let outcome = h.warden.grant(p, DuoMaster, GrantSource::TrialPass { host: HOST }).unwrap();
    assert!(outcome.plan.is_empty());
    assert_eq!(h.members.snapshot(p), set(&[Grandmaster, SolakLegend]));
}

#[test]
fn three_reports_demote_once_and_fourth_starts_over() {
    let p = ParticipantId::new(200);
    let h = harness(p, &[DuoMaster]);

    for (i, reporter) in [1, 2].into_iter().enumerate() {
        let outcome = h.warden.approve_report(report(p, DuoMaster, reporter)).unwrap();
        assert_eq!(outcome.active_count, i as u32 + 1);
        assert!(!outcome.demoted);
    }
    assert_eq!(h.members.snapshot(p), set(&[DuoMaster]));

    let outcome = h.warden.approve_report(report(p, DuoMaster, 3)).unwrap();
    assert!(outcome.threshold_reached && outcome.demoted);
    assert_eq!(outcome.active_count, 0);
    assert_eq!(h.members.snapshot(p), set(&[DuoExperienced]));
    assert_eq!(h.warden.ledger().count_active(p, DuoMaster).unwrap(), 0);

    let outcome = h.warden.approve_report(report(p, DuoMaster, 4)).unwrap();
    assert_eq!(outcome.active_count, 1);
    assert!(!outcome.held && !outcome.demoted);

    let outcome = h.warden.approve_report(report(p, DuoExperienced, 5)).unwrap();
    assert_eq!(outcome.active_count, 1);
    assert!(outcome.held && !outcome.threshold_reached);
    assert_eq!(h.members.snapshot(p), set(&[DuoExperienced]));
}

#[test]
fn rootskips_demotes_to_no_realm() {
    let p = ParticipantId::new(201);
    let h = harness(p, &[Rootskips]);
    for reporter in 1..=3 {
        h.warden.approve_report(report(p, Rootskips, reporter)).unwrap();
    }
    assert_eq!(h.warden.ledger().count_active(p, Rootskips).unwrap(), 0);
    assert_eq!(h.members.snapshot(p), set(&[NoRealm]));
}

#[test]
fn no_realm_is_the_floor() {
    let p = ParticipantId::new(202);
    let h = harness(p, &[NoRealm]);
    let mut last = None;
    for reporter in 1..=3 {
        last = Some(h.warden.approve_report(report(p, NoRealm, reporter)).unwrap());
    }
    let outcome = last.unwrap();
    assert!(outcome.threshold_reached && outcome.floor && !outcome.demoted);
    assert!(outcome.plan.is_empty());
    assert_eq!(h.members.snapshot(p), set(&[NoRealm]));
    assert!(h.recorder.seen.lock().unwrap().is_empty());
}

#[test]
fn grandmaster_demotion_rederives_master() {
    let p = ParticipantId::new(203);
    let h = harness(p, &[Grandmaster]);
    let mut last = None;
    for reporter in 1..=3 {
        last = Some(h.warden.approve_report(report(p, Grandmaster, reporter)).unwrap());
    }
    let outcome = last.unwrap();
    assert_eq!(outcome.targets, vec![DuoMaster, ThreeSevenMaster]);
    assert_eq!(h.members.snapshot(p), set(&[Master]));

    let seen = h.recorder.seen.lock().unwrap();
    assert!(matches!(
        seen.as_slice(),
        [Announcement::Demoted { reported: Grandmaster, .. }]
    ));
}

#[test]
fn track_report_against_combined_holder_splits_it() {
    let p = ParticipantId::new(204);
    let h = harness(p, &[Experienced]);
    let active = h
        .warden
        .check_report(p, ThreeSevenExperienced, ParticipantId::new(9))
        .unwrap();
    assert_eq!(active, 0);
    for reporter in 1..=3 {
        h.warden
            .approve_report(report(p, ThreeSevenExperienced, reporter))
            .unwrap();
    }
    assert_eq!(
        h.members.snapshot(p),
        set(&[DuoExperienced, ThreeSevenRootskips])
    );
}

#[test]
fn reports_for_other_tiers_count_separately() {
    let p = ParticipantId::new(205);
    let h = harness(p, &[DuoMaster, ThreeSevenExperienced]);
    h.warden.approve_report(report(p, DuoMaster, 1)).unwrap();
    h.warden.approve_report(report(p, DuoMaster, 2)).unwrap();
    h.warden
        .approve_report(report(p, ThreeSevenExperienced, 3))
        .unwrap();
    assert_eq!(h.warden.ledger().count_active(p, DuoMaster).unwrap(), 2);
    assert_eq!(h.warden.reports_for(p).unwrap().len(), 3);
    assert_eq!(h.members.snapshot(p), set(&[DuoMaster, ThreeSevenExperienced]));
}

#[test]
fn single_tier_invariant_holds_through_mixed_events() {
    let p = ParticipantId::new(300);
    let h = harness(p, &[]);
    let grants = [
        DuoRootskips,
        ThreeSevenExperienced,
        DuoExperienced,
        ThreeSevenGrandmaster,
        DuoGrandmaster,
        Adept,
        Extreme,
    ];
    let graph = h.warden.graph_arc();
    let check = |held: &BTreeSet<MarkerKey>| {
        for track in graph.tracks() {
            let count = graph.tiers(track).iter().filter(|m| held.contains(m)).count();
            assert!(count <= 1, "{track} holds {count} tiers: {held:?}");
        }
        let combined = graph.tiers(Track::Combined);
        if held.iter().any(|m| combined.contains(m)) {
            for member in held {
                if let Some(parent) = graph.combination_parent_of(*member).unwrap() {
                    assert!(
                        !held.contains(&parent),
                        "{member} held alongside its combined marker {parent}"
                    );
                }
            }
        }
    };

    for marker in grants {
        h.warden.grant(p, marker, GrantSource::TrialPass { host: HOST }).unwrap();
        check(&h.members.snapshot(p));
    }
    assert_eq!(h.members.snapshot(p), set(&[Grandmaster, Extreme]));

    for reporter in 1..=3 {
        h.warden.approve_report(report(p, Grandmaster, reporter)).unwrap();
        check(&h.members.snapshot(p));
    }
    assert_eq!(h.members.snapshot(p), set(&[Master, Extreme]));
}

#[test]
fn dpm_application_grants_qualifying_tier() {
    let p = ParticipantId::new(400);
    let h = harness(p, &[Initiate, SolakRookie]);
    let outcome = h.warden.approve_dpm(p, "1850000", "4:30").unwrap();
    assert_eq!(outcome.assessment.tier, Mastery);
    assert_eq!(h.members.snapshot(p), set(&[Mastery, SolakRookie]));

    let err = h.warden.approve_dpm(p, "100", "4:30").unwrap_err();
    assert!(matches!(err, WardenError::Dpm(_)));
}

#[test]
fn cosmetic_grants_never_touch_tiers() {
    let p = ParticipantId::new(401);
    let h = harness(p, &[Master]);
    let outcome = h
        .warden
        .grant_cosmetic(p, SolakWrHolder, GrantSource::Application)
        .unwrap();
    assert_eq!(outcome.plan.to_string(), "+solakWRHolder");
    assert_eq!(h.members.snapshot(p), set(&[Master, SolakWrHolder]));

    let err = h.warden.grant(p, SolakLegend, GrantSource::Manual).unwrap_err();
    assert!(matches!(
        err,
        WardenError::Grant(GrantError::InvalidGrant { .. })
    ));
}

#[test]
fn rejected_grant_is_rolled_back() {
    let p = ParticipantId::new(402);
    let h = harness(p, &[DuoExperienced]);
    h.warden.grant(p, DuoMaster, GrantSource::TrialPass { host: HOST }).unwrap();
    let plan = h.warden.reject_grant(p, &[DuoMaster, Master]).unwrap();
    assert_eq!(plan.to_string(), "-duoMaster");
    assert!(h.members.snapshot(p).is_empty());
}

#[test]
fn notifier_failures_do_not_fail_grants() {
    let p = ParticipantId::new(403);
    let h = harness_with(
        InMemoryMembership::new(),
        Recorder {
            fail: true,
            ..Default::default()
        },
    );
    let outcome = h.warden.grant(p, ThreeSevenRootskips, GrantSource::Manual).unwrap();
    assert!(!outcome.announced);
    assert_eq!(h.members.snapshot(p), set(&[ThreeSevenRootskips]));
}

#[test]
fn trial_pass_grants_leave_a_trial_record() {
    let p = ParticipantId::new(405);
    let h = harness(p, &[DuoRootskips]);
    let outcome = h
        .warden
        .grant(p, ThreeSevenRootskips, GrantSource::TrialPass { host: HOST })
        .unwrap();
    let trial = outcome.trial.unwrap();
    assert_eq!((trial.trialee, trial.host, trial.marker), (p, HOST, ThreeSevenRootskips));
    assert_eq!(h.warden.trials_for(p).unwrap(), vec![trial]);
    assert_eq!(h.warden.participation_count(HOST, 0).unwrap(), 1);

    // Other sources are not trials.
    let outcome = h.warden.grant(p, DuoMaster, GrantSource::Manual).unwrap();
    assert!(outcome.trial.is_none());
    assert_eq!(h.warden.trials_for(p).unwrap().len(), 1);
}

#[test]
fn notifier_failures_do_not_block_demotion() {
    let p = ParticipantId::new(404);
    let h = harness_with(
        InMemoryMembership::new().with(p, &[DuoMaster]),
        Recorder {
            fail: true,
            ..Default::default()
        },
    );
    let mut last = None;
    for reporter in 1..=3 {
        last = Some(h.warden.approve_report(report(p, DuoMaster, reporter)).unwrap());
    }
    let outcome = last.unwrap();
    assert!(outcome.demoted && outcome.notify);
    assert_eq!(h.members.snapshot(p), set(&[DuoExperienced]));
    assert_eq!(h.warden.ledger().count_active(p, DuoMaster).unwrap(), 0);
    assert!(h.recorder.seen.lock().unwrap().is_empty());
}

/// Authority whose writes always fail.
struct ReadOnly(InMemoryMembership);

impl MembershipAuthority for ReadOnly {
    fn markers(&self, participant: ParticipantId) -> MembershipResult<BTreeSet<MarkerKey>> {
        self.0.markers(participant)
    }

    fn add(&self, participant: ParticipantId, marker: MarkerKey) -> MembershipResult<()> {
        Err(MembershipError::ApplyFailure {
            participant,
            op: "add".into(),
            marker,
            message: "read-only".into(),
        })
    }

    fn remove(&self, participant: ParticipantId, marker: MarkerKey) -> MembershipResult<()> {
        Err(MembershipError::ApplyFailure {
            participant,
            op: "remove".into(),
            marker,
            message: "read-only".into(),
        })
    }
}

#[test]
fn apply_failures_surface_after_ledger_commit() {
    let p = ParticipantId::new(500);
    let warden = Warden::new(
        WardenConfig {
            report_threshold: 1,
            ..Default::default()
        },
        Arc::new(ReadOnly(InMemoryMembership::new().with(p, &[DuoMaster]))),
        Arc::new(Recorder::default()),
    )
    .unwrap();

    let err = warden.approve_report(report(p, DuoMaster, 1)).unwrap_err();
    assert!(matches!(
        err,
        WardenError::Membership(MembershipError::ApplyFailure { .. })
    ));
    let history = warden.reports_for(p).unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].expired);
}

#[test]
fn concurrent_approvals_demote_exactly_once() {
    let p = ParticipantId::new(600);
    let h = harness(p, &[DuoGrandmaster]);
    let warden = Arc::new(h.warden);

    let handles: Vec<_> = (1..=3)
        .map(|reporter| {
            let warden = Arc::clone(&warden);
            std::thread::spawn(move || {
                warden
                    .approve_report(report(p, DuoGrandmaster, reporter))
                    .unwrap()
                    .demoted
            })
        })
        .collect();
    let demotions = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|d| *d)
        .count();
    assert_eq!(demotions, 1);
    assert_eq!(h.members.snapshot(p), set(&[DuoMaster]));
}
