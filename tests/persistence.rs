//! Persistence tests for the report ledger.
//!
//! These tests verify that report records, active counts and expiry flags
//! survive a warden restart when a data directory is configured.

use std::sync::Arc;

use rolewarden::config::WardenConfig;
use rolewarden::ledger::{NewReport, ReportLedger};
use rolewarden::marker::{MarkerKey, ParticipantId};
use rolewarden::membership::InMemoryMembership;
use rolewarden::notify::{GrantSource, TracingNotifier};
use rolewarden::trials::NewTrial;
use rolewarden::warden::Warden;

fn persistent_warden(dir: &std::path::Path, members: Arc<InMemoryMembership>) -> Warden {
    Warden::new(
        WardenConfig {
            data_dir: Some(dir.to_path_buf()),
            ..Default::default()
        },
        members,
        Arc::new(TracingNotifier),
    )
    .unwrap()
}

fn report(subject: ParticipantId, marker: MarkerKey, reporter: u64) -> NewReport {
    NewReport::new(subject, marker, ParticipantId::new(reporter))
}

#[test]
fn active_counts_survive_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let p = ParticipantId::new(10);
    let members = Arc::new(InMemoryMembership::new().with(p, &[MarkerKey::DuoMaster]));

    // First session: two strikes.
    {
        let warden = persistent_warden(dir.path(), members.clone());
        warden.approve_report(report(p, MarkerKey::DuoMaster, 1)).unwrap();
        warden
            .approve_report(report(p, MarkerKey::DuoMaster, 2).with_evidence("https://e.example/1"))
            .unwrap();
    }

    // Second session: the third strike demotes.
    {
        let warden = persistent_warden(dir.path(), members.clone());
        assert_eq!(
            warden.ledger().count_active(p, MarkerKey::DuoMaster).unwrap(),
            2
        );
        let outcome = warden.approve_report(report(p, MarkerKey::DuoMaster, 3)).unwrap();
        assert!(outcome.demoted);
        assert_eq!(outcome.record.id, 3);
    }
    assert_eq!(
        members.snapshot(p).into_iter().collect::<Vec<_>>(),
        vec![MarkerKey::DuoExperienced]
    );

    // Third session: the expiry is durable too.
    {
        let warden = persistent_warden(dir.path(), members);
        assert_eq!(
            warden.ledger().count_active(p, MarkerKey::DuoMaster).unwrap(),
            0
        );
        let history = warden.reports_for(p).unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|r| r.expired));
        assert_eq!(
            history[1].evidence_link.as_deref(),
            Some("https://e.example/1")
        );
    }
}

#[test]
fn ids_keep_increasing_across_reopens() {
    let dir = tempfile::TempDir::new().unwrap();
    let p = ParticipantId::new(20);

    {
        let ledger = ReportLedger::durable(dir.path()).unwrap();
        ledger.record(report(p, MarkerKey::Rootskips, 1)).unwrap();
    }
    {
        let ledger = ReportLedger::durable(dir.path()).unwrap();
        let record = ledger.record(report(p, MarkerKey::Rootskips, 2)).unwrap();
        assert_eq!(record.id, 2);
        assert_eq!(ledger.expire_all(p, MarkerKey::Rootskips).unwrap(), 2);
    }
    {
        let ledger = ReportLedger::durable(dir.path()).unwrap();
        assert_eq!(ledger.count_active(p, MarkerKey::Rootskips).unwrap(), 0);
        assert_eq!(ledger.history(p).unwrap().len(), 2);
        assert!(ledger.history(ParticipantId::new(21)).unwrap().is_empty());
    }
}

#[test]
fn trial_records_survive_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let trialee = ParticipantId::new(30);
    let host = ParticipantId::new(31);
    let members = Arc::new(InMemoryMembership::new());

    {
        let warden = persistent_warden(dir.path(), members.clone());
        warden
            .pass_trial(
                NewTrial::new(trialee, host, MarkerKey::DuoRootskips)
                    .with_participant(ParticipantId::new(32), "Umbra"),
            )
            .unwrap();
        warden
            .grant(trialee, MarkerKey::DuoMaster, GrantSource::TrialPass { host })
            .unwrap();
    }
    {
        let warden = persistent_warden(dir.path(), members.clone());
        let trials = warden.trials_for(trialee).unwrap();
        assert_eq!(
            trials.iter().map(|t| (t.id, t.marker)).collect::<Vec<_>>(),
            vec![(1, MarkerKey::DuoRootskips), (2, MarkerKey::DuoMaster)]
        );
        let board = warden.trial_leaderboard(0).unwrap();
        assert_eq!(board.total, 2);
        assert_eq!(board.hosted, vec![(host, 2)]);
        assert_eq!(board.participated, vec![(ParticipantId::new(32), 1)]);
    }
    assert_eq!(
        members.snapshot(trialee).into_iter().collect::<Vec<_>>(),
        vec![MarkerKey::DuoMaster]
    );
}
