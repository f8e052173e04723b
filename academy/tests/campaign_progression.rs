//! Campaign progression through the session: the frontier rule, clamping and
//! persistence across sessions.

use academy::core::types::{MissionId, MissionStatus};
use academy::io::config::AcademyConfig;
use academy::io::progress::{AGENT_NAME_KEY, PROGRESS_KEY};
use academy::io::store::{KeyValueStore, MemoryStore};
use academy::session::{Notice, Session};
use academy::test_support::{TempAcademy, memory_session};

#[test]
fn completing_a_mission_past_the_frontier_keeps_progress() {
    let mut session = memory_session(0);
    let update = session.complete_mission(0, MissionId::Mitm).expect("complete");

    assert!(update.newly_completed);
    assert!(!update.progress_advanced);
    let state = session.campaign();
    assert_eq!(state.progress, 0);
    assert_eq!(
        state.mission(MissionId::Mitm).map(|m| m.status),
        Some(MissionStatus::Completed)
    );
    assert_eq!(
        session.store().get(PROGRESS_KEY).expect("get"),
        Some("0".to_string())
    );
}

#[test]
fn frontier_completion_unlocks_the_next_mission() {
    let mut session = memory_session(0);
    assert!(session.start_mission(0, MissionId::DiffieHellman).expect("start"));
    session
        .complete_mission(10, MissionId::DiffieHellman)
        .expect("complete");

    let state = session.campaign();
    assert_eq!(state.progress, 1);
    assert!(!state.mission(MissionId::Mitm).expect("mitm").locked);
    assert!(state.mission(MissionId::RailFence).expect("rail").locked);
    assert_eq!(
        session.take_notices(),
        vec![Notice::MissionCompleted {
            id: MissionId::DiffieHellman,
            newly_completed: true,
            progress_advanced: true,
        }]
    );
}

#[test]
fn recompleting_a_mission_is_not_newly_completed() {
    let mut session = memory_session(1);
    let update = session
        .complete_mission(0, MissionId::DiffieHellman)
        .expect("complete");
    assert!(!update.newly_completed);
    assert!(!update.progress_advanced);
    assert_eq!(session.campaign().progress, 1);
}

#[test]
fn saved_progress_beyond_the_campaign_is_clamped() {
    let session = memory_session(9);
    let state = session.campaign();
    assert_eq!(state.progress, 3);
    assert!(state.is_finished());
    assert!(
        state
            .missions
            .iter()
            .all(|m| m.status == MissionStatus::Completed && !m.locked)
    );
}

#[test]
fn unreadable_progress_starts_from_the_first_mission() {
    let store = MemoryStore::with_entries([(PROGRESS_KEY, "three"), (AGENT_NAME_KEY, "Nova")]);
    let session = Session::load(store, AcademyConfig::default(), Some(1)).expect("load");
    let state = session.campaign();
    assert_eq!(state.progress, 0);
    assert_eq!(state.agent_name, "Nova");
}

#[test]
fn progress_and_identity_survive_a_new_session() {
    let academy = TempAcademy::new();
    {
        let mut session = academy.session();
        session.register("  Nova  ").expect("register");
        session
            .complete_mission(0, MissionId::DiffieHellman)
            .expect("complete");
        session.complete_mission(0, MissionId::Mitm).expect("complete");
    }

    let session = academy.session();
    let state = session.campaign();
    assert_eq!(state.agent_name, "Nova");
    assert_eq!(state.progress, 2);
    assert!(!state.mission(MissionId::RailFence).expect("rail").locked);
    assert_eq!(state.current, None);
}

#[test]
fn blank_agent_name_is_rejected() {
    let mut session = memory_session(0);
    let err = session.register("   ").unwrap_err();
    assert!(err.to_string().contains("must not be empty"));
    assert!(!session.campaign().is_registered());
}
