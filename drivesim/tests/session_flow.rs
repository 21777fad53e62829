use drivesim::core::car::KeyState;
use drivesim::core::handle_session::handle_session;
use drivesim::core::session::{Mode, Session, SessionError};
use drivesim::core::track::TrackCatalog;
use drivesim::interfaces::storage::{FileStorage, MemoryStorage};
use drivesim::post::training_data::{DriveMode, TrainingStore};
use drivesim::pre::read_sim_pars::SimPars;

const DT: f64 = 1.0 / 60.0;

#[test]
fn manual_then_autonomous_runs_accumulate_stats() {
    let catalog = TrackCatalog::default();
    let mut store = TrainingStore::new(MemoryStorage::new());
    let mut session = Session::new(&SimPars::default(), catalog.get_track("oval"));

    // manual run: accelerate for two seconds, pause, stop from the pause overlay
    session
        .start(catalog.get_track("oval"), DriveMode::Manual)
        .unwrap();
    let keys = KeyState::from_pressed(vec!["ArrowUp"]);
    for _ in 0..120 {
        session.tick(DT, &keys);
    }
    session.toggle_pause().unwrap();
    let manual = session.stop(&mut store).unwrap();
    assert_eq!(manual.drive_mode, DriveMode::Manual);
    assert_eq!(manual.lap_count(), 0);
    assert_eq!(manual.best_lap_ms, None);
    assert!((19..=20).contains(&manual.frames));
    session.acknowledge().unwrap();

    // autonomous run on the same session
    session.start(catalog.get_track("oval"), DriveMode::Ai).unwrap();
    for _ in 0..(60 * 16) {
        session.tick(DT, &KeyState::default());
    }
    let ai = session.stop(&mut store).unwrap();
    assert!(ai.lap_count() >= 2);
    assert!(ai.best_lap_ms.is_some());

    let stats = store.get_stats();
    assert_eq!(stats.total_runs, 2);
    assert_eq!(stats.total_laps, ai.lap_count());
    assert_eq!(stats.total_frames as usize, manual.frames + ai.frames);
    assert!((stats.total_drive_time_ms - (manual.duration_ms + ai.duration_ms)).abs() < 1e-6);
    assert_eq!(stats.best_lap_ms, ai.best_lap_ms);
    assert_eq!(ai.stats, stats);

    assert_eq!(store.runs_by_mode(DriveMode::Manual).len(), 1);
    assert_eq!(store.runs_by_mode(DriveMode::Ai).len(), 1);
}

#[test]
fn invalid_actions_do_not_change_the_mode() {
    let catalog = TrackCatalog::default();
    let mut store = TrainingStore::new(MemoryStorage::new());
    let mut session = Session::new(&SimPars::default(), catalog.get_track("oval"));
    session.start(catalog.get_track("oval"), DriveMode::Ai).unwrap();
    session.stop(&mut store).unwrap();

    let err = session.toggle_pause().unwrap_err();
    assert_eq!(
        err,
        SessionError::InvalidTransition {
            from: Mode::RunComplete,
            action: "toggle_pause"
        }
    );
    assert_eq!(
        err.to_string(),
        "Action toggle_pause is not allowed in mode run-complete"
    );
    assert_eq!(session.mode(), Mode::RunComplete);
    assert!(session.tick(DT, &KeyState::default()).is_none());
}

#[test]
fn laps_on_the_oval_unlock_the_next_track() {
    let catalog = TrackCatalog::default();
    let mut store = TrainingStore::new(MemoryStorage::new());
    let s_curves = catalog.get_track("s-curves");
    assert!(!s_curves.is_unlocked(store.get_stats().total_laps));

    // every 60s run completes 8 laps or more
    for _ in 0..2 {
        let mut session = handle_session(
            &SimPars::default(),
            catalog.get_track("oval"),
            store.max_speed_pct(),
            60.0,
            0.02,
            false,
            None,
            1.0,
        )
        .unwrap();
        session.stop(&mut store).unwrap();
    }

    let total_laps = store.get_stats().total_laps;
    assert!(total_laps >= 16);
    assert!(s_curves.is_unlocked(total_laps));
    assert!(!catalog.get_track("city-circuit").is_unlocked(total_laps));
}

#[test]
fn file_storage_survives_reopening() {
    let dir = std::env::temp_dir().join(format!("drivesim-flow-{}", uuid::Uuid::new_v4()));
    let catalog = TrackCatalog::default();

    let saved = {
        let mut store = TrainingStore::new(FileStorage::new(&dir).unwrap());
        store.set_max_speed_pct(50).unwrap();
        let mut session = handle_session(
            &SimPars::default(),
            catalog.get_track("oval"),
            store.max_speed_pct(),
            3.0,
            0.02,
            false,
            None,
            1.0,
        )
        .unwrap();
        session.stop(&mut store).unwrap()
    };

    let store = TrainingStore::new(FileStorage::new(&dir).unwrap());
    let runs = store.get_runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(Some(runs[0].id.clone()), saved.run_id);
    assert_eq!(runs[0].control_log.len(), saved.frames);
    assert!(runs[0].control_log.iter().all(|f| f.speed <= 12.5 + 1e-9));
    assert_eq!(store.max_speed_pct(), 50);
    assert_eq!(store.get_stats().total_runs, 1);

    let csv = store.export_runs_as_csv().unwrap();
    assert_eq!(csv.lines().count(), 2);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn autopilot_degrades_on_the_harder_tracks() {
    let catalog = TrackCatalog::default();
    let mut store = TrainingStore::new(MemoryStorage::new());

    // the s-curves are lapped, but the car runs wide in the tight bends
    let mut session = handle_session(
        &SimPars::default(),
        catalog.get_track("s-curves"),
        100,
        60.0,
        DT,
        false,
        None,
        1.0,
    )
    .unwrap();
    let s_curves = session.stop(&mut store).unwrap();
    assert!((3..=5).contains(&s_curves.lap_count()));
    assert!(s_curves.off_track_count >= 1);
    assert!(s_curves.best_lap_ms.unwrap() > 10_000.0);

    // the city circuit corners are too sharp for the lookahead, no lap is completed
    let mut session = handle_session(
        &SimPars::default(),
        catalog.get_track("city-circuit"),
        100,
        60.0,
        DT,
        false,
        None,
        1.0,
    )
    .unwrap();
    assert!(session.car().speed.is_finite());
    let city = session.stop(&mut store).unwrap();
    assert_eq!(city.lap_count(), 0);
    assert_eq!(city.best_lap_ms, None);
    assert!(city.off_track_count >= 1);

    // both runs still carry their frames as training data
    assert!((599..=600).contains(&s_curves.frames));
    assert!((599..=600).contains(&city.frames));
    assert_eq!(store.get_runs().len(), 2);
    assert_eq!(store.get_stats().total_laps, s_curves.lap_count());
}
