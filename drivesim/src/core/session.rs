use crate::core::boundary::is_off_track;
use crate::core::car::{CarPars, CarState, KeyState};
use crate::core::driver::AutoDriver;
use crate::core::frame_log::FrameLog;
use crate::core::lap_detector::{LapDetector, LapEvent, LapPars, LapRecord};
use crate::core::track::Track;
use crate::interfaces::hud_interface::HudState;
use crate::interfaces::storage::StorageBackend;
use crate::post::run_summary::RunSummary;
use crate::post::training_data::{DriveMode, RunDraft, TrainingStore};
use crate::pre::read_sim_pars::SimPars;
use helpers::general::InputValueError;
use std::error::Error;
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Menu,
    Driving,
    Autonomous,
    AutoPaused,
    Paused,
    RunComplete,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Mode::Menu => "menu",
            Mode::Driving => "driving",
            Mode::Autonomous => "autonomous",
            Mode::AutoPaused => "auto-paused",
            Mode::Paused => "paused",
            Mode::RunComplete => "run-complete",
        };
        write!(f, "{}", name)
    }
}

/// SessionError is returned if an action is requested in a mode that does not allow it. The
/// session keeps its current mode in that case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    InvalidTransition { from: Mode, action: &'static str },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SessionError::InvalidTransition { from, action } => {
                write!(f, "Action {} is not allowed in mode {}", action, from)
            }
        }
    }
}

impl Error for SessionError {}

/// Session owns the complete mutable state of one driving session: the mode, the car, the
/// lap detector, the autonomous driver and the control-frame log of the current run.
#[derive(Debug, Clone)]
pub struct Session {
    // parameters
    car_pars: CarPars,
    lap_pars: LapPars,
    track: Track,

    // state machine
    mode: Mode,
    drive_mode: DriveMode,

    // run state
    car: CarState,
    lap_detector: LapDetector,
    auto_driver: AutoDriver,
    frame_log: FrameLog,
    off_track: bool,
    off_track_total: u32,
    run_xp: u32,
    run_elapsed_ms: f64,

    // player progress, kept across runs
    xp: u32,
    last_summary: Option<RunSummary>,
}

impl Session {
    /// The method creates a session in the menu. The track is the one shown as selected until a
    /// run is started.
    pub fn new(sim_pars: &SimPars, track: &Track) -> Session {
        Session {
            car_pars: sim_pars.car_pars,
            lap_pars: sim_pars.lap_pars,
            track: track.to_owned(),
            mode: Mode::Menu,
            drive_mode: DriveMode::Manual,
            car: CarState::spawn(track),
            lap_detector: LapDetector::new(track, sim_pars.lap_pars),
            auto_driver: AutoDriver::new(sim_pars.driver_pars),
            frame_log: FrameLog::new(sim_pars.sampling),
            off_track: false,
            off_track_total: 0,
            run_xp: 0,
            run_elapsed_ms: 0.0,
            xp: 0,
            last_summary: None,
        }
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            from: self.mode,
            action,
        }
    }

    /// reset_run puts the car back on the spawn pose and forgets all run data.
    fn reset_run(&mut self) {
        self.car = CarState::spawn(&self.track);
        self.lap_detector.reset(0.0);
        self.auto_driver.reseed(&self.car, &self.track);
        self.frame_log.clear();
        self.off_track = false;
        self.off_track_total = 0;
        self.run_xp = 0;
        self.run_elapsed_ms = 0.0;
    }

    fn active_mode(&self) -> Mode {
        match self.drive_mode {
            DriveMode::Manual => Mode::Driving,
            DriveMode::Ai => Mode::Autonomous,
        }
    }

    // ---------------------------------------------------------------------------------------------
    // TRANSITIONS ---------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// start selects the track and begins a run in manual or autonomous mode.
    pub fn start(&mut self, track: &Track, drive_mode: DriveMode) -> Result<(), SessionError> {
        if self.mode != Mode::Menu {
            return Err(self.invalid("start"));
        }

        // the start line follows the selected track
        self.track = track.to_owned();
        self.lap_detector = LapDetector::new(track, self.lap_pars);
        self.drive_mode = drive_mode;
        self.last_summary = None;
        self.reset_run();
        self.mode = self.active_mode();

        info!("Started {} run on {}", drive_mode, self.track.id);
        Ok(())
    }

    /// toggle_pause switches between driving and paused, or autonomous and auto-paused.
    pub fn toggle_pause(&mut self) -> Result<(), SessionError> {
        self.mode = match self.mode {
            Mode::Driving => Mode::Paused,
            Mode::Paused => Mode::Driving,
            Mode::Autonomous => Mode::AutoPaused,
            Mode::AutoPaused => Mode::Autonomous,
            _ => return Err(self.invalid("toggle_pause")),
        };
        debug!("Session is now {}", self.mode);
        Ok(())
    }

    /// restart resets the run from a paused mode and continues driving without the menu.
    pub fn restart(&mut self) -> Result<(), SessionError> {
        if !matches!(self.mode, Mode::Paused | Mode::AutoPaused) {
            return Err(self.invalid("restart"));
        }
        self.reset_run();
        self.mode = self.active_mode();
        info!("Restarted run on {}", self.track.id);
        Ok(())
    }

    /// stop ends the run, hands it to the store and returns the run-complete summary. A run
    /// without captured frames is not persisted.
    pub fn stop<B: StorageBackend>(
        &mut self,
        store: &mut TrainingStore<B>,
    ) -> Result<RunSummary, SessionError> {
        if !matches!(
            self.mode,
            Mode::Driving | Mode::Autonomous | Mode::Paused | Mode::AutoPaused
        ) {
            return Err(self.invalid("stop"));
        }

        let draft = self.run_draft();
        let run_id = if draft.frames > 0 {
            store.save_run(draft).map(|run| run.id)
        } else {
            info!("Run on {} captured no frames, nothing saved", self.track.id);
            None
        };

        let summary = RunSummary {
            track_id: self.track.id.to_owned(),
            drive_mode: self.drive_mode,
            laps: self.lap_detector.laps().to_vec(),
            best_lap_ms: self.lap_detector.best_lap_ms(),
            frames: self.frame_log.len(),
            off_track_count: self.off_track_total,
            xp: self.run_xp,
            duration_ms: self.run_elapsed_ms,
            run_id,
            stats: store.get_stats(),
        };

        self.mode = Mode::RunComplete;
        self.last_summary = Some(summary.clone());
        info!(
            "Stopped run on {} after {:.1}s with {} laps",
            self.track.id,
            self.run_elapsed_ms / 1000.0,
            summary.lap_count()
        );
        Ok(summary)
    }

    /// acknowledge leaves the run-complete screen.
    pub fn acknowledge(&mut self) -> Result<(), SessionError> {
        if self.mode != Mode::RunComplete {
            return Err(self.invalid("acknowledge"));
        }
        self.mode = Mode::Menu;
        Ok(())
    }

    /// back_to_menu abandons a paused run without saving it.
    pub fn back_to_menu(&mut self) -> Result<(), SessionError> {
        if !matches!(self.mode, Mode::Paused | Mode::AutoPaused) {
            return Err(self.invalid("back_to_menu"));
        }
        self.reset_run();
        self.mode = Mode::Menu;
        info!("Discarded run on {}", self.track.id);
        Ok(())
    }

    /// set_max_speed_pct applies a speed cap (10..=100 % of the top speed) to the live car.
    pub fn set_max_speed_pct(&mut self, pct: u32) -> Result<(), InputValueError> {
        self.car_pars.set_speed_cap_pct(pct)
    }

    // ---------------------------------------------------------------------------------------------
    // MAIN METHOD ---------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// tick advances the run by dt seconds. Manual runs are driven by keys, autonomous runs by
    /// the waypoint follower. Nothing happens outside driving and autonomous mode. Returns the
    /// lap event if a lap was completed in this tick.
    pub fn tick(&mut self, dt: f64, keys: &KeyState) -> Option<LapEvent> {
        let intent = match self.mode {
            Mode::Driving => keys.to_intent(),
            Mode::Autonomous => self
                .auto_driver
                .control(&self.car, &self.track, &self.car_pars),
            _ => return None,
        };

        // physics
        self.car = self.car.step(&intent, dt, &self.car_pars);

        // boundary
        let off_track = is_off_track(self.car.x, self.car.z, &self.track);
        if off_track && !self.off_track {
            self.off_track_total += 1;
            self.lap_detector.count_off_track_excursion();
        }
        self.off_track = off_track;
        if off_track {
            self.car.apply_off_track_penalty(&self.car_pars);
        }

        // lap timing runs on unclamped simulation time
        if dt.is_finite() && dt > 0.0 {
            self.run_elapsed_ms += dt * 1000.0;
        }

        let lap_event =
            self.lap_detector
                .update(self.car.x, self.car.z, self.car.speed, self.run_elapsed_ms);
        if let Some(ev) = lap_event {
            self.xp += ev.xp_awarded;
            self.run_xp += ev.xp_awarded;
            info!(
                "Lap {} on {}: {:.3}s{} (+{} XP)",
                ev.record.lap_number,
                self.track.id,
                ev.record.time_ms / 1000.0,
                if ev.new_best { ", new best" } else { "" },
                ev.xp_awarded
            );
        }

        // training data
        self.frame_log.on_tick(self.run_elapsed_ms, &self.car);

        lap_event
    }

    // ---------------------------------------------------------------------------------------------
    // SNAPSHOTS -----------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// run_draft returns the current run as it would be persisted.
    pub fn run_draft(&self) -> RunDraft {
        RunDraft {
            track_id: self.track.id.to_owned(),
            drive_mode: self.drive_mode,
            lap_count: self.lap_detector.lap_count(),
            frames: self.frame_log.len(),
            best_lap_ms: self.lap_detector.best_lap_ms(),
            off_track_count: self.off_track_total,
            duration_ms: self.run_elapsed_ms,
            control_log: self.frame_log.frames().to_vec(),
        }
    }

    /// hud_state returns a read-only snapshot for the HUD.
    pub fn hud_state(&self) -> HudState {
        HudState {
            mode: self.mode,
            drive_mode: self.drive_mode,
            track_id: self.track.id.to_owned(),
            car: self.car,
            speed_kmh: self.car.speed_kmh(),
            lap_count: self.lap_detector.lap_count(),
            best_lap_ms: self.lap_detector.best_lap_ms(),
            cur_lap_ms: self.lap_detector.cur_lap_ms(self.run_elapsed_ms),
            off_track: self.off_track,
            elapsed_ms: self.run_elapsed_ms,
            xp: self.xp,
            frames: self.frame_log.len(),
            speed_cap_pct: self.car_pars.speed_cap_pct(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn drive_mode(&self) -> DriveMode {
        self.drive_mode
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn car(&self) -> &CarState {
        &self.car
    }

    pub fn laps(&self) -> &[LapRecord] {
        self.lap_detector.laps()
    }

    pub fn is_off_track(&self) -> bool {
        self.off_track
    }

    pub fn off_track_total(&self) -> u32 {
        self.off_track_total
    }

    /// xp returns the XP collected over all runs of this session.
    pub fn xp(&self) -> u32 {
        self.xp
    }

    pub fn run_xp(&self) -> u32 {
        self.run_xp
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.run_elapsed_ms
    }

    pub fn last_summary(&self) -> Option<&RunSummary> {
        self.last_summary.as_ref()
    }
}
