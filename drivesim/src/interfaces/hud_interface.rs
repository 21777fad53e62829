use crate::core::car::CarState;
use crate::core::session::Mode;
use crate::post::training_data::DriveMode;

/// Upper bound for how often a live display is fed with HUD snapshots (Hz).
pub const MAX_HUD_UPDATE_FREQUENCY: f64 = 20.0;

/// HudState is a read-only snapshot of a session, everything a HUD or a menu needs to render.
/// * `cur_lap_ms` - (ms) Time since the current lap started
/// * `elapsed_ms` - (ms) Driving time of the run, pauses excluded
/// * `frames` - Number of control frames captured so far
#[derive(Debug, Clone, PartialEq)]
pub struct HudState {
    pub mode: Mode,
    pub drive_mode: DriveMode,
    pub track_id: String,
    pub car: CarState,
    pub speed_kmh: f64,
    pub lap_count: u32,
    pub best_lap_ms: Option<f64>,
    pub cur_lap_ms: f64,
    pub off_track: bool,
    pub elapsed_ms: f64,
    pub xp: u32,
    pub frames: usize,
    pub speed_cap_pct: u32,
}
