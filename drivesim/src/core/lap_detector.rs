use crate::core::track::Track;
use serde::{Deserialize, Serialize};

/// Lap detection constants.
/// * `min_lap_ms` - (ms) Crossings closer than this to the previous lap start are ignored
/// * `min_crossing_speed` - (units/s) Minimum speed for a crossing to count
/// * `xp_per_lap` - XP awarded for every completed lap
/// * `xp_clean_lap_bonus` - Additional XP for a lap without off-track excursions
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct LapPars {
    pub min_lap_ms: f64,
    pub min_crossing_speed: f64,
    pub xp_per_lap: u32,
    pub xp_clean_lap_bonus: u32,
}

impl Default for LapPars {
    fn default() -> Self {
        LapPars {
            min_lap_ms: 2000.0,
            min_crossing_speed: 1.0,
            xp_per_lap: 50,
            xp_clean_lap_bonus: 25,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LapRecord {
    pub lap_number: u32,
    pub time_ms: f64,
    pub off_track_count: u32,
    pub collisions: u32,
}

/// LapEvent is returned when a valid lap was completed in the current tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LapEvent {
    pub record: LapRecord,
    pub xp_awarded: u32,
    pub new_best: bool,
}

/// LapDetector tracks on which side of the start/finish line the car is and turns
/// negative-to-non-negative transitions into lap records. The line passes through the spawn
/// point, its normal points along the spawn rotation.
#[derive(Debug, Clone)]
pub struct LapDetector {
    // parameters
    lap_pars: LapPars,
    line_origin: (f64, f64),
    line_normal: (f64, f64),

    // line crossing
    side_prev: Option<f64>,

    // lap bookkeeping
    lap_start_ms: f64,
    laps: Vec<LapRecord>,
    best_lap_ms: Option<f64>,
    off_track_cur_lap: u32,
}

impl LapDetector {
    pub fn new(track: &Track, lap_pars: LapPars) -> LapDetector {
        LapDetector {
            lap_pars,
            line_origin: track.spawn_xz(),
            line_normal: (track.spawn_rotation.sin(), track.spawn_rotation.cos()),
            side_prev: None,
            lap_start_ms: 0.0,
            laps: Vec::new(),
            best_lap_ms: None,
            off_track_cur_lap: 0,
        }
    }

    /// reset forgets the crossing side and all laps, the next lap starts at now_ms.
    pub fn reset(&mut self, now_ms: f64) {
        self.side_prev = None;
        self.lap_start_ms = now_ms;
        self.laps.clear();
        self.best_lap_ms = None;
        self.off_track_cur_lap = 0;
    }

    /// side returns the signed distance of (x, z) from the start/finish line.
    pub fn side(&self, x: f64, z: f64) -> f64 {
        (x - self.line_origin.0) * self.line_normal.0 + (z - self.line_origin.1) * self.line_normal.1
    }

    /// count_off_track_excursion registers a new off-track excursion in the current lap.
    pub fn count_off_track_excursion(&mut self) {
        self.off_track_cur_lap += 1;
    }

    /// update checks the current car position for a lap crossing. Returns a LapEvent if a lap
    /// was completed, crossings within min_lap_ms of the current lap start are dropped.
    pub fn update(&mut self, x: f64, z: f64, speed: f64, now_ms: f64) -> Option<LapEvent> {
        let side_cur = self.side(x, z);
        let side_prev = self.side_prev.replace(side_cur);

        let crossed = match side_prev {
            Some(side_prev) => side_prev < 0.0 && side_cur >= 0.0,
            None => false,
        };

        if !crossed || speed <= self.lap_pars.min_crossing_speed {
            return None;
        }

        self.complete_lap(now_ms)
    }

    fn complete_lap(&mut self, now_ms: f64) -> Option<LapEvent> {
        let time_ms = now_ms - self.lap_start_ms;
        if time_ms < self.lap_pars.min_lap_ms {
            return None;
        }

        let record = LapRecord {
            lap_number: self.laps.len() as u32 + 1,
            time_ms,
            off_track_count: self.off_track_cur_lap,
            collisions: 0,
        };

        let new_best = match self.best_lap_ms {
            Some(best) => time_ms < best,
            None => true,
        };
        if new_best {
            self.best_lap_ms = Some(time_ms);
        }

        let xp_awarded = if self.off_track_cur_lap == 0 {
            self.lap_pars.xp_per_lap + self.lap_pars.xp_clean_lap_bonus
        } else {
            self.lap_pars.xp_per_lap
        };

        self.laps.push(record);
        self.lap_start_ms = now_ms;
        self.off_track_cur_lap = 0;

        Some(LapEvent {
            record,
            xp_awarded,
            new_best,
        })
    }

    pub fn lap_count(&self) -> u32 {
        self.laps.len() as u32
    }

    pub fn laps(&self) -> &[LapRecord] {
        &self.laps
    }

    pub fn best_lap_ms(&self) -> Option<f64> {
        self.best_lap_ms
    }

    pub fn off_track_cur_lap(&self) -> u32 {
        self.off_track_cur_lap
    }

    /// cur_lap_ms returns the time since the current lap started.
    pub fn cur_lap_ms(&self, now_ms: f64) -> f64 {
        (now_ms - self.lap_start_ms).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::track::{Difficulty, TrackPars, TrackPoint};
    use proptest::prelude::*;

    /// Track whose start line is the x axis with the normal pointing to +Z.
    fn line_track() -> Track {
        let mut track = Track::new(&TrackPars {
            id: "line".to_owned(),
            name: "Line".to_owned(),
            difficulty: Difficulty::Special,
            description: String::new(),
            width: 2.0,
            spawn_pos: [0.0, 0.5, 0.0],
            waypoints: vec![
                TrackPoint::new(0.0, 0.0),
                TrackPoint::new(0.0, 10.0),
                TrackPoint::new(10.0, 10.0),
            ],
            unlock_requirement: None,
        })
        .unwrap();
        track.spawn_rotation = 0.0;
        track
    }

    /// Moves the car from behind the line to in front of it at time t_ms.
    fn cross(det: &mut LapDetector, t_ms: f64, speed: f64) -> Option<LapEvent> {
        det.update(0.0, -0.5, speed, t_ms - 10.0);
        det.update(0.0, 0.5, speed, t_ms)
    }

    #[test]
    fn test_first_update_never_completes_a_lap() {
        let mut det = LapDetector::new(&line_track(), LapPars::default());
        det.reset(0.0);
        assert!(det.update(0.0, 1.0, 10.0, 5000.0).is_none());
    }

    #[test]
    fn test_crossing_creates_lap_with_xp() {
        let mut det = LapDetector::new(&line_track(), LapPars::default());
        det.reset(0.0);
        let ev = cross(&mut det, 5000.0, 10.0).unwrap();
        assert_eq!(ev.record.lap_number, 1);
        assert_eq!(ev.record.time_ms, 5000.0);
        assert_eq!(ev.xp_awarded, 75);
        assert!(ev.new_best);
        assert_eq!(det.best_lap_ms(), Some(5000.0));
    }

    #[test]
    fn test_landing_exactly_on_line_counts() {
        let mut det = LapDetector::new(&line_track(), LapPars::default());
        det.reset(0.0);
        det.update(0.0, -0.5, 10.0, 2990.0);
        assert!(det.update(0.0, 0.0, 10.0, 3000.0).is_some());
    }

    #[test]
    fn test_micro_lap_suppressed() {
        let mut det = LapDetector::new(&line_track(), LapPars::default());
        det.reset(0.0);
        assert!(cross(&mut det, 3000.0, 10.0).is_some());
        assert!(cross(&mut det, 3500.0, 10.0).is_none());
        assert_eq!(det.lap_count(), 1);
        // the suppressed crossing did not restart the lap timer
        let ev = cross(&mut det, 5500.0, 10.0).unwrap();
        assert_eq!(ev.record.time_ms, 2500.0);
    }

    #[test]
    fn test_slow_or_reverse_crossings_ignored() {
        let mut det = LapDetector::new(&line_track(), LapPars::default());
        det.reset(0.0);
        assert!(cross(&mut det, 5000.0, 1.0).is_none());
        assert!(cross(&mut det, 9000.0, -3.0).is_none());
        // positive to negative is not a lap
        det.update(0.0, 0.5, 10.0, 12000.0);
        assert!(det.update(0.0, -0.5, 10.0, 12010.0).is_none());
        assert_eq!(det.lap_count(), 0);
    }

    #[test]
    fn test_off_track_lap_gets_base_xp_and_counter_resets() {
        let mut det = LapDetector::new(&line_track(), LapPars::default());
        det.reset(0.0);
        det.count_off_track_excursion();
        det.count_off_track_excursion();
        let ev = cross(&mut det, 4000.0, 10.0).unwrap();
        assert_eq!(ev.xp_awarded, 50);
        assert_eq!(ev.record.off_track_count, 2);
        assert_eq!(det.off_track_cur_lap(), 0);

        let ev = cross(&mut det, 7000.0, 10.0).unwrap();
        assert_eq!(ev.xp_awarded, 75);
        assert_eq!(det.best_lap_ms(), Some(3000.0));
    }

    #[test]
    fn test_reset_forgets_side() {
        let mut det = LapDetector::new(&line_track(), LapPars::default());
        det.reset(0.0);
        det.update(0.0, -0.5, 10.0, 4000.0);
        det.reset(4000.0);
        assert!(det.update(0.0, 0.5, 10.0, 9000.0).is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_one_lap_per_spaced_crossing(gaps in proptest::collection::vec(0.0f64..6000.0, 1..30)) {
            let lap_pars = LapPars::default();
            let mut det = LapDetector::new(&line_track(), lap_pars);
            det.reset(0.0);

            let mut t = 0.0;
            let mut lap_start = 0.0;
            let mut expected = 0;
            for gap in gaps {
                t += gap + 20.0;
                if t - lap_start >= lap_pars.min_lap_ms {
                    expected += 1;
                    lap_start = t;
                }
                cross(&mut det, t, 5.0);
            }
            prop_assert_eq!(det.lap_count(), expected);
        }
    }
}
