//! Aggregate views over captured training data, as shown on the training dashboard.

use crate::core::frame_log::ControlFrame;
use crate::post::training_data::{DriveMode, TrainingRun};
use helpers::general::trailing_mean;
use std::collections::BTreeMap;

pub const SPEED_BUCKET_KMH: f64 = 5.0;
pub const NO_SPEED_BUCKETS: usize = 18;
pub const NO_STEERING_BUCKETS: usize = 20;
pub const HEATMAP_GRID: usize = 20;
pub const HEATMAP_MAX_SPEED_KMH: f64 = 90.0;
/// Frames with a throttle above this count as "throttle on".
pub const THROTTLE_ON_THRESHOLD: f64 = 0.1;

/// bucket maps value into [0, no_buckets - 1], NaN lands in bucket 0.
fn bucket(value: f64, no_buckets: usize) -> usize {
    let idx = value.floor();
    if !(idx > 0.0) {
        0
    } else {
        (idx as usize).min(no_buckets - 1)
    }
}

fn speed_kmh(frame: &ControlFrame) -> f64 {
    (frame.speed * 3.6).abs()
}

/// collect_frames returns the control frames of all runs in order.
pub fn collect_frames(runs: &[TrainingRun]) -> Vec<ControlFrame> {
    runs.iter()
        .flat_map(|r| r.control_log.iter().copied())
        .collect()
}

// -------------------------------------------------------------------------------------------------
// FRAME STATISTICS --------------------------------------------------------------------------------
// -------------------------------------------------------------------------------------------------

/// FrameStats summarizes the driving behavior captured in a set of control frames.
/// * `speed_histogram` - Frames per 5 km/h bucket, the last bucket is open-ended
/// * `steering_histogram` - Frames per 0.1 steering bucket over [-1, 1]
/// * `throttle_pct` - Percentage of frames with the throttle on (rounded)
/// * `avg_steering` - Mean steering, i.e. the steering bias
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStats {
    pub no_frames: usize,
    pub speed_histogram: Vec<u32>,
    pub steering_histogram: Vec<u32>,
    pub throttle_pct: u32,
    pub avg_speed_kmh: f64,
    pub avg_steering: f64,
}

impl FrameStats {
    pub fn new(frames: &[ControlFrame]) -> FrameStats {
        let mut speed_histogram = vec![0; NO_SPEED_BUCKETS];
        let mut steering_histogram = vec![0; NO_STEERING_BUCKETS];

        if frames.is_empty() {
            return FrameStats {
                no_frames: 0,
                speed_histogram,
                steering_histogram,
                throttle_pct: 0,
                avg_speed_kmh: 0.0,
                avg_steering: 0.0,
            };
        }

        let mut no_throttle_on = 0;
        let mut speed_sum = 0.0;
        let mut steering_sum = 0.0;

        for frame in frames.iter() {
            let kmh = speed_kmh(frame);
            speed_histogram[bucket(kmh / SPEED_BUCKET_KMH, NO_SPEED_BUCKETS)] += 1;
            steering_histogram[bucket((frame.steering + 1.0) * 10.0, NO_STEERING_BUCKETS)] += 1;

            if frame.throttle > THROTTLE_ON_THRESHOLD {
                no_throttle_on += 1;
            }
            speed_sum += kmh;
            steering_sum += frame.steering;
        }

        let no_frames = frames.len();
        FrameStats {
            no_frames,
            speed_histogram,
            steering_histogram,
            throttle_pct: (no_throttle_on as f64 / no_frames as f64 * 100.0).round() as u32,
            avg_speed_kmh: speed_sum / no_frames as f64,
            avg_steering: steering_sum / no_frames as f64,
        }
    }

    /// print_frame_stats prints the statistics and both histograms to the console output.
    pub fn print_frame_stats(&self) {
        println!(
            "RESULT: {} frames, avg speed {:.1}km/h, throttle on {}%, steering bias {:+.3}",
            self.no_frames, self.avg_speed_kmh, self.throttle_pct, self.avg_steering
        );

        println!("RESULT: Speed distribution (km/h)");
        for (i, count) in self.speed_histogram.iter().enumerate() {
            let lo = i as f64 * SPEED_BUCKET_KMH;
            if i < NO_SPEED_BUCKETS - 1 {
                println!("{:4.0}-{:<4.0} {:7}", lo, lo + SPEED_BUCKET_KMH, count);
            } else {
                println!("{:4.0}+     {:7}", lo, count);
            }
        }

        println!("RESULT: Steering distribution");
        for (i, count) in self.steering_histogram.iter().enumerate() {
            let lo = -1.0 + i as f64 * 0.1;
            println!("{:+5.1} {:7}", lo, count);
        }
    }
}

/// speed_steering_heatmap counts frames on a grid of speed rows (0-90 km/h, clamped) and
/// steering columns ([-1, 1]). Row 0 is the slowest speed, column 0 full right steering.
pub fn speed_steering_heatmap(frames: &[ControlFrame]) -> Vec<Vec<u32>> {
    let mut grid = vec![vec![0; HEATMAP_GRID]; HEATMAP_GRID];
    let grid_f = HEATMAP_GRID as f64;

    for frame in frames.iter() {
        let col = bucket((frame.steering + 1.0) / 2.0 * grid_f, HEATMAP_GRID);
        let row = bucket(speed_kmh(frame) / HEATMAP_MAX_SPEED_KMH * grid_f, HEATMAP_GRID);
        grid[row][col] += 1;
    }

    grid
}

// -------------------------------------------------------------------------------------------------
// LAP TIME PROGRESSION ----------------------------------------------------------------------------
// -------------------------------------------------------------------------------------------------

/// One run with a valid best lap in the lap time progression.
/// * `idx` - 1-based position among the runs with a best lap
/// * `time_s` - (s) Best lap of the run
/// * `trend_s` - (s) Trailing moving average of time_s
#[derive(Debug, Clone, PartialEq)]
pub struct LapTimePoint {
    pub idx: usize,
    pub time_s: f64,
    pub trend_s: f64,
    pub track_id: String,
    pub drive_mode: DriveMode,
}

/// lap_time_progression returns the best lap of every run that has a positive one, in run
/// order, together with a trailing trend whose window is a fifth of the number of points.
pub fn lap_time_progression(runs: &[TrainingRun]) -> Vec<LapTimePoint> {
    let with_times: Vec<(&TrainingRun, f64)> = runs
        .iter()
        .filter_map(|r| match r.best_lap_ms {
            Some(t) if t > 0.0 => Some((r, t / 1000.0)),
            _ => None,
        })
        .collect();

    let times: Vec<f64> = with_times.iter().map(|&(_, t)| t).collect();
    let window = (times.len() / 5).max(1);
    let trend = trailing_mean(&times, window);

    with_times
        .iter()
        .zip(trend.iter())
        .enumerate()
        .map(|(i, (&(run, time_s), &trend_s))| LapTimePoint {
            idx: i + 1,
            time_s,
            trend_s,
            track_id: run.track_id.to_owned(),
            drive_mode: run.drive_mode,
        })
        .collect()
}

// -------------------------------------------------------------------------------------------------
// TRACK COVERAGE ----------------------------------------------------------------------------------
// -------------------------------------------------------------------------------------------------

/// Captured positions per track.
/// * `bounds` - (min x, max x, min z, max z) of all captured positions, None without positions
#[derive(Debug, Clone, PartialEq)]
pub struct TrackCoverage {
    pub track_id: String,
    pub no_runs: usize,
    pub no_laps: u32,
    pub no_positions: usize,
    pub bounds: Option<(f64, f64, f64, f64)>,
}

/// track_coverage groups the runs by track, ordered by track id.
pub fn track_coverage(runs: &[TrainingRun]) -> Vec<TrackCoverage> {
    let mut groups: BTreeMap<&str, Vec<&TrainingRun>> = BTreeMap::new();
    for run in runs.iter() {
        groups.entry(run.track_id.as_str()).or_default().push(run);
    }

    groups
        .into_iter()
        .map(|(track_id, track_runs)| {
            let mut bounds: Option<(f64, f64, f64, f64)> = None;
            let mut no_positions = 0;

            for frame in track_runs.iter().flat_map(|r| r.control_log.iter()) {
                no_positions += 1;
                bounds = Some(match bounds {
                    Some((x_min, x_max, z_min, z_max)) => (
                        x_min.min(frame.x),
                        x_max.max(frame.x),
                        z_min.min(frame.z),
                        z_max.max(frame.z),
                    ),
                    None => (frame.x, frame.x, frame.z, frame.z),
                });
            }

            TrackCoverage {
                track_id: track_id.to_owned(),
                no_runs: track_runs.len(),
                no_laps: track_runs.iter().map(|r| r.lap_count).sum(),
                no_positions,
                bounds,
            }
        })
        .collect()
}
