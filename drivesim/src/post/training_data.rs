//! Durable training-data store. Finished runs are persisted as one JSON blob under
//! `deepracer-training-runs`, running totals under `deepracer-stats`. Reads degrade to empty
//! defaults, writes degrade through a retention ladder instead of failing.

use crate::core::frame_log::ControlFrame;
use crate::interfaces::storage::{StorageBackend, MAX_SPEED_KEY, RUNS_KEY, STATS_KEY};
use chrono::{SecondsFormat, Utc};
use helpers::general::InputValueError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Number of most recent runs that keep their control log.
pub const MAX_RUNS_WITH_LOG: usize = 100;
/// Runs kept (without control logs) on the first fallback after a failed write.
pub const FALLBACK_KEEP_RUNS: usize = 50;
/// Runs kept (without control logs) on the last fallback.
pub const MINIMAL_KEEP_RUNS: usize = 10;

pub const CSV_HEADER: [&str; 8] = [
    "id",
    "trackId",
    "driveMode",
    "lapCount",
    "frames",
    "bestLapMs",
    "durationMs",
    "timestamp",
];

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DriveMode {
    Manual,
    Ai,
}

impl fmt::Display for DriveMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DriveMode::Manual => write!(f, "manual"),
            DriveMode::Ai => write!(f, "ai"),
        }
    }
}

/// RunDraft is a finished run before it was assigned an id and a timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct RunDraft {
    pub track_id: String,
    pub drive_mode: DriveMode,
    pub lap_count: u32,
    pub frames: usize,
    pub best_lap_ms: Option<f64>,
    pub off_track_count: u32,
    pub duration_ms: f64,
    pub control_log: Vec<ControlFrame>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRun {
    pub id: String,
    pub track_id: String,
    pub drive_mode: DriveMode,
    pub lap_count: u32,
    pub frames: usize,
    pub best_lap_ms: Option<f64>,
    pub off_track_count: u32,
    pub duration_ms: f64,
    pub timestamp: String,
    #[serde(default)]
    pub control_log: Vec<ControlFrame>,
}

impl TrainingRun {
    fn from_draft(draft: RunDraft) -> TrainingRun {
        TrainingRun {
            id: uuid::Uuid::new_v4().to_string(),
            track_id: draft.track_id,
            drive_mode: draft.drive_mode,
            lap_count: draft.lap_count,
            frames: draft.frames,
            best_lap_ms: draft.best_lap_ms,
            off_track_count: draft.off_track_count,
            duration_ms: draft.duration_ms,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            control_log: draft.control_log,
        }
    }

    fn without_log(&self) -> TrainingRun {
        TrainingRun {
            control_log: Vec::new(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccumulatedStats {
    pub total_runs: u32,
    pub total_laps: u32,
    pub total_frames: u64,
    pub total_drive_time_ms: f64,
    pub best_lap_ms: Option<f64>,
}

impl AccumulatedStats {
    /// add_run folds a saved run into the running totals.
    pub fn add_run(&mut self, run: &TrainingRun) {
        self.total_runs += 1;
        self.total_laps += run.lap_count;
        self.total_frames += run.frames as u64;
        self.total_drive_time_ms += run.duration_ms;

        if let Some(best_run) = run.best_lap_ms {
            self.best_lap_ms = Some(match self.best_lap_ms {
                Some(best) => best.min(best_run),
                None => best_run,
            });
        }
    }
}

/// TrainingStore aggregates finished runs into the persisted run list and running totals.
#[derive(Debug)]
pub struct TrainingStore<B: StorageBackend> {
    backend: B,
}

impl<B: StorageBackend> TrainingStore<B> {
    pub fn new(backend: B) -> TrainingStore<B> {
        TrainingStore { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    // ---------------------------------------------------------------------------------------------
    // READ ----------------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// get_runs returns all persisted runs, oldest first. Missing or corrupted data yields an
    /// empty list.
    pub fn get_runs(&self) -> Vec<TrainingRun> {
        match self.backend.get(RUNS_KEY) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Discarding unreadable training runs: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        }
    }

    /// get_stats returns the accumulated statistics, defaults if missing or corrupted.
    pub fn get_stats(&self) -> AccumulatedStats {
        match self.backend.get(STATS_KEY) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Discarding unreadable accumulated stats: {}", e);
                AccumulatedStats::default()
            }),
            None => AccumulatedStats::default(),
        }
    }

    pub fn runs_by_mode(&self, drive_mode: DriveMode) -> Vec<TrainingRun> {
        self.get_runs()
            .into_iter()
            .filter(|r| r.drive_mode == drive_mode)
            .collect()
    }

    /// max_speed_pct returns the persisted speed cap preference (10..=100), 100 if unset or
    /// invalid.
    pub fn max_speed_pct(&self) -> u32 {
        self.backend
            .get(MAX_SPEED_KEY)
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .filter(|pct| (10..=100).contains(pct))
            .unwrap_or(100)
    }

    // ---------------------------------------------------------------------------------------------
    // WRITE ---------------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// save_run assigns an id and a timestamp to the draft, appends it to the persisted runs
    /// and updates the accumulated statistics. Never fails: if the storage refuses the write,
    /// older data is dropped step by step and a warning is logged. If no step of the ladder
    /// succeeds, the run is lost, the statistics stay untouched and None is returned.
    pub fn save_run(&mut self, draft: RunDraft) -> Option<TrainingRun> {
        let run = TrainingRun::from_draft(draft);

        let mut runs = self.get_runs();
        runs.push(run.clone());

        if runs.len() > MAX_RUNS_WITH_LOG {
            let no_trimmed = runs.len() - MAX_RUNS_WITH_LOG;
            for old_run in runs.iter_mut().take(no_trimmed) {
                old_run.control_log.clear();
            }
            debug!("Dropped control logs of the {} oldest runs", no_trimmed);
        }

        if !self.write_runs_with_fallback(&runs) {
            return None;
        }

        let mut stats = self.get_stats();
        stats.add_run(&run);
        match serde_json::to_string(&stats) {
            Ok(raw) => {
                if let Err(e) = self.backend.set(STATS_KEY, &raw) {
                    warn!("Could not persist accumulated stats: {}", e);
                }
            }
            Err(e) => warn!("Could not serialize accumulated stats: {}", e),
        }

        info!(
            "Saved run {} on {} ({} laps, {} frames)",
            run.id, run.track_id, run.lap_count, run.frames
        );
        Some(run)
    }

    /// write_runs_with_fallback returns false if the runs could not be written at all.
    fn write_runs_with_fallback(&mut self, runs: &[TrainingRun]) -> bool {
        let err = match self.write_runs(runs) {
            Ok(()) => return true,
            Err(e) => e,
        };
        warn!("Could not persist training runs ({}), trimming stored data", err);

        let start = runs.len().saturating_sub(FALLBACK_KEEP_RUNS);
        let trimmed: Vec<TrainingRun> = runs[start..].iter().map(|r| r.without_log()).collect();
        let err = match self.write_runs(&trimmed) {
            Ok(()) => {
                warn!(
                    "Storage full: kept the last {} runs without control logs. Export data regularly to avoid loss.",
                    trimmed.len()
                );
                return true;
            }
            Err(e) => e,
        };

        let start = runs.len().saturating_sub(MINIMAL_KEEP_RUNS);
        let minimal: Vec<TrainingRun> = runs[start..].iter().map(|r| r.without_log()).collect();
        match self.write_runs(&minimal) {
            Ok(()) => {
                warn!(
                    "Storage full ({}): kept only the last {} runs without control logs",
                    err,
                    minimal.len()
                );
                true
            }
            Err(e) => {
                warn!("Storage full: training runs could not be persisted: {}", e);
                false
            }
        }
    }

    fn write_runs(&mut self, runs: &[TrainingRun]) -> anyhow::Result<()> {
        let raw = serde_json::to_string(runs)?;
        self.backend.set(RUNS_KEY, &raw)?;
        Ok(())
    }

    /// set_max_speed_pct persists the speed cap preference.
    pub fn set_max_speed_pct(&mut self, pct: u32) -> anyhow::Result<()> {
        if !(10..=100).contains(&pct) {
            return Err(InputValueError::new(format!(
                "speed cap must be in [10, 100]%, but is {}%",
                pct
            ))
            .into());
        }
        self.backend.set(MAX_SPEED_KEY, &pct.to_string())?;
        Ok(())
    }

    /// clear removes all runs and the accumulated statistics.
    pub fn clear(&mut self) -> anyhow::Result<()> {
        self.backend.remove(RUNS_KEY)?;
        self.backend.remove(STATS_KEY)?;
        info!("Cleared all training data");
        Ok(())
    }

    // ---------------------------------------------------------------------------------------------
    // EXPORT --------------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// export_runs_as_json returns all runs as pretty-printed JSON.
    pub fn export_runs_as_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(&self.get_runs())?)
    }

    /// export_runs_as_csv returns one metadata row per run, the control log is omitted.
    pub fn export_runs_as_csv(&self) -> anyhow::Result<String> {
        runs_to_csv(&self.get_runs())
    }
}

/// runs_to_csv serializes run metadata with the CSV_HEADER columns. A missing best lap is an
/// empty field.
pub fn runs_to_csv(runs: &[TrainingRun]) -> anyhow::Result<String> {
    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(vec![]);
    wtr.write_record(&CSV_HEADER)?;

    for run in runs.iter() {
        wtr.write_record(&[
            run.id.to_owned(),
            run.track_id.to_owned(),
            run.drive_mode.to_string(),
            run.lap_count.to_string(),
            run.frames.to_string(),
            run.best_lap_ms.map_or_else(String::new, |t| t.to_string()),
            run.duration_ms.to_string(),
            run.timestamp.to_owned(),
        ])?;
    }

    let bytes = wtr.into_inner()?;
    let mut content = String::from_utf8(bytes)?;
    if content.ends_with('\n') {
        content.pop();
    }
    Ok(content)
}
