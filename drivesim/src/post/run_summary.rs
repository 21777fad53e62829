use crate::core::lap_detector::LapRecord;
use crate::post::training_data::{AccumulatedStats, DriveMode};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::io::Write as IoWrite;
use std::path::Path;

/// RunSummary contains everything the run-complete screen shows: the run itself plus the
/// cumulative statistics after the run was saved.
/// * `run_id` - Id of the persisted run, None if the run was not persisted (no frames)
/// * `duration_ms` - (ms) Simulated driving time of the run, pauses excluded
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub track_id: String,
    pub drive_mode: DriveMode,
    pub laps: Vec<LapRecord>,
    pub best_lap_ms: Option<f64>,
    pub frames: usize,
    pub off_track_count: u32,
    pub xp: u32,
    pub duration_ms: f64,
    pub run_id: Option<String>,
    pub stats: AccumulatedStats,
}

impl RunSummary {
    pub fn lap_count(&self) -> u32 {
        self.laps.len() as u32
    }

    fn format_summary(&self) -> Result<String, std::fmt::Error> {
        let mut content = String::new();

        writeln!(
            &mut content,
            "RESULT: Run on {} ({}), {:.1}s driven, {} frames captured",
            self.track_id,
            self.drive_mode,
            self.duration_ms / 1000.0,
            self.frames
        )?;
        writeln!(
            &mut content,
            "RESULT: {} laps, best lap {}, {} off-track excursions, {} XP",
            self.lap_count(),
            format_lap_time(self.best_lap_ms),
            self.off_track_count,
            self.xp
        )?;

        if !self.laps.is_empty() {
            writeln!(&mut content, "lap,     time, off-track")?;
            for lap in self.laps.iter() {
                writeln!(
                    &mut content,
                    "{:3}, {:7.3}s, {:9}",
                    lap.lap_number,
                    lap.time_ms / 1000.0,
                    lap.off_track_count
                )?;
            }
        }

        writeln!(
            &mut content,
            "RESULT: Total {} runs, {} laps, {} frames, {:.1}min driven, best lap {}",
            self.stats.total_runs,
            self.stats.total_laps,
            self.stats.total_frames,
            self.stats.total_drive_time_ms / 60_000.0,
            format_lap_time(self.stats.best_lap_ms)
        )?;

        Ok(content)
    }

    /// print_summary prints the run summary to the console output.
    pub fn print_summary(&self) {
        match self.format_summary() {
            Ok(content) => print!("{}", content),
            Err(e) => println!("WARNING: Could not format run summary: {}", e),
        }
    }

    /// write_summary_to_file writes the run summary to a text file and returns its path.
    pub fn write_summary_to_file(&self, path: &Path) -> anyhow::Result<String> {
        let content = self.format_summary()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(path)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;

        Ok(path.to_string_lossy().into_owned())
    }
}

/// format_lap_time renders a lap time as m:ss.mmm, -- if there is none.
pub fn format_lap_time(time_ms: Option<f64>) -> String {
    match time_ms {
        Some(t) if t.is_finite() && t >= 0.0 => {
            let total_ms = t.round() as u64;
            format!(
                "{}:{:02}.{:03}",
                total_ms / 60_000,
                (total_ms / 1000) % 60,
                total_ms % 1000
            )
        }
        _ => "--".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> RunSummary {
        RunSummary {
            track_id: "oval".to_owned(),
            drive_mode: DriveMode::Ai,
            laps: vec![
                LapRecord {
                    lap_number: 1,
                    time_ms: 7450.0,
                    off_track_count: 0,
                    collisions: 0,
                },
                LapRecord {
                    lap_number: 2,
                    time_ms: 6417.0,
                    off_track_count: 1,
                    collisions: 0,
                },
            ],
            best_lap_ms: Some(6417.0),
            frames: 150,
            off_track_count: 1,
            xp: 125,
            duration_ms: 15000.0,
            run_id: Some("id".to_owned()),
            stats: AccumulatedStats {
                total_runs: 3,
                total_laps: 5,
                total_frames: 400,
                total_drive_time_ms: 120_000.0,
                best_lap_ms: Some(6417.0),
            },
        }
    }

    #[test]
    fn test_format_lap_time() {
        assert_eq!(format_lap_time(Some(6417.0)), "0:06.417");
        assert_eq!(format_lap_time(Some(83_004.4)), "1:23.004");
        assert_eq!(format_lap_time(None), "--");
        assert_eq!(format_lap_time(Some(f64::NAN)), "--");
    }

    #[test]
    fn test_summary_text() {
        let content = summary().format_summary().unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "RESULT: Run on oval (ai), 15.0s driven, 150 frames captured"
        );
        assert_eq!(
            lines[1],
            "RESULT: 2 laps, best lap 0:06.417, 1 off-track excursions, 125 XP"
        );
        assert_eq!(lines[3], "  1,   7.450s,         0");
        assert!(lines[5].starts_with("RESULT: Total 3 runs, 5 laps, 400 frames, 2.0min"));
    }

    #[test]
    fn test_write_summary_to_file() {
        let path = std::env::temp_dir()
            .join(format!("drivesim-summary-{}", uuid::Uuid::new_v4()))
            .join("last_run.txt");
        let written = summary().write_summary_to_file(&path).unwrap();
        let content = std::fs::read_to_string(&written).unwrap();
        assert!(content.contains("best lap 0:06.417"));
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }
}
