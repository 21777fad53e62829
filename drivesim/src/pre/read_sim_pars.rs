use crate::core::car::CarPars;
use crate::core::driver::DriverPars;
use crate::core::frame_log::SamplingPolicy;
use crate::core::lap_detector::LapPars;
use crate::core::track::TrackPars;
use anyhow::Context;
use serde::Deserialize;
use std::fs::OpenOptions;
use std::path::Path;

/// SimPars is used to store all other parameter structs. Every field is optional in the
/// parameter file, missing ones keep their reference values.
/// * `tracks` - Additional tracks, a track with a built-in id replaces the built-in one
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SimPars {
    pub car_pars: CarPars,
    pub lap_pars: LapPars,
    pub driver_pars: DriverPars,
    pub sampling: SamplingPolicy,
    pub tracks: Vec<TrackPars>,
}

/// read_sim_pars reads the JSON file and decodes the JSON string into the simulation parameters
/// struct.
pub fn read_sim_pars(filepath: &Path) -> anyhow::Result<SimPars> {
    let fh = OpenOptions::new()
        .read(true)
        .open(filepath)
        .context(format!(
            "Failed to open parameter file {}!",
            filepath.display()
        ))?;
    let pars = serde_json::from_reader(&fh).context(format!(
        "Failed to parse parameter file {}!",
        filepath.display()
    ))?;
    Ok(pars)
}

/// read_track_pars reads a single custom track definition from a JSON file.
pub fn read_track_pars(filepath: &Path) -> anyhow::Result<TrackPars> {
    let fh = OpenOptions::new()
        .read(true)
        .open(filepath)
        .context(format!(
            "Failed to open track file {}!",
            filepath.display()
        ))?;
    let pars = serde_json::from_reader(&fh).context(format!(
        "Failed to parse track file {}!",
        filepath.display()
    ))?;
    Ok(pars)
}
