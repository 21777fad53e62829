use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(
    version = "0.1.0",
    name = "drivesim",
    about = "Arcade track simulator that captures autonomous driving training data"
)]
pub struct SimOpts {
    // FLAGS ---------------------------------------------------------------------------------------
    /// Activate debug printing and debug logging
    #[clap(short, long)]
    pub debug: bool,

    // OPTIONS -------------------------------------------------------------------------------------
    /// Set directory of the training data store
    #[clap(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Set path to the simulation parameter file (OPTIONAL: if not set, reference parameters are used)
    #[clap(short, long)]
    pub parfile_path: Option<PathBuf>,

    /// Set simulation timestep size in seconds, should be in the range [0.001, 1.0]
    #[clap(short, long, default_value = "0.016")]
    pub timestep_size: f64,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List all tracks and whether they are unlocked
    Tracks,

    /// Drive one autonomous run and save it
    Drive {
        /// Track id
        #[clap(long, default_value = "oval")]
        track: String,

        /// Simulated duration of the run in seconds
        #[clap(long, default_value = "60")]
        duration: f64,

        /// Show a live HUD, the run is simulated in real time
        #[clap(short, long)]
        live: bool,

        /// Set real-time factor (only relevant with --live)
        #[clap(short, long, default_value = "1.0")]
        realtime_factor: f64,

        /// Write the run summary to this text file as well
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Drive several autonomous runs in parallel and save them
    Generate {
        /// Number of runs
        #[clap(long, default_value = "4")]
        runs: u32,

        /// Simulated duration of every run in seconds
        #[clap(long, default_value = "60")]
        duration: f64,

        /// Track id (OPTIONAL: if not set, the runs cycle through all unlocked tracks)
        #[clap(long)]
        track: Option<String>,
    },

    /// Print the accumulated statistics and the stored runs
    Stats,

    /// Export all stored runs
    Export {
        /// Export format
        #[clap(long, value_enum, default_value = "json")]
        format: ExportFormat,

        /// Output file (OPTIONAL: if not set, the export is printed)
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Analyze the captured control frames
    Analyze,

    /// Delete all stored runs and statistics
    Clear,

    /// Set the persisted speed cap in percent of the top speed (10-100)
    SpeedCap { pct: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}
