use anyhow::Context;
use clap::Parser;
use drivesim::core::handle_session::handle_session;
use drivesim::core::session::Session;
use drivesim::core::track::{Track, TrackCatalog};
use drivesim::interfaces::hud_interface::HudState;
use drivesim::interfaces::storage::{FileStorage, StorageBackend};
use drivesim::post::analysis::{
    collect_frames, lap_time_progression, speed_steering_heatmap, track_coverage, FrameStats,
};
use drivesim::post::run_summary::format_lap_time;
use drivesim::post::training_data::TrainingStore;
use drivesim::pre::read_sim_pars::{read_sim_pars, SimPars};
use drivesim::pre::sim_opts::{Command, ExportFormat, SimOpts};
use rayon::prelude::*;
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::Instant;
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// select_track returns the requested track if it is unlocked by the cumulative laps.
fn select_track<'a>(
    catalog: &'a TrackCatalog,
    id: &str,
    total_laps: u32,
) -> anyhow::Result<&'a Track> {
    if !catalog.contains(id) {
        warn!("Unknown track {}, using {}", id, catalog.get_track(id).id);
    }
    let track = catalog.get_track(id);

    if let Some(req) = track.unlock_requirement {
        if !track.is_unlocked(total_laps) {
            anyhow::bail!(
                "Track {} is locked, it requires {} completed laps ({} so far)!",
                track.id,
                req.total_class_laps,
                total_laps
            );
        }
    }
    Ok(track)
}

fn print_hud(hud: &HudState) -> anyhow::Result<()> {
    print!(
        "\rHUD: {:>11} | {:5.1}s | {:5.1}km/h | lap {:2} {} | best {} | {:4} frames | {:4} XP{}",
        hud.mode.to_string(),
        hud.elapsed_ms / 1000.0,
        hud.speed_kmh,
        hud.lap_count + 1,
        format_lap_time(Some(hud.cur_lap_ms)),
        format_lap_time(hud.best_lap_ms),
        hud.frames,
        hud.xp,
        if hud.off_track { " | OFF TRACK" } else { "           " }
    );
    std::io::stdout()
        .flush()
        .context("Failed to flush HUD output!")?;
    Ok(())
}

fn write_export(content: &str, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut fh = std::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)
        .context(format!("Failed to open export file {}!", path.display()))?;
    fh.write_all(content.as_bytes())
        .context(format!("Failed to write export file {}!", path.display()))?;
    Ok(())
}

fn print_tracks<B: StorageBackend>(catalog: &TrackCatalog, store: &TrainingStore<B>) {
    let total_laps = store.get_stats().total_laps;
    println!("RESULT: Tracks ({} laps completed)", total_laps);
    for track in catalog.tracks().iter() {
        let status = match track.unlock_requirement {
            Some(req) if !track.is_unlocked(total_laps) => {
                format!("locked, {} laps required", req.total_class_laps)
            }
            _ => "unlocked".to_owned(),
        };
        println!(
            "{:14} {:14} {:?}, {} waypoints, width {:.1}: {} ({})",
            track.id,
            track.name,
            track.difficulty,
            track.waypoints.len(),
            track.width,
            track.description,
            status
        );
    }
}

fn print_stats<B: StorageBackend>(store: &TrainingStore<B>) {
    let stats = store.get_stats();
    println!("RESULT: Accumulated statistics");
    println!(
        "runs {}, laps {}, frames {}, drive time {:.1}min, best lap {}, speed cap {}%",
        stats.total_runs,
        stats.total_laps,
        stats.total_frames,
        stats.total_drive_time_ms / 60_000.0,
        format_lap_time(stats.best_lap_ms),
        store.max_speed_pct()
    );

    let runs = store.get_runs();
    println!("RESULT: Stored runs ({})", runs.len());
    println!("  #, track,          mode,   laps,  frames, best lap, duration, off-track, timestamp");
    for (i, run) in runs.iter().enumerate() {
        println!(
            "{:3}, {:14}, {:6}, {:5}, {:7}, {:>8}, {:7.1}s, {:9}, {}",
            i + 1,
            run.track_id,
            run.drive_mode.to_string(),
            run.lap_count,
            run.frames,
            format_lap_time(run.best_lap_ms),
            run.duration_ms / 1000.0,
            run.off_track_count,
            run.timestamp
        );
    }
}

fn print_analysis<B: StorageBackend>(store: &TrainingStore<B>) {
    let runs = store.get_runs();
    let frames = collect_frames(&runs);
    if frames.is_empty() {
        println!("INFO: No control frames stored yet, drive some runs first");
    } else {
        FrameStats::new(&frames).print_frame_stats();

        println!("RESULT: Speed (rows, 4.5km/h each, fastest on top) vs steering (columns, right to left)");
        for row in speed_steering_heatmap(&frames).iter().rev() {
            let cells: Vec<String> = row.iter().map(|c| format!("{:5}", c)).collect();
            println!("{}", cells.join(""));
        }
    }

    let progression = lap_time_progression(&runs);
    if !progression.is_empty() {
        println!("RESULT: Best lap progression (s)");
        println!("  #, track,          mode,   best,  trend");
        for point in progression.iter() {
            println!(
                "{:3}, {:14}, {:6}, {:6.3}, {:6.3}",
                point.idx,
                point.track_id,
                point.drive_mode.to_string(),
                point.time_s,
                point.trend_s
            );
        }
    }

    for coverage in track_coverage(&runs).iter() {
        match coverage.bounds {
            Some((x_min, x_max, z_min, z_max)) => println!(
                "RESULT: Coverage {}: {} runs, {} laps, {} positions in x [{:.1}, {:.1}], z [{:.1}, {:.1}]",
                coverage.track_id,
                coverage.no_runs,
                coverage.no_laps,
                coverage.no_positions,
                x_min,
                x_max,
                z_min,
                z_max
            ),
            None => println!(
                "RESULT: Coverage {}: {} runs, {} laps, no positions stored",
                coverage.track_id, coverage.no_runs, coverage.no_laps
            ),
        }
    }
}

fn main() -> anyhow::Result<()> {
    // PRE-PROCESSING ------------------------------------------------------------------------------
    // get simulation options from the command line arguments
    let sim_opts: SimOpts = SimOpts::parse();
    init_logging(sim_opts.debug);

    // get simulation parameters
    let sim_pars = if let Some(parfile_path) = &sim_opts.parfile_path {
        println!("INFO: Reading simulation parameters from {:?}", parfile_path);
        read_sim_pars(parfile_path)?
    } else {
        SimPars::default()
    };
    let catalog = TrackCatalog::new(&sim_pars.tracks)?;

    // open the training data store
    let mut store = TrainingStore::new(FileStorage::new(&sim_opts.data_dir)?);

    // EXECUTION -----------------------------------------------------------------------------------
    match &sim_opts.command {
        Command::Tracks => print_tracks(&catalog, &store),

        Command::Drive {
            track,
            duration,
            live,
            realtime_factor,
            output,
        } => {
            let track = select_track(&catalog, track, store.get_stats().total_laps)?;
            let speed_cap_pct = store.max_speed_pct();
            println!(
                "INFO: Driving {} autonomously for {:.1}s with a time step size of {:.3}s",
                track.name, duration, sim_opts.timestep_size
            );

            let mut session: Session = if !*live {
                let t_start = Instant::now();
                let session = handle_session(
                    &sim_pars,
                    track,
                    speed_cap_pct,
                    *duration,
                    sim_opts.timestep_size,
                    sim_opts.debug,
                    None,
                    1.0,
                )?;
                println!("INFO: Execution time: {}ms", t_start.elapsed().as_millis());
                session
            } else {
                // the simulation runs in its own thread, the HUD is printed from the main thread
                let (tx, rx) = flume::unbounded();
                let sim_pars_thread = sim_pars.clone();
                let track_thread = track.clone();
                let duration_thread = *duration;
                let timestep_size = sim_opts.timestep_size;
                let realtime_factor_thread = *realtime_factor;

                let handle = thread::spawn(move || {
                    handle_session(
                        &sim_pars_thread,
                        &track_thread,
                        speed_cap_pct,
                        duration_thread,
                        timestep_size,
                        false,
                        Some(&tx),
                        realtime_factor_thread,
                    )
                });

                for hud in rx.iter() {
                    print_hud(&hud)?;
                }
                println!();

                handle
                    .join()
                    .map_err(|_| anyhow::anyhow!("Simulation thread panicked!"))??
            };

            let summary = session.stop(&mut store)?;
            summary.print_summary();
            if let Some(path) = output {
                let path = summary.write_summary_to_file(path)?;
                println!("INFO: Run summary written to {}", path);
            }
        }

        Command::Generate {
            runs,
            duration,
            track,
        } => {
            let total_laps = store.get_stats().total_laps;
            let tracks: Vec<&Track> = match track {
                Some(id) => vec![select_track(&catalog, id, total_laps)?],
                None => catalog
                    .tracks()
                    .iter()
                    .filter(|t| t.is_unlocked(total_laps))
                    .collect(),
            };
            if tracks.is_empty() {
                anyhow::bail!("No unlocked track available!");
            }
            let speed_cap_pct = store.max_speed_pct();
            println!(
                "INFO: Generating {} autonomous runs of {:.1}s on {} track(s)",
                runs,
                duration,
                tracks.len()
            );

            let t_start = Instant::now();
            let sessions: Vec<Session> = (0..*runs as usize)
                .into_par_iter()
                .map(|i| {
                    handle_session(
                        &sim_pars,
                        tracks[i % tracks.len()],
                        speed_cap_pct,
                        *duration,
                        sim_opts.timestep_size,
                        false,
                        None,
                        1.0,
                    )
                })
                .collect::<anyhow::Result<Vec<Session>>>()?;
            println!("INFO: Execution time: {}ms", t_start.elapsed().as_millis());

            // the store has a single writer, so the runs are saved one after another
            for mut session in sessions {
                let summary = session.stop(&mut store)?;
                println!(
                    "RESULT: {} on {}: {} laps, best lap {}, {} frames, {} off-track",
                    summary.run_id.as_deref().unwrap_or("(not saved)"),
                    summary.track_id,
                    summary.lap_count(),
                    format_lap_time(summary.best_lap_ms),
                    summary.frames,
                    summary.off_track_count
                );
            }
            print_stats(&store);
        }

        Command::Stats => print_stats(&store),

        Command::Export { format, output } => {
            let content = match format {
                ExportFormat::Json => store.export_runs_as_json()?,
                ExportFormat::Csv => store.export_runs_as_csv()?,
            };
            match output {
                Some(path) => {
                    write_export(&content, path)?;
                    println!("INFO: Exported {} runs to {}", store.get_runs().len(), path.display());
                }
                None => println!("{}", content),
            }
        }

        Command::Analyze => print_analysis(&store),

        Command::Clear => {
            store.clear()?;
            println!("INFO: Cleared all runs and statistics in {}", store.backend().dir().display());
        }

        Command::SpeedCap { pct } => {
            store.set_max_speed_pct(*pct)?;
            println!("INFO: Speed cap set to {}%", pct);
        }
    }

    Ok(())
}
