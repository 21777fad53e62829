use crate::core::car::KeyState;
use crate::core::session::Session;
use crate::core::track::Track;
use crate::interfaces::hud_interface::{HudState, MAX_HUD_UPDATE_FREQUENCY};
use crate::post::run_summary::format_lap_time;
use crate::post::training_data::DriveMode;
use crate::pre::read_sim_pars::SimPars;
use anyhow::Context;
use flume::Sender;
use helpers::general::InputValueError;
use std::thread::sleep;
use std::time::{Duration, Instant};

/// handle_session drives an autonomous session on the given track for duration_s seconds of
/// simulated time with a fixed timestep. The finished session is returned still running, so
/// nothing is persisted until the caller stops it. If a sender is inserted, the session runs in
/// real time (scaled by realtime_factor) and HUD snapshots are sent to it.
#[allow(clippy::too_many_arguments)]
pub fn handle_session(
    sim_pars: &SimPars,
    track: &Track,
    speed_cap_pct: u32,
    duration_s: f64,
    timestep_size: f64,
    print_debug: bool,
    tx: Option<&Sender<HudState>>,
    realtime_factor: f64,
) -> anyhow::Result<Session> {
    if !(0.001..=1.0).contains(&timestep_size) {
        return Err(InputValueError::new(format!(
            "timestep size must be in [0.001, 1.0]s, but is {}s",
            timestep_size
        ))
        .into());
    }
    if !(duration_s > 0.0) {
        return Err(InputValueError::new(format!(
            "session duration must be positive, but is {}s",
            duration_s
        ))
        .into());
    }
    if tx.is_some() && !(realtime_factor > 0.0) {
        return Err(InputValueError::new(format!(
            "real-time factor must be positive, but is {}",
            realtime_factor
        ))
        .into());
    }
    if timestep_size > sim_pars.car_pars.max_dt {
        println!(
            "WARNING: Timestep size {:.3}s exceeds max_dt, the physics integrates only {:.3}s per step!",
            timestep_size, sim_pars.car_pars.max_dt
        );
    }

    let mut session = Session::new(sim_pars, track);
    session.set_max_speed_pct(speed_cap_pct)?;
    session.start(track, DriveMode::Ai)?;

    let no_steps = (duration_s / timestep_size).round() as u64;
    let keys = KeyState::default();
    let mut t_update_print = 0.0;
    let mut t_update_hud = f64::NEG_INFINITY;

    for _ in 0..no_steps {
        let t_start = Instant::now();

        if let Some(ev) = session.tick(timestep_size, &keys) {
            if print_debug {
                println!(
                    "INFO: Lap {} completed in {} ({} off-track)",
                    ev.record.lap_number,
                    format_lap_time(Some(ev.record.time_ms)),
                    ev.record.off_track_count
                );
            }
        }

        let t_run = session.elapsed_ms() / 1000.0;
        if print_debug && t_run > t_update_print + 0.9999 {
            let hud = session.hud_state();
            println!(
                "INFO: Simulating... Current run time is {:.3}s, speed {:.1}km/h, {} laps",
                t_run, hud.speed_kmh, hud.lap_count
            );
            t_update_print = t_run;
        }

        if let Some(tx) = tx {
            if t_run > t_update_hud + 1.0 / MAX_HUD_UPDATE_FREQUENCY - 0.001 {
                tx.send(session.hud_state())
                    .context("Failed to send HUD state!")?;
                t_update_hud = t_run;
            }

            // sleep until the time step is finished in real time as well (calculation in ms)
            let t_sleep = (timestep_size * 1000.0 / realtime_factor) as i64
                - t_start.elapsed().as_millis() as i64;

            if t_sleep > 0 {
                sleep(Duration::from_millis(t_sleep as u64));
            }
        }
    }

    if let Some(tx) = tx {
        tx.send(session.hud_state())
            .context("Failed to send final HUD state!")?;
    }

    Ok(session)
}
