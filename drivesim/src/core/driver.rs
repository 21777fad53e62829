use crate::core::car::{CarPars, CarState, ControlIntent, Longitudinal};
use crate::core::track::Track;
use helpers::general::{argmin_sq_dist, bearing, normalize_angle, sq_dist, wrap_index};
use serde::{Deserialize, Serialize};

/// * `search_window` - Waypoints searched on each side of the previously matched waypoint
/// * `lookahead` - Number of waypoints between the matched waypoint and the steering target
/// * `steering_gain` - Steering command per radian of heading error
/// * `sharp_turn_threshold` - (rad) Heading error above which the target speed is reduced
/// * `sharp_turn_speed_factor` - Target speed multiplier in sharp turns
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct DriverPars {
    pub search_window: usize,
    pub lookahead: usize,
    pub steering_gain: f64,
    pub sharp_turn_threshold: f64,
    pub sharp_turn_speed_factor: f64,
}

impl Default for DriverPars {
    fn default() -> Self {
        DriverPars {
            search_window: 10,
            lookahead: 2,
            steering_gain: 2.5,
            sharp_turn_threshold: 0.4,
            sharp_turn_speed_factor: 0.5,
        }
    }
}

/// AutoDriver is a pure-pursuit style controller that follows the waypoint loop of a track.
/// The only state it keeps is the index of the waypoint matched in the previous tick.
#[derive(Debug, Clone)]
pub struct AutoDriver {
    driver_pars: DriverPars,
    idx_matched: usize,
}

impl AutoDriver {
    pub fn new(driver_pars: DriverPars) -> AutoDriver {
        AutoDriver {
            driver_pars,
            idx_matched: 0,
        }
    }

    /// reseed matches the car against all waypoints, used whenever the car was teleported.
    pub fn reseed(&mut self, car: &CarState, track: &Track) {
        let pts: Vec<(f64, f64)> = track.waypoints.iter().map(|p| (p.x, p.z)).collect();
        self.idx_matched = argmin_sq_dist(car.x, car.z, &pts);
    }

    pub fn idx_matched(&self) -> usize {
        self.idx_matched
    }

    /// find_nearest searches the window around the previously matched waypoint and returns
    /// the index of the closest waypoint (first found on ties, starting at the window start).
    fn find_nearest(&self, car: &CarState, track: &Track) -> usize {
        let n = track.waypoints.len();
        if n == 0 {
            return 0;
        }

        // never visit a waypoint twice if the window covers the whole loop
        let half = self.driver_pars.search_window.min((n - 1) / 2) as isize;
        let idx_prev = self.idx_matched % n;

        let mut idx_min = idx_prev;
        let mut dist_min = f64::INFINITY;

        for offset in -half..=half {
            let idx = wrap_index(idx_prev, offset, n);
            let p = track.waypoints[idx];
            let d = sq_dist(car.x, car.z, p.x, p.z);
            if d < dist_min {
                dist_min = d;
                idx_min = idx;
            }
        }

        idx_min
    }

    /// control returns the steering and target speed for the current tick.
    pub fn control(&mut self, car: &CarState, track: &Track, car_pars: &CarPars) -> ControlIntent {
        let n = track.waypoints.len();
        if n == 0 {
            return ControlIntent::idle();
        }

        self.idx_matched = self.find_nearest(car, track);
        let target = track.waypoints[(self.idx_matched + self.driver_pars.lookahead) % n];

        let heading_des = bearing(car.x, car.z, target.x, target.z);
        let heading_err = normalize_angle(heading_des - car.rotation);
        let steering = (heading_err * self.driver_pars.steering_gain).clamp(-1.0, 1.0);

        let mut target_speed = car_pars.effective_max_speed();
        if heading_err.abs() > self.driver_pars.sharp_turn_threshold {
            target_speed *= self.driver_pars.sharp_turn_speed_factor;
        }

        ControlIntent {
            steering,
            longitudinal: Longitudinal::TargetSpeed(target_speed),
        }
    }
}
