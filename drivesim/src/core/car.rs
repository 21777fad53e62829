use crate::core::track::Track;
use helpers::general::InputValueError;
use serde::{Deserialize, Serialize};

pub const MIN_SPEED_CAP_PCT: u32 = 10;
pub const MAX_SPEED_CAP_PCT: u32 = 100;

/// Arcade vehicle constants.
/// * `max_speed` - (units/s) Top forward speed before any speed cap is applied
/// * `acceleration` - (units/s^2) Speed gain while accelerating
/// * `brake_force` - (units/s^2) Speed loss while braking or reversing
/// * `friction` - (units/s^2) Speed decay towards zero while coasting
/// * `max_reverse_speed` - (units/s) Magnitude of the reverse speed floor
/// * `turn_speed` - (rad/s) Turn rate at full steering and full speed
/// * `min_turn_speed` - (units/s) Below this |speed| the car cannot rotate
/// * `max_dt` - (s) Upper bound for a single integration step
/// * `off_track_decay` - Speed multiplier applied per tick while off-track
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct CarPars {
    pub max_speed: f64,
    pub acceleration: f64,
    pub brake_force: f64,
    pub friction: f64,
    pub max_reverse_speed: f64,
    pub turn_speed: f64,
    pub min_turn_speed: f64,
    pub max_dt: f64,
    pub off_track_decay: f64,
    #[serde(skip)]
    speed_cap_pct: u32,
}

impl Default for CarPars {
    fn default() -> Self {
        CarPars {
            max_speed: 25.0,
            acceleration: 12.0,
            brake_force: 20.0,
            friction: 4.0,
            max_reverse_speed: 5.0,
            turn_speed: 2.5,
            min_turn_speed: 0.5,
            max_dt: 0.05,
            off_track_decay: 0.95,
            speed_cap_pct: MAX_SPEED_CAP_PCT,
        }
    }
}

impl CarPars {
    /// The method sets the user speed cap in percent of max_speed (10..=100).
    pub fn set_speed_cap_pct(&mut self, pct: u32) -> Result<(), InputValueError> {
        if !(MIN_SPEED_CAP_PCT..=MAX_SPEED_CAP_PCT).contains(&pct) {
            return Err(InputValueError::new(format!(
                "speed cap must be in [{}, {}]%, but is {}%",
                MIN_SPEED_CAP_PCT, MAX_SPEED_CAP_PCT, pct
            )));
        }
        self.speed_cap_pct = pct;
        Ok(())
    }

    pub fn speed_cap_pct(&self) -> u32 {
        self.speed_cap_pct
    }

    /// effective_max_speed returns max_speed reduced by the speed cap.
    pub fn effective_max_speed(&self) -> f64 {
        self.max_speed * self.speed_cap_pct as f64 / 100.0
    }

    /// clamp_dt bounds the integration step, negative and non-finite steps become 0.
    pub fn clamp_dt(&self, dt: f64) -> f64 {
        if dt.is_finite() && dt > 0.0 {
            dt.min(self.max_dt)
        } else {
            0.0
        }
    }
}

/// How the longitudinal motion is commanded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Longitudinal {
    /// Pedal intent in [-0.5, 1]: positive accelerates, negative brakes/reverses, zero coasts.
    Pedal(f64),
    /// Target speed the car eases towards (autonomous driving).
    TargetSpeed(f64),
}

/// Input intent for one tick.
/// * `steering` - Steering command in [-1, 1], positive turns towards increasing rotation
/// * `longitudinal` - Throttle/brake intent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlIntent {
    pub steering: f64,
    pub longitudinal: Longitudinal,
}

impl ControlIntent {
    pub fn idle() -> ControlIntent {
        ControlIntent {
            steering: 0.0,
            longitudinal: Longitudinal::Pedal(0.0),
        }
    }
}

/// Pressed-key state, debounced by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    pub accelerate: bool,
    pub brake: bool,
    pub left: bool,
    pub right: bool,
}

impl KeyState {
    /// from_pressed maps a set of pressed key names (arrow keys or WASD) to driving intent.
    pub fn from_pressed<'a, I>(keys: I) -> KeyState
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut state = KeyState::default();
        for key in keys {
            match key {
                "ArrowUp" | "w" | "W" => state.accelerate = true,
                "ArrowDown" | "s" | "S" => state.brake = true,
                "ArrowLeft" | "a" | "A" => state.left = true,
                "ArrowRight" | "d" | "D" => state.right = true,
                _ => {}
            }
        }
        state
    }

    /// to_intent converts the key state into a control intent. Brake wins over accelerate,
    /// right wins over left.
    pub fn to_intent(&self) -> ControlIntent {
        let mut pedal = 0.0;
        if self.accelerate {
            pedal = 1.0;
        }
        if self.brake {
            pedal = -0.5;
        }

        let mut steering = 0.0;
        if self.left {
            steering = 1.0;
        }
        if self.right {
            steering = -1.0;
        }

        ControlIntent {
            steering,
            longitudinal: Longitudinal::Pedal(pedal),
        }
    }
}

/// Kinematic state of the car.
/// * `x`, `z` - Position in the ground plane
/// * `rotation` - (rad) Heading, 0 faces +Z, positive steering increases it
/// * `speed` - (units/s) Signed speed, forward positive
/// * `steering` - Last applied steering command in [-1, 1]
/// * `throttle` - Last applied forward throttle in [0, 1]
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq)]
pub struct CarState {
    pub x: f64,
    pub z: f64,
    pub rotation: f64,
    pub speed: f64,
    pub steering: f64,
    pub throttle: f64,
}

impl CarState {
    /// spawn returns a car at rest on the spawn pose of the given track.
    pub fn spawn(track: &Track) -> CarState {
        CarState {
            x: track.spawn_pos[0],
            z: track.spawn_pos[2],
            rotation: track.spawn_rotation,
            speed: 0.0,
            steering: 0.0,
            throttle: 0.0,
        }
    }

    /// step integrates one tick of arcade physics and returns the new state. dt is clamped to
    /// car_pars.max_dt.
    pub fn step(&self, intent: &ControlIntent, dt: f64, car_pars: &CarPars) -> CarState {
        let dt = car_pars.clamp_dt(dt);
        let max_speed = car_pars.effective_max_speed();
        let mut next = *self;

        // longitudinal
        match intent.longitudinal {
            Longitudinal::Pedal(pedal) => {
                let pedal = pedal.clamp(-0.5, 1.0);
                if pedal > 0.0 {
                    next.speed = (next.speed + car_pars.acceleration * dt).min(max_speed);
                } else if pedal < 0.0 {
                    next.speed =
                        (next.speed - car_pars.brake_force * dt).max(-car_pars.max_reverse_speed);
                } else {
                    next.speed = coast(next.speed, car_pars.friction * dt);
                }
                next.throttle = pedal.max(0.0);
            }
            Longitudinal::TargetSpeed(target) => {
                let target = target.clamp(-car_pars.max_reverse_speed, max_speed);
                if next.speed < target {
                    next.speed = (next.speed + car_pars.acceleration * dt).min(target);
                } else if next.speed > target {
                    next.speed = (next.speed - car_pars.friction * dt).max(target);
                }
                next.throttle = if max_speed > 0.0 {
                    (target / max_speed).clamp(0.0, 1.0)
                } else {
                    0.0
                };
            }
        }

        // lateral
        let steering = if intent.steering.is_finite() {
            intent.steering.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        next.steering = steering;

        if next.speed.abs() > car_pars.min_turn_speed {
            let turn_factor = (next.speed / car_pars.max_speed) * 0.7 + 0.3;
            next.rotation += steering * car_pars.turn_speed * turn_factor * dt;
        }

        // position
        next.x += next.rotation.sin() * next.speed * dt;
        next.z += next.rotation.cos() * next.speed * dt;

        next
    }

    /// apply_off_track_penalty bleeds speed while the car is off-track.
    pub fn apply_off_track_penalty(&mut self, car_pars: &CarPars) {
        self.speed *= car_pars.off_track_decay;
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed.abs() * 3.6
    }
}

/// coast decays speed towards zero by decay without overshooting.
fn coast(speed: f64, decay: f64) -> f64 {
    if speed > 0.0 {
        (speed - decay).max(0.0)
    } else if speed < 0.0 {
        (speed + decay).min(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use proptest::prelude::*;

    fn accel() -> ControlIntent {
        KeyState {
            accelerate: true,
            ..KeyState::default()
        }
        .to_intent()
    }

    #[test]
    fn test_acceleration_is_deterministic() {
        let pars = CarPars::default();
        let mut car = CarState::default();
        for _ in 0..5 {
            car = car.step(&accel(), 0.1, &pars);
        }
        // 0.1 exceeds max_dt, so each tick integrates 0.05s
        assert_relative_eq!(car.speed, 12.0 * 0.05 * 5.0, epsilon = 1e-12);

        let mut pars = CarPars::default();
        pars.max_dt = 0.1;
        let mut car = CarState::default();
        for _ in 0..5 {
            car = car.step(&accel(), 0.1, &pars);
        }
        assert_relative_eq!(car.speed, 6.0, epsilon = 1e-12);
        assert_eq!(car.throttle, 1.0);
    }

    #[test]
    fn test_coasting_never_overshoots_zero() {
        let pars = CarPars::default();
        let car = CarState {
            speed: 0.1,
            ..CarState::default()
        };
        let next = car.step(&ControlIntent::idle(), 0.05, &pars);
        assert_eq!(next.speed, 0.0);

        let car = CarState {
            speed: -0.1,
            ..CarState::default()
        };
        let next = car.step(&ControlIntent::idle(), 0.05, &pars);
        assert_eq!(next.speed, 0.0);
    }

    #[test]
    fn test_reverse_floor() {
        let pars = CarPars::default();
        let brake = KeyState {
            brake: true,
            ..KeyState::default()
        }
        .to_intent();
        let mut car = CarState::default();
        for _ in 0..100 {
            car = car.step(&brake, 0.05, &pars);
        }
        assert_eq!(car.speed, -5.0);
        assert_eq!(car.throttle, 0.0);
    }

    #[test]
    fn test_no_rotation_when_nearly_stationary() {
        let pars = CarPars::default();
        let intent = ControlIntent {
            steering: 1.0,
            longitudinal: Longitudinal::Pedal(0.0),
        };
        let car = CarState {
            speed: 0.4,
            ..CarState::default()
        };
        let next = car.step(&intent, 0.05, &pars);
        assert_eq!(next.rotation, 0.0);
        assert_eq!(next.steering, 1.0);
    }

    #[test]
    fn test_turn_rate_scales_with_speed() {
        let pars = CarPars::default();
        let intent = ControlIntent {
            steering: 1.0,
            longitudinal: Longitudinal::TargetSpeed(25.0),
        };
        let car = CarState {
            speed: 25.0,
            ..CarState::default()
        };
        let next = car.step(&intent, 0.05, &pars);
        // turn factor is 1.0 at max speed
        assert_abs_diff_eq!(next.rotation, 2.5 * 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_position_integrates_along_heading() {
        let pars = CarPars::default();
        let car = CarState {
            speed: 10.0,
            rotation: std::f64::consts::FRAC_PI_2,
            ..CarState::default()
        };
        let intent = ControlIntent {
            steering: 0.0,
            longitudinal: Longitudinal::TargetSpeed(10.0),
        };
        let next = car.step(&intent, 0.05, &pars);
        assert_abs_diff_eq!(next.x, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(next.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_target_speed_is_asymmetric() {
        let pars = CarPars::default();
        let car = CarState {
            speed: 20.0,
            ..CarState::default()
        };
        let slow_down = ControlIntent {
            steering: 0.0,
            longitudinal: Longitudinal::TargetSpeed(12.5),
        };
        let next = car.step(&slow_down, 0.05, &pars);
        assert_relative_eq!(next.speed, 20.0 - 4.0 * 0.05, epsilon = 1e-12);
        assert_relative_eq!(next.throttle, 0.5, epsilon = 1e-12);

        let car = CarState {
            speed: 12.4,
            ..CarState::default()
        };
        let next = car.step(&slow_down, 0.05, &pars);
        // acceleration would overshoot, so the target is reached exactly
        assert_eq!(next.speed, 12.5);
    }

    #[test]
    fn test_speed_cap() {
        let mut pars = CarPars::default();
        assert!(pars.set_speed_cap_pct(5).is_err());
        assert!(pars.set_speed_cap_pct(101).is_err());
        pars.set_speed_cap_pct(40).unwrap();
        let mut car = CarState::default();
        for _ in 0..200 {
            car = car.step(&accel(), 0.05, &pars);
        }
        assert_relative_eq!(car.speed, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_key_mapping() {
        let keys = KeyState::from_pressed(vec!["w", "ArrowLeft", "x"]);
        assert_eq!(
            keys,
            KeyState {
                accelerate: true,
                brake: false,
                left: true,
                right: false
            }
        );
        let intent = KeyState::from_pressed(vec!["W", "S", "a", "D"]).to_intent();
        assert_eq!(intent.steering, -1.0);
        assert_eq!(intent.longitudinal, Longitudinal::Pedal(-0.5));
    }

    #[test]
    fn test_off_track_penalty() {
        let pars = CarPars::default();
        let mut car = CarState {
            speed: 20.0,
            ..CarState::default()
        };
        car.apply_off_track_penalty(&pars);
        assert_relative_eq!(car.speed, 19.0, epsilon = 1e-12);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_speed_never_exceeds_max(dts in proptest::collection::vec(0.0f64..0.2, 1..400)) {
            let pars = CarPars::default();
            let mut car = CarState::default();
            for dt in dts {
                car = car.step(&accel(), dt, &pars);
                prop_assert!(car.speed <= pars.max_speed);
            }
        }
    }
}
