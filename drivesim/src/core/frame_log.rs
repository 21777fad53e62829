use crate::core::car::CarState;
use serde::{Deserialize, Serialize};

/// Tolerance for interval sampling so that six 60 Hz ticks still count as 100 ms.
const SAMPLE_TIME_EPS_MS: f64 = 1e-6;

/// One labeled training sample.
/// * `t` - (ms) Time since the start of the log
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct ControlFrame {
    pub t: f64,
    pub steering: f64,
    pub throttle: f64,
    pub speed: f64,
    pub x: f64,
    pub z: f64,
    pub rotation: f64,
}

impl ControlFrame {
    pub fn from_car(t: f64, car: &CarState) -> ControlFrame {
        ControlFrame {
            t,
            steering: car.steering,
            throttle: car.throttle,
            speed: car.speed,
            x: car.x,
            z: car.z,
            rotation: car.rotation,
        }
    }
}

/// When control frames are sampled.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SamplingPolicy {
    /// Sample on every n-th simulation tick.
    EveryNthTick(u32),
    /// Sample whenever at least this many ms of simulation time passed since the last sample.
    IntervalMs(f64),
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        SamplingPolicy::IntervalMs(100.0)
    }
}

/// FrameLog is the append-only control-frame log of a run together with its sampler state.
#[derive(Debug, Clone)]
pub struct FrameLog {
    policy: SamplingPolicy,
    frames: Vec<ControlFrame>,
    no_ticks: u64,
    t_next_sample: f64,
}

impl FrameLog {
    pub fn new(policy: SamplingPolicy) -> FrameLog {
        let mut log = FrameLog {
            policy,
            frames: Vec::new(),
            no_ticks: 0,
            t_next_sample: 0.0,
        };
        log.clear();
        log
    }

    /// clear drops all frames and restarts the sampler.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.no_ticks = 0;
        self.t_next_sample = match self.policy {
            SamplingPolicy::IntervalMs(interval) => interval,
            SamplingPolicy::EveryNthTick(_) => 0.0,
        };
    }

    /// on_tick is called once per simulation tick with the log time t (ms). It appends a frame
    /// if the sampling policy is due and returns true in that case.
    pub fn on_tick(&mut self, t: f64, car: &CarState) -> bool {
        self.no_ticks += 1;

        let due = match self.policy {
            SamplingPolicy::EveryNthTick(n) => n > 0 && self.no_ticks % n as u64 == 0,
            SamplingPolicy::IntervalMs(interval) => {
                if t + SAMPLE_TIME_EPS_MS >= self.t_next_sample {
                    self.t_next_sample += interval;
                    // after a hitch, do not emit a burst of catch-up samples
                    if self.t_next_sample <= t {
                        self.t_next_sample = t + interval;
                    }
                    true
                } else {
                    false
                }
            }
        };

        if due {
            self.frames.push(ControlFrame::from_car(t, car));
        }
        due
    }

    pub fn frames(&self) -> &[ControlFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_nth_tick() {
        let mut log = FrameLog::new(SamplingPolicy::EveryNthTick(6));
        let car = CarState::default();
        let sampled: Vec<bool> = (1..=12).map(|i| log.on_tick(i as f64, &car)).collect();
        assert_eq!(log.len(), 2);
        assert!(sampled[5] && sampled[11]);
    }

    #[test]
    fn test_interval_at_60hz_samples_every_sixth_tick() {
        let mut log = FrameLog::new(SamplingPolicy::default());
        let car = CarState::default();
        let mut t = 0.0;
        for _ in 0..60 {
            t += 1000.0 / 60.0;
            log.on_tick(t, &car);
        }
        assert_eq!(log.len(), 10);
    }

    #[test]
    fn test_interval_independent_of_tick_rate() {
        let mut log = FrameLog::new(SamplingPolicy::default());
        let car = CarState::default();
        let mut t = 0.0;
        for _ in 0..300 {
            t += 1000.0 / 144.0;
            log.on_tick(t, &car);
        }
        // about 2.08s of driving
        assert_eq!(log.len(), 20);
        assert!(log.frames().windows(2).all(|w| w[1].t > w[0].t));
    }

    #[test]
    fn test_hitch_does_not_burst() {
        let mut log = FrameLog::new(SamplingPolicy::default());
        let car = CarState::default();
        log.on_tick(50.0, &car);
        log.on_tick(1000.0, &car);
        log.on_tick(1010.0, &car);
        assert_eq!(log.len(), 1);
        log.on_tick(1100.0, &car);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_clear_restarts() {
        let mut log = FrameLog::new(SamplingPolicy::EveryNthTick(2));
        let car = CarState::default();
        log.on_tick(1.0, &car);
        log.clear();
        assert!(!log.on_tick(2.0, &car));
        assert!(log.on_tick(3.0, &car));
        assert_eq!(log.frames()[0].t, 3.0);
    }
}
