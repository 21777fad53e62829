use std::error::Error;
use std::f64::consts::PI;
use std::fmt;

/// Squared segment lengths below this value are treated as a single point.
pub const DEGENERATE_SEGMENT_EPS: f64 = 1e-12;

/// InputValueError is used if some parameter does not fulfill the posed requirements, e.g., a
/// track with fewer than three waypoints or a speed cap outside its valid range.
#[derive(Debug, Clone, PartialEq)]
pub struct InputValueError {
    pub reason: String,
}

impl InputValueError {
    pub fn new(reason: impl Into<String>) -> InputValueError {
        InputValueError {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for InputValueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Invalid input value: {}", self.reason)
    }
}

impl Error for InputValueError {}

/// argmin_sq_dist returns the index of the point in pts that is closest to (x, z). Squared
/// distances are compared, ties are resolved in favour of the first point found. Returns 0
/// for an empty slice.
pub fn argmin_sq_dist(x: f64, z: f64, pts: &[(f64, f64)]) -> usize {
    let mut idx_min = 0;
    let mut dist_min = f64::INFINITY;

    for (i, &(px, pz)) in pts.iter().enumerate() {
        let d = sq_dist(x, z, px, pz);
        if d < dist_min {
            dist_min = d;
            idx_min = i;
        }
    }

    idx_min
}

/// sq_dist returns the squared euclidean distance between two points.
pub fn sq_dist(ax: f64, az: f64, bx: f64, bz: f64) -> f64 {
    let dx = bx - ax;
    let dz = bz - az;
    dx * dx + dz * dz
}

/// point_segment_dist returns the distance between point p and the segment [a, b]. The
/// projection parameter is clamped to [0, 1]; a degenerate segment is treated as the point a.
pub fn point_segment_dist(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = b.0 - a.0;
    let dz = b.1 - a.1;
    let len_sq = dx * dx + dz * dz;

    if len_sq < DEGENERATE_SEGMENT_EPS {
        return sq_dist(p.0, p.1, a.0, a.1).sqrt();
    }

    let t = (((p.0 - a.0) * dx + (p.1 - a.1) * dz) / len_sq).clamp(0.0, 1.0);
    let proj_x = a.0 + t * dx;
    let proj_z = a.1 + t * dz;

    sq_dist(p.0, p.1, proj_x, proj_z).sqrt()
}

/// bearing returns the heading from (x, z) towards (tx, tz), measured from the +Z axis
/// (atan2(dx, dz)).
pub fn bearing(x: f64, z: f64, tx: f64, tz: f64) -> f64 {
    (tx - x).atan2(tz - z)
}

/// normalize_angle maps an angle in radians into the half-open interval (-pi, pi].
pub fn normalize_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }

    let mut a = angle % (2.0 * PI);
    if a <= -PI {
        a += 2.0 * PI;
    } else if a > PI {
        a -= 2.0 * PI;
    }
    a
}

/// wrap_index returns (idx + offset) modulo len for a possibly negative offset.
pub fn wrap_index(idx: usize, offset: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let len_i = len as isize;
    (((idx as isize + offset) % len_i + len_i) % len_i) as usize
}

/// trailing_mean returns, for every element i, the mean of the values in the window
/// [i - window, i] (clipped at the start of the slice).
pub fn trailing_mean(x: &[f64], window: usize) -> Vec<f64> {
    (0..x.len())
        .map(|i| {
            let start = i.saturating_sub(window);
            let slice = &x[start..=i];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}
