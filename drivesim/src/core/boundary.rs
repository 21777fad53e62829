use crate::core::track::Track;
use helpers::general::point_segment_dist;

/// distance_to_centerline returns the minimum distance from (x, z) to any segment of the
/// closed waypoint loop of the track.
pub fn distance_to_centerline(x: f64, z: f64, track: &Track) -> f64 {
    let n = track.waypoints.len();
    let mut dist_min = f64::INFINITY;

    for i in 0..n {
        let (a, b) = track.segment(i);
        let dist = point_segment_dist((x, z), (a.x, a.z), (b.x, b.z));
        if dist < dist_min {
            dist_min = dist;
        }
    }

    dist_min
}

/// is_off_track returns true if (x, z) is farther than the track half-width from the
/// centerline. A point exactly at the half-width is still on the track.
pub fn is_off_track(x: f64, z: f64, track: &Track) -> bool {
    distance_to_centerline(x, z, track) > track.width
}
