use helpers::general::{argmin_sq_dist, bearing, InputValueError};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
    Special,
}

/// A single centerline point of a track in the ground plane.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub x: f64,
    pub z: f64,
}

impl TrackPoint {
    pub fn new(x: f64, z: f64) -> TrackPoint {
        TrackPoint { x, z }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnlockRequirement {
    pub total_class_laps: u32,
}

/// * `id` - Track identifier, e.g. oval
/// * `name` - Display name
/// * `difficulty` - Difficulty class
/// * `description` - Short description shown in the track menu
/// * `width` - Track half-width
/// * `spawn_pos` - Spawn position (x, y, z), y is the render height only
/// * `waypoints` - Closed loop of centerline points, the last point connects to the first
/// * `unlock_requirement` - Minimum cumulative laps required to drive the track
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TrackPars {
    pub id: String,
    pub name: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub description: String,
    pub width: f64,
    pub spawn_pos: [f64; 3],
    pub waypoints: Vec<TrackPoint>,
    #[serde(default)]
    pub unlock_requirement: Option<UnlockRequirement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub difficulty: Difficulty,
    pub description: String,
    pub width: f64,
    pub spawn_pos: [f64; 3],
    pub spawn_rotation: f64,
    pub waypoints: Vec<TrackPoint>,
    pub unlock_requirement: Option<UnlockRequirement>,
}

/// compute_spawn_rotation returns the heading (measured from the +Z axis) from the spawn point
/// towards the waypoint that follows the waypoint closest to the spawn point. A car spawned
/// with this rotation faces the direction of travel.
pub fn compute_spawn_rotation(spawn_x: f64, spawn_z: f64, waypoints: &[TrackPoint]) -> f64 {
    if waypoints.is_empty() {
        return 0.0;
    }

    let pts: Vec<(f64, f64)> = waypoints.iter().map(|p| (p.x, p.z)).collect();
    let idx_closest = argmin_sq_dist(spawn_x, spawn_z, &pts);
    let next = waypoints[(idx_closest + 1) % waypoints.len()];

    bearing(spawn_x, spawn_z, next.x, next.z)
}

impl Track {
    /// The method creates a track from its parameters and derives the spawn rotation. Tracks
    /// must have at least three waypoints and a positive half-width.
    pub fn new(track_pars: &TrackPars) -> Result<Track, InputValueError> {
        if track_pars.waypoints.len() < 3 {
            return Err(InputValueError::new(format!(
                "track {} has {} waypoints, at least 3 are required",
                track_pars.id,
                track_pars.waypoints.len()
            )));
        }
        if !(track_pars.width > 0.0) {
            return Err(InputValueError::new(format!(
                "track {} has a non-positive width {}",
                track_pars.id, track_pars.width
            )));
        }

        let spawn_rotation = compute_spawn_rotation(
            track_pars.spawn_pos[0],
            track_pars.spawn_pos[2],
            &track_pars.waypoints,
        );

        Ok(Track {
            id: track_pars.id.to_owned(),
            name: track_pars.name.to_owned(),
            difficulty: track_pars.difficulty,
            description: track_pars.description.to_owned(),
            width: track_pars.width,
            spawn_pos: track_pars.spawn_pos,
            spawn_rotation,
            waypoints: track_pars.waypoints.to_owned(),
            unlock_requirement: track_pars.unlock_requirement,
        })
    }

    pub fn spawn_xz(&self) -> (f64, f64) {
        (self.spawn_pos[0], self.spawn_pos[2])
    }

    /// The method returns the closed-loop segment i, i.e. [waypoints[i], waypoints[(i+1) mod n]].
    pub fn segment(&self, i: usize) -> (TrackPoint, TrackPoint) {
        let n = self.waypoints.len();
        (self.waypoints[i % n], self.waypoints[(i + 1) % n])
    }

    /// The method returns true if the given number of cumulative laps unlocks the track.
    pub fn is_unlocked(&self, total_laps: u32) -> bool {
        match self.unlock_requirement {
            Some(req) => total_laps >= req.total_class_laps,
            None => true,
        }
    }
}

// -------------------------------------------------------------------------------------------------
// BUILT-IN TRACKS ---------------------------------------------------------------------------------
// -------------------------------------------------------------------------------------------------

fn oval_waypoints(cx: f64, cz: f64, rx: f64, rz: f64, n: usize) -> Vec<TrackPoint> {
    (0..n)
        .map(|i| {
            let angle = i as f64 / n as f64 * PI * 2.0;
            TrackPoint::new(cx + angle.cos() * rx, cz + angle.sin() * rz)
        })
        .collect()
}

fn s_curve_waypoints(n: usize) -> Vec<TrackPoint> {
    (0..n)
        .map(|i| {
            let angle = i as f64 / n as f64 * PI * 2.0;
            TrackPoint::new(
                angle.sin() * 30.0 + (angle * 2.0).sin() * 12.0,
                angle.cos() * 40.0,
            )
        })
        .collect()
}

const CITY_WAYPOINTS: [(f64, f64); 19] = [
    (-25.0, -25.0),
    (-25.0, 25.0),
    (-15.0, 30.0),
    (0.0, 25.0),
    (5.0, 15.0),
    (15.0, 10.0),
    (25.0, 15.0),
    (30.0, 25.0),
    (25.0, 30.0),
    (15.0, 25.0),
    (10.0, 15.0),
    (15.0, 5.0),
    (25.0, 0.0),
    (25.0, -15.0),
    (20.0, -25.0),
    (10.0, -30.0),
    (0.0, -25.0),
    (-10.0, -30.0),
    (-20.0, -28.0),
];

/// builtin_track_pars returns the parameters of the tracks shipped with the simulator.
pub fn builtin_track_pars() -> Vec<TrackPars> {
    vec![
        TrackPars {
            id: "oval".to_owned(),
            name: "Oval".to_owned(),
            difficulty: Difficulty::Beginner,
            description: "Simple loop, learn the controls".to_owned(),
            width: 5.0,
            spawn_pos: [30.0, 0.5, 0.0],
            waypoints: oval_waypoints(0.0, 0.0, 30.0, 20.0, 64),
            unlock_requirement: None,
        },
        TrackPars {
            id: "s-curves".to_owned(),
            name: "S-Curves".to_owned(),
            difficulty: Difficulty::Intermediate,
            description: "Tests smooth steering transitions".to_owned(),
            width: 4.5,
            spawn_pos: [0.0, 0.5, -40.0],
            waypoints: s_curve_waypoints(80),
            unlock_requirement: Some(UnlockRequirement {
                total_class_laps: 10,
            }),
        },
        TrackPars {
            id: "city-circuit".to_owned(),
            name: "City Circuit".to_owned(),
            difficulty: Difficulty::Advanced,
            description: "Tight turns, intersections".to_owned(),
            width: 4.0,
            spawn_pos: [-25.0, 0.5, -25.0],
            waypoints: CITY_WAYPOINTS
                .iter()
                .map(|&(x, z)| TrackPoint::new(x, z))
                .collect(),
            unlock_requirement: Some(UnlockRequirement {
                total_class_laps: 30,
            }),
        },
    ]
}

/// TrackCatalog holds all tracks known at startup. The first track is the fallback for
/// unknown ids.
#[derive(Debug, Clone)]
pub struct TrackCatalog {
    tracks: Vec<Track>,
}

impl TrackCatalog {
    /// The method creates a catalog from the built-in tracks plus the given custom tracks.
    /// Custom tracks replace built-in tracks with the same id.
    pub fn new(custom_track_pars: &[TrackPars]) -> Result<TrackCatalog, InputValueError> {
        let mut tracks = Vec::new();

        for track_pars in builtin_track_pars().iter() {
            tracks.push(Track::new(track_pars)?);
        }

        for track_pars in custom_track_pars.iter() {
            let track = Track::new(track_pars)?;
            match tracks.iter().position(|t| t.id == track.id) {
                Some(idx) => tracks[idx] = track,
                None => tracks.push(track),
            }
        }

        Ok(TrackCatalog { tracks })
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// get_track returns the track with the given id, falling back to the default track.
    pub fn get_track(&self, id: &str) -> &Track {
        self.tracks
            .iter()
            .find(|t| t.id == id)
            .unwrap_or(&self.tracks[0])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tracks.iter().any(|t| t.id == id)
    }
}

impl Default for TrackCatalog {
    fn default() -> Self {
        let tracks = builtin_track_pars()
            .iter()
            .filter_map(|track_pars| Track::new(track_pars).ok())
            .collect();
        TrackCatalog { tracks }
    }
}
