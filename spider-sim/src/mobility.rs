//! Node identity, positions and mobility models.
//!
//! Two models are supported: a node either sits at a constant position or
//! follows a list of timed waypoints with linear motion in between. Setting a
//! position explicitly always turns the node into a constant-position node,
//! which is how failure injection parks a node far away and later brings it
//! back.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// Stable integer identity of a simulated node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point in 3D space, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Z coordinate
    pub z: f64,
}

impl Vector3 {
    /// Creates a vector from its coordinates.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Vector3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Linear interpolation, `t` in `[0, 1]`.
    pub fn lerp(&self, other: &Vector3, t: f64) -> Vector3 {
        Vector3 {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A position the node reaches at a given simulation time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    /// Arrival time
    pub time: Duration,
    /// Position at arrival
    pub position: Vector3,
}

impl Waypoint {
    /// Creates a waypoint.
    pub fn new(time: Duration, position: Vector3) -> Self {
        Self { time, position }
    }
}

/// How a node's position evolves over time.
#[derive(Debug, Clone, PartialEq)]
pub enum MobilityModel {
    /// The node stays where it is put.
    ConstantPosition(Vector3),
    /// The node moves linearly between waypoints sorted by time; it rests at
    /// the first waypoint before it and at the last one after it.
    Waypoints(Vec<Waypoint>),
}

impl MobilityModel {
    /// Builds a waypoint model, sorting the waypoints by time.
    ///
    /// Returns `None` for an empty list.
    pub fn waypoints(mut waypoints: Vec<Waypoint>) -> Option<Self> {
        if waypoints.is_empty() {
            return None;
        }
        waypoints.sort_by_key(|w| w.time);
        Some(MobilityModel::Waypoints(waypoints))
    }

    /// Position of the node at simulation time `now`.
    pub fn position_at(&self, now: Duration) -> Vector3 {
        match self {
            MobilityModel::ConstantPosition(position) => *position,
            MobilityModel::Waypoints(waypoints) => {
                let Some(first) = waypoints.first() else {
                    return Vector3::default();
                };
                if now <= first.time {
                    return first.position;
                }
                for pair in waypoints.windows(2) {
                    let (from, to) = (&pair[0], &pair[1]);
                    if now < to.time {
                        let span = (to.time - from.time).as_secs_f64();
                        if span <= 0.0 {
                            return to.position;
                        }
                        let t = (now - from.time).as_secs_f64() / span;
                        return from.position.lerp(&to.position, t);
                    }
                }
                waypoints.last().map_or(first.position, |w| w.position)
            }
        }
    }

    /// Times at which the velocity of the node changes.
    pub fn course_change_times(&self) -> Vec<Duration> {
        match self {
            MobilityModel::ConstantPosition(_) => Vec::new(),
            MobilityModel::Waypoints(waypoints) => waypoints.iter().map(|w| w.time).collect(),
        }
    }

    /// Whether this node's position depends on time.
    pub fn is_moving(&self) -> bool {
        matches!(self, MobilityModel::Waypoints(w) if w.len() > 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_position_ignores_time() {
        let model = MobilityModel::ConstantPosition(Vector3::new(50.0, 100.0, 0.0));
        assert_eq!(model.position_at(Duration::ZERO), Vector3::new(50.0, 100.0, 0.0));
        assert_eq!(model.position_at(Duration::from_secs(720)), Vector3::new(50.0, 100.0, 0.0));
        assert!(!model.is_moving());
    }

    #[test]
    fn waypoints_interpolate_and_rest() {
        let model = MobilityModel::waypoints(vec![
            Waypoint::new(Duration::from_secs(20), Vector3::new(0.0, 100.0, 0.0)),
            Waypoint::new(Duration::from_secs(10), Vector3::new(0.0, 0.0, 0.0)),
        ])
        .unwrap();

        assert_eq!(model.position_at(Duration::ZERO), Vector3::new(0.0, 0.0, 0.0));
        assert_eq!(model.position_at(Duration::from_secs(15)), Vector3::new(0.0, 50.0, 0.0));
        assert_eq!(model.position_at(Duration::from_secs(60)), Vector3::new(0.0, 100.0, 0.0));
        assert_eq!(
            model.course_change_times(),
            vec![Duration::from_secs(10), Duration::from_secs(20)]
        );
    }

    #[test]
    fn empty_waypoint_list_is_rejected() {
        assert!(MobilityModel::waypoints(Vec::new()).is_none());
    }

    #[test]
    fn distance_is_euclidean() {
        let a = Vector3::new(0.0, 0.0, 0.0);
        let b = Vector3::new(3.0, 4.0, 0.0);
        assert_eq!(a.distance(&b), 5.0);
    }
}
