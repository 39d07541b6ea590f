//! Robot-relative movement arithmetic.
//!
//! Coordinates: `x` grows to the right, `y` grows up, `theta` is the heading
//! in radians with 0 facing +X. Left/right commands strafe perpendicular to
//! the heading without rotating.

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

/// Default step length in meters for a single movement command.
pub const DEFAULT_STEP: f64 = 0.02;

/// Planar position and heading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// X coordinate in meters.
    pub x: f64,
    /// Y coordinate in meters.
    pub y: f64,
    /// Heading in radians.
    pub theta: f64,
}

impl Pose {
    /// Create a pose.
    pub const fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    /// Same position with the heading wrapped into `[-π, π]`.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            theta: normalize_theta(self.theta),
            ..self
        }
    }
}

/// Wrap an angle into `[-π, π]`.
///
/// In-range angles are returned unchanged; odd multiples of π outside the
/// range may land on either end.
pub fn normalize_theta(theta: f64) -> f64 {
    if !theta.is_finite() || (-PI..=PI).contains(&theta) {
        return theta;
    }
    (theta + PI).rem_euclid(TAU) - PI
}

/// Apply a movement command to `pose`.
///
/// Returns `None` for commands that do not describe a movement.
pub fn apply_movement(pose: Pose, command: &str, step: f64) -> Option<Pose> {
    let p = pose.normalized();
    let (sin, cos) = p.theta.sin_cos();
    let moved = match command {
        "forward" => Pose::new(p.x + cos * step, p.y + sin * step, p.theta),
        "backward" => Pose::new(p.x - cos * step, p.y - sin * step, p.theta),
        "left" => Pose::new(p.x + sin * step, p.y - cos * step, p.theta),
        "right" => Pose::new(p.x - sin * step, p.y + cos * step, p.theta),
        "stop" => p,
        _ => return None,
    };
    Some(moved)
}

/// Euclidean distance between two poses, ignoring heading.
pub fn distance(a: Pose, b: Pose) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

/// Shortest signed rotation from `from` to `to`, in `[-π, π]`.
pub fn angle_difference(from: f64, to: f64) -> f64 {
    normalize_theta(to - from)
}
