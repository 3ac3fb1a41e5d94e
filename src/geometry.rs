//! Point-pair measurements over pose landmarks.

use serde::Serialize;

/// Guards the depth ratio when both depths are zero.
const DEPTH_EPSILON: f64 = 1e-5;

/// A landmark in pixel space with a relative depth.
///
/// `x`/`y` are whole pixels, `z` is the estimator's relative depth rounded to
/// two decimals (more negative is closer to the camera).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point3D {
    pub x: i32,
    pub y: i32,
    pub z: f64,
}

impl Point3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: x as i32,
            y: y as i32,
            z: round_to(z, 2),
        }
    }

    /// Scales normalized estimator coordinates into an image of the given size.
    pub fn from_normalized(x: f32, y: f32, z: f32, width: u32, height: u32) -> Self {
        Self::new(
            f64::from(x) * f64::from(width),
            f64::from(y) * f64::from(height),
            f64::from(z),
        )
    }
}

/// Angle in degrees of segment `a`-`b` against the horizontal axis, in `[0, 90]`.
///
/// Coincident points give `0.0`.
pub fn angle(a: &Point3D, b: &Point3D) -> f64 {
    let dx = (i64::from(a.x) - i64::from(b.x)).abs() as f64;
    let dy = (i64::from(a.y) - i64::from(b.y)).abs() as f64;
    let dist = dx.hypot(dy);
    if dist == 0.0 {
        return 0.0;
    }
    round_to((dx / dist).clamp(0.0, 1.0).acos().to_degrees(), 2)
}

/// Normalized depth asymmetry between two landmarks, in `[0, 1]`.
pub fn depth_diff(a: &Point3D, b: &Point3D) -> f64 {
    let (d1, d2) = (-a.z, -b.z);
    let ratio = d1.min(d2) / (d1.max(d2) + DEPTH_EPSILON);
    let diff = 1.0 - ratio.abs();
    if !diff.is_finite() {
        return 0.0;
    }
    round_to(diff.clamp(0.0, 1.0), 2)
}

pub fn midpoint(a: &Point3D, b: &Point3D) -> Point3D {
    Point3D {
        x: half_sum(a.x, b.x),
        y: half_sum(a.y, b.y),
        z: round_to((a.z + b.z) / 2.0, 2),
    }
}

/// Truncating average over a widened sum.
fn half_sum(a: i32, b: i32) -> i32 {
    ((i64::from(a) + i64::from(b)) / 2) as i32
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
