//! Raw posture metrics from the head and shoulder landmarks.

use std::fmt;

use serde::Serialize;

use crate::geometry::{angle, depth_diff, midpoint, Point3D};

/// Landmark indices in the 33-point body topology.
pub const HEAD: usize = 0;
pub const LEFT_SHOULDER: usize = 11;
pub const RIGHT_SHOULDER: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    HeadAngle,
    ShoulderAngle,
    SideTwist,
    ForwardLean,
}

impl Metric {
    /// Canonical order, which is also the order issues are reported in.
    pub const ALL: [Metric; 4] = [
        Metric::HeadAngle,
        Metric::ShoulderAngle,
        Metric::SideTwist,
        Metric::ForwardLean,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::HeadAngle => "head_angle",
            Metric::ShoulderAngle => "shoulder_angle",
            Metric::SideTwist => "side_twist",
            Metric::ForwardLean => "forward_lean",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawMetrics {
    /// Degrees of the head to shoulder-midpoint line from horizontal.
    pub head_angle: f64,
    /// Degrees of the shoulder line from horizontal.
    pub shoulder_angle: f64,
    /// Depth asymmetry between the shoulders.
    pub side_twist: f64,
    /// Depth asymmetry between the head and the shoulder midpoint.
    pub forward_lean: f64,
}

impl RawMetrics {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::HeadAngle => self.head_angle,
            Metric::ShoulderAngle => self.shoulder_angle,
            Metric::SideTwist => self.side_twist,
            Metric::ForwardLean => self.forward_lean,
        }
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        match metric {
            Metric::HeadAngle => self.head_angle = value,
            Metric::ShoulderAngle => self.shoulder_angle = value,
            Metric::SideTwist => self.side_twist = value,
            Metric::ForwardLean => self.forward_lean = value,
        }
    }
}

/// Metrics of one frame together with the shoulder midpoint they were measured against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extraction {
    pub metrics: RawMetrics,
    pub shoulder_midpoint: Point3D,
}

pub fn extract_metrics(head: &Point3D, left_shoulder: &Point3D, right_shoulder: &Point3D) -> Extraction {
    let between_shoulders = midpoint(left_shoulder, right_shoulder);

    let metrics = RawMetrics {
        head_angle: angle(head, &between_shoulders),
        shoulder_angle: angle(left_shoulder, right_shoulder),
        side_twist: depth_diff(left_shoulder, right_shoulder),
        forward_lean: depth_diff(head, &between_shoulders),
    };

    Extraction {
        metrics,
        shoulder_midpoint: between_shoulders,
    }
}
