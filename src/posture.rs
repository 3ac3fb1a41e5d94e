use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use crate::geometry::{round_to, Point3D};
use crate::metrics::{extract_metrics, Metric, RawMetrics};
use crate::smoothing::{Smoother, DEFAULT_SMOOTH_WINDOW};
use crate::stability::{StabilityGate, DEFAULT_STABLE_LEN};

/// Which metrics a deployment tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricProfile {
    #[default]
    Full,
    /// Head, shoulders and side twist only.
    Basic,
}

impl MetricProfile {
    pub fn tracks(self, metric: Metric) -> bool {
        match self {
            MetricProfile::Full => true,
            MetricProfile::Basic => metric != Metric::ForwardLean,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Head angle below this is bad.
    pub head_angle_min: f64,
    /// Absolute shoulder angle above this is bad.
    pub shoulder_angle_max: f64,
    pub side_twist_max: f64,
    pub forward_lean_min: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            head_angle_min: 80.0,
            shoulder_angle_max: 3.5,
            side_twist_max: 0.45,
            forward_lean_min: 0.75,
        }
    }
}

impl Thresholds {
    pub fn is_bad(&self, metric: Metric, smoothed: f64) -> bool {
        match metric {
            Metric::HeadAngle => smoothed < self.head_angle_min,
            Metric::ShoulderAngle => smoothed.abs() > self.shoulder_angle_max,
            Metric::SideTwist => smoothed > self.side_twist_max,
            Metric::ForwardLean => smoothed < self.forward_lean_min,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Issue {
    HeadForward,
    ShouldersUneven,
    SideTwist,
    ForwardLean,
}

impl Issue {
    pub fn for_metric(metric: Metric) -> Self {
        match metric {
            Metric::HeadAngle => Issue::HeadForward,
            Metric::ShoulderAngle => Issue::ShouldersUneven,
            Metric::SideTwist => Issue::SideTwist,
            Metric::ForwardLean => Issue::ForwardLean,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Issue::HeadForward => "Head forward / rounded back",
            Issue::ShouldersUneven => "Shoulders uneven",
            Issue::SideTwist => "Side twist / lean",
            Issue::ForwardLean => "Forward lean detected",
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Issue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Smoothed metrics as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReportedMetrics {
    pub head_angle: f64,
    pub shoulder_angle: f64,
    pub side_twist: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward_lean: Option<f64>,
}

impl ReportedMetrics {
    fn rounded(smoothed: &RawMetrics, profile: MetricProfile) -> Self {
        Self {
            head_angle: round_to(smoothed.head_angle, 1),
            shoulder_angle: round_to(smoothed.shoulder_angle, 1),
            side_twist: round_to(smoothed.side_twist, 2),
            forward_lean: profile
                .tracks(Metric::ForwardLean)
                .then(|| round_to(smoothed.forward_lean, 2)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostureVerdict {
    pub metrics: ReportedMetrics,
    pub issues: Vec<Issue>,
    pub is_good_posture: bool,
}

/// A verdict plus the shoulder midpoint it was measured against.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub verdict: PostureVerdict,
    pub shoulder_midpoint: Point3D,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerSettings {
    pub smoothing_window: usize,
    pub stability_window: usize,
    pub thresholds: Thresholds,
    pub profile: MetricProfile,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            smoothing_window: DEFAULT_SMOOTH_WINDOW,
            stability_window: DEFAULT_STABLE_LEN,
            thresholds: Thresholds::default(),
            profile: MetricProfile::Full,
        }
    }
}

impl AnalyzerSettings {
    /// Threshold-only classification: no debouncing across frames.
    pub fn immediate(self) -> Self {
        Self {
            stability_window: 1,
            ..self
        }
    }
}

/// Smoothing and stability state for one logical session.
pub struct PostureAnalyzer {
    settings: AnalyzerSettings,
    smoother: Smoother,
    gate: StabilityGate,
    frames: u64,
}

impl PostureAnalyzer {
    pub fn new(settings: AnalyzerSettings) -> Self {
        Self {
            settings,
            smoother: Smoother::new(settings.smoothing_window),
            gate: StabilityGate::new(settings.stability_window),
            frames: 0,
        }
    }

    /// Frames observed since construction.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn check_posture(
        &mut self,
        head: &Point3D,
        left_shoulder: &Point3D,
        right_shoulder: &Point3D,
    ) -> Assessment {
        let extraction = extract_metrics(head, left_shoulder, right_shoulder);
        Assessment {
            verdict: self.evaluate(&extraction.metrics),
            shoulder_midpoint: extraction.shoulder_midpoint,
        }
    }

    /// Smooths one frame of raw metrics and folds it into the debounced verdict.
    pub fn evaluate(&mut self, raw: &RawMetrics) -> PostureVerdict {
        let profile = self.settings.profile;
        let smoothed = self.smoother.smooth_all(raw, |m| profile.tracks(m));

        let mut issues = Vec::new();
        for metric in Metric::ALL {
            if !profile.tracks(metric) {
                continue;
            }
            let exceeds = self.settings.thresholds.is_bad(metric, smoothed.get(metric));
            if self.gate.observe(metric, exceeds) {
                issues.push(Issue::for_metric(metric));
            }
        }
        self.frames += 1;

        let verdict = PostureVerdict {
            metrics: ReportedMetrics::rounded(&smoothed, profile),
            is_good_posture: issues.is_empty(),
            issues,
        };
        debug!(
            frame = self.frames,
            good = verdict.is_good_posture,
            issues = verdict.issues.len(),
            "posture evaluated"
        );
        verdict
    }
}

impl Default for PostureAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerSettings::default())
    }
}
