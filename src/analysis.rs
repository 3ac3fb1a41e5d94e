//! One frame through the estimator and into an analyzer.

use crate::error::PostureError;
use crate::geometry::Point3D;
use crate::inference::{Frame, Pose, PoseEstimator, MIN_LANDMARKS};
use crate::metrics::{HEAD, LEFT_SHOULDER, RIGHT_SHOULDER};
use crate::posture::{Assessment, PostureAnalyzer};

/// Head, left shoulder and right shoulder of `pose` in pixel space.
pub fn key_points(pose: &Pose, width: u32, height: u32) -> Result<[Point3D; 3], PostureError> {
    if pose.landmarks.len() < MIN_LANDMARKS {
        return Err(PostureError::Inference(format!(
            "expected at least {} landmarks, got {}",
            MIN_LANDMARKS,
            pose.landmarks.len()
        )));
    }
    let point = |i: usize| {
        let lm = &pose.landmarks[i];
        Point3D::from_normalized(lm.x, lm.y, lm.z, width, height)
    };
    Ok([point(HEAD), point(LEFT_SHOULDER), point(RIGHT_SHOULDER)])
}

pub fn detect_pose(estimator: &mut dyn PoseEstimator, frame: &Frame) -> Result<Pose, PostureError> {
    estimator
        .detect(frame)
        .map_err(|e| PostureError::Inference(format!("{e:#}")))?
        .ok_or(PostureError::NoPoseDetected)
}

/// Feeds a detected pose to the analyzer.
pub fn assess_pose(
    analyzer: &mut PostureAnalyzer,
    pose: &Pose,
    frame: &Frame,
) -> Result<Assessment, PostureError> {
    let [head, left, right] = key_points(pose, frame.width(), frame.height())?;
    Ok(analyzer.check_posture(&head, &left, &right))
}

pub fn analyze_frame(
    estimator: &mut dyn PoseEstimator,
    analyzer: &mut PostureAnalyzer,
    frame: &Frame,
) -> Result<Assessment, PostureError> {
    let pose = detect_pose(estimator, frame)?;
    assess_pose(analyzer, &pose, frame)
}
