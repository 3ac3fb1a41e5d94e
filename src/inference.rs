use std::sync::Arc;

use anyhow::Result;
use image::RgbImage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Number of landmarks the metric extraction needs at minimum (indices 0..=12).
pub const MIN_LANDMARKS: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    /// Normalized to `[0, 1]` of the image width.
    pub x: f32,
    /// Normalized to `[0, 1]` of the image height.
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: 1.0,
        }
    }
}

/// Landmarks of the first body found in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub landmarks: Vec<Landmark>,
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub timestamp_ms: u64,
}

impl Frame {
    pub fn new(image: RgbImage, timestamp_ms: u64) -> Self {
        Self {
            image,
            timestamp_ms,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// How frames reach the estimator, fixed when it is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningMode {
    /// Independent still images.
    #[default]
    Image,
    /// Consecutive frames of one stream with increasing timestamps.
    Video,
}

pub trait PoseEstimator: Send {
    fn mode(&self) -> RunningMode;

    /// Returns `Ok(None)` when no body is found in the frame.
    fn detect(&mut self, frame: &Frame) -> Result<Option<Pose>>;
}

/// One estimator serves every request; inference runs under its lock.
pub type SharedEstimator = Arc<Mutex<Box<dyn PoseEstimator>>>;

pub fn shared(estimator: impl PoseEstimator + 'static) -> SharedEstimator {
    let boxed: Box<dyn PoseEstimator> = Box::new(estimator);
    Arc::new(Mutex::new(boxed))
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxPoseDetector;

#[cfg(feature = "onnx")]
mod onnx {
    use anyhow::{anyhow, bail, Context, Result};
    use image::imageops::{self, FilterType};
    use ndarray::Array4;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Tensor;
    use tracing::{debug, info};

    use super::{Frame, Landmark, Pose, PoseEstimator, RunningMode};

    /// Values per landmark in BlazePose-style flat outputs: x, y, z, visibility, presence.
    const DEFAULT_STRIDE: usize = 5;

    pub struct OnnxPoseDetector {
        session: Session,
        mode: RunningMode,
        input_name: String,
        landmark_output: String,
        presence_output: Option<String>,
        input_width: u32,
        input_height: u32,
        channels_last: bool,
        min_presence: f32,
        last_timestamp: Option<u64>,
    }

    impl OnnxPoseDetector {
        pub fn new(model_path: &str, mode: RunningMode, min_presence: f32) -> Result<Self> {
            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_file(model_path)
                .with_context(|| format!("failed to load pose model {model_path}"))?;

            let input = session
                .inputs
                .first()
                .ok_or_else(|| anyhow!("model has no inputs"))?;
            let input_name = input.name.clone();
            let shape: Vec<i64> = input
                .input_type
                .tensor_shape()
                .map(|s| s.to_vec())
                .unwrap_or_default();
            let (input_width, input_height, channels_last) = Self::layout(&shape);

            let mut outputs = session.outputs.iter().map(|o| o.name.clone());
            let landmark_output = outputs
                .next()
                .ok_or_else(|| anyhow!("model has no outputs"))?;
            let presence_output = outputs.next();

            info!(
                model = model_path,
                ?mode,
                input_width,
                input_height,
                channels_last,
                "pose model loaded"
            );

            Ok(Self {
                session,
                mode,
                input_name,
                landmark_output,
                presence_output,
                input_width,
                input_height,
                channels_last,
                min_presence,
                last_timestamp: None,
            })
        }

        /// Width, height and channel order from a rank-4 input shape; 256x256 NHWC otherwise.
        fn layout(shape: &[i64]) -> (u32, u32, bool) {
            if shape.len() < 4 {
                return (256, 256, true);
            }
            let dim = |v: i64| if v > 0 { v as u32 } else { 256 };
            if shape[3] == 3 {
                (dim(shape[2]), dim(shape[1]), true)
            } else {
                (dim(shape[3]), dim(shape[2]), false)
            }
        }

        fn preprocess(&self, frame: &Frame) -> Array4<f32> {
            let resized = imageops::resize(
                &frame.image,
                self.input_width,
                self.input_height,
                FilterType::Triangle,
            );
            let (w, h) = (self.input_width as usize, self.input_height as usize);
            let mut input = if self.channels_last {
                Array4::<f32>::zeros((1, h, w, 3))
            } else {
                Array4::<f32>::zeros((1, 3, h, w))
            };

            for (x, y, pixel) in resized.enumerate_pixels() {
                let (x, y) = (x as usize, y as usize);
                for c in 0..3 {
                    let v = f32::from(pixel[c]) / 255.0;
                    if self.channels_last {
                        input[[0, y, x, c]] = v;
                    } else {
                        input[[0, c, y, x]] = v;
                    }
                }
            }
            input
        }

        fn check_timestamp(&mut self, frame: &Frame) -> Result<()> {
            if self.mode == RunningMode::Video {
                if let Some(last) = self.last_timestamp {
                    if frame.timestamp_ms <= last {
                        bail!(
                            "frame timestamp {} is not after previous {}",
                            frame.timestamp_ms,
                            last
                        );
                    }
                }
                self.last_timestamp = Some(frame.timestamp_ms);
            }
            Ok(())
        }
    }

    impl PoseEstimator for OnnxPoseDetector {
        fn mode(&self) -> RunningMode {
            self.mode
        }

        fn detect(&mut self, frame: &Frame) -> Result<Option<Pose>> {
            self.check_timestamp(frame)?;
            let input = Tensor::from_array(self.preprocess(frame))?;

            let outputs = self
                .session
                .run(ort::inputs![self.input_name.as_str() => input])
                .context("inference failed")?;

            if let Some(name) = &self.presence_output {
                let presence: ndarray::ArrayViewD<f32> = outputs[name.as_str()]
                    .try_extract_array()
                    .context("failed to extract presence score")?;
                let score = presence.iter().copied().next().unwrap_or(0.0);
                if score < self.min_presence {
                    debug!(score, "pose presence below threshold");
                    return Ok(None);
                }
            }

            let raw: ndarray::ArrayViewD<f32> = outputs[self.landmark_output.as_str()]
                .try_extract_array()
                .context("failed to extract landmarks")?;
            let stride = match raw.shape() {
                [_, _, k, ..] if *k >= 3 => *k,
                _ => DEFAULT_STRIDE,
            };
            let values: Vec<f32> = raw.iter().copied().collect();
            let (w, h) = (self.input_width as f32, self.input_height as f32);

            let landmarks: Vec<Landmark> = values
                .chunks_exact(stride)
                .map(|lm| Landmark {
                    x: lm[0] / w,
                    y: lm[1] / h,
                    z: lm[2] / w,
                    visibility: lm.get(3).map(|v| 1.0 / (1.0 + (-v).exp())).unwrap_or(1.0),
                })
                .collect();

            if landmarks.is_empty() {
                return Ok(None);
            }
            Ok(Some(Pose { landmarks }))
        }
    }

}
