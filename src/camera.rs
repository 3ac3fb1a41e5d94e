use anyhow::Result;

use crate::inference::Frame;

/// A continuous source of frames. `Ok(None)` means the source is exhausted.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

#[cfg(feature = "camera")]
pub use webcam::Camera;

#[cfg(feature = "camera")]
mod webcam {
    use std::time::Instant;

    use anyhow::{bail, Context, Result};
    use image::RgbImage;
    use opencv::{
        core::{AlgorithmHint, Mat},
        imgproc,
        prelude::*,
        videoio::{self, VideoCapture},
    };
    use tracing::info;

    use super::FrameSource;
    use crate::inference::Frame;

    pub struct Camera {
        capture: VideoCapture,
        started: Instant,
    }

    impl Camera {
        pub fn new(device_id: i32) -> Result<Self> {
            let capture = VideoCapture::new(device_id, videoio::CAP_ANY)?;

            if !capture.is_opened()? {
                bail!("failed to open camera {device_id}");
            }
            info!(device_id, "camera opened");

            Ok(Self {
                capture,
                started: Instant::now(),
            })
        }

        fn to_rgb(frame: &Mat) -> Result<RgbImage> {
            let mut rgb = Mat::default();
            imgproc::cvt_color(
                frame,
                &mut rgb,
                imgproc::COLOR_BGR2RGB,
                0,
                AlgorithmHint::ALGO_HINT_DEFAULT,
            )?;
            let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
            let bytes = rgb.data_bytes()?.to_vec();
            RgbImage::from_raw(width, height, bytes).context("camera frame has unexpected size")
        }
    }

    impl FrameSource for Camera {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            let mut frame = Mat::default();
            if !self.capture.read(&mut frame)? || frame.empty() {
                return Ok(None);
            }
            let timestamp_ms = self.started.elapsed().as_millis() as u64;
            Ok(Some(Frame::new(Self::to_rgb(&frame)?, timestamp_ms)))
        }
    }
}
