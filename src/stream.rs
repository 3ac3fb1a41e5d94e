//! Continuous MJPEG stream from a frame source.

use std::convert::Infallible;
use std::io::Cursor;
use std::sync::Arc;

use anyhow::Result;
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::{self, Stream};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::analysis::{assess_pose, detect_pose};
use crate::camera::FrameSource;
use crate::error::PostureError;
use crate::inference::{Frame, SharedEstimator};
use crate::posture::PostureVerdict;
use crate::sessions::SharedAnalyzer;

pub const BOUNDARY: &str = "frame";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const JPEG_QUALITY: u8 = 80;

pub type SharedSource = Arc<Mutex<Box<dyn FrameSource>>>;

/// Everything the stream needs; the analyzer is the single global stream analyzer.
#[derive(Clone)]
pub struct StreamContext {
    pub source: SharedSource,
    pub estimator: SharedEstimator,
    pub analyzer: SharedAnalyzer,
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(image)?;
    Ok(buf.into_inner())
}

/// Frames one JPEG as a multipart part.
pub fn part(jpeg: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(jpeg.len() + 64);
    out.put_slice(b"--");
    out.put_slice(BOUNDARY.as_bytes());
    out.put_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    out.put_slice(jpeg);
    out.put_slice(b"\r\n");
    out.freeze()
}

/// Analyzes one frame with the stream's analyzer. No pose is not an error here.
pub fn analyze(ctx: &StreamContext, frame: &Frame) -> Result<Option<PostureVerdict>, PostureError> {
    let pose = {
        let mut estimator = ctx.estimator.lock();
        match detect_pose(&mut **estimator, frame) {
            Ok(pose) => pose,
            Err(PostureError::NoPoseDetected) => return Ok(None),
            Err(e) => return Err(e),
        }
    };
    let mut analyzer = ctx.analyzer.lock();
    Ok(Some(assess_pose(&mut analyzer, &pose, frame)?.verdict))
}

/// Reads, analyzes and encodes frames until the source ends or the receiver goes away.
fn produce(ctx: StreamContext, tx: mpsc::Sender<Bytes>) {
    let mut sent = 0u64;
    loop {
        // Concurrent clients share the source and the video estimator, so a
        // frame is analyzed before the next one is read.
        let frame = {
            let mut source = ctx.source.lock();
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!(frames = sent, "frame source exhausted, ending stream");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, frames = sent, "frame read failed, ending stream");
                    break;
                }
            };
            match analyze(&ctx, &frame) {
                Ok(Some(verdict)) => debug!(good = verdict.is_good_posture, "stream frame"),
                Ok(None) => debug!("no pose in stream frame"),
                Err(e) => warn!(error = %e, "stream frame analysis failed"),
            }
            frame
        };

        let jpeg = match encode_jpeg(&frame.image) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                warn!(error = %e, "jpeg encoding failed, ending stream");
                break;
            }
        };
        if tx.blocking_send(part(&jpeg)).is_err() {
            debug!("stream client disconnected");
            break;
        }
        sent += 1;
    }
}

/// Starts the producer on a blocking thread and returns the body stream.
pub fn mjpeg(ctx: StreamContext) -> impl Stream<Item = Result<Bytes, Infallible>> {
    let (tx, rx) = mpsc::channel(2);
    tokio::task::spawn_blocking(move || produce(ctx, tx));
    stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok(chunk), rx))
    })
}
