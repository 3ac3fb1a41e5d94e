//! PostureCare: posture analysis from webcam frames and uploaded images.
//!
//! Raw head and shoulder landmarks become four geometric metrics, which are
//! smoothed over a short window and debounced before being reported as
//! posture issues.

pub mod analysis;
pub mod camera;
pub mod config;
pub mod decode;
pub mod error;
pub mod geometry;
pub mod inference;
pub mod metrics;
pub mod posture;
pub mod server;
pub mod sessions;
pub mod smoothing;
pub mod stability;
pub mod stream;

pub use error::PostureError;
pub use geometry::Point3D;
pub use posture::{AnalyzerSettings, Issue, PostureAnalyzer, PostureVerdict};
