use std::fs;
use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::posture::{AnalyzerSettings, MetricProfile, Thresholds};
use crate::sessions::DEFAULT_SESSION_CAPACITY;
use crate::smoothing::DEFAULT_SMOOTH_WINDOW;
use crate::stability::DEFAULT_STABLE_LEN;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: String,
    pub model_path: String,
    /// Webcam for `/video_feed`; negative disables the stream.
    pub camera_id: i32,
    pub metrics: MetricProfile,
    pub smoothing_window: usize,
    /// Consecutive bad frames before a metric is reported. 1 disables debouncing.
    pub stability_window: usize,
    pub session_capacity: usize,
    pub user_agent_prefix: usize,
    pub min_pose_presence: f32,
    pub thresholds: Thresholds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            model_path: "models/pose_landmark_full.onnx".to_string(),
            camera_id: 0,
            metrics: MetricProfile::Full,
            smoothing_window: DEFAULT_SMOOTH_WINDOW,
            stability_window: DEFAULT_STABLE_LEN,
            session_capacity: DEFAULT_SESSION_CAPACITY,
            user_agent_prefix: 50,
            min_pose_presence: 0.5,
            thresholds: Thresholds::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("failed to read config {path}"))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("invalid config {path}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.smoothing_window == 0 {
            bail!("smoothing_window must be at least 1");
        }
        if self.stability_window == 0 {
            bail!("stability_window must be at least 1");
        }
        if self.session_capacity == 0 {
            bail!("session_capacity must be at least 1");
        }
        let t = &self.thresholds;
        let all_finite = [
            t.head_angle_min,
            t.shoulder_angle_max,
            t.side_twist_max,
            t.forward_lean_min,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !all_finite {
            bail!("thresholds must be finite numbers");
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_addr
            .parse()
            .with_context(|| format!("invalid bind_addr {}", self.bind_addr))
    }

    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            smoothing_window: self.smoothing_window,
            stability_window: self.stability_window,
            thresholds: self.thresholds,
            profile: self.metrics,
        }
    }

    pub fn stream_enabled(&self) -> bool {
        self.camera_id >= 0
    }
}
