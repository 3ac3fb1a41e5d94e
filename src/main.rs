use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use posture_care::config::Config;
use posture_care::inference::{RunningMode, SharedEstimator};
use posture_care::posture::PostureAnalyzer;
use posture_care::server::{run_server, AppState};
use posture_care::sessions::SessionRegistry;
use posture_care::stream::{SharedSource, StreamContext};

#[derive(Parser)]
#[command(name = "posture-care")]
#[command(about = "Posture analysis over HTTP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// TOML config file
        #[arg(short, long)]
        config: Option<String>,
        /// Bind address, overrides the config file
        #[arg(short, long)]
        bind: Option<String>,
        /// Pose model path, overrides the config file
        #[arg(short, long)]
        model: Option<String>,
        /// Disable the webcam stream
        #[arg(long)]
        no_camera: bool,
    },
    /// Write the default config to a file
    InitConfig {
        #[arg(default_value = "posture-care.toml")]
        path: String,
    },
}

fn init_logging() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(d) = "posture_care=info".parse() {
        filter = filter.add_directive(d);
    }
    fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::InitConfig { path } => {
            Config::default().save(&path)?;
            info!(%path, "default config written");
            Ok(())
        }
        Commands::Serve {
            config,
            bind,
            model,
            no_camera,
        } => {
            let mut config = match config {
                Some(path) => Config::load(&path)?,
                None => Config::default(),
            };
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(model) = model {
                config.model_path = model;
            }
            if no_camera {
                config.camera_id = -1;
            }
            config.validate()?;
            serve(config).await
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("PostureCare starting");
    let settings = config.analyzer_settings();

    let mut state = AppState::new(
        load_estimator(&config, RunningMode::Image)?,
        SessionRegistry::new(config.session_capacity, settings),
    );
    state.user_agent_prefix = config.user_agent_prefix;

    if config.stream_enabled() {
        match open_camera(config.camera_id) {
            Ok(source) => {
                state = state.with_stream(StreamContext {
                    source,
                    estimator: load_estimator(&config, RunningMode::Video)?,
                    analyzer: Arc::new(Mutex::new(PostureAnalyzer::new(settings))),
                });
            }
            Err(e) => warn!(error = %e, "video feed disabled"),
        }
    }

    run_server(config.socket_addr()?, Arc::new(state)).await
}

#[cfg(feature = "onnx")]
fn load_estimator(config: &Config, mode: RunningMode) -> Result<SharedEstimator> {
    use posture_care::inference::{shared, OnnxPoseDetector};

    let detector = OnnxPoseDetector::new(&config.model_path, mode, config.min_pose_presence)?;
    Ok(shared(detector))
}

#[cfg(not(feature = "onnx"))]
fn load_estimator(_config: &Config, _mode: RunningMode) -> Result<SharedEstimator> {
    anyhow::bail!("no pose backend compiled in; rebuild with `--features onnx`")
}

#[cfg(feature = "camera")]
fn open_camera(device_id: i32) -> Result<SharedSource> {
    use posture_care::camera::{Camera, FrameSource};

    let camera: Box<dyn FrameSource> = Box::new(Camera::new(device_id)?);
    Ok(Arc::new(Mutex::new(camera)))
}

#[cfg(not(feature = "camera"))]
fn open_camera(_device_id: i32) -> Result<SharedSource> {
    anyhow::bail!("built without the `camera` feature")
}
