//! HTTP surface: health, single-image analysis, MJPEG feed and session management.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Path, State},
    http::{header, Extensions, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::analysis::{assess_pose, detect_pose};
use crate::decode::decode_image;
use crate::error::PostureError;
use crate::inference::{Frame, SharedEstimator};
use crate::posture::{Issue, PostureVerdict, ReportedMetrics};
use crate::sessions::{fallback_key, SessionRegistry};
use crate::stream::{self, StreamContext};

pub const SESSION_HEADER: &str = "x-session-id";
const DEFAULT_UA_PREFIX: usize = 50;

pub struct AppState {
    /// Image-mode estimator shared by upload requests.
    pub estimator: SharedEstimator,
    pub sessions: SessionRegistry,
    pub stream: Option<StreamContext>,
    pub user_agent_prefix: usize,
}

impl AppState {
    pub fn new(estimator: SharedEstimator, sessions: SessionRegistry) -> Self {
        Self {
            estimator,
            sessions,
            stream: None,
            user_agent_prefix: DEFAULT_UA_PREFIX,
        }
    }

    pub fn with_stream(mut self, stream: StreamContext) -> Self {
        self.stream = Some(stream);
        self
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Deserialize, Default)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub metrics: ReportedMetrics,
    pub issues: Vec<Issue>,
    pub is_good_posture: bool,
}

impl From<PostureVerdict> for AnalyzeResponse {
    fn from(verdict: PostureVerdict) -> Self {
        Self {
            success: true,
            metrics: verdict.metrics,
            issues: verdict.issues,
            is_good_posture: verdict.is_good_posture,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl IntoResponse for PostureError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else if matches!(self, PostureError::NoPoseDetected) {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// GET /health
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        message: "PostureCare active",
    })
}

/// POST /analyze_posture
async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    extensions: Extensions,
    body: Bytes,
) -> Response {
    match analyze_upload(state, &headers, &extensions, &body).await {
        Ok(verdict) => Json(AnalyzeResponse::from(verdict)).into_response(),
        Err(e) => {
            if !matches!(e, PostureError::NoPoseDetected) {
                warn!(error = %e, "analyze_posture failed");
            }
            e.into_response()
        }
    }
}

async fn analyze_upload(
    state: Arc<AppState>,
    headers: &HeaderMap,
    extensions: &Extensions,
    body: &[u8],
) -> Result<PostureVerdict, PostureError> {
    let request: AnalyzeRequest = if body.is_empty() {
        AnalyzeRequest::default()
    } else {
        serde_json::from_slice(body).map_err(|e| PostureError::InvalidRequest(e.to_string()))?
    };
    let image = match request.image {
        Some(image) if !image.trim().is_empty() => image,
        _ => return Err(PostureError::MissingInput),
    };
    let key = session_key(&state, headers, extensions, request.session_id);

    tokio::task::spawn_blocking(move || -> Result<PostureVerdict, PostureError> {
        let frame = Frame::new(decode_image(&image)?, now_ms());
        let pose = {
            let mut estimator = state.estimator.lock();
            detect_pose(&mut **estimator, &frame)?
        };
        let session = state.sessions.analyzer(&key);
        let mut analyzer = session.lock();
        Ok(assess_pose(&mut analyzer, &pose, &frame)?.verdict)
    })
    .await
    .map_err(|e| PostureError::Internal(e.to_string()))?
}

/// Explicit session id first, then the best-effort address and user-agent key.
fn session_key(
    state: &AppState,
    headers: &HeaderMap,
    extensions: &Extensions,
    body_session: Option<String>,
) -> String {
    let present = |s: &String| !s.trim().is_empty();
    let explicit = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(present)
        .or(body_session.filter(present));
    if let Some(id) = explicit {
        return id;
    }

    let remote = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    fallback_key(remote.as_deref(), user_agent, state.user_agent_prefix)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// GET /video_feed
async fn video_feed_handler(State(state): State<Arc<AppState>>) -> Response {
    let Some(ctx) = state.stream.clone() else {
        let body = ErrorResponse {
            success: false,
            error: "No video source configured".to_string(),
        };
        return (StatusCode::NOT_FOUND, Json(body)).into_response();
    };

    info!("video feed client connected");
    (
        [(header::CONTENT_TYPE, stream::CONTENT_TYPE)],
        Body::from_stream(stream::mjpeg(ctx)),
    )
        .into_response()
}

/// DELETE /sessions/:id
async fn delete_session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.sessions.remove(&id) {
        info!(session = %id, "session closed");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/analyze_posture", post(analyze_handler))
        .route("/video_feed", get(video_feed_handler))
        .route("/sessions/:id", delete(delete_session_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until Ctrl-C.
pub async fn run_server(bind_addr: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let app = router(state);

    info!(%bind_addr, "PostureCare listening");
    info!("  Health:  http://{}/health", bind_addr);
    info!("  Analyze: http://{}/analyze_posture", bind_addr);
    info!("  Video:   http://{}/video_feed", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
    })
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::{slouched, upright, ScriptedEstimator};
    use crate::decode::tests::png_base64;
    use crate::inference::{shared, Pose};
    use crate::posture::AnalyzerSettings;
    use crate::stream::tests::context;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn state(script: Vec<Option<Pose>>) -> Arc<AppState> {
        Arc::new(AppState::new(
            shared(ScriptedEstimator::new(script)),
            SessionRegistry::new(8, AnalyzerSettings::default()),
        ))
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn analyze(body: Value, session: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/analyze_posture")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(id) = session {
            builder = builder.header(SESSION_HEADER, id);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn image() -> String {
        format!("data:image/png;base64,{}", png_base64(640, 480))
    }

    #[tokio::test]
    async fn health() {
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = call(router(state(vec![])), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "healthy", "message": "PostureCare active"}));
    }

    #[tokio::test]
    async fn empty_image_is_rejected() {
        let (status, body) = call(router(state(vec![])), analyze(json!({"image": ""}), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"success": false, "error": "No image provided"}));
    }

    #[tokio::test]
    async fn missing_image_field_is_rejected() {
        let (status, body) = call(router(state(vec![])), analyze(json!({}), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No image provided");
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let req = Request::post("/analyze_posture")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = call(router(state(vec![])), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn undecodable_image_is_server_error() {
        let (status, body) = call(
            router(state(vec![Some(upright())])),
            analyze(json!({"image": "data:image/png;base64,@@@@"}), None),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Failed to decode image"));
    }

    #[tokio::test]
    async fn no_pose_is_soft_failure() {
        let (status, body) = call(router(state(vec![None])), analyze(json!({"image": image()}), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": false, "error": "No pose detected in image"}));
    }

    #[tokio::test]
    async fn upright_pose_is_good() {
        let app = router(state(vec![Some(upright())]));
        let mut body = Value::Null;
        for _ in 0..3 {
            let (status, b) = call(app.clone(), analyze(json!({"image": image()}), Some("s1"))).await;
            assert_eq!(status, StatusCode::OK);
            body = b;
        }
        assert_eq!(body["success"], true);
        assert_eq!(body["is_good_posture"], true);
        assert_eq!(body["issues"], json!([]));
        assert_eq!(body["metrics"]["head_angle"], 90.0);
        assert_eq!(body["metrics"]["shoulder_angle"], 0.0);
        assert_eq!(body["metrics"]["side_twist"], 0.0);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let state = state(vec![Some(slouched())]);
        let app = router(Arc::clone(&state));
        for _ in 0..3 {
            call(app.clone(), analyze(json!({"image": image()}), Some("slouching"))).await;
        }
        let (_, a) = call(app.clone(), analyze(json!({"image": image()}), Some("slouching"))).await;
        let (_, b) = call(
            app.clone(),
            analyze(json!({"image": image(), "session_id": "fresh"}), None),
        )
        .await;

        assert_eq!(a["issues"], json!(["Head forward / rounded back"]));
        assert_eq!(a["is_good_posture"], false);
        assert_eq!(b["is_good_posture"], true);
        assert_eq!(state.sessions.len(), 2);
    }

    #[tokio::test]
    async fn delete_session() {
        let state = state(vec![Some(upright())]);
        let app = router(Arc::clone(&state));
        call(app.clone(), analyze(json!({"image": image()}), Some("bye"))).await;

        let req = Request::delete("/sessions/bye").body(Body::empty()).unwrap();
        let (status, _) = call(app.clone(), req).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let req = Request::delete("/sessions/bye").body(Body::empty()).unwrap();
        let (status, _) = call(app, req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn video_feed_without_source() {
        let req = Request::get("/video_feed").body(Body::empty()).unwrap();
        let (status, _) = call(router(state(vec![])), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn video_feed_streams_multipart() {
        let mut app_state = AppState::new(
            shared(ScriptedEstimator::new(vec![])),
            SessionRegistry::new(8, AnalyzerSettings::default()),
        );
        app_state = app_state.with_stream(context(2, ScriptedEstimator::new(vec![Some(upright())])));
        let app = router(Arc::new(app_state));

        let req = Request::get("/video_feed").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=frame"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let marker = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
        let parts = bytes.windows(marker.len()).filter(|w| *w == marker).count();
        assert_eq!(parts, 2);
    }

    #[test]
    fn fallback_key_without_connect_info() {
        let state = AppState::new(
            shared(ScriptedEstimator::new(vec![])),
            SessionRegistry::new(1, AnalyzerSettings::default()),
        );
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, "curl/8.0".parse().unwrap());
        let key = session_key(&state, &headers, &Extensions::new(), None);
        assert_eq!(key, "unknown|curl/8.0");

        let mut ext = Extensions::new();
        ext.insert(ConnectInfo("127.0.0.1:9000".parse::<SocketAddr>().unwrap()));
        let key = session_key(&state, &headers, &ext, Some("explicit".into()));
        assert_eq!(key, "explicit");
        let key = session_key(&state, &headers, &ext, None);
        assert_eq!(key, "127.0.0.1|curl/8.0");
    }

    #[test]
    fn blank_session_header_defers_to_body() {
        let state = AppState::new(
            shared(ScriptedEstimator::new(vec![])),
            SessionRegistry::new(1, AnalyzerSettings::default()),
        );
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, "curl/8.0".parse().unwrap());
        headers.insert(SESSION_HEADER, "  ".parse().unwrap());

        let key = session_key(&state, &headers, &Extensions::new(), Some("from-body".into()));
        assert_eq!(key, "from-body");
        let key = session_key(&state, &headers, &Extensions::new(), Some(" ".into()));
        assert_eq!(key, "unknown|curl/8.0");

        headers.insert(SESSION_HEADER, "from-header".parse().unwrap());
        let key = session_key(&state, &headers, &Extensions::new(), Some("from-body".into()));
        assert_eq!(key, "from-header");
    }

    #[test]
    fn error_statuses() {
        let status = |e: PostureError| e.into_response().status();
        assert_eq!(status(PostureError::MissingInput), StatusCode::BAD_REQUEST);
        assert_eq!(status(PostureError::InvalidRequest("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(PostureError::NoPoseDetected), StatusCode::OK);
        assert_eq!(status(PostureError::Inference("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status(PostureError::Internal("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
