//! Blinkwatch API Server
//!
//! HTTP surface over the monitoring core: run control, calibration,
//! live statistics, reports, settings, the landmark feed and the
//! wellness assistant.

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use session::{
    frame_channel, Controller, ControllerMode, FrameSender, LogNotifier, MonitorContext,
    NotificationDispatcher,
};
use std::sync::Arc;
use std::time::Instant;
use storage::{ProfileStore, Repository};
use tower_governor::GovernorLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub mod assistant;
pub mod config;
mod error;
pub mod rate_limit;
mod routes;

pub use assistant::Assistant;
pub use crate::config::{AppConfig, LoggingConfig, CONFIG_FILE};
pub use error::ApiError;
pub use rate_limit::RateLimitConfig;

/// Application state shared across handlers
pub struct AppState {
    pub controller: Controller,
    /// Producer side of the landmark feed
    pub frames: FrameSender,
    pub assistant: Assistant,
    pub rate_limit: RateLimitConfig,
    /// Prometheus render handle, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: Instant,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire the core together and start the notification worker
    pub fn new(config: &AppConfig, repo: Repository, metrics: Option<PrometheusHandle>) -> Self {
        let (dispatcher, _worker) = NotificationDispatcher::spawn(
            repo.clone(),
            Arc::new(LogNotifier),
            config.alerting.clone(),
            config.notifications.queue_capacity,
        );
        let profiles = ProfileStore::new(&config.storage.profile_path);
        let ctx = MonitorContext::new(repo, profiles, config.detector.clone())
            .with_dispatcher(dispatcher);
        let (frames, source) = frame_channel(config.server.frame_queue);

        Self {
            controller: Controller::new(ctx, source),
            frames,
            assistant: Assistant::new(config.assistant.clone()),
            rate_limit: RateLimitConfig::from(&config.server),
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn repo(&self) -> &Repository {
        &self.controller.context().repo
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub mode: ControllerMode,
    pub calibrated: bool,
    pub assistant_available: bool,
}

/// Create the application router
pub fn create_router(state: SharedState) -> Router {
    let mut chat = Router::new().route("/api/v1/chat", post(routes::chat::chat));
    match rate_limit::create_governor_config(&state.rate_limit) {
        Some(config) => chat = chat.layer(GovernorLayer { config }),
        None => warn!("Chat rate limiting disabled"),
    }

    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route(
            "/api/v1/calibration",
            get(routes::calibration::status).post(routes::calibration::calibrate),
        )
        .route("/api/v1/monitoring/start", post(routes::monitoring::start))
        .route("/api/v1/monitoring/stop", post(routes::monitoring::stop))
        .route("/api/v1/stats/live", get(routes::stats::live))
        .route("/api/v1/stats/summary", get(routes::stats::summary))
        .route("/api/v1/reports/weekly", get(routes::stats::weekly))
        .route("/api/v1/reports/sessions/:id", get(routes::stats::session))
        .route(
            "/api/v1/settings",
            get(routes::settings::get_settings).put(routes::settings::save_settings),
        )
        .route("/api/v1/frames", post(routes::frames::push))
        .route("/metrics", get(metrics_handler))
        .merge(chat)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        mode: state.controller.mode().await,
        calibrated: state.controller.context().profiles.is_calibrated().await,
        assistant_available: state.assistant.is_available(),
    })
}

async fn metrics_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let body = state.metrics.as_ref().map(|h| h.render()).unwrap_or_default();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = FmtSubscriber::builder().with_env_filter(filter).with_target(true);

    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Run the server until Ctrl-C, then close any open session
pub async fn run_server(config: AppConfig, metrics: Option<PrometheusHandle>) -> anyhow::Result<()> {
    let repo = Repository::connect(&config.storage.database_url).await?;
    let state = Arc::new(AppState::new(&config, repo, metrics));
    let app = create_router(state.clone());

    info!("Starting API server on {}", config.server.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if state.controller.mode().await == ControllerMode::Monitoring {
        match state.controller.stop_monitoring().await {
            Ok(id) => info!("Closed session {} on shutdown", id),
            Err(e) => error!("Could not close session on shutdown: {}", e),
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Could not listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app(dir: &tempfile::TempDir) -> (Router, SharedState) {
        let mut config = AppConfig::default();
        config.storage.profile_path = dir
            .path()
            .join("calibration_profile.json")
            .to_string_lossy()
            .into_owned();
        let repo = Repository::in_memory().await.unwrap();
        let state = Arc::new(AppState::new(&config, repo, None));
        (create_router(state.clone()), state)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_and_calibration_status() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(&dir).await;

        let (status, body) = call(&app, "GET", "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "idle");

        let (_, body) = call(&app, "GET", "/api/v1/calibration", None).await;
        assert_eq!(body, json!({ "is_calibrated": false }));
    }

    #[tokio::test]
    async fn test_monitoring_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(&dir).await;

        let (_, body) = call(&app, "POST", "/api/v1/monitoring/stop", None).await;
        assert_eq!(body["status"], "No active monitoring session");

        let (status, body) = call(&app, "POST", "/api/v1/monitoring/start", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Monitoring started");

        let (_, body) = call(&app, "POST", "/api/v1/monitoring/start", None).await;
        assert_eq!(body["status"], "Monitoring is already active");

        let (status, _) = call(&app, "POST", "/api/v1/calibration", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&app, "POST", "/api/v1/frames", Some(json!({ "landmarks": null }))).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (_, body) = call(&app, "POST", "/api/v1/monitoring/stop", None).await;
        assert_eq!(body["status"], "Monitoring stopped");
        let session_id = body["session_id"].as_i64().unwrap();

        let (status, body) =
            call(&app, "GET", &format!("/api/v1/reports/sessions/{session_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session_id"], session_id);

        let (_, body) = call(&app, "GET", "/api/v1/stats/live", None).await;
        assert_eq!(body["monitoring"], false);
    }

    #[tokio::test]
    async fn test_frames_dropped_while_idle() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(&dir).await;

        let (status, _) = call(&app, "POST", "/api/v1/frames", Some(json!({ "landmarks": null }))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = call(&app, "POST", "/api/v1/frames", Some(json!({ "landmarks": 3 }))).await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_missing_session_report() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(&dir).await;
        let (status, _) = call(&app, "GET", "/api/v1/reports/sessions/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(&dir).await;

        let (status, body) = call(
            &app,
            "PUT",
            "/api/v1/settings",
            Some(json!({ "userName": "Asha", "notifyFrequency": 45, "masterNotifications": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "success", "message": "Settings saved." }));

        let (_, body) = call(&app, "GET", "/api/v1/settings", None).await;
        assert_eq!(body["user_name"], "Asha");
        assert_eq!(body["notify_frequency"], 45);
        assert_eq!(body["master_notifications"], false);
        assert_eq!(body["active_start_time"], "09:00");
    }

    #[tokio::test]
    async fn test_dashboard_routes() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(&dir).await;

        let (status, body) = call(&app, "GET", "/api/v1/stats/summary", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["health_score"], 75);
        assert_eq!(body["current_streak"], 0);

        let (status, body) = call(&app, "GET", "/api/v1/reports/weekly", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["labels"], json!([]));
    }

    #[tokio::test]
    async fn test_chat_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(&dir).await;

        let (status, body) = call(&app, "POST", "/api/v1/chat", Some(json!({ "message": "hi" }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["reply"], assistant::UNAVAILABLE_REPLY);
    }
}
