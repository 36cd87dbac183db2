//! HTTP routes
//!
//! Thin handlers over the camera, recorder, media and schedule services.
//! Everything a handler needs travels in `AppState`.

pub mod camera;
pub mod extract;
pub mod media;
pub mod recording;
pub mod schedule;
pub mod stream;

pub use extract::JsonOrForm;

use crate::camera::CameraSettingsManager;
use crate::media::MediaStore;
use crate::recorder::RecordingCoordinator;
use crate::schedule::ScheduleStore;
use crate::stream::StreamBroadcaster;
use crate::utils::error::{AppError, AppResult};
use axum::extract::State;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub settings: CameraSettingsManager,
    pub recorder: Arc<RecordingCoordinator>,
    pub stream: Arc<StreamBroadcaster>,
    pub media: Arc<MediaStore>,
    /// `None` when scheduling is disabled
    pub schedules: Option<Arc<ScheduleStore>>,
    pub default_video_secs: u32,
    pub debug_mode: bool,
    pub started_at: Instant,
}

impl AppState {
    pub(crate) fn schedules(&self) -> AppResult<Arc<ScheduleStore>> {
        self.schedules
            .clone()
            .ok_or_else(|| AppError::NotAvailable("scheduling is disabled".to_string()))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        // Live view
        .route("/live_video_feed", get(stream::live_video_feed))
        // Camera settings
        .route("/settings", get(camera::get_settings))
        .route("/set_resolution", post(camera::set_resolution))
        .route("/cameras", get(camera::list_cameras))
        // Captures
        .route("/take_picture", post(recording::take_picture))
        .route("/record_video", post(recording::record_video))
        .route("/recording_status", get(recording::recording_status))
        // Stored media
        .route("/media/{kind}", get(media::list_media))
        .route(
            "/media/{kind}/{filename}",
            get(media::download_media).delete(media::delete_media),
        )
        .route("/archive/{kind}", get(media::archive_media))
        // Scheduled captures
        .route(
            "/schedules",
            get(schedule::list_schedules).post(schedule::create_schedule),
        )
        .route("/schedules/{id}", delete(schedule::delete_schedule))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Json<Value> {
    Json(json!({
        "name": "camserve",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "GET /health": "Service health",
            "GET /live_video_feed": "Live MJPEG stream",
            "GET /settings": "Current camera settings and presets",
            "POST /set_resolution": "Switch to a preset or custom settings",
            "GET /cameras": "Attached camera devices",
            "POST /take_picture": "Capture a still image",
            "POST /record_video": "Record a video clip",
            "GET /recording_status": "Recording state and last outcome",
            "GET /media/{kind}": "List images or videos",
            "GET /media/{kind}/{filename}": "Download a file",
            "DELETE /media/{kind}/{filename}": "Delete a file",
            "GET /archive/{kind}": "Download all files of a kind as zip",
            "GET /schedules": "List scheduled captures",
            "POST /schedules": "Add a scheduled capture",
            "DELETE /schedules/{id}": "Remove a scheduled capture",
        }
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "debugMode": state.debug_mode,
        "recording": state.recorder.tracker().state(),
        "settings": state.settings.current(),
        "stream": state.stream.stats(),
        "scheduling": state.schedules.is_some(),
    }))
}

/// Run filesystem or subprocess work off the async workers
pub(crate) async fn blocking<T, E>(f: impl FnOnce() -> Result<T, E> + Send + 'static) -> AppResult<T>
where
    T: Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Task(e.to_string()))?
        .map_err(Into::into)
}
