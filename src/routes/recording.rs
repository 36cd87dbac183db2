use super::{AppState, JsonOrForm};
use crate::recorder::RecordingStatus;
use crate::utils::error::AppResult;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordVideoRequest {
    /// Seconds to record; the configured default when absent
    #[serde(default)]
    pub duration: Option<u32>,
    /// Respond once the clip is saved. With `false` the response comes back
    /// as soon as the recording is admitted.
    #[serde(default = "default_wait")]
    pub wait: bool,
}

impl Default for RecordVideoRequest {
    fn default() -> Self {
        Self {
            duration: None,
            wait: true,
        }
    }
}

fn default_wait() -> bool {
    true
}

pub async fn take_picture(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let picture = state.recorder.take_picture().await?;
    Ok(Json(json!({
        "success": true,
        "filename": picture.filename,
        "filepath": picture.filepath,
        "width": picture.width,
        "height": picture.height,
    })))
}

pub async fn record_video(
    State(state): State<AppState>,
    JsonOrForm(request): JsonOrForm<RecordVideoRequest>,
) -> AppResult<Response> {
    let requested = request.duration.unwrap_or(state.default_video_secs);
    let ticket = state.recorder.start_video(requested)?;

    if !request.wait {
        let body = json!({
            "success": true,
            "sessionId": ticket.session_id(),
            "duration": ticket.duration_secs(),
        });
        return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
    }

    let video = ticket.wait().await?;
    Ok(Json(json!({
        "success": true,
        "filename": video.filename,
        "filepath": video.filepath,
        "duration": video.duration,
        "frames": video.frames,
        "backend": video.backend,
    }))
    .into_response())
}

pub async fn recording_status(State(state): State<AppState>) -> Json<RecordingStatus> {
    Json(state.recorder.status())
}
