use super::{AppState, JsonOrForm};
use crate::camera::CameraSettings;
use crate::capture;
use crate::utils::error::{AppError, AppResult, CameraError};
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

/// Either a preset key or explicit settings
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetResolutionRequest {
    #[serde(default, alias = "preset")]
    pub resolution: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub fps: Option<u32>,
    #[serde(default, alias = "hdrEnabled")]
    pub hdr: Option<bool>,
}

pub async fn get_settings(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "settings": state.settings.current(),
        "presets": state.settings.presets(),
    }))
}

pub async fn set_resolution(
    State(state): State<AppState>,
    JsonOrForm(request): JsonOrForm<SetResolutionRequest>,
) -> AppResult<Json<Value>> {
    let settings = match (&request.resolution, request.width, request.height) {
        (Some(key), _, _) => state.settings.apply_preset(key.trim()).await?,
        (None, Some(width), Some(height)) => {
            let current = state.settings.current();
            let custom = CameraSettings {
                width,
                height,
                fps: request.fps.unwrap_or(current.fps),
                hdr: request.hdr.unwrap_or(current.hdr),
            };
            state.settings.apply_custom(custom).await?
        }
        _ => {
            return Err(AppError::from(CameraError::InvalidSettings(
                "expected a resolution preset or width and height".to_string(),
            )))
        }
    };
    Ok(Json(json!({ "success": true, "settings": settings })))
}

pub async fn list_cameras() -> AppResult<Json<Value>> {
    let cameras = tokio::task::spawn_blocking(capture::get_cameras)
        .await
        .map_err(|e| AppError::Task(e.to_string()))?;
    Ok(Json(json!({ "success": true, "cameras": cameras })))
}
