use super::{blocking, AppState, JsonOrForm};
use crate::schedule::ScheduleRequest;
use crate::utils::error::AppResult;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

pub async fn list_schedules(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let store = state.schedules()?;
    let schedules = blocking(move || store.list()).await?;
    Ok(Json(json!({ "success": true, "schedules": schedules })))
}

pub async fn create_schedule(
    State(state): State<AppState>,
    JsonOrForm(request): JsonOrForm<ScheduleRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let store = state.schedules()?;
    let entry = blocking(move || store.add(&request)).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "schedule": entry })),
    ))
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let store = state.schedules()?;
    let removed = blocking(move || store.remove(&id)).await?;
    Ok(Json(json!({ "success": true, "schedule": removed })))
}
