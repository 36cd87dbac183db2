use super::{blocking, AppState};
use crate::media::{content_type_for, MediaKind};
use crate::utils::error::{AppError, AppResult};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;

pub async fn list_media(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> AppResult<Json<Value>> {
    let kind: MediaKind = kind.parse()?;
    let media = state.media.clone();
    let files = blocking(move || media.list(kind)).await?;
    Ok(Json(json!({
        "success": true,
        "kind": kind,
        "count": files.len(),
        "files": files,
    })))
}

pub async fn download_media(
    State(state): State<AppState>,
    Path((kind, filename)): Path<(String, String)>,
) -> AppResult<Response> {
    let kind: MediaKind = kind.parse()?;
    let path = state.media.resolve(kind, &filename)?;
    let file = tokio::fs::File::open(&path).await?;
    let length = file.metadata().await?.len();

    let body = Body::from_stream(ReaderStream::new(file));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&filename))
        .header(header::CONTENT_LENGTH, length)
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{filename}\""),
        )
        .body(body)
        .map_err(|e| AppError::Task(format!("failed to build response: {e}")))
}

pub async fn delete_media(
    State(state): State<AppState>,
    Path((kind, filename)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let kind: MediaKind = kind.parse()?;
    let media = state.media.clone();
    let name = filename.clone();
    blocking(move || media.delete(kind, &name)).await?;
    Ok(Json(json!({ "success": true, "filename": filename })))
}

pub async fn archive_media(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> AppResult<Response> {
    let kind: MediaKind = kind.parse()?;
    let media = state.media.clone();
    let archive = blocking(move || media.archive(kind)).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, archive.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{kind}.zip\""),
        )
        .body(Body::from(archive))
        .map_err(|e| AppError::Task(format!("failed to build response: {e}")))
}
