//! Error types and handling
//!
//! Common error types used across the service, and their mapping onto
//! HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::media::MediaError;
use crate::schedule::ScheduleError;

/// Errors raised by the camera pipeline: capture, encoding, settings and recording.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Frame capture failed: {0}")]
    CaptureFailed(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("A recording is already in progress")]
    AlreadyRecording,

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Camera busy: {0}")]
    Busy(String),
}

impl CameraError {
    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            CameraError::DeviceUnavailable(_) => "DEVICE_UNAVAILABLE",
            CameraError::CaptureFailed(_) => "CAPTURE_FAILED",
            CameraError::EncodingFailed(_) => "ENCODING_FAILED",
            CameraError::AlreadyRecording => "ALREADY_RECORDING",
            CameraError::UnknownPreset(_) => "UNKNOWN_PRESET",
            CameraError::InvalidSettings(_) => "INVALID_SETTINGS",
            CameraError::Busy(_) => "BUSY",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            CameraError::DeviceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CameraError::CaptureFailed(_) | CameraError::EncodingFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            CameraError::AlreadyRecording | CameraError::Busy(_) => StatusCode::CONFLICT,
            CameraError::UnknownPreset(_) | CameraError::InvalidSettings(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

/// Result type alias for camera pipeline operations
pub type CameraResult<T> = Result<T, CameraError>;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not available: {0}")]
    NotAvailable(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Camera(e) => (e.status(), e.code()),
            AppError::Media(e) => match e {
                MediaError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                MediaError::InvalidName(_) | MediaError::UnknownKind(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_NAME")
                }
                MediaError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
                MediaError::Archive(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ARCHIVE_ERROR"),
            },
            AppError::Schedule(e) => match e {
                ScheduleError::InvalidInterval(_) | ScheduleError::InvalidRequest(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_SCHEDULE")
                }
                ScheduleError::Duplicate(_) => (StatusCode::CONFLICT, "DUPLICATE_SCHEDULE"),
                ScheduleError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                ScheduleError::Crontab(_) | ScheduleError::Io(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "CRONTAB_ERROR")
                }
            },
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            AppError::Task(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TASK_ERROR"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::NotAvailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "NOT_AVAILABLE"),
        }
    }
}

/// Error response body for HTTP clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        let (_, code) = error.status_and_code();
        ErrorResponse {
            success: false,
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, _) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_recording_maps_to_conflict() {
        let error = AppError::from(CameraError::AlreadyRecording);
        let body = ErrorResponse::from(&error);
        assert!(!body.success);
        assert_eq!(body.code, "ALREADY_RECORDING");
        assert!(body.message.contains("already in progress"));
        assert_eq!(error.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_unknown_preset_is_bad_request() {
        let error = AppError::from(CameraError::UnknownPreset("9x9x9".to_string()));
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_schedule_duplicate_is_conflict() {
        let error = AppError::from(ScheduleError::Duplicate("h0-m5-picture-d0".to_string()));
        assert_eq!(ErrorResponse::from(&error).code, "DUPLICATE_SCHEDULE");
        assert_eq!(error.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_device_unavailable_is_service_unavailable() {
        let error = AppError::from(CameraError::DeviceUnavailable("gone".to_string()));
        assert_eq!(error.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
