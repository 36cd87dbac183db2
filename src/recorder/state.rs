//! Recording state management
//!
//! Defines the recording state machine, session tracking, and the guard that
//! returns the system to `Idle` when a recording ends for any reason.

use crate::camera::CameraSettings;
use crate::utils::error::{CameraError, CameraResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Hard upper bound on clip length in seconds
pub const MAX_RECORDING_SECS: u32 = 30;

/// Current state of the recording system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No recording in progress
    #[default]
    Idle,
    /// Currently recording
    Recording,
}

/// The active video recording
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    pub id: Uuid,

    /// Output file. Allocated without an extension on admission; the encoder
    /// backend that takes the clip adds its own.
    pub output_path: PathBuf,

    pub started_at: DateTime<Utc>,

    /// Duration the client asked for
    pub requested_secs: u32,

    /// Duration that will actually be recorded (≤ 30s)
    pub duration_cap: u32,

    /// Settings the clip is captured at
    pub settings: Option<CameraSettings>,
}

impl RecordingSession {
    pub fn new(output_path: PathBuf, requested_secs: u32, duration_cap: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            output_path,
            started_at: Utc::now(),
            requested_secs,
            duration_cap,
            settings: None,
        }
    }
}

/// How the most recent recording ended
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingOutcome {
    pub session_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Snapshot served by the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    pub state: RecordingState,
    pub session: Option<RecordingSession>,
    pub last_outcome: Option<RecordingOutcome>,
}

/// Clamp a requested clip length to the configured cap, itself bounded by
/// `MAX_RECORDING_SECS`. Zero is rejected.
pub fn cap_duration(requested_secs: u32, configured_max: u32) -> CameraResult<u32> {
    if requested_secs == 0 {
        return Err(CameraError::InvalidSettings(
            "duration must be at least 1 second".to_string(),
        ));
    }
    let cap = configured_max.clamp(1, MAX_RECORDING_SECS);
    Ok(requested_secs.min(cap))
}

#[derive(Debug, Default)]
struct TrackerInner {
    session: Option<RecordingSession>,
    last_outcome: Option<RecordingOutcome>,
}

/// Shared recording state. At most one session is active at a time.
#[derive(Clone, Default)]
pub struct RecordingTracker {
    inner: Arc<RwLock<TrackerInner>>,
}

impl RecordingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RecordingState {
        if self.inner.read().session.is_some() {
            RecordingState::Recording
        } else {
            RecordingState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecordingState::Recording
    }

    pub fn status(&self) -> RecordingStatus {
        let inner = self.inner.read();
        RecordingStatus {
            state: if inner.session.is_some() {
                RecordingState::Recording
            } else {
                RecordingState::Idle
            },
            session: inner.session.clone(),
            last_outcome: inner.last_outcome.clone(),
        }
    }

    /// Enter `Recording`. Fails without touching the current session if one is active.
    pub fn begin(&self, session: RecordingSession) -> CameraResult<ActiveRecording> {
        let mut inner = self.inner.write();
        if inner.session.is_some() {
            return Err(CameraError::AlreadyRecording);
        }
        let id = session.id;
        inner.session = Some(session);
        Ok(ActiveRecording {
            tracker: self.clone(),
            session_id: id,
            finished: false,
        })
    }

    pub(crate) fn update_session(&self, id: Uuid, update: impl FnOnce(&mut RecordingSession)) {
        let mut inner = self.inner.write();
        if let Some(session) = inner.session.as_mut().filter(|s| s.id == id) {
            update(session);
        }
    }

    fn end(&self, id: Uuid, outcome: RecordingOutcome) {
        let mut inner = self.inner.write();
        if inner.session.as_ref().is_some_and(|s| s.id == id) {
            inner.session = None;
        }
        inner.last_outcome = Some(outcome);
    }
}

/// Guard for the active session. Dropping it returns the tracker to `Idle`.
pub struct ActiveRecording {
    tracker: RecordingTracker,
    session_id: Uuid,
    finished: bool,
}

impl ActiveRecording {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn set_output_path(&self, path: &Path) {
        let path = path.to_path_buf();
        self.tracker
            .update_session(self.session_id, |s| s.output_path = path);
    }

    pub fn set_settings(&self, settings: CameraSettings) {
        self.tracker
            .update_session(self.session_id, |s| s.settings = Some(settings));
    }

    /// Leave `Recording`, recording how the session ended
    pub fn finish(mut self, result: Result<(&Path, f64), &CameraError>) {
        let outcome = match result {
            Ok((path, duration_secs)) => RecordingOutcome {
                session_id: self.session_id,
                success: true,
                filename: path.file_name().map(|n| n.to_string_lossy().to_string()),
                duration_secs: Some(duration_secs),
                message: None,
                finished_at: Utc::now(),
            },
            Err(e) => RecordingOutcome {
                session_id: self.session_id,
                success: false,
                filename: None,
                duration_secs: None,
                message: Some(e.to_string()),
                finished_at: Utc::now(),
            },
        };
        self.finished = true;
        self.tracker.end(self.session_id, outcome);
    }
}

impl Drop for ActiveRecording {
    fn drop(&mut self) {
        if !self.finished {
            self.tracker.end(
                self.session_id,
                RecordingOutcome {
                    session_id: self.session_id,
                    success: false,
                    filename: None,
                    duration_secs: None,
                    message: Some("recording aborted".to_string()),
                    finished_at: Utc::now(),
                },
            );
        }
    }
}
