//! Recording coordinator
//!
//! Runs still captures and video clips against the shared camera. A clip
//! holds the device for its whole duration and always puts the live settings
//! back before letting go, whether or not the clip succeeded.

use super::state::{cap_duration, ActiveRecording, RecordingSession, RecordingStatus, RecordingTracker};
use crate::camera::{CameraDevice, CameraSettings, DeviceSlot};
use crate::encoder::{encode_jpeg, VideoEncoder, VideoFile};
use crate::media::{MediaKind, MediaStore};
use crate::utils::error::{AppError, AppResult, CameraError, CameraResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Capture failures in a row that abort a clip
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// A saved still image
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedPicture {
    pub filename: String,
    pub filepath: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// A saved video clip
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedVideo {
    pub filename: String,
    pub filepath: PathBuf,
    /// Recorded length in seconds
    pub duration: f64,
    pub requested_secs: u32,
    pub frames: u64,
    pub backend: String,
}

/// Handle to an admitted recording
pub struct RecordingTicket {
    session_id: Uuid,
    duration_secs: u32,
    handle: JoinHandle<CameraResult<RecordedVideo>>,
}

impl RecordingTicket {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Duration that will be recorded, after capping
    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    /// Wait for the clip to finish
    pub async fn wait(self) -> AppResult<RecordedVideo> {
        match self.handle.await {
            Ok(result) => result.map_err(AppError::from),
            Err(e) => Err(AppError::Task(format!("recording task failed: {e}"))),
        }
    }
}

pub struct RecordingCoordinator {
    device: CameraDevice,
    encoder: Arc<VideoEncoder>,
    media: Arc<MediaStore>,
    tracker: RecordingTracker,
    picture_gate: Mutex<()>,
    picture_quality: u8,
    max_video_secs: u32,
    recording_settings: Option<CameraSettings>,
}

impl RecordingCoordinator {
    pub fn new(
        device: CameraDevice,
        encoder: Arc<VideoEncoder>,
        media: Arc<MediaStore>,
        tracker: RecordingTracker,
    ) -> Self {
        Self {
            device,
            encoder,
            media,
            tracker,
            picture_gate: Mutex::new(()),
            picture_quality: 95,
            max_video_secs: super::MAX_RECORDING_SECS,
            recording_settings: None,
        }
    }

    pub fn with_picture_quality(mut self, quality: u8) -> Self {
        self.picture_quality = quality;
        self
    }

    pub fn with_max_video_secs(mut self, secs: u32) -> Self {
        self.max_video_secs = secs;
        self
    }

    /// Record clips at these settings instead of the live ones
    pub fn with_recording_settings(mut self, settings: Option<CameraSettings>) -> Self {
        self.recording_settings = settings;
        self
    }

    pub fn status(&self) -> RecordingStatus {
        self.tracker.status()
    }

    pub fn tracker(&self) -> &RecordingTracker {
        &self.tracker
    }

    /// Capture one frame at the live settings and save it as JPEG.
    ///
    /// Waits for an active clip to release the camera first.
    pub async fn take_picture(&self) -> AppResult<CapturedPicture> {
        let _gate = self.picture_gate.lock().await;
        if self.tracker.is_recording() {
            tracing::debug!("Picture waiting for active recording to finish");
        }

        let frame = self.device.with_slot(|slot| slot.capture_live()).await?;
        let (width, height) = (frame.width(), frame.height());

        let quality = self.picture_quality;
        let jpeg = tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality))
            .await
            .map_err(|e| AppError::Task(e.to_string()))??;

        let media = self.media.clone();
        let path = tokio::task::spawn_blocking(move || media.save(MediaKind::Image, &jpeg))
            .await
            .map_err(|e| AppError::Task(e.to_string()))??;

        let picture = CapturedPicture {
            filename: file_name(&path),
            filepath: path,
            width,
            height,
        };
        tracing::info!("Picture saved: {} ({}x{})", picture.filename, width, height);
        Ok(picture)
    }

    /// Admit a clip and start recording it in the background.
    ///
    /// Fails immediately with `AlreadyRecording` if a clip is active. The
    /// recording runs to completion even if the ticket is dropped.
    pub fn start_video(self: &Arc<Self>, requested_secs: u32) -> AppResult<RecordingTicket> {
        let duration = cap_duration(requested_secs, self.max_video_secs)?;
        if duration < requested_secs {
            tracing::info!("Requested {}s clip capped to {}s", requested_secs, duration);
        }

        let base = self.media.allocate_stem(MediaKind::Video);
        let active = self
            .tracker
            .begin(RecordingSession::new(base.clone(), requested_secs, duration))?;
        let session_id = active.session_id();

        let coordinator = self.clone();
        let handle = tokio::spawn(async move {
            coordinator
                .record_clip(active, base, duration, requested_secs)
                .await
        });

        tracing::info!("Recording {} admitted for {}s", session_id, duration);
        Ok(RecordingTicket {
            session_id,
            duration_secs: duration,
            handle,
        })
    }

    /// Record a clip and wait for the result
    pub async fn record_video(self: &Arc<Self>, requested_secs: u32) -> AppResult<RecordedVideo> {
        self.start_video(requested_secs)?.wait().await
    }

    async fn record_clip(
        &self,
        active: ActiveRecording,
        base: PathBuf,
        duration: u32,
        requested_secs: u32,
    ) -> CameraResult<RecordedVideo> {
        let encoder = self.encoder.clone();
        let override_settings = self.recording_settings;

        let result = self
            .device
            .with_slot(move |slot| {
                let settings = override_settings.unwrap_or_else(|| slot.live());
                active.set_settings(settings);

                let clip = capture_clip(slot, &encoder, &base, &settings, duration, &active);

                // The live configuration comes back before anyone else gets the device
                let needs_restore = clip.is_err() || slot.opened_with() != Some(slot.live());
                if needs_restore {
                    if let Err(e) = slot.reopen_live() {
                        tracing::error!("Failed to restore live stream after recording: {}", e);
                    }
                }

                match clip {
                    Ok(file) => {
                        active.finish(Ok((file.path.as_path(), file.duration_secs)));
                        Ok(file)
                    }
                    Err(e) => {
                        active.finish(Err(&e));
                        Err(e)
                    }
                }
            })
            .await;

        match result {
            Ok(file) => Ok(RecordedVideo {
                filename: file_name(&file.path),
                filepath: file.path,
                duration: file.duration_secs,
                requested_secs,
                frames: file.frames,
                backend: file.backend,
            }),
            Err(e) => {
                tracing::error!("Recording failed: {}", e);
                Err(e)
            }
        }
    }
}

/// Record `duration × fps` frames into a new video file
fn capture_clip(
    slot: &mut DeviceSlot,
    encoder: &VideoEncoder,
    base: &Path,
    settings: &CameraSettings,
    duration: u32,
    active: &ActiveRecording,
) -> CameraResult<VideoFile> {
    slot.ensure_open(settings)?;

    let mut recording = encoder.begin_video_recording(base, settings)?;
    active.set_output_path(recording.path());

    let total = duration as u64 * settings.fps as u64;
    let mut failures = 0;
    while recording.frames() < total {
        match slot.capture() {
            Ok(frame) => {
                failures = 0;
                recording.write_frame(&frame)?;
                // The first frame settles which backend, and so which file, holds the clip
                if recording.frames() == 1 {
                    active.set_output_path(recording.path());
                }
            }
            Err(e) => {
                failures += 1;
                tracing::warn!("Frame capture failed during recording ({}): {}", failures, e);
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    return Err(CameraError::CaptureFailed(format!(
                        "{failures} consecutive capture failures, last: {e}"
                    )));
                }
            }
        }
    }

    encoder.end_video_recording(recording)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
