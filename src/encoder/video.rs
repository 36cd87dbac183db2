//! Video encoding sessions
//!
//! A `VideoEncoder` holds an ordered chain of backends. Beginning a recording
//! tries each in turn and the first one that accepts owns the session.

use super::ffmpeg::{FfmpegBackend, FfmpegCodec, FfmpegProbe};
use super::jpeg::encode_jpeg;
use crate::camera::CameraSettings;
use crate::capture::Frame;
use crate::utils::error::{CameraError, CameraResult};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A way of turning frames into a video file
pub trait VideoBackend: Send + Sync {
    /// Backend name for logs and responses
    fn name(&self) -> &str;

    /// File extension of the produced container, without the dot
    fn extension(&self) -> &str;

    /// Start a session writing to `path`. Fails if the backend cannot run here.
    fn begin(&self, path: &Path, settings: &CameraSettings) -> CameraResult<Box<dyn VideoSession>>;
}

/// An open encoding session
pub trait VideoSession: Send {
    fn write_frame(&mut self, frame: &Frame) -> CameraResult<()>;

    /// Flush and close the output
    fn finish(self: Box<Self>) -> CameraResult<()>;
}

/// A recording in progress. Dropping it without ending it removes the partial file.
///
/// Backends that start lazily can still fail on the first frame. The recording
/// keeps the untried rest of the chain and moves on to it in that case.
pub struct VideoRecording {
    session: Option<Box<dyn VideoSession>>,
    path: PathBuf,
    backend: String,
    fps: u32,
    frames: u64,
    base: PathBuf,
    settings: CameraSettings,
    remaining: Vec<Arc<dyn VideoBackend>>,
}

impl VideoRecording {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn write_frame(&mut self, frame: &Frame) -> CameraResult<()> {
        frame.validate()?;
        loop {
            let session = self
                .session
                .as_mut()
                .ok_or_else(|| CameraError::EncodingFailed("session already closed".to_string()))?;
            match session.write_frame(frame) {
                Ok(()) => {
                    self.frames += 1;
                    return Ok(());
                }
                Err(e) if self.frames == 0 && !self.remaining.is_empty() => {
                    tracing::warn!("Video backend {} failed on first frame: {}", self.backend, e);
                    self.discard();
                    self.fall_back(e)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Start the next backend of the chain that accepts the session
    fn fall_back(&mut self, first_error: CameraError) -> CameraResult<()> {
        let mut failures = vec![format!("{}: {}", self.backend, first_error)];
        let remaining = std::mem::take(&mut self.remaining);
        match open_first(&remaining, &self.base, &self.settings, &mut failures) {
            Some((index, path, session)) => {
                self.backend = remaining[index].name().to_string();
                self.path = path;
                self.session = Some(session);
                self.remaining = remaining[index + 1..].to_vec();
                Ok(())
            }
            None => Err(CameraError::EncodingFailed(format!(
                "no video backend could record ({})",
                failures.join("; ")
            ))),
        }
    }

    fn discard(&mut self) {
        // Stop the writer before removing what it wrote
        self.session.take();
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!("Failed to remove partial video {:?}: {}", self.path, e);
            } else {
                tracing::debug!("Removed partial video {:?}", self.path);
            }
        }
    }
}

impl Drop for VideoRecording {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.discard();
        }
    }
}

/// A finished clip
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoFile {
    pub path: PathBuf,
    pub frames: u64,
    pub duration_secs: f64,
    pub backend: String,
}

/// Ordered chain of video backends
pub struct VideoEncoder {
    backends: Vec<Arc<dyn VideoBackend>>,
}

impl VideoEncoder {
    pub fn new(backends: Vec<Arc<dyn VideoBackend>>) -> Self {
        Self { backends }
    }

    /// ffmpeg/libx264, then ffmpeg/mpeg4, then the in-process MJPEG writer
    pub fn default_chain(ffmpeg_path: &str, jpeg_quality: u8) -> Self {
        let probe = Arc::new(FfmpegProbe::new(ffmpeg_path));
        Self::new(vec![
            Arc::new(FfmpegBackend::new(probe.clone(), FfmpegCodec::Libx264)),
            Arc::new(FfmpegBackend::new(probe, FfmpegCodec::Mpeg4)),
            Arc::new(MjpegFileBackend::new(jpeg_quality)),
        ])
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Open a session on the first backend that accepts it.
    ///
    /// `base` is the output path without extension; each backend adds its own.
    pub fn begin_video_recording(
        &self,
        base: &Path,
        settings: &CameraSettings,
    ) -> CameraResult<VideoRecording> {
        let mut failures = Vec::new();
        match open_first(&self.backends, base, settings, &mut failures) {
            Some((index, path, session)) => Ok(VideoRecording {
                session: Some(session),
                path,
                backend: self.backends[index].name().to_string(),
                fps: settings.fps.max(1),
                frames: 0,
                base: base.to_path_buf(),
                settings: *settings,
                remaining: self.backends[index + 1..].to_vec(),
            }),
            None => Err(CameraError::EncodingFailed(if failures.is_empty() {
                "no video backends configured".to_string()
            } else {
                format!("no video backend could start ({})", failures.join("; "))
            })),
        }
    }

    /// Close the session and return the finished file. On failure the partial
    /// file is removed.
    pub fn end_video_recording(&self, mut recording: VideoRecording) -> CameraResult<VideoFile> {
        if recording.frames == 0 {
            recording.discard();
            return Err(CameraError::EncodingFailed(
                "no frames were recorded".to_string(),
            ));
        }

        let Some(session) = recording.session.take() else {
            return Err(CameraError::EncodingFailed("session already closed".to_string()));
        };
        if let Err(e) = session.finish() {
            recording.discard();
            return Err(e);
        }

        let file = VideoFile {
            path: recording.path.clone(),
            frames: recording.frames,
            duration_secs: recording.frames as f64 / recording.fps as f64,
            backend: recording.backend.clone(),
        };
        tracing::info!(
            "Video finished: {:?}, {} frames ({:.1}s) via {}",
            file.path,
            file.frames,
            file.duration_secs,
            file.backend
        );
        Ok(file)
    }
}

/// Begin on the first backend in `backends` that accepts, noting each refusal
fn open_first(
    backends: &[Arc<dyn VideoBackend>],
    base: &Path,
    settings: &CameraSettings,
    failures: &mut Vec<String>,
) -> Option<(usize, PathBuf, Box<dyn VideoSession>)> {
    for (index, backend) in backends.iter().enumerate() {
        let path = base.with_extension(backend.extension());
        match backend.begin(&path, settings) {
            Ok(session) => {
                tracing::info!(
                    "Recording {}x{} @ {}fps with {} to {:?}",
                    settings.width,
                    settings.height,
                    settings.fps,
                    backend.name(),
                    path
                );
                return Some((index, path, session));
            }
            Err(e) => {
                tracing::debug!("Video backend {} unavailable: {}", backend.name(), e);
                failures.push(format!("{}: {}", backend.name(), e));
            }
        }
    }
    None
}

/// Writes each frame as a JPEG into one concatenated MJPEG stream file.
/// Needs nothing outside the process, so it closes the chain.
pub struct MjpegFileBackend {
    quality: u8,
}

impl MjpegFileBackend {
    pub fn new(quality: u8) -> Self {
        Self { quality }
    }
}

impl VideoBackend for MjpegFileBackend {
    fn name(&self) -> &str {
        "mjpeg-file"
    }

    fn extension(&self) -> &str {
        "mjpeg"
    }

    fn begin(&self, path: &Path, _settings: &CameraSettings) -> CameraResult<Box<dyn VideoSession>> {
        let file = File::create(path).map_err(|e| {
            CameraError::EncodingFailed(format!("cannot create {}: {}", path.display(), e))
        })?;
        Ok(Box::new(MjpegFileSession {
            writer: BufWriter::new(file),
            quality: self.quality,
        }))
    }
}

struct MjpegFileSession {
    writer: BufWriter<File>,
    quality: u8,
}

impl VideoSession for MjpegFileSession {
    fn write_frame(&mut self, frame: &Frame) -> CameraResult<()> {
        let jpeg = encode_jpeg(frame, self.quality)?;
        self.writer
            .write_all(&jpeg)
            .map_err(|e| CameraError::EncodingFailed(format!("write frame: {e}")))
    }

    fn finish(mut self: Box<Self>) -> CameraResult<()> {
        self.writer
            .flush()
            .map_err(|e| CameraError::EncodingFailed(format!("flush: {e}")))
    }
}
