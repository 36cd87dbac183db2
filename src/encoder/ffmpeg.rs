//! FFmpeg subprocess video backends
//!
//! Raw frames are piped to an `ffmpeg` child on stdin. The encoder list of the
//! binary is probed once and shared by every backend using it.

use super::video::{VideoBackend, VideoSession};
use crate::camera::CameraSettings;
use crate::capture::{Frame, PixelFormat};
use crate::utils::error::{CameraError, CameraResult};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, OnceLock};

/// Codec used by an ffmpeg backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfmpegCodec {
    /// H.264, preferred
    Libx264,
    /// MPEG-4 Part 2, present in nearly every ffmpeg build
    Mpeg4,
}

impl FfmpegCodec {
    pub fn encoder_name(&self) -> &'static str {
        match self {
            FfmpegCodec::Libx264 => "libx264",
            FfmpegCodec::Mpeg4 => "mpeg4",
        }
    }

    fn codec_args(&self, fps: u32) -> Vec<String> {
        match self {
            FfmpegCodec::Libx264 => vec![
                "-c:v".to_string(),
                "libx264".to_string(),
                "-preset".to_string(),
                "veryfast".to_string(),
                "-crf".to_string(),
                "23".to_string(),
                "-g".to_string(),
                (fps * 2).to_string(), // GOP size = 2 seconds
            ],
            FfmpegCodec::Mpeg4 => vec![
                "-c:v".to_string(),
                "mpeg4".to_string(),
                "-q:v".to_string(),
                "5".to_string(),
            ],
        }
    }
}

/// Lazily probed `ffmpeg -encoders` output
pub struct FfmpegProbe {
    path: PathBuf,
    encoders: OnceLock<Option<Vec<String>>>,
}

impl FfmpegProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            encoders: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encoders the binary reports, or `None` if it could not be run
    fn encoders(&self) -> Option<&[String]> {
        self.encoders
            .get_or_init(|| {
                let output = Command::new(&self.path)
                    .args(["-hide_banner", "-encoders"])
                    .stdin(Stdio::null())
                    .output();
                match output {
                    Ok(output) if output.status.success() => {
                        let encoders = parse_encoder_list(&String::from_utf8_lossy(&output.stdout));
                        tracing::info!(
                            "Found ffmpeg at {:?} with {} encoders",
                            self.path,
                            encoders.len()
                        );
                        Some(encoders)
                    }
                    Ok(output) => {
                        tracing::warn!("ffmpeg -encoders exited with {}", output.status);
                        None
                    }
                    Err(e) => {
                        tracing::info!("ffmpeg not available at {:?}: {}", self.path, e);
                        None
                    }
                }
            })
            .as_deref()
    }

    pub fn supports(&self, encoder: &str) -> bool {
        self.encoders()
            .is_some_and(|list| list.iter().any(|name| name == encoder))
    }
}

/// Pull encoder names out of `ffmpeg -encoders`.
///
/// Entries look like ` V....D libx264   libx264 H.264 ...`; the header block
/// above the `------` separator is skipped.
fn parse_encoder_list(output: &str) -> Vec<String> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("------"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            (flags.len() == 6).then(|| name.to_string())
        })
        .collect()
}

pub struct FfmpegBackend {
    probe: Arc<FfmpegProbe>,
    codec: FfmpegCodec,
    name: String,
}

impl FfmpegBackend {
    pub fn new(probe: Arc<FfmpegProbe>, codec: FfmpegCodec) -> Self {
        Self {
            probe,
            codec,
            name: format!("ffmpeg/{}", codec.encoder_name()),
        }
    }
}

impl VideoBackend for FfmpegBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn extension(&self) -> &str {
        "mp4"
    }

    fn begin(&self, path: &Path, settings: &CameraSettings) -> CameraResult<Box<dyn VideoSession>> {
        // yuv420p subsamples chroma 2x2
        if settings.width % 2 != 0 || settings.height % 2 != 0 {
            return Err(CameraError::EncodingFailed(format!(
                "{} needs even dimensions for yuv420p, got {}x{}",
                self.codec.encoder_name(),
                settings.width,
                settings.height
            )));
        }
        if !self.probe.supports(self.codec.encoder_name()) {
            return Err(CameraError::EncodingFailed(format!(
                "{} is not available from {}",
                self.codec.encoder_name(),
                self.probe.path().display()
            )));
        }
        Ok(Box::new(FfmpegSession {
            ffmpeg: self.probe.path().to_path_buf(),
            codec: self.codec,
            output: path.to_path_buf(),
            fps: settings.fps.max(1),
            process: None,
        }))
    }
}

struct RunningEncoder {
    child: Child,
    stdin: ChildStdin,
    width: u32,
    height: u32,
    format: PixelFormat,
}

/// The child is spawned on the first frame so the declared input geometry is
/// whatever the camera actually delivers.
struct FfmpegSession {
    ffmpeg: PathBuf,
    codec: FfmpegCodec,
    output: PathBuf,
    fps: u32,
    process: Option<RunningEncoder>,
}

impl FfmpegSession {
    fn spawn(&self, frame: &Frame) -> CameraResult<RunningEncoder> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-nostats".to_string(),
            "-y".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pixel_format".to_string(),
            frame.format().ffmpeg_name().to_string(),
            "-video_size".to_string(),
            format!("{}x{}", frame.width(), frame.height()),
            "-framerate".to_string(),
            self.fps.to_string(),
            "-i".to_string(),
            "-".to_string(),
        ];
        args.extend(self.codec.codec_args(self.fps));
        args.extend([
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            self.output.to_string_lossy().to_string(),
        ]);

        tracing::debug!("Starting FFmpeg encoder: {:?}", args);

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CameraError::EncodingFailed(format!("Failed to start FFmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CameraError::EncodingFailed("Failed to capture FFmpeg stdin".to_string()))?;

        Ok(RunningEncoder {
            child,
            stdin,
            width: frame.width(),
            height: frame.height(),
            format: frame.format(),
        })
    }
}

impl VideoSession for FfmpegSession {
    fn write_frame(&mut self, frame: &Frame) -> CameraResult<()> {
        if self.process.is_none() {
            self.process = Some(self.spawn(frame)?);
        }
        let Some(running) = self.process.as_mut() else {
            return Err(CameraError::EncodingFailed("FFmpeg is not running".to_string()));
        };

        if (frame.width(), frame.height(), frame.format())
            != (running.width, running.height, running.format)
        {
            return Err(CameraError::EncodingFailed(format!(
                "frame #{} is {}x{} {:?}, session started at {}x{} {:?}",
                frame.sequence(),
                frame.width(),
                frame.height(),
                frame.format(),
                running.width,
                running.height,
                running.format
            )));
        }

        running
            .stdin
            .write_all(frame.data())
            .map_err(|e| CameraError::EncodingFailed(format!("Failed to write frame: {e}")))
    }

    fn finish(mut self: Box<Self>) -> CameraResult<()> {
        let Some(running) = self.process.take() else {
            return Err(CameraError::EncodingFailed("FFmpeg received no frames".to_string()));
        };

        // Closing stdin signals EOF
        drop(running.stdin);
        let output = running
            .child
            .wait_with_output()
            .map_err(|e| CameraError::EncodingFailed(format!("Failed to wait for FFmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CameraError::EncodingFailed(format!(
                "FFmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegSession {
    fn drop(&mut self) {
        if let Some(mut running) = self.process.take() {
            let _ = running.child.kill();
            let _ = running.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCODERS: &str = "\
Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V.S... mpeg4                MPEG-4 part 2
 A....D aac                  AAC (Advanced Audio Coding)
";

    #[test]
    fn test_parse_encoder_list() {
        let encoders = parse_encoder_list(ENCODERS);
        assert_eq!(encoders, vec!["libx264", "mpeg4", "aac"]);
    }

    #[test]
    fn test_missing_binary_refuses_to_begin() {
        let probe = Arc::new(FfmpegProbe::new("/nonexistent/ffmpeg-for-tests"));
        let backend = FfmpegBackend::new(probe.clone(), FfmpegCodec::Libx264);
        let dir = tempfile::tempdir().unwrap();

        let result = backend.begin(&dir.path().join("clip.mp4"), &CameraSettings::default());
        assert!(matches!(result, Err(CameraError::EncodingFailed(_))));
        assert!(!probe.supports("mpeg4"));
        assert!(!dir.path().join("clip.mp4").exists());
    }

    #[test]
    fn test_odd_dimensions_refuse_to_begin() {
        let probe = Arc::new(FfmpegProbe::new("/nonexistent/ffmpeg-for-tests"));
        let backend = FfmpegBackend::new(probe, FfmpegCodec::Mpeg4);
        let odd = CameraSettings {
            width: 641,
            height: 481,
            fps: 30,
            hdr: false,
        };
        let dir = tempfile::tempdir().unwrap();

        let err = backend.begin(&dir.path().join("clip.mp4"), &odd).err().unwrap();
        assert!(err.to_string().contains("641x481"));
    }

    #[test]
    fn test_backend_names() {
        let probe = Arc::new(FfmpegProbe::new("ffmpeg"));
        assert_eq!(FfmpegBackend::new(probe.clone(), FfmpegCodec::Libx264).name(), "ffmpeg/libx264");
        assert_eq!(FfmpegBackend::new(probe, FfmpegCodec::Mpeg4).name(), "ffmpeg/mpeg4");
    }
}
