//! Frame encoders
//!
//! JPEG for stills and the live stream, plus the video backend chain used for
//! clip recording.

pub mod ffmpeg;
pub mod jpeg;
pub mod video;

pub use ffmpeg::{FfmpegBackend, FfmpegCodec, FfmpegProbe};
pub use jpeg::encode_jpeg;
pub use video::{MjpegFileBackend, VideoBackend, VideoEncoder, VideoFile, VideoRecording, VideoSession};
