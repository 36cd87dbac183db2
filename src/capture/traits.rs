//! Capture trait definitions
//!
//! Backend-agnostic frame type and the `FrameSource` contract shared by the
//! simulated and physical camera backends.

use crate::camera::CameraSettings;
use crate::utils::error::{CameraError, CameraResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pixel layout of a raw frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Packed 8-bit RGB
    Rgb24,
    /// Single 8-bit luma plane
    Gray8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Gray8 => 1,
        }
    }

    /// Matching FFmpeg rawvideo pixel format
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Gray8 => "gray",
        }
    }
}

/// One raw image sample from the camera.
///
/// Pixel data sits behind an `Arc` so a frame can be handed to the encoder
/// without copying, but it is never mutated after capture.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Arc<[u8]>,
    sequence: u64,
}

impl Frame {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>, sequence: u64) -> Self {
        Self {
            width,
            height,
            format,
            data: data.into(),
            sequence,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Monotonic counter assigned by the source
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Byte length a well-formed frame of these dimensions must have
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Reject zero-sized frames and buffers that do not match the declared geometry
    pub fn validate(&self) -> CameraResult<()> {
        if self.width == 0 || self.height == 0 || self.data.is_empty() {
            return Err(CameraError::EncodingFailed(format!(
                "empty frame #{} ({}x{}, {} bytes)",
                self.sequence,
                self.width,
                self.height,
                self.data.len()
            )));
        }
        if self.data.len() != self.expected_len() {
            return Err(CameraError::EncodingFailed(format!(
                "malformed frame #{}: {} bytes, expected {} for {}x{} {:?}",
                self.sequence,
                self.data.len(),
                self.expected_len(),
                self.width,
                self.height,
                self.format
            )));
        }
        Ok(())
    }
}

/// A camera backend producing raw frames.
///
/// Reconfiguration is close-then-reopen. Callers serialize access through the
/// device slot, so implementations never see two settings states at once.
pub trait FrameSource: Send {
    /// Backend name for logs and status
    fn name(&self) -> &str;

    /// Open the source with the given settings
    fn open(&mut self, settings: &CameraSettings) -> CameraResult<()>;

    /// Capture the next frame. Blocks until the source delivers one.
    fn capture_frame(&mut self) -> CameraResult<Frame>;

    /// Release the source. Closing an already closed source is a no-op.
    fn close(&mut self);

    /// Whether the source is currently open
    fn is_open(&self) -> bool;
}

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,

    /// Supported resolutions
    pub supported_resolutions: Vec<Resolution>,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}
