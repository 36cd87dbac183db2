//! Camera settings and the preset table

use crate::utils::error::{CameraError, CameraResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Largest accepted frame edge in pixels
pub const MAX_DIMENSION: u32 = 8192;

/// Highest accepted frame rate
pub const MAX_FPS: u32 = 240;

/// The live camera configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    #[serde(default, alias = "hdrEnabled")]
    pub hdr: bool,
}

impl CameraSettings {
    /// Check that dimensions and frame rate are positive and within limits
    pub fn validate(&self) -> CameraResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CameraError::InvalidSettings(format!(
                "resolution must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(CameraError::InvalidSettings(format!(
                "resolution {}x{} exceeds {MAX_DIMENSION}px",
                self.width, self.height
            )));
        }
        if self.fps == 0 || self.fps > MAX_FPS {
            return Err(CameraError::InvalidSettings(format!(
                "fps must be between 1 and {MAX_FPS}, got {}",
                self.fps
            )));
        }
        Ok(())
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            hdr: false,
        }
    }
}

/// A named bundle of settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub key: String,
    pub settings: CameraSettings,
}

/// Key of the preset used when nothing else is configured
pub const DEFAULT_PRESET: &str = "640x480x30";

/// Presets available out of the box
pub fn builtin_presets() -> BTreeMap<String, CameraSettings> {
    [
        ("640x480x30", 640, 480, 30, false),
        ("1280x720x30", 1280, 720, 30, false),
        ("1920x1080x30", 1920, 1080, 30, false),
        ("2304x1296x30-hdr", 2304, 1296, 30, true),
        ("4608x2592x10", 4608, 2592, 10, false),
    ]
    .into_iter()
    .map(|(key, width, height, fps, hdr)| {
        (
            key.to_string(),
            CameraSettings {
                width,
                height,
                fps,
                hdr,
            },
        )
    })
    .collect()
}
