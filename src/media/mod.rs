//! Captured media on disk

pub mod store;

pub use store::{MediaEntry, MediaStore};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from media file handling
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid filename: {0}")]
    InvalidName(String),

    #[error("Unknown media kind: {0} (expected images or videos)")]
    UnknownKind(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

pub type MediaResult<T> = Result<T, MediaError>;

/// Category of stored media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Subdirectory under the media root
    pub fn dir_name(&self) -> &'static str {
        match self {
            MediaKind::Image => "images",
            MediaKind::Video => "videos",
        }
    }

    /// Filename prefix for new captures
    pub fn prefix(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    /// Extension used when saving raw bytes of this kind
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
        }
    }

    /// Extensions a capture of this kind may carry
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            MediaKind::Image => &["jpg", "jpeg"],
            MediaKind::Video => &["mp4", "mjpeg"],
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for MediaKind {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "images" | "image" | "pictures" | "picture" => Ok(MediaKind::Image),
            "videos" | "video" => Ok(MediaKind::Video),
            other => Err(MediaError::UnknownKind(other.to_string())),
        }
    }
}

/// MIME type for a stored file, by extension
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "mp4" => "video/mp4",
        "mjpeg" => "video/x-motion-jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_str() {
        assert_eq!("images".parse::<MediaKind>().unwrap(), MediaKind::Image);
        assert_eq!("Videos".parse::<MediaKind>().unwrap(), MediaKind::Video);
        assert!(matches!(
            "audio".parse::<MediaKind>(),
            Err(MediaError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("image_1.jpg"), "image/jpeg");
        assert_eq!(content_type_for("video_1.MP4"), "video/mp4");
        assert_eq!(content_type_for("video_1.mjpeg"), "video/x-motion-jpeg");
        assert_eq!(content_type_for("README"), "application/octet-stream");
    }
}
