//! Live MJPEG streaming

pub mod broadcaster;
pub mod multipart;

pub use broadcaster::{StreamBroadcaster, StreamConsumer, StreamStats};
