//! Camera capture backends
//!
//! Both backends implement `FrameSource`; which one runs is decided once at
//! startup from configuration.

pub mod simulated;
pub mod traits;

#[cfg(feature = "device")]
pub mod webcam;

pub use simulated::SimulatedSource;
pub use traits::{CameraInfo, Frame, FrameSource, PixelFormat, Resolution};

use crate::utils::error::CameraError;

/// Build the configured frame source
pub fn create_source(
    debug_mode: bool,
    device_index: u32,
    simulated_realtime: bool,
) -> Result<Box<dyn FrameSource>, CameraError> {
    if debug_mode {
        tracing::info!("Debug mode: using simulated camera");
        return Ok(Box::new(SimulatedSource::new(simulated_realtime)));
    }

    #[cfg(feature = "device")]
    {
        tracing::info!("Using camera device {}", device_index);
        Ok(Box::new(webcam::DeviceSource::new(device_index)))
    }

    #[cfg(not(feature = "device"))]
    {
        Err(CameraError::DeviceUnavailable(format!(
            "camera {device_index} requested but this build has no device support; \
             rebuild with --features device or enable debug_mode"
        )))
    }
}

/// Get list of available cameras
pub fn get_cameras() -> Vec<CameraInfo> {
    #[cfg(feature = "device")]
    {
        webcam::get_cameras()
    }

    #[cfg(not(feature = "device"))]
    {
        Vec::new()
    }
}
