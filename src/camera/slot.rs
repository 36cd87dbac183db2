//! Exclusive access to the frame source
//!
//! Streaming pulls, picture captures, video recordings and reconfiguration
//! all run through one lock around the source. Work happens on the blocking
//! pool while the owned guard is held, so the lock is released only when the
//! blocking operation has completed, even if the awaiting caller went away.

use crate::camera::CameraSettings;
use crate::capture::{Frame, FrameSource};
use crate::utils::error::{CameraError, CameraResult};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// The frame source together with the live settings it should run at
pub struct DeviceSlot {
    source: Box<dyn FrameSource>,
    live: CameraSettings,
    opened_with: Option<CameraSettings>,
}

impl DeviceSlot {
    /// Settings the live stream runs at
    pub fn live(&self) -> CameraSettings {
        self.live
    }

    /// Settings the source is currently open with, if open
    pub fn opened_with(&self) -> Option<CameraSettings> {
        self.opened_with.filter(|_| self.source.is_open())
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Open the source with `settings`, reopening if it runs with anything else
    pub fn ensure_open(&mut self, settings: &CameraSettings) -> CameraResult<()> {
        if self.opened_with() == Some(*settings) {
            return Ok(());
        }
        self.close();
        self.source.open(settings)?;
        self.opened_with = Some(*settings);
        Ok(())
    }

    /// Capture from the source as currently opened
    pub fn capture(&mut self) -> CameraResult<Frame> {
        if !self.source.is_open() {
            return Err(CameraError::CaptureFailed("camera is not open".to_string()));
        }
        self.source.capture_frame()
    }

    /// Capture a frame at the live settings, opening the source if needed
    pub fn capture_live(&mut self) -> CameraResult<Frame> {
        let live = self.live;
        self.ensure_open(&live)?;
        self.capture()
    }

    pub fn close(&mut self) {
        self.source.close();
        self.opened_with = None;
    }

    /// Close and reopen at the live settings regardless of current state
    pub fn reopen_live(&mut self) -> CameraResult<()> {
        let live = self.live;
        self.close();
        self.source.open(&live)?;
        self.opened_with = Some(live);
        tracing::debug!(
            "Live stream restored at {}x{} @ {}fps",
            live.width,
            live.height,
            live.fps
        );
        Ok(())
    }

    /// Swap the live settings.
    ///
    /// An open source is closed and reopened with the new settings. If that
    /// fails the previous settings are reopened and left in place.
    pub fn reconfigure(&mut self, settings: CameraSettings) -> CameraResult<()> {
        settings.validate()?;
        if self.opened_with().is_some() {
            self.close();
            if let Err(e) = self.source.open(&settings) {
                tracing::warn!("Reconfiguration failed, reverting: {}", e);
                if let Err(revert) = self.reopen_live() {
                    tracing::error!("Could not reopen previous settings: {}", revert);
                }
                return Err(e);
            }
            self.opened_with = Some(settings);
        }
        self.live = settings;
        Ok(())
    }
}

/// Shared handle to the single camera
#[derive(Clone)]
pub struct CameraDevice {
    slot: Arc<Mutex<DeviceSlot>>,
}

impl CameraDevice {
    pub fn new(source: Box<dyn FrameSource>, live: CameraSettings) -> Self {
        Self {
            slot: Arc::new(Mutex::new(DeviceSlot {
                source,
                live,
                opened_with: None,
            })),
        }
    }

    /// Wait for exclusive access to the slot
    pub async fn lock(&self) -> OwnedMutexGuard<DeviceSlot> {
        self.slot.clone().lock_owned().await
    }

    /// Run a blocking operation with exclusive access to the slot
    pub async fn with_slot<F, T>(&self, op: F) -> CameraResult<T>
    where
        F: FnOnce(&mut DeviceSlot) -> CameraResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut guard = self.lock().await;
        tokio::task::spawn_blocking(move || op(&mut *guard))
            .await
            .map_err(|e| CameraError::DeviceUnavailable(format!("camera task failed: {e}")))?
    }
}
