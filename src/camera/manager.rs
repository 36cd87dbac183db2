//! Camera settings manager
//!
//! Owns the single live `CameraSettings` and applies changes under exclusive
//! device access. Reconfiguration is refused with `Busy` while a video
//! recording is active.

use super::settings::{CameraSettings, Preset};
use super::slot::CameraDevice;
use crate::recorder::RecordingTracker;
use crate::utils::error::{CameraError, CameraResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct CameraSettingsManager {
    presets: Arc<BTreeMap<String, CameraSettings>>,
    device: CameraDevice,
    tracker: RecordingTracker,
    current: Arc<watch::Sender<CameraSettings>>,
}

impl CameraSettingsManager {
    pub fn new(
        presets: BTreeMap<String, CameraSettings>,
        device: CameraDevice,
        tracker: RecordingTracker,
        initial: CameraSettings,
    ) -> Self {
        let (current, _) = watch::channel(initial);
        Self {
            presets: Arc::new(presets),
            device,
            tracker,
            current: Arc::new(current),
        }
    }

    /// Open the device at the initial settings. A failure is logged, not fatal:
    /// the stream retries on demand.
    pub async fn initialize(&self) {
        let opened = self
            .device
            .with_slot(|slot| slot.capture_live().map(|_| slot.source_name().to_string()))
            .await;
        match opened {
            Ok(source) => {
                let settings = self.current();
                tracing::info!(
                    "Camera ready ({}) at {}x{} @ {}fps",
                    source,
                    settings.width,
                    settings.height,
                    settings.fps
                );
            }
            Err(e) => tracing::warn!("Camera not available at startup: {}", e),
        }
    }

    /// Snapshot of the live settings. Never waits on the device.
    pub fn current(&self) -> CameraSettings {
        *self.current.borrow()
    }

    /// Receive a notification whenever the live settings change
    pub fn subscribe(&self) -> watch::Receiver<CameraSettings> {
        self.current.subscribe()
    }

    pub fn presets(&self) -> Vec<Preset> {
        self.presets
            .iter()
            .map(|(key, settings)| Preset {
                key: key.clone(),
                settings: *settings,
            })
            .collect()
    }

    pub fn preset(&self, key: &str) -> CameraResult<CameraSettings> {
        self.presets
            .get(key)
            .copied()
            .ok_or_else(|| CameraError::UnknownPreset(key.to_string()))
    }

    /// Switch the live settings to a named preset
    pub async fn apply_preset(&self, key: &str) -> CameraResult<CameraSettings> {
        let settings = self.preset(key)?;
        let applied = self.apply(settings).await?;
        tracing::info!("Applied preset {}", key);
        Ok(applied)
    }

    /// Switch the live settings to explicitly supplied values
    pub async fn apply_custom(&self, settings: CameraSettings) -> CameraResult<CameraSettings> {
        settings.validate()?;
        let applied = self.apply(settings).await?;
        tracing::info!(
            "Applied custom settings {}x{} @ {}fps (hdr: {})",
            applied.width,
            applied.height,
            applied.fps,
            applied.hdr
        );
        Ok(applied)
    }

    async fn apply(&self, settings: CameraSettings) -> CameraResult<CameraSettings> {
        self.reject_while_recording()?;

        let tracker = self.tracker.clone();
        let current = self.current.clone();
        self.device
            .with_slot(move |slot| {
                // A recording may have been admitted while we waited for the lock
                if tracker.is_recording() {
                    return Err(busy());
                }
                slot.reconfigure(settings)?;
                current.send_replace(settings);
                Ok(settings)
            })
            .await
    }

    fn reject_while_recording(&self) -> CameraResult<()> {
        if self.tracker.is_recording() {
            return Err(busy());
        }
        Ok(())
    }
}

fn busy() -> CameraError {
    CameraError::Busy("cannot change settings while a recording is active".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::builtin_presets;
    use crate::capture::SimulatedSource;
    use crate::recorder::RecordingSession;

    fn manager() -> CameraSettingsManager {
        let initial = CameraSettings::default();
        let device = CameraDevice::new(Box::new(SimulatedSource::new(false)), initial);
        CameraSettingsManager::new(builtin_presets(), device, RecordingTracker::new(), initial)
    }

    #[tokio::test]
    async fn test_apply_preset_reopens_source_with_preset_values() {
        let manager = manager();
        manager.initialize().await;

        for preset in manager.presets() {
            let applied = manager.apply_preset(&preset.key).await.unwrap();
            assert_eq!(applied, preset.settings);
            assert_eq!(manager.current(), preset.settings);

            let slot = manager.device.lock().await;
            assert_eq!(slot.live(), preset.settings);
            assert_eq!(slot.opened_with(), Some(preset.settings));
        }
    }

    #[tokio::test]
    async fn test_unknown_preset_leaves_settings_unchanged() {
        let manager = manager();
        let before = manager.current();
        let result = manager.apply_preset("320x240x5").await;
        assert!(matches!(result, Err(CameraError::UnknownPreset(_))));
        assert_eq!(manager.current(), before);
    }

    #[tokio::test]
    async fn test_apply_custom_validates() {
        let manager = manager();
        let bad = CameraSettings {
            width: 0,
            height: 480,
            fps: 30,
            hdr: false,
        };
        assert!(matches!(
            manager.apply_custom(bad).await,
            Err(CameraError::InvalidSettings(_))
        ));

        let good = CameraSettings {
            width: 800,
            height: 600,
            fps: 15,
            hdr: true,
        };
        assert_eq!(manager.apply_custom(good).await.unwrap(), good);
        assert_eq!(manager.current(), good);
    }

    #[tokio::test]
    async fn test_busy_while_recording() {
        let manager = manager();
        let active = manager
            .tracker
            .begin(RecordingSession::new("video_test".into(), 5, 5))
            .unwrap();

        let result = manager.apply_preset("1280x720x30").await;
        assert!(matches!(result, Err(CameraError::Busy(_))));
        assert_eq!(manager.current(), CameraSettings::default());

        drop(active);
        assert!(manager.apply_preset("1280x720x30").await.is_ok());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let manager = manager();
        let mut rx = manager.subscribe();
        manager.apply_preset("1920x1080x30").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().width, 1920);
    }

    #[test]
    fn test_presets_sorted_by_key() {
        let keys: Vec<String> = manager().presets().into_iter().map(|p| p.key).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
