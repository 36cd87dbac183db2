//! Camera configuration and exclusive device access

pub mod manager;
pub mod settings;
pub mod slot;

pub use manager::CameraSettingsManager;
pub use settings::{builtin_presets, CameraSettings, Preset, DEFAULT_PRESET, MAX_DIMENSION, MAX_FPS};
pub use slot::{CameraDevice, DeviceSlot};
