//! Configuration loading
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/camserve/config.toml` (system)
//! 2. `~/.config/camserve/config.toml` (user)
//! 3. `./camserve.toml`, or the `--config` path when given
//! 4. Environment variables (`CAMSERVE_*`)
//!
//! ```toml
//! debug_mode = true
//!
//! [server]
//! port = 5000
//!
//! [camera]
//! default_preset = "1280x720x30"
//!
//! [camera.presets.square]
//! width = 1080
//! height = 1080
//! fps = 30
//!
//! [capture]
//! recording_preset = "1920x1080x30"
//! ```

use crate::camera::{builtin_presets, CameraSettings, DEFAULT_PRESET};
use crate::recorder::MAX_RECORDING_SECS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where config values came from
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
    /// Problems found while loading, kept for logging once tracing is up
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub device_index: u32,
    pub default_preset: String,
    /// Pace the simulated source to its fps like a real sensor
    pub simulated_realtime: bool,
    /// Extra presets, added to the built-in table
    pub presets: BTreeMap<String, CameraSettings>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            default_preset: DEFAULT_PRESET.to_string(),
            simulated_realtime: true,
            presets: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub jpeg_quality: u8,
    /// Frames a viewer may fall behind before it starts losing them
    pub queue_depth: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            queue_depth: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub picture_quality: u8,
    /// Preset to record clips at; the live settings when unset
    pub recording_preset: Option<String>,
    pub max_video_secs: u32,
    pub default_video_secs: u32,
    pub ffmpeg_path: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            picture_quality: 95,
            recording_preset: None,
            max_video_secs: MAX_RECORDING_SECS,
            default_video_secs: 5,
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub root: PathBuf,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("media"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    /// Address cron jobs use to reach the service
    pub trigger_base_url: Option<String>,
    /// Write jobs to this file instead of the user's crontab
    pub crontab_file: Option<PathBuf>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_base_url: None,
            crontab_file: None,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Use the simulated camera instead of a device
    pub debug_mode: bool,
    pub log_level: Option<String>,
    pub server: ServerConfig,
    pub camera: CameraConfig,
    pub stream: StreamConfig,
    pub capture: CaptureConfig,
    pub media: MediaConfig,
    pub schedule: ScheduleConfig,
}

impl AppConfig {
    /// Load from all sources, then validate
    pub fn load(cli_path: Option<&Path>) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        if let Some(path) = cli_path {
            if !path.exists() {
                return Err(ConfigError::FileRead {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
                });
            }
        }

        for path in discover_config_files(cli_path) {
            let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileRead {
                path: path.clone(),
                source: e,
            })?;
            let table = parse_table(&contents, &path)?;
            merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let mut config: AppConfig =
            toml::Value::Table(merged)
                .try_into()
                .map_err(|e: toml::de::Error| ConfigError::Parse {
                    path: sources.files.last().cloned().unwrap_or_default(),
                    message: e.to_string(),
                })?;

        config.apply_env_overrides(|key| env::var(key).ok(), &mut sources);
        config.validate()?;
        Ok((config, sources))
    }

    /// Parse a single TOML document over the defaults
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })
    }

    /// Apply `CAMSERVE_*` overrides read through `lookup`
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
        sources: &mut ConfigSources,
    ) {
        if let Some(v) = lookup("CAMSERVE_DEBUG") {
            self.debug_mode = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
            sources.env_overrides.push("CAMSERVE_DEBUG".to_string());
        }
        if let Some(v) = lookup("CAMSERVE_PORT") {
            match v.parse() {
                Ok(port) => {
                    self.server.port = port;
                    sources.env_overrides.push("CAMSERVE_PORT".to_string());
                }
                Err(_) => sources
                    .warnings
                    .push(format!("Ignoring invalid CAMSERVE_PORT={v}")),
            }
        }
        if let Some(v) = lookup("CAMSERVE_BIND") {
            self.server.bind = v;
            sources.env_overrides.push("CAMSERVE_BIND".to_string());
        }
        if let Some(v) = lookup("CAMSERVE_MEDIA_ROOT") {
            self.media.root = PathBuf::from(v);
            sources.env_overrides.push("CAMSERVE_MEDIA_ROOT".to_string());
        }
        if let Some(v) = lookup("CAMSERVE_PRESET") {
            self.camera.default_preset = v;
            sources.env_overrides.push("CAMSERVE_PRESET".to_string());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let presets = self.presets();
        for (key, settings) in &presets {
            settings
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("preset {key}: {e}")))?;
        }
        if !presets.contains_key(&self.camera.default_preset) {
            return Err(ConfigError::Invalid(format!(
                "default_preset {} is not a known preset",
                self.camera.default_preset
            )));
        }
        if let Some(key) = &self.capture.recording_preset {
            if !presets.contains_key(key) {
                return Err(ConfigError::Invalid(format!(
                    "recording_preset {key} is not a known preset"
                )));
            }
        }
        for (name, quality) in [
            ("stream.jpeg_quality", self.stream.jpeg_quality),
            ("capture.picture_quality", self.capture.picture_quality),
        ] {
            if !(1..=100).contains(&quality) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be between 1 and 100, got {quality}"
                )));
            }
        }
        if self.capture.max_video_secs == 0 || self.capture.default_video_secs == 0 {
            return Err(ConfigError::Invalid(
                "video durations must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    /// Built-in presets with configured ones layered on top
    pub fn presets(&self) -> BTreeMap<String, CameraSettings> {
        let mut presets = builtin_presets();
        presets.extend(self.camera.presets.iter().map(|(k, v)| (k.clone(), *v)));
        presets
    }

    pub fn default_settings(&self) -> Result<CameraSettings, ConfigError> {
        self.presets()
            .get(&self.camera.default_preset)
            .copied()
            .ok_or_else(|| {
                ConfigError::Invalid(format!("unknown preset {}", self.camera.default_preset))
            })
    }

    pub fn recording_settings(&self) -> Result<Option<CameraSettings>, ConfigError> {
        match &self.capture.recording_preset {
            None => Ok(None),
            Some(key) => self
                .presets()
                .get(key)
                .copied()
                .map(Some)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown preset {key}"))),
        }
    }

    /// Configured clip cap, never above the hard limit
    pub fn max_video_secs(&self) -> u32 {
        self.capture.max_video_secs.clamp(1, MAX_RECORDING_SECS)
    }

    pub fn trigger_base_url(&self) -> String {
        self.schedule
            .trigger_base_url
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.server.port))
    }
}

/// Discover config files in load order (system, user, local/cli). Only
/// existing files are returned.
pub fn discover_config_files(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/camserve/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("camserve/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI path replaces the local override
    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
        }
        return files;
    }

    let local = PathBuf::from("camserve.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents
        .parse()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Deep-merge `overlay` into `base`; nested tables merge key by key
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.default_settings().unwrap(), CameraSettings::default());
        assert_eq!(config.trigger_base_url(), "http://127.0.0.1:5000");
        assert!(!config.debug_mode);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
debug_mode = true

[server]
port = 8080

[camera.presets.square]
width = 1080
height = 1080
fps = 30
"#,
        )
        .unwrap();
        assert!(config.debug_mode);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.stream.jpeg_quality, 80);

        let presets = config.presets();
        assert!(presets.contains_key("square"));
        assert!(presets.contains_key("1920x1080x30"));
    }

    #[test]
    fn test_merge_tables_is_deep() {
        let mut base: toml::Table = "[server]\nbind = \"127.0.0.1\"\nport = 1\n".parse().unwrap();
        let overlay: toml::Table = "[server]\nport = 2\n".parse().unwrap();
        merge_tables(&mut base, overlay);

        let config: AppConfig = toml::Value::Table(base).try_into().unwrap();
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.port, 2);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CAMSERVE_DEBUG", "true"),
            ("CAMSERVE_PORT", "6001"),
            ("CAMSERVE_MEDIA_ROOT", "/srv/camserve"),
            ("CAMSERVE_PRESET", "1280x720x30"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        let mut sources = ConfigSources::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()), &mut sources);

        assert!(config.debug_mode);
        assert_eq!(config.server.port, 6001);
        assert_eq!(config.media.root, PathBuf::from("/srv/camserve"));
        assert_eq!(config.default_settings().unwrap().width, 1280);
        assert_eq!(sources.env_overrides.len(), 4);
        assert!(sources.warnings.is_empty());
    }

    #[test]
    fn test_invalid_port_override_is_reported() {
        let mut config = AppConfig::default();
        let mut sources = ConfigSources::default();
        config.apply_env_overrides(
            |k| (k == "CAMSERVE_PORT").then(|| "eighty".to_string()),
            &mut sources,
        );

        assert_eq!(config.server.port, AppConfig::default().server.port);
        assert!(sources.env_overrides.is_empty());
        assert_eq!(sources.warnings, vec!["Ignoring invalid CAMSERVE_PORT=eighty"]);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = AppConfig::default();
        config.camera.default_preset = "nope".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.stream.jpeg_quality = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.capture.recording_preset = Some("missing".to_string());
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.camera.presets.insert(
            "broken".to_string(),
            CameraSettings {
                width: 640,
                height: 480,
                fps: 0,
                hdr: false,
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_video_secs_is_hard_capped() {
        let mut config = AppConfig::default();
        config.capture.max_video_secs = 120;
        assert_eq!(config.max_video_secs(), MAX_RECORDING_SECS);
        config.capture.max_video_secs = 10;
        assert_eq!(config.max_video_secs(), 10);
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camserve.toml");
        std::fs::write(&path, "[capture]\nrecording_preset = \"1920x1080x30\"\n").unwrap();

        let (config, sources) = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(sources.files.last(), Some(&path));
        assert_eq!(config.recording_settings().unwrap().unwrap().width, 1920);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/camserve.toml")));
        assert!(matches!(result, Err(ConfigError::FileRead { .. })));
    }
}
