//! Configuration for the HDD feedback agent.

use crate::core::ActivityPolicy;
use crate::indicator::PulsePolicy;
use crate::playback::PlaybackPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directories whose changes count as disk activity
    pub watch_dirs: Vec<PathBuf>,

    /// GPIO pin driving the activity light
    pub gpio_pin: u32,

    /// Clip for an isolated access
    pub short_sound: PathBuf,

    /// Clip for a burst of accesses
    pub long_sound: PathBuf,

    /// Playback volume in `[0, 1]`; player default when unset
    pub volume: Option<f32>,

    /// Burst detection
    pub activity: ActivityPolicy,

    /// Light pulse timing
    pub pulse: PulsePolicy,

    /// Player timing
    pub playback: PlaybackPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_dirs: Vec::new(),
            gpio_pin: 17,
            short_sound: PathBuf::from("sounds/hdd_short.wav"),
            long_sound: PathBuf::from("sounds/hdd_long.wav"),
            volume: None,
            activity: ActivityPolicy::default(),
            pulse: PulsePolicy::default(),
            playback: PlaybackPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, falling back to defaults if it does
    /// not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hdd-feedback-agent")
            .join("config.json")
    }

    /// Check the policy values for combinations that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.activity.burst_threshold == 0 {
            return Err(ConfigError::Invalid(
                "activity.burst_threshold must be at least 1".to_string(),
            ));
        }
        if self.activity.window_ms == 0 {
            return Err(ConfigError::Invalid(
                "activity.window_ms must be positive".to_string(),
            ));
        }
        if self.pulse.min_interval_ms > self.pulse.max_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "pulse.min_interval_ms ({}) exceeds pulse.max_interval_ms ({})",
                self.pulse.min_interval_ms, self.pulse.max_interval_ms
            )));
        }
        if let Some(volume) = self.volume {
            if !(0.0..=1.0).contains(&volume) {
                return Err(ConfigError::Invalid(format!(
                    "volume must be between 0 and 1, got {volume}"
                )));
            }
        }
        Ok(())
    }

    /// Anchor relative sound paths at `base` (normally the config file's
    /// directory) so the agent does not depend on its working directory.
    pub fn resolve_sound_paths(&mut self, base: &Path) {
        for sound in [&mut self.short_sound, &mut self.long_sound] {
            if sound.is_relative() {
                *sound = base.join(&*sound);
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.activity.window_ms, 3_000);
        assert_eq!(config.activity.burst_threshold, 3);
        assert_eq!(config.pulse.min_interval_ms, 100);
        assert_eq!(config.pulse.max_interval_ms, 500);
        assert!(config.watch_dirs.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "watch_dirs": ["/srv/dos/c"], "gpio_pin": 27, "volume": 0.4 }"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.watch_dirs, vec![PathBuf::from("/srv/dos/c")]);
        assert_eq!(config.gpio_pin, 27);
        assert_eq!(config.volume, Some(0.4));
        assert_eq!(config.pulse, PulsePolicy::default());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.watch_dirs.push(PathBuf::from("/mnt/hdd"));
        config.activity.burst_threshold = 5;

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_policies() {
        let mut config = Config::default();
        config.activity.burst_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pulse.min_interval_ms = 600;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.volume = Some(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_sound_paths_keeps_absolute() {
        let mut config = Config::default();
        config.long_sound = PathBuf::from("/opt/sounds/long.wav");
        config.resolve_sound_paths(Path::new("/etc/hdd"));
        assert_eq!(
            config.short_sound,
            PathBuf::from("/etc/hdd/sounds/hdd_short.wav")
        );
        assert_eq!(config.long_sound, PathBuf::from("/opt/sounds/long.wav"));
    }
}
