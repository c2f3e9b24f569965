use crate::error::{CoreError, Result};
use crate::lrc::DEFAULT_UNTIMED_LINE_DURATION_MS;
use crate::scheduler::SyncSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Coarsest tick interval that keeps line changes within sub-second latency
pub const MAX_TICK_INTERVAL_MS: u64 = 100;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LyricsyncConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub lyrics: LyricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Shifts lyric lookup relative to playback; negative shows lines later
    #[serde(default)]
    pub timing_offset_ms: i64,
    #[serde(default = "default_untimed_line_duration")]
    pub untimed_line_duration_ms: u64,
}

const fn default_tick_interval() -> u64 {
    MAX_TICK_INTERVAL_MS
}

const fn default_untimed_line_duration() -> u64 {
    DEFAULT_UNTIMED_LINE_DURATION_MS
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            timing_offset_ms: 0,
            untimed_line_duration_ms: default_untimed_line_duration(),
        }
    }
}

impl SyncConfig {
    /// Settings for the sync scheduler
    #[must_use]
    pub const fn settings(&self) -> SyncSettings {
        SyncSettings {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            timing_offset_ms: self.timing_offset_ms,
            untimed_line_duration_ms: self.untimed_line_duration_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyricsConfig {
    /// Provider priority: providers are tried in order
    #[serde(default = "default_providers")]
    pub providers: Vec<LyricsProviderType>,
    /// Directory searched by the local provider
    #[serde(default)]
    pub local_dir: Option<PathBuf>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_providers() -> Vec<LyricsProviderType> {
    vec![LyricsProviderType::Lrclib]
}

const fn default_request_timeout() -> u64 {
    10
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            local_dir: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LyricsProviderType {
    Lrclib,
    Local,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to a file next to the config
    #[serde(default)]
    pub enabled: bool,
}

impl LyricsyncConfig {
    /// Get the config file path (~/.config/lyricsync/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from `path` or create a template there on first run
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after writing a template, or an
    /// error if the file cannot be read, parsed or validated.
    pub fn load_or_create_at(path: &Path) -> Result<Self> {
        if !path.exists() {
            // Create config directory if it doesn't exist
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }

            fs::write(path, CONFIG_TEMPLATE)?;

            return Err(CoreError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate config from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or a value is out of range.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigInvalid`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let tick = self.sync.tick_interval_ms;
        if tick == 0 || tick > MAX_TICK_INTERVAL_MS {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "sync.tick_interval_ms must be between 1 and {MAX_TICK_INTERVAL_MS}, got {tick}"
                ),
            });
        }

        if self.sync.untimed_line_duration_ms == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "sync.untimed_line_duration_ms must be greater than 0".into(),
            });
        }

        if self.lyrics.request_timeout_secs == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "lyrics.request_timeout_secs must be greater than 0".into(),
            });
        }

        if self.lyrics.providers.contains(&LyricsProviderType::Local)
            && self.lyrics.local_dir.is_none()
        {
            return Err(CoreError::ConfigInvalid {
                message: "lyrics.local_dir is required when the \"local\" provider is enabled"
                    .into(),
            });
        }

        Ok(())
    }
}

const CONFIG_TEMPLATE: &str = r#"# Lyricsync Configuration
# ~/.config/lyricsync/config.toml

[sync]
# How often the active line is recomputed (1-100 ms)
tick_interval_ms = 100
# Shift lyric lookup relative to playback, in milliseconds.
# Positive values show lines earlier (e.g. 300 = 300ms ahead).
timing_offset_ms = 0
# Pacing for lyrics without timestamps
untimed_line_duration_ms = 3000

[lyrics]
# Provider priority: "lrclib", "local"
# Providers are tried in order; first timed result wins
providers = ["lrclib"]
# Directory holding "<artist> - <song>.lrc" / ".txt" files for the local provider
# local_dir = "/home/me/lyrics"
request_timeout_secs = 10

[logging]
# Also write logs to ~/.config/lyricsync/lyricsync.log
enabled = false
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_parses_to_defaults() {
        let config = LyricsyncConfig::from_toml_str(CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.sync.tick_interval_ms, 100);
        assert_eq!(config.sync.timing_offset_ms, 0);
        assert_eq!(config.sync.untimed_line_duration_ms, 3000);
        assert_eq!(config.lyrics.providers, vec![LyricsProviderType::Lrclib]);
        assert!(!config.logging.enabled);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = LyricsyncConfig::from_toml_str("").unwrap();
        assert_eq!(config.sync.settings(), SyncSettings::default());
    }

    #[test]
    fn test_settings_from_config() {
        let config = LyricsyncConfig::from_toml_str(
            "[sync]\ntick_interval_ms = 50\ntiming_offset_ms = -300\nuntimed_line_duration_ms = 2000",
        )
        .unwrap();
        let settings = config.sync.settings();
        assert_eq!(settings.tick_interval, Duration::from_millis(50));
        assert_eq!(settings.timing_offset_ms, -300);
        assert_eq!(settings.untimed_line_duration_ms, 2000);
    }

    #[test]
    fn test_coarse_tick_rejected() {
        let err = LyricsyncConfig::from_toml_str("[sync]\ntick_interval_ms = 250").unwrap_err();
        assert!(matches!(err, CoreError::ConfigInvalid { .. }));

        let err = LyricsyncConfig::from_toml_str("[sync]\ntick_interval_ms = 0").unwrap_err();
        assert!(matches!(err, CoreError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_local_provider_requires_dir() {
        let err =
            LyricsyncConfig::from_toml_str("[lyrics]\nproviders = [\"local\"]").unwrap_err();
        assert!(matches!(err, CoreError::ConfigInvalid { .. }));

        let config = LyricsyncConfig::from_toml_str(
            "[lyrics]\nproviders = [\"local\", \"lrclib\"]\nlocal_dir = \"/tmp/lyrics\"",
        )
        .unwrap();
        assert_eq!(
            config.lyrics.providers,
            vec![LyricsProviderType::Local, LyricsProviderType::Lrclib]
        );
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = LyricsyncConfig::from_toml_str("[sync\n").unwrap_err();
        assert!(matches!(err, CoreError::ConfigParseError(_)));
    }

    #[test]
    fn test_load_or_create_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let err = LyricsyncConfig::load_or_create_at(&path).unwrap_err();
        assert!(matches!(err, CoreError::ConfigNotFound { .. }));
        assert!(path.exists());

        // Second load reads the template back
        let config = LyricsyncConfig::load_or_create_at(&path).unwrap();
        assert_eq!(config.sync.tick_interval_ms, 100);
    }
}
