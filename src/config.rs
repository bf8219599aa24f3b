//! Client configuration
//!
//! Persisted as TOML in the platform configuration directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub audio: AudioConfig,
    pub video: VideoConfig,
}

impl AppConfig {
    /// Platform-specific location of `config.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "live-media", "live-media-client")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from the default path, falling back to defaults if absent or invalid
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring invalid config at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save configuration as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Session and reconnection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Endpoint URL (`ws://` or `wss://`)
    pub url: String,
    /// Time allowed between connect and the endpoint's `ready`
    pub connect_timeout_ms: u64,
    pub reconnect: ReconnectConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Audio-only sessions reconnect automatically
    pub fn audio_only(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Multimodal sessions are never resumed automatically
    pub fn multimodal(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::disabled(),
            ..Default::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Bounded reconnection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            base_delay_ms: BASE_RECONNECT_DELAY_MS,
            max_delay_ms: MAX_RECONNECT_DELAY_MS,
        }
    }
}

impl ReconnectConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_attempts: 0,
            ..Default::default()
        }
    }
}

/// Audio pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub capture_sample_rate: u32,
    pub block_size: usize,
    pub playback_sample_rate: u32,
    pub output_pool_capacity: usize,
    pub playback_retry_delay_ms: u64,
    /// Input device id (`input:<name>`), default device if unset
    pub input_device: Option<String>,
    /// Output device id (`output:<name>`), default device if unset
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: CAPTURE_SAMPLE_RATE,
            block_size: CAPTURE_BLOCK_SIZE,
            playback_sample_rate: PLAYBACK_SAMPLE_RATE,
            output_pool_capacity: OUTPUT_POOL_CAPACITY,
            playback_retry_delay_ms: PLAYBACK_RETRY_DELAY_MS,
            input_device: None,
            output_device: None,
        }
    }
}

impl AudioConfig {
    pub fn playback_retry_delay(&self) -> Duration {
        Duration::from_millis(self.playback_retry_delay_ms)
    }
}

/// Video pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub frame_rate: u32,
    pub jpeg_quality: u8,
    pub fallback_width: u32,
    pub fallback_height: u32,
    pub webcam_width: u32,
    pub webcam_height: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            jpeg_quality: JPEG_QUALITY,
            fallback_width: FALLBACK_FRAME_WIDTH,
            fallback_height: FALLBACK_FRAME_HEIGHT,
            webcam_width: FALLBACK_FRAME_WIDTH,
            webcam_height: FALLBACK_FRAME_HEIGHT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_wire_constants() {
        let config = AppConfig::default();
        assert_eq!(config.session.connect_timeout(), Duration::from_millis(5000));
        assert_eq!(config.session.reconnect.max_attempts, 3);
        assert_eq!(config.audio.capture_sample_rate, 16_000);
        assert_eq!(config.audio.playback_sample_rate, 24_000);
        assert_eq!(config.audio.block_size, 4096);
        assert_eq!(config.audio.output_pool_capacity, 5);
        assert_eq!(config.video.jpeg_quality, 70);
    }

    #[test]
    fn test_multimodal_disables_reconnect() {
        let config = SessionConfig::multimodal("wss://example.test/live");
        assert!(!config.reconnect.enabled);
        assert_eq!(config.reconnect.max_attempts, 0);
        assert_eq!(config.url, "wss://example.test/live");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [session]
            url = "ws://10.0.0.2:9000"

            [video]
            frame_rate = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.session.url, "ws://10.0.0.2:9000");
        assert_eq!(config.session.connect_timeout_ms, 5000);
        assert_eq!(config.video.frame_rate, 2);
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("live-media-config-{}", std::process::id()));
        let path = dir.join("config.toml");

        let mut config = AppConfig::default();
        config.audio.input_device = Some("input:USB Mic".into());
        config.session.reconnect = ReconnectConfig::disabled();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
