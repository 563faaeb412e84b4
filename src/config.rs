use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::AudioSpec;
use crate::error::{ConfigError, Result};

/// Runtime configuration for the export pipeline
///
/// Everything here describes the machine the export runs on (tools, fonts, threads),
/// never the project being exported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Compositing settings
    #[serde(default)]
    pub render: RenderConfig,

    /// Audio mixing settings
    #[serde(default)]
    pub audio: AudioConfig,

    /// Font lookup for text overlays
    #[serde(default)]
    pub text: TextConfig,

    /// External encoder tools
    #[serde(default)]
    pub encoder: EncoderConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            value: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.render.validate()?;
        self.audio.validate()?;
        self.text.validate()?;
        Ok(())
    }
}

/// Compositing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Straight-alpha RGBA the canvas is cleared to before painting layers
    pub background: [u8; 4],

    /// Size of the thread pool used for layer sampling and audio mixing
    pub worker_threads: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            background: [0, 0, 0, 0],
            worker_threads: num_cpus::get(),
        }
    }
}

impl RenderConfig {
    fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(ConfigError::InvalidValue {
                key: "render.worker_threads".to_string(),
                value: self.worker_threads.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Audio mixing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output sample rate (Hz)
    pub sample_rate: u32,

    /// Output channel count
    pub channels: u16,

    /// Level above which the soft limiter starts compressing (0.0-1.0)
    pub limiter_threshold: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            limiter_threshold: 0.9,
        }
    }
}

impl AudioConfig {
    pub fn spec(&self) -> AudioSpec {
        AudioSpec {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidValue {
                key: "audio.sample_rate".to_string(),
                value: self.sample_rate.to_string(),
            }
            .into());
        }

        if !(1..=8).contains(&self.channels) {
            return Err(ConfigError::InvalidValue {
                key: "audio.channels".to_string(),
                value: self.channels.to_string(),
            }
            .into());
        }

        if !(self.limiter_threshold > 0.0 && self.limiter_threshold <= 1.0) {
            return Err(ConfigError::InvalidValue {
                key: "audio.limiter_threshold".to_string(),
                value: self.limiter_threshold.to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Font configuration for text overlays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Font used when an element names no family or an unknown one.
    /// When unset, a few common system locations are searched.
    pub default_font: Option<PathBuf>,

    /// Line spacing as a multiple of the font's natural line height
    pub line_height: f32,

    /// Font family name to font file
    pub fonts: BTreeMap<String, PathBuf>,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            default_font: None,
            line_height: 1.2,
            fonts: BTreeMap::new(),
        }
    }
}

impl TextConfig {
    fn validate(&self) -> Result<()> {
        if !(self.line_height.is_finite() && self.line_height > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "text.line_height".to_string(),
                value: self.line_height.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// External encoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// ffmpeg executable, looked up on PATH when not absolute
    pub ffmpeg_path: PathBuf,

    /// ffprobe executable, looked up on PATH when not absolute
    pub ffprobe_path: PathBuf,

    /// Parent directory for encoder scratch files (system temp dir when unset)
    pub temp_dir: Option<PathBuf>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            temp_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.audio.spec(), AudioSpec { sample_rate: 48_000, channels: 2 });
        assert_eq!(config.render.background, [0, 0, 0, 0]);
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");

        let mut original_config = Config::default();
        original_config.text.fonts.insert("Serif".to_string(), PathBuf::from("/fonts/serif.ttf"));
        original_config.encoder.temp_dir = Some(dir.path().to_path_buf());

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("[audio]\nsample_rate = 44100\n").unwrap();
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.audio.channels, 2);
        assert_eq!(config.encoder.ffmpeg_path, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn test_invalid_audio_config() {
        let mut config = Config::default();
        config.audio.sample_rate = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.audio.limiter_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_worker_threads() {
        let mut config = Config::default();
        config.render.worker_threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(
            err,
            crate::error::ExportError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
