use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::encode::params::{encoder_params, EncoderParams};
use crate::error::{ExportError, Result};
use crate::project::{FrameRate, Project};

/// Output container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Mp4,
    Webm,
}

impl ExportFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::Webm => "video/webm",
        }
    }

    /// File extension including the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => ".mp4",
            Self::Webm => ".webm",
        }
    }

    /// Muxer name passed to ffmpeg's `-f`
    pub fn muxer(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.muxer())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mp4" => Ok(Self::Mp4),
            "webm" => Ok(Self::Webm),
            other => Err(format!("unknown export format '{}', expected mp4 or webm", other)),
        }
    }
}

/// Quality preset; each maps to one fixed set of encoder parameters per format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportQuality {
    Low,
    Medium,
    #[default]
    High,
    VeryHigh,
}

impl fmt::Display for ExportQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        })
    }
}

impl FromStr for ExportQuality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "very_high" | "veryhigh" => Ok(Self::VeryHigh),
            other => Err(format!(
                "unknown export quality '{}', expected low, medium, high or very_high",
                other
            )),
        }
    }
}

/// Immutable settings for one export
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportConfiguration {
    pub format: ExportFormat,
    pub quality: ExportQuality,
    /// Output frame rate; independent of any source's native rate
    pub frame_rate: FrameRate,
    pub include_audio: bool,
}

impl Default for ExportConfiguration {
    fn default() -> Self {
        Self {
            format: ExportFormat::Mp4,
            quality: ExportQuality::High,
            frame_rate: FrameRate::default(),
            include_audio: true,
        }
    }
}

impl ExportConfiguration {
    pub fn new(format: ExportFormat, quality: ExportQuality, fps: f64, include_audio: bool) -> Result<Self> {
        Ok(Self {
            format,
            quality,
            frame_rate: FrameRate::from_fps(fps)?,
            include_audio,
        })
    }

    /// Default settings at the project's own frame rate
    pub fn for_project(project: &Project) -> Self {
        Self {
            frame_rate: project.frame_rate,
            ..Self::default()
        }
    }

    /// Codec parameters for this format and quality
    pub fn encoder_params(&self) -> EncoderParams {
        encoder_params(self.format, self.quality)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_rate.num() == 0 || self.frame_rate.den() == 0 {
            return Err(ExportError::invalid_project(format!(
                "frame rate must be positive, got {}",
                self.frame_rate
            )));
        }
        Ok(())
    }
}

/// Whole-number percentage for progress displays
pub fn progress_percent(progress: f64) -> u8 {
    (progress.clamp(0.0, 1.0) * 100.0).round() as u8
}
