use thiserror::Error;

/// Main error type for the export pipeline
///
/// Every variant is fatal to the export job that produced it. Nothing is retried
/// internally; a retry is always a fresh export started by the caller.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Project has no elements to export")]
    EmptyProject,

    #[error("Invalid element '{element_id}': {reason}")]
    InvalidElement { element_id: String, reason: String },

    #[error("Invalid project: {reason}")]
    InvalidProject { reason: String },

    #[error("Failed to decode source for element '{element_id}': {reason}")]
    SourceDecode { element_id: String, reason: String },

    #[error("Encoder could not be initialized: {reason}")]
    EncoderInit { reason: String },

    #[error("Encoding failed: {reason}")]
    Encode { reason: String },

    #[error("Export cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Video source errors, reported by decoders before the sampler tags them
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Failed to open video source: {path}")]
    OpenFailed { path: String },

    #[error("Unsupported video format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Video decoding failed: {reason}")]
    DecodingFailed { reason: String },

    #[error("Video source has no frames: {path}")]
    NoFrames { path: String },
}

/// Audio source errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to load audio file {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Invalid audio parameters: {details}")]
    InvalidParameters { details: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {key}")]
    MissingKey { key: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using ExportError
pub type Result<T> = std::result::Result<T, ExportError>;

/// Result type used by decoders; the sampler lifts these into [`ExportError::SourceDecode`]
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Failure reported by a media decode capability
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error(transparent)]
    Video(#[from] VideoError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl ExportError {
    pub fn invalid_element<S: Into<String>, R: Into<String>>(element_id: S, reason: R) -> Self {
        Self::InvalidElement {
            element_id: element_id.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_project<S: Into<String>>(reason: S) -> Self {
        Self::InvalidProject { reason: reason.into() }
    }

    pub fn source_decode<S: Into<String>>(element_id: S, err: &DecodeError) -> Self {
        Self::SourceDecode {
            element_id: element_id.into(),
            reason: err.to_string(),
        }
    }

    pub fn encoder_init<S: Into<String>>(reason: S) -> Self {
        Self::EncoderInit { reason: reason.into() }
    }

    pub fn encode<S: Into<String>>(reason: S) -> Self {
        Self::Encode { reason: reason.into() }
    }

    /// Whether starting the same export again could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            // Files may be temporarily locked or still being written
            Self::Io(_) | Self::SourceDecode { .. } | Self::Encode { .. } => true,
            _ => false,
        }
    }

    /// Whether this error is the terminal result of a caller cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyProject => {
                "Nothing to export. Add at least one clip, image, audio file or text to the timeline.".to_string()
            }
            Self::SourceDecode { element_id, .. } => {
                format!("Could not read the media used by '{}'. Check the file exists and is a supported format.", element_id)
            }
            Self::EncoderInit { reason } => {
                format!("The selected format could not be set up on this machine ({}). Try another format.", reason)
            }
            Self::Cancelled => "Export cancelled.".to_string(),
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_is_tagged_with_element() {
        let err = DecodeError::from(VideoError::DecodingFailed {
            reason: "truncated stream".to_string(),
        });
        let tagged = ExportError::source_decode("clip-1", &err);

        match &tagged {
            ExportError::SourceDecode { element_id, reason } => {
                assert_eq!(element_id, "clip-1");
                assert!(reason.contains("truncated stream"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(tagged.to_string().contains("clip-1"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ExportError::encode("pipe closed").is_retryable());
        assert!(!ExportError::EmptyProject.is_retryable());
        assert!(!ExportError::Cancelled.is_retryable());
        assert!(!ExportError::encoder_init("libx264 missing").is_retryable());
    }

    #[test]
    fn test_user_messages() {
        assert!(ExportError::EmptyProject.user_message().contains("Nothing to export"));
        assert_eq!(ExportError::Cancelled.user_message(), "Export cancelled.");
        assert!(ExportError::Cancelled.is_cancelled());

        let err = ExportError::Config(ConfigError::FileNotFound {
            path: "missing.toml".to_string(),
        });
        assert!(err.user_message().contains("missing.toml"));
    }
}
