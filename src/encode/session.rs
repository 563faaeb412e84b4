use tracing::{debug, info, warn};

use crate::audio::{AudioChunk, AudioSpec};
use crate::encode::params::EncoderParams;
use crate::error::{ExportError, Result};
use crate::export::options::{ExportConfiguration, ExportFormat};
use crate::project::{Canvas, FrameRate};
use crate::video::Frame;

/// Everything a backend needs to set up its streams
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderSettings {
    pub format: ExportFormat,
    pub params: EncoderParams,
    pub canvas: Canvas,
    pub frame_rate: FrameRate,
    /// `None` when the output has no audio stream
    pub audio: Option<AudioSpec>,
}

/// A container/codec implementation driven by an [`EncoderSession`]
pub trait EncoderBackend: Send {
    /// Prepare the streams; failures here are reported as `EncoderInit`
    fn begin(&mut self, settings: &EncoderSettings) -> Result<()>;

    /// Encode the frame with presentation index `index`
    fn write_video(&mut self, index: u64, frame: &Frame) -> Result<()>;

    fn write_audio(&mut self, chunk: &AudioChunk) -> Result<()>;

    /// Flush every stream and return the finished container
    fn finish(&mut self) -> Result<Vec<u8>>;

    /// Drop all partial output
    fn abort(&mut self);
}

/// Creates one fresh backend per export
pub trait EncoderFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn EncoderBackend>>;
}

/// The finished export
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedOutput {
    pub bytes: Vec<u8>,
    pub format: ExportFormat,
    pub mime_type: &'static str,
    pub extension: &'static str,
    pub video_frames: u64,
    /// Audio sample frames written; zero when there is no audio stream
    pub audio_samples: u64,
}

impl EncodedOutput {
    /// Suggested download name: the project name plus the format's extension
    pub fn file_name(&self, project_name: &str) -> String {
        let stem: String = project_name
            .trim()
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
            .collect();
        let stem = if stem.is_empty() { "export".to_string() } else { stem };
        format!("{}{}", stem, self.extension)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    Failed,
    Finished,
}

/// One stateful encode: frames and audio in, container bytes out
///
/// The session numbers frames itself and insists on contiguous audio. The first
/// backend error puts it in a failed state that no later call can leave. Dropping an
/// unfinished session aborts the backend.
pub struct EncoderSession {
    backend: Box<dyn EncoderBackend>,
    settings: EncoderSettings,
    state: SessionState,
    video_frames: u64,
    next_audio_sample: u64,
}

impl EncoderSession {
    pub fn open(
        config: &ExportConfiguration,
        canvas: Canvas,
        audio: Option<AudioSpec>,
        mut backend: Box<dyn EncoderBackend>,
    ) -> Result<Self> {
        let settings = EncoderSettings {
            format: config.format,
            params: config.encoder_params(),
            canvas,
            frame_rate: config.frame_rate,
            audio: if config.include_audio { audio } else { None },
        };

        backend.begin(&settings).map_err(|e| match e {
            ExportError::EncoderInit { .. } => e,
            other => ExportError::encoder_init(other.to_string()),
        })?;

        info!(
            "Encoder ready: {} {}x{} @ {} fps ({}, crf {}), audio: {}",
            settings.format,
            canvas.width,
            canvas.height,
            settings.frame_rate,
            settings.params.video_codec.encoder(),
            settings.params.crf,
            settings
                .audio
                .map(|a| format!("{} Hz x{}", a.sample_rate, a.channels))
                .unwrap_or_else(|| "none".to_string())
        );

        Ok(Self {
            backend,
            settings,
            state: SessionState::Open,
            video_frames: 0,
            next_audio_sample: 0,
        })
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    pub fn video_frames(&self) -> u64 {
        self.video_frames
    }

    pub fn has_audio(&self) -> bool {
        self.settings.audio.is_some()
    }

    pub fn push_video_frame(&mut self, frame: &Frame) -> Result<()> {
        self.ensure_open()?;

        let canvas = self.settings.canvas;
        if frame.width() != canvas.width || frame.height() != canvas.height {
            return Err(self.fail(ExportError::encode(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                canvas.width,
                canvas.height
            ))));
        }

        let index = self.video_frames;
        if let Err(e) = self.backend.write_video(index, frame) {
            return Err(self.fail(e));
        }
        self.video_frames += 1;
        Ok(())
    }

    pub fn push_audio_chunk(&mut self, chunk: &AudioChunk) -> Result<()> {
        self.ensure_open()?;

        let Some(spec) = self.settings.audio else {
            return Err(self.fail(ExportError::encode("session has no audio stream")));
        };
        if chunk.spec != spec {
            return Err(self.fail(ExportError::encode(format!(
                "audio chunk is {} Hz x{}, stream expects {} Hz x{}",
                chunk.spec.sample_rate, chunk.spec.channels, spec.sample_rate, spec.channels
            ))));
        }
        if chunk.start_sample != self.next_audio_sample {
            return Err(self.fail(ExportError::encode(format!(
                "audio chunk starts at sample {}, expected {}",
                chunk.start_sample, self.next_audio_sample
            ))));
        }

        if let Err(e) = self.backend.write_audio(chunk) {
            return Err(self.fail(e));
        }
        self.next_audio_sample = chunk.end_sample();
        Ok(())
    }

    /// Flush the backend and hand back the finished container
    pub fn finalize(&mut self) -> Result<EncodedOutput> {
        match self.state {
            SessionState::Open => {}
            SessionState::Failed => {
                return Err(ExportError::encode("encoder session failed earlier; output discarded"));
            }
            SessionState::Finished => {
                return Err(ExportError::encode("encoder session already finalized"));
            }
        }

        let bytes = match self.backend.finish() {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.fail(e)),
        };
        self.state = SessionState::Finished;

        let format = self.settings.format;
        debug!(
            "Finalized {} frames, {} audio samples, {} bytes",
            self.video_frames,
            self.next_audio_sample,
            bytes.len()
        );
        Ok(EncodedOutput {
            bytes,
            format,
            mime_type: format.mime_type(),
            extension: format.extension(),
            video_frames: self.video_frames,
            audio_samples: self.next_audio_sample,
        })
    }

    /// Abandon the encode and release the backend
    pub fn discard(mut self) {
        if self.state == SessionState::Open {
            self.backend.abort();
            self.state = SessionState::Failed;
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            SessionState::Open => Ok(()),
            SessionState::Failed => Err(ExportError::encode("encoder session has failed")),
            SessionState::Finished => Err(ExportError::encode("encoder session already finalized")),
        }
    }

    /// Enter the failed state, dropping partial output; returns an `Encode` error
    fn fail(&mut self, err: ExportError) -> ExportError {
        if self.state == SessionState::Open {
            self.backend.abort();
        }
        self.state = SessionState::Failed;
        match err {
            ExportError::Encode { .. } => err,
            other => ExportError::encode(other.to_string()),
        }
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        if self.state == SessionState::Open {
            warn!("Encoder session dropped before finalize, aborting");
            self.backend.abort();
        }
    }
}
