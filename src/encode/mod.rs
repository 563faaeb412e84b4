//! # Encode Module
//!
//! Codec parameters, the encoder session that validates the stream of frames and
//! audio chunks, and the ffmpeg-backed container writer.

pub mod ffmpeg;
pub mod params;
pub mod session;

pub use ffmpeg::{FfmpegBackend, FfmpegEncoderFactory};
pub use params::{encoder_params, AudioCodec, EncoderParams, VideoCodec};
pub use session::{EncodedOutput, EncoderBackend, EncoderFactory, EncoderSession, EncoderSettings};
