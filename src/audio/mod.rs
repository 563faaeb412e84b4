//! # Audio Module
//!
//! Decoding of audio sources and mixing of every audible element into the
//! export's single output stream.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use timeline_export::audio::AudioLoader;
//!
//! let data = AudioLoader::load("music.wav")?;
//! println!("{:.2}s at {} Hz", data.duration, data.sample_rate);
//! # Ok::<(), timeline_export::error::DecodeError>(())
//! ```

pub mod loader;
pub mod mixer;
pub mod types;

pub use loader::AudioLoader;
pub use mixer::{soft_limit, AudioMixer};
pub use types::{AudioChunk, AudioData, AudioSpec};
