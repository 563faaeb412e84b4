use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::project::SampleRange;

/// Sample rate and channel layout of a PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSpec {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of interleaved channels
    pub channels: u16,
}

impl Default for AudioSpec {
    fn default() -> Self {
        Self { sample_rate: 48_000, channels: 2 }
    }
}

/// Fully decoded audio source
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Audio samples (interleaved for stereo, mono for single channel)
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Duration in seconds
    pub duration: f64,

    /// Original file path
    pub file_path: PathBuf,
}

impl AudioData {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16, file_path: PathBuf) -> Self {
        let frames = if channels == 0 { 0 } else { samples.len() / channels as usize };
        let duration = if sample_rate == 0 { 0.0 } else { frames as f64 / sample_rate as f64 };
        Self {
            samples,
            sample_rate,
            channels,
            duration,
            file_path,
        }
    }

    /// Number of sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Linearly interpolated sample at a fractional frame position
    ///
    /// Positions outside the decoded range read as silence.
    pub fn interpolate(&self, position: f64, channel: usize) -> f32 {
        let frames = self.frames();
        if frames == 0 || !position.is_finite() || position < 0.0 {
            return 0.0;
        }

        let frame0 = position.floor() as usize;
        if frame0 >= frames {
            return 0.0;
        }
        let frame1 = (frame0 + 1).min(frames - 1);
        let frac = (position - frame0 as f64) as f32;

        let channels = self.channels as usize;
        let channel = channel.min(channels - 1);
        let v0 = self.samples[frame0 * channels + channel];
        let v1 = self.samples[frame1 * channels + channel];
        v0 + (v1 - v0) * frac
    }

    /// Get mono mix of all channels at a fractional frame position
    pub fn interpolate_mono(&self, position: f64) -> f32 {
        let channels = self.channels.max(1) as usize;
        let sum: f32 = (0..channels).map(|c| self.interpolate(position, c)).sum();
        sum / channels as f32
    }
}

/// A contiguous block of mixed output audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Index of the first sample frame on the output timeline
    pub start_sample: u64,

    pub spec: AudioSpec,

    /// Interleaved samples
    pub samples: Vec<f32>,
}

impl AudioChunk {
    /// Zero-filled chunk covering `range`
    pub fn silent(range: SampleRange, spec: AudioSpec) -> Self {
        Self {
            start_sample: range.start,
            spec,
            samples: vec![0.0; range.len() as usize * spec.channels as usize],
        }
    }

    /// Number of sample frames in the chunk
    pub fn frames(&self) -> u64 {
        (self.samples.len() / self.spec.channels.max(1) as usize) as u64
    }

    pub fn end_sample(&self) -> u64 {
        self.start_sample + self.frames()
    }

    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.spec.sample_rate as f64
    }

    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|s| *s == 0.0)
    }

    /// Little-endian f32 bytes, the layout ffmpeg reads as `f32le`
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 4);
        for sample in &self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }
}
