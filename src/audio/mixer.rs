use tracing::trace;

use crate::audio::types::{AudioChunk, AudioSpec};
use crate::error::Result;
use crate::project::{Project, SampleRange};
use crate::video::sampler::{AudioWindow, ElementSampler};

/// Mixes every audible element into the output stream, one window at a time
#[derive(Debug, Clone)]
pub struct AudioMixer {
    spec: AudioSpec,
    limiter_threshold: f32,
}

impl AudioMixer {
    pub fn new(spec: AudioSpec, limiter_threshold: f32) -> Self {
        Self {
            spec,
            limiter_threshold,
        }
    }

    pub fn spec(&self) -> AudioSpec {
        self.spec
    }

    /// Mix the output samples in `range`
    ///
    /// The chunk always holds exactly `range.len()` sample frames; stretches without any
    /// audible element are zero.
    pub fn mix_window(&self, project: &Project, range: SampleRange, sampler: &ElementSampler) -> Result<AudioChunk> {
        let mut chunk = AudioChunk::silent(range, self.spec);
        if range.is_empty() {
            return Ok(chunk);
        }

        let sample_rate = self.spec.sample_rate;
        let range_start = range.start_seconds(sample_rate);
        let range_end = range.end_seconds(sample_rate);

        let mut mixed = 0usize;
        for active in project.audible_elements_in(range_start, range_end) {
            if let Some(window) = sampler.audio_window(&active, range_start, range_end)? {
                self.accumulate(&mut chunk, &window, range);
                mixed += 1;
            }
        }

        if mixed > 0 {
            for sample in &mut chunk.samples {
                *sample = soft_limit(*sample, self.limiter_threshold);
            }
        }

        trace!("Mixed {} sources into samples {}..{}", mixed, range.start, range.end);
        Ok(chunk)
    }

    fn accumulate(&self, chunk: &mut AudioChunk, window: &AudioWindow, range: SampleRange) {
        let out_channels = self.spec.channels as usize;
        let src_channels = window.data.channels as usize;
        let src_rate = window.data.sample_rate as f64;
        for offset in 0..range.len() as usize {
            let timestamp = (range.start + offset as u64) as f64 / self.spec.sample_rate as f64;
            let Some(local) = window.local_time(timestamp) else {
                continue;
            };
            let position = local * src_rate;

            let frame = &mut chunk.samples[offset * out_channels..(offset + 1) * out_channels];
            if out_channels == 1 && src_channels > 1 {
                frame[0] += window.data.interpolate_mono(position) * window.volume;
                continue;
            }
            for (channel, out) in frame.iter_mut().enumerate() {
                let value = if src_channels == 1 {
                    window.data.interpolate(position, 0)
                } else if channel < src_channels {
                    window.data.interpolate(position, channel)
                } else {
                    0.0
                };
                *out += value * window.volume;
            }
        }
    }
}

/// Compress peaks above `threshold` smoothly towards full scale
///
/// Below the threshold the signal passes unchanged. Above it the excess is squashed
/// with `tanh`, so the output approaches but never exceeds 1.0.
pub fn soft_limit(sample: f32, threshold: f32) -> f32 {
    let magnitude = sample.abs();
    if magnitude <= threshold {
        return sample;
    }
    if threshold >= 1.0 {
        return sample.clamp(-1.0, 1.0);
    }

    let headroom = 1.0 - threshold;
    let limited = threshold + headroom * ((magnitude - threshold) / headroom).tanh();
    limited.min(1.0).copysign(sample)
}
