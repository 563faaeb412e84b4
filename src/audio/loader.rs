use std::fmt::Display;
use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::audio::types::AudioData;
use crate::error::{AudioError, DecodeResult};

/// Containers decoded in-process; anything else goes through ffmpeg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NativeFormat {
    Wav,
    Compressed,
}

impl NativeFormat {
    fn of(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "wav" | "wave" => Some(Self::Wav),
            "mp3" | "flac" | "ogg" | "m4a" | "aac" => Some(Self::Compressed),
            _ => None,
        }
    }
}

/// Decodes whole audio files into interleaved `f32` samples
pub struct AudioLoader;

impl AudioLoader {
    pub fn load<P: AsRef<Path>>(path: P) -> DecodeResult<AudioData> {
        let path = path.as_ref();
        let data = match NativeFormat::of(path) {
            Some(NativeFormat::Wav) => read_wav(path)?,
            Some(NativeFormat::Compressed) => SymphoniaStream::open(path)?.decode_all()?,
            None => {
                let format = path
                    .extension()
                    .map(|ext| ext.to_string_lossy().into_owned())
                    .unwrap_or_default();
                return Err(AudioError::UnsupportedFormat { format }.into());
            }
        };

        debug!(
            "Loaded audio {:?}: {:.2}s, {} Hz, {} channels",
            path, data.duration, data.sample_rate, data.channels
        );
        Ok(data)
    }

    /// Whether [`AudioLoader::load`] handles this file without ffmpeg
    pub fn decodes_natively<P: AsRef<Path>>(path: P) -> bool {
        NativeFormat::of(path.as_ref()).is_some()
    }
}

fn load_failed(path: &Path, reason: impl Display) -> AudioError {
    AudioError::LoadFailed {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn read_wav(path: &Path) -> DecodeResult<AudioData> {
    let reader = hound::WavReader::open(path).map_err(|e| load_failed(path, e))?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>(),
        hound::SampleFormat::Int => {
            // hound yields signed values for every bit depth, 8-bit included
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|s| s as f32 * scale))
                .collect()
        }
    }
    .map_err(|e| load_failed(path, e))?;

    Ok(AudioData::new(samples, spec.sample_rate, spec.channels, path.to_path_buf()))
}

/// First decodable audio track of a probed container
struct SymphoniaStream<'a> {
    path: &'a Path,
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
}

impl<'a> SymphoniaStream<'a> {
    fn open(path: &'a Path) -> DecodeResult<Self> {
        let file = File::open(path).map_err(|e| load_failed(path, e))?;
        let source = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let reader = symphonia::default::get_probe()
            .format(&hint, source, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| load_failed(path, e))?
            .format;

        let (track_id, params) = reader
            .tracks()
            .iter()
            .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
            .map(|track| (track.id, track.codec_params.clone()))
            .ok_or_else(|| load_failed(path, "no audio track"))?;
        let (sample_rate, channels) = stream_layout(&params)?;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| load_failed(path, e))?;

        Ok(Self {
            path,
            reader,
            decoder,
            track_id,
            sample_rate,
            channels,
        })
    }

    fn decode_all(mut self) -> DecodeResult<AudioData> {
        let mut samples = Vec::new();
        let mut buffer: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                // A new track list starts a different stream; keep what we have
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(load_failed(self.path, e).into()),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            // A corrupt packet fails the load rather than leaving a gap in the timeline
            let decoded = self
                .decoder
                .decode(&packet)
                .map_err(|e| load_failed(self.path, e))?;

            let needed = decoded.capacity() as u64;
            if buffer.as_ref().map_or(true, |buf| (buf.capacity() as u64) < needed) {
                buffer = Some(SampleBuffer::new(needed, *decoded.spec()));
            }
            if let Some(buf) = buffer.as_mut() {
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
        }

        if samples.is_empty() {
            return Err(load_failed(self.path, "stream contains no samples").into());
        }
        Ok(AudioData::new(samples, self.sample_rate, self.channels, self.path.to_path_buf()))
    }
}

fn stream_layout(params: &CodecParameters) -> DecodeResult<(u32, u16)> {
    let sample_rate = params.sample_rate.ok_or_else(|| AudioError::InvalidParameters {
        details: "stream has no sample rate".to_string(),
    })?;
    let channels = params.channels.ok_or_else(|| AudioError::InvalidParameters {
        details: "stream has no channel layout".to_string(),
    })?;
    Ok((sample_rate, channels.count() as u16))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use tempfile::tempdir;

    fn write_wav(path: &Path, spec: hound::WavSpec, write: impl FnOnce(&mut hound::WavWriter<std::io::BufWriter<File>>)) {
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        write(&mut writer);
        writer.finalize().unwrap();
    }

    #[test]
    fn test_native_formats() {
        assert!(AudioLoader::decodes_natively("music.wav"));
        assert!(AudioLoader::decodes_natively("voice.MP3"));
        assert!(AudioLoader::decodes_natively("take.flac"));
        assert!(!AudioLoader::decodes_natively("speech.opus"));
        assert!(!AudioLoader::decodes_natively("no_extension"));
    }

    #[test]
    fn test_int16_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        write_wav(&path, spec, |w| {
            for i in 0..800 {
                w.write_sample(if i % 2 == 0 { 16384i16 } else { -16384 }).unwrap();
            }
        });

        let data = AudioLoader::load(&path).unwrap();
        assert_eq!(data.sample_rate, 8_000);
        assert_eq!(data.channels, 1);
        assert_eq!(data.frames(), 800);
        assert!((data.duration - 0.1).abs() < 1e-9);
        assert_eq!(&data.samples[..2], &[0.5, -0.5]);
    }

    #[test]
    fn test_int8_wav_is_centred() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bytes.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 100,
            bits_per_sample: 8,
            sample_format: hound::SampleFormat::Int,
        };
        write_wav(&path, spec, |w| {
            for s in [0i8, 64, -128] {
                w.write_sample(s).unwrap();
            }
        });

        let data = AudioLoader::load(&path).unwrap();
        assert_eq!(data.samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn test_float_stereo_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        write_wav(&path, spec, |w| {
            for _ in 0..480 {
                w.write_sample(0.25f32).unwrap();
                w.write_sample(-0.75f32).unwrap();
            }
        });

        let data = AudioLoader::load(&path).unwrap();
        assert_eq!(data.channels, 2);
        assert_eq!(data.frames(), 480);
        assert_eq!(&data.samples[..2], &[0.25, -0.75]);
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.xyz");
        std::fs::write(&path, b"dummy content").unwrap();

        match AudioLoader::load(&path) {
            Err(DecodeError::Audio(AudioError::UnsupportedFormat { format })) => assert_eq!(format, "xyz"),
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_files_fail_to_load() {
        let dir = tempdir().unwrap();
        let wav = dir.path().join("broken.wav");
        let mp3 = dir.path().join("broken.mp3");
        std::fs::write(&wav, b"RIFF....not really a wav").unwrap();
        std::fs::write(&mp3, b"").unwrap();

        for path in [&wav, &mp3] {
            assert!(matches!(
                AudioLoader::load(path),
                Err(DecodeError::Audio(AudioError::LoadFailed { .. }))
            ));
        }
    }

    #[test]
    fn test_truncated_wav_reports_the_read_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cut.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        write_wav(&path, spec, |w| {
            for _ in 0..1000 {
                w.write_sample(100i16).unwrap();
            }
        });
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        let len = file.metadata().unwrap().len();
        file.set_len(len - 501).unwrap();

        match AudioLoader::load(&path) {
            Err(DecodeError::Audio(AudioError::LoadFailed { path: failed, reason })) => {
                assert!(failed.ends_with("cut.wav"));
                assert!(!reason.is_empty());
            }
            other => panic!("expected LoadFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_garbled_mp3_packet_fails_the_load() {
        // MPEG-1 layer III, 128 kbps, 44.1 kHz, mono: 417 byte frames
        let mut bytes = Vec::new();
        for _ in 0..8 {
            bytes.extend_from_slice(&[0xFF, 0xFB, 0x90, 0xC0]);
            bytes.extend(std::iter::repeat(0xFFu8).take(413));
        }
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbled.mp3");
        std::fs::write(&path, &bytes).unwrap();

        match AudioLoader::load(&path) {
            Err(DecodeError::Audio(AudioError::LoadFailed { reason, .. })) => {
                assert!(reason.contains("big_values"), "unexpected reason: {reason}");
            }
            other => panic!("expected LoadFailed, got {other:?}"),
        }
    }
}
