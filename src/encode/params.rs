use crate::export::options::{ExportFormat, ExportQuality};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    Vp9,
}

impl VideoCodec {
    /// ffmpeg encoder name
    pub const fn encoder(&self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::Vp9 => "libvpx-vp9",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Aac,
    Opus,
}

impl AudioCodec {
    /// ffmpeg encoder name
    pub const fn encoder(&self) -> &'static str {
        match self {
            Self::Aac => "aac",
            Self::Opus => "libopus",
        }
    }
}

/// Codec settings for one format/quality pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderParams {
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    /// Constant rate factor; lower is better
    pub crf: u8,
    /// Bitrate cap (H.264) or target (VP9) in kbit/s
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
}

const fn h264(crf: u8, video_bitrate_kbps: u32, audio_bitrate_kbps: u32) -> EncoderParams {
    EncoderParams {
        video_codec: VideoCodec::H264,
        audio_codec: AudioCodec::Aac,
        crf,
        video_bitrate_kbps,
        audio_bitrate_kbps,
    }
}

const fn vp9(crf: u8, video_bitrate_kbps: u32, audio_bitrate_kbps: u32) -> EncoderParams {
    EncoderParams {
        video_codec: VideoCodec::Vp9,
        audio_codec: AudioCodec::Opus,
        crf,
        video_bitrate_kbps,
        audio_bitrate_kbps,
    }
}

/// Look up the encoder parameters for a format and quality
pub const fn encoder_params(format: ExportFormat, quality: ExportQuality) -> EncoderParams {
    match (format, quality) {
        (ExportFormat::Mp4, ExportQuality::Low) => h264(28, 1_500, 96),
        (ExportFormat::Mp4, ExportQuality::Medium) => h264(23, 4_000, 128),
        (ExportFormat::Mp4, ExportQuality::High) => h264(20, 8_000, 192),
        (ExportFormat::Mp4, ExportQuality::VeryHigh) => h264(17, 16_000, 256),
        (ExportFormat::Webm, ExportQuality::Low) => vp9(40, 1_000, 64),
        (ExportFormat::Webm, ExportQuality::Medium) => vp9(34, 2_500, 96),
        (ExportFormat::Webm, ExportQuality::High) => vp9(31, 5_000, 128),
        (ExportFormat::Webm, ExportQuality::VeryHigh) => vp9(24, 10_000, 192),
    }
}
