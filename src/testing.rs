//! In-process fakes for the media, text and encoder seams

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::{ImageBuffer, Rgba, RgbaImage};

use crate::audio::{AudioChunk, AudioData};
use crate::encode::session::{EncoderBackend, EncoderFactory, EncoderSettings};
use crate::error::{DecodeResult, ExportError, Result, VideoError};
use crate::project::{SourceRef, TextStyle};
use crate::video::decoder::{MediaBackend, SourceMetadata, VideoSource};
use crate::video::frame::Frame;
use crate::video::text::{layout_block, Glyph, GlyphSource, TextRasterizer};

pub fn solid_image(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
    ImageBuffer::from_pixel(width, height, Rgba(color))
}

/// Audio holding the same value on every channel of every frame
pub fn constant_audio(value: f32, sample_rate: u32, channels: u16, seconds: f64) -> AudioData {
    let frames = (seconds * sample_rate as f64).round() as usize;
    AudioData::new(
        vec![value; frames * channels as usize],
        sample_rate,
        channels,
        PathBuf::from("constant.wav"),
    )
}

/// Glyphs are solid 8x8 boxes on a 10px advance, ascent 8 and descent -2 at 10px
pub struct BoxGlyphs;

impl GlyphSource for BoxGlyphs {
    fn line_metrics(&self, px: f32) -> (f32, f32) {
        (px * 0.8, -px * 0.2)
    }

    fn glyph(&self, ch: char, px: f32) -> Glyph {
        if ch == ' ' {
            return Glyph { xmin: 0, ymin: 0, width: 0, height: 0, advance: px, coverage: Vec::new() };
        }
        let side = (px * 0.8).round() as usize;
        Glyph {
            xmin: (px * 0.1).round() as i32,
            ymin: 0,
            width: side,
            height: side,
            advance: px,
            coverage: vec![255; side * side],
        }
    }
}

/// Text rasterizer using [`BoxGlyphs`]
pub struct FakeText {
    pub line_height: f32,
}

impl Default for FakeText {
    fn default() -> Self {
        Self { line_height: 1.0 }
    }
}

impl TextRasterizer for FakeText {
    fn rasterize(&self, content: &str, style: &TextStyle) -> Result<RgbaImage> {
        Ok(layout_block(&BoxGlyphs, content, style, self.line_height))
    }
}

#[derive(Debug, Clone)]
struct FakeVideoSpec {
    width: u32,
    height: u32,
    fps: f64,
    duration: f64,
}

/// Video whose frame `n` is filled with `[n % 256, 255 - n % 256, 0, 255]`
pub struct FakeVideo {
    metadata: SourceMetadata,
    cache: Option<(u64, Arc<RgbaImage>)>,
    reads: Arc<AtomicUsize>,
}

impl FakeVideo {
    pub fn frame_color(index: u64) -> [u8; 4] {
        let v = (index % 256) as u8;
        [v, 255 - v, 0, 255]
    }
}

impl VideoSource for FakeVideo {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn frame_at(&mut self, local_time: f64) -> DecodeResult<Arc<RgbaImage>> {
        let index = self.metadata.frame_index_at(local_time);
        if let Some((cached, frame)) = &self.cache {
            if *cached == index {
                return Ok(Arc::clone(frame));
            }
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        let frame = Arc::new(solid_image(
            self.metadata.width,
            self.metadata.height,
            Self::frame_color(index),
        ));
        self.cache = Some((index, Arc::clone(&frame)));
        Ok(frame)
    }
}

/// Media backend serving generated content, counting how often each source is opened
#[derive(Default)]
pub struct FakeMedia {
    videos: HashMap<PathBuf, FakeVideoSpec>,
    images: HashMap<PathBuf, RgbaImage>,
    audio: HashMap<PathBuf, AudioData>,
    failing: HashSet<PathBuf>,
    pub video_opens: AtomicUsize,
    pub image_loads: AtomicUsize,
    pub audio_loads: AtomicUsize,
    pub frame_reads: Arc<AtomicUsize>,
}

impl FakeMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video<P: Into<PathBuf>>(mut self, path: P, width: u32, height: u32, fps: f64, duration: f64) -> Self {
        self.videos.insert(path.into(), FakeVideoSpec { width, height, fps, duration });
        self
    }

    pub fn with_image<P: Into<PathBuf>>(mut self, path: P, image: RgbaImage) -> Self {
        self.images.insert(path.into(), image);
        self
    }

    /// Audio for an audio file, or the soundtrack of a video
    pub fn with_audio<P: Into<PathBuf>>(mut self, path: P, data: AudioData) -> Self {
        self.audio.insert(path.into(), data);
        self
    }

    /// Every decode of this path fails
    pub fn with_failing<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.failing.insert(path.into());
        self
    }

    fn check(&self, path: &Path) -> DecodeResult<()> {
        if self.failing.contains(path) {
            return Err(VideoError::DecodingFailed {
                reason: format!("{} is corrupt", path.display()),
            }
            .into());
        }
        Ok(())
    }
}

impl MediaBackend for FakeMedia {
    fn open_video(&self, path: &Path) -> DecodeResult<Box<dyn VideoSource>> {
        self.check(path)?;
        self.video_opens.fetch_add(1, Ordering::SeqCst);
        let spec = self.videos.get(path).ok_or_else(|| VideoError::OpenFailed {
            path: path.display().to_string(),
        })?;
        Ok(Box::new(FakeVideo {
            metadata: SourceMetadata {
                width: spec.width,
                height: spec.height,
                fps: spec.fps,
                fps_expr: spec.fps.to_string(),
                duration: spec.duration,
            },
            cache: None,
            reads: Arc::clone(&self.frame_reads),
        }))
    }

    fn load_image(&self, path: &Path) -> DecodeResult<RgbaImage> {
        self.check(path)?;
        self.image_loads.fetch_add(1, Ordering::SeqCst);
        self.images.get(path).cloned().ok_or_else(|| {
            VideoError::OpenFailed {
                path: path.display().to_string(),
            }
            .into()
        })
    }

    fn load_audio(&self, source: &SourceRef) -> DecodeResult<Option<AudioData>> {
        self.check(&source.path)?;
        self.audio_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.audio.get(&source.path).cloned())
    }
}

/// Where a [`RecordingEncoder`] should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Begin,
    /// On the video frame with this index
    Frame(u64),
    Finish,
}

/// What a recording backend has seen
#[derive(Debug, Clone, Default)]
pub struct EncoderLog {
    pub settings: Option<EncoderSettings>,
    pub frame_indices: Vec<u64>,
    pub frame_digests: Vec<u64>,
    /// (start sample, frame count) of every chunk
    pub audio_chunks: Vec<(u64, u64)>,
    pub finished: bool,
    pub aborted: bool,
}

impl EncoderLog {
    pub fn audio_samples(&self) -> u64 {
        self.audio_chunks.iter().map(|(_, frames)| frames).sum()
    }
}

/// Encoder backend recording everything it is given
///
/// `finish` returns a digest of all frames and audio, so identical inputs produce
/// identical bytes.
#[derive(Clone, Default)]
pub struct RecordingEncoder {
    log: Arc<Mutex<EncoderLog>>,
    fail: Option<FailPoint>,
}

impl RecordingEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(point: FailPoint) -> Self {
        Self {
            fail: Some(point),
            ..Self::default()
        }
    }

    pub fn backend(&self) -> Box<dyn EncoderBackend> {
        Box::new(RecordingBackend {
            log: Arc::clone(&self.log),
            fail: self.fail,
            hasher: DefaultHasher::new(),
        })
    }

    pub fn log(&self) -> EncoderLog {
        self.log.lock().unwrap().clone()
    }
}

impl EncoderFactory for RecordingEncoder {
    fn create(&self) -> Result<Box<dyn EncoderBackend>> {
        Ok(self.backend())
    }
}

struct RecordingBackend {
    log: Arc<Mutex<EncoderLog>>,
    fail: Option<FailPoint>,
    hasher: DefaultHasher,
}

impl EncoderBackend for RecordingBackend {
    fn begin(&mut self, settings: &EncoderSettings) -> Result<()> {
        if self.fail == Some(FailPoint::Begin) {
            return Err(ExportError::encoder_init("fake codec unavailable"));
        }
        self.log.lock().unwrap().settings = Some(*settings);
        Ok(())
    }

    fn write_video(&mut self, index: u64, frame: &Frame) -> Result<()> {
        if self.fail == Some(FailPoint::Frame(index)) {
            return Err(ExportError::encode(format!("fake failure at frame {}", index)));
        }
        let mut digest = DefaultHasher::new();
        frame.as_raw().hash(&mut digest);
        let digest = digest.finish();
        digest.hash(&mut self.hasher);

        let mut log = self.log.lock().unwrap();
        log.frame_indices.push(index);
        log.frame_digests.push(digest);
        Ok(())
    }

    fn write_audio(&mut self, chunk: &AudioChunk) -> Result<()> {
        chunk.to_le_bytes().hash(&mut self.hasher);
        self.log
            .lock()
            .unwrap()
            .audio_chunks
            .push((chunk.start_sample, chunk.frames()));
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        if self.fail == Some(FailPoint::Finish) {
            return Err(ExportError::encode("fake failure while finishing"));
        }
        self.log.lock().unwrap().finished = true;
        Ok(self.hasher.finish().to_le_bytes().to_vec())
    }

    fn abort(&mut self) {
        self.log.lock().unwrap().aborted = true;
    }
}
