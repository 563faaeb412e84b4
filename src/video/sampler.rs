use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use image::RgbaImage;
use tracing::debug;

use crate::audio::AudioData;
use crate::error::{ExportError, Result};
use crate::project::{ActiveElement, Canvas, ElementKind, MediaElement, MediaKind, SourceRef};
use crate::video::decoder::{MediaBackend, VideoSource};
use crate::video::frame::fit_centered;
use crate::video::text::{text_origin, TextRasterizer};

/// A positioned image ready to be painted onto the canvas
#[derive(Debug, Clone)]
pub struct Layer {
    pub image: Arc<RgbaImage>,
    pub x: i64,
    pub y: i64,
    pub opacity: f32,
}

/// The slice of an element's decoded audio that falls inside a mix range
#[derive(Debug, Clone)]
pub struct AudioWindow {
    pub data: Arc<AudioData>,

    /// Source time (seconds) aligned with the start of the requested range.
    /// Negative when the element starts inside the range.
    pub local_start: f64,

    /// Length of the requested range in seconds
    pub duration: f64,

    /// Timeline span where the element is audible, in seconds
    pub active_from: f64,
    pub active_until: f64,

    pub trim_start: f64,
    pub volume: f32,
}

impl AudioWindow {
    /// Source time for a timeline timestamp, or `None` outside the element
    pub fn local_time(&self, timestamp: f64) -> Option<f64> {
        if timestamp < self.active_from || timestamp >= self.active_until {
            return None;
        }
        Some(timestamp - self.active_from + self.trim_start)
    }
}

struct VideoSlot {
    decoder: Box<dyn VideoSource>,
    /// Last decoded frame and its canvas-fitted version
    fitted: Option<(Arc<RgbaImage>, Layer)>,
}

/// Pulls per-element content at a timestamp
///
/// Sources are opened lazily, once per distinct file, and shared by every element that
/// references them. Everything is released when the sampler is dropped.
pub struct ElementSampler {
    canvas: Canvas,
    media: Arc<dyn MediaBackend>,
    text: Arc<dyn TextRasterizer>,
    videos: Mutex<HashMap<SourceRef, Arc<Mutex<VideoSlot>>>>,
    images: Mutex<HashMap<SourceRef, Layer>>,
    audio: Mutex<HashMap<SourceRef, Option<Arc<AudioData>>>>,
    texts: Mutex<HashMap<String, Layer>>,
}

impl ElementSampler {
    pub fn new(canvas: Canvas, media: Arc<dyn MediaBackend>, text: Arc<dyn TextRasterizer>) -> Self {
        Self {
            canvas,
            media,
            text,
            videos: Mutex::new(HashMap::new()),
            images: Mutex::new(HashMap::new()),
            audio: Mutex::new(HashMap::new()),
            texts: Mutex::new(HashMap::new()),
        }
    }

    /// Visual content of an active element at `timestamp`
    pub fn visual(&self, active: &ActiveElement<'_>, timestamp: f64) -> Result<Layer> {
        let element = active.element;
        match &element.kind {
            ElementKind::Text(text) => {
                let mut texts = self.texts.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(layer) = texts.get(&element.id) {
                    return Ok(layer.clone());
                }

                let block = self.text.rasterize(&text.content, &text.style)?;
                let (x, y) = text_origin(self.canvas, &text.style, block.width(), block.height());
                let layer = Layer {
                    image: Arc::new(block),
                    x,
                    y,
                    opacity: text.style.opacity.clamp(0.0, 1.0),
                };
                texts.insert(element.id.clone(), layer.clone());
                Ok(layer)
            }
            ElementKind::Media(media) => match media.source.kind {
                MediaKind::Image => self.image(&element.id, &media.source),
                MediaKind::Video => {
                    let local = timestamp - element.start_time + media.trim_start;
                    self.video_frame(&element.id, &media.source, local)
                }
                MediaKind::Audio => Err(ExportError::invalid_element(
                    &element.id,
                    "audio elements have no visual content",
                )),
            },
        }
    }

    /// Audio of an active element over `[range_start, range_end)` seconds of the timeline
    ///
    /// Returns `None` when the element carries no audio, such as a silent video.
    pub fn audio_window(
        &self,
        active: &ActiveElement<'_>,
        range_start: f64,
        range_end: f64,
    ) -> Result<Option<AudioWindow>> {
        let element = active.element;
        let ElementKind::Media(MediaElement { source, trim_start, volume }) = &element.kind else {
            return Ok(None);
        };

        let Some(data) = self.audio_data(&element.id, source)? else {
            return Ok(None);
        };

        Ok(Some(AudioWindow {
            data,
            local_start: range_start - element.start_time + trim_start,
            duration: range_end - range_start,
            active_from: element.start_time,
            active_until: element.end_time(),
            trim_start: *trim_start,
            volume: *volume,
        }))
    }

    /// Number of distinct sources opened so far
    pub fn open_sources(&self) -> usize {
        self.videos.lock().unwrap_or_else(PoisonError::into_inner).len()
            + self.images.lock().unwrap_or_else(PoisonError::into_inner).len()
            + self.audio.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn image(&self, element_id: &str, source: &SourceRef) -> Result<Layer> {
        let mut images = self.images.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(layer) = images.get(source) {
            return Ok(layer.clone());
        }

        let still = self
            .media
            .load_image(&source.path)
            .map_err(|e| ExportError::source_decode(element_id, &e))?;
        let (fitted, x, y) = fit_centered(&still, self.canvas.width, self.canvas.height);
        debug!("Decoded image {:?} ({}x{})", source.path, still.width(), still.height());

        let layer = Layer {
            image: Arc::new(fitted),
            x,
            y,
            opacity: 1.0,
        };
        images.insert(source.clone(), layer.clone());
        Ok(layer)
    }

    fn video_slot(&self, element_id: &str, source: &SourceRef) -> Result<Arc<Mutex<VideoSlot>>> {
        let mut videos = self.videos.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = videos.get(source) {
            return Ok(Arc::clone(slot));
        }

        let decoder = self
            .media
            .open_video(&source.path)
            .map_err(|e| ExportError::source_decode(element_id, &e))?;
        let slot = Arc::new(Mutex::new(VideoSlot { decoder, fitted: None }));
        videos.insert(source.clone(), Arc::clone(&slot));
        Ok(slot)
    }

    fn video_frame(&self, element_id: &str, source: &SourceRef, local_time: f64) -> Result<Layer> {
        let slot = self.video_slot(element_id, source)?;
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let duration = slot.decoder.metadata().duration;
        let local_time = local_time.clamp(0.0, duration.max(0.0));
        let frame = slot
            .decoder
            .frame_at(local_time)
            .map_err(|e| ExportError::source_decode(element_id, &e))?;

        if let Some((last, layer)) = &slot.fitted {
            if Arc::ptr_eq(last, &frame) {
                return Ok(layer.clone());
            }
        }

        let (fitted, x, y) = fit_centered(&frame, self.canvas.width, self.canvas.height);
        let layer = Layer {
            image: Arc::new(fitted),
            x,
            y,
            opacity: 1.0,
        };
        slot.fitted = Some((frame, layer.clone()));
        Ok(layer)
    }

    fn audio_data(&self, element_id: &str, source: &SourceRef) -> Result<Option<Arc<AudioData>>> {
        let mut audio = self.audio.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(data) = audio.get(source) {
            return Ok(data.clone());
        }

        let data = self
            .media
            .load_audio(source)
            .map_err(|e| ExportError::source_decode(element_id, &e))?
            .map(Arc::new);
        if let Some(data) = &data {
            debug!(
                "Decoded audio of {:?}: {:.2}s @ {} Hz x{}",
                source.path, data.duration, data.sample_rate, data.channels
            );
        }
        audio.insert(source.clone(), data.clone());
        Ok(data)
    }
}

impl Drop for ElementSampler {
    fn drop(&mut self) {
        let sources = self.open_sources();
        if sources > 0 {
            debug!("Releasing {} decoded sources", sources);
        }
    }
}
