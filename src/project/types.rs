use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result};
use crate::project::timebase::FrameRate;

/// Output canvas size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self { width: 1920, height: 1080 }
    }
}

/// An editing project: layered tracks of timed elements
///
/// The project is read-only input to an export. Callers that keep editing while an
/// export runs must hand the export its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,

    #[serde(default)]
    pub canvas: Canvas,

    #[serde(default)]
    pub frame_rate: FrameRate,

    /// Bottom-most track first; later tracks draw on top
    #[serde(default)]
    pub tracks: Vec<Track>,
}

/// Role hint for a track; elements carry their own type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    #[default]
    Media,
    Audio,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,

    #[serde(default)]
    pub kind: TrackKind,

    /// Muted tracks contribute no audio
    #[serde(default)]
    pub muted: bool,

    #[serde(default)]
    pub elements: Vec<Element>,
}

/// One timed piece of content placed on a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: String,

    /// Start on the project timeline, in seconds
    pub start_time: f64,

    /// Length on the project timeline, in seconds
    pub duration: f64,

    #[serde(flatten)]
    pub kind: ElementKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElementKind {
    Media(MediaElement),
    Text(TextElement),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
    Audio,
}

/// Reference to a decodable source file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub path: PathBuf,
    pub kind: MediaKind,
}

impl SourceRef {
    pub fn new<P: Into<PathBuf>>(path: P, kind: MediaKind) -> Self {
        Self { path: path.into(), kind }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaElement {
    pub source: SourceRef,

    /// Offset into the source where playback begins, in seconds
    #[serde(default)]
    pub trim_start: f64,

    /// Linear gain applied to the element's audio
    #[serde(default = "default_volume")]
    pub volume: f32,
}

fn default_volume() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextElement {
    pub content: String,

    #[serde(default)]
    pub style: TextStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

/// Visual style of a text overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    /// Font family name; unknown families fall back to the default font
    pub font_family: Option<String>,

    /// Font size in pixels
    pub font_size: f32,

    /// Straight-alpha RGBA text color
    pub color: [u8; 4],

    /// Horizontal offset of the anchor from the canvas centre, in pixels
    pub x: f32,

    /// Vertical offset of the block centre from the canvas centre, in pixels
    pub y: f32,

    /// How lines are aligned relative to the anchor
    pub align: TextAlign,

    /// Overall opacity (0.0-1.0)
    pub opacity: f32,

    /// Optional box drawn behind the text block
    pub background: Option<[u8; 4]>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: None,
            font_size: 48.0,
            color: [255, 255, 255, 255],
            x: 0.0,
            y: 0.0,
            align: TextAlign::Center,
            opacity: 1.0,
            background: None,
        }
    }
}

/// An element selected at some timestamp, together with its layering context
#[derive(Debug, Clone, Copy)]
pub struct ActiveElement<'a> {
    pub track_index: usize,
    pub track_id: &'a str,
    pub track_muted: bool,
    pub element_index: usize,
    pub element: &'a Element,
}

impl Element {
    pub fn media<S: Into<String>>(id: S, start_time: f64, duration: f64, source: SourceRef) -> Self {
        Self {
            id: id.into(),
            start_time,
            duration,
            kind: ElementKind::Media(MediaElement {
                source,
                trim_start: 0.0,
                volume: 1.0,
            }),
        }
    }

    pub fn text<S: Into<String>, C: Into<String>>(
        id: S,
        start_time: f64,
        duration: f64,
        content: C,
        style: TextStyle,
    ) -> Self {
        Self {
            id: id.into(),
            start_time,
            duration,
            kind: ElementKind::Text(TextElement {
                content: content.into(),
                style,
            }),
        }
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Whether `[start_time, start_time + duration)` contains `timestamp`
    pub fn is_active_at(&self, timestamp: f64) -> bool {
        timestamp >= self.start_time && timestamp < self.end_time()
    }

    /// Whether the element intersects `[start, end)`
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.start_time < end && self.end_time() > start
    }

    /// Whether the element contributes pixels to composited frames
    pub fn is_visual(&self) -> bool {
        match &self.kind {
            ElementKind::Text(_) => true,
            ElementKind::Media(media) => {
                matches!(media.source.kind, MediaKind::Video | MediaKind::Image)
            }
        }
    }

    /// Whether the element contributes to the mixed audio track
    pub fn is_audible(&self) -> bool {
        match &self.kind {
            ElementKind::Text(_) => false,
            ElementKind::Media(media) => {
                matches!(media.source.kind, MediaKind::Video | MediaKind::Audio)
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.start_time.is_finite() || self.start_time < 0.0 {
            return Err(ExportError::invalid_element(
                &self.id,
                format!("start time must be >= 0, got {}", self.start_time),
            ));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(ExportError::invalid_element(
                &self.id,
                format!("duration must be > 0, got {}", self.duration),
            ));
        }

        match &self.kind {
            ElementKind::Media(media) => {
                if !media.trim_start.is_finite() || media.trim_start < 0.0 {
                    return Err(ExportError::invalid_element(
                        &self.id,
                        format!("trim start must be >= 0, got {}", media.trim_start),
                    ));
                }
                if !media.volume.is_finite() || media.volume < 0.0 {
                    return Err(ExportError::invalid_element(
                        &self.id,
                        format!("volume must be >= 0, got {}", media.volume),
                    ));
                }
            }
            ElementKind::Text(text) => {
                if !text.style.font_size.is_finite() || text.style.font_size <= 0.0 {
                    return Err(ExportError::invalid_element(
                        &self.id,
                        format!("font size must be > 0, got {}", text.style.font_size),
                    ));
                }
            }
        }

        Ok(())
    }
}

impl Track {
    pub fn new<S: Into<String>>(id: S, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            muted: false,
            elements: Vec::new(),
        }
    }

    pub fn with_element(mut self, element: Element) -> Self {
        self.elements.push(element);
        self
    }

    pub fn muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }
}

impl Project {
    pub fn new<S: Into<String>>(name: S, canvas: Canvas, frame_rate: FrameRate) -> Self {
        Self {
            name: name.into(),
            canvas,
            frame_rate,
            tracks: Vec::new(),
        }
    }

    pub fn with_track(mut self, track: Track) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn element_count(&self) -> usize {
        self.tracks.iter().map(|t| t.elements.len()).sum()
    }

    /// Project length in seconds: the latest element end time
    pub fn duration(&self) -> f64 {
        self.elements()
            .map(|a| a.element.end_time())
            .fold(0.0, f64::max)
    }

    /// Check every structural invariant before any frame work starts
    pub fn validate(&self) -> Result<()> {
        if self.element_count() == 0 {
            return Err(ExportError::EmptyProject);
        }

        let mut seen = HashSet::new();
        for active in self.elements() {
            active.element.validate()?;
            if !seen.insert(active.element.id.as_str()) {
                return Err(ExportError::invalid_element(
                    &active.element.id,
                    "element ids must be unique within a project",
                ));
            }
        }

        let Canvas { width, height } = self.canvas;
        if width == 0 || height == 0 {
            return Err(ExportError::invalid_project(format!(
                "canvas must be non-empty, got {}x{}",
                width, height
            )));
        }
        if width % 2 != 0 || height % 2 != 0 {
            return Err(ExportError::invalid_project(format!(
                "canvas dimensions must be even for yuv420p output, got {}x{}",
                width, height
            )));
        }

        Ok(())
    }

    /// All elements in layering order (track index, then position within the track)
    pub fn elements(&self) -> impl Iterator<Item = ActiveElement<'_>> {
        self.tracks.iter().enumerate().flat_map(|(track_index, track)| {
            track
                .elements
                .iter()
                .enumerate()
                .map(move |(element_index, element)| ActiveElement {
                    track_index,
                    track_id: track.id.as_str(),
                    track_muted: track.muted,
                    element_index,
                    element,
                })
        })
    }

    /// Visual elements active at `timestamp`, in paint order
    ///
    /// Ordered by track index, then start time, then position within the track, so
    /// higher tracks paint over lower ones and later elements win within a track.
    pub fn visual_elements_at(&self, timestamp: f64) -> Vec<ActiveElement<'_>> {
        let mut active: Vec<_> = self
            .elements()
            .filter(|a| a.element.is_visual() && a.element.is_active_at(timestamp))
            .collect();

        active.sort_by(|a, b| {
            a.track_index
                .cmp(&b.track_index)
                .then(a.element.start_time.total_cmp(&b.element.start_time))
                .then(a.element_index.cmp(&b.element_index))
        });
        active
    }

    /// Audible elements on unmuted tracks that intersect `[start, end)`
    pub fn audible_elements_in(&self, start: f64, end: f64) -> Vec<ActiveElement<'_>> {
        self.elements()
            .filter(|a| !a.track_muted && a.element.is_audible() && a.element.overlaps(start, end))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(id: &str, start: f64, duration: f64) -> Element {
        Element::text(id, start, duration, id, TextStyle::default())
    }

    fn project() -> Project {
        Project::new("demo", Canvas::new(64, 36), FrameRate::default())
    }

    #[test]
    fn test_empty_project_is_rejected() {
        assert!(matches!(project().validate(), Err(ExportError::EmptyProject)));

        let only_empty_tracks = project().with_track(Track::new("t1", TrackKind::Media));
        assert!(matches!(only_empty_tracks.validate(), Err(ExportError::EmptyProject)));
    }

    #[test]
    fn test_invalid_element_timing_is_rejected() {
        let negative_start = project().with_track(Track::new("t1", TrackKind::Text).with_element(text("a", -0.5, 1.0)));
        match negative_start.validate() {
            Err(ExportError::InvalidElement { element_id, .. }) => assert_eq!(element_id, "a"),
            other => panic!("expected InvalidElement, got {other:?}"),
        }

        let zero_duration = project().with_track(Track::new("t1", TrackKind::Text).with_element(text("b", 0.0, 0.0)));
        assert!(matches!(zero_duration.validate(), Err(ExportError::InvalidElement { .. })));

        let negative_duration = project().with_track(Track::new("t1", TrackKind::Text).with_element(text("c", 1.0, -2.0)));
        assert!(matches!(negative_duration.validate(), Err(ExportError::InvalidElement { .. })));
    }

    #[test]
    fn test_duplicate_ids_and_odd_canvas_are_rejected() {
        let duplicated = project()
            .with_track(Track::new("t1", TrackKind::Text).with_element(text("a", 0.0, 1.0)))
            .with_track(Track::new("t2", TrackKind::Text).with_element(text("a", 0.0, 1.0)));
        assert!(matches!(duplicated.validate(), Err(ExportError::InvalidElement { .. })));

        let mut odd = project().with_track(Track::new("t1", TrackKind::Text).with_element(text("a", 0.0, 1.0)));
        odd.canvas = Canvas::new(63, 36);
        assert!(matches!(odd.validate(), Err(ExportError::InvalidProject { .. })));
    }

    #[test]
    fn test_duration_is_latest_end() {
        let p = project()
            .with_track(Track::new("t1", TrackKind::Text).with_element(text("a", 0.0, 2.0)))
            .with_track(Track::new("t2", TrackKind::Text).with_element(text("b", 1.5, 3.0)));
        assert_eq!(p.duration(), 4.5);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_visual_ordering_follows_layers() {
        let p = project()
            .with_track(
                Track::new("lower", TrackKind::Text)
                    .with_element(text("late", 0.5, 2.0))
                    .with_element(text("early", 0.0, 2.0)),
            )
            .with_track(Track::new("upper", TrackKind::Text).with_element(text("top", 0.0, 2.0)))
            .with_track(Track::new("music", TrackKind::Audio).with_element(Element::media(
                "song",
                0.0,
                2.0,
                SourceRef::new("song.wav", MediaKind::Audio),
            )));

        let ids: Vec<_> = p.visual_elements_at(1.0).iter().map(|a| a.element.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late", "top"]);

        // End is exclusive
        assert!(p.visual_elements_at(2.5).is_empty());
    }

    #[test]
    fn test_audible_elements_skip_muted_tracks() {
        let p = project()
            .with_track(Track::new("v", TrackKind::Media).with_element(Element::media(
                "clip",
                0.0,
                2.0,
                SourceRef::new("clip.mp4", MediaKind::Video),
            )))
            .with_track(
                Track::new("a", TrackKind::Audio)
                    .muted(true)
                    .with_element(Element::media("song", 0.0, 2.0, SourceRef::new("song.wav", MediaKind::Audio))),
            );

        let ids: Vec<_> = p.audible_elements_in(0.0, 0.5).iter().map(|a| a.element.id.clone()).collect();
        assert_eq!(ids, vec!["clip".to_string()]);
    }

    #[test]
    fn test_project_toml_round_trip() {
        let source = r#"
            name = "trailer"
            frame_rate = 24
            canvas = { width = 1280, height = 720 }

            [[tracks]]
            id = "main"

            [[tracks.elements]]
            id = "intro"
            type = "media"
            start_time = 0.0
            duration = 4.0
            source = { path = "intro.mp4", kind = "video" }
            trim_start = 1.5

            [[tracks.elements]]
            id = "title"
            type = "text"
            start_time = 0.5
            duration = 2.0
            content = "Hello"
            style = { font_size = 72.0, align = "left" }
        "#;

        let project: Project = toml::from_str(source).unwrap();
        assert_eq!(project.frame_rate, FrameRate::from_fps(24.0).unwrap());
        assert_eq!(project.tracks[0].elements.len(), 2);

        match &project.tracks[0].elements[0].kind {
            ElementKind::Media(media) => {
                assert_eq!(media.source.kind, MediaKind::Video);
                assert_eq!(media.trim_start, 1.5);
                assert_eq!(media.volume, 1.0);
            }
            other => panic!("expected media, got {other:?}"),
        }
        match &project.tracks[0].elements[1].kind {
            ElementKind::Text(text) => {
                assert_eq!(text.style.align, TextAlign::Left);
                assert_eq!(text.style.color, [255, 255, 255, 255]);
            }
            other => panic!("expected text, got {other:?}"),
        }
        assert!(project.validate().is_ok());
    }
}
