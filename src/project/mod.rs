//! # Project Model
//!
//! The in-memory description an export consumes: layered tracks of timed media and text
//! elements, an output canvas and a frame rate.

pub mod timebase;
pub mod types;

pub use timebase::{FrameRate, SampleRange};
pub use types::{
    ActiveElement, Canvas, Element, ElementKind, MediaElement, MediaKind, Project, SourceRef,
    TextAlign, TextElement, TextStyle, Track, TrackKind,
};
