//! # Timeline Export
//!
//! Render a multi-track editing timeline (video clips, still images, text overlays and
//! audio) into a single encoded MP4 or WebM file.
//!
//! An export samples every frame of the project timeline, composites the visible
//! elements onto a fixed canvas, mixes every audible element into one stereo stream and
//! hands both to an encoder session that writes the container.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use timeline_export::{
//!     export::{ExportFormat, ExportQuality},
//!     project::{Canvas, Element, FrameRate, MediaKind, SourceRef, Track, TrackKind},
//!     CancelToken, Config, ExportConfiguration, Exporter, Project,
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let project = Project::new("holiday", Canvas::new(1280, 720), FrameRate::default()).with_track(
//!     Track::new("main", TrackKind::Media).with_element(Element::media(
//!         "intro",
//!         0.0,
//!         5.0,
//!         SourceRef::new("intro.mp4", MediaKind::Video),
//!     )),
//! );
//!
//! let exporter = Exporter::new(Config::default())?;
//! let options = ExportConfiguration::new(ExportFormat::Mp4, ExportQuality::High, 30.0, true)?;
//! let output = exporter.export(&project, &options, &mut |p| println!("{:.0}%", p * 100.0), &CancelToken::new())?;
//! std::fs::write(output.file_name(&project.name), &output.bytes)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`project`] - Timeline model and frame/sample arithmetic
//! - [`video`] - Source decoding, text rasterization and frame compositing
//! - [`audio`] - Audio decoding and mixing
//! - [`encode`] - Codec parameters and the container writer
//! - [`export`] - Options, job state and the export orchestrator
//! - [`config`] - Configuration management

pub mod audio;
pub mod config;
pub mod encode;
pub mod error;
pub mod export;
pub mod project;
pub mod video;

#[cfg(test)]
mod testing;

pub use crate::{
    config::Config,
    encode::EncodedOutput,
    error::{ExportError, Result},
    export::{CancelToken, ExportConfiguration, ExportHandle, Exporter},
    project::Project,
};
