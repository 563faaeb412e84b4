//! # Video Module
//!
//! Everything that ends up as pixels in an output frame: source decoders, text
//! rasterization, per-element sampling and layer compositing.

pub mod compositor;
pub mod decoder;
pub mod frame;
pub mod sampler;
pub mod text;

pub use compositor::FrameCompositor;
pub use decoder::{FfmpegMediaBackend, MediaBackend, SourceMetadata, VideoSource};
pub use frame::Frame;
pub use sampler::{AudioWindow, ElementSampler, Layer};
pub use text::{FontdueRasterizer, TextRasterizer};
