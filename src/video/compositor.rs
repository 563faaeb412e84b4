use rayon::prelude::*;
use rayon::ThreadPool;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::project::{Canvas, Project};
use crate::video::frame::Frame;
use crate::video::sampler::{ElementSampler, Layer};

/// Produces the composited frame for a timestamp
pub struct FrameCompositor {
    canvas: Canvas,
    background: [u8; 4],
    pool: Arc<ThreadPool>,
}

impl FrameCompositor {
    pub fn new(canvas: Canvas, background: [u8; 4], pool: Arc<ThreadPool>) -> Self {
        Self {
            canvas,
            background,
            pool,
        }
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// Composite every visual element active at `timestamp`
    ///
    /// Layers are sampled in parallel but painted strictly in layering order: track
    /// index, then start time, then position within the track.
    pub fn composite(&self, project: &Project, timestamp: f64, sampler: &ElementSampler) -> Result<Frame> {
        let mut frame = Frame::new_filled(self.canvas.width, self.canvas.height, self.background);

        let active = project.visual_elements_at(timestamp);
        if active.is_empty() {
            return Ok(frame);
        }

        // par_iter keeps input order in the collected Vec
        let layers: Vec<Layer> = self.pool.install(|| {
            active
                .par_iter()
                .map(|element| sampler.visual(element, timestamp))
                .collect::<Result<Vec<_>>>()
        })?;

        for layer in &layers {
            frame.blend_over(&layer.image, layer.x, layer.y, layer.opacity);
        }

        debug!("Composited {} layers at {:.3}s", layers.len(), timestamp);
        Ok(frame)
    }
}
