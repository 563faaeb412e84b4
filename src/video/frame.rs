use image::{imageops, ImageBuffer, Rgba, RgbaImage};

/// A single composited output frame
///
/// Thin wrapper around a straight-alpha RGBA buffer with the blending helpers the
/// compositor needs.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    buffer: RgbaImage,
}

impl Frame {
    /// Create a new frame from an RGBA image buffer
    pub fn new(buffer: RgbaImage) -> Self {
        Self { buffer }
    }

    /// Create a fully transparent frame
    pub fn new_transparent(width: u32, height: u32) -> Self {
        Self { buffer: ImageBuffer::new(width, height) }
    }

    /// Create a frame filled with the given RGBA color
    pub fn new_filled(width: u32, height: u32, color: [u8; 4]) -> Self {
        Self { buffer: ImageBuffer::from_pixel(width, height, Rgba(color)) }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.buffer.get_pixel(x, y).0
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.buffer
    }

    pub fn into_image(self) -> RgbaImage {
        self.buffer
    }

    /// Raw RGBA bytes, row-major, tightly packed
    pub fn as_raw(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Paint `layer` over this frame with its top-left corner at (`x`, `y`)
    ///
    /// Pixels falling outside the frame are clipped. `opacity` scales the layer alpha.
    pub fn blend_over(&mut self, layer: &RgbaImage, x: i64, y: i64, opacity: f32) {
        let opacity = opacity.clamp(0.0, 1.0);
        if opacity == 0.0 {
            return;
        }

        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + layer.width() as i64).min(self.width() as i64);
        let y1 = (y + layer.height() as i64).min(self.height() as i64);

        for dy in y0..y1 {
            for dx in x0..x1 {
                let src = layer.get_pixel((dx - x) as u32, (dy - y) as u32).0;
                let dst = self.buffer.get_pixel_mut(dx as u32, dy as u32);
                dst.0 = over(src, dst.0, opacity);
            }
        }
    }

    /// Fill a rectangle by blending `color` over the existing pixels
    pub fn fill_rect(&mut self, x: i64, y: i64, width: u32, height: u32, color: [u8; 4]) {
        let patch = ImageBuffer::from_pixel(width, height, Rgba(color));
        self.blend_over(&patch, x, y, 1.0);
    }

    /// Flatten onto an opaque background, producing packed RGBA with alpha 255
    pub fn to_opaque_rgba(&self, background: [u8; 3]) -> Vec<u8> {
        let bg = [background[0], background[1], background[2], 255];
        let mut out = Vec::with_capacity(self.buffer.as_raw().len());
        for pixel in self.buffer.pixels() {
            out.extend_from_slice(&over(pixel.0, bg, 1.0));
        }
        out
    }

    /// Save the frame as a PNG file
    pub fn save_png<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), image::ImageError> {
        self.buffer.save(path)
    }
}

/// Straight-alpha source-over
fn over(src: [u8; 4], dst: [u8; 4], opacity: f32) -> [u8; 4] {
    let sa = src[3] as f32 / 255.0 * opacity;
    if sa <= 0.0 {
        return dst;
    }
    if sa >= 1.0 {
        return [src[0], src[1], src[2], 255];
    }

    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    let mut out = [0u8; 4];
    for c in 0..3 {
        let value = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        out[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    out
}

/// Scale `image` to fit inside `width`x`height` preserving aspect ratio
///
/// Returns the scaled image and the offset that centres it in the target box.
pub fn fit_centered(image: &RgbaImage, width: u32, height: u32) -> (RgbaImage, i64, i64) {
    let (src_w, src_h) = image.dimensions();
    if src_w == 0 || src_h == 0 {
        return (RgbaImage::new(0, 0), 0, 0);
    }

    let scale = (width as f64 / src_w as f64).min(height as f64 / src_h as f64);
    let fit_w = ((src_w as f64 * scale).round() as u32).clamp(1, width.max(1));
    let fit_h = ((src_h as f64 * scale).round() as u32).clamp(1, height.max(1));

    let scaled = if (fit_w, fit_h) == (src_w, src_h) {
        image.clone()
    } else {
        imageops::resize(image, fit_w, fit_h, imageops::FilterType::Triangle)
    };

    let x = (width as i64 - fit_w as i64) / 2;
    let y = (height as i64 - fit_h as i64) / 2;
    (scaled, x, y)
}
