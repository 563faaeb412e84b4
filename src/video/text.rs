use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use fontdue::{Font, FontSettings};
use image::{ImageBuffer, Rgba, RgbaImage};
use tracing::{debug, warn};

use crate::config::TextConfig;
use crate::error::{ConfigError, Result};
use crate::project::{Canvas, TextAlign, TextStyle};
use crate::video::frame::Frame;

/// Lays out and rasterizes text overlays
pub trait TextRasterizer: Send + Sync {
    /// Render `content` into a tightly sized straight-alpha block
    ///
    /// Color, alignment between lines and the background box are baked in; opacity and
    /// placement on the canvas are applied by the compositor.
    fn rasterize(&self, content: &str, style: &TextStyle) -> Result<RgbaImage>;
}

/// A single rasterized glyph
#[derive(Debug, Clone)]
pub struct Glyph {
    pub xmin: i32,
    /// Offset of the bitmap's bottom edge above the baseline
    pub ymin: i32,
    pub width: usize,
    pub height: usize,
    pub advance: f32,
    /// Row-major coverage, `width * height` bytes
    pub coverage: Vec<u8>,
}

/// Source of glyph shapes and vertical metrics
pub trait GlyphSource {
    /// (ascent, descent) in pixels; descent is negative
    fn line_metrics(&self, px: f32) -> (f32, f32);

    fn glyph(&self, ch: char, px: f32) -> Glyph;

    fn kern(&self, _left: char, _right: char, _px: f32) -> f32 {
        0.0
    }
}

impl GlyphSource for Font {
    fn line_metrics(&self, px: f32) -> (f32, f32) {
        match self.horizontal_line_metrics(px) {
            Some(metrics) => (metrics.ascent, metrics.descent),
            None => (px * 0.8, -px * 0.2),
        }
    }

    fn glyph(&self, ch: char, px: f32) -> Glyph {
        let (metrics, coverage) = self.rasterize(ch, px);
        Glyph {
            xmin: metrics.xmin,
            ymin: metrics.ymin,
            width: metrics.width,
            height: metrics.height,
            advance: metrics.advance_width,
            coverage,
        }
    }

    fn kern(&self, left: char, right: char, px: f32) -> f32 {
        self.horizontal_kern(left, right, px).unwrap_or(0.0)
    }
}

/// Lay out `content` line by line and paint it into a new block
///
/// Lines are split on `\n` and aligned against each other according to
/// `style.align`. A background box, when set, covers the block plus padding.
pub fn layout_block<G: GlyphSource + ?Sized>(
    glyphs: &G,
    content: &str,
    style: &TextStyle,
    line_height: f32,
) -> RgbaImage {
    let px = style.font_size;
    let (ascent, descent) = glyphs.line_metrics(px);
    let line_advance = ((ascent - descent) * line_height).max(1.0);

    let lines: Vec<&str> = content.split('\n').map(|l| l.trim_end_matches('\r')).collect();
    let widths: Vec<f32> = lines.iter().map(|line| line_width(glyphs, line, px)).collect();

    let text_w = widths.iter().cloned().fold(0.0, f32::max).ceil() as u32;
    let text_h = (line_advance * lines.len() as f32).ceil() as u32;
    let pad = if style.background.is_some() {
        (px * 0.25).round() as u32
    } else {
        0
    };

    let width = (text_w + 2 * pad).max(1);
    let height = (text_h + 2 * pad).max(1);
    let mut block = match style.background {
        Some(color) => Frame::new_filled(width, height, color),
        None => Frame::new_transparent(width, height),
    };

    let [r, g, b, a] = style.color;
    for (i, (line, line_w)) in lines.iter().zip(&widths).enumerate() {
        let indent = match style.align {
            TextAlign::Left => 0.0,
            TextAlign::Center => (text_w as f32 - line_w) / 2.0,
            TextAlign::Right => text_w as f32 - line_w,
        };
        let baseline = pad as f32 + i as f32 * line_advance + ascent;

        let mut pen = pad as f32 + indent;
        let mut prev = None;
        for ch in line.chars() {
            if let Some(prev) = prev {
                pen += glyphs.kern(prev, ch, px);
            }
            let glyph = glyphs.glyph(ch, px);
            if glyph.width > 0 && glyph.height > 0 {
                let tinted = ImageBuffer::from_fn(glyph.width as u32, glyph.height as u32, |x, y| {
                    let coverage = glyph.coverage[y as usize * glyph.width + x as usize];
                    Rgba([r, g, b, ((coverage as u16 * a as u16) / 255) as u8])
                });
                let gx = pen.round() as i64 + glyph.xmin as i64;
                let gy = baseline.round() as i64 - (glyph.height as i64 + glyph.ymin as i64);
                block.blend_over(&tinted, gx, gy, 1.0);
            }
            pen += glyph.advance;
            prev = Some(ch);
        }
    }

    block.into_image()
}

fn line_width<G: GlyphSource + ?Sized>(glyphs: &G, line: &str, px: f32) -> f32 {
    let mut width = 0.0;
    let mut prev = None;
    for ch in line.chars() {
        if let Some(prev) = prev {
            width += glyphs.kern(prev, ch, px);
        }
        width += glyphs.glyph(ch, px).advance;
        prev = Some(ch);
    }
    width
}

/// Top-left corner of a text block on the canvas
///
/// `style.x`/`style.y` offset the anchor from the canvas centre. The anchor is the
/// block's left edge, centre or right edge depending on alignment, and always its
/// vertical centre.
pub fn text_origin(canvas: Canvas, style: &TextStyle, width: u32, height: u32) -> (i64, i64) {
    let anchor_x = canvas.width as f64 / 2.0 + style.x as f64;
    let anchor_y = canvas.height as f64 / 2.0 + style.y as f64;

    let left = match style.align {
        TextAlign::Left => anchor_x,
        TextAlign::Center => anchor_x - width as f64 / 2.0,
        TextAlign::Right => anchor_x - width as f64,
    };
    let top = anchor_y - height as f64 / 2.0;
    (left.round() as i64, top.round() as i64)
}

/// Places searched for a default font when none is configured
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Text rasterizer backed by fontdue
///
/// Font files are read on first use and kept for the rasterizer's lifetime.
pub struct FontdueRasterizer {
    default_font: Option<PathBuf>,
    /// Lowercased family name to font file
    families: BTreeMap<String, PathBuf>,
    line_height: f32,
    loaded: Mutex<HashMap<PathBuf, Arc<Font>>>,
    warned: Mutex<HashSet<String>>,
}

impl FontdueRasterizer {
    pub fn from_config(config: &TextConfig) -> Self {
        let families = config
            .fonts
            .iter()
            .map(|(name, path)| (name.to_lowercase(), path.clone()))
            .collect();
        Self {
            default_font: config.default_font.clone(),
            families,
            line_height: config.line_height,
            loaded: Mutex::new(HashMap::new()),
            warned: Mutex::new(HashSet::new()),
        }
    }

    fn default_font_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.default_font {
            return Ok(path.clone());
        }
        SYSTEM_FONT_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_file())
            .ok_or_else(|| {
                ConfigError::MissingKey {
                    key: "text.default_font".to_string(),
                }
                .into()
            })
    }

    /// Font file for a family, falling back to the default for unknown names
    fn resolve(&self, family: Option<&str>) -> Result<PathBuf> {
        let Some(family) = family else {
            return self.default_font_path();
        };
        if let Some(path) = self.families.get(&family.to_lowercase()) {
            return Ok(path.clone());
        }

        let mut warned = self.warned.lock().unwrap_or_else(PoisonError::into_inner);
        if warned.insert(family.to_string()) {
            warn!("Unknown font family '{}', using the default font", family);
        }
        self.default_font_path()
    }

    fn font(&self, path: &Path) -> Result<Arc<Font>> {
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(font) = loaded.get(path) {
            return Ok(Arc::clone(font));
        }

        let invalid = |reason: String| ConfigError::InvalidValue {
            key: "text.font".to_string(),
            value: format!("{}: {}", path.display(), reason),
        };
        let bytes = std::fs::read(path).map_err(|e| invalid(e.to_string()))?;
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(|e| invalid(e.to_string()))?;
        debug!("Loaded font {:?}", path);

        let font = Arc::new(font);
        loaded.insert(path.to_path_buf(), Arc::clone(&font));
        Ok(font)
    }
}

impl TextRasterizer for FontdueRasterizer {
    fn rasterize(&self, content: &str, style: &TextStyle) -> Result<RgbaImage> {
        let path = self.resolve(style.font_family.as_deref())?;
        let font = self.font(&path)?;
        Ok(layout_block(font.as_ref(), content, style, self.line_height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::BoxGlyphs;

    fn style(align: TextAlign) -> TextStyle {
        TextStyle {
            font_size: 10.0,
            align,
            ..TextStyle::default()
        }
    }

    #[test]
    fn test_block_size_follows_longest_line() {
        let block = layout_block(&BoxGlyphs, "ab\nabcd", &style(TextAlign::Left), 1.0);
        // BoxGlyphs: 10px advance per char, ascent 8, descent -2
        assert_eq!(block.dimensions(), (40, 20));
    }

    #[test]
    fn test_lines_are_aligned_within_block() {
        let left = layout_block(&BoxGlyphs, "a\nabcd", &style(TextAlign::Left), 1.0);
        let right = layout_block(&BoxGlyphs, "a\nabcd", &style(TextAlign::Right), 1.0);

        // First line glyph sits at the left edge or at the right edge
        assert_eq!(left.get_pixel(2, 5).0[3], 255);
        assert_eq!(left.get_pixel(32, 5).0[3], 0);
        assert_eq!(right.get_pixel(2, 5).0[3], 0);
        assert_eq!(right.get_pixel(32, 5).0[3], 255);
    }

    #[test]
    fn test_background_box_pads_block() {
        let mut s = style(TextAlign::Center);
        s.background = Some([0, 0, 0, 255]);
        let block = layout_block(&BoxGlyphs, "a", &s, 1.0);

        // Padding of a quarter font size on each side
        assert_eq!(block.dimensions(), (10 + 6, 10 + 6));
        assert_eq!(block.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_text_origin_anchors() {
        let canvas = Canvas::new(100, 50);
        let mut s = style(TextAlign::Center);
        assert_eq!(text_origin(canvas, &s, 20, 10), (40, 20));

        s.align = TextAlign::Left;
        s.x = -30.0;
        assert_eq!(text_origin(canvas, &s, 20, 10), (20, 20));

        s.align = TextAlign::Right;
        s.x = 0.0;
        s.y = 10.0;
        assert_eq!(text_origin(canvas, &s, 20, 10), (30, 30));
    }

    #[test]
    fn test_missing_default_font_is_config_error() {
        let config = TextConfig {
            default_font: Some(PathBuf::from("/nonexistent/font.ttf")),
            ..TextConfig::default()
        };
        let rasterizer = FontdueRasterizer::from_config(&config);
        let err = rasterizer.rasterize("hi", &TextStyle::default()).unwrap_err();
        assert!(matches!(err, crate::error::ExportError::Config(_)));
    }

    #[test]
    fn test_unknown_family_resolves_to_default() {
        let config = TextConfig {
            default_font: Some(PathBuf::from("/fonts/default.ttf")),
            fonts: [("Mono".to_string(), PathBuf::from("/fonts/mono.ttf"))].into_iter().collect(),
            ..TextConfig::default()
        };
        let rasterizer = FontdueRasterizer::from_config(&config);

        assert_eq!(rasterizer.resolve(Some("mono")).unwrap(), PathBuf::from("/fonts/mono.ttf"));
        assert_eq!(rasterizer.resolve(Some("Fancy Script")).unwrap(), PathBuf::from("/fonts/default.ttf"));
        assert_eq!(rasterizer.resolve(None).unwrap(), PathBuf::from("/fonts/default.ttf"));
    }
}
