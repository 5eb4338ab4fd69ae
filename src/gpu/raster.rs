//! Glyph rasterization capability
//!
//! The atlas only needs two things from a font stack: fixed cell metrics and
//! a way to draw one styled character into a cell-sized bitmap.

use crate::colors::Rgb;

/// Pixel metrics of one monospace cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellMetrics {
    pub width: u32,
    pub height: u32,
    /// Distance from the top of the cell to the baseline
    pub baseline: u32,
}

/// Pixel rectangle inside the atlas reserved for one glyph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Style attributes that change a glyph's pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlyphStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub color: Rgb,
}

impl Default for GlyphStyle {
    fn default() -> Self {
        Self {
            bold: false,
            italic: false,
            underline: false,
            color: Rgb::WHITE,
        }
    }
}

/// RGBA8 bitmap, row-major, alpha carries glyph coverage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphBitmap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl GlyphBitmap {
    /// Fully transparent bitmap
    #[must_use]
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width * height * 4) as usize],
        }
    }

    /// Build from an 8-bit coverage mask tinted with `color`
    #[must_use]
    pub fn from_coverage(width: u32, height: u32, coverage: &[u8], color: Rgb) -> Self {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for i in 0..(width * height) as usize {
            let alpha = coverage.get(i).copied().unwrap_or(0);
            data.extend_from_slice(&[color.r(), color.g(), color.b(), alpha]);
        }
        Self { width, height, data }
    }

    /// Alpha value at (`x`, `y`), zero outside the bitmap
    #[must_use]
    pub fn alpha(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.data
            .get(((y * self.width + x) * 4 + 3) as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Whether every pixel is transparent
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.data.chunks_exact(4).all(|px| px[3] == 0)
    }
}

/// Font backend used by the glyph atlas
///
/// `draw_char` must not fail: a glyph the font cannot render yields a blank
/// bitmap. The returned bitmap should match the region size; the atlas clips
/// or pads anything else.
pub trait Rasterizer {
    fn metrics(&self) -> CellMetrics;

    fn draw_char(&mut self, region: AtlasRegion, ch: char, style: GlyphStyle) -> GlyphBitmap;

    /// Horizontal advance of `ch` in pixels
    fn measure_width(&mut self, ch: char) -> f32;
}

impl<R: Rasterizer + ?Sized> Rasterizer for Box<R> {
    fn metrics(&self) -> CellMetrics {
        (**self).metrics()
    }

    fn draw_char(&mut self, region: AtlasRegion, ch: char, style: GlyphStyle) -> GlyphBitmap {
        (**self).draw_char(region, ch, style)
    }

    fn measure_width(&mut self, ch: char) -> f32 {
        (**self).measure_width(ch)
    }
}
