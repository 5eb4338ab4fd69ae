//! Glyph rasterization with fontdue
//!
//! Produces cell-sized RGBA bitmaps for the atlas. Bold and italic are
//! synthesized (one-pixel smear, horizontal shear) so a single regular face
//! covers every style. Underline is left to the cell shader.

use std::path::Path;

use fontdue::{Font, FontSettings};
use tracing::debug;

use super::raster::{AtlasRegion, CellMetrics, GlyphBitmap, GlyphStyle, Rasterizer};

/// Horizontal shift per pixel of height above the baseline for synthetic italic
const ITALIC_SLANT: f32 = 0.2;

/// Font loading errors
#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("Failed to read font file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse font: {0}")]
    Parse(String),
    #[error("Font has no horizontal line metrics")]
    NoLineMetrics,
    #[error("Font size must be positive (got {0})")]
    InvalidSize(f32),
}

/// [`Rasterizer`] backed by a single fontdue face
pub struct FontdueRasterizer {
    font: Font,
    size: f32,
    metrics: CellMetrics,
}

impl FontdueRasterizer {
    /// Parse `bytes` and derive cell metrics at `size` pixels
    pub fn from_bytes(bytes: &[u8], size: f32) -> Result<Self, FontError> {
        if !(size > 0.0) {
            return Err(FontError::InvalidSize(size));
        }

        let font = Font::from_bytes(
            bytes,
            FontSettings {
                scale: size,
                ..FontSettings::default()
            },
        )
        .map_err(|e| FontError::Parse(e.to_string()))?;

        let line = font
            .horizontal_line_metrics(size)
            .ok_or(FontError::NoLineMetrics)?;
        let advance = font.metrics('M', size).advance_width;

        let metrics = CellMetrics {
            width: advance.ceil().max(1.0) as u32,
            height: line.new_line_size.ceil().max(1.0) as u32,
            baseline: line.ascent.ceil().max(0.0) as u32,
        };
        debug!(
            "Loaded font at {}px: cell {}x{}, baseline {}",
            size, metrics.width, metrics.height, metrics.baseline
        );

        Ok(Self { font, size, metrics })
    }

    pub fn from_file(path: impl AsRef<Path>, size: f32) -> Result<Self, FontError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes, size)
    }

    /// Force a cell size, e.g. from configuration
    #[must_use]
    pub fn with_cell_size(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        if let Some(width) = width.filter(|w| *w > 0) {
            self.metrics.width = width;
        }
        if let Some(height) = height.filter(|h| *h > 0) {
            self.metrics.baseline = self.metrics.baseline.min(height);
            self.metrics.height = height;
        }
        self
    }

    #[must_use]
    pub fn size(&self) -> f32 {
        self.size
    }
}

impl Rasterizer for FontdueRasterizer {
    fn metrics(&self) -> CellMetrics {
        self.metrics
    }

    fn draw_char(&mut self, region: AtlasRegion, ch: char, style: GlyphStyle) -> GlyphBitmap {
        let (width, height) = (region.width as i32, region.height as i32);
        if ch != ' ' && self.font.lookup_glyph_index(ch) == 0 {
            debug!("No glyph for {:?} (U+{:04X}), caching blank", ch, ch as u32);
            return GlyphBitmap::blank(region.width, region.height);
        }

        let (glyph, raster) = self.font.rasterize(ch, self.size);
        let mut coverage = vec![0u8; (region.width * region.height) as usize];
        let baseline = self.metrics.baseline as i32;
        let top = baseline - (glyph.ymin + glyph.height as i32);

        for gy in 0..glyph.height {
            let y = top + gy as i32;
            if !(0..height).contains(&y) {
                continue;
            }
            let shift = if style.italic {
                ((baseline - y) as f32 * ITALIC_SLANT).round() as i32
            } else {
                0
            };

            for gx in 0..glyph.width {
                let value = raster[gy * glyph.width + gx];
                if value == 0 {
                    continue;
                }
                let x = glyph.xmin + gx as i32 + shift;
                let smear = if style.bold { 1 } else { 0 };
                for px in x..=x + smear {
                    if (0..width).contains(&px) {
                        let idx = (y * width + px) as usize;
                        coverage[idx] = coverage[idx].max(value);
                    }
                }
            }
        }

        GlyphBitmap::from_coverage(region.width, region.height, &coverage, style.color)
    }

    fn measure_width(&mut self, ch: char) -> f32 {
        self.font.metrics(ch, self.size).advance_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_garbage_bytes() {
        let result = FontdueRasterizer::from_bytes(&[0, 1, 2, 3], 14.0);
        assert!(matches!(result, Err(FontError::Parse(_))));
    }

    #[test]
    fn test_rejects_bad_size() {
        let result = FontdueRasterizer::from_bytes(&[], 0.0);
        assert!(matches!(result, Err(FontError::InvalidSize(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = FontdueRasterizer::from_file("/nonexistent/font.ttf", 14.0);
        assert!(matches!(result, Err(FontError::Io(_))));
    }
}
