//! Glyph atlas for GPU text rendering
//!
//! Caches rasterized glyphs in one packed RGBA texture and maps
//! (codepoint, style, color) to normalized texture coordinates. Glyphs are
//! rasterized on first use only.
//!
//! Packing uses fixed-height shelves of one cell each. When the surface is
//! full the cursor wraps to the origin; every slot remembers its owner so the
//! glyph being overwritten is evicted from the cache instead of keeping
//! coordinates that now point at someone else's pixels.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use super::raster::{AtlasRegion, CellMetrics, GlyphStyle, Rasterizer};
use crate::colors::Rgb;

/// First codepoint served by the fast-path table
const FAST_PATH_FIRST: u32 = 32;
/// Last codepoint served by the fast-path table
const FAST_PATH_LAST: u32 = 126;
const FAST_PATH_LEN: usize = (FAST_PATH_LAST - FAST_PATH_FIRST + 1) as usize;

/// Bytes per atlas pixel (RGBA8)
const BYTES_PER_PIXEL: usize = 4;

/// Advance difference (px) above which a font is reported as proportional
const MONOSPACE_TOLERANCE: f32 = 0.5;

/// Cache key of one glyph image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlyphKey {
    pub ch: char,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub color: Rgb,
}

impl GlyphKey {
    #[must_use]
    pub const fn new(ch: char, bold: bool, italic: bool, underline: bool, color: Rgb) -> Self {
        Self {
            ch,
            bold,
            italic,
            underline,
            color,
        }
    }

    /// Unstyled white glyph
    #[must_use]
    pub const fn plain(ch: char) -> Self {
        Self::new(ch, false, false, false, Rgb::WHITE)
    }

    /// Index into the fast-path table, if this key qualifies
    fn fast_index(&self) -> Option<usize> {
        if self.bold || self.italic || self.underline || self.color != Rgb::WHITE {
            return None;
        }
        fast_index(self.ch)
    }

    fn style(&self) -> GlyphStyle {
        GlyphStyle {
            bold: self.bold,
            italic: self.italic,
            underline: self.underline,
            color: self.color,
        }
    }
}

fn fast_index(ch: char) -> Option<usize> {
    let code = ch as u32;
    if (FAST_PATH_FIRST..=FAST_PATH_LAST).contains(&code) {
        Some((code - FAST_PATH_FIRST) as usize)
    } else {
        None
    }
}

/// Normalized texture rectangle of a cached glyph
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct GlyphRect {
    pub u1: f32,
    pub v1: f32,
    pub u2: f32,
    pub v2: f32,
}

impl GlyphRect {
    #[must_use]
    pub fn to_array(self) -> [f32; 4] {
        [self.u1, self.v1, self.u2, self.v2]
    }
}

/// Cache and packing counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct AtlasStats {
    pub hits: u64,
    pub misses: u64,
    /// Hits served by the ASCII table without building a key
    pub fast_path_hits: u64,
    pub evictions: u64,
    pub cached_glyphs: usize,
    pub capacity: usize,
    /// Occupied slots / total slots
    pub utilization: f64,
    /// Whether the packing cursor has wrapped at least once
    pub has_filled: bool,
}

/// Timing split of the general lookup path, collected when profiling is on
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ProfileStats {
    pub key_build: Duration,
    pub lookup: Duration,
    pub samples: u64,
}

impl ProfileStats {
    /// Mean key construction time per lookup
    #[must_use]
    pub fn avg_key_build(&self) -> Duration {
        self.key_build
            .checked_div(u32::try_from(self.samples).unwrap_or(u32::MAX))
            .unwrap_or_default()
    }

    /// Mean hash lookup time per lookup
    #[must_use]
    pub fn avg_lookup(&self) -> Duration {
        self.lookup
            .checked_div(u32::try_from(self.samples).unwrap_or(u32::MAX))
            .unwrap_or_default()
    }
}

/// Atlas construction errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AtlasError {
    #[error("Atlas dimensions must be non-zero (got {0}x{1})")]
    EmptyAtlas(u32, u32),
    #[error("Rasterizer reported unusable cell metrics {width}x{height}")]
    InvalidMetrics { width: u32, height: u32 },
    #[error("Cell {cell_width}x{cell_height} does not fit in a {atlas_width}x{atlas_height} atlas")]
    CellTooLarge {
        cell_width: u32,
        cell_height: u32,
        atlas_width: u32,
        atlas_height: u32,
    },
}

/// Packed glyph texture with its lookup cache
pub struct GlyphAtlas<R: Rasterizer> {
    rasterizer: R,
    width: u32,
    height: u32,
    metrics: CellMetrics,
    /// RGBA8 pixels, row-major
    pixels: Vec<u8>,
    glyphs: HashMap<GlyphKey, GlyphRect>,
    fast_path: [Option<GlyphRect>; FAST_PATH_LEN],
    /// Key occupying each cell-sized slot
    slot_owners: Vec<Option<GlyphKey>>,
    slots_per_row: u32,
    cursor_x: u32,
    cursor_y: u32,
    shelf_height: u32,
    has_filled: bool,
    dirty: Option<AtlasRegion>,
    hits: u64,
    misses: u64,
    fast_path_hits: u64,
    evictions: u64,
    profiling: bool,
    profile: ProfileStats,
}

impl<R: Rasterizer> GlyphAtlas<R> {
    /// Create an empty atlas of `width` x `height` pixels
    pub fn new(mut rasterizer: R, width: u32, height: u32) -> Result<Self, AtlasError> {
        if width == 0 || height == 0 {
            return Err(AtlasError::EmptyAtlas(width, height));
        }

        let metrics = rasterizer.metrics();
        if metrics.width == 0 || metrics.height == 0 {
            return Err(AtlasError::InvalidMetrics {
                width: metrics.width,
                height: metrics.height,
            });
        }
        if metrics.width > width || metrics.height > height {
            return Err(AtlasError::CellTooLarge {
                cell_width: metrics.width,
                cell_height: metrics.height,
                atlas_width: width,
                atlas_height: height,
            });
        }

        let narrow = rasterizer.measure_width('i');
        let wide = rasterizer.measure_width('M');
        if (wide - narrow).abs() > MONOSPACE_TOLERANCE {
            warn!(
                "Font does not look monospace ('i' = {narrow:.1}px, 'M' = {wide:.1}px); glyphs will be clipped to {}px cells",
                metrics.width
            );
        }

        let slots_per_row = width / metrics.width;
        let slot_rows = height / metrics.height;
        let capacity = (slots_per_row * slot_rows) as usize;

        debug!(
            "Glyph atlas {}x{} with {}x{} cells ({} slots)",
            width, height, metrics.width, metrics.height, capacity
        );

        Ok(Self {
            rasterizer,
            width,
            height,
            metrics,
            pixels: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
            glyphs: HashMap::with_capacity(256),
            fast_path: [None; FAST_PATH_LEN],
            slot_owners: vec![None; capacity],
            slots_per_row,
            cursor_x: 0,
            cursor_y: 0,
            shelf_height: 0,
            has_filled: false,
            dirty: None,
            hits: 0,
            misses: 0,
            fast_path_hits: 0,
            evictions: 0,
            profiling: false,
            profile: ProfileStats::default(),
        })
    }

    /// Texture coordinates for a styled character, rasterizing on first use
    pub fn get_glyph(&mut self, ch: char, bold: bool, italic: bool, underline: bool, color: Rgb) -> GlyphRect {
        if !bold && !italic && !underline && color == Rgb::WHITE {
            if let Some(rect) = fast_index(ch).and_then(|idx| self.fast_path[idx]) {
                self.hits += 1;
                self.fast_path_hits += 1;
                return rect;
            }
        }

        let key = if self.profiling {
            let start = Instant::now();
            let key = GlyphKey::new(ch, bold, italic, underline, color);
            self.profile.key_build += start.elapsed();
            key
        } else {
            GlyphKey::new(ch, bold, italic, underline, color)
        };
        self.lookup_key(key)
    }

    /// General path: one cache lookup by composite key
    pub fn lookup_key(&mut self, key: GlyphKey) -> GlyphRect {
        let cached = if self.profiling {
            let start = Instant::now();
            let cached = self.glyphs.get(&key).copied();
            self.profile.lookup += start.elapsed();
            self.profile.samples += 1;
            cached
        } else {
            self.glyphs.get(&key).copied()
        };

        match cached {
            Some(rect) => {
                self.hits += 1;
                rect
            }
            None => {
                self.misses += 1;
                self.render_glyph(key)
            }
        }
    }

    /// Whether `key` is currently cached
    #[must_use]
    pub fn contains(&self, key: &GlyphKey) -> bool {
        self.glyphs.contains_key(key)
    }

    /// Cache miss: reserve a slot, rasterize into it and record the entry
    fn render_glyph(&mut self, key: GlyphKey) -> GlyphRect {
        let region = self.allocate_slot();
        self.evict_slot_owner(region);

        let bitmap = self.rasterizer.draw_char(region, key.ch, key.style());
        if bitmap.width != region.width || bitmap.height != region.height {
            debug!(
                "Rasterizer returned {}x{} bitmap for {:?} in a {}x{} cell",
                bitmap.width, bitmap.height, key.ch, region.width, region.height
            );
        }
        self.blit(region, &bitmap.data, bitmap.width, bitmap.height);

        let rect = self.normalize(region);
        self.glyphs.insert(key, rect);
        if let Some(idx) = key.fast_index() {
            self.fast_path[idx] = Some(rect);
        }
        let slot = self.slot_index(region);
        if let Some(owner) = self.slot_owners.get_mut(slot) {
            *owner = Some(key);
        }
        rect
    }

    /// Advance the shelf cursor by one cell, wrapping rows and then the atlas
    fn allocate_slot(&mut self) -> AtlasRegion {
        let CellMetrics { width, height, .. } = self.metrics;

        if self.cursor_x + width > self.width {
            self.cursor_x = 0;
            self.cursor_y += self.shelf_height;
            self.shelf_height = 0;
        }
        if self.cursor_y + height > self.height {
            warn!(
                "Glyph atlas full ({} glyphs cached), wrapping to origin and evicting oldest glyphs",
                self.glyphs.len()
            );
            self.cursor_x = 0;
            self.cursor_y = 0;
            self.shelf_height = 0;
            self.has_filled = true;
        }

        let region = AtlasRegion {
            x: self.cursor_x,
            y: self.cursor_y,
            width,
            height,
        };
        self.cursor_x += width;
        self.shelf_height = self.shelf_height.max(height);
        region
    }

    fn slot_index(&self, region: AtlasRegion) -> usize {
        let col = region.x / self.metrics.width;
        let row = region.y / self.metrics.height;
        (row * self.slots_per_row + col) as usize
    }

    fn evict_slot_owner(&mut self, region: AtlasRegion) {
        let slot = self.slot_index(region);
        let Some(previous) = self.slot_owners.get_mut(slot).and_then(Option::take) else {
            return;
        };

        self.glyphs.remove(&previous);
        if let Some(idx) = previous.fast_index() {
            self.fast_path[idx] = None;
        }
        self.evictions += 1;
        debug!("Evicted glyph {:?} from atlas slot {}", previous.ch, slot);
    }

    /// Copy a bitmap into `region`, clipping or zero-padding to the region size
    fn blit(&mut self, region: AtlasRegion, data: &[u8], src_width: u32, src_height: u32) {
        let expected = src_width as usize * src_height as usize * BYTES_PER_PIXEL;
        let (src_width, src_height) = if data.len() < expected {
            debug!("Discarding truncated glyph bitmap ({} < {} bytes)", data.len(), expected);
            (0, 0)
        } else {
            (src_width, src_height)
        };

        let row_bytes = region.width as usize * BYTES_PER_PIXEL;
        let copy_bytes = src_width.min(region.width) as usize * BYTES_PER_PIXEL;
        let src_stride = src_width as usize * BYTES_PER_PIXEL;
        let atlas_stride = self.width as usize * BYTES_PER_PIXEL;

        for row in 0..region.height as usize {
            let dst_start = (region.y as usize + row) * atlas_stride + region.x as usize * BYTES_PER_PIXEL;
            let dst = &mut self.pixels[dst_start..dst_start + row_bytes];
            if row < src_height as usize {
                let src_start = row * src_stride;
                dst[..copy_bytes].copy_from_slice(&data[src_start..src_start + copy_bytes]);
                dst[copy_bytes..].fill(0);
            } else {
                dst.fill(0);
            }
        }

        self.mark_dirty(region);
    }

    fn normalize(&self, region: AtlasRegion) -> GlyphRect {
        let (w, h) = (self.width as f32, self.height as f32);
        GlyphRect {
            u1: region.x as f32 / w,
            v1: region.y as f32 / h,
            u2: (region.x + region.width) as f32 / w,
            v2: (region.y + region.height) as f32 / h,
        }
    }

    fn mark_dirty(&mut self, region: AtlasRegion) {
        self.dirty = Some(match self.dirty {
            None => region,
            Some(d) => {
                let x = d.x.min(region.x);
                let y = d.y.min(region.y);
                let right = (d.x + d.width).max(region.x + region.width);
                let bottom = (d.y + d.height).max(region.y + region.height);
                AtlasRegion {
                    x,
                    y,
                    width: right - x,
                    height: bottom - y,
                }
            }
        });
    }

    /// Horizontal advance of `ch` as reported by the rasterizer
    pub fn measure_glyph_width(&mut self, ch: char) -> f32 {
        self.rasterizer.measure_width(ch)
    }

    /// Drop every cached glyph and reset packing (font or size change)
    pub fn clear(&mut self) {
        self.glyphs.clear();
        self.fast_path = [None; FAST_PATH_LEN];
        self.slot_owners.fill(None);
        self.cursor_x = 0;
        self.cursor_y = 0;
        self.shelf_height = 0;
        self.has_filled = false;
        self.pixels.fill(0);
        self.mark_all_dirty();
        debug!("Glyph atlas cleared");
    }

    #[must_use]
    pub fn stats(&self) -> AtlasStats {
        let capacity = self.capacity();
        AtlasStats {
            hits: self.hits,
            misses: self.misses,
            fast_path_hits: self.fast_path_hits,
            evictions: self.evictions,
            cached_glyphs: self.glyphs.len(),
            capacity,
            utilization: if capacity == 0 {
                0.0
            } else {
                self.glyphs.len() as f64 / capacity as f64
            },
            has_filled: self.has_filled,
        }
    }

    /// Toggle timing of key construction vs. cache lookup
    pub fn set_profiling(&mut self, enabled: bool) {
        self.profiling = enabled;
        if enabled {
            self.profile = ProfileStats::default();
        }
    }

    #[must_use]
    pub fn is_profiling(&self) -> bool {
        self.profiling
    }

    #[must_use]
    pub fn profile(&self) -> ProfileStats {
        self.profile
    }

    /// Number of glyph slots
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slot_owners.len()
    }

    /// Number of cached glyphs
    #[must_use]
    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    #[must_use]
    pub fn has_filled(&self) -> bool {
        self.has_filled
    }

    /// Position of the next free slot
    #[must_use]
    pub fn cursor(&self) -> (u32, u32) {
        (self.cursor_x, self.cursor_y)
    }

    #[must_use]
    pub fn metrics(&self) -> CellMetrics {
        self.metrics
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// RGBA8 atlas pixels, row-major
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    /// Bounding box of pixels changed since the last upload
    #[must_use]
    pub fn dirty_region(&self) -> Option<AtlasRegion> {
        self.dirty
    }

    /// Dirty bounding box, resetting it
    pub fn take_dirty_region(&mut self) -> Option<AtlasRegion> {
        self.dirty.take()
    }

    pub fn mark_all_dirty(&mut self) {
        self.dirty = Some(AtlasRegion {
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
        });
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = None;
    }

    #[must_use]
    pub fn rasterizer(&self) -> &R {
        &self.rasterizer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::raster::GlyphBitmap;

    /// Draws a solid block and records every call
    struct BlockRasterizer {
        metrics: CellMetrics,
        drawn: Vec<(char, GlyphStyle)>,
    }

    impl BlockRasterizer {
        fn new(width: u32, height: u32) -> Self {
            Self {
                metrics: CellMetrics {
                    width,
                    height,
                    baseline: height.saturating_sub(2),
                },
                drawn: Vec::new(),
            }
        }

        fn draw_count(&self, ch: char) -> usize {
            self.drawn.iter().filter(|(c, _)| *c == ch).count()
        }
    }

    impl Rasterizer for BlockRasterizer {
        fn metrics(&self) -> CellMetrics {
            self.metrics
        }

        fn draw_char(&mut self, region: AtlasRegion, ch: char, style: GlyphStyle) -> GlyphBitmap {
            self.drawn.push((ch, style));
            let coverage = vec![255; (region.width * region.height) as usize];
            GlyphBitmap::from_coverage(region.width, region.height, &coverage, style.color)
        }

        fn measure_width(&mut self, _ch: char) -> f32 {
            self.metrics.width as f32
        }
    }

    fn atlas(width: u32, height: u32) -> GlyphAtlas<BlockRasterizer> {
        GlyphAtlas::new(BlockRasterizer::new(8, 16), width, height).unwrap()
    }

    #[test]
    fn test_repeated_lookup_rasterizes_once() {
        let mut atlas = atlas(256, 256);
        let first = atlas.get_glyph('x', true, false, true, Rgb::new(1, 2, 3));
        let second = atlas.get_glyph('x', true, false, true, Rgb::new(1, 2, 3));

        assert_eq!(first, second);
        assert_eq!(atlas.rasterizer().draw_count('x'), 1);
        let stats = atlas.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_style_and_color_are_distinct_keys() {
        let mut atlas = atlas(256, 256);
        let plain = atlas.get_glyph('a', false, false, false, Rgb::WHITE);
        let bold = atlas.get_glyph('a', true, false, false, Rgb::WHITE);
        let red = atlas.get_glyph('a', false, false, false, Rgb::new(255, 0, 0));

        assert_ne!(plain, bold);
        assert_ne!(plain, red);
        assert_eq!(atlas.len(), 3);
    }

    #[test]
    fn test_fast_path_serves_plain_ascii() {
        let mut atlas = atlas(256, 256);
        atlas.get_glyph('A', false, false, false, Rgb::WHITE);
        atlas.get_glyph('A', false, false, false, Rgb::WHITE);

        assert_eq!(atlas.stats().fast_path_hits, 1);
        assert_eq!(atlas.rasterizer().draw_count('A'), 1);
    }

    #[test]
    fn test_fast_and_general_paths_agree() {
        let mut atlas = atlas(1024, 1024);
        for code in 32u8..=126 {
            let ch = char::from(code);
            let fast = atlas.get_glyph(ch, false, false, false, Rgb::WHITE);
            let general = atlas.lookup_key(GlyphKey::plain(ch));
            assert_eq!(fast, general, "mismatch for {ch:?}");
        }
        assert_eq!(atlas.len(), 95);
    }

    #[test]
    fn test_non_ascii_skips_fast_path() {
        let mut atlas = atlas(256, 256);
        atlas.get_glyph('é', false, false, false, Rgb::WHITE);
        atlas.get_glyph('é', false, false, false, Rgb::WHITE);
        assert_eq!(atlas.stats().fast_path_hits, 0);
        assert_eq!(atlas.stats().hits, 1);
    }

    #[test]
    fn test_uv_is_normalized_cell_rect() {
        let mut atlas = atlas(64, 32);
        let first = atlas.get_glyph('a', false, false, false, Rgb::WHITE);
        assert_eq!(first, GlyphRect { u1: 0.0, v1: 0.0, u2: 0.125, v2: 0.5 });

        let second = atlas.get_glyph('b', false, false, false, Rgb::WHITE);
        assert_eq!(second, GlyphRect { u1: 0.125, v1: 0.0, u2: 0.25, v2: 0.5 });
    }

    #[test]
    fn test_shelf_wraps_to_next_row() {
        // 2 slots per row, 2 rows
        let mut atlas = atlas(16, 32);
        atlas.get_glyph('a', false, false, false, Rgb::WHITE);
        atlas.get_glyph('b', false, false, false, Rgb::WHITE);
        let third = atlas.get_glyph('c', false, false, false, Rgb::WHITE);

        assert_eq!(third.u1, 0.0);
        assert_eq!(third.v1, 0.5);
        assert_eq!(atlas.cursor(), (8, 16));
        assert!(!atlas.has_filled());
    }

    #[test]
    fn test_exhaustion_wraps_to_origin() {
        let mut atlas = atlas(16, 32);
        assert_eq!(atlas.capacity(), 4);
        for ch in ['a', 'b', 'c', 'd'] {
            atlas.get_glyph(ch, false, false, false, Rgb::WHITE);
        }
        assert!(!atlas.has_filled());

        let wrapped = atlas.get_glyph('e', false, false, false, Rgb::WHITE);
        assert_eq!((wrapped.u1, wrapped.v1), (0.0, 0.0));
        assert_eq!(atlas.cursor(), (8, 0));
        assert!(atlas.has_filled());
        assert!(atlas.stats().has_filled);
    }

    #[test]
    fn test_wraparound_evicts_overwritten_glyph() {
        let mut atlas = atlas(16, 32);
        for ch in ['a', 'b', 'c', 'd', 'e'] {
            atlas.get_glyph(ch, false, false, false, Rgb::WHITE);
        }

        assert!(!atlas.contains(&GlyphKey::plain('a')));
        assert!(atlas.contains(&GlyphKey::plain('e')));
        assert_eq!(atlas.stats().evictions, 1);
        assert_eq!(atlas.len(), 4);

        // 'a' comes back through a fresh rasterization, evicting 'b'
        atlas.get_glyph('a', false, false, false, Rgb::WHITE);
        assert_eq!(atlas.rasterizer().draw_count('a'), 2);
        assert!(!atlas.contains(&GlyphKey::plain('b')));
    }

    #[test]
    fn test_glyph_pixels_written() {
        let mut atlas = atlas(16, 16);
        atlas.get_glyph('a', false, false, false, Rgb::new(9, 8, 7));
        let px = &atlas.pixels()[0..4];
        assert_eq!(px, &[9, 8, 7, 255]);
        // second slot untouched
        let offset = 8 * 4;
        assert_eq!(&atlas.pixels()[offset..offset + 4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_dirty_region_tracks_new_glyphs() {
        let mut atlas = atlas(64, 64);
        assert!(!atlas.is_dirty());

        atlas.get_glyph('a', false, false, false, Rgb::WHITE);
        atlas.get_glyph('b', false, false, false, Rgb::WHITE);
        assert_eq!(
            atlas.dirty_region(),
            Some(AtlasRegion { x: 0, y: 0, width: 16, height: 16 })
        );

        atlas.clear_dirty();
        atlas.get_glyph('a', false, false, false, Rgb::WHITE);
        assert!(!atlas.is_dirty());

        atlas.get_glyph('c', false, false, false, Rgb::WHITE);
        assert_eq!(
            atlas.take_dirty_region(),
            Some(AtlasRegion { x: 16, y: 0, width: 8, height: 16 })
        );
        assert_eq!(atlas.take_dirty_region(), None);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut atlas = atlas(16, 32);
        for ch in ['a', 'b', 'c', 'd', 'e'] {
            atlas.get_glyph(ch, false, false, false, Rgb::WHITE);
        }
        atlas.clear();

        assert!(atlas.is_empty());
        assert_eq!(atlas.cursor(), (0, 0));
        assert!(!atlas.has_filled());
        assert!(atlas.pixels().iter().all(|&b| b == 0));
        assert_eq!(
            atlas.dirty_region(),
            Some(AtlasRegion { x: 0, y: 0, width: 16, height: 32 })
        );

        // fast path table dropped too
        atlas.get_glyph('e', false, false, false, Rgb::WHITE);
        assert_eq!(atlas.rasterizer().draw_count('e'), 2);
    }

    #[test]
    fn test_profiling_collects_samples() {
        let mut atlas = atlas(256, 256);
        atlas.set_profiling(true);
        atlas.get_glyph('a', true, false, false, Rgb::WHITE);
        atlas.get_glyph('a', true, false, false, Rgb::WHITE);

        let profile = atlas.profile();
        assert_eq!(profile.samples, 2);
        assert!(atlas.is_profiling());

        atlas.set_profiling(false);
        atlas.get_glyph('b', true, false, false, Rgb::WHITE);
        assert_eq!(atlas.profile().samples, 2);
    }

    #[test]
    fn test_utilization() {
        let mut atlas = atlas(16, 32);
        atlas.get_glyph('a', false, false, false, Rgb::WHITE);
        assert!((atlas.stats().utilization - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_construction_errors() {
        assert_eq!(
            GlyphAtlas::new(BlockRasterizer::new(8, 16), 0, 16).err(),
            Some(AtlasError::EmptyAtlas(0, 16))
        );
        assert_eq!(
            GlyphAtlas::new(BlockRasterizer::new(0, 16), 64, 64).err(),
            Some(AtlasError::InvalidMetrics { width: 0, height: 16 })
        );
        assert!(matches!(
            GlyphAtlas::new(BlockRasterizer::new(8, 16), 4, 64),
            Err(AtlasError::CellTooLarge { .. })
        ));
    }

    #[test]
    fn test_mis_sized_bitmap_is_clipped() {
        struct Oversized;
        impl Rasterizer for Oversized {
            fn metrics(&self) -> CellMetrics {
                CellMetrics { width: 2, height: 2, baseline: 1 }
            }
            fn draw_char(&mut self, _region: AtlasRegion, _ch: char, style: GlyphStyle) -> GlyphBitmap {
                GlyphBitmap::from_coverage(3, 1, &[255, 255, 255], style.color)
            }
            fn measure_width(&mut self, _ch: char) -> f32 {
                2.0
            }
        }

        let mut atlas = GlyphAtlas::new(Oversized, 4, 2).unwrap();
        atlas.get_glyph('a', false, false, false, Rgb::WHITE);
        let stride = 4 * 4;
        // row 0: two covered pixels, third column belongs to the next slot
        assert_eq!(atlas.pixels()[3], 255);
        assert_eq!(atlas.pixels()[7], 255);
        assert_eq!(atlas.pixels()[11], 0);
        // row 1 padded
        assert_eq!(atlas.pixels()[stride + 3], 0);
    }
}
