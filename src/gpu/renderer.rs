//! Instanced cell renderer
//!
//! Draws the whole visible grid with one instanced draw call per frame: a unit
//! quad is reused for every cell and each cell contributes one
//! [`CellInstance`]. The instance array is rebuilt from scratch every frame, so
//! its length always equals rows x cols no matter how little changed.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use super::atlas::GlyphAtlas;
use super::backend::GpuBackend;
use super::instance::{CellInstance, Uniforms, QUAD_VERTEX_COUNT};
use super::raster::{AtlasRegion, Rasterizer};
use crate::colors::Rgb;
use crate::grid::{CellFlags, CellGrid};

/// Renderer counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct RendererStats {
    /// Frames rendered
    pub frames: u64,
    /// Instances drawn in the last frame
    pub last_instance_count: usize,
    /// Draw calls issued in the last frame
    pub last_draw_calls: u32,
    pub total_draw_calls: u64,
    /// Atlas texture uploads
    pub atlas_uploads: u64,
    pub atlas_bytes_uploaded: u64,
    /// CPU time spent in the last `render` call
    pub last_frame_time: Duration,
}

/// GPU-accelerated terminal renderer
pub struct InstancedRenderer<B: GpuBackend, R: Rasterizer> {
    backend: B,
    atlas: GlyphAtlas<R>,
    /// Reused instance array, rebuilt every frame
    instances: Vec<CellInstance>,
    /// Records the backend's instance buffer was sized for
    instance_capacity: usize,
    uniforms: Uniforms,
    viewport: (u32, u32),
    clear_color: Rgb,
    stats: RendererStats,
    destroyed: bool,
}

impl<B: GpuBackend, R: Rasterizer> InstancedRenderer<B, R> {
    /// Set up buffers for a `rows` x `cols` grid drawn into a `viewport`-sized target
    pub fn new(mut backend: B, mut atlas: GlyphAtlas<R>, rows: usize, cols: usize, viewport: (u32, u32)) -> Self {
        let capacity = rows * cols;
        backend.allocate_instances(capacity);

        let metrics = atlas.metrics();
        let uniforms = Uniforms::new(
            [metrics.width as f32, metrics.height as f32],
            [viewport.0 as f32, viewport.1 as f32],
        );
        backend.set_uniforms(&uniforms);
        backend.set_viewport(viewport.0, viewport.1);

        // first frame uploads the whole texture
        atlas.mark_all_dirty();

        info!(
            "Instanced renderer ready: {}x{} grid, {}x{} viewport",
            cols, rows, viewport.0, viewport.1
        );

        Self {
            backend,
            atlas,
            instances: Vec::with_capacity(capacity),
            instance_capacity: capacity,
            uniforms,
            viewport,
            clear_color: Rgb::BLACK,
            stats: RendererStats::default(),
            destroyed: false,
        }
    }

    /// Render a frame
    ///
    /// `full_render` forces the whole atlas texture to be re-uploaded instead
    /// of only the region touched by new glyphs.
    pub fn render<G: CellGrid + ?Sized>(&mut self, grid: &mut G, full_render: bool) -> Result<(), RenderError> {
        if self.destroyed {
            return Err(RenderError::Destroyed);
        }
        let start_time = Instant::now();

        let (rows, cols) = (grid.rows(), grid.cols());
        let count = rows * cols;
        if count != self.instance_capacity {
            debug!("Grid is now {}x{}, reallocating instance buffer", cols, rows);
            self.backend.allocate_instances(count);
            self.instance_capacity = count;
        }

        self.instances.clear();
        for y in 0..rows {
            for x in 0..cols {
                let cell = grid.cell(x, y);
                let uv = self.atlas.get_glyph(
                    cell.ch,
                    cell.flags.contains(CellFlags::BOLD),
                    cell.flags.contains(CellFlags::ITALIC),
                    cell.flags.contains(CellFlags::UNDERLINE),
                    cell.fg,
                );
                self.instances.push(CellInstance::new(x, y, &cell, uv));
            }
        }

        self.upload_atlas(full_render);
        self.backend.upload_instances(&self.instances);
        self.backend
            .draw_instanced(self.clear_color.to_rgba(), QUAD_VERTEX_COUNT, count as u32)?;

        grid.clear_dirty();

        self.stats.frames += 1;
        self.stats.last_instance_count = count;
        self.stats.last_draw_calls = 1;
        self.stats.total_draw_calls += 1;
        self.stats.last_frame_time = start_time.elapsed();

        Ok(())
    }

    fn upload_atlas(&mut self, full_render: bool) {
        let (width, height) = self.atlas.dimensions();
        let dirty = self.atlas.take_dirty_region();
        let region = if full_render {
            Some(AtlasRegion { x: 0, y: 0, width, height })
        } else {
            dirty
        };

        if let Some(region) = region {
            self.backend
                .upload_atlas(self.atlas.pixels(), width, height, region);
            self.stats.atlas_uploads += 1;
            self.stats.atlas_bytes_uploaded += u64::from(region.width) * u64::from(region.height) * 4;
        }
    }

    /// Resize the drawable; the instance buffer is sized by cell count and stays put
    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.uniforms.resolution = [width as f32, height as f32];
        self.backend.set_viewport(width, height);
        self.backend.set_uniforms(&self.uniforms);
    }

    /// Show or hide cells carrying the blink flag
    pub fn set_blink_phase(&mut self, visible: bool) {
        self.uniforms.blink_visible = if visible { 1.0 } else { 0.0 };
        self.backend.set_uniforms(&self.uniforms);
    }

    pub fn set_clear_color(&mut self, color: Rgb) {
        self.clear_color = color;
    }

    /// Swap in a new atlas after a font or size change
    pub fn replace_atlas(&mut self, atlas: GlyphAtlas<R>) -> GlyphAtlas<R> {
        let old = std::mem::replace(&mut self.atlas, atlas);
        let metrics = self.atlas.metrics();
        self.uniforms.cell_size = [metrics.width as f32, metrics.height as f32];
        self.backend.set_uniforms(&self.uniforms);
        self.atlas.mark_all_dirty();
        old
    }

    /// Release GPU resources; later calls are no-ops
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.backend.destroy();
        self.destroyed = true;
        info!("Instanced renderer destroyed after {} frames", self.stats.frames);
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    #[must_use]
    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Records the instance buffer currently holds room for
    #[must_use]
    pub fn instance_capacity(&self) -> usize {
        self.instance_capacity
    }

    /// Instance records built for the last frame
    #[must_use]
    pub fn instances(&self) -> &[CellInstance] {
        &self.instances
    }

    #[must_use]
    pub fn uniforms(&self) -> &Uniforms {
        &self.uniforms
    }

    #[must_use]
    pub fn stats(&self) -> &RendererStats {
        &self.stats
    }

    #[must_use]
    pub fn atlas(&self) -> &GlyphAtlas<R> {
        &self.atlas
    }

    pub fn atlas_mut(&mut self) -> &mut GlyphAtlas<R> {
        &mut self.atlas
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

/// GPU rendering errors
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("No GPU adapter available")]
    NoAdapter,
    #[error("Failed to request GPU device: {0}")]
    DeviceRequest(String),
    #[error("GPU lacks a required capability: {0}")]
    MissingCapability(String),
    #[error("Shader compilation error: {0}")]
    ShaderCompile(String),
    #[error("Surface error: {0}")]
    Surface(String),
    #[error("Renderer has been destroyed")]
    Destroyed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::raster::{CellMetrics, GlyphBitmap, GlyphStyle};
    use crate::grid::{Cell, Grid};

    #[derive(Default)]
    struct Recorder {
        allocations: Vec<usize>,
        atlas_uploads: Vec<AtlasRegion>,
        instance_uploads: Vec<usize>,
        draws: Vec<(u32, u32)>,
        viewports: Vec<(u32, u32)>,
        uniforms: Option<Uniforms>,
        destroyed: u32,
    }

    impl GpuBackend for Recorder {
        fn allocate_instances(&mut self, capacity: usize) {
            self.allocations.push(capacity);
        }
        fn upload_atlas(&mut self, _pixels: &[u8], _width: u32, _height: u32, region: AtlasRegion) {
            self.atlas_uploads.push(region);
        }
        fn upload_instances(&mut self, instances: &[CellInstance]) {
            self.instance_uploads.push(instances.len());
        }
        fn set_uniforms(&mut self, uniforms: &Uniforms) {
            self.uniforms = Some(*uniforms);
        }
        fn set_viewport(&mut self, width: u32, height: u32) {
            self.viewports.push((width, height));
        }
        fn draw_instanced(&mut self, _clear: [f32; 4], vertex_count: u32, instance_count: u32) -> Result<(), RenderError> {
            self.draws.push((vertex_count, instance_count));
            Ok(())
        }
        fn destroy(&mut self) {
            self.destroyed += 1;
        }
    }

    struct Blank;

    impl Rasterizer for Blank {
        fn metrics(&self) -> CellMetrics {
            CellMetrics { width: 8, height: 16, baseline: 12 }
        }
        fn draw_char(&mut self, region: AtlasRegion, _ch: char, _style: GlyphStyle) -> GlyphBitmap {
            GlyphBitmap::blank(region.width, region.height)
        }
        fn measure_width(&mut self, _ch: char) -> f32 {
            8.0
        }
    }

    fn renderer(rows: usize, cols: usize) -> InstancedRenderer<Recorder, Blank> {
        let atlas = GlyphAtlas::new(Blank, 256, 256).unwrap();
        InstancedRenderer::new(Recorder::default(), atlas, rows, cols, (640, 384))
    }

    #[test]
    fn test_construction_allocates_for_grid() {
        let renderer = renderer(24, 80);
        assert_eq!(renderer.backend().allocations, vec![1920]);
        assert_eq!(renderer.backend().viewports, vec![(640, 384)]);
        let uniforms = renderer.backend().uniforms.unwrap();
        assert_eq!(uniforms.cell_size, [8.0, 16.0]);
        assert_eq!(uniforms.resolution, [640.0, 384.0]);
    }

    #[test]
    fn test_render_draws_once_for_whole_grid() {
        let mut renderer = renderer(3, 4);
        let mut grid = Grid::new(3, 4);
        renderer.render(&mut grid, false).unwrap();

        assert_eq!(renderer.backend().draws, vec![(6, 12)]);
        assert_eq!(renderer.backend().instance_uploads, vec![12]);
        assert_eq!(renderer.stats().last_draw_calls, 1);
        assert!(!grid.is_full_dirty());
    }

    #[test]
    fn test_instances_carry_cell_data() {
        let mut renderer = renderer(2, 2);
        let mut grid = Grid::new(2, 2);
        grid.set_cell(1, 1, Cell::new('z', Rgb::new(255, 0, 0), Rgb::new(0, 255, 0), CellFlags::UNDERLINE));
        renderer.render(&mut grid, false).unwrap();

        let last = renderer.instances()[3];
        assert_eq!(last.position, [1.0, 1.0]);
        assert_eq!(last.fg, [1.0, 0.0, 0.0]);
        assert_eq!(last.bg, [0.0, 1.0, 0.0]);
        assert_eq!(last.flags, 8.0);
    }

    #[test]
    fn test_atlas_upload_only_when_dirty() {
        let mut renderer = renderer(1, 2);
        let mut grid = Grid::new(1, 2);
        renderer.render(&mut grid, false).unwrap();
        renderer.render(&mut grid, false).unwrap();
        assert_eq!(renderer.backend().atlas_uploads.len(), 1);

        renderer.render(&mut grid, true).unwrap();
        assert_eq!(renderer.backend().atlas_uploads.len(), 2);
        assert_eq!(
            renderer.backend().atlas_uploads[1],
            AtlasRegion { x: 0, y: 0, width: 256, height: 256 }
        );
    }

    #[test]
    fn test_new_glyph_uploads_dirty_region() {
        let mut renderer = renderer(1, 1);
        let mut grid = Grid::new(1, 1);
        renderer.render(&mut grid, false).unwrap();

        grid.set_cell(0, 0, Cell::new('q', Rgb::WHITE, Rgb::BLACK, CellFlags::empty()));
        renderer.render(&mut grid, false).unwrap();
        assert_eq!(
            renderer.backend().atlas_uploads.last(),
            Some(&AtlasRegion { x: 8, y: 0, width: 8, height: 16 })
        );
    }

    #[test]
    fn test_grid_resize_reallocates() {
        let mut renderer = renderer(2, 2);
        let mut grid = Grid::new(3, 3);
        renderer.render(&mut grid, false).unwrap();
        assert_eq!(renderer.backend().allocations, vec![4, 9]);
        assert_eq!(renderer.instance_capacity(), 9);
    }

    #[test]
    fn test_resize_keeps_instance_buffer() {
        let mut renderer = renderer(24, 80);
        renderer.resize(1024, 768);
        assert_eq!(renderer.viewport(), (1024, 768));
        assert_eq!(renderer.backend().viewports.last(), Some(&(1024, 768)));
        assert_eq!(renderer.backend().allocations, vec![1920]);
        assert_eq!(renderer.instance_capacity(), 1920);
        assert_eq!(renderer.uniforms().resolution, [1024.0, 768.0]);
    }

    #[test]
    fn test_blink_phase_updates_uniforms() {
        let mut renderer = renderer(1, 1);
        renderer.set_blink_phase(false);
        assert_eq!(renderer.backend().uniforms.unwrap().blink_visible, 0.0);
        renderer.set_blink_phase(true);
        assert_eq!(renderer.backend().uniforms.unwrap().blink_visible, 1.0);
    }

    #[test]
    fn test_destroy_once() {
        let mut renderer = renderer(1, 1);
        renderer.destroy();
        renderer.destroy();
        assert_eq!(renderer.backend().destroyed, 1);
        assert!(renderer.is_destroyed());

        let mut grid = Grid::new(1, 1);
        assert!(matches!(renderer.render(&mut grid, false), Err(RenderError::Destroyed)));
    }

    #[test]
    fn test_replace_atlas_updates_cell_size() {
        struct Big;
        impl Rasterizer for Big {
            fn metrics(&self) -> CellMetrics {
                CellMetrics { width: 10, height: 20, baseline: 16 }
            }
            fn draw_char(&mut self, region: AtlasRegion, _ch: char, _style: GlyphStyle) -> GlyphBitmap {
                GlyphBitmap::blank(region.width, region.height)
            }
            fn measure_width(&mut self, _ch: char) -> f32 {
                10.0
            }
        }

        let atlas = GlyphAtlas::new(Box::new(Blank) as Box<dyn Rasterizer>, 64, 64).unwrap();
        let mut renderer = InstancedRenderer::new(Recorder::default(), atlas, 1, 1, (8, 16));
        let bigger = GlyphAtlas::new(Box::new(Big) as Box<dyn Rasterizer>, 64, 64).unwrap();
        let old = renderer.replace_atlas(bigger);

        assert_eq!(old.metrics().width, 8);
        assert_eq!(renderer.uniforms().cell_size, [10.0, 20.0]);
        assert!(renderer.atlas().is_dirty());
    }
}
