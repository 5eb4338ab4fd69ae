//! GPU seam driven by the instanced renderer

use super::instance::{CellInstance, Uniforms};
use super::raster::AtlasRegion;
use super::renderer::RenderError;

/// Device-side operations the renderer needs each frame
///
/// Implementations own the shading program, the static quad buffer, the
/// instance buffer and the atlas texture. Construction of the implementation
/// is where program compilation happens and where it must fail.
pub trait GpuBackend {
    /// (Re)allocate the instance buffer for `capacity` records
    fn allocate_instances(&mut self, capacity: usize);

    /// Copy `region` of the RGBA8 atlas image (`width` x `height`) to the texture
    fn upload_atlas(&mut self, pixels: &[u8], width: u32, height: u32, region: AtlasRegion);

    /// Replace the instance buffer contents in one transfer
    fn upload_instances(&mut self, instances: &[CellInstance]);

    fn set_uniforms(&mut self, uniforms: &Uniforms);

    fn set_viewport(&mut self, width: u32, height: u32);

    /// Clear the target and issue one instanced draw
    fn draw_instanced(&mut self, clear: [f32; 4], vertex_count: u32, instance_count: u32) -> Result<(), RenderError>;

    /// Release every GPU resource
    fn destroy(&mut self);
}
