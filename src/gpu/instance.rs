//! Per-cell instance records and shader uniforms

use crate::grid::Cell;

use super::atlas::GlyphRect;

/// Vertices in the reused unit quad (two triangles)
pub const QUAD_VERTEX_COUNT: u32 = 6;

/// Scalars per instance record
pub const INSTANCE_FIELDS: usize = 13;

/// Unit quad corners, drawn once per instance
pub const QUAD_VERTICES: [[f32; 2]; QUAD_VERTEX_COUNT as usize] = [
    [0.0, 0.0],
    [1.0, 0.0],
    [0.0, 1.0],
    [0.0, 1.0],
    [1.0, 0.0],
    [1.0, 1.0],
];

/// Instance data for each cell
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CellInstance {
    /// Cell position (column, row)
    pub position: [f32; 2],
    /// Glyph UV rectangle (u1, v1, u2, v2)
    pub glyph_uv: [f32; 4],
    /// Foreground RGB, normalized
    pub fg: [f32; 3],
    /// Background RGB, normalized
    pub bg: [f32; 3],
    /// `CellFlags` bits
    pub flags: f32,
}

impl CellInstance {
    #[must_use]
    pub fn new(col: usize, row: usize, cell: &Cell, uv: GlyphRect) -> Self {
        Self {
            position: [col as f32, row as f32],
            glyph_uv: uv.to_array(),
            fg: cell.fg.to_normalized(),
            bg: cell.bg.to_normalized(),
            flags: f32::from(cell.flags.bits()),
        }
    }
}

/// Uniforms for the cell shader
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Uniforms {
    /// Cell size in pixels
    pub cell_size: [f32; 2],
    /// Viewport size in pixels
    pub resolution: [f32; 2],
    /// 1.0 while blinking cells are visible, 0.0 otherwise
    pub blink_visible: f32,
    /// Padding
    pub _padding: [f32; 3],
}

impl Uniforms {
    #[must_use]
    pub fn new(cell_size: [f32; 2], resolution: [f32; 2]) -> Self {
        Self {
            cell_size,
            resolution,
            blink_visible: 1.0,
            _padding: [0.0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colors::Rgb;
    use crate::grid::CellFlags;

    #[test]
    fn test_instance_layout() {
        assert_eq!(std::mem::size_of::<CellInstance>(), INSTANCE_FIELDS * 4);
        assert_eq!(std::mem::size_of::<Uniforms>() % 16, 0);
    }

    #[test]
    fn test_instance_from_cell() {
        let cell = Cell::new(
            'A',
            Rgb::new(255, 0, 0),
            Rgb::new(0, 0, 255),
            CellFlags::BOLD | CellFlags::INVERSE,
        );
        let uv = GlyphRect { u1: 0.0, v1: 0.25, u2: 0.5, v2: 0.75 };
        let instance = CellInstance::new(3, 7, &cell, uv);

        assert_eq!(instance.position, [3.0, 7.0]);
        assert_eq!(instance.glyph_uv, [0.0, 0.25, 0.5, 0.75]);
        assert_eq!(instance.fg, [1.0, 0.0, 0.0]);
        assert_eq!(instance.bg, [0.0, 0.0, 1.0]);
        assert_eq!(instance.flags, 33.0);

        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&instance));
        assert_eq!(floats.len(), INSTANCE_FIELDS);
    }
}
