//! GPU cell rendering
//!
//! The pipeline has three pieces: a [`GlyphAtlas`] that packs rasterized
//! glyphs into one texture, an [`InstancedRenderer`] that turns the whole cell
//! grid into one instanced draw call, and the [`GpuBackend`] seam that the
//! renderer drives. [`WgpuBackend`] implements the seam on wgpu.
//!
//! The atlas, instance building and renderer logic do not depend on wgpu and
//! are always compiled; the wgpu backend and the fontdue rasterizer need the
//! `gpu` feature.

pub mod atlas;
pub mod backend;
pub mod instance;
pub mod raster;
pub mod renderer;

#[cfg(feature = "gpu")]
pub mod font;

#[cfg(feature = "gpu")]
pub mod wgpu_backend;

pub use atlas::{AtlasError, AtlasStats, GlyphAtlas, GlyphKey, GlyphRect, ProfileStats};
pub use backend::GpuBackend;
pub use instance::{CellInstance, Uniforms, INSTANCE_FIELDS, QUAD_VERTEX_COUNT};
pub use raster::{AtlasRegion, CellMetrics, GlyphBitmap, GlyphStyle, Rasterizer};
pub use renderer::{InstancedRenderer, RenderError, RendererStats};

#[cfg(feature = "gpu")]
pub use font::{FontError, FontdueRasterizer};

#[cfg(feature = "gpu")]
pub use wgpu_backend::WgpuBackend;

use serde::{Deserialize, Serialize};

/// GPU backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuBackendKind {
    /// Automatically select best available backend
    #[default]
    Auto,
    /// Vulkan (Linux, Windows, Android)
    Vulkan,
    /// Metal (macOS, iOS)
    Metal,
    /// DirectX 12 (Windows)
    Dx12,
    /// OpenGL (fallback, all platforms)
    OpenGl,
    /// WebGPU (browser)
    WebGpu,
}

#[cfg(feature = "gpu")]
impl From<GpuBackendKind> for wgpu::Backends {
    fn from(backend: GpuBackendKind) -> Self {
        match backend {
            GpuBackendKind::Auto => wgpu::Backends::all(),
            GpuBackendKind::Vulkan => wgpu::Backends::VULKAN,
            GpuBackendKind::Metal => wgpu::Backends::METAL,
            GpuBackendKind::Dx12 => wgpu::Backends::DX12,
            GpuBackendKind::OpenGl => wgpu::Backends::GL,
            GpuBackendKind::WebGpu => wgpu::Backends::BROWSER_WEBGPU,
        }
    }
}

/// Check if a GPU adapter is available
#[cfg(feature = "gpu")]
#[must_use]
pub fn is_gpu_available() -> bool {
    get_gpu_info().is_some()
}

#[cfg(not(feature = "gpu"))]
#[must_use]
pub fn is_gpu_available() -> bool {
    false
}

/// Describe the adapter wgpu would pick, for diagnostics
#[cfg(feature = "gpu")]
#[must_use]
pub fn get_gpu_info() -> Option<String> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    pollster::block_on(async {
        instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map(|adapter| {
                let info = adapter.get_info();
                format!("{} ({:?}) - {:?}", info.name, info.backend, info.device_type)
            })
    })
}

#[cfg(not(feature = "gpu"))]
#[must_use]
pub fn get_gpu_info() -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_serde() {
        let kind: GpuBackendKind = serde_json::from_str("\"open_gl\"").unwrap();
        assert_eq!(kind, GpuBackendKind::OpenGl);
        assert_eq!(serde_json::to_string(&GpuBackendKind::Dx12).unwrap(), "\"dx12\"");
    }

    #[cfg(feature = "gpu")]
    #[test]
    fn test_backend_kind_maps_to_wgpu() {
        assert_eq!(wgpu::Backends::from(GpuBackendKind::Auto), wgpu::Backends::all());
        assert_eq!(wgpu::Backends::from(GpuBackendKind::Vulkan), wgpu::Backends::VULKAN);
    }

    #[test]
    fn test_gpu_info_is_consistent() {
        assert_eq!(is_gpu_available(), get_gpu_info().is_some());
    }
}
