//! wgpu implementation of the renderer's GPU seam
//!
//! Owns one render pipeline (the cell shader), a static 6-vertex quad buffer,
//! the per-instance buffer, a uniform buffer and the RGBA atlas texture. It
//! draws either into a window surface supplied by the host or into an
//! offscreen texture when running headless.

use wgpu::util::DeviceExt;

use super::backend::GpuBackend;
use super::instance::{CellInstance, Uniforms, QUAD_VERTICES};
use super::raster::AtlasRegion;
use super::renderer::RenderError;
use crate::config::RenderConfig;

/// Cell shader source
pub const CELL_SHADER: &str = include_str!("shaders/cell.wgsl");

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
    1 => Float32x2,  // cell position
    2 => Float32x4,  // glyph uv
    3 => Float32x3,  // fg
    4 => Float32x3,  // bg
    5 => Float32,    // flags
];

const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Where frames end up
enum Target {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
    },
}

/// wgpu-backed [`GpuBackend`]
pub struct WgpuBackend {
    /// WGPU instance
    instance: wgpu::Instance,
    /// GPU adapter
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: Target,
    format: wgpu::TextureFormat,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    /// Unit quad, six vertices reused by every instance
    quad_buffer: wgpu::Buffer,
    instance_buffer: wgpu::Buffer,
    instance_capacity: usize,
    atlas_texture: wgpu::Texture,
    atlas_sampler: wgpu::Sampler,
    atlas_size: (u32, u32),
    viewport: (u32, u32),
    destroyed: bool,
}

impl WgpuBackend {
    /// Render into an offscreen texture of `width` x `height`
    pub async fn headless(config: &RenderConfig, width: u32, height: u32) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: config.backend.into(),
            ..Default::default()
        });
        Self::init(instance, None, config, width, height).await
    }

    /// Render into a surface the host created from its window with `instance`
    pub async fn with_surface(
        instance: wgpu::Instance,
        surface: wgpu::Surface<'static>,
        config: &RenderConfig,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        Self::init(instance, Some(surface), config, width, height).await
    }

    async fn init(
        instance: wgpu::Instance,
        surface: Option<wgpu::Surface<'static>>,
        config: &RenderConfig,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface.as_ref(),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        let limits = adapter.limits();
        if limits.max_vertex_buffers < 2 || limits.max_vertex_attributes < 6 {
            return Err(RenderError::MissingCapability(format!(
                "instanced drawing needs 2 vertex buffers and 6 attributes, adapter offers {} and {}",
                limits.max_vertex_buffers, limits.max_vertex_attributes
            )));
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Furnace Cell Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults().using_resolution(limits),
                },
                None,
            )
            .await
            .map_err(|e| RenderError::DeviceRequest(e.to_string()))?;

        let (target, format) = match surface {
            Some(surface) => {
                let caps = surface.get_capabilities(&adapter);
                // cell colors are already sRGB-encoded
                let format = caps
                    .formats
                    .iter()
                    .copied()
                    .find(|f| !f.is_srgb())
                    .or_else(|| caps.formats.first().copied())
                    .ok_or_else(|| RenderError::Surface("surface reports no formats".into()))?;
                let config = wgpu::SurfaceConfiguration {
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    format,
                    width,
                    height,
                    present_mode: if config.vsync {
                        wgpu::PresentMode::AutoVsync
                    } else {
                        wgpu::PresentMode::AutoNoVsync
                    },
                    alpha_mode: caps
                        .alpha_modes
                        .first()
                        .copied()
                        .unwrap_or(wgpu::CompositeAlphaMode::Auto),
                    view_formats: vec![],
                    desired_maximum_frame_latency: 2,
                };
                if width > 0 && height > 0 {
                    surface.configure(&device, &config);
                }
                (Target::Surface { surface, config }, format)
            }
            None => {
                let texture = create_offscreen(&device, width, height);
                (Target::Offscreen { texture }, OFFSCREEN_FORMAT)
            }
        };

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cell Uniforms"),
            contents: bytemuck::cast_slice(&[Uniforms::new([1.0, 1.0], [width as f32, height as f32])]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cell Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline = build_pipeline(&device, &bind_group_layout, format, CELL_SHADER).await?;

        // Nearest filtering keeps monospace glyph edges crisp
        let atlas_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Glyph Atlas Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let atlas_size = (config.atlas.width, config.atlas.height);
        let atlas_texture = create_atlas_texture(&device, atlas_size.0, atlas_size.1);
        let bind_group = create_bind_group(&device, &bind_group_layout, &uniform_buffer, &atlas_texture, &atlas_sampler);

        let quad_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cell Quad"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let instance_buffer = create_instance_buffer(&device, 0);

        let info = adapter.get_info();
        tracing::info!("GPU backend: {} ({:?}), target format {:?}", info.name, info.backend, format);

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            target,
            format,
            pipeline,
            bind_group_layout,
            bind_group,
            uniform_buffer,
            quad_buffer,
            instance_buffer,
            instance_capacity: 0,
            atlas_texture,
            atlas_sampler,
            atlas_size,
            viewport: (width, height),
            destroyed: false,
        })
    }

    /// Get GPU device info
    pub fn get_device_info(&self) -> String {
        let info = self.adapter.get_info();
        format!("{} ({:?}) - {:?}", info.name, info.backend, info.device_type)
    }

    pub fn current_backend(&self) -> wgpu::Backend {
        self.adapter.get_info().backend
    }

    /// Color format frames are rendered in
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// The wgpu instance, for creating further surfaces
    pub fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    fn recreate_atlas(&mut self, width: u32, height: u32) {
        self.atlas_texture.destroy();
        self.atlas_texture = create_atlas_texture(&self.device, width, height);
        self.atlas_size = (width, height);
        self.bind_group = create_bind_group(
            &self.device,
            &self.bind_group_layout,
            &self.uniform_buffer,
            &self.atlas_texture,
            &self.atlas_sampler,
        );
        tracing::debug!("Recreated atlas texture at {}x{}", width, height);
    }
}

impl GpuBackend for WgpuBackend {
    fn allocate_instances(&mut self, capacity: usize) {
        if self.destroyed {
            return;
        }
        self.instance_buffer.destroy();
        self.instance_buffer = create_instance_buffer(&self.device, capacity);
        self.instance_capacity = capacity;
    }

    fn upload_atlas(&mut self, pixels: &[u8], width: u32, height: u32, region: AtlasRegion) {
        if self.destroyed {
            return;
        }
        let region = if (width, height) == self.atlas_size {
            region
        } else {
            self.recreate_atlas(width, height);
            AtlasRegion { x: 0, y: 0, width, height }
        };
        if region.width == 0 || region.height == 0 {
            return;
        }

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.atlas_texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: region.x,
                    y: region.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::ImageDataLayout {
                offset: (u64::from(region.y) * u64::from(width) + u64::from(region.x)) * 4,
                bytes_per_row: Some(width * 4),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn upload_instances(&mut self, instances: &[CellInstance]) {
        if self.destroyed {
            return;
        }
        if instances.len() > self.instance_capacity {
            self.allocate_instances(instances.len());
        }
        self.queue
            .write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(instances));
    }

    fn set_uniforms(&mut self, uniforms: &Uniforms) {
        if self.destroyed {
            return;
        }
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[*uniforms]));
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        if self.destroyed {
            return;
        }
        self.viewport = (width, height);
        if width == 0 || height == 0 {
            tracing::debug!("Zero-sized viewport, skipping target reconfiguration");
            return;
        }

        match &mut self.target {
            Target::Surface { surface, config } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            Target::Offscreen { texture } => {
                texture.destroy();
                *texture = create_offscreen(&self.device, width, height);
            }
        }
    }

    fn draw_instanced(&mut self, clear: [f32; 4], vertex_count: u32, instance_count: u32) -> Result<(), RenderError> {
        if self.destroyed {
            return Err(RenderError::Destroyed);
        }
        let (width, height) = self.viewport;
        if width == 0 || height == 0 {
            return Ok(());
        }

        let (frame, view) = match &self.target {
            Target::Surface { surface, config } => {
                let frame = match surface.get_current_texture() {
                    Ok(frame) => frame,
                    Err(e) => {
                        if matches!(e, wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) {
                            surface.configure(&self.device, config);
                        }
                        return Err(RenderError::Surface(e.to_string()));
                    }
                };
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                (Some(frame), view)
            }
            Target::Offscreen { texture } => {
                (None, texture.create_view(&wgpu::TextureViewDescriptor::default()))
            }
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Cell Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Cell Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(clear[0]),
                            g: f64::from(clear[1]),
                            b: f64::from(clear[2]),
                            a: f64::from(clear[3]),
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if instance_count > 0 {
                render_pass.set_pipeline(&self.pipeline);
                render_pass.set_bind_group(0, &self.bind_group, &[]);
                render_pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
                render_pass.set_vertex_buffer(0, self.quad_buffer.slice(..));
                render_pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
                render_pass.draw(0..vertex_count, 0..instance_count);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(frame) = frame {
            frame.present();
        }
        Ok(())
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.instance_buffer.destroy();
        self.quad_buffer.destroy();
        self.uniform_buffer.destroy();
        self.atlas_texture.destroy();
        if let Target::Offscreen { texture } = &self.target {
            texture.destroy();
        }
        self.destroyed = true;
    }
}

/// Compile the cell shader and link it into a pipeline
///
/// Both steps run inside validation error scopes so a bad program surfaces
/// as [`RenderError::ShaderCompile`] with the compiler's diagnostic.
pub async fn build_pipeline(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
    source: &str,
) -> Result<wgpu::RenderPipeline, RenderError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Cell Shader"),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    if let Some(err) = device.pop_error_scope().await {
        return Err(RenderError::ShaderCompile(err.to_string()));
    }

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Cell Pipeline Layout"),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Cell Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: "vs_main",
            buffers: &[
                wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &QUAD_ATTRIBUTES,
                },
                wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<CellInstance>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &INSTANCE_ATTRIBUTES,
                },
            ],
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    });
    if let Some(err) = device.pop_error_scope().await {
        return Err(RenderError::ShaderCompile(err.to_string()));
    }

    Ok(pipeline)
}

fn create_offscreen(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Offscreen Target"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

fn create_atlas_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Glyph Atlas"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn create_instance_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Cell Instances"),
        size: (capacity.max(1) * std::mem::size_of::<CellInstance>()) as u64,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    uniforms: &wgpu::Buffer,
    atlas: &wgpu::Texture,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    let view = atlas.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Cell Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}
