//! wgpu implementation of [`RenderBackend`].
//!
//! Every catalog kernel is a WGSL fragment shader in `src/shaders/`, prefixed
//! with `common.wgsl` which provides the vertex stage and the shared
//! bindings:
//!
//! | Binding | Resource |
//! |---------|----------|
//! | 0 | `Params` uniform block ([`UniformBlock`] layout) |
//! | 1 | `image` texture |
//! | 2 | `image2` texture (aliases `image` for single-input kernels) |
//! | 3 | linear sampler, clamp to edge |
//! | 4 | nearest sampler, clamp to edge |
//!
//! Each draw is encoded into its own command buffer and submitted right away,
//! so queue order alone makes a pass's output visible to the next one.

use std::collections::HashMap;
use std::sync::{Arc, mpsc};

use image::RgbaImage;
use tracing::{debug, trace};
use wgpu::util::DeviceExt;

use super::uniforms::UniformBlock;
use super::RenderBackend;
use crate::error::BackendError;
use crate::filter_graph::{
    FullScreenQuad, PixelFormat, QuadVertex, ReleaseQueue, RenderTarget, RenderTargetDesc, TextureId,
};
use crate::gpu::{GpuConfig, GpuContext};
use crate::shader::{FilterKind, ParameterKind, ParameterSet, ShaderProgram};

const COMMON_WGSL: &str = include_str!("../shaders/common.wgsl");

fn kernel_source(kind: FilterKind) -> &'static str {
    match kind {
        FilterKind::Scaling => include_str!("../shaders/scaling.wgsl"),
        FilterKind::ImageArithmetic => include_str!("../shaders/image_arithmetic.wgsl"),
        FilterKind::GaussianBlur => include_str!("../shaders/gaussian_blur.wgsl"),
        FilterKind::SeparableGaussianBlur => include_str!("../shaders/separable_gaussian_blur.wgsl"),
        FilterKind::Laplacian => include_str!("../shaders/laplacian.wgsl"),
        FilterKind::LaplacianOfGaussian => include_str!("../shaders/laplacian_of_gaussian.wgsl"),
        FilterKind::Median => include_str!("../shaders/median.wgsl"),
        FilterKind::HueShift => include_str!("../shaders/hue_shift.wgsl"),
    }
}

fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
    }
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct Bound {
    program: ShaderProgram,
    parameters: ParameterSet,
}

/// A [`RenderBackend`] backed by a headless wgpu device.
pub struct WgpuBackend {
    gpu: GpuContext,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,
    quad_buffer: wgpu::Buffer,
    programs: HashMap<FilterKind, Arc<ShaderProgram>>,
    pipelines: HashMap<FilterKind, wgpu::RenderPipeline>,
    textures: HashMap<TextureId, GpuTexture>,
    next_texture: u64,
    active: Option<TextureId>,
    bound: Option<Bound>,
    releases: ReleaseQueue,
}

impl WgpuBackend {
    /// Opens a device with `config` and prepares the shared pipeline state.
    pub fn new(config: &GpuConfig) -> Result<Self, BackendError> {
        Ok(Self::from_context(GpuContext::new(config)?))
    }

    /// Builds a backend on an existing device.
    pub fn from_context(gpu: GpuContext) -> Self {
        let device = &gpu.device;

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let sampler_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Filter Bind Group Layout"),
            entries: &[
                // Params
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
                texture_entry(1),
                texture_entry(2),
                sampler_entry(3),
                sampler_entry(4),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Filter Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let sampler = |label: &'static str, filter: wgpu::FilterMode| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            })
        };
        let linear_sampler = sampler("Filter Linear Sampler", wgpu::FilterMode::Linear);
        let nearest_sampler = sampler("Filter Nearest Sampler", wgpu::FilterMode::Nearest);

        let quad_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Full Screen Quad"),
            contents: bytemuck::cast_slice(FullScreenQuad::new().vertices()),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        Self {
            gpu,
            bind_group_layout,
            pipeline_layout,
            linear_sampler,
            nearest_sampler,
            quad_buffer,
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            textures: HashMap::new(),
            next_texture: 1,
            active: None,
            bound: None,
            releases: ReleaseQueue::new(),
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// Creates a source texture holding `image`.
    pub fn upload(&mut self, image: &RgbaImage) -> TextureId {
        let (width, height) = image.dimensions();
        let id = self.next_id();
        let texture = self.gpu.device.create_texture_with_data(
            &self.gpu.queue,
            &self.texture_descriptor(width, height, PixelFormat::Rgba8Unorm),
            wgpu::util::TextureDataOrder::LayerMajor,
            image.as_raw(),
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.textures.insert(id, GpuTexture { texture, view });
        trace!(?id, width, height, "uploaded texture");
        id
    }

    /// Overwrites an uploaded texture of the same size, e.g. with the next
    /// video frame.
    pub fn update(&mut self, id: TextureId, image: &RgbaImage) -> Result<(), BackendError> {
        let texture = self.textures.get(&id).ok_or(BackendError::UnknownTexture(id))?;
        let (width, height) = image.dimensions();
        let size = texture.texture.size();
        if (size.width, size.height) != (width, height) {
            return Err(BackendError::UnsupportedFormat(format!(
                "frame is {width}x{height}, texture is {}x{}",
                size.width, size.height
            )));
        }
        self.gpu.queue.write_texture(
            texture.texture.as_image_copy(),
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            size,
        );
        Ok(())
    }

    /// Frees a texture created with [`WgpuBackend::upload`].
    pub fn remove(&mut self, id: TextureId) -> bool {
        self.textures.remove(&id).is_some()
    }

    /// The view of a texture, for sampling it outside the filter graph.
    pub fn texture_view(&self, id: TextureId) -> Option<&wgpu::TextureView> {
        self.textures.get(&id).map(|t| &t.view)
    }

    /// Copies a texture back to host memory. Blocks until the GPU is done.
    pub fn read_texture(&self, id: TextureId) -> Result<RgbaImage, BackendError> {
        let texture = self.textures.get(&id).ok_or(BackendError::UnknownTexture(id))?;
        let size = texture.texture.size();
        let (width, height) = (size.width, size.height);

        let unpadded_bytes_per_row = width * 4;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let readback = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Filter Readback"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Filter Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            texture.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            size,
        );
        self.gpu.queue.submit([encoder.finish()]);

        let slice = readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.gpu
            .device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| BackendError::Readback(e.to_string()))?;
        rx.recv()
            .map_err(|e| BackendError::Readback(e.to_string()))?
            .map_err(|e| BackendError::Readback(e.to_string()))?;

        let mapped = slice.get_mapped_range();
        let unpadded = unpadded_bytes_per_row as usize;
        let padded = padded_bytes_per_row as usize;
        let mut pixels = Vec::with_capacity(unpadded * height as usize);
        for row in mapped.chunks(padded) {
            pixels.extend_from_slice(&row[..unpadded]);
        }
        drop(mapped);
        readback.unmap();

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| BackendError::Readback("buffer size does not match texture".to_string()))
    }

    fn next_id(&mut self) -> TextureId {
        let id = TextureId::new(self.next_texture);
        self.next_texture += 1;
        id
    }

    fn texture_descriptor(&self, width: u32, height: u32, format: PixelFormat) -> wgpu::TextureDescriptor<'static> {
        wgpu::TextureDescriptor {
            label: Some("Filter Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        }
    }

    fn release_dropped(&mut self) {
        for id in self.releases.drain() {
            if self.textures.remove(&id).is_some() {
                trace!(?id, "released render target");
            }
        }
    }

    /// Compiles the pipeline for `program`'s kernel on first use.
    fn ensure_pipeline(&mut self, program: &ShaderProgram) {
        let kind = program.kind();
        let device = &self.gpu.device;
        let layout = &self.pipeline_layout;
        self.pipelines.entry(kind).or_insert_with(|| {
            debug!(%kind, "compiling filter pipeline");
            let source = format!("{COMMON_WGSL}\n{}", kernel_source(kind));
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(program.label()),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(program.label()),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some(program.vertex_stage().entry_point.as_str()),
                    buffers: &[QuadVertex::LAYOUT],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(program.fragment_stage().entry_point.as_str()),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: texture_format(PixelFormat::Rgba8Unorm),
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        });
    }
}

impl RenderBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn program(&mut self, kind: FilterKind) -> Result<Arc<ShaderProgram>, BackendError> {
        let program = self
            .programs
            .entry(kind)
            .or_insert_with(|| Arc::new(ShaderProgram::for_kind(kind)));
        Ok(Arc::clone(program))
    }

    fn allocate_render_target(&mut self, desc: RenderTargetDesc) -> Result<RenderTarget, BackendError> {
        self.release_dropped();
        let id = self.next_id();
        let texture = self
            .gpu
            .device
            .create_texture(&self.texture_descriptor(desc.width, desc.height, desc.format));
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.textures.insert(id, GpuTexture { texture, view });
        trace!(?id, width = desc.width, height = desc.height, "allocated render target");
        Ok(RenderTarget::new(id, desc, Some(self.releases.sender())))
    }

    fn set_active_render_target(&mut self, target: Option<&RenderTarget>) -> Result<(), BackendError> {
        self.active = match target {
            Some(target) => {
                let id = target.texture();
                if !self.textures.contains_key(&id) {
                    return Err(BackendError::UnknownTexture(id));
                }
                Some(id)
            }
            None => None,
        };
        Ok(())
    }

    fn bind_program(&mut self, program: &ShaderProgram, parameters: &ParameterSet) -> Result<(), BackendError> {
        self.bound = Some(Bound {
            program: program.clone(),
            parameters: parameters.clone(),
        });
        Ok(())
    }

    fn draw_full_screen_quad(&mut self, quad: &FullScreenQuad) -> Result<(), BackendError> {
        let target = self.active.ok_or(BackendError::NoActiveTarget)?;
        let Bound { program, parameters } = self.bound.take().ok_or(BackendError::NoProgramBound)?;
        let result = self.encode_draw(target, &program, &parameters, quad);
        self.bound = Some(Bound { program, parameters });
        result
    }

    fn collect_garbage(&mut self) {
        self.release_dropped();
    }
}

impl WgpuBackend {
    fn encode_draw(
        &mut self,
        target: TextureId,
        program: &ShaderProgram,
        parameters: &ParameterSet,
        quad: &FullScreenQuad,
    ) -> Result<(), BackendError> {
        for decl in program.schema().iter().filter(|d| d.kind == ParameterKind::Texture) {
            let id = parameters
                .texture(decl.name)
                .ok_or_else(|| BackendError::UnboundTexture(decl.name.to_string()))?;
            if id == target {
                return Err(BackendError::Feedback(id));
            }
            if !self.textures.contains_key(&id) {
                return Err(BackendError::UnknownTexture(id));
            }
        }
        let image = parameters
            .texture("image")
            .ok_or_else(|| BackendError::UnboundTexture("image".to_string()))?;
        let image2 = parameters.texture("image2").unwrap_or(image);

        let uniforms = UniformBlock::pack(program.schema(), parameters);
        let uniform_buffer = self.gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Filter Params"),
            contents: uniforms.as_bytes(),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        self.ensure_pipeline(program);
        let pipeline = &self.pipelines[&program.kind()];
        let view = |id: TextureId| {
            self.textures
                .get(&id)
                .map(|t| &t.view)
                .ok_or(BackendError::UnknownTexture(id))
        };

        let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Filter Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view(image)?),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(view(image2)?),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.linear_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&self.nearest_sampler),
                },
            ],
        });

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(program.label()),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(program.label()),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: view(target)?,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.quad_buffer.slice(..));
            render_pass.draw(0..quad.vertex_count(), 0..1);
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        trace!(kind = %program.kind(), ?target, "wgpu draw");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::naga;

    fn parse(kind: FilterKind) -> naga::Module {
        let source = format!("{COMMON_WGSL}\n{}", kernel_source(kind));
        let module = naga::front::wgsl::parse_str(&source)
            .unwrap_or_else(|e| panic!("{kind}: {}", e.emit_to_string(&source)));
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::default())
            .validate(&module)
            .unwrap_or_else(|e| panic!("{kind}: {e:?}"));
        module
    }

    #[test]
    fn every_kernel_compiles() {
        for kind in FilterKind::ALL {
            let module = parse(kind);
            let program = ShaderProgram::for_kind(kind);
            let entry_points: Vec<_> = module.entry_points.iter().map(|e| e.name.as_str()).collect();
            assert!(entry_points.contains(&program.vertex_stage().entry_point.as_str()), "{kind}");
            assert!(entry_points.contains(&program.fragment_stage().entry_point.as_str()), "{kind}");
        }
    }

    #[test]
    fn params_structs_match_uniform_layout() {
        for kind in FilterKind::ALL {
            let module = parse(kind);
            let (members, span) = module
                .types
                .iter()
                .find_map(|(_, ty)| match &ty.inner {
                    naga::TypeInner::Struct { members, span } if ty.name.as_deref() == Some("Params") => {
                        Some((members.clone(), *span))
                    }
                    _ => None,
                })
                .unwrap_or_else(|| panic!("{kind} declares no Params struct"));

            let found: Vec<(String, usize)> = members
                .iter()
                .map(|m| (m.name.clone().unwrap_or_default(), m.offset as usize))
                .collect();
            let layout = UniformBlock::layout(&kind.schema());
            let expected: Vec<(String, usize)> = layout
                .offsets
                .iter()
                .map(|&(name, offset)| (name.to_string(), offset))
                .collect();

            assert_eq!(found, expected, "{kind}");
            assert!(layout.size >= span as usize, "{kind}: buffer {} < struct {span}", layout.size);
        }
    }
}
