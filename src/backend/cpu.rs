//! Reference rasterizer.
//!
//! Stores every texture as an [`RgbaImage`] and evaluates the bound kernel
//! once per output pixel. Slow, but bit-for-bit deterministic, which is what
//! pipeline tests need.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec2;
use image::{Rgba, RgbaImage};
use tracing::trace;

use super::kernels::{Kernel, Sampler, quantize};
use super::RenderBackend;
use crate::error::BackendError;
use crate::filter_graph::{FullScreenQuad, ReleaseQueue, RenderTarget, RenderTargetDesc, TextureId};
use crate::shader::{FilterKind, ParameterKind, ParameterSet, ShaderProgram};

/// One draw issued to a [`CpuBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawRecord {
    pub kind: FilterKind,
    pub target: TextureId,
}

struct Bound {
    kind: FilterKind,
    textures: Vec<&'static str>,
    parameters: ParameterSet,
}

/// A [`RenderBackend`] that renders on the CPU.
///
/// # Example
///
/// ```
/// use ipgraph::{CpuBackend, FilterGraph, FilterKind, ParameterSet};
/// use image::{Rgba, RgbaImage};
///
/// let mut backend = CpuBackend::new();
/// let source = backend.upload(RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255])));
///
/// let mut graph = FilterGraph::new(8, 8, source)?;
/// graph.add_node(&mut backend, FilterKind::HueShift, &ParameterSet::new())?;
/// graph.render_nodes(&mut backend)?;
///
/// let output = backend.texture(graph.output_texture()?).unwrap();
/// assert_eq!(output.dimensions(), (8, 8));
/// # Ok::<(), ipgraph::Error>(())
/// ```
pub struct CpuBackend {
    textures: HashMap<TextureId, RgbaImage>,
    programs: HashMap<FilterKind, Arc<ShaderProgram>>,
    next_texture: u64,
    active: Option<TextureId>,
    bound: Option<Bound>,
    releases: ReleaseQueue,
    draws: Vec<DrawRecord>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
            programs: HashMap::new(),
            next_texture: 1,
            active: None,
            bound: None,
            releases: ReleaseQueue::new(),
            draws: Vec::new(),
        }
    }

    /// Replaces the program handed out for `kind`.
    ///
    /// Nodes created afterwards bind `program`; a program whose kind or
    /// schema does not match is rejected when the node is built.
    pub fn register_program(&mut self, kind: FilterKind, program: ShaderProgram) {
        self.programs.insert(kind, Arc::new(program));
    }

    /// Makes `image` available as a source texture.
    pub fn upload(&mut self, image: RgbaImage) -> TextureId {
        let id = self.next_id();
        trace!(?id, width = image.width(), height = image.height(), "uploaded texture");
        self.textures.insert(id, image);
        id
    }

    /// Replaces the pixels of an uploaded texture, e.g. with the next video
    /// frame. The size may change.
    pub fn update(&mut self, id: TextureId, image: RgbaImage) -> Result<(), BackendError> {
        let slot = self.textures.get_mut(&id).ok_or(BackendError::UnknownTexture(id))?;
        *slot = image;
        Ok(())
    }

    /// Frees a texture created with [`CpuBackend::upload`].
    pub fn remove(&mut self, id: TextureId) -> Option<RgbaImage> {
        self.textures.remove(&id)
    }

    pub fn texture(&self, id: TextureId) -> Option<&RgbaImage> {
        self.textures.get(&id)
    }

    /// Number of textures currently held, uploads and render targets alike.
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Draws issued since the last [`RenderBackend::collect_garbage`], oldest
    /// first. The executor collects once per frame, so this is the current
    /// frame's draw order.
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn clear_draws(&mut self) {
        self.draws.clear();
    }

    fn next_id(&mut self) -> TextureId {
        let id = TextureId::new(self.next_texture);
        self.next_texture += 1;
        id
    }

    fn release_dropped(&mut self) {
        for id in self.releases.drain() {
            if self.textures.remove(&id).is_some() {
                trace!(?id, "released render target");
            }
        }
    }

    fn sampler(&self, id: TextureId) -> Result<Sampler<'_>, BackendError> {
        self.textures
            .get(&id)
            .map(Sampler::new)
            .ok_or(BackendError::UnknownTexture(id))
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
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
        self.textures.insert(id, RgbaImage::new(desc.width, desc.height));
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
        let textures = program
            .schema()
            .iter()
            .filter(|decl| decl.kind == ParameterKind::Texture)
            .map(|decl| decl.name)
            .collect();
        self.bound = Some(Bound {
            kind: program.kind(),
            textures,
            parameters: parameters.clone(),
        });
        Ok(())
    }

    fn draw_full_screen_quad(&mut self, _quad: &FullScreenQuad) -> Result<(), BackendError> {
        let target = self.active.ok_or(BackendError::NoActiveTarget)?;
        let bound = self.bound.as_ref().ok_or(BackendError::NoProgramBound)?;

        for name in &bound.textures {
            let id = bound
                .parameters
                .texture(name)
                .ok_or_else(|| BackendError::UnboundTexture(name.to_string()))?;
            if id == target {
                return Err(BackendError::Feedback(id));
            }
        }

        let (width, height) = self
            .textures
            .get(&target)
            .map(|t| t.dimensions())
            .ok_or(BackendError::UnknownTexture(target))?;

        let image = bound
            .parameters
            .texture("image")
            .ok_or_else(|| BackendError::UnboundTexture("image".to_string()))?;
        let primary = self.sampler(image)?;
        let secondary = match bound.parameters.texture("image2") {
            Some(id) => Some(self.sampler(id)?),
            None => None,
        };

        let size = Vec2::new(width as f32, height as f32);
        let resolution = bound.parameters.vec2("resolution").unwrap_or(size);
        let cell = Vec2::ONE / resolution;
        let kernel = Kernel::resolve(bound.kind, &bound.parameters);

        let output = RgbaImage::from_fn(width, height, |x, y| {
            let uv = (Vec2::new(x as f32, y as f32) + 0.5) / size;
            Rgba(quantize(kernel.shade(primary, secondary, cell, uv)))
        });

        let kind = bound.kind;
        self.textures.insert(target, output);
        self.draws.push(DrawRecord { kind, target });
        trace!(%kind, ?target, "cpu draw");
        Ok(())
    }

    fn collect_garbage(&mut self) {
        self.release_dropped();
        self.draws.clear();
    }
}
