//! Rendering backends.
//!
//! The engine never touches pixels. It drives a [`RenderBackend`] through the
//! same four steps for every pass:
//!
//! ```text
//! set_active_render_target(Some(target))
//! bind_program(program, parameters)
//! draw_full_screen_quad(quad)
//! set_active_render_target(None)
//! ```
//!
//! Two implementations ship with the crate:
//!
//! - [`CpuBackend`]: a reference rasterizer that evaluates every catalog kernel
//!   on the CPU. It needs no GPU and lets callers inspect pixels.
//! - [`WgpuBackend`]: a headless wgpu device running the WGSL kernels in
//!   `src/shaders/`.
//!
//! Backends are also the kernel supply: [`RenderBackend::program`] hands out
//! the compiled program for a catalog entry, shared between every node that
//! uses it.

mod color;
mod cpu;
mod kernels;
mod uniforms;
mod wgpu_backend;

pub use cpu::{CpuBackend, DrawRecord};
pub use uniforms::{UniformBlock, UniformLayout};
pub use wgpu_backend::WgpuBackend;

use std::sync::Arc;

use crate::error::BackendError;
use crate::filter_graph::{FullScreenQuad, RenderTarget, RenderTargetDesc};
use crate::shader::{FilterKind, ParameterSet, ShaderProgram};

/// The rendering capability consumed by filter nodes.
///
/// Passes are issued in program order; a backend must make a render target's
/// writes visible before that texture is sampled by a later pass.
pub trait RenderBackend {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Returns the compiled program implementing `kind`.
    ///
    /// Repeated calls return the same shared program.
    fn program(&mut self, kind: FilterKind) -> Result<Arc<ShaderProgram>, BackendError>;

    /// Allocates an off-screen target. The returned [`RenderTarget`] owns the
    /// texture and hands it back when dropped.
    fn allocate_render_target(&mut self, desc: RenderTargetDesc) -> Result<RenderTarget, BackendError>;

    /// Selects the target subsequent draws write into; `None` unbinds.
    fn set_active_render_target(&mut self, target: Option<&RenderTarget>) -> Result<(), BackendError>;

    /// Binds a program and the values of its parameters for the next draw.
    fn bind_program(&mut self, program: &ShaderProgram, parameters: &ParameterSet) -> Result<(), BackendError>;

    /// Draws `quad` with the bound program into the active target,
    /// overwriting its previous contents.
    fn draw_full_screen_quad(&mut self, quad: &FullScreenQuad) -> Result<(), BackendError>;

    /// Frees the resources of render targets dropped since the last call.
    fn collect_garbage(&mut self);
}
