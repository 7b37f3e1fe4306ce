//! Two-pass separable gaussian blur.

use std::sync::Arc;

use crate::backend::RenderBackend;
use crate::error::Result;
use crate::filter_graph::filter_node::{FilterNode, FilterPass, sealed};
use crate::filter_graph::{RenderTarget, TextureId};
use crate::shader::{FilterKind, ParameterSet, ParameterValue, ShaderProgram};

/// Progress of the most recent [`SeparableGaussianBlur::render_pass`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassState {
    /// Nothing rendered yet.
    Uninitialized,
    /// The horizontal pass has written the intermediate target.
    FirstPassReady,
    /// Both passes have run; the output target is valid.
    Complete,
}

/// Gaussian blur as a horizontal pass followed by a vertical one.
///
/// Equivalent to [`GaussianBlur`](crate::GaussianBlur) with the same
/// `sigma` and `kernel_size` up to 8-bit rounding of the intermediate
/// image, at `2 * kernel_size` instead of `kernel_size²` samples per pixel.
///
/// ```text
///   input ──▶ [first pass, along x] ──▶ intermediate ──▶ [second pass, along y] ──▶ output
/// ```
///
/// Both passes share one program and one set of caller parameters; the
/// node sets `first_pass` on each itself.
#[derive(Debug)]
pub struct SeparableGaussianBlur {
    first: FilterPass,
    second: FilterPass,
    state: PassState,
}

impl SeparableGaussianBlur {
    pub fn new(
        backend: &mut dyn RenderBackend,
        width: u32,
        height: u32,
        image: TextureId,
        overrides: &ParameterSet,
    ) -> Result<Self> {
        let kind = FilterKind::SeparableGaussianBlur;
        let first = FilterPass::new(
            backend,
            kind,
            width,
            height,
            ParameterSet::new().with("image", image).with("first_pass", true),
            overrides,
        )?;
        let second = FilterPass::new(
            backend,
            kind,
            width,
            height,
            ParameterSet::new()
                .with("image", first.output_texture())
                .with("first_pass", false),
            overrides,
        )?;
        Ok(Self {
            first,
            second,
            state: PassState::Uninitialized,
        })
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    /// Output of the horizontal pass, input of the vertical one.
    pub fn intermediate_texture(&self) -> TextureId {
        self.first.output_texture()
    }

    /// Parameters bound by the horizontal pass.
    pub fn first_pass_parameters(&self) -> &ParameterSet {
        self.first.parameters()
    }
}

impl sealed::Sealed for SeparableGaussianBlur {}

impl FilterNode for SeparableGaussianBlur {
    fn kind(&self) -> FilterKind {
        FilterKind::SeparableGaussianBlur
    }

    fn render_pass(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        self.state = PassState::Uninitialized;
        self.first.render(backend)?;
        self.state = PassState::FirstPassReady;
        self.second.render(backend)?;
        self.state = PassState::Complete;
        Ok(())
    }

    fn input_texture(&self) -> Option<TextureId> {
        self.first.parameters().texture("image")
    }

    fn render_target(&self) -> &RenderTarget {
        self.second.target()
    }

    fn program(&self) -> &Arc<ShaderProgram> {
        self.second.program()
    }

    fn parameters(&self) -> &ParameterSet {
        self.second.parameters()
    }

    /// Applies the change to both passes.
    fn set_parameter(&mut self, name: &str, value: ParameterValue) -> Result<()> {
        self.first.set_parameter(name, value)?;
        self.second.set_parameter(name, value)
    }

    fn passes(&self) -> usize {
        2
    }

    fn render_count(&self) -> u64 {
        self.second.renders()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use image::RgbaImage;

    fn blur(backend: &mut CpuBackend) -> SeparableGaussianBlur {
        let image = backend.upload(RgbaImage::new(8, 8));
        let overrides = ParameterSet::new().with("kernel_size", 5).with("sigma", 2.0);
        SeparableGaussianBlur::new(backend, 8, 8, image, &overrides).unwrap()
    }

    #[test]
    fn second_pass_reads_first_pass_output() {
        let mut backend = CpuBackend::new();
        let node = blur(&mut backend);
        assert_eq!(node.first_pass_parameters().bool("first_pass"), Some(true));
        assert_eq!(node.parameters().bool("first_pass"), Some(false));
        assert_eq!(node.parameters().texture("image"), Some(node.intermediate_texture()));
        assert_ne!(node.intermediate_texture(), node.output_texture());
    }

    #[test]
    fn inner_pass_renders_before_outer() {
        let mut backend = CpuBackend::new();
        let mut node = blur(&mut backend);
        assert_eq!(node.state(), PassState::Uninitialized);

        node.render_pass(&mut backend).unwrap();
        assert_eq!(node.state(), PassState::Complete);
        let targets: Vec<_> = backend.draws().iter().map(|d| d.target).collect();
        assert_eq!(targets, vec![node.intermediate_texture(), node.output_texture()]);
    }

    #[test]
    fn failed_rerender_does_not_report_stale_state() {
        let mut backend = CpuBackend::new();
        let mut node = blur(&mut backend);
        node.render_pass(&mut backend).unwrap();
        assert_eq!(node.state(), PassState::Complete);

        let source = node.first_pass_parameters().texture("image").unwrap();
        backend.remove(source);
        assert!(node.render_pass(&mut backend).is_err());
        assert_eq!(node.state(), PassState::Uninitialized);
    }

    #[test]
    fn parameter_updates_reach_both_passes() {
        let mut backend = CpuBackend::new();
        let mut node = blur(&mut backend);
        node.set_parameter("sigma", ParameterValue::Float(0.5)).unwrap();
        assert_eq!(node.first_pass_parameters().float("sigma"), Some(0.5));
        assert_eq!(node.parameters().float("sigma"), Some(0.5));
        assert!(node.set_parameter("first_pass", ParameterValue::Bool(true)).is_err());
    }
}
