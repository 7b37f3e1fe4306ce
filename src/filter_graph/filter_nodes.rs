//! Single-pass catalog filters and the [`Filter`] sum type.

use std::sync::Arc;

use tracing::warn;

use crate::backend::RenderBackend;
use crate::error::Result;
use crate::filter_graph::filter_node::{FilterNode, FilterPass, sealed};
use crate::filter_graph::{RenderTarget, SeparableGaussianBlur, TextureId};
use crate::shader::{FilterKind, ParameterSet, ParameterValue, ShaderProgram};

/// Windows above this size make the median visibly expensive.
const MEDIAN_WARN_KERNEL_SIZE: i32 = 7;

macro_rules! single_pass_node {
    ($node:ident, $kind:expr) => {
        impl sealed::Sealed for $node {}

        impl FilterNode for $node {
            fn kind(&self) -> FilterKind {
                $kind
            }

            fn render_pass(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
                self.pass.render(backend)
            }

            fn render_target(&self) -> &RenderTarget {
                self.pass.target()
            }

            fn program(&self) -> &Arc<ShaderProgram> {
                self.pass.program()
            }

            fn parameters(&self) -> &ParameterSet {
                self.pass.parameters()
            }

            fn set_parameter(&mut self, name: &str, value: ParameterValue) -> Result<()> {
                self.pass.set_parameter(name, value)
            }

            fn render_count(&self) -> u64 {
                self.pass.renders()
            }
        }
    };
}

fn input(texture: TextureId) -> ParameterSet {
    ParameterSet::new().with("image", texture)
}

/// Resamples the input through a 2x2 scale of the sample coordinates.
///
/// `scale_x = 0.5` shows the left half of the input stretched over the
/// whole target. See [`Interpolation`](crate::Interpolation) for the
/// sampling policies.
#[derive(Debug)]
pub struct Scaling {
    pass: FilterPass,
}

impl Scaling {
    pub fn new(
        backend: &mut dyn RenderBackend,
        width: u32,
        height: u32,
        image: TextureId,
        overrides: &ParameterSet,
    ) -> Result<Self> {
        let pass = FilterPass::new(backend, FilterKind::Scaling, width, height, input(image), overrides)?;
        Ok(Self { pass })
    }
}

single_pass_node!(Scaling, FilterKind::Scaling);

/// Combines two textures channel by channel.
///
/// `image2` is sampled at `scale * (uv + (center_x, center_y))`; the result
/// is `op(image, image2) * scale_factor + offset` on RGB. Alpha is taken
/// from `image` unchanged.
#[derive(Debug)]
pub struct ImageArithmetic {
    pass: FilterPass,
}

impl ImageArithmetic {
    /// Builds the node with `image2` taken from `overrides`.
    ///
    /// Fails with [`ConstructionError::MissingInput`](crate::ConstructionError::MissingInput)
    /// when `overrides` has no `image2`.
    pub fn new(
        backend: &mut dyn RenderBackend,
        width: u32,
        height: u32,
        image: TextureId,
        overrides: &ParameterSet,
    ) -> Result<Self> {
        let pass = FilterPass::new(
            backend,
            FilterKind::ImageArithmetic,
            width,
            height,
            input(image),
            overrides,
        )?;
        Ok(Self { pass })
    }

    /// Builds the node with both inputs given explicitly.
    pub fn with_inputs(
        backend: &mut dyn RenderBackend,
        width: u32,
        height: u32,
        image: TextureId,
        image2: TextureId,
        overrides: &ParameterSet,
    ) -> Result<Self> {
        let overrides = overrides.clone().with("image2", image2);
        Self::new(backend, width, height, image, &overrides)
    }
}

single_pass_node!(ImageArithmetic, FilterKind::ImageArithmetic);

/// Direct 2-D gaussian blur, `kernel_size²` samples per pixel.
///
/// Prefer [`SeparableGaussianBlur`] for anything but small windows.
#[derive(Debug)]
pub struct GaussianBlur {
    pass: FilterPass,
}

impl GaussianBlur {
    pub fn new(
        backend: &mut dyn RenderBackend,
        width: u32,
        height: u32,
        image: TextureId,
        overrides: &ParameterSet,
    ) -> Result<Self> {
        let pass = FilterPass::new(backend, FilterKind::GaussianBlur, width, height, input(image), overrides)?;
        Ok(Self { pass })
    }
}

single_pass_node!(GaussianBlur, FilterKind::GaussianBlur);

/// Fixed 3x3 Laplacian on RGB, optionally rescaled to unit length.
#[derive(Debug)]
pub struct LaplacianFilter {
    pass: FilterPass,
}

impl LaplacianFilter {
    pub fn new(
        backend: &mut dyn RenderBackend,
        width: u32,
        height: u32,
        image: TextureId,
        overrides: &ParameterSet,
    ) -> Result<Self> {
        let pass = FilterPass::new(backend, FilterKind::Laplacian, width, height, input(image), overrides)?;
        Ok(Self { pass })
    }
}

single_pass_node!(LaplacianFilter, FilterKind::Laplacian);

#[derive(Debug)]
pub struct LaplacianOfGaussian {
    pass: FilterPass,
}

impl LaplacianOfGaussian {
    pub fn new(
        backend: &mut dyn RenderBackend,
        width: u32,
        height: u32,
        image: TextureId,
        overrides: &ParameterSet,
    ) -> Result<Self> {
        let pass = FilterPass::new(
            backend,
            FilterKind::LaplacianOfGaussian,
            width,
            height,
            input(image),
            overrides,
        )?;
        Ok(Self { pass })
    }
}

single_pass_node!(LaplacianOfGaussian, FilterKind::LaplacianOfGaussian);

/// Per-channel median over a `kernel_size x kernel_size` window.
///
/// The median is neither separable nor cheap on a GPU: cost grows with the
/// square of the window, and each sample is compared against every other.
/// Keep `kernel_size` small.
#[derive(Debug)]
pub struct MedianFilter {
    pass: FilterPass,
}

impl MedianFilter {
    pub fn new(
        backend: &mut dyn RenderBackend,
        width: u32,
        height: u32,
        image: TextureId,
        overrides: &ParameterSet,
    ) -> Result<Self> {
        let pass = FilterPass::new(backend, FilterKind::Median, width, height, input(image), overrides)?;
        if let Some(size) = pass.parameters().int("kernel_size").filter(|&s| s > MEDIAN_WARN_KERNEL_SIZE) {
            warn!(
                kernel_size = size,
                "median filter is not separable; cost per pixel grows quadratically with the window"
            );
        }
        Ok(Self { pass })
    }
}

single_pass_node!(MedianFilter, FilterKind::Median);

/// Rotates hue in CIELAB by `hue_shift` degrees, keeping lightness and
/// chroma.
#[derive(Debug)]
pub struct HueShift {
    pass: FilterPass,
}

impl HueShift {
    pub fn new(
        backend: &mut dyn RenderBackend,
        width: u32,
        height: u32,
        image: TextureId,
        overrides: &ParameterSet,
    ) -> Result<Self> {
        let pass = FilterPass::new(backend, FilterKind::HueShift, width, height, input(image), overrides)?;
        Ok(Self { pass })
    }
}

single_pass_node!(HueShift, FilterKind::HueShift);

/// Any catalog filter.
///
/// This is what a [`FilterGraph`](crate::FilterGraph) stores: the set of
/// node types is closed, so each graph position is one of these variants.
#[derive(Debug)]
pub enum Filter {
    Scaling(Scaling),
    ImageArithmetic(ImageArithmetic),
    GaussianBlur(GaussianBlur),
    SeparableGaussianBlur(SeparableGaussianBlur),
    Laplacian(LaplacianFilter),
    LaplacianOfGaussian(LaplacianOfGaussian),
    Median(MedianFilter),
    HueShift(HueShift),
}

impl Filter {
    /// Constructs the catalog filter for `kind` reading `image`.
    ///
    /// # Arguments
    ///
    /// * `backend` - Supplies the program and allocates the render target
    /// * `width`, `height` - Render target size
    /// * `image` - Primary input texture
    /// * `overrides` - Parameter values replacing catalog defaults; for
    ///   [`FilterKind::ImageArithmetic`] this must include `image2`
    pub fn new(
        kind: FilterKind,
        backend: &mut dyn RenderBackend,
        width: u32,
        height: u32,
        image: TextureId,
        overrides: &ParameterSet,
    ) -> Result<Self> {
        Ok(match kind {
            FilterKind::Scaling => Scaling::new(backend, width, height, image, overrides)?.into(),
            FilterKind::ImageArithmetic => ImageArithmetic::new(backend, width, height, image, overrides)?.into(),
            FilterKind::GaussianBlur => GaussianBlur::new(backend, width, height, image, overrides)?.into(),
            FilterKind::SeparableGaussianBlur => {
                SeparableGaussianBlur::new(backend, width, height, image, overrides)?.into()
            }
            FilterKind::Laplacian => LaplacianFilter::new(backend, width, height, image, overrides)?.into(),
            FilterKind::LaplacianOfGaussian => {
                LaplacianOfGaussian::new(backend, width, height, image, overrides)?.into()
            }
            FilterKind::Median => MedianFilter::new(backend, width, height, image, overrides)?.into(),
            FilterKind::HueShift => HueShift::new(backend, width, height, image, overrides)?.into(),
        })
    }

    fn as_node(&self) -> &dyn FilterNode {
        match self {
            Filter::Scaling(n) => n,
            Filter::ImageArithmetic(n) => n,
            Filter::GaussianBlur(n) => n,
            Filter::SeparableGaussianBlur(n) => n,
            Filter::Laplacian(n) => n,
            Filter::LaplacianOfGaussian(n) => n,
            Filter::Median(n) => n,
            Filter::HueShift(n) => n,
        }
    }

    fn as_node_mut(&mut self) -> &mut dyn FilterNode {
        match self {
            Filter::Scaling(n) => n,
            Filter::ImageArithmetic(n) => n,
            Filter::GaussianBlur(n) => n,
            Filter::SeparableGaussianBlur(n) => n,
            Filter::Laplacian(n) => n,
            Filter::LaplacianOfGaussian(n) => n,
            Filter::Median(n) => n,
            Filter::HueShift(n) => n,
        }
    }
}

impl sealed::Sealed for Filter {}

impl FilterNode for Filter {
    fn kind(&self) -> FilterKind {
        self.as_node().kind()
    }

    fn render_pass(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        self.as_node_mut().render_pass(backend)
    }

    fn input_texture(&self) -> Option<TextureId> {
        self.as_node().input_texture()
    }

    fn render_target(&self) -> &RenderTarget {
        self.as_node().render_target()
    }

    fn program(&self) -> &Arc<ShaderProgram> {
        self.as_node().program()
    }

    fn parameters(&self) -> &ParameterSet {
        self.as_node().parameters()
    }

    fn set_parameter(&mut self, name: &str, value: ParameterValue) -> Result<()> {
        self.as_node_mut().set_parameter(name, value)
    }

    fn passes(&self) -> usize {
        self.as_node().passes()
    }

    fn render_count(&self) -> u64 {
        self.as_node().render_count()
    }
}

macro_rules! filter_from {
    ($($variant:ident($node:ty)),* $(,)?) => {
        $(
            impl From<$node> for Filter {
                fn from(node: $node) -> Self {
                    Filter::$variant(node)
                }
            }
        )*
    };
}

filter_from!(
    Scaling(Scaling),
    ImageArithmetic(ImageArithmetic),
    GaussianBlur(GaussianBlur),
    SeparableGaussianBlur(SeparableGaussianBlur),
    Laplacian(LaplacianFilter),
    LaplacianOfGaussian(LaplacianOfGaussian),
    Median(MedianFilter),
    HueShift(HueShift),
);
