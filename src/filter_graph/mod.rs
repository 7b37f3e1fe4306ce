//! Filter graph engine: chains of off-screen GPU filters with explicit
//! dependency ordering between graphs.
//!
//! Each node owns one render target and reads the output of the node before
//! it. A graph may subscribe other graphs that must render first, typically
//! because one of its nodes samples their output as a second input.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────┐    ┌──────────────┐
//!  frame ────────▶│ GaussianBlur │───▶│   Scaling    │─────────┐   (sub-graph)
//!                 └──────────────┘    └──────────────┘         │
//!                                                         image2
//!                 ┌──────────────┐    ┌──────────────┐    ┌────▼─────────┐
//!  frame ────────▶│   HueShift   │───▶│  Separable   │───▶│    Image     │───▶ display
//!                 └──────────────┘    │ (2 passes)   │    │  Arithmetic  │
//!                                     └──────────────┘    └──────────────┘
//! ```
//!
//! The executor renders the sub-graph first, then the main graph's nodes in
//! insertion order. Hidden passes, such as the separable blur's horizontal
//! pass, render before the pass that reads them.
//!
//! # Node Types
//!
//! - [`Scaling`]: resampling through a 2x2 coordinate scale
//! - [`ImageArithmetic`]: add/sub/mul/div of two textures
//! - [`GaussianBlur`] / [`SeparableGaussianBlur`]: direct and two-pass blur
//! - [`LaplacianFilter`] / [`LaplacianOfGaussian`]: edge detection
//! - [`MedianFilter`]: neighborhood median
//! - [`HueShift`]: hue rotation in CIELAB
//!
//! # Example
//!
//! ```
//! use ipgraph::{CpuBackend, FilterGraph, FilterKind, GraphExecutor, ParameterSet};
//! use image::RgbaImage;
//!
//! let mut backend = CpuBackend::new();
//! let frame = backend.upload(RgbaImage::new(16, 16));
//!
//! let mut graph = FilterGraph::new(16, 16, frame)?;
//! graph
//!     .add_node(&mut backend, FilterKind::HueShift, &ParameterSet::new().with("hue_shift", 90.0))?
//!     .add_node(&mut backend, FilterKind::Median, &ParameterSet::new().with("kernel_size", 3))?;
//!
//! let mut executor = GraphExecutor::new();
//! let id = executor.insert(graph);
//!
//! // Once per display frame:
//! executor.initialize_renderer(id, &mut backend)?;
//! let shown = executor.output_texture(id)?;
//! # let _ = shown;
//! # Ok::<(), ipgraph::Error>(())
//! ```

mod executor;
mod filter_node;
mod filter_nodes;
mod graph;
mod render_target;
mod separable_nodes;

pub use executor::{GraphExecutor, GraphId, RenderStats};
pub use filter_node::{FilterNode, OutputMaterial};
pub use filter_nodes::{
    Filter, GaussianBlur, HueShift, ImageArithmetic, LaplacianFilter, LaplacianOfGaussian, MedianFilter,
    Scaling,
};
pub use graph::FilterGraph;
pub use render_target::{
    FullScreenQuad, PixelFormat, QuadVertex, ReleaseQueue, ReleaseSender, RenderTarget, RenderTargetDesc,
    TextureId,
};
pub use separable_nodes::{PassState, SeparableGaussianBlur};
