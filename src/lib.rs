//! # ipgraph
//!
//! **GPU image filter graphs: chain shader passes over a frame, render them
//! in dependency order.**
//!
//! A [`FilterGraph`] is a chain of catalog filters over one source texture.
//! Each filter owns an off-screen render target and reads the output of the
//! filter before it. Graphs live in a [`GraphExecutor`], which lets one graph
//! subscribe to others that must render first, and renders a whole frame with
//! one [`initialize_renderer`](GraphExecutor::initialize_renderer) call.
//!
//! ## Quick Start
//!
//! ```
//! use ipgraph::*;
//! use image::{Rgba, RgbaImage};
//!
//! let mut backend = CpuBackend::new();
//! let frame = backend.upload(RgbaImage::from_pixel(32, 32, Rgba([200, 80, 40, 255])));
//!
//! let mut graph = FilterGraph::new(32, 32, frame)?;
//! graph
//!     .add_node(&mut backend, FilterKind::SeparableGaussianBlur,
//!         &ParameterSet::new().with("kernel_size", 7).with("sigma", 2.0))?
//!     .add_node(&mut backend, FilterKind::HueShift,
//!         &ParameterSet::new().with("hue_shift", 120.0))?;
//!
//! let mut executor = GraphExecutor::new();
//! let id = executor.insert(graph);
//! let stats = executor.initialize_renderer(id, &mut backend)?;
//! assert_eq!(stats.passes, 3);
//!
//! let pixels = backend.texture(executor.output_texture(id)?).unwrap();
//! assert_eq!(pixels.dimensions(), (32, 32));
//! # Ok::<(), Error>(())
//! ```
//!
//! ## Backends
//!
//! Nodes never touch pixels; they drive a [`RenderBackend`]. [`WgpuBackend`]
//! runs the WGSL kernels on a headless GPU device, [`CpuBackend`] evaluates
//! the same kernels on the CPU for tests and tools.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events and spans. It never installs a
//! subscriber; that is up to the application.

mod backend;
mod error;
mod filter_graph;
mod gpu;
mod shader;

pub use backend::{CpuBackend, DrawRecord, RenderBackend, UniformBlock, UniformLayout, WgpuBackend};
pub use error::{BackendError, ConstructionError, Error, Result};
pub use filter_graph::{
    Filter, FilterGraph, FilterNode, FullScreenQuad, GaussianBlur, GraphExecutor, GraphId, HueShift,
    ImageArithmetic, LaplacianFilter, LaplacianOfGaussian, MedianFilter, OutputMaterial, PassState, PixelFormat,
    QuadVertex, ReleaseQueue, ReleaseSender, RenderStats, RenderTarget, RenderTargetDesc, Scaling,
    SeparableGaussianBlur, TextureId,
};
pub use gpu::{GpuConfig, GpuContext};
pub use shader::{
    ArithmeticOp, FilterKind, Interpolation, MAX_KERNEL_SIZE, ParameterDecl, ParameterKind, ParameterSchema, ParameterSet,
    ParameterValue, ShaderProgram, ShaderStage,
};
