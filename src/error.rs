//! Error taxonomy for graph construction, parameter validation and rendering.
//!
//! Every error is raised synchronously by the call that breaks the contract:
//! a misconfigured pipeline fails while it is being built, before any GPU work
//! is issued.

use thiserror::Error;

use crate::filter_graph::{GraphId, TextureId};
use crate::shader::FilterKind;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Structural misuse of the graph or node API.
    #[error("construction error: {0}")]
    Construction(#[from] ConstructionError),

    /// A parameter name or value that the bound program does not accept.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Output requested from a graph that has no nodes.
    #[error("graph has no nodes")]
    EmptyGraph,

    /// Failure reported by the rendering backend.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl Error {
    pub(crate) fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Structural errors detected while building nodes and graphs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstructionError {
    /// Subscribing would close a cycle in the render-before relation.
    #[error("subscribing {child:?} to {parent:?} would create a cycle")]
    CyclicSubscription { parent: GraphId, child: GraphId },

    /// A graph cannot render before itself.
    #[error("graph {0:?} cannot subscribe to itself")]
    SelfSubscription(GraphId),

    /// The id does not belong to this executor.
    #[error("unknown graph {0:?}")]
    UnknownGraph(GraphId),

    /// A required input texture was not supplied.
    #[error("{kind:?} requires input texture `{input}`")]
    MissingInput { kind: FilterKind, input: &'static str },

    /// The supplied program does not implement the requested kernel.
    #[error("program for {found:?} cannot back a {expected:?} node: {reason}")]
    ProgramMismatch {
        expected: FilterKind,
        found: FilterKind,
        reason: String,
    },

    /// Render targets must have a non-zero area.
    #[error("render target size {width}x{height} is empty")]
    ZeroSized { width: u32, height: u32 },

    /// No node exists at this position of the graph.
    #[error("no node at index {index} (graph has {len})")]
    UnknownNode { index: usize, len: usize },

    /// An appended node does not read the graph's current texture.
    #[error("node reads {found:?}, graph's current texture is {expected:?}")]
    InputMismatch {
        expected: TextureId,
        found: Option<TextureId>,
    },

    /// An appended node renders at a size other than the graph's.
    #[error("node renders {}x{}, graph is {}x{}", found.0, found.1, expected.0, expected.1)]
    SizeMismatch { expected: (u32, u32), found: (u32, u32) },

    /// The parameter is bound by the node itself and cannot be overridden.
    #[error("parameter `{0}` is managed by the node")]
    ReservedParameter(String),
}

/// Errors raised by a [`RenderBackend`](crate::RenderBackend) implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[error("failed to create device: {0}")]
    DeviceCreation(String),

    #[error("draw issued without an active render target")]
    NoActiveTarget,

    #[error("draw issued without a bound program")]
    NoProgramBound,

    #[error("texture {0:?} is not known to this backend")]
    UnknownTexture(TextureId),

    /// A pass tried to sample the texture it is writing.
    #[error("texture {0:?} is both sampled and written by the same pass")]
    Feedback(TextureId),

    /// A texture parameter of the bound program has no value.
    #[error("program parameter `{0}` has no texture bound")]
    UnboundTexture(String),

    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    /// Copying a texture back to host memory failed.
    #[error("texture readback failed: {0}")]
    Readback(String),
}
