//! A linear chain of filters over one source texture.

use tracing::debug;

use crate::backend::RenderBackend;
use crate::error::{ConstructionError, Error, Result};
use crate::filter_graph::{Filter, FilterNode, GraphId, OutputMaterial, TextureId};
use crate::shader::{FilterKind, ParameterSet, ParameterValue};

/// An ordered pipeline of filters, all rendering at one fixed size.
///
/// Each [`add_node`](FilterGraph::add_node) call binds the new filter to the
/// graph's current texture and then makes the filter's output the new
/// current texture. Nodes cannot be reordered or removed.
///
/// # Example
///
/// ```
/// use ipgraph::{CpuBackend, FilterGraph, FilterKind, ParameterSet};
/// use image::RgbaImage;
///
/// let mut backend = CpuBackend::new();
/// let source = backend.upload(RgbaImage::new(64, 48));
///
/// let mut graph = FilterGraph::new(64, 48, source)?;
/// graph
///     .add_node(&mut backend, FilterKind::SeparableGaussianBlur,
///         &ParameterSet::new().with("kernel_size", 9).with("sigma", 3.0))?
///     .add_node(&mut backend, FilterKind::Laplacian, &ParameterSet::new())?;
///
/// assert_eq!(graph.len(), 2);
/// assert_eq!(graph.current_texture(), graph.output_texture()?);
/// # Ok::<(), ipgraph::Error>(())
/// ```
#[derive(Debug)]
pub struct FilterGraph {
    width: u32,
    height: u32,
    source: TextureId,
    nodes: Vec<Filter>,
    subscriptions: Vec<GraphId>,
}

impl FilterGraph {
    /// Creates an empty graph reading `source`.
    pub fn new(width: u32, height: u32, source: TextureId) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ConstructionError::ZeroSized { width, height }.into());
        }
        Ok(Self {
            width,
            height,
            source,
            nodes: Vec::new(),
            subscriptions: Vec::new(),
        })
    }

    /// Appends a filter reading the current texture.
    ///
    /// On error the graph is left unchanged.
    ///
    /// # Returns
    ///
    /// The graph, for chaining further calls.
    pub fn add_node(
        &mut self,
        backend: &mut dyn RenderBackend,
        kind: FilterKind,
        overrides: &ParameterSet,
    ) -> Result<&mut Self> {
        let node = Filter::new(kind, backend, self.width, self.height, self.current_texture(), overrides)?;
        debug!(%kind, index = self.nodes.len(), output = ?node.output_texture(), "added filter node");
        self.nodes.push(node);
        Ok(self)
    }

    /// Appends an already constructed filter.
    ///
    /// The filter must read this graph's current texture and render at the
    /// graph's size; it is not rebound. Otherwise the graph is left unchanged.
    pub fn push_node(&mut self, node: impl Into<Filter>) -> Result<&mut Self> {
        let node = node.into();
        let expected = self.current_texture();
        let found = node.input_texture();
        if found != Some(expected) {
            return Err(ConstructionError::InputMismatch { expected, found }.into());
        }
        let target = node.render_target();
        let size = (target.width(), target.height());
        if size != (self.width, self.height) {
            return Err(ConstructionError::SizeMismatch {
                expected: (self.width, self.height),
                found: size,
            }
            .into());
        }
        debug!(kind = %node.kind(), index = self.nodes.len(), "pushed filter node");
        self.nodes.push(node);
        Ok(self)
    }

    /// Renders every node once, in insertion order.
    ///
    /// Subscribed graphs are not rendered; use
    /// [`GraphExecutor::initialize_renderer`](crate::GraphExecutor::initialize_renderer).
    ///
    /// Returns the number of GPU passes issued.
    pub fn render_nodes(&mut self, backend: &mut dyn RenderBackend) -> Result<usize> {
        let mut passes = 0;
        for node in &mut self.nodes {
            node.render_pass(backend)?;
            passes += node.passes();
        }
        Ok(passes)
    }

    /// The output of the last node, or the source texture if there is none.
    pub fn current_texture(&self) -> TextureId {
        self.nodes.last().map_or(self.source, |n| n.output_texture())
    }

    /// The output texture of the last node.
    pub fn output_texture(&self) -> Result<TextureId> {
        self.nodes.last().map(|n| n.output_texture()).ok_or(Error::EmptyGraph)
    }

    /// The display material of the last node.
    pub fn output_material(&self) -> Result<OutputMaterial<'_>> {
        self.nodes.last().map(|n| n.material()).ok_or(Error::EmptyGraph)
    }

    /// Updates a parameter of the node at `index`.
    pub fn set_parameter(&mut self, index: usize, name: &str, value: impl Into<ParameterValue>) -> Result<()> {
        let len = self.nodes.len();
        let node = self
            .nodes
            .get_mut(index)
            .ok_or(ConstructionError::UnknownNode { index, len })?;
        node.set_parameter(name, value.into())
    }

    pub fn node(&self, index: usize) -> Option<&Filter> {
        self.nodes.get(index)
    }

    pub fn node_mut(&mut self, index: usize) -> Option<&mut Filter> {
        self.nodes.get_mut(index)
    }

    pub fn nodes(&self) -> &[Filter] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn source(&self) -> TextureId {
        self.source
    }

    /// Graphs that render before this one, in subscription order.
    pub fn subscriptions(&self) -> &[GraphId] {
        &self.subscriptions
    }

    pub(crate) fn subscribe(&mut self, child: GraphId) -> bool {
        if self.subscriptions.contains(&child) {
            return false;
        }
        self.subscriptions.push(child);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::filter_graph::{HueShift, SeparableGaussianBlur};
    use image::RgbaImage;

    #[test]
    fn empty_graph_has_no_output() {
        let mut backend = CpuBackend::new();
        let source = backend.upload(RgbaImage::new(2, 2));
        let graph = FilterGraph::new(2, 2, source).unwrap();
        assert_eq!(graph.current_texture(), source);
        assert!(matches!(graph.output_texture(), Err(Error::EmptyGraph)));
        assert!(matches!(graph.output_material(), Err(Error::EmptyGraph)));
    }

    #[test]
    fn zero_sized_graph_is_rejected() {
        assert!(matches!(
            FilterGraph::new(0, 0, TextureId::new(1)),
            Err(Error::Construction(ConstructionError::ZeroSized { .. }))
        ));
    }

    #[test]
    fn each_node_reads_the_previous_output() {
        let mut backend = CpuBackend::new();
        let source = backend.upload(RgbaImage::new(4, 4));
        let mut graph = FilterGraph::new(4, 4, source).unwrap();
        graph
            .add_node(&mut backend, FilterKind::HueShift, &ParameterSet::new())
            .unwrap()
            .add_node(&mut backend, FilterKind::Median, &ParameterSet::new())
            .unwrap();

        let first = graph.node(0).unwrap();
        let second = graph.node(1).unwrap();
        assert_eq!(first.parameters().texture("image"), Some(source));
        assert_eq!(second.parameters().texture("image"), Some(first.output_texture()));
    }

    #[test]
    fn failed_add_leaves_graph_unchanged() {
        let mut backend = CpuBackend::new();
        let source = backend.upload(RgbaImage::new(4, 4));
        let mut graph = FilterGraph::new(4, 4, source).unwrap();
        let bad = ParameterSet::new().with("kernel_size", 2);
        assert!(graph.add_node(&mut backend, FilterKind::Median, &bad).is_err());
        assert!(graph.is_empty());
        assert_eq!(graph.current_texture(), source);
    }

    #[test]
    fn set_parameter_checks_index() {
        let mut backend = CpuBackend::new();
        let source = backend.upload(RgbaImage::new(4, 4));
        let mut graph = FilterGraph::new(4, 4, source).unwrap();
        graph.add_node(&mut backend, FilterKind::Laplacian, &ParameterSet::new()).unwrap();

        graph.set_parameter(0, "norm", true).unwrap();
        assert_eq!(graph.node(0).unwrap().parameters().bool("norm"), Some(true));
        assert!(matches!(
            graph.set_parameter(3, "norm", true),
            Err(Error::Construction(ConstructionError::UnknownNode { index: 3, len: 1 }))
        ));
    }

    #[test]
    fn pushed_node_must_read_current_texture() {
        let mut backend = CpuBackend::new();
        let source = backend.upload(RgbaImage::new(8, 8));
        let other = backend.upload(RgbaImage::new(8, 8));
        let mut graph = FilterGraph::new(8, 8, source).unwrap();

        let stray = HueShift::new(&mut backend, 8, 8, other, &ParameterSet::new()).unwrap();
        assert!(matches!(
            graph.push_node(stray),
            Err(Error::Construction(ConstructionError::InputMismatch { expected, found }))
                if expected == source && found == Some(other)
        ));
        assert!(graph.is_empty());

        let blur = SeparableGaussianBlur::new(&mut backend, 8, 8, source, &ParameterSet::new()).unwrap();
        let blurred = blur.output_texture();
        graph.push_node(blur).unwrap();
        assert_eq!(graph.current_texture(), blurred);
    }

    #[test]
    fn pushed_node_must_match_graph_size() {
        let mut backend = CpuBackend::new();
        let source = backend.upload(RgbaImage::new(8, 8));
        let mut graph = FilterGraph::new(8, 8, source).unwrap();

        let wide = HueShift::new(&mut backend, 16, 16, source, &ParameterSet::new()).unwrap();
        assert!(matches!(
            graph.push_node(wide),
            Err(Error::Construction(ConstructionError::SizeMismatch {
                expected: (8, 8),
                found: (16, 16)
            }))
        ));
        assert!(graph.is_empty());
        assert_eq!(graph.current_texture(), source);
    }

    #[test]
    fn render_counts_hidden_passes() {
        let mut backend = CpuBackend::new();
        let source = backend.upload(RgbaImage::new(4, 4));
        let mut graph = FilterGraph::new(4, 4, source).unwrap();
        graph
            .add_node(&mut backend, FilterKind::SeparableGaussianBlur, &ParameterSet::new())
            .unwrap()
            .add_node(&mut backend, FilterKind::HueShift, &ParameterSet::new())
            .unwrap();
        assert_eq!(graph.render_nodes(&mut backend).unwrap(), 3);
        assert_eq!(backend.draws().len(), 3);
    }
}
