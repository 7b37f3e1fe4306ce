//! Cross-graph scheduling.
//!
//! Graphs live in a [`GraphExecutor`] arena and refer to each other by
//! [`GraphId`]. A subscription says "render that graph before me"; the
//! executor keeps the relation acyclic and renders dependencies first.

use std::collections::HashSet;

use tracing::{debug, info_span};

use crate::backend::RenderBackend;
use crate::error::{ConstructionError, Result};
use crate::filter_graph::{FilterGraph, TextureId};

/// Handle to a graph owned by a [`GraphExecutor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(usize);

impl GraphId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Work done by one [`GraphExecutor::initialize_renderer`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Graphs rendered, the requested one included.
    pub graphs: usize,
    /// GPU passes issued across all of them.
    pub passes: usize,
}

/// Owns filter graphs and renders them in dependency order.
///
/// # Example
///
/// ```
/// use ipgraph::{ArithmeticOp, CpuBackend, FilterGraph, FilterKind, GraphExecutor, ParameterSet};
/// use image::RgbaImage;
///
/// let mut backend = CpuBackend::new();
/// let frame = backend.upload(RgbaImage::new(32, 32));
/// let mut executor = GraphExecutor::new();
///
/// // Blurred copy of the frame.
/// let mut blur = FilterGraph::new(32, 32, frame)?;
/// blur.add_node(&mut backend, FilterKind::GaussianBlur,
///     &ParameterSet::new().with("kernel_size", 5).with("sigma", 2.0))?;
/// let blurred = blur.output_texture()?;
/// let blur = executor.insert(blur);
///
/// // Unsharp mask: frame minus its blur.
/// let mut sharpen = FilterGraph::new(32, 32, frame)?;
/// sharpen.add_node(&mut backend, FilterKind::ImageArithmetic,
///     &ParameterSet::new().with("image2", blurred).with("operation", ArithmeticOp::Sub))?;
/// let sharpen = executor.insert(sharpen);
///
/// executor.subscribe_sub_graph(sharpen, blur)?;
/// let stats = executor.initialize_renderer(sharpen, &mut backend)?;
/// assert_eq!(stats.graphs, 2);
/// # Ok::<(), ipgraph::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct GraphExecutor {
    graphs: Vec<FilterGraph>,
}

impl GraphExecutor {
    pub fn new() -> Self {
        Self { graphs: Vec::new() }
    }

    /// Takes ownership of `graph`.
    pub fn insert(&mut self, graph: FilterGraph) -> GraphId {
        self.graphs.push(graph);
        GraphId(self.graphs.len() - 1)
    }

    pub fn graph(&self, id: GraphId) -> Result<&FilterGraph> {
        self.graphs
            .get(id.0)
            .ok_or_else(|| ConstructionError::UnknownGraph(id).into())
    }

    /// Mutable access, e.g. to append nodes or update parameters.
    pub fn graph_mut(&mut self, id: GraphId) -> Result<&mut FilterGraph> {
        self.graphs
            .get_mut(id.0)
            .ok_or_else(|| ConstructionError::UnknownGraph(id).into())
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Makes `child` render before `parent`.
    ///
    /// Subscribing twice is a no-op. Fails if the relation would become
    /// cyclic, including `parent == child`.
    pub fn subscribe_sub_graph(&mut self, parent: GraphId, child: GraphId) -> Result<&mut Self> {
        self.graph(parent)?;
        self.graph(child)?;
        if parent == child {
            return Err(ConstructionError::SelfSubscription(parent).into());
        }
        if self.reaches(child, parent) {
            return Err(ConstructionError::CyclicSubscription { parent, child }.into());
        }
        if self.graphs[parent.0].subscribe(child) {
            debug!(?parent, ?child, "subscribed sub-graph");
        }
        Ok(self)
    }

    /// Whether `to` is reachable from `from` along subscriptions.
    fn reaches(&self, from: GraphId, to: GraphId) -> bool {
        let mut visiting = HashSet::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if visiting.insert(id) {
                stack.extend(self.graphs[id.0].subscriptions().iter().copied());
            }
        }
        false
    }

    /// Render order for `root`: every subscribed graph after its own
    /// subscriptions, each graph once, `root` last.
    pub fn schedule(&self, root: GraphId) -> Result<Vec<GraphId>> {
        self.graph(root)?;
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        self.visit(root, &mut visited, &mut order);
        Ok(order)
    }

    fn visit(&self, id: GraphId, visited: &mut HashSet<GraphId>, order: &mut Vec<GraphId>) {
        if !visited.insert(id) {
            return;
        }
        for &child in self.graphs[id.0].subscriptions() {
            self.visit(child, visited, order);
        }
        order.push(id);
    }

    /// Renders `root` for one frame: subscribed graphs depth-first, then
    /// `root`'s own nodes in insertion order.
    ///
    /// Render targets dropped since the previous frame are released first.
    pub fn initialize_renderer(&mut self, root: GraphId, backend: &mut dyn RenderBackend) -> Result<RenderStats> {
        let span = info_span!("initialize_renderer", graph = root.0, backend = backend.name());
        let _enter = span.enter();

        backend.collect_garbage();
        let order = self.schedule(root)?;
        let mut stats = RenderStats::default();
        for id in order {
            let passes = self.graphs[id.0].render_nodes(backend)?;
            debug!(graph = id.0, passes, "rendered graph");
            stats.graphs += 1;
            stats.passes += passes;
        }
        Ok(stats)
    }

    /// The output texture of a graph's last node.
    pub fn output_texture(&self, id: GraphId) -> Result<TextureId> {
        self.graph(id)?.output_texture()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::error::Error;
    use crate::shader::{FilterKind, ParameterSet};
    use image::RgbaImage;

    fn executor_with(n: usize, backend: &mut CpuBackend) -> (GraphExecutor, Vec<GraphId>) {
        let source = backend.upload(RgbaImage::new(2, 2));
        let mut executor = GraphExecutor::new();
        let ids = (0..n)
            .map(|_| {
                let mut graph = FilterGraph::new(2, 2, source).unwrap();
                graph.add_node(backend, FilterKind::HueShift, &ParameterSet::new()).unwrap();
                executor.insert(graph)
            })
            .collect();
        (executor, ids)
    }

    #[test]
    fn self_subscription_is_rejected() {
        let mut backend = CpuBackend::new();
        let (mut executor, ids) = executor_with(1, &mut backend);
        assert!(matches!(
            executor.subscribe_sub_graph(ids[0], ids[0]),
            Err(Error::Construction(ConstructionError::SelfSubscription(_)))
        ));
    }

    #[test]
    fn indirect_cycles_are_rejected() {
        let mut backend = CpuBackend::new();
        let (mut executor, ids) = executor_with(3, &mut backend);
        executor
            .subscribe_sub_graph(ids[0], ids[1])
            .unwrap()
            .subscribe_sub_graph(ids[1], ids[2])
            .unwrap();
        assert!(matches!(
            executor.subscribe_sub_graph(ids[2], ids[0]),
            Err(Error::Construction(ConstructionError::CyclicSubscription { .. }))
        ));
        assert!(executor.graph(ids[2]).unwrap().subscriptions().is_empty());
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let mut backend = CpuBackend::new();
        let (mut executor, ids) = executor_with(1, &mut backend);
        let stranger = GraphId(9);
        assert!(matches!(
            executor.subscribe_sub_graph(ids[0], stranger),
            Err(Error::Construction(ConstructionError::UnknownGraph(id))) if id == stranger
        ));
        assert!(executor.initialize_renderer(stranger, &mut backend).is_err());
    }

    #[test]
    fn diamond_renders_shared_dependency_once() {
        let mut backend = CpuBackend::new();
        let (mut executor, ids) = executor_with(4, &mut backend);
        let [top, left, right, bottom] = [ids[0], ids[1], ids[2], ids[3]];
        executor.subscribe_sub_graph(top, left).unwrap();
        executor.subscribe_sub_graph(top, right).unwrap();
        executor.subscribe_sub_graph(left, bottom).unwrap();
        executor.subscribe_sub_graph(right, bottom).unwrap();

        assert_eq!(executor.schedule(top).unwrap(), vec![bottom, left, right, top]);
        let stats = executor.initialize_renderer(top, &mut backend).unwrap();
        assert_eq!(stats, RenderStats { graphs: 4, passes: 4 });
    }

    #[test]
    fn duplicate_subscription_is_ignored() {
        let mut backend = CpuBackend::new();
        let (mut executor, ids) = executor_with(2, &mut backend);
        executor.subscribe_sub_graph(ids[0], ids[1]).unwrap();
        executor.subscribe_sub_graph(ids[0], ids[1]).unwrap();
        assert_eq!(executor.graph(ids[0]).unwrap().subscriptions(), &[ids[1]]);
    }
}
