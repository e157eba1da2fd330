//! Flow execution traversal
//!
//! Traversal is synchronous, depth-first recursion: a node's behavior runs,
//! selects which flow outputs to follow (branch 0 by default), and the graph
//! recurses into whatever node hangs off each selected live output pin.

use super::graph::NodeGraph;
use super::node::{NodeId, NodeKind};
use super::pin::{PinId, PinKind};

/// What a behavior sees while it executes: read access to the graph plus the
/// branch selection for the traversal step that follows.
pub struct ExecutionContext<'a> {
    graph: &'a NodeGraph,
    node: NodeId,
    branches: Vec<usize>,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(graph: &'a NodeGraph, node: NodeId) -> Self {
        Self {
            graph,
            node,
            branches: vec![0],
        }
    }

    /// The node currently executing.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The graph being traversed.
    pub fn graph(&self) -> &NodeGraph {
        self.graph
    }

    /// Number of flow outputs this node currently has.
    pub fn flow_output_count(&self) -> usize {
        self.graph.node(self.node).map_or(0, |n| n.flow_outputs().len())
    }

    /// Follow exactly one flow output after this behavior returns.
    pub fn select_branch(&mut self, index: usize) {
        self.branches.clear();
        self.branches.push(index);
    }

    /// Follow several flow outputs, in the given order.
    pub fn select_branches(&mut self, indices: impl IntoIterator<Item = usize>) {
        self.branches = indices.into_iter().collect();
    }

    /// The id of this node's nth data input pin, if any.
    pub fn data_input(&self, index: usize) -> Option<PinId> {
        self.graph.input_pins_with(self.node, PinKind::Data).nth(index)
    }

    /// Reads the nth data input's stored value; missing pin or mismatched
    /// type yields `T::default()`.
    pub fn read<T: Copy + Default + 'static>(&self, index: usize) -> T {
        match self.data_input(index) {
            Some(pin) => self.graph.value(pin),
            None => T::default(),
        }
    }

    pub(crate) fn into_branches(self) -> Vec<usize> {
        self.branches
    }
}

impl NodeGraph {
    /// Runs flow traversal starting at `node_id`.
    ///
    /// Non-execution and unknown nodes are ignored. An out-of-range or
    /// unconnected branch silently ends that chain. A flow cycle that
    /// re-enters a node already on the traversal stack ends there too: the
    /// behavior object is out of its slot while it runs, and an empty slot
    /// stops the walk.
    pub fn run_flow(&mut self, node_id: NodeId) {
        let Some(node) = self.node_mut(node_id) else {
            return;
        };
        if node.kind != NodeKind::Execution {
            return;
        }
        let Some(mut behavior) = node.behavior.take() else {
            return;
        };

        let branches = {
            let mut ctx = ExecutionContext::new(self, node_id);
            behavior.execute(&mut ctx);
            ctx.into_branches()
        };

        let flow_outputs: Vec<PinId> = self
            .node(node_id)
            .map_or_else(Vec::new, |n| n.flow_outputs().to_vec());

        for index in branches {
            let Some(&pin) = flow_outputs.get(index) else {
                continue;
            };
            let Some(next) = self.follow_flow_link(pin) else {
                continue;
            };
            self.run_flow(next);
        }

        if let Some(node) = self.node_mut(node_id) {
            node.behavior = Some(behavior);
        }
    }

    // Resolves the node on the far side of a live flow output.
    fn follow_flow_link(&self, pin_id: PinId) -> Option<NodeId> {
        let pin = self.pin(pin_id)?;
        if !pin.is_live() {
            return None;
        }
        debug_assert_eq!(pin.connections().len(), 1, "flow output holds at most one link");
        let remote = pin.connections().first().copied()?;
        self.pin(remote).map(|p| p.owner)
    }
}
