//! Node types and core node functionality

use std::fmt;

use glam::Vec2;

use super::pin::PinId;
use crate::plugin_interface::MacroNode;

/// Unique identifier for a node, stable for the life of the graph.
pub type NodeId = u64;

/// What role a node plays in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Produces or transforms values; never traversed by flow execution.
    Data,
    /// Participates in flow traversal via its flow pins.
    Execution,
}

/// A node in the graph: identity, placement, ordered pin lists, and the
/// behavior object that drives pin construction and execution.
pub struct Node {
    pub id: NodeId,
    /// Registry type name this node was created from.
    pub type_name: String,
    pub kind: NodeKind,
    pub position: Vec2,
    pub header_color: u32,
    pub(crate) inputs: Vec<PinId>,
    pub(crate) outputs: Vec<PinId>,
    /// Flow pin subsets, recomputed whenever the pin set changes.
    pub(crate) flow_inputs: Vec<PinId>,
    pub(crate) flow_outputs: Vec<PinId>,
    /// Empty only while the behavior is out running `execute`.
    pub(crate) behavior: Option<Box<dyn MacroNode>>,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        type_name: impl Into<String>,
        kind: NodeKind,
        position: Vec2,
        header_color: u32,
    ) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            kind,
            position,
            header_color,
            inputs: Vec::new(),
            outputs: Vec::new(),
            flow_inputs: Vec::new(),
            flow_outputs: Vec::new(),
            behavior: None,
        }
    }

    /// Ordered input pin ids, in declaration order.
    pub fn inputs(&self) -> &[PinId] {
        &self.inputs
    }

    /// Ordered output pin ids, in declaration order.
    pub fn outputs(&self) -> &[PinId] {
        &self.outputs
    }

    /// Cached flow-pin subset of the inputs.
    pub fn flow_inputs(&self) -> &[PinId] {
        &self.flow_inputs
    }

    /// Cached flow-pin subset of the outputs.
    pub fn flow_outputs(&self) -> &[PinId] {
        &self.flow_outputs
    }

    /// Category the behavior reports, for UI grouping.
    pub fn category(&self) -> &str {
        self.behavior.as_deref().map_or("Default", |b| b.category())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .field("position", &self.position)
            .field("header_color", &self.header_color)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}
