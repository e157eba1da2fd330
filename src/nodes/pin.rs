//! Pin types and functionality for node connections

use serde::{Deserialize, Serialize};

use super::node::NodeId;
use super::value::InlineValue;

/// Unique identifier for a pin, stable for the life of the graph.
pub type PinId = u64;

/// Kind of edge a pin terminates: control flow or data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinKind {
    Flow,
    Data,
}

/// Direction of a pin relative to its owning node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinDirection {
    Input,
    Output,
}

/// A typed, directional connection endpoint owned by a node.
///
/// Pins live in the graph's arena and refer to their peers by id only; the
/// graph keeps both sides of every connection in sync.
#[derive(Debug)]
pub struct Pin {
    pub id: PinId,
    pub kind: PinKind,
    pub direction: PinDirection,
    /// Owning node, immutable after construction.
    pub owner: NodeId,
    pub(crate) connected: Vec<PinId>,
    /// Inline typed storage; only data pins ever hold a value.
    pub(crate) value: InlineValue,
}

impl Pin {
    pub(crate) fn new(id: PinId, kind: PinKind, direction: PinDirection, owner: NodeId) -> Self {
        Self {
            id,
            kind,
            direction,
            owner,
            connected: Vec::new(),
            value: InlineValue::empty(),
        }
    }

    /// Whether this pin participates in at least one connection.
    pub fn is_live(&self) -> bool {
        !self.connected.is_empty()
    }

    /// Whether this pin is connected to `other`.
    pub fn is_connected_to(&self, other: PinId) -> bool {
        self.connected.contains(&other)
    }

    /// Ids of all pins connected to this one, in connection order.
    pub fn connections(&self) -> &[PinId] {
        &self.connected
    }

    pub fn is_input(&self) -> bool {
        matches!(self.direction, PinDirection::Input)
    }

    pub fn is_output(&self) -> bool {
        matches!(self.direction, PinDirection::Output)
    }
}
