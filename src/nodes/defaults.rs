//! Standard execution node behaviors
//!
//! These are the stock flow-control nodes every board starts from. The
//! standard macro library re-exports them through the plugin ABI; keeping the
//! logic here lets in-process callers and tests use the same types.

use log::info;

use super::execution::ExecutionContext;
use super::node::NodeKind;
use crate::plugin_interface::{MacroNode, PinBuilder};

/// Entry point of a flow chain: a single flow output, nothing else.
#[derive(Default)]
pub struct EntranceNode;

impl MacroNode for EntranceNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Execution
    }

    fn build_pins(&mut self, pins: &mut PinBuilder<'_>) {
        pins.flow_output();
    }
}

/// Logs a message, then passes flow through.
#[derive(Default)]
pub struct PrintingNode {
    pub message: String,
}

impl PrintingNode {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl MacroNode for PrintingNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Execution
    }

    fn category(&self) -> &str {
        "Logging"
    }

    fn build_pins(&mut self, pins: &mut PinBuilder<'_>) {
        pins.flow_in_out();
    }

    fn execute(&mut self, _ctx: &mut ExecutionContext<'_>) {
        info!("printing node: {}", self.message);
    }
}

/// Two-way branch: follows output 0 while its bool data input reads true,
/// output 1 otherwise. An unset input reads false and selects the false path.
#[derive(Default)]
pub struct BranchingNode;

impl MacroNode for BranchingNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Execution
    }

    fn category(&self) -> &str {
        "Flow"
    }

    fn build_pins(&mut self, pins: &mut PinBuilder<'_>) {
        pins.flow_in_out();
        pins.data_input();
        pins.flow_output();
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) {
        if ctx.flow_output_count() > 1 && !ctx.read::<bool>(0) {
            ctx.select_branch(1);
        }
    }
}

/// Follows every flow output in declaration order; the editor grows the
/// output list one pin at a time.
#[derive(Default)]
pub struct SequenceNode;

impl MacroNode for SequenceNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Execution
    }

    fn category(&self) -> &str {
        "Flow"
    }

    fn build_pins(&mut self, pins: &mut PinBuilder<'_>) {
        pins.flow_in_out();
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) {
        ctx.select_branches(0..ctx.flow_output_count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::graph::NodeGraph;
    use crate::nodes::pin::PinKind;
    use glam::Vec2;

    #[test]
    fn test_branching_node_pin_layout() {
        let mut graph = NodeGraph::new();
        let node = graph.add_node(Box::<BranchingNode>::default(), "BranchingNode", Vec2::ZERO, 0);

        assert_eq!(graph.input_pins(node).len(), 2);
        assert_eq!(graph.output_pins(node).len(), 2);
        assert_eq!(graph.input_pins_with(node, PinKind::Data).count(), 1);
        assert_eq!(graph.output_pins_with(node, PinKind::Flow).count(), 2);
        assert_eq!(graph.node(node).unwrap().category(), "Flow");
    }

    #[test]
    fn test_entrance_node_pin_layout() {
        let mut graph = NodeGraph::new();
        let node = graph.add_node(Box::<EntranceNode>::default(), "EntranceNode", Vec2::ZERO, 0);

        assert!(graph.input_pins(node).is_empty());
        assert_eq!(graph.output_pins_with(node, PinKind::Flow).count(), 1);
    }
}
