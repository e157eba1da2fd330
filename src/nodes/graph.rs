//! Node graph data structures and operations
//!
//! The graph is the arena for every node and pin, and the single mutation
//! surface the surrounding editor talks to: connect/disconnect, pin and node
//! lifecycle, typed pin values, and change subscriptions.

use std::collections::HashMap;

use glam::Vec2;
use log::warn;

use super::node::{Node, NodeId};
use super::pin::{Pin, PinDirection, PinId, PinKind};
use crate::plugin_interface::{MacroNode, PinBuilder};
use crate::plugins::MacroRegistry;

/// Callback fired when a pin gains or loses a connection:
/// `(subscribed pin, remote pin, connected)`.
pub type ConnectionCallback = Box<dyn FnMut(PinId, PinId, bool)>;

/// Callback fired when a node's pin set changes: `(pin, added)`.
pub type PinSetCallback = Box<dyn FnMut(PinId, bool)>;

/// A graph containing nodes, their pins, and the connections between them.
pub struct NodeGraph {
    nodes: HashMap<NodeId, Node>,
    pins: HashMap<PinId, Pin>,
    next_node_id: NodeId,
    next_pin_id: PinId,
    connection_subs: HashMap<PinId, Vec<ConnectionCallback>>,
    pin_set_subs: HashMap<NodeId, Vec<PinSetCallback>>,
}

impl std::fmt::Debug for NodeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeGraph")
            .field("nodes", &self.nodes)
            .field("pins", &self.pins)
            .field("next_node_id", &self.next_node_id)
            .field("next_pin_id", &self.next_pin_id)
            .field("connection_subs", &self.connection_subs.keys())
            .field("pin_set_subs", &self.pin_set_subs.keys())
            .finish()
    }
}

impl NodeGraph {
    /// Creates a new empty node graph.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            pins: HashMap::new(),
            next_node_id: 0,
            next_pin_id: 0,
            connection_subs: HashMap::new(),
            pin_set_subs: HashMap::new(),
        }
    }

    // ── Node lifecycle ──────────────────────────────────────────────────

    /// Adds a node driven by an in-process behavior object and returns its id.
    ///
    /// The behavior declares its pins immediately, in declaration order
    /// (inputs and outputs interleaved however it likes); that order is what
    /// serialization later relies on.
    pub fn add_node(
        &mut self,
        mut behavior: Box<dyn MacroNode>,
        type_name: impl Into<String>,
        position: Vec2,
        header_color: u32,
    ) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;

        let kind = behavior.kind();
        self.nodes
            .insert(id, Node::new(id, type_name, kind, position, header_color));

        let mut builder = PinBuilder::new(self, id);
        behavior.build_pins(&mut builder);

        if let Some(node) = self.nodes.get_mut(&id) {
            node.behavior = Some(behavior);
        }
        id
    }

    /// Instantiates a registered macro type at `position` and adds it.
    ///
    /// Returns `None` (after logging) for an unknown type name.
    pub fn create_node(
        &mut self,
        registry: &MacroRegistry,
        type_name: &str,
        position: Vec2,
        header_color: u32,
    ) -> Option<NodeId> {
        let Some(instance) = registry.create(type_name) else {
            warn!("cannot create node: unknown macro type '{}'", type_name);
            return None;
        };
        Some(self.add_node(Box::new(instance), type_name, position, header_color))
    }

    /// Removes a node, severing every connection of every pin it owns.
    pub fn remove_node(&mut self, node_id: NodeId) -> bool {
        let Some(node) = self.nodes.get(&node_id) else {
            return false;
        };
        let owned: Vec<PinId> = node.inputs.iter().chain(node.outputs.iter()).copied().collect();

        // Remote pins see their links drop one by one; the dying node's own
        // pin set raises no further notifications.
        for &pin in &owned {
            self.disconnect_all(pin);
        }
        for &pin in &owned {
            self.pins.remove(&pin);
            self.connection_subs.remove(&pin);
        }
        self.pin_set_subs.remove(&node_id);
        self.nodes.remove(&node_id);
        true
    }

    // ── Pin lifecycle ───────────────────────────────────────────────────

    /// Appends a pin to `node_id` and fires its "pin set changed" callbacks.
    pub fn emplace_pin(
        &mut self,
        node_id: NodeId,
        kind: PinKind,
        direction: PinDirection,
    ) -> Option<PinId> {
        if !self.nodes.contains_key(&node_id) {
            return None;
        }
        let id = self.next_pin_id;
        self.next_pin_id += 1;
        self.pins.insert(id, Pin::new(id, kind, direction, node_id));

        if let Some(node) = self.nodes.get_mut(&node_id) {
            match direction {
                PinDirection::Input => node.inputs.push(id),
                PinDirection::Output => node.outputs.push(id),
            }
        }
        self.rebuild_flow_cache(node_id);
        self.notify_pin_set(node_id, id, true);
        Some(id)
    }

    /// Erases a pin: severs all of its connections first, then frees it and
    /// fires the owning node's "pin set changed" callbacks exactly once.
    pub fn erase_pin(&mut self, pin_id: PinId) -> bool {
        let Some(pin) = self.pins.get(&pin_id) else {
            return false;
        };
        let owner = pin.owner;
        let direction = pin.direction;

        self.disconnect_all(pin_id);

        if let Some(node) = self.nodes.get_mut(&owner) {
            let list = match direction {
                PinDirection::Input => &mut node.inputs,
                PinDirection::Output => &mut node.outputs,
            };
            list.retain(|&p| p != pin_id);
        }
        self.pins.remove(&pin_id);
        self.connection_subs.remove(&pin_id);
        self.rebuild_flow_cache(owner);
        self.notify_pin_set(owner, pin_id, false);
        true
    }

    // ── Connections ─────────────────────────────────────────────────────

    /// Whether `a` and `b` could be connected right now: same kind, opposite
    /// direction, not already connected.
    pub fn compatible(&self, a: PinId, b: PinId) -> bool {
        if a == b {
            return false;
        }
        let (Some(pa), Some(pb)) = (self.pins.get(&a), self.pins.get(&b)) else {
            return false;
        };
        pa.kind == pb.kind && pa.direction != pb.direction && !pa.is_connected_to(b)
    }

    /// Connects two pins. Returns false (mutating nothing) on an incompatible
    /// or duplicate pair.
    ///
    /// Each side's pre-connect policy runs first: a flow output evicts its
    /// previous outbound link and a data input evicts its previous inbound
    /// link, so replacing an existing link is normal, not an error. Both
    /// pins' connection callbacks fire after the pair is registered.
    pub fn connect(&mut self, a: PinId, b: PinId) -> bool {
        if !self.compatible(a, b) {
            return false;
        }
        self.apply_preconnect(a);
        self.apply_preconnect(b);

        if let Some(pin) = self.pins.get_mut(&a) {
            pin.connected.push(b);
        }
        if let Some(pin) = self.pins.get_mut(&b) {
            pin.connected.push(a);
        }
        self.notify_connection(a, b, true);
        self.notify_connection(b, a, true);
        true
    }

    /// Removes the pair symmetrically; a no-op returning false when the pins
    /// are not linked.
    pub fn disconnect(&mut self, a: PinId, b: PinId) -> bool {
        let removed = match self.pins.get_mut(&a) {
            Some(pin) => {
                if let Some(index) = pin.connected.iter().position(|&p| p == b) {
                    pin.connected.remove(index);
                    true
                } else {
                    false
                }
            }
            None => false,
        };
        if !removed {
            return false;
        }
        if let Some(pin) = self.pins.get_mut(&b) {
            pin.connected.retain(|&p| p != a);
        }
        self.notify_connection(a, b, false);
        self.notify_connection(b, a, false);
        true
    }

    /// Severs every connection of `pin_id`, one remaining link at a time.
    pub fn disconnect_all(&mut self, pin_id: PinId) {
        while let Some(other) = self
            .pins
            .get(&pin_id)
            .and_then(|pin| pin.connected.first().copied())
        {
            if !self.disconnect(pin_id, other) {
                break;
            }
        }
    }

    // Eviction policy applied before a new link: exclusive fan-out for flow
    // outputs, exclusive fan-in for data inputs.
    fn apply_preconnect(&mut self, pin_id: PinId) {
        let evict = match self.pins.get(&pin_id) {
            Some(pin) => match (pin.kind, pin.direction) {
                (PinKind::Flow, PinDirection::Output) | (PinKind::Data, PinDirection::Input) => {
                    pin.connected.first().copied()
                }
                _ => None,
            },
            None => None,
        };
        if let Some(old) = evict {
            self.disconnect(pin_id, old);
        }
    }

    // ── Typed pin values ────────────────────────────────────────────────

    /// Stores a value on a data pin. Returns false for flow or unknown pins.
    pub fn set_value<T: Copy + 'static>(&mut self, pin_id: PinId, value: T) -> bool {
        match self.pins.get_mut(&pin_id) {
            Some(pin) if pin.kind == PinKind::Data => {
                pin.value.set(value);
                true
            }
            _ => false,
        }
    }

    /// Reads a data pin's value; a mistyped or missing read yields
    /// `T::default()`, never an error.
    pub fn value<T: Copy + Default + 'static>(&self, pin_id: PinId) -> T {
        self.pins.get(&pin_id).map(|pin| pin.value.get()).unwrap_or_default()
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn pin(&self, id: PinId) -> Option<&Pin> {
        self.pins.get(&id)
    }

    pub fn iter_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Ordered input pins of a node (empty for an unknown node).
    pub fn input_pins(&self, node: NodeId) -> &[PinId] {
        self.nodes.get(&node).map_or(&[][..], |n| &n.inputs)
    }

    /// Ordered output pins of a node (empty for an unknown node).
    pub fn output_pins(&self, node: NodeId) -> &[PinId] {
        self.nodes.get(&node).map_or(&[][..], |n| &n.outputs)
    }

    /// Input pins filtered by kind, in declaration order.
    pub fn input_pins_with(&self, node: NodeId, kind: PinKind) -> impl Iterator<Item = PinId> + '_ {
        self.input_pins(node)
            .iter()
            .copied()
            .filter(move |p| self.pins.get(p).is_some_and(|pin| pin.kind == kind))
    }

    /// Output pins filtered by kind, in declaration order.
    pub fn output_pins_with(&self, node: NodeId, kind: PinKind) -> impl Iterator<Item = PinId> + '_ {
        self.output_pins(node)
            .iter()
            .copied()
            .filter(move |p| self.pins.get(p).is_some_and(|pin| pin.kind == kind))
    }

    /// Whether a pin currently has at least one connection.
    pub fn is_live(&self, pin_id: PinId) -> bool {
        self.pins.get(&pin_id).is_some_and(Pin::is_live)
    }

    // ── Subscriptions ───────────────────────────────────────────────────

    /// Subscribes to connection changes on one pin.
    pub fn on_connection_changed(
        &mut self,
        pin: PinId,
        callback: impl FnMut(PinId, PinId, bool) + 'static,
    ) {
        self.connection_subs.entry(pin).or_default().push(Box::new(callback));
    }

    /// Subscribes to pin-set changes on one node.
    pub fn on_pin_set_changed(
        &mut self,
        node: NodeId,
        callback: impl FnMut(PinId, bool) + 'static,
    ) {
        self.pin_set_subs.entry(node).or_default().push(Box::new(callback));
    }

    fn notify_connection(&mut self, pin: PinId, other: PinId, connected: bool) {
        if let Some(callbacks) = self.connection_subs.get_mut(&pin) {
            for callback in callbacks.iter_mut() {
                callback(pin, other, connected);
            }
        }
    }

    fn notify_pin_set(&mut self, node: NodeId, pin: PinId, added: bool) {
        if let Some(callbacks) = self.pin_set_subs.get_mut(&node) {
            for callback in callbacks.iter_mut() {
                callback(pin, added);
            }
        }
    }

    fn rebuild_flow_cache(&mut self, node_id: NodeId) {
        let Some(node) = self.nodes.get(&node_id) else {
            return;
        };
        let is_flow = |p: &PinId| self.pins.get(p).is_some_and(|pin| pin.kind == PinKind::Flow);
        let flow_inputs: Vec<PinId> = node.inputs.iter().filter(|p| is_flow(p)).copied().collect();
        let flow_outputs: Vec<PinId> = node.outputs.iter().filter(|p| is_flow(p)).copied().collect();
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.flow_inputs = flow_inputs;
            node.flow_outputs = flow_outputs;
        }
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }
}

impl Default for NodeGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Behavior with no pins; tests shape nodes by hand.
    struct Bare;
    impl MacroNode for Bare {}

    fn bare_node(graph: &mut NodeGraph) -> NodeId {
        graph.add_node(Box::new(Bare), "Bare", Vec2::ZERO, 0x668DAB88)
    }

    #[test]
    fn test_connect_requires_same_kind_opposite_direction() {
        let mut graph = NodeGraph::new();
        let a = bare_node(&mut graph);
        let b = bare_node(&mut graph);

        let flow_out = graph.emplace_pin(a, PinKind::Flow, PinDirection::Output).unwrap();
        let flow_in = graph.emplace_pin(b, PinKind::Flow, PinDirection::Input).unwrap();
        let data_in = graph.emplace_pin(b, PinKind::Data, PinDirection::Input).unwrap();
        let other_out = graph.emplace_pin(b, PinKind::Flow, PinDirection::Output).unwrap();

        // Kind mismatch.
        assert!(!graph.connect(flow_out, data_in));
        // Direction clash.
        assert!(!graph.connect(flow_out, other_out));
        // Self.
        assert!(!graph.connect(flow_out, flow_out));
        // Compatible.
        assert!(graph.connect(flow_out, flow_in));
        assert!(graph.pin(flow_out).unwrap().is_connected_to(flow_in));
        assert!(graph.pin(flow_in).unwrap().is_connected_to(flow_out));
        // Duplicate pair mutates nothing.
        assert!(!graph.connect(flow_out, flow_in));
        assert_eq!(graph.pin(flow_out).unwrap().connections().len(), 1);
    }

    #[test]
    fn test_flow_output_evicts_previous_link() {
        let mut graph = NodeGraph::new();
        let a = bare_node(&mut graph);
        let b = bare_node(&mut graph);
        let c = bare_node(&mut graph);

        let out = graph.emplace_pin(a, PinKind::Flow, PinDirection::Output).unwrap();
        let in_b = graph.emplace_pin(b, PinKind::Flow, PinDirection::Input).unwrap();
        let in_c = graph.emplace_pin(c, PinKind::Flow, PinDirection::Input).unwrap();

        assert!(graph.connect(out, in_b));
        assert!(graph.connect(out, in_c));

        assert_eq!(graph.pin(out).unwrap().connections(), &[in_c]);
        assert!(!graph.pin(in_b).unwrap().is_live());
        // A flow input may fan in freely.
        let out2 = graph.emplace_pin(b, PinKind::Flow, PinDirection::Output).unwrap();
        assert!(graph.connect(out2, in_c));
        assert_eq!(graph.pin(in_c).unwrap().connections().len(), 2);
    }

    #[test]
    fn test_data_input_evicts_previous_link() {
        let mut graph = NodeGraph::new();
        let a = bare_node(&mut graph);
        let b = bare_node(&mut graph);
        let c = bare_node(&mut graph);

        let out_a = graph.emplace_pin(a, PinKind::Data, PinDirection::Output).unwrap();
        let out_b = graph.emplace_pin(b, PinKind::Data, PinDirection::Output).unwrap();
        let input = graph.emplace_pin(c, PinKind::Data, PinDirection::Input).unwrap();

        assert!(graph.connect(out_a, input));
        assert!(graph.connect(out_b, input));

        assert_eq!(graph.pin(input).unwrap().connections(), &[out_b]);
        assert!(!graph.pin(out_a).unwrap().is_live());
        // A data output may fan out freely.
        let input2 = graph.emplace_pin(a, PinKind::Data, PinDirection::Input).unwrap();
        assert!(graph.connect(out_b, input2));
        assert_eq!(graph.pin(out_b).unwrap().connections().len(), 2);
    }

    #[test]
    fn test_disconnect_is_symmetric_and_nonlinked_is_noop() {
        let mut graph = NodeGraph::new();
        let a = bare_node(&mut graph);
        let b = bare_node(&mut graph);
        let out = graph.emplace_pin(a, PinKind::Data, PinDirection::Output).unwrap();
        let input = graph.emplace_pin(b, PinKind::Data, PinDirection::Input).unwrap();

        assert!(!graph.disconnect(out, input));

        assert!(graph.connect(out, input));
        assert!(graph.disconnect(input, out));
        assert!(!graph.pin(out).unwrap().is_live());
        assert!(!graph.pin(input).unwrap().is_live());
        assert!(!graph.disconnect(input, out));
    }

    #[test]
    fn test_connection_callbacks_fire_on_both_sides() {
        let mut graph = NodeGraph::new();
        let a = bare_node(&mut graph);
        let b = bare_node(&mut graph);
        let out = graph.emplace_pin(a, PinKind::Flow, PinDirection::Output).unwrap();
        let input = graph.emplace_pin(b, PinKind::Flow, PinDirection::Input).unwrap();

        let events = Rc::new(RefCell::new(Vec::new()));
        for pin in [out, input] {
            let log = Rc::clone(&events);
            graph.on_connection_changed(pin, move |this, other, connected| {
                log.borrow_mut().push((this, other, connected));
            });
        }

        graph.connect(out, input);
        graph.disconnect(out, input);

        assert_eq!(
            *events.borrow(),
            vec![
                (out, input, true),
                (input, out, true),
                (out, input, false),
                (input, out, false),
            ]
        );
    }

    #[test]
    fn test_eviction_reports_disconnect_before_connect() {
        let mut graph = NodeGraph::new();
        let a = bare_node(&mut graph);
        let b = bare_node(&mut graph);
        let c = bare_node(&mut graph);
        let out = graph.emplace_pin(a, PinKind::Flow, PinDirection::Output).unwrap();
        let in_b = graph.emplace_pin(b, PinKind::Flow, PinDirection::Input).unwrap();
        let in_c = graph.emplace_pin(c, PinKind::Flow, PinDirection::Input).unwrap();

        let events = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&events);
        graph.on_connection_changed(out, move |_, other, connected| {
            log.borrow_mut().push((other, connected));
        });

        graph.connect(out, in_b);
        graph.connect(out, in_c);

        assert_eq!(*events.borrow(), vec![(in_b, true), (in_b, false), (in_c, true)]);
    }

    #[test]
    fn test_erase_pin_severs_connections_and_notifies_once() {
        let mut graph = NodeGraph::new();
        let a = bare_node(&mut graph);
        let b = bare_node(&mut graph);
        let out = graph.emplace_pin(a, PinKind::Data, PinDirection::Output).unwrap();
        let in_one = graph.emplace_pin(b, PinKind::Data, PinDirection::Input).unwrap();
        let in_two = graph.emplace_pin(b, PinKind::Data, PinDirection::Input).unwrap();
        graph.connect(out, in_one);
        graph.connect(out, in_two);

        let pin_events = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&pin_events);
        graph.on_pin_set_changed(a, move |pin, added| {
            log.borrow_mut().push((pin, added));
        });

        assert!(graph.erase_pin(out));
        assert!(graph.pin(out).is_none());
        assert!(!graph.pin(in_one).unwrap().is_live());
        assert!(!graph.pin(in_two).unwrap().is_live());
        assert_eq!(*pin_events.borrow(), vec![(out, false)]);

        assert!(!graph.erase_pin(out));
    }

    #[test]
    fn test_emplace_notifies_and_orders_pins() {
        let mut graph = NodeGraph::new();
        let a = bare_node(&mut graph);

        let pin_events = Rc::new(RefCell::new(0));
        let count = Rc::clone(&pin_events);
        graph.on_pin_set_changed(a, move |_, added| {
            assert!(added);
            *count.borrow_mut() += 1;
        });

        let p0 = graph.emplace_pin(a, PinKind::Flow, PinDirection::Input).unwrap();
        let p1 = graph.emplace_pin(a, PinKind::Data, PinDirection::Input).unwrap();
        let p2 = graph.emplace_pin(a, PinKind::Flow, PinDirection::Output).unwrap();

        assert_eq!(graph.input_pins(a), &[p0, p1]);
        assert_eq!(graph.output_pins(a), &[p2]);
        assert_eq!(
            graph.input_pins_with(a, PinKind::Flow).collect::<Vec<_>>(),
            vec![p0]
        );
        assert_eq!(*pin_events.borrow(), 3);
    }

    #[test]
    fn test_remove_node_clears_remote_references() {
        let mut graph = NodeGraph::new();
        let a = bare_node(&mut graph);
        let b = bare_node(&mut graph);
        let out = graph.emplace_pin(a, PinKind::Flow, PinDirection::Output).unwrap();
        let input = graph.emplace_pin(b, PinKind::Flow, PinDirection::Input).unwrap();
        graph.connect(out, input);

        assert!(graph.remove_node(a));
        assert!(graph.node(a).is_none());
        assert!(graph.pin(out).is_none());
        assert!(!graph.pin(input).unwrap().is_live());
        assert!(!graph.remove_node(a));
    }

    #[test]
    fn test_pin_values_are_typed_with_silent_fallback() {
        let mut graph = NodeGraph::new();
        let a = bare_node(&mut graph);
        let data = graph.emplace_pin(a, PinKind::Data, PinDirection::Input).unwrap();
        let flow = graph.emplace_pin(a, PinKind::Flow, PinDirection::Input).unwrap();

        assert!(graph.set_value(data, 2.5f32));
        assert_eq!(graph.value::<f32>(data), 2.5);
        assert_eq!(graph.value::<bool>(data), false);

        // Flow pins carry no values.
        assert!(!graph.set_value(flow, 1u8));
        assert_eq!(graph.value::<u8>(flow), 0);
    }
}
