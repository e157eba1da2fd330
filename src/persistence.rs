//! Graph document save/load
//!
//! A saved document records each node as (type name, position, header color,
//! salt) and each connection as a pair of 64-bit pin ids. Per-pin ids are
//! never stored: a node's ids are drawn from a deterministic RNG seeded with
//! its salt, one per pin in declaration order (inputs then outputs), so the
//! load path regenerates the identical sequence after the factory has rebuilt
//! the node's pins. Random 64-bit ids are assumed collision-free; collisions
//! are not detected.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use glam::Vec2;
use log::error;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::nodes::graph::NodeGraph;
use crate::nodes::node::NodeId;
use crate::nodes::pin::PinId;
use crate::plugins::MacroRegistry;

/// Errors from reading or writing a graph document file. Reference errors
/// inside a parsed document are not here: those are logged and skipped.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed graph document: {0}")]
    Format(#[from] serde_json::Error),
}

/// One saved node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(rename = "ID")]
    pub type_name: String,
    pub pos: Vec2,
    pub header_color: u32,
    pub salt: u64,
}

/// A complete saved graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(rename = "Nodes")]
    pub nodes: Vec<NodeRecord>,
    #[serde(rename = "Links")]
    pub links: Vec<[u64; 2]>,
}

/// Serializes a graph into a document with freshly drawn salts.
pub fn save_graph(graph: &NodeGraph) -> GraphDocument {
    let mut node_ids: Vec<NodeId> = graph.iter_nodes().map(|n| n.id).collect();
    node_ids.sort_unstable();

    let mut serial_ids: HashMap<PinId, u64> = HashMap::new();
    let mut records = Vec::with_capacity(node_ids.len());

    for &id in &node_ids {
        let Some(node) = graph.node(id) else { continue };
        let salt: u64 = rand::random();
        let mut rng = StdRng::seed_from_u64(salt);
        for &pin in node.inputs().iter().chain(node.outputs()) {
            serial_ids.insert(pin, rng.random());
        }
        records.push(NodeRecord {
            type_name: node.type_name.clone(),
            pos: node.position,
            header_color: node.header_color,
            salt,
        });
    }

    // Scan output → input only, so every connection is written exactly once.
    let mut links = Vec::new();
    for &id in &node_ids {
        let Some(node) = graph.node(id) else { continue };
        for &pin in node.outputs() {
            let Some(output) = graph.pin(pin) else { continue };
            for &remote in output.connections() {
                if let (Some(&out_id), Some(&in_id)) = (serial_ids.get(&pin), serial_ids.get(&remote)) {
                    links.push([out_id, in_id]);
                }
            }
        }
    }

    GraphDocument {
        nodes: records,
        links,
    }
}

/// Rebuilds a graph from a document, resolving node types through `registry`.
///
/// Unresolvable nodes and links are logged and skipped; everything else
/// still loads.
pub fn load_graph(document: &GraphDocument, registry: &MacroRegistry) -> NodeGraph {
    let mut graph = NodeGraph::new();
    let mut live_pins: HashMap<u64, PinId> = HashMap::new();

    for record in &document.nodes {
        let Some(node_id) =
            graph.create_node(registry, &record.type_name, record.pos, record.header_color)
        else {
            error!("cannot restore node of unknown type '{}'", record.type_name);
            continue;
        };

        // Same salt, same declaration order, same id sequence as at save time.
        let mut rng = StdRng::seed_from_u64(record.salt);
        if let Some(node) = graph.node(node_id) {
            let pins: Vec<PinId> = node.inputs().iter().chain(node.outputs()).copied().collect();
            for pin in pins {
                live_pins.insert(rng.random(), pin);
            }
        }
    }

    for link in &document.links {
        let (Some(&output), Some(&input)) = (live_pins.get(&link[0]), live_pins.get(&link[1]))
        else {
            error!("link [{}, {}] references an unknown pin id, skipping", link[0], link[1]);
            continue;
        };
        if !graph.connect(output, input) {
            error!("recorded link [{}, {}] is not connectable, skipping", link[0], link[1]);
        }
    }

    graph
}

/// Saves a graph as pretty-printed JSON.
pub fn save_to_file(path: &Path, graph: &NodeGraph) -> Result<(), PersistenceError> {
    let document = save_graph(graph);
    let json = serde_json::to_string_pretty(&document)?;
    fs::write(path, json)?;
    Ok(())
}

/// Loads a graph document file, resolving node types through `registry`.
pub fn load_from_file(path: &Path, registry: &MacroRegistry) -> Result<NodeGraph, PersistenceError> {
    let content = fs::read_to_string(path)?;
    let document: GraphDocument = serde_json::from_str(&content)?;
    Ok(load_graph(&document, registry))
}
