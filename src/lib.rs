//! Macroboard - node-graph runtime core for a visual macro board editor
//!
//! This library owns the logical graph: typed pins and their symmetric
//! connections, flow execution traversal, the dynamic macro (plugin) loader,
//! and graph document persistence. Rendering, windowing, and interaction live
//! elsewhere and drive this core through [`nodes::NodeGraph`]'s mutation and
//! subscription interface.

// Public modules
pub mod nodes;
pub mod persistence;
pub mod plugin_interface;
pub mod plugins;

// Re-export commonly used types
pub use nodes::{
    ExecutionContext, InlineValue, Node, NodeGraph, NodeId, NodeKind, Pin, PinDirection, PinId,
    PinKind,
};
pub use persistence::{GraphDocument, NodeRecord, PersistenceError};
pub use plugin_interface::{MacroHandle, MacroNode, PinBuilder};
pub use plugins::{MacroInstance, MacroLibrary, MacroLoader, MacroRegistry, PluginError};
