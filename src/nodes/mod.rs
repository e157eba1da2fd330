//! Node system - core graph data structures and flow execution

pub mod defaults;
pub mod execution;
pub mod graph;
pub mod node;
pub mod pin;
pub mod value;

// Re-export core types
pub use execution::ExecutionContext;
pub use graph::{ConnectionCallback, NodeGraph, PinSetCallback};
pub use node::{Node, NodeId, NodeKind};
pub use pin::{Pin, PinDirection, PinId, PinKind};
pub use value::InlineValue;
