//! Standard flow-control macro library
//!
//! Ships the stock node set as a loadable macro library: the core scans its
//! macro directory, reads `get_macro_names`, and instantiates these types
//! through the generated `create_*`/`destroy_*` factory pairs.

use macroboard::export_macros;
use macroboard::nodes::defaults::{BranchingNode, EntranceNode, PrintingNode, SequenceNode};

export_macros!(EntranceNode, PrintingNode, BranchingNode, SequenceNode);
