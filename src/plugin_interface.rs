//! Plugin interface for dynamically loaded macro libraries
//!
//! A macro library is a shared library exporting `get_macro_names` (a
//! null-terminated array of declared type names) plus one
//! `create_<Name>`/`destroy_<Name>` pair per name. Node objects cross the
//! library boundary only as [`MacroHandle`]s over the stable C ABI; the
//! `MacroNode` trait itself is never dispatched across it raw.

use std::os::raw::{c_char, c_void};

use crate::nodes::execution::ExecutionContext;
use crate::nodes::graph::NodeGraph;
use crate::nodes::node::{NodeId, NodeKind};
use crate::nodes::pin::{PinDirection, PinId, PinKind};

/// Behavior of one node type: pin declaration and flow execution logic.
///
/// Implemented by built-in node types and by types living inside macro
/// libraries; the graph stores behaviors as boxed trait objects either way.
pub trait MacroNode {
    /// Role this node plays in the graph; plain data by default.
    fn kind(&self) -> NodeKind {
        NodeKind::Data
    }

    /// Category for UI grouping.
    fn category(&self) -> &str {
        "Default"
    }

    /// Declares this node's pins. Called once when the node enters a graph;
    /// the declaration order is what serialization relies on, so it must be
    /// deterministic for the type.
    fn build_pins(&mut self, _pins: &mut PinBuilder<'_>) {}

    /// Execution-node logic; selects flow branches through the context.
    fn execute(&mut self, _ctx: &mut ExecutionContext<'_>) {}
}

/// Appends pins to the node under construction, in declaration order.
pub struct PinBuilder<'a> {
    graph: &'a mut NodeGraph,
    node: NodeId,
}

impl<'a> PinBuilder<'a> {
    pub(crate) fn new(graph: &'a mut NodeGraph, node: NodeId) -> Self {
        Self { graph, node }
    }

    pub fn emplace(&mut self, kind: PinKind, direction: PinDirection) -> PinId {
        self.graph
            .emplace_pin(self.node, kind, direction)
            .expect("node exists while its pins are built")
    }

    pub fn flow_input(&mut self) -> PinId {
        self.emplace(PinKind::Flow, PinDirection::Input)
    }

    pub fn flow_output(&mut self) -> PinId {
        self.emplace(PinKind::Flow, PinDirection::Output)
    }

    pub fn data_input(&mut self) -> PinId {
        self.emplace(PinKind::Data, PinDirection::Input)
    }

    pub fn data_output(&mut self) -> PinId {
        self.emplace(PinKind::Data, PinDirection::Output)
    }

    /// The usual entry/exit pair of a flow-through execution node.
    pub fn flow_in_out(&mut self) {
        self.flow_input();
        self.flow_output();
    }
}

/// Symbol every macro library must export.
pub const MANIFEST_SYMBOL: &[u8] = b"get_macro_names\0";

/// `get_macro_names` — returns a null-terminated array of declared names.
pub type MacroNamesFn = unsafe extern "C" fn() -> *const *const c_char;

/// `create_<Name>` — allocates one node instance behind an owning handle.
pub type CreateMacroFn = unsafe extern "C" fn() -> MacroHandle;

/// `destroy_<Name>` — releases a handle produced by the matching create.
pub type DestroyMacroFn = unsafe extern "C" fn(MacroHandle);

/// Owning handle to a boxed [`MacroNode`] that is safe to pass by value
/// across the C ABI.
///
/// Whoever holds the handle owns the node; it must be released exactly once,
/// by the `destroy_<Name>` export of the library that created it (plugin
/// code lives behind that library's vtables).
#[repr(C)]
pub struct MacroHandle {
    raw: *mut c_void,
}

impl MacroHandle {
    /// Wraps a behavior object for transfer out of a factory.
    pub fn new(node: Box<dyn MacroNode>) -> Self {
        Self {
            raw: Box::into_raw(Box::new(node)).cast(),
        }
    }

    /// Reclaims ownership of the behavior object.
    ///
    /// # Safety
    /// The handle must have come from [`MacroHandle::new`] (in any compatible
    /// library) and must not be used again afterwards.
    pub unsafe fn into_node(self) -> Box<dyn MacroNode> {
        *Box::from_raw(self.raw.cast::<Box<dyn MacroNode>>())
    }

    /// # Safety
    /// The handle must be live (created, not yet destroyed).
    pub(crate) unsafe fn node_ref(&self) -> &dyn MacroNode {
        &**(self.raw as *const Box<dyn MacroNode>)
    }

    /// # Safety
    /// The handle must be live (created, not yet destroyed).
    pub(crate) unsafe fn node_mut(&mut self) -> &mut dyn MacroNode {
        &mut **(self.raw as *mut Box<dyn MacroNode>)
    }
}

/// In-process `create` thunk for any `Default` behavior type; lets the
/// registry host built-in types next to library-loaded ones.
pub extern "C" fn create_default<T: MacroNode + Default + 'static>() -> MacroHandle {
    MacroHandle::new(Box::new(T::default()))
}

/// In-process `destroy` thunk matching [`create_default`].
///
/// # Safety
/// `handle` must be live and is consumed.
pub unsafe extern "C" fn destroy_boxed(handle: MacroHandle) {
    drop(handle.into_node());
}

/// Exports the plugin ABI for the listed `Default`-constructible node types:
/// `get_macro_names` plus a `create_<Name>`/`destroy_<Name>` pair per type.
///
/// ```ignore
/// export_macros!(EntranceNode, PrintingNode, BranchingNode);
/// ```
#[macro_export]
macro_rules! export_macros {
    ($($name:ident),+ $(,)?) => {
        #[no_mangle]
        pub extern "C" fn get_macro_names() -> *const *const ::std::os::raw::c_char {
            #[repr(transparent)]
            struct NameTable<const N: usize>([*const ::std::os::raw::c_char; N]);
            // The table only ever points at string literals.
            unsafe impl<const N: usize> Sync for NameTable<N> {}

            const LEN: usize = [$(stringify!($name)),+].len() + 1;
            static NAMES: NameTable<LEN> = NameTable([
                $(concat!(stringify!($name), "\0").as_ptr() as *const ::std::os::raw::c_char,)+
                ::std::ptr::null(),
            ]);
            NAMES.0.as_ptr()
        }

        $(
            const _: () = {
                #[export_name = concat!("create_", stringify!($name))]
                pub extern "C" fn create() -> $crate::plugin_interface::MacroHandle {
                    $crate::plugin_interface::MacroHandle::new(
                        ::std::boxed::Box::new(<$name as ::core::default::Default>::default()),
                    )
                }

                #[export_name = concat!("destroy_", stringify!($name))]
                pub unsafe extern "C" fn destroy(handle: $crate::plugin_interface::MacroHandle) {
                    drop(handle.into_node());
                }
            };
        )+
    };
}
