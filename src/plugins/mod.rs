//! Plugin system for dynamic macro loading
//!
//! Scans a directory for shared libraries, resolves each library's declared
//! factory symbol pairs, and keeps a name → factory registry. Libraries stay
//! owned here for the process lifetime: every node created through the
//! registry executes code from one of them, so the loader must outlive all
//! node instances. On drop, libraries close in reverse load order.

use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use log::{error, info, warn};
use thiserror::Error;

use crate::nodes::execution::ExecutionContext;
use crate::nodes::node::NodeKind;
use crate::plugin_interface::{
    create_default, destroy_boxed, CreateMacroFn, DestroyMacroFn, MacroHandle, MacroNamesFn,
    MacroNode, PinBuilder, MANIFEST_SYMBOL,
};

/// File stem reserved for the core runtime library, skipped during scans.
pub const CORE_LIBRARY_STEM: &str = "macroboard";

/// Errors surfaced while opening one macro library. Never fatal to a scan:
/// the offending file is skipped and the scan continues.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("failed to load macro library {}: {source}", .path.display())]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("macro library {} does not export get_macro_names", .path.display())]
    MissingManifest {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
}

/// An instantiated macro node, owned through its library's destroy symbol.
///
/// Dereferences to the behavior object; dropping it releases the node via
/// the `destroy_<Name>` export it was created with, so callers never touch
/// the raw destructor.
pub struct MacroInstance {
    handle: Option<MacroHandle>,
    destroy: DestroyMacroFn,
}

impl MacroInstance {
    fn new(handle: MacroHandle, destroy: DestroyMacroFn) -> Self {
        Self {
            handle: Some(handle),
            destroy,
        }
    }

    fn node(&self) -> &dyn MacroNode {
        let handle = self.handle.as_ref().expect("handle is live until drop");
        // Safety: created by this instance's factory, not yet destroyed.
        unsafe { handle.node_ref() }
    }

    fn node_mut(&mut self) -> &mut dyn MacroNode {
        let handle = self.handle.as_mut().expect("handle is live until drop");
        // Safety: created by this instance's factory, not yet destroyed.
        unsafe { handle.node_mut() }
    }
}

impl MacroNode for MacroInstance {
    fn kind(&self) -> NodeKind {
        self.node().kind()
    }

    fn category(&self) -> &str {
        self.node().category()
    }

    fn build_pins(&mut self, pins: &mut PinBuilder<'_>) {
        self.node_mut().build_pins(pins);
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) {
        self.node_mut().execute(ctx);
    }
}

impl Drop for MacroInstance {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            // Safety: the handle is consumed exactly once, by the destroy
            // symbol of the library that created it.
            unsafe { (self.destroy)(handle) };
        }
    }
}

struct MacroFactory {
    create: CreateMacroFn,
    destroy: DestroyMacroFn,
    display: String,
}

/// Name → factory table for every known macro type.
pub struct MacroRegistry {
    factories: HashMap<String, MacroFactory>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers a factory pair under `name`. Returns false when an earlier
    /// registration was replaced (the later registration wins).
    ///
    /// The function pointers must stay callable for as long as the registry
    /// is used; the loader guarantees that by owning the libraries.
    pub fn register(&mut self, name: &str, create: CreateMacroFn, destroy: DestroyMacroFn) -> bool {
        self.factories
            .insert(
                name.to_string(),
                MacroFactory {
                    create,
                    destroy,
                    display: display_name(name),
                },
            )
            .is_none()
    }

    /// Registers an in-process `Default`-constructible behavior type.
    pub fn register_type<T: MacroNode + Default + 'static>(&mut self, name: &str) -> bool {
        self.register(name, create_default::<T>, destroy_boxed)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// All registered macros as (type name, display name), unordered.
    pub fn macros(&self) -> impl Iterator<Item = (&str, &str)> {
        self.factories
            .iter()
            .map(|(name, factory)| (name.as_str(), factory.display.as_str()))
    }

    /// Instantiates a macro type behind an owning smart handle, or `None`
    /// for an unknown name.
    pub fn create(&self, name: &str) -> Option<MacroInstance> {
        let factory = self.factories.get(name)?;
        // Safety: registered factory symbols stay valid while their library
        // is owned by the loader.
        let handle = unsafe { (factory.create)() };
        Some(MacroInstance::new(handle, factory.destroy))
    }
}

impl Default for MacroRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Human-readable form of a declared macro name: camel-case words split by
/// spaces, with a leading `C` class prefix dropped ("CBranchingNode" →
/// "Branching Node").
pub fn display_name(symbol: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    for ch in symbol.chars() {
        match words.last_mut() {
            Some(word) if !ch.is_uppercase() => word.push(ch),
            _ => words.push(ch.to_string()),
        }
    }
    while words.len() > 1 && words.first().is_some_and(|w| w == "C") {
        words.remove(0);
    }
    words.join(" ")
}

struct MacroExport {
    name: String,
    create: CreateMacroFn,
    destroy: DestroyMacroFn,
}

// Pairs each declared name with its create/destroy symbols; a name missing
// either symbol is skipped with a warning, the rest still register.
fn resolve_factories<C, D>(
    origin: &str,
    names: &[String],
    mut create_sym: C,
    mut destroy_sym: D,
) -> Vec<MacroExport>
where
    C: FnMut(&str) -> Option<CreateMacroFn>,
    D: FnMut(&str) -> Option<DestroyMacroFn>,
{
    names
        .iter()
        .filter_map(|name| {
            let create = create_sym(&format!("create_{name}"));
            let destroy = destroy_sym(&format!("destroy_{name}"));
            match (create, destroy) {
                (Some(create), Some(destroy)) => Some(MacroExport {
                    name: name.clone(),
                    create,
                    destroy,
                }),
                _ => {
                    warn!("{origin}: missing create_{name}/destroy_{name}, skipping macro '{name}'");
                    None
                }
            }
        })
        .collect()
}

// Walks a null-terminated name array returned by get_macro_names.
unsafe fn read_manifest(mut cursor: *const *const c_char) -> Vec<String> {
    let mut names = Vec::new();
    while !cursor.is_null() && !(*cursor).is_null() {
        names.push(CStr::from_ptr(*cursor).to_string_lossy().into_owned());
        cursor = cursor.add(1);
    }
    names
}

/// One loaded shared library and the factory pairs it declared.
pub struct MacroLibrary {
    name: String,
    exports: Vec<MacroExport>,
    // Kept alive so every export above stays callable.
    _library: Library,
}

impl MacroLibrary {
    /// Opens a shared library and resolves its declared factory pairs.
    pub fn open(path: &Path) -> Result<Self, PluginError> {
        info!("loading macro library: {}", path.display());

        let library = unsafe { Library::new(path) }.map_err(|source| PluginError::LoadFailed {
            path: path.to_path_buf(),
            source,
        })?;

        let names = unsafe {
            let manifest: Symbol<MacroNamesFn> =
                library
                    .get(MANIFEST_SYMBOL)
                    .map_err(|source| PluginError::MissingManifest {
                        path: path.to_path_buf(),
                        source,
                    })?;
            read_manifest(manifest())
        };

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let exports = resolve_factories(
            &name,
            &names,
            |symbol| unsafe {
                library
                    .get::<CreateMacroFn>(format!("{symbol}\0").as_bytes())
                    .map(|s| *s)
                    .ok()
            },
            |symbol| unsafe {
                library
                    .get::<DestroyMacroFn>(format!("{symbol}\0").as_bytes())
                    .map(|s| *s)
                    .ok()
            },
        );

        for export in &exports {
            info!("resolved macro: {}", export.name);
        }

        Ok(Self {
            name,
            exports,
            _library: library,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn macro_count(&self) -> usize {
        self.exports.len()
    }
}

/// Loads macro libraries from disk and owns them for the process lifetime.
pub struct MacroLoader {
    libraries: Vec<MacroLibrary>,
    registry: MacroRegistry,
}

impl MacroLoader {
    pub fn new() -> Self {
        Self {
            libraries: Vec::new(),
            registry: MacroRegistry::new(),
        }
    }

    /// Platform-conventional macro directories: the user data dir plus a
    /// `./macros` directory next to the executable.
    pub fn default_directories() -> Vec<PathBuf> {
        let mut directories = Vec::new();
        if let Some(data) = dirs::data_dir() {
            directories.push(data.join("macroboard/macros"));
        }
        directories.push(PathBuf::from("./macros"));
        directories
    }

    /// Scans every default directory once.
    pub fn scan_default_directories(&mut self) {
        for dir in Self::default_directories() {
            self.scan_directory(&dir);
        }
    }

    /// Scans `dir` for shared libraries and loads each one, skipping the
    /// reserved core library. A file that fails to load is logged and
    /// skipped; the scan always continues.
    pub fn scan_directory(&mut self, dir: &Path) {
        if !dir.is_dir() {
            info!("macro directory does not exist: {}", dir.display());
            return;
        }
        info!("scanning for macros in: {}", dir.display());

        let mut paths: Vec<PathBuf> = match std::fs::read_dir(dir) {
            Ok(entries) => entries.flatten().map(|entry| entry.path()).collect(),
            Err(err) => {
                error!("cannot read macro directory {}: {err}", dir.display());
                return;
            }
        };
        paths.sort();

        for path in paths {
            if !Self::is_macro_library(&path) {
                continue;
            }
            match MacroLibrary::open(&path) {
                Ok(library) => self.adopt(library),
                Err(err) => error!("{err}"),
            }
        }

        info!(
            "loaded {} macro libraries ({} macros)",
            self.libraries.len(),
            self.registry.len()
        );
    }

    /// Registers a loaded library's exports and takes ownership of it.
    pub fn adopt(&mut self, library: MacroLibrary) {
        for export in &library.exports {
            if !self.registry.register(&export.name, export.create, export.destroy) {
                warn!(
                    "overwriting macro '{}' with the copy from {}",
                    export.name, library.name
                );
            }
        }
        self.libraries.push(library);
    }

    pub fn registry(&self) -> &MacroRegistry {
        &self.registry
    }

    /// Mutable registry access, for registering in-process built-in types.
    pub fn registry_mut(&mut self) -> &mut MacroRegistry {
        &mut self.registry
    }

    pub fn library_count(&self) -> usize {
        self.libraries.len()
    }

    fn is_macro_library(path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(std::env::consts::DLL_EXTENSION) {
            return false;
        }
        match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => {
                stem != CORE_LIBRARY_STEM && stem != format!("lib{CORE_LIBRARY_STEM}")
            }
            None => false,
        }
    }
}

impl Default for MacroLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MacroLoader {
    fn drop(&mut self) {
        // Reverse load order; every created node instance must be gone by now.
        while let Some(library) = self.libraries.pop() {
            info!("closing macro library: {}", library.name);
        }
    }
}
