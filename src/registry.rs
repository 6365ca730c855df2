//! The host-owned registry of loaded extensions and exported symbols.
//!
//! The registry is process-wide shared state, but it is passed explicitly
//! into every link pass rather than living in a global: reads are shared
//! between concurrent loads, while registration and deregistration are
//! whole-extension operations the host must serialize.

use crate::ext::Extension;
use alloc::{
    string::{String, ToString},
    sync::Arc,
    vec::Vec,
};
use core::hash::{Hash, Hasher};
use hashbrown::{Equivalent, HashMap};

/// Prefix shared by generated device-object symbols.
///
/// Importing a device object without the `export-devices` feature enabled
/// produces cryptic unresolved-symbol errors; the resolver matches this
/// prefix to emit a targeted hint instead.
pub(crate) const DEVICE_PREFIX: &str = "__device_";

/// An owned exported-symbol key.
///
/// Symbols are normally keyed by name; under the `slid` feature built-in
/// symbols are keyed by a compact numeric identifier instead, which drops
/// the name strings from the host image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymKey {
    /// A symbol name.
    Name(String),
    /// A symbol-link identifier.
    Slid(usize),
}

/// A borrowed symbol lookup key, hash-compatible with [`SymKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymName<'a> {
    /// A symbol name.
    Name(&'a str),
    /// A symbol-link identifier.
    Slid(usize),
}

impl Hash for SymKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            SymKey::Name(name) => {
                state.write_u8(0);
                name.as_str().hash(state);
            }
            SymKey::Slid(slid) => {
                state.write_u8(1);
                slid.hash(state);
            }
        }
    }
}

impl Hash for SymName<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            SymName::Name(name) => {
                state.write_u8(0);
                name.hash(state);
            }
            SymName::Slid(slid) => {
                state.write_u8(1);
                slid.hash(state);
            }
        }
    }
}

impl Equivalent<SymKey> for SymName<'_> {
    fn equivalent(&self, key: &SymKey) -> bool {
        match (self, key) {
            (SymName::Name(a), SymKey::Name(b)) => *a == b.as_str(),
            (SymName::Slid(a), SymKey::Slid(b)) => a == b,
            _ => false,
        }
    }
}

/// An exported-symbol table: name (or numeric identifier) to runtime
/// address.
pub struct ExportTable {
    map: HashMap<SymKey, usize, foldhash::fast::FixedState>,
}

impl ExportTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            map: HashMap::default(),
        }
    }

    /// Exports `addr` under `name`.
    pub fn insert(&mut self, name: &str, addr: usize) {
        self.map.insert(SymKey::Name(name.to_string()), addr);
    }

    /// Exports `addr` under the numeric identifier `slid`.
    pub fn insert_slid(&mut self, slid: usize, addr: usize) {
        self.map.insert(SymKey::Slid(slid), addr);
    }

    /// Looks up a symbol's address.
    pub fn find(&self, name: &SymName<'_>) -> Option<usize> {
        self.map.get(name).copied()
    }
}

impl Default for ExportTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The set of currently loaded extensions plus the host's own exported
/// symbols.
#[derive(Default)]
pub struct Registry {
    /// Symbols the running system exports to extensions.
    global: ExportTable,
    /// Loaded extensions, in registration order.
    extensions: Vec<Arc<Extension>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exports a host symbol to extensions.
    pub fn export(&mut self, name: &str, addr: usize) {
        self.global.insert(name, addr);
    }

    /// Exports a host symbol under a numeric identifier.
    pub fn export_slid(&mut self, slid: usize, addr: usize) {
        self.global.insert_slid(slid, addr);
    }

    /// Looks up a symbol in the global exported table.
    pub fn find_sym(&self, name: &SymName<'_>) -> Option<usize> {
        self.global.find(name)
    }

    /// Registers a fully linked extension.
    ///
    /// Must be serialized with other registry mutation by the caller.
    pub fn register(&mut self, ext: Arc<Extension>) {
        self.extensions.push(ext);
    }

    /// Removes a registered extension by name and returns it.
    ///
    /// The caller is responsible for checking the extension's use-count
    /// before tearing it down.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<Extension>> {
        let idx = self.extensions.iter().position(|ext| ext.name() == name)?;
        Some(self.extensions.remove(idx))
    }

    /// The loaded extensions, in registration order.
    pub fn extensions(&self) -> &[Arc<Extension>] {
        &self.extensions
    }

    /// Scans every loaded extension's exported table for `name`, in
    /// registration order.
    pub fn find_extension_sym(&self, name: &str) -> Option<(usize, &Arc<Extension>)> {
        self.extensions
            .iter()
            .find_map(|ext| ext.find_sym(name).map(|addr| (addr, ext)))
    }
}
