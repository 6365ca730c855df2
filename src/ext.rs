//! Loaded extensions, their memory regions and dependency tracking.

use crate::{
    Result,
    elf::ElfShdr,
    error::capacity_error,
    macros::debug,
    registry::{ExportTable, SymName},
};
use alloc::{
    format,
    string::{String, ToString},
    sync::Arc,
    vec::Vec,
};
use core::sync::atomic::{AtomicU32, Ordering};

/// Capacity of an extension's dependency list.
///
/// Dependencies are tracked in a fixed-size array rather than a growable
/// collection so that loading never allocates per discovered dependency.
/// Exceeding the capacity is a [`Error::Capacity`](crate::Error::Capacity)
/// error, not a reallocation.
pub const DEPENDENCY_COUNT: usize = 8;

/// The logical memory-region kinds an extension's sections are loaded
/// into.
///
/// The host allocates one contiguous region per kind and places every
/// runtime-allocated section into one of them; the region base plus the
/// section's offset within the region yields the section's runtime
/// address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemKind {
    /// Executable code.
    Text,
    /// Initialized writable data.
    Data,
    /// Read-only data.
    Rodata,
    /// Zero-initialized data.
    Bss,
    /// The extension's exported-symbol section.
    Exported,
    /// The symbol table.
    Symtab,
    /// The symbol-name string table.
    Strtab,
    /// The section-name string table.
    Shstrtab,
}

impl MemKind {
    /// Number of region kinds.
    pub const COUNT: usize = 8;

    /// All region kinds, in declaration order.
    pub const ALL: [MemKind; Self::COUNT] = [
        MemKind::Text,
        MemKind::Data,
        MemKind::Rodata,
        MemKind::Bss,
        MemKind::Exported,
        MemKind::Symtab,
        MemKind::Strtab,
        MemKind::Shstrtab,
    ];
}

/// A loaded extension.
///
/// Created when a load begins, populated incrementally by the host as
/// sections are read into memory regions, and usable once [`link`]
/// succeeds. The host must call [`remove_all_dependencies`] before
/// discarding an extension, including a partially initialized one whose
/// load failed.
///
/// [`link`]: crate::link
/// [`remove_all_dependencies`]: Extension::remove_all_dependencies
pub struct Extension {
    /// Extension name, used in diagnostics.
    name: String,
    /// Region base addresses, zero when unpopulated.
    mem: [usize; MemKind::COUNT],
    /// Region sizes in bytes.
    mem_size: [usize; MemKind::COUNT],
    /// The binary's section-header table.
    sect_hdrs: Vec<ElfShdr>,
    /// Symbols this extension exports to the global namespace and to
    /// later-loaded extensions.
    exports: ExportTable,
    /// Extensions this one resolved symbols from. Dense: entries are only
    /// ever appended, and removed all at once at teardown.
    dependency: [Option<Arc<Extension>>; DEPENDENCY_COUNT],
    /// Number of other extensions currently depending on this one.
    /// Atomic because concurrent loads may both resolve against it.
    use_count: AtomicU32,
}

impl Extension {
    /// Creates an empty extension with the given name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().to_string(),
            mem: [0; MemKind::COUNT],
            mem_size: [0; MemKind::COUNT],
            sect_hdrs: Vec::new(),
            exports: ExportTable::new(),
            dependency: [const { None }; DEPENDENCY_COUNT],
            use_count: AtomicU32::new(0),
        }
    }

    /// The extension's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records the base address and size of one memory region.
    pub fn set_region(&mut self, kind: MemKind, base: usize, size: usize) {
        self.mem[kind as usize] = base;
        self.mem_size[kind as usize] = size;
    }

    /// The base address of a region, zero when unpopulated.
    #[inline]
    pub fn region_base(&self, kind: MemKind) -> usize {
        self.mem[kind as usize]
    }

    /// The size of a region in bytes.
    #[inline]
    pub fn region_size(&self, kind: MemKind) -> usize {
        self.mem_size[kind as usize]
    }

    /// Installs the binary's section-header table.
    pub fn set_section_headers(&mut self, sect_hdrs: Vec<ElfShdr>) {
        self.sect_hdrs = sect_hdrs;
    }

    /// The binary's section-header table.
    #[inline]
    pub fn sect_hdrs(&self) -> &[ElfShdr] {
        &self.sect_hdrs
    }

    /// Exports a symbol at `addr` under `name`.
    pub fn export(&mut self, name: impl AsRef<str>, addr: usize) {
        self.exports.insert(name.as_ref(), addr);
    }

    /// Looks up a symbol in this extension's exported table.
    pub fn find_sym(&self, name: &str) -> Option<usize> {
        self.exports.find(&SymName::Name(name))
    }

    /// The number of extensions currently depending on this one.
    #[inline]
    pub fn use_count(&self) -> u32 {
        self.use_count.load(Ordering::Acquire)
    }

    /// The dependency at `idx`, if any.
    pub fn dependency(&self, idx: usize) -> Option<&Arc<Extension>> {
        self.dependency.get(idx).and_then(|slot| slot.as_ref())
    }

    /// Registers `dep` as a dependency of this extension.
    ///
    /// Idempotent: re-adding an already-listed dependency is a no-op and
    /// does not touch the use-count. A full dependency list is reported as
    /// a resource error and leaves both extensions unchanged.
    pub fn add_dependency(&mut self, dep: &Arc<Extension>) -> Result<()> {
        for slot in self.dependency.iter_mut() {
            match slot {
                Some(existing) => {
                    if Arc::ptr_eq(existing, dep) {
                        return Ok(());
                    }
                }
                None => {
                    dep.use_count.fetch_add(1, Ordering::Relaxed);
                    *slot = Some(dep.clone());
                    debug!("`{}` now depends on `{}`", self.name, dep.name);
                    return Ok(());
                }
            }
        }
        Err(capacity_error(format!(
            "dependency list of `{}` is full ({DEPENDENCY_COUNT} entries)",
            self.name
        )))
    }

    /// Drops the use-count this extension holds on each of its
    /// dependencies.
    ///
    /// The use-count of a dependency is tightly bound to its dependents'
    /// life cycles, so it cannot be zero here; an underrun means the
    /// tracking was corrupted and panics.
    pub fn remove_all_dependencies(&mut self) {
        for slot in self.dependency.iter() {
            let Some(dep) = slot else { break };
            let prev = dep.use_count.fetch_sub(1, Ordering::Release);
            assert!(
                prev != 0,
                "dependency use-count underrun on `{}`",
                dep.name
            );
        }
    }
}
