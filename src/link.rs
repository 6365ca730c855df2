//! The link pass: relocation-table walking, symbol resolution and cache
//! synchronization.

use crate::{
    Error, Result,
    arch::{ArchRelocator, LinkMode},
    cache::CacheOps,
    elf::{ElfRela, ElfShdr, ElfSym, REL_SIZE, RELA_SIZE, abi},
    error::{format_error, unresolved_error, unsupported_error},
    ext::{Extension, MemKind},
    loader::ExtLoader,
    macros::{debug, error, warn},
    reader::{ExtReader, Storage},
    registry::Registry,
};
use alloc::format;

/// Parameters of one load, supplied by the host.
pub struct LoadParam<'a> {
    /// The code region already sits at the address it was linked for, so
    /// no patching-driven instruction-cache invalidation is needed.
    pub pre_located: bool,
    /// Identifies sections left in detached buffers instead of the
    /// contiguous memory regions; such sections are cache-synchronized
    /// individually.
    pub section_detached: Option<&'a dyn Fn(&ElfShdr) -> bool>,
}

impl Default for LoadParam<'_> {
    fn default() -> Self {
        Self {
            pre_located: false,
            section_detached: None,
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "slid")] {
        use crate::registry::SymName;

        fn global_sym_name<'a>(_name: &'a str, sym: &ElfSym) -> SymName<'a> {
            SymName::Slid(sym.st_value)
        }
    } else {
        use crate::registry::SymName;

        fn global_sym_name<'a>(name: &'a str, _sym: &ElfSym) -> SymName<'a> {
            SymName::Name(name)
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "export-devices")] {
        fn device_hint(_name: &str) {}
    } else {
        /// Importing device objects without the `export-devices` feature
        /// fails with ordinary unresolved-symbol errors; recognizing the
        /// device naming convention lets us point at the real cause.
        fn device_hint(name: &str) {
            if name.starts_with(crate::registry::DEVICE_PREFIX) {
                warn!(
                    "(device objects are not available for import because \
                     the `export-devices` feature is not enabled)"
                );
            }
        }
    }
}

/// Determines the address of a symbol referenced by a relocation.
///
/// Resolution order for undefined symbols: the global exported table
/// first (by name, or by numeric identifier under the `slid` feature),
/// then every loaded extension's exported table in registration order. A
/// hit in another extension registers a dependency on it. Symbols with a
/// concrete section index resolve to the section's runtime address plus
/// the symbol value; any index at or beyond the declared section count or
/// inside the reserved range is rejected rather than dereferenced.
pub fn lookup_symbol<R: ExtReader>(
    ldr: &mut ExtLoader<R>,
    ext: &mut Extension,
    registry: &Registry,
    rela: &ElfRela,
    sym: &ElfSym,
    name: &str,
    shdr: &ElfShdr,
) -> Result<usize> {
    if rela.r_sym() == 0 {
        // No symbol, e.g. purely positional fixups.
        return Ok(0);
    }

    let shndx = sym.st_shndx;
    if shndx == abi::SHN_UNDEF {
        // Undefined here, resolve externally.
        let mut link_addr = registry.find_sym(&global_sym_name(name, sym));
        if link_addr.is_none() {
            // Try the tables of previously loaded extensions.
            if let Some((addr, dep)) = registry.find_extension_sym(name) {
                ext.add_dependency(dep)?;
                link_addr = Some(addr);
            }
        }
        let Some(addr) = link_addr else {
            error!(
                "undefined symbol with no entry in symbol table {name}, \
                 offset {}, link section {}",
                rela.r_offset, shdr.sh_link
            );
            device_hint(name);
            return Err(unresolved_error(
                name,
                format!(
                    "no entry in any symbol table (offset {}, link section {})",
                    rela.r_offset, shdr.sh_link
                ),
            ));
        };
        debug!("found symbol {name} at {addr:#x}");
        Ok(addr)
    } else if shndx == abi::SHN_ABS {
        // Absolute symbol, the value is the address.
        Ok(sym.st_value)
    } else if (shndx as usize) < ldr.shnum()
        && !(abi::SHN_LORESERVE..=abi::SHN_HIRESERVE).contains(&shndx)
    {
        // A symbol in a concrete section resolves to the section's
        // runtime address plus the symbol value. The SHN_ABS arm above
        // must come first: SHN_ABS lies inside the reserved range this
        // arm rejects.
        ldr.loaded_sect_addr(ext, shndx as usize)
            .map(|base| base.wrapping_add(sym.st_value))
            .ok_or_else(|| {
                format_error(format!(
                    "symbol `{name}` lives in section {shndx}, which is not \
                     loaded in any memory region"
                ))
            })
    } else {
        // Out-of-range or reserved section indices would let a corrupt
        // symbol table direct a patch at an arbitrary address.
        error!(
            "cannot apply relocation: target symbol has unexpected \
             section index {shndx} ({shndx:#x})"
        );
        Err(format_error(format!(
            "target symbol `{name}` has unexpected section index {shndx}"
        )))
    }
}

/// Resolves and patches every relocation of an extension, then
/// synchronizes caches over the patched regions.
///
/// Walks the section-header table and applies each relocation section
/// through the architecture back end. Structural defects and reader
/// failures abort immediately; unresolved symbols and declined relocation
/// types are accumulated so one pass reports every bad record, with the
/// first error code surviving to the caller.
pub fn link<R, A, C>(
    ldr: &mut ExtLoader<R>,
    ext: &mut Extension,
    registry: &Registry,
    arch: &mut A,
    cache: &mut C,
    parm: &LoadParam<'_>,
) -> Result<()>
where
    R: ExtReader,
    A: ArchRelocator,
    C: CacheOps,
{
    let mut link_err: Option<Error> = None;
    let sect_cnt = ext.sect_hdrs().len();

    for i in 0..sect_cnt {
        let shdr = ext.sect_hdrs()[i];

        // Only relocation sections are walked.
        let expected_entsize = match shdr.sh_type {
            abi::SHT_REL => REL_SIZE,
            abi::SHT_RELA => RELA_SIZE,
            _ => continue,
        };
        if shdr.sh_entsize != expected_entsize {
            error!(
                "invalid entry size {} for relocation section {i}",
                shdr.sh_entsize
            );
            return Err(format_error(format!(
                "invalid entry size {} for relocation section {i}",
                shdr.sh_entsize
            )));
        }

        let info = shdr.sh_info as usize;
        if info >= sect_cnt || shdr.sh_size % shdr.sh_entsize != 0 {
            error!(
                "sanity checks failed for section {i} (info {info}, size {}, \
                 entsize {})",
                shdr.sh_size, shdr.sh_entsize
            );
            return Err(format_error(format!(
                "sanity checks failed for section {i} (info {info}, size {}, \
                 entsize {})",
                shdr.sh_size, shdr.sh_entsize
            )));
        }

        let rel_cnt = shdr.sh_size / shdr.sh_entsize;

        if A::MODE == LinkMode::JumpTable {
            // Jump-table architectures route every relocation section
            // through the indirect patcher instead of the per-record
            // dispatch below.
            let name = ldr.section_name(&shdr)?;
            let tgt = if name == ".rela.plt" || name == ".rela.dyn" {
                // Shared/dynamically linked layout.
                None
            } else {
                // Relocatable object: sh_info names the patched section.
                Some(ext.sect_hdrs()[info])
            };
            link_plt(ldr, ext, registry, arch, &shdr, parm, tgt.as_ref())?;
            continue;
        }

        if !ext.sect_hdrs()[info].is_alloc() {
            // Relocations acting on volatile (debug) sections are
            // irrelevant at run time.
            continue;
        }

        if ldr.section_map(info).kind.is_none() {
            error!("section {info} not loaded in any memory region");
            return Err(format_error(format!(
                "section {info} is not loaded in any memory region"
            )));
        }

        debug!(
            "relocation section {i} acting on section {info} has {rel_cnt} \
             relocations"
        );

        let symtab_cnt = ldr.symtab_count();
        for j in 0..rel_cnt {
            // A failed record read is immediately fatal: subsequent reads
            // cannot be trusted to be positioned correctly.
            let rela = ldr.read_rela(&shdr, j)?;

            if rela.r_sym() >= symtab_cnt {
                warn!(
                    "relocation {i}:{j}: symbol index {} out of range \
                     ({symtab_cnt} entries)",
                    rela.r_sym()
                );
                if link_err.is_none() {
                    link_err = Some(format_error(format!(
                        "relocation {i}:{j}: symbol index {} out of range",
                        rela.r_sym()
                    )));
                }
                continue;
            }

            debug!(
                "relocation {i}:{j} info {:#x} (type {}, sym {}) offset {}",
                rela.r_info,
                rela.r_type(),
                rela.r_sym(),
                rela.r_offset
            );

            // Collect the first error, keep walking for diagnostics.
            match arch.relocate(ldr, ext, registry, &rela, &shdr) {
                Ok(()) => {}
                Err(err @ Error::Io { .. }) => return Err(err),
                Err(err) => {
                    if link_err.is_none() {
                        link_err = Some(err);
                    }
                }
            }
        }
    }

    if let Some(err) = link_err {
        return Err(err);
    }

    sync_caches(ldr, ext, cache, parm);
    Ok(())
}

/// Applies one relocation section through the jump-table scheme.
///
/// Each record's symbol is resolved binding-aware: global symbols go
/// through the full lookup chain (global table, the extension's own
/// table, then other loaded extensions) and reach the back end with a
/// precomputed link address; local symbols are delegated straight to the
/// back end, which knows the extension's layout. Unresolvable globals do
/// not stop the pass; the first failure is returned once the whole
/// section has been attempted.
fn link_plt<R, A>(
    ldr: &mut ExtLoader<R>,
    ext: &mut Extension,
    registry: &Registry,
    arch: &mut A,
    shdr: &ElfShdr,
    parm: &LoadParam<'_>,
    tgt: Option<&ElfShdr>,
) -> Result<()>
where
    R: ExtReader,
    A: ArchRelocator,
{
    if ldr.storage() != Storage::Writable {
        // r_offset arithmetic below patches the loaded image directly,
        // which is only valid when the image buffer is the final
        // location. Read-only images must be pre-copied by the caller.
        error!("cannot patch relocations in a read-only binary");
        return Err(unsupported_error(
            "cannot patch relocations in a read-only binary",
        ));
    }

    let sh_cnt = shdr.sh_size / shdr.sh_entsize;
    let text = ext.region_base(MemKind::Text);
    debug!(
        "jump-table section type {} entsize {} count {sh_cnt} text {text:#x}",
        shdr.sh_type, shdr.sh_entsize
    );

    let sym_cnt = ldr.symtab_count();
    let mut link_err: Option<Error> = None;

    for i in 0..sh_cnt {
        let rela = match ldr.read_rela(shdr, i) {
            Ok(rela) => rela,
            Err(_) => {
                error!("failed to read relocation #{i}, trying to continue");
                continue;
            }
        };

        let j = rela.r_sym();
        if j >= sym_cnt {
            warn!("relocation #{i}: symbol index {j} >= {sym_cnt}");
            continue;
        }

        let sym = match ldr.read_symbol(&rela) {
            Ok(sym) => sym,
            Err(_) => {
                error!(
                    "failed to read symbol {j} for relocation #{i}, trying \
                     to continue"
                );
                continue;
            }
        };

        let stt = sym.st_type();
        if stt != abi::STT_FUNC
            && stt != abi::STT_SECTION
            && stt != abi::STT_OBJECT
            && (stt != abi::STT_NOTYPE || sym.st_shndx != abi::SHN_UNDEF)
        {
            // Not a valid relocation target in this scheme.
            continue;
        }

        let name = match ldr.symbol_name(&sym) {
            Ok(name) => name,
            Err(_) => {
                error!("failed to read name of symbol {j}, trying to continue");
                continue;
            }
        };

        // Both r_offset and the pinned region addresses are addresses the
        // extension was built for; the text region is the reference
        // point for turning them into patch locations.
        let mut rel_addr = text.wrapping_sub(ldr.region_shdr(MemKind::Text).sh_offset);
        if let Some(tgt) = tgt {
            // Relocatable / partially linked layout.
            rel_addr = rel_addr.wrapping_add(rela.r_offset + tgt.sh_offset);
        } else {
            // Shared / dynamically linked layout.
            match ldr.file_offset(rela.r_offset) {
                Ok(offset) => rel_addr = rel_addr.wrapping_add(offset),
                Err(_) => {
                    error!(
                        "offset {:#x} not found in binary, trying to continue",
                        rela.r_offset
                    );
                    continue;
                }
            }
        }

        let stb = sym.st_bind();
        match stb {
            abi::STB_GLOBAL => {
                // First the global symbol table.
                let mut link_addr = registry.find_sym(&global_sym_name(&name, &sym));

                if link_addr.is_none() {
                    // Next the extension's own table.
                    link_addr = ext.find_sym(&name);
                }

                if link_addr.is_none() {
                    // Finally any loaded extension's table.
                    if let Some((addr, dep)) = registry.find_extension_sym(&name) {
                        if let Err(err) = ext.add_dependency(dep) {
                            if link_err.is_none() {
                                link_err = Some(err);
                            }
                            continue;
                        }
                        link_addr = Some(addr);
                    }
                }

                let Some(link_addr) = link_addr else {
                    warn!("cannot find symbol {j} name {name}");
                    // Fail after reporting every missing symbol.
                    if link_err.is_none() {
                        link_err = Some(unresolved_error(
                            name,
                            format!("no entry in any symbol table (relocation #{i})"),
                        ));
                    }
                    continue;
                };

                if let Err(err) =
                    arch.relocate_global(ldr, ext, &rela, &sym, rel_addr, link_addr)
                {
                    if link_err.is_none() {
                        link_err = Some(err);
                    }
                }
            }
            abi::STB_LOCAL => {
                if let Err(err) = arch.relocate_local(ldr, ext, &rela, &sym, rel_addr, parm) {
                    if link_err.is_none() {
                        link_err = Some(err);
                    }
                }
            }
            _ => {}
        }

        if link_err.is_none() {
            debug!(
                "symbol {name} relocation @{rel_addr:#x} r-offset {:#x} \
                 text offset {:#x} stb {stb}",
                rela.r_offset,
                ldr.region_shdr(MemKind::Text).sh_offset
            );
        }
    }

    match link_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Pushes patched bytes out of the data caches and discards stale
/// instruction-cache lines, so instruction fetch observes the relocated
/// code.
fn sync_caches<R, C>(ldr: &ExtLoader<R>, ext: &Extension, cache: &mut C, parm: &LoadParam<'_>)
where
    R: ExtReader,
    C: CacheOps,
{
    for kind in MemKind::ALL {
        let base = ext.region_base(kind);
        if base != 0 {
            cache.data_flush_range(base, ext.region_size(kind));
            if kind == MemKind::Text && !parm.pre_located {
                cache.instr_invalidate_range(base, ext.region_size(kind));
            }
        }
    }

    // Detached sections stay in their own buffers and are synchronized
    // in place.
    if let Some(section_detached) = parm.section_detached {
        for shdr in ext.sect_hdrs() {
            if section_detached(shdr) {
                let Some(base) = ldr.peek(shdr.sh_offset) else {
                    warn!(
                        "detached section at {:#x} is not addressable, \
                         skipping cache sync",
                        shdr.sh_offset
                    );
                    continue;
                };
                cache.data_flush_range(base, shdr.sh_size);
                if shdr.is_execinstr() && !parm.pre_located {
                    cache.instr_invalidate_range(base, shdr.sh_size);
                }
            }
        }
    }
}
