//! Architecture back ends.
//!
//! The per-architecture relocation logic is injected at build time: the
//! walker drives an [`ArchRelocator`] whose associated [`LinkMode`] decides
//! whether relocation sections are applied record-by-record or through the
//! jump-table patcher. Every hook defaults to an explicit not-supported
//! error, so an architecture only implements the entry points its
//! relocation scheme uses.

use crate::{
    Result,
    elf::{ElfRela, ElfShdr, ElfSym},
    error::unsupported_error,
    ext::Extension,
    link::LoadParam,
    loader::ExtLoader,
    reader::ExtReader,
    registry::Registry,
};

/// How relocation sections are applied on an architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// Each record is dispatched whole to [`ArchRelocator::relocate`],
    /// which resolves the symbol and patches the target itself.
    Direct,
    /// Relocation sections go through the jump-table patcher, which
    /// resolves symbols binding-aware and hands the back end a
    /// precomputed patch address.
    JumpTable,
}

/// An architecture-specific relocation back end.
///
/// Selected once per build configuration; the two [`LinkMode`] paths are
/// never combined for the same section.
pub trait ArchRelocator {
    /// The relocation scheme this architecture uses.
    const MODE: LinkMode = LinkMode::Direct;

    /// Computes and writes the patched value for one relocation record.
    ///
    /// The back end reads the referenced symbol and resolves it through
    /// [`read_symbol`](ExtLoader::read_symbol) and
    /// [`lookup_symbol`](crate::lookup_symbol). `shdr` is the relocation
    /// section being walked; its `sh_info` names the patched section.
    fn relocate<R: ExtReader>(
        &mut self,
        ldr: &mut ExtLoader<R>,
        ext: &mut Extension,
        registry: &Registry,
        rela: &ElfRela,
        shdr: &ElfShdr,
    ) -> Result<()> {
        let _ = (ldr, ext, registry, rela, shdr);
        Err(unsupported_error(
            "whole-record relocation is not supported on this architecture",
        ))
    }

    /// Patches one locally bound jump-table record.
    ///
    /// Local symbols resolve against the extension's own layout, so no
    /// link address is supplied.
    fn relocate_local<R: ExtReader>(
        &mut self,
        ldr: &mut ExtLoader<R>,
        ext: &Extension,
        rela: &ElfRela,
        sym: &ElfSym,
        rel_addr: usize,
        parm: &LoadParam<'_>,
    ) -> Result<()> {
        let _ = (ldr, ext, rela, sym, rel_addr, parm);
        Err(unsupported_error(
            "local jump-table relocation is not supported on this architecture",
        ))
    }

    /// Patches one globally bound jump-table record with its resolved
    /// `link_addr`.
    fn relocate_global<R: ExtReader>(
        &mut self,
        ldr: &mut ExtLoader<R>,
        ext: &Extension,
        rela: &ElfRela,
        sym: &ElfSym,
        rel_addr: usize,
        link_addr: usize,
    ) -> Result<()> {
        let _ = (ldr, ext, rela, sym, rel_addr, link_addr);
        Err(unsupported_error(
            "global jump-table relocation is not supported on this architecture",
        ))
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "arm")] {
        mod arm;
        pub use arm::ArmRelocator as DefaultRelocator;
    } else {
        /// A back end that declines every relocation.
        ///
        /// Stands in on targets without a native back end; hosts there
        /// supply their own [`ArchRelocator`].
        pub struct DefaultRelocator;

        impl ArchRelocator for DefaultRelocator {}
    }
}
