//! ARM relocation back end.
//!
//! ARM extensions are built with implicit-addend relocations; the addend
//! is the word already stored at the patch target. Only the data-word
//! relocation types are handled here: branch-range fixups are the
//! toolchain's job because extensions are compiled with long calls.

use super::ArchRelocator;
use crate::{
    Result,
    elf::{ElfRela, ElfShdr, abi},
    error::{format_error, unsupported_error},
    ext::Extension,
    link,
    loader::ExtLoader,
    reader::ExtReader,
    registry::Registry,
};
use alloc::format;

/// Map an ARM relocation type to a human readable name.
fn rel_type_to_str(r_type: u32) -> &'static str {
    match r_type {
        abi::R_ARM_NONE => "R_ARM_NONE",
        abi::R_ARM_ABS32 => "R_ARM_ABS32",
        abi::R_ARM_REL32 => "R_ARM_REL32",
        _ => "UNKNOWN",
    }
}

fn read_word(addr: usize) -> u32 {
    unsafe { (addr as *const u32).read_unaligned() }
}

fn write_word(addr: usize, value: u32) {
    unsafe { (addr as *mut u32).write_unaligned(value) }
}

/// The ARM back end: direct, record-by-record patching.
pub struct ArmRelocator;

impl ArchRelocator for ArmRelocator {
    fn relocate<R: ExtReader>(
        &mut self,
        ldr: &mut ExtLoader<R>,
        ext: &mut Extension,
        registry: &Registry,
        rela: &ElfRela,
        shdr: &ElfShdr,
    ) -> Result<()> {
        let sym = ldr.read_symbol(rela)?;
        let name = ldr.symbol_name(&sym)?;
        let link_addr = link::lookup_symbol(ldr, ext, registry, rela, &sym, &name, shdr)?;

        let loc = ldr
            .loaded_sect_addr(ext, shdr.sh_info as usize)
            .ok_or_else(|| {
                format_error(format!(
                    "section {} is not loaded in any memory region",
                    shdr.sh_info
                ))
            })?
            .wrapping_add(rela.r_offset);

        match rela.r_type() {
            abi::R_ARM_NONE => {}
            // S + A
            abi::R_ARM_ABS32 => {
                let addend = read_word(loc);
                write_word(loc, (link_addr as u32).wrapping_add(addend));
            }
            // S + A - P
            abi::R_ARM_REL32 => {
                let addend = read_word(loc);
                write_word(
                    loc,
                    (link_addr as u32)
                        .wrapping_add(addend)
                        .wrapping_sub(loc as u32),
                );
            }
            other => {
                return Err(unsupported_error(format!(
                    "relocation type {other} ({}) is not supported",
                    rel_type_to_str(other)
                )));
            }
        }
        Ok(())
    }
}
