//! Per-load state over one extension binary.

use crate::{
    Result,
    elf::{ElfRela, ElfShdr, ElfSym, RELA_SIZE, SYM_SIZE, abi},
    error::format_error,
    ext::{Extension, MemKind},
    reader::{ExtReader, Storage},
};
use alloc::{format, string::String, vec, vec::Vec};

/// Where one section of the binary lives at run time: which memory region
/// it was loaded into and at what offset within that region.
#[derive(Debug, Default, Clone, Copy)]
pub struct SectionMap {
    /// The region kind, `None` when the section is not loaded anywhere.
    pub kind: Option<MemKind>,
    /// Byte offset of the section within the region.
    pub offset: usize,
}

/// The loader context for one extension binary.
///
/// Populated by the host while it reads the binary and places sections
/// into memory regions, then driven by [`link`](crate::link): it carries
/// the reader, the section-index-to-region map and pinned copies of the
/// region-defining section headers (symbol table, string tables, text).
pub struct ExtLoader<R: ExtReader> {
    reader: R,
    /// The binary's declared section count.
    shnum: usize,
    /// Section headers pinned per region kind.
    sects: [ElfShdr; MemKind::COUNT],
    /// Per-section-index region placement.
    sect_map: Vec<SectionMap>,
}

impl<R: ExtReader> ExtLoader<R> {
    /// Creates a loader over `reader` for a binary declaring `shnum`
    /// sections.
    pub fn new(reader: R, shnum: usize) -> Self {
        Self {
            reader,
            shnum,
            sects: [ElfShdr::default(); MemKind::COUNT],
            sect_map: vec![SectionMap::default(); shnum],
        }
    }

    /// The binary's declared section count.
    #[inline]
    pub fn shnum(&self) -> usize {
        self.shnum
    }

    /// Whether the underlying storage may be patched in place.
    #[inline]
    pub fn storage(&self) -> Storage {
        self.reader.storage()
    }

    /// The runtime address of the byte at `offset`, when addressable.
    #[inline]
    pub fn peek(&self, offset: usize) -> Option<usize> {
        self.reader.peek(offset)
    }

    /// Pins the section header that defines region `kind`.
    pub fn set_region_shdr(&mut self, kind: MemKind, shdr: ElfShdr) {
        self.sects[kind as usize] = shdr;
    }

    /// The pinned section header for region `kind`.
    #[inline]
    pub fn region_shdr(&self, kind: MemKind) -> &ElfShdr {
        &self.sects[kind as usize]
    }

    /// Records that section `shndx` was placed in region `kind` at
    /// `offset`.
    pub fn map_section(&mut self, shndx: usize, kind: MemKind, offset: usize) {
        if let Some(map) = self.sect_map.get_mut(shndx) {
            *map = SectionMap {
                kind: Some(kind),
                offset,
            };
        }
    }

    /// The region placement of section `shndx`.
    pub fn section_map(&self, shndx: usize) -> SectionMap {
        self.sect_map.get(shndx).copied().unwrap_or_default()
    }

    /// The runtime address of section `shndx`: its region's base plus its
    /// offset within the region. `None` when the section was not loaded.
    pub fn loaded_sect_addr(&self, ext: &Extension, shndx: usize) -> Option<usize> {
        let map = self.sect_map.get(shndx)?;
        let kind = map.kind?;
        Some(ext.region_base(kind).wrapping_add(map.offset))
    }

    /// Maps a runtime `offset` the binary was linked for back to a file
    /// offset, by finding the pinned region header whose address span
    /// contains it.
    pub fn file_offset(&self, offset: usize) -> Result<usize> {
        for shdr in self.sects.iter() {
            if shdr.sh_addr <= offset && offset < shdr.sh_addr + shdr.sh_size {
                return Ok(offset - shdr.sh_addr + shdr.sh_offset);
            }
        }
        Err(format_error(format!(
            "offset {offset:#x} not contained in any region"
        )))
    }

    /// Reads a chunk of the binary at `offset`.
    #[inline]
    pub fn read(&mut self, buf: &mut [u8], offset: usize) -> Result<()> {
        self.reader.read(buf, offset)
    }

    /// The number of entries in the binary's symbol table.
    #[inline]
    pub fn symtab_count(&self) -> usize {
        self.sects[MemKind::Symtab as usize].sh_size / SYM_SIZE
    }

    /// Reads relocation record `idx` of the relocation section `shdr`.
    ///
    /// The record flavor follows the section type; the entry size must
    /// already have been validated against it.
    pub fn read_rela(&mut self, shdr: &ElfShdr, idx: usize) -> Result<ElfRela> {
        let size = shdr.sh_entsize;
        let mut buf = [0u8; RELA_SIZE];
        self.reader
            .read(&mut buf[..size], shdr.sh_offset + idx * size)?;
        if shdr.sh_type == abi::SHT_REL {
            Ok(ElfRela::parse_rel(&buf))
        } else {
            Ok(ElfRela::parse_rela(&buf))
        }
    }

    /// Reads the symbol-table entry a relocation refers to.
    ///
    /// An index at or beyond the symbol table's entry count is a format
    /// error; the entry is never read from an out-of-range offset.
    pub fn read_symbol(&mut self, rela: &ElfRela) -> Result<ElfSym> {
        let idx = rela.r_sym();
        if idx >= self.symtab_count() {
            return Err(format_error(format!(
                "symbol index {idx} out of range ({} entries)",
                self.symtab_count()
            )));
        }
        let mut buf = [0u8; SYM_SIZE];
        let offset = self.sects[MemKind::Symtab as usize].sh_offset + idx * SYM_SIZE;
        self.reader.read(&mut buf, offset)?;
        Ok(ElfSym::parse(&buf))
    }

    /// Reads a NUL-terminated string at `offset` in the binary.
    pub fn read_string(&mut self, offset: usize) -> Result<String> {
        let mut bytes = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            self.reader.read(&mut byte, offset + bytes.len())?;
            if byte[0] == 0 {
                break;
            }
            bytes.push(byte[0]);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// The name of a symbol, read from the symbol string table.
    pub fn symbol_name(&mut self, sym: &ElfSym) -> Result<String> {
        let strtab_off = self.sects[MemKind::Strtab as usize].sh_offset;
        self.read_string(strtab_off + sym.st_name as usize)
    }

    /// The name of a section, read from the section-name string table.
    pub fn section_name(&mut self, shdr: &ElfShdr) -> Result<String> {
        let shstrtab_off = self.sects[MemKind::Shstrtab as usize].sh_offset;
        self.read_string(shstrtab_off + shdr.sh_name as usize)
    }
}
