//! Binary-format records consumed by the linker.
//!
//! Only the relocation-relevant structures are modelled: section headers,
//! symbol-table entries and the two relocation record flavors. Field widths
//! follow the class of the target (ELF32 on 32-bit targets, ELF64 on 64-bit
//! targets), matching the layout the extension was compiled for. All
//! supported targets are little-endian, so records are decoded with
//! `from_le_bytes`.

pub use ::elf::abi;

cfg_if::cfg_if! {
    if #[cfg(target_pointer_width = "64")] {
        /// Size in bytes of one section header record.
        pub const SHDR_SIZE: usize = 64;
        /// Size in bytes of one symbol-table record.
        pub const SYM_SIZE: usize = 24;
        /// Size in bytes of one implicit-addend relocation record.
        pub const REL_SIZE: usize = 16;
        /// Size in bytes of one explicit-addend relocation record.
        pub const RELA_SIZE: usize = 24;

        const R_SYM_SHIFT: u32 = 32;
        const R_TYPE_MASK: usize = 0xffff_ffff;
    } else {
        /// Size in bytes of one section header record.
        pub const SHDR_SIZE: usize = 40;
        /// Size in bytes of one symbol-table record.
        pub const SYM_SIZE: usize = 16;
        /// Size in bytes of one implicit-addend relocation record.
        pub const REL_SIZE: usize = 8;
        /// Size in bytes of one explicit-addend relocation record.
        pub const RELA_SIZE: usize = 12;

        const R_SYM_SHIFT: u32 = 8;
        const R_TYPE_MASK: usize = 0xff;
    }
}

fn u16_at(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes(buf[off..off + 2].try_into().unwrap())
}

fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

cfg_if::cfg_if! {
    if #[cfg(target_pointer_width = "64")] {
        fn word_at(buf: &[u8], off: usize) -> usize {
            u64::from_le_bytes(buf[off..off + 8].try_into().unwrap()) as usize
        }

        fn sword_at(buf: &[u8], off: usize) -> isize {
            i64::from_le_bytes(buf[off..off + 8].try_into().unwrap()) as isize
        }
    } else {
        fn word_at(buf: &[u8], off: usize) -> usize {
            u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()) as usize
        }

        fn sword_at(buf: &[u8], off: usize) -> isize {
            i32::from_le_bytes(buf[off..off + 4].try_into().unwrap()) as isize
        }
    }
}

/// One entry of the section-header table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ElfShdr {
    /// Offset of the section name in the section-name string table.
    pub sh_name: u32,
    /// Section type (`SHT_*`).
    pub sh_type: u32,
    /// Section flags (`SHF_*`).
    pub sh_flags: usize,
    /// Address the section was linked for.
    pub sh_addr: usize,
    /// File offset of the section contents.
    pub sh_offset: usize,
    /// Size of the section contents in bytes.
    pub sh_size: usize,
    /// Associated section index (relocation section -> symbol table).
    pub sh_link: u32,
    /// Extra information (relocation section -> patched section index).
    pub sh_info: u32,
    /// Alignment requirement.
    pub sh_addralign: usize,
    /// Record size for table-like sections.
    pub sh_entsize: usize,
}

impl ElfShdr {
    /// Decodes a section header from `buf`, which must hold at least
    /// [`SHDR_SIZE`] bytes.
    pub fn parse(buf: &[u8]) -> Self {
        #[cfg(target_pointer_width = "64")]
        let shdr = ElfShdr {
            sh_name: u32_at(buf, 0),
            sh_type: u32_at(buf, 4),
            sh_flags: word_at(buf, 8),
            sh_addr: word_at(buf, 16),
            sh_offset: word_at(buf, 24),
            sh_size: word_at(buf, 32),
            sh_link: u32_at(buf, 40),
            sh_info: u32_at(buf, 44),
            sh_addralign: word_at(buf, 48),
            sh_entsize: word_at(buf, 56),
        };
        #[cfg(target_pointer_width = "32")]
        let shdr = ElfShdr {
            sh_name: u32_at(buf, 0),
            sh_type: u32_at(buf, 4),
            sh_flags: word_at(buf, 8),
            sh_addr: word_at(buf, 12),
            sh_offset: word_at(buf, 16),
            sh_size: word_at(buf, 20),
            sh_link: u32_at(buf, 24),
            sh_info: u32_at(buf, 28),
            sh_addralign: word_at(buf, 32),
            sh_entsize: word_at(buf, 36),
        };
        shdr
    }

    /// Whether the section occupies memory at run time.
    #[inline]
    pub fn is_alloc(&self) -> bool {
        self.sh_flags & abi::SHF_ALLOC as usize != 0
    }

    /// Whether the section holds executable instructions.
    #[inline]
    pub fn is_execinstr(&self) -> bool {
        self.sh_flags & abi::SHF_EXECINSTR as usize != 0
    }
}

/// One entry of the symbol table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ElfSym {
    /// Offset of the symbol name in the string table.
    pub st_name: u32,
    /// Symbol value: an offset within `st_shndx`, or an absolute value
    /// when the section index is `SHN_ABS`.
    pub st_value: usize,
    /// Size of the object the symbol describes.
    pub st_size: usize,
    /// Packed binding (high nibble) and type (low nibble).
    pub st_info: u8,
    /// Visibility.
    pub st_other: u8,
    /// Section index, or one of the `SHN_*` sentinels.
    pub st_shndx: u16,
}

impl ElfSym {
    /// Decodes a symbol record from `buf`, which must hold at least
    /// [`SYM_SIZE`] bytes.
    pub fn parse(buf: &[u8]) -> Self {
        #[cfg(target_pointer_width = "64")]
        let sym = ElfSym {
            st_name: u32_at(buf, 0),
            st_info: buf[4],
            st_other: buf[5],
            st_shndx: u16_at(buf, 6),
            st_value: word_at(buf, 8),
            st_size: word_at(buf, 16),
        };
        #[cfg(target_pointer_width = "32")]
        let sym = ElfSym {
            st_name: u32_at(buf, 0),
            st_value: word_at(buf, 4),
            st_size: word_at(buf, 8),
            st_info: buf[12],
            st_other: buf[13],
            st_shndx: u16_at(buf, 14),
        };
        sym
    }

    /// The symbol type (`STT_*`).
    #[inline]
    pub fn st_type(&self) -> u8 {
        self.st_info & 0xf
    }

    /// The symbol binding (`STB_*`).
    #[inline]
    pub fn st_bind(&self) -> u8 {
        self.st_info >> 4
    }
}

/// One relocation record.
///
/// Both flavors decode into this struct; the implicit-addend flavor carries
/// an addend of zero. The flavors are selected per architecture at build
/// time and never mixed within one section.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ElfRela {
    /// Offset of the patch target within the affected section.
    pub r_offset: usize,
    /// Packed symbol index and relocation type.
    pub r_info: usize,
    /// Explicit addend, zero for the implicit-addend flavor.
    pub r_addend: isize,
}

impl ElfRela {
    /// Decodes an implicit-addend record from `buf` ([`REL_SIZE`] bytes).
    pub fn parse_rel(buf: &[u8]) -> Self {
        ElfRela {
            r_offset: word_at(buf, 0),
            r_info: word_at(buf, size_of::<usize>()),
            r_addend: 0,
        }
    }

    /// Decodes an explicit-addend record from `buf` ([`RELA_SIZE`] bytes).
    pub fn parse_rela(buf: &[u8]) -> Self {
        ElfRela {
            r_offset: word_at(buf, 0),
            r_info: word_at(buf, size_of::<usize>()),
            r_addend: sword_at(buf, 2 * size_of::<usize>()),
        }
    }

    /// The symbol-table index of the referenced symbol, zero for
    /// relocation types that need no symbol.
    #[inline]
    pub fn r_sym(&self) -> usize {
        self.r_info >> R_SYM_SHIFT
    }

    /// The architecture-specific relocation type code.
    #[inline]
    pub fn r_type(&self) -> u32 {
        (self.r_info & R_TYPE_MASK) as u32
    }
}
