#![allow(dead_code)]

use extlink::{
    ExtBinary, ExtLoader, Extension, LoadParam, MemKind, Registry, Result, Storage, abi,
    arch::{ArchRelocator, LinkMode},
    cache::CacheOps,
    elf::{ElfRela, ElfShdr, ElfSym, REL_SIZE, RELA_SIZE, SYM_SIZE},
    reader::ExtReader,
};

pub fn init_log() {
    let _ = env_logger::Builder::from_default_env()
        .is_test(true)
        .try_init();
}

pub fn st_info(bind: u8, typ: u8) -> u8 {
    (bind << 4) | (typ & 0xf)
}

#[cfg(target_pointer_width = "64")]
pub fn r_info(sym: usize, typ: u32) -> usize {
    (sym << 32) | typ as usize
}

#[cfg(target_pointer_width = "32")]
pub fn r_info(sym: usize, typ: u32) -> usize {
    (sym << 8) | typ as usize
}

/// A relocation type code the recording back ends carry through untouched.
pub const RT_WORD: u32 = 7;

/// A progbits section header with the given flags and size.
pub fn progbits(sh_flags: usize, sh_size: usize) -> ElfShdr {
    ElfShdr {
        sh_type: abi::SHT_PROGBITS,
        sh_flags,
        sh_size,
        ..Default::default()
    }
}

pub fn encode_sym(sym: &ElfSym) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SYM_SIZE);
    #[cfg(target_pointer_width = "64")]
    {
        buf.extend_from_slice(&sym.st_name.to_le_bytes());
        buf.push(sym.st_info);
        buf.push(sym.st_other);
        buf.extend_from_slice(&sym.st_shndx.to_le_bytes());
        buf.extend_from_slice(&(sym.st_value as u64).to_le_bytes());
        buf.extend_from_slice(&(sym.st_size as u64).to_le_bytes());
    }
    #[cfg(target_pointer_width = "32")]
    {
        buf.extend_from_slice(&sym.st_name.to_le_bytes());
        buf.extend_from_slice(&(sym.st_value as u32).to_le_bytes());
        buf.extend_from_slice(&(sym.st_size as u32).to_le_bytes());
        buf.push(sym.st_info);
        buf.push(sym.st_other);
        buf.extend_from_slice(&sym.st_shndx.to_le_bytes());
    }
    buf
}

pub fn encode_rela(rela: &ElfRela, explicit_addend: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RELA_SIZE);
    buf.extend_from_slice(&rela.r_offset.to_le_bytes());
    buf.extend_from_slice(&rela.r_info.to_le_bytes());
    if explicit_addend {
        buf.extend_from_slice(&rela.r_addend.to_le_bytes());
    }
    buf
}

/// Builds a synthetic extension image: a symbol table, string tables and
/// any number of relocation tables, laid out in one flat byte buffer.
pub struct ImageBuilder {
    strtab: Vec<u8>,
    shstrtab: Vec<u8>,
    syms: Vec<u8>,
    sym_cnt: usize,
    rel_tables: Vec<(Vec<u8>, u32, usize)>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        // Index 0 of both the string table and the symbol table is the
        // null entry.
        Self {
            strtab: vec![0],
            shstrtab: vec![0],
            syms: encode_sym(&ElfSym::default()),
            sym_cnt: 1,
            rel_tables: Vec::new(),
        }
    }

    fn add_to_tab(tab: &mut Vec<u8>, s: &str) -> u32 {
        let off = tab.len() as u32;
        tab.extend_from_slice(s.as_bytes());
        tab.push(0);
        off
    }

    pub fn add_secname(&mut self, name: &str) -> u32 {
        Self::add_to_tab(&mut self.shstrtab, name)
    }

    pub fn add_sym(&mut self, name: &str, value: usize, shndx: u16, info: u8) -> usize {
        let st_name = if name.is_empty() {
            0
        } else {
            Self::add_to_tab(&mut self.strtab, name)
        };
        let sym = ElfSym {
            st_name,
            st_value: value,
            st_size: 0,
            st_info: info,
            st_other: 0,
            st_shndx: shndx,
        };
        self.syms.extend_from_slice(&encode_sym(&sym));
        let idx = self.sym_cnt;
        self.sym_cnt += 1;
        idx
    }

    pub fn add_rela_table(&mut self, entries: &[ElfRela]) -> usize {
        let mut bytes = Vec::new();
        for entry in entries {
            bytes.extend_from_slice(&encode_rela(entry, true));
        }
        self.rel_tables.push((bytes, abi::SHT_RELA, RELA_SIZE));
        self.rel_tables.len() - 1
    }

    pub fn add_rel_table(&mut self, entries: &[ElfRela]) -> usize {
        let mut bytes = Vec::new();
        for entry in entries {
            bytes.extend_from_slice(&encode_rela(entry, false));
        }
        self.rel_tables.push((bytes, abi::SHT_REL, REL_SIZE));
        self.rel_tables.len() - 1
    }

    pub fn build(self) -> BuiltImage {
        let mut bytes = vec![0u8; 0x40];

        let mut place = |contents: &[u8]| -> usize {
            let off = bytes.len();
            bytes.extend_from_slice(contents);
            off
        };

        let symtab_off = place(&self.syms);
        let strtab_off = place(&self.strtab);
        let shstrtab_off = place(&self.shstrtab);
        let rel_shdrs = self
            .rel_tables
            .iter()
            .map(|(contents, sh_type, entsize)| ElfShdr {
                sh_type: *sh_type,
                sh_offset: place(contents),
                sh_size: contents.len(),
                sh_entsize: *entsize,
                ..Default::default()
            })
            .collect();

        BuiltImage {
            symtab: ElfShdr {
                sh_type: abi::SHT_SYMTAB,
                sh_offset: symtab_off,
                sh_size: self.syms.len(),
                sh_entsize: SYM_SIZE,
                ..Default::default()
            },
            strtab: ElfShdr {
                sh_type: abi::SHT_STRTAB,
                sh_offset: strtab_off,
                sh_size: self.strtab.len(),
                ..Default::default()
            },
            shstrtab: ElfShdr {
                sh_type: abi::SHT_STRTAB,
                sh_offset: shstrtab_off,
                sh_size: self.shstrtab.len(),
                ..Default::default()
            },
            rel_shdrs,
            bytes,
        }
    }
}

pub struct BuiltImage {
    pub bytes: Vec<u8>,
    pub symtab: ElfShdr,
    pub strtab: ElfShdr,
    pub shstrtab: ElfShdr,
    /// One header per added relocation table, in order; `sh_info`,
    /// `sh_link` and `sh_name` are the caller's to fill in.
    pub rel_shdrs: Vec<ElfShdr>,
}

impl BuiltImage {
    pub fn loader(&self, shnum: usize, storage: Storage) -> ExtLoader<ExtBinary<'_>> {
        let mut ldr = ExtLoader::new(ExtBinary::new("fixture.elf", &self.bytes, storage), shnum);
        ldr.set_region_shdr(MemKind::Symtab, self.symtab);
        ldr.set_region_shdr(MemKind::Strtab, self.strtab);
        ldr.set_region_shdr(MemKind::Shstrtab, self.shstrtab);
        ldr
    }
}

/// One observed relocation dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recorded {
    pub r_type: u32,
    pub r_offset: usize,
    pub r_addend: isize,
    pub link_addr: usize,
    pub loc: usize,
}

/// A direct-mode back end that resolves symbols like a real one but
/// records its inputs instead of writing memory.
#[derive(Default)]
pub struct RecordingArch {
    pub records: Vec<Recorded>,
}

impl ArchRelocator for RecordingArch {
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
        let link_addr = extlink::lookup_symbol(ldr, ext, registry, rela, &sym, &name, shdr)?;
        let loc = ldr
            .loaded_sect_addr(ext, shdr.sh_info as usize)
            .unwrap_or(0)
            + rela.r_offset;
        self.records.push(Recorded {
            r_type: rela.r_type(),
            r_offset: rela.r_offset,
            r_addend: rela.r_addend,
            link_addr,
            loc,
        });
        Ok(())
    }
}

/// A jump-table-mode back end recording the precomputed patch addresses
/// it is handed.
#[derive(Default)]
pub struct JumpTableArch {
    /// (rel_addr, link_addr, symbol index) per global dispatch.
    pub globals: Vec<(usize, usize, usize)>,
    /// (rel_addr, symbol index) per local dispatch.
    pub locals: Vec<(usize, usize)>,
}

impl ArchRelocator for JumpTableArch {
    const MODE: LinkMode = LinkMode::JumpTable;

    fn relocate_local<R: ExtReader>(
        &mut self,
        _ldr: &mut ExtLoader<R>,
        _ext: &Extension,
        rela: &ElfRela,
        _sym: &ElfSym,
        rel_addr: usize,
        _parm: &LoadParam<'_>,
    ) -> Result<()> {
        self.locals.push((rel_addr, rela.r_sym()));
        Ok(())
    }

    fn relocate_global<R: ExtReader>(
        &mut self,
        _ldr: &mut ExtLoader<R>,
        _ext: &Extension,
        rela: &ElfRela,
        _sym: &ElfSym,
        rel_addr: usize,
        link_addr: usize,
    ) -> Result<()> {
        self.globals.push((rel_addr, link_addr, rela.r_sym()));
        Ok(())
    }
}

/// A cache capability that records the ranges it is asked to maintain.
#[derive(Default)]
pub struct RecordingCache {
    pub flushes: Vec<(usize, usize)>,
    pub invalidations: Vec<(usize, usize)>,
}

impl CacheOps for RecordingCache {
    fn data_flush_range(&mut self, addr: usize, len: usize) {
        self.flushes.push((addr, len));
    }

    fn instr_invalidate_range(&mut self, addr: usize, len: usize) {
        self.invalidations.push((addr, len));
    }
}
