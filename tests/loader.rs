//! Reader bounds, string reading and section-address plumbing.

mod common;

use common::*;
use extlink::{
    Error, ExtBinary, ExtLoader, Extension, ExtReader, MemKind, Storage,
    elf::{ElfRela, ElfShdr},
};

#[test]
fn reads_past_the_end_of_the_image_fail() {
    let bytes = [0u8; 16];
    let mut reader = ExtBinary::new("tiny.elf", &bytes, Storage::ReadOnly);
    let mut buf = [0u8; 8];

    reader.read(&mut buf, 8).unwrap();
    let res = reader.read(&mut buf, 9);
    assert!(matches!(res, Err(Error::Io { .. })), "{res:?}");
    // Offsets that wrap around the address space must not pass the check.
    let res = reader.read(&mut buf, usize::MAX);
    assert!(matches!(res, Err(Error::Io { .. })), "{res:?}");
}

#[test]
fn in_memory_images_are_peekable() {
    let bytes = [0u8; 16];
    let reader = ExtBinary::new("tiny.elf", &bytes, Storage::ReadOnly);
    let ldr = ExtLoader::new(reader, 0);
    assert_eq!(ldr.peek(4), Some(bytes.as_ptr() as usize + 4));
}

#[test]
fn symbol_and_section_names_read_from_their_string_tables() {
    let mut b = ImageBuilder::new();
    let name_off = b.add_secname(".rela.text");
    let s = b.add_sym("a_symbol", 0, 1, st_info(0, 0));
    let img = b.build();

    let mut ldr = img.loader(2, Storage::ReadOnly);
    let sym = ldr
        .read_symbol(&ElfRela {
            r_offset: 0,
            r_info: r_info(s, 0),
            r_addend: 0,
        })
        .unwrap();
    assert_eq!(ldr.symbol_name(&sym).unwrap(), "a_symbol");

    let shdr = ElfShdr {
        sh_name: name_off,
        ..Default::default()
    };
    assert_eq!(ldr.section_name(&shdr).unwrap(), ".rela.text");
}

#[test]
fn symbol_reads_never_index_past_the_table() {
    let b = ImageBuilder::new();
    let img = b.build();

    let mut ldr = img.loader(1, Storage::ReadOnly);
    assert_eq!(ldr.symtab_count(), 1);
    let res = ldr.read_symbol(&ElfRela {
        r_offset: 0,
        r_info: r_info(1, 0),
        r_addend: 0,
    });
    assert!(matches!(res, Err(Error::Format { .. })), "{res:?}");
}

#[test]
fn loaded_section_addresses_combine_region_base_and_offset() {
    let bytes = [0u8; 16];
    let reader = ExtBinary::new("tiny.elf", &bytes, Storage::ReadOnly);
    let mut ldr = ExtLoader::new(reader, 3);
    ldr.map_section(1, MemKind::Data, 0x40);

    let mut ext = Extension::new("ext");
    ext.set_region(MemKind::Data, 0x2000, 0x100);

    assert_eq!(ldr.loaded_sect_addr(&ext, 1), Some(0x2040));
    // Unmapped and out-of-range indices have no address.
    assert_eq!(ldr.loaded_sect_addr(&ext, 2), None);
    assert_eq!(ldr.loaded_sect_addr(&ext, 7), None);
}

#[test]
fn file_offsets_resolve_through_pinned_section_spans() {
    let bytes = [0u8; 16];
    let reader = ExtBinary::new("tiny.elf", &bytes, Storage::ReadOnly);
    let mut ldr = ExtLoader::new(reader, 1);
    ldr.set_region_shdr(
        MemKind::Text,
        ElfShdr {
            sh_addr: 0x400,
            sh_offset: 0x40,
            sh_size: 0x100,
            ..Default::default()
        },
    );

    assert_eq!(ldr.file_offset(0x410).unwrap(), 0x50);
    let res = ldr.file_offset(0x1000);
    assert!(matches!(res, Err(Error::Format { .. })), "{res:?}");
}
