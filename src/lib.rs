//! # extlink
//! A minimal run-time dynamic linker for loadable extensions.
//!
//! `extlink` takes a relocatable or partially linked ELF-style binary that
//! a host has already placed into fixed memory regions, resolves its
//! symbol references against the host's exported-symbol table, previously
//! loaded extensions and the extension's own table, and patches the code
//! and data in place so they execute at their final addresses. It is built
//! for resource-constrained hosts: no virtual-memory remapping, no
//! dynamic-loader infrastructure, fixed-capacity dependency tracking and
//! explicit cache maintenance over the patched ranges.
//!
//! The host supplies the collaborators the linker is parameterized over:
//! a byte-range [`reader`](crate::reader) for the binary, the
//! [`Registry`] of loaded extensions and exported symbols, an
//! architecture [back end](crate::arch) applied per relocation record,
//! and a [cache-maintenance](crate::cache) capability.
//!
//! ## Example
//! ```no_run
//! use extlink::{
//!     arch::DefaultRelocator, cache::NullCache, ExtBinary, Extension,
//!     ExtLoader, LoadParam, Registry, Storage,
//! };
//!
//! # let image = [0u8; 0];
//! # let shnum = 0;
//! let mut registry = Registry::new();
//! registry.export("host_api_call", host_api_call as usize);
//!
//! let reader = ExtBinary::new("ext.elf", &image, Storage::Writable);
//! let mut ldr = ExtLoader::new(reader, shnum);
//! let mut ext = Extension::new("ext");
//! // ... the host populates regions, section maps and headers ...
//!
//! extlink::link(
//!     &mut ldr,
//!     &mut ext,
//!     &registry,
//!     &mut DefaultRelocator,
//!     &mut NullCache,
//!     &LoadParam::default(),
//! )?;
//! # extern "C" fn host_api_call() {}
//! # Ok::<(), extlink::Error>(())
//! ```
#![no_std]
extern crate alloc;

pub mod arch;
pub mod cache;
pub mod elf;
mod error;
pub mod ext;
mod link;
pub mod loader;
mod macros;
pub mod reader;
pub mod registry;

pub use self::elf::abi;
pub use error::{Error, format_error, unsupported_error};
pub use ext::{DEPENDENCY_COUNT, Extension, MemKind};
pub use link::{LoadParam, link, lookup_symbol};
pub use loader::ExtLoader;
pub use reader::{ExtBinary, ExtReader, Storage};
pub use registry::{Registry, SymName};

/// Result type used throughout the `extlink` library.
pub type Result<T> = core::result::Result<T, Error>;
