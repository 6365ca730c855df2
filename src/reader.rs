//! Extension binary access traits.
//!
//! The linker never owns the extension image: the host hands it a reader
//! over the binary's bytes, whatever their actual backing (a flash
//! partition, a network buffer, a memory-mapped file). [`ExtReader`]
//! abstracts that source behind seek-then-read of arbitrary spans.

use crate::{Result, error::io_error};
use alloc::{
    format,
    string::{String, ToString},
};

/// Whether the backing storage of an extension binary may be patched in
/// place.
///
/// The jump-table relocation path writes patched words straight into the
/// loaded image, which is only valid when the bytes the reader exposes are
/// the bytes that will execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// The image is a writable buffer and doubles as the final location.
    Writable,
    /// The image cannot be modified; callers must pre-copy before a
    /// jump-table link pass.
    ReadOnly,
}

/// A trait for reading extension binaries from various sources.
pub trait ExtReader {
    /// Reads a chunk of data from the binary into the provided buffer.
    ///
    /// # Arguments
    /// * `buf` - The destination buffer. Its length determines the number
    ///   of bytes read.
    /// * `offset` - The starting byte offset within the binary.
    fn read(&mut self, buf: &mut [u8], offset: usize) -> Result<()>;

    /// Whether the backing storage may be patched in place.
    fn storage(&self) -> Storage {
        Storage::ReadOnly
    }

    /// Returns the runtime address of the byte at `offset` when the
    /// storage is directly addressable, `None` otherwise.
    ///
    /// Used to synchronize caches over sections that stay in the source
    /// buffer instead of being copied into a memory region.
    fn peek(&self, offset: usize) -> Option<usize> {
        let _ = offset;
        None
    }
}

/// An extension binary backed by an in-memory byte slice.
#[derive(Debug)]
pub struct ExtBinary<'bytes> {
    /// The name assigned to this binary, used in diagnostics.
    name: String,
    /// The raw image bytes.
    bytes: &'bytes [u8],
    /// Whether the buffer is the final, patchable location.
    storage: Storage,
}

impl<'bytes> ExtBinary<'bytes> {
    /// Creates a new memory-based extension binary.
    ///
    /// # Arguments
    /// * `name` - An identifier for the binary, typically the original
    ///   file name. Used for error reporting.
    /// * `bytes` - The complete image.
    /// * `storage` - Whether `bytes` is the final, patchable location of
    ///   the extension.
    pub fn new(name: &str, bytes: &'bytes [u8], storage: Storage) -> Self {
        Self {
            name: name.to_string(),
            bytes,
            storage,
        }
    }
}

impl<'bytes> ExtReader for ExtBinary<'bytes> {
    fn read(&mut self, buf: &mut [u8], offset: usize) -> Result<()> {
        let end = offset
            .checked_add(buf.len())
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                io_error(format!(
                    "read of {} bytes at {:#x} is outside `{}` ({} bytes)",
                    buf.len(),
                    offset,
                    self.name,
                    self.bytes.len()
                ))
            })?;
        buf.copy_from_slice(&self.bytes[offset..end]);
        Ok(())
    }

    fn storage(&self) -> Storage {
        self.storage
    }

    fn peek(&self, offset: usize) -> Option<usize> {
        if offset < self.bytes.len() {
            Some(self.bytes.as_ptr() as usize + offset)
        } else {
            None
        }
    }
}
