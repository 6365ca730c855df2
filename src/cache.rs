//! Cache-maintenance capability.
//!
//! After relocations are written, data-cache lines covering the patched
//! regions must reach main memory and stale instruction-cache lines must be
//! discarded before the extension runs. The primitives for that are
//! host-specific, so the linker only drives this trait.

/// Cache-maintenance operations over address ranges.
pub trait CacheOps {
    /// Flushes data-cache lines covering `[addr, addr + len)` to memory.
    fn data_flush_range(&mut self, addr: usize, len: usize);

    /// Invalidates instruction-cache lines covering `[addr, addr + len)`.
    fn instr_invalidate_range(&mut self, addr: usize, len: usize);
}

/// A no-op implementation for hosts with coherent memory or no cache
/// maintenance requirements.
pub struct NullCache;

impl CacheOps for NullCache {
    fn data_flush_range(&mut self, _addr: usize, _len: usize) {}

    fn instr_invalidate_range(&mut self, _addr: usize, _len: usize) {}
}
