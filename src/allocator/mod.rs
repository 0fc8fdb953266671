//! Unmanaged memory - the blocks native code sees as object storage
//!
//! Design: A small `Allocator` trait at the seam so the object model can be
//! driven by the system heap in production and by a capped heap in tests:
//! 1. `alloc` / `realloc` / `free` with C semantics (realloc may relocate)
//! 2. Exhaustion reported as `Error::Allocation`, never as a NULL address
//! 3. A failed `realloc` leaves the original block untouched; callers that
//!    promise to consume it (string resize) free it themselves

mod heap;

#[cfg(test)]
mod tests;

pub use heap::HeapAllocator;

use crate::abi::Address;
use crate::error::Result;

/// Every block is aligned for the widest ABI field
pub const BLOCK_ALIGN: usize = 16;

pub trait Allocator: Send + Sync {
    /// Allocate `size` bytes (contents unspecified)
    fn alloc(&self, size: usize) -> Result<Address>;

    /// Grow or shrink a block, possibly moving it; contents up to the smaller
    /// size are preserved
    fn realloc(&self, addr: Address, size: usize) -> Result<Address>;

    /// Release a block; NULL is ignored
    fn free(&self, addr: Address) -> Result<()>;

    /// Allocate and zero `size` bytes
    fn alloc_zeroed(&self, size: usize) -> Result<Address> {
        let addr = self.alloc(size)?;
        // SAFETY: `alloc` returned a block of at least `size` bytes
        unsafe { std::ptr::write_bytes(addr.as_ptr::<u8>(), 0, size) };
        Ok(addr)
    }

    fn stats(&self) -> AllocatorStats;
}

/// Allocator statistics for monitoring and leak checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    pub live_blocks: usize,
    pub bytes_in_use: usize,
    pub total_allocations: usize,
}
