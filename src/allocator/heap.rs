//! System-heap allocator with block tracking and an optional byte cap

use super::{Allocator, AllocatorStats, BLOCK_ALIGN};
use crate::abi::Address;
use crate::error::{Error, Result};
use crate::logging::{log_allocation, log_deallocation};
use dashmap::DashMap;
use std::alloc::{self, Layout};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Heap allocator that remembers every live block
///
/// Block sizes are needed to rebuild the `Layout` on free/realloc, and the
/// table doubles as the leak report. Outstanding blocks are released on drop.
pub struct HeapAllocator {
    blocks: DashMap<usize, usize>,
    bytes_in_use: AtomicUsize,
    total_allocations: AtomicUsize,
    limit: Option<usize>,
}

impl HeapAllocator {
    pub fn new() -> Self {
        Self {
            blocks: DashMap::with_capacity(256),
            bytes_in_use: AtomicUsize::new(0),
            total_allocations: AtomicUsize::new(0),
            limit: None,
        }
    }

    /// Allocator that fails once `limit` bytes are in use
    pub fn with_limit(limit: usize) -> Self {
        let mut allocator = Self::new();
        allocator.limit = Some(limit);
        allocator
    }

    /// Size of a live block
    pub fn block_size(&self, addr: Address) -> Option<usize> {
        self.blocks.get(&addr.raw()).map(|entry| *entry.value())
    }

    fn layout(size: usize) -> Result<Layout> {
        Layout::from_size_align(size.max(1), BLOCK_ALIGN).map_err(|_| Error::Allocation { size })
    }

    /// Reserve `extra` bytes against the cap
    fn reserve(&self, extra: usize) -> Result<()> {
        let Some(limit) = self.limit else {
            self.bytes_in_use.fetch_add(extra, Ordering::Relaxed);
            return Ok(());
        };

        self.bytes_in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(extra).filter(|total| *total <= limit)
            })
            .map(|_| ())
            .map_err(|_| Error::Allocation { size: extra })
    }

    fn unreserve(&self, bytes: usize) {
        self.bytes_in_use.fetch_sub(bytes, Ordering::Relaxed);
    }
}

impl Default for HeapAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator for HeapAllocator {
    fn alloc(&self, size: usize) -> Result<Address> {
        let layout = Self::layout(size)?;
        self.reserve(size)?;

        // SAFETY: layout has non-zero size
        let ptr = unsafe { alloc::alloc(layout) };
        if ptr.is_null() {
            self.unreserve(size);
            return Err(Error::Allocation { size });
        }

        self.blocks.insert(ptr as usize, size);
        self.total_allocations.fetch_add(1, Ordering::Relaxed);
        log_allocation(size, ptr);
        Ok(Address::from_ptr(ptr))
    }

    fn realloc(&self, addr: Address, size: usize) -> Result<Address> {
        if addr.is_null() {
            return self.alloc(size);
        }

        let old_size = self
            .block_size(addr)
            .ok_or_else(|| Error::lookup(format_args!("realloc of unknown block {}", addr)))?;
        let old_layout = Self::layout(old_size)?;
        Self::layout(size)?;

        if size > old_size {
            self.reserve(size - old_size)?;
        }

        // SAFETY: `addr` was allocated by us with `old_layout`
        let ptr = unsafe { alloc::realloc(addr.as_ptr(), old_layout, size.max(1)) };
        if ptr.is_null() {
            if size > old_size {
                self.unreserve(size - old_size);
            }
            return Err(Error::Allocation { size });
        }
        if size < old_size {
            self.unreserve(old_size - size);
        }

        self.blocks.remove(&addr.raw());
        self.blocks.insert(ptr as usize, size);
        tracing::trace!(target: "allocator", from = %addr, to = ?ptr, old_size, size, "block resized");
        Ok(Address::from_ptr(ptr))
    }

    fn free(&self, addr: Address) -> Result<()> {
        if addr.is_null() {
            return Ok(());
        }

        let (_, size) = self
            .blocks
            .remove(&addr.raw())
            .ok_or_else(|| Error::lookup(format_args!("free of unknown block {}", addr)))?;

        // SAFETY: the block was allocated by us with this layout
        unsafe { alloc::dealloc(addr.as_ptr(), Self::layout(size)?) };
        self.unreserve(size);
        log_deallocation(size, addr.as_ptr());
        Ok(())
    }

    fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            live_blocks: self.blocks.len(),
            bytes_in_use: self.bytes_in_use.load(Ordering::Relaxed),
            total_allocations: self.total_allocations.load(Ordering::Relaxed),
        }
    }
}

impl Drop for HeapAllocator {
    fn drop(&mut self) {
        let leaked = self.blocks.len();
        if leaked > 0 {
            tracing::debug!(target: "allocator", blocks = leaked, "releasing outstanding blocks");
        }
        for entry in self.blocks.iter() {
            if let Ok(layout) = Self::layout(*entry.value()) {
                // SAFETY: every tracked block came from `alloc::alloc`/`realloc` with this layout
                unsafe { alloc::dealloc(*entry.key() as *mut u8, layout) };
            }
        }
        self.blocks.clear();
    }
}
