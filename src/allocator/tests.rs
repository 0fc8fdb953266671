//! Allocator tests - block tracking, resizing and exhaustion

use super::*;
use crate::error::Error;

#[test]
fn allocator_creation_starts_empty() {
    let allocator = HeapAllocator::new();
    assert_eq!(allocator.stats(), AllocatorStats::default());
}

#[test]
fn alloc_returns_aligned_distinct_blocks() {
    let allocator = HeapAllocator::new();
    let a = allocator.alloc(24).expect("first alloc");
    let b = allocator.alloc(24).expect("second alloc");

    assert_ne!(a, b);
    assert_eq!(a.raw() % BLOCK_ALIGN, 0);
    assert_eq!(b.raw() % BLOCK_ALIGN, 0);

    let stats = allocator.stats();
    assert_eq!(stats.live_blocks, 2);
    assert_eq!(stats.bytes_in_use, 48);
    assert_eq!(stats.total_allocations, 2);
}

#[test]
fn alloc_zeroed_clears_memory() {
    let allocator = HeapAllocator::new();
    let addr = allocator.alloc_zeroed(64).unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(addr.as_ptr::<u8>(), 64) };
    assert!(bytes.iter().all(|b| *b == 0));
}

#[test]
fn free_releases_block() {
    let allocator = HeapAllocator::new();
    let addr = allocator.alloc(32).unwrap();
    allocator.free(addr).unwrap();

    let stats = allocator.stats();
    assert_eq!(stats.live_blocks, 0);
    assert_eq!(stats.bytes_in_use, 0);
}

#[test]
fn free_null_is_noop() {
    let allocator = HeapAllocator::new();
    assert!(allocator.free(Address::NULL).is_ok());
}

#[test]
fn free_unknown_block_is_lookup_error() {
    let allocator = HeapAllocator::new();
    let err = allocator.free(Address::new(0xdead0)).unwrap_err();
    assert!(matches!(err, Error::Lookup(_)));
}

#[test]
fn realloc_preserves_prefix() {
    let allocator = HeapAllocator::new();
    let addr = allocator.alloc(8).unwrap();
    unsafe {
        for i in 0..8u8 {
            *addr.as_ptr::<u8>().add(i as usize) = i + 1;
        }
    }

    let grown = allocator.realloc(addr, 4096).unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(grown.as_ptr::<u8>(), 8) };
    assert_eq!(bytes, &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(allocator.block_size(grown), Some(4096));
    assert_eq!(allocator.stats().live_blocks, 1);
    assert_eq!(allocator.stats().bytes_in_use, 4096);
}

#[test]
fn realloc_null_allocates() {
    let allocator = HeapAllocator::new();
    let addr = allocator.realloc(Address::NULL, 16).unwrap();
    assert_eq!(allocator.block_size(addr), Some(16));
}

#[test]
fn limit_rejects_oversized_alloc() {
    let allocator = HeapAllocator::with_limit(100);
    allocator.alloc(60).unwrap();
    let err = allocator.alloc(60).unwrap_err();
    assert_eq!(err, Error::Allocation { size: 60 });
    assert_eq!(allocator.stats().bytes_in_use, 60);
}

#[test]
fn failed_grow_leaves_original_block() {
    let allocator = HeapAllocator::with_limit(64);
    let addr = allocator.alloc(32).unwrap();

    assert!(matches!(allocator.realloc(addr, 128), Err(Error::Allocation { .. })));
    assert_eq!(allocator.block_size(addr), Some(32));
    assert_eq!(allocator.stats().bytes_in_use, 32);

    allocator.free(addr).unwrap();
    assert_eq!(allocator.stats().bytes_in_use, 0);
}

#[test]
fn shrink_returns_bytes_to_budget() {
    let allocator = HeapAllocator::with_limit(64);
    let addr = allocator.alloc(64).unwrap();
    let shrunk = allocator.realloc(addr, 16).unwrap();
    assert_eq!(allocator.stats().bytes_in_use, 16);
    allocator.alloc(48).unwrap();
    allocator.free(shrunk).unwrap();
}
