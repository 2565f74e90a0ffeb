//! Block-level size arithmetic and the per-allocation header.
//!
//! Grounded in `examples/original_source/src/allocator.h` (`struct allocation`,
//! `AllocatorBlock`) and the pointer-prefix idiom used by
//! `examples/ryancinsight-halo/src/alloc/segregated/slab.rs` (`SegregatedSlab::from_ptr`).

use core::mem;
use core::ptr::NonNull;

/// The fixed unit of space accounting.
pub(crate) type Block = u64;

/// Size in bytes of one [`Block`].
pub(crate) const BLOCK_SIZE: usize = mem::size_of::<Block>();

/// Sentinel `freelist_id` marking a header allocated directly from the system heap.
pub(crate) const DEFAULT_SENTINEL: u32 = 0xFFFF_FFFF;

/// Per-allocation metadata stored immediately before the payload.
#[repr(C)]
pub(crate) struct AllocationHeader {
    /// Payload blocks owned by this allocation (header not included).
    pub(crate) block_count: u32,
    /// Zero if live; otherwise `index + 1` into the owning free list/tracking array.
    pub(crate) freelist_id: u32,
}

const _: () = assert!(mem::size_of::<AllocationHeader>() % BLOCK_SIZE == 0);

/// Blocks occupied by a header; always a whole multiple of [`BLOCK_SIZE`].
pub(crate) const HEADER_BLOCKS: usize = mem::size_of::<AllocationHeader>() / BLOCK_SIZE;

/// Minimum blocks-including-header needed for a region to host any allocation at all.
pub(crate) const MIN_BLOCKS_FOR_ALLOCATION: usize = HEADER_BLOCKS + 1;

/// Rounds a byte size up to a whole number of blocks.
pub(crate) const fn blocks_for(size: usize) -> usize {
    (size + BLOCK_SIZE - 1) / BLOCK_SIZE
}

impl AllocationHeader {
    /// The header that would sit immediately after this allocation's payload.
    ///
    /// # Safety
    /// `this` must point at a valid, initialised header whose `block_count`
    /// accurately describes the owned payload, and the resulting address must
    /// remain within the bounds of the page/allocation that owns `this`.
    pub(crate) unsafe fn next(this: NonNull<AllocationHeader>) -> NonNull<AllocationHeader> {
        let block_count = this.as_ref().block_count as usize;
        let base = this.as_ptr().cast::<Block>();
        NonNull::new_unchecked(base.add(HEADER_BLOCKS + block_count).cast())
    }

    /// The payload pointer handed out to callers for this header.
    ///
    /// # Safety
    /// `this` must point at a valid header.
    pub(crate) unsafe fn payload(this: NonNull<AllocationHeader>) -> NonNull<u8> {
        NonNull::new_unchecked(this.as_ptr().add(1).cast())
    }

    /// Recovers the header from an application-visible payload pointer.
    ///
    /// # Safety
    /// `ptr` must have been produced by [`AllocationHeader::payload`] on a
    /// still-live header.
    pub(crate) unsafe fn from_payload(ptr: NonNull<u8>) -> NonNull<AllocationHeader> {
        NonNull::new_unchecked(ptr.as_ptr().cast::<AllocationHeader>().sub(1))
    }

    /// Number of payload bytes currently owned by this header.
    ///
    /// # Safety
    /// `this` must point at a valid header.
    pub(crate) unsafe fn payload_len_bytes(this: NonNull<AllocationHeader>) -> usize {
        this.as_ref().block_count as usize * BLOCK_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_exactly_one_block() {
        assert_eq!(mem::size_of::<AllocationHeader>(), BLOCK_SIZE);
        assert_eq!(HEADER_BLOCKS, 1);
    }

    #[test]
    fn blocks_for_rounds_up() {
        assert_eq!(blocks_for(0), 0);
        assert_eq!(blocks_for(1), 1);
        assert_eq!(blocks_for(8), 1);
        assert_eq!(blocks_for(9), 2);
        assert_eq!(blocks_for(64), 8);
    }
}
