//! Growable, back-referenced array of live allocation headers.
//!
//! Grounded in `examples/original_source/src/allocator.c`
//! (`allocation_array_append` / `allocation_array_remove` /
//! `allocation_array_contains`), reworked around `Vec<T>` the way
//! `examples/ryancinsight-halo/src/alloc/segregated/manager.rs`
//! (`ThreadLocalCache`) wraps a `Vec` as a push/pop/shrink buffer.
//! `swap_remove` reproduces the original's "move the last entry into the
//! removed slot" bookkeeping and fixes up the displaced entry's back-reference.

use core::ptr::NonNull;

use crate::header::AllocationHeader;

/// Tracks every header whose `freelist_id` is non-zero: an `index + 1`
/// back-reference into this array.
#[derive(Default)]
pub(crate) struct AllocationArray {
    entries: Vec<NonNull<AllocationHeader>>,
}

impl AllocationArray {
    pub(crate) fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get(&self, index: usize) -> NonNull<AllocationHeader> {
        self.entries[index]
    }

    pub(crate) fn set(&mut self, index: usize, header: NonNull<AllocationHeader>) {
        self.entries[index] = header;
    }

    /// True if `header`'s `freelist_id` still back-references a matching slot.
    pub(crate) fn contains(&self, header: NonNull<AllocationHeader>) -> bool {
        let id = unsafe { header.as_ref().freelist_id };
        if id == 0 {
            return false;
        }
        let index = id as usize - 1;
        index < self.entries.len() && self.entries[index] == header
    }

    /// Appends `header`, stamping its `freelist_id` with the new slot.
    ///
    /// Aborts the process if the backing `Vec` cannot grow, via Rust's
    /// global allocation-error handler.
    pub(crate) fn append(&mut self, mut header: NonNull<AllocationHeader>) {
        self.entries.push(header);
        unsafe {
            header.as_mut().freelist_id = self.entries.len() as u32;
        }
    }

    /// Removes `header`. `header` must currently be a member (see [`Self::contains`]).
    pub(crate) fn remove(&mut self, mut header: NonNull<AllocationHeader>) {
        debug_assert!(self.contains(header));
        let index = unsafe { header.as_ref().freelist_id } as usize - 1;
        self.entries.swap_remove(index);
        if let Some(moved) = self.entries.get(index).copied() {
            unsafe {
                (*moved.as_ptr()).freelist_id = (index + 1) as u32;
            }
        }
        unsafe {
            header.as_mut().freelist_id = 0;
        }
        self.shrink_if_sparse();
    }

    /// Mirrors the original's capacity-shrink heuristic (shrink once a
    /// quarter full) without its `sizeof`-the-pointer bug: `Vec::shrink_to`
    /// always sizes by `size_of::<NonNull<AllocationHeader>>`, not by the
    /// size of a pointer-to-the-array.
    fn shrink_if_sparse(&mut self) {
        if self.entries.len() * 4 <= self.entries.capacity() {
            self.entries.shrink_to(self.entries.len() * 2 + 1);
        }
    }
}
