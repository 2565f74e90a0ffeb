//! A single contiguous region of [`Block`]s, bump-allocated from the front
//! with a [`PageFreeList`] recycling blocks freed before the frontier.
//!
//! Grounded in `examples/original_source/src/allocator.c`
//! (`arena_page_create_from_memory`, `arena_page_make_allocation`,
//! `arena_page_try_reallocating_in_place`, `arena_page_free_allocation`). The
//! owned/caller-supplied memory distinction mirrors the `owns_memory` flag on
//! `struct arena_page`.

use core::ptr::NonNull;
use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};

use crate::error::ConfigError;
use crate::freelist::PageFreeList;
use crate::header::{blocks_for, AllocationHeader, Block, BLOCK_SIZE, HEADER_BLOCKS, MIN_BLOCKS_FOR_ALLOCATION};

/// A bump-allocated region of memory with a recycling free list.
pub(crate) struct ArenaPage {
    memory: NonNull<Block>,
    head: NonNull<Block>,
    end: NonNull<Block>,
    freelist: PageFreeList,
    owns_memory: bool,
    byte_len: usize,
}

fn layout_for(byte_len: usize) -> Layout {
    Layout::from_size_align(byte_len, BLOCK_SIZE).expect("page byte length overflows isize")
}

impl ArenaPage {
    fn minimum_bytes() -> usize {
        MIN_BLOCKS_FOR_ALLOCATION * BLOCK_SIZE
    }

    /// Checks that `byte_len` could back a page, without allocating anything.
    pub(crate) fn validate_capacity(byte_len: usize) -> Result<(), ConfigError> {
        if byte_len < Self::minimum_bytes() {
            return Err(ConfigError::PageTooSmall {
                capacity_bytes: byte_len,
                minimum_bytes: Self::minimum_bytes(),
            });
        }
        Ok(())
    }

    fn from_raw(memory: NonNull<u8>, byte_len: usize, owns_memory: bool) -> Result<Self, ConfigError> {
        if byte_len < Self::minimum_bytes() {
            return Err(ConfigError::PageTooSmall {
                capacity_bytes: byte_len,
                minimum_bytes: Self::minimum_bytes(),
            });
        }

        let total_blocks = byte_len / BLOCK_SIZE;
        let memory = memory.cast::<Block>();
        let end = unsafe { NonNull::new_unchecked(memory.as_ptr().add(total_blocks - HEADER_BLOCKS)) };

        // Sentinel header: zero block_count stops `ArenaPage::contains_allocation`
        // callers from ever treating the frontier itself as live.
        unsafe {
            end.cast::<AllocationHeader>().write(AllocationHeader { block_count: 0, freelist_id: 0 });
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(byte_len, owns_memory, "arena page created");

        Ok(Self {
            memory,
            head: memory,
            end,
            freelist: PageFreeList::new(),
            owns_memory,
            byte_len,
        })
    }

    /// Allocates `byte_len` bytes from the system heap to back a new page.
    pub(crate) fn new_owned(byte_len: usize) -> Result<Self, ConfigError> {
        Self::validate_capacity(byte_len)?;
        let layout = layout_for(byte_len);
        let raw = unsafe { alloc(layout) };
        let memory = match NonNull::new(raw) {
            Some(p) => p,
            None => handle_alloc_error(layout),
        };
        Self::from_raw(memory, byte_len, true)
    }

    /// Allocates `byte_len` bytes, aborting the process on system-heap
    /// exhaustion. Used when growing a multi-page arena, where the original
    /// treats page exhaustion as an unrecoverable error.
    pub(crate) fn new_owned_or_abort(byte_len: usize) -> Self {
        match Self::new_owned(byte_len) {
            Ok(page) => page,
            Err(_) => crate::error::abort_process("arena failed to allocate a new page"),
        }
    }

    /// Wraps caller-supplied memory without taking ownership of it.
    pub(crate) fn from_caller_memory(buffer: &'static mut [u8]) -> Result<Self, ConfigError> {
        let memory = NonNull::new(buffer.as_mut_ptr()).expect("non-empty slice");
        Self::from_raw(memory, buffer.len(), false)
    }

    pub(crate) fn contains_allocation(&self, header: NonNull<AllocationHeader>) -> bool {
        let p = header.as_ptr().cast::<Block>();
        p >= self.memory.as_ptr() && p < self.end.as_ptr()
    }

    fn try_advance_head(&mut self, blocks: usize) -> bool {
        let proposed = unsafe { self.head.as_ptr().add(blocks) };
        if proposed > self.end.as_ptr() {
            return false;
        }
        self.head = unsafe { NonNull::new_unchecked(proposed) };
        true
    }

    pub(crate) fn make_allocation(&mut self, size: usize) -> Option<NonNull<AllocationHeader>> {
        let required = blocks_for(size) + HEADER_BLOCKS;

        for i in 0..self.freelist.len() {
            let member = self.freelist.get(i);
            let granted = self.freelist.take_blocks_from(member, required);
            if granted == 0 {
                continue;
            }
            let mut header = member;
            unsafe {
                header.as_mut().freelist_id = 0;
                header.as_mut().block_count = (granted - HEADER_BLOCKS) as u32;
            }
            return Some(header);
        }

        let candidate = self.head.cast::<AllocationHeader>();
        if self.try_advance_head(required) {
            let mut header = candidate;
            unsafe {
                header.as_mut().block_count = (required - HEADER_BLOCKS) as u32;
                header.as_mut().freelist_id = 0;
            }
            return Some(header);
        }
        None
    }

    pub(crate) fn try_reallocate_in_place(&mut self, mut header: NonNull<AllocationHeader>, size: usize) -> bool {
        let required = blocks_for(size);
        let block_count = unsafe { header.as_ref().block_count as usize };

        if block_count >= required + MIN_BLOCKS_FOR_ALLOCATION {
            let remaining = block_count - required;
            let next = unsafe { AllocationHeader::next(header) };
            if next.as_ptr().cast::<Block>() == self.head.as_ptr() {
                self.head = unsafe { NonNull::new_unchecked(self.head.as_ptr().sub(remaining)) };
                unsafe {
                    header.as_mut().block_count = required as u32;
                }
                return true;
            }
            unsafe {
                header.as_mut().block_count = required as u32;
                let mut remainder = AllocationHeader::next(header);
                remainder.as_mut().block_count = (remaining - HEADER_BLOCKS) as u32;
                remainder.as_mut().freelist_id = 0;
                self.freelist.join(remainder);
            }
            return true;
        }

        if block_count < required {
            let additional = required - block_count;
            let next = unsafe { AllocationHeader::next(header) };
            if next.as_ptr().cast::<Block>() == self.head.as_ptr() {
                if !self.try_advance_head(additional) {
                    return false;
                }
                unsafe {
                    header.as_mut().block_count += additional as u32;
                }
                return true;
            }
            if self.freelist.contains(next) {
                let granted = self.freelist.take_blocks_from(next, additional);
                if granted == 0 {
                    return false;
                }
                unsafe {
                    header.as_mut().block_count += granted as u32;
                }
                return true;
            }
            return false;
        }

        true
    }

    pub(crate) fn free_allocation(&mut self, header: NonNull<AllocationHeader>) {
        let next = unsafe { AllocationHeader::next(header) };
        if next.as_ptr().cast::<Block>() == self.head.as_ptr() {
            let block_count = unsafe { header.as_ref().block_count as usize };
            self.head = unsafe { NonNull::new_unchecked(self.head.as_ptr().sub(HEADER_BLOCKS + block_count)) };
        } else {
            let mut header = header;
            unsafe {
                header.as_mut().freelist_id = 0;
            }
            self.freelist.join(header);
        }
    }
}

impl Drop for ArenaPage {
    fn drop(&mut self) {
        if self.owns_memory {
            unsafe {
                dealloc(self.memory.as_ptr().cast::<u8>(), layout_for(self.byte_len));
            }
        }
    }
}
