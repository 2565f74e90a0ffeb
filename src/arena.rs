//! A same-size-page arena that grows by appending new [`ArenaPage`]s on demand.
//!
//! Grounded in `examples/original_source/src/allocator.c` (`arena_malloc`,
//! `arena_realloc`); page growth aborts on system-heap exhaustion exactly as
//! the original's `ALLOCATOR_ABORT` in `arena_malloc` does.

use core::ptr::NonNull;

use crate::error::ConfigError;
use crate::header::{AllocationHeader, HEADER_BLOCKS};
use crate::page::ArenaPage;

/// An ordered collection of equal-sized pages, grown lazily.
pub(crate) struct Arena {
    page_size: usize,
    pages: Vec<ArenaPage>,
}

impl Arena {
    pub(crate) fn new(page_size: usize) -> Result<Self, ConfigError> {
        // Validate eagerly so misconfiguration surfaces at construction, not
        // on the first allocation.
        ArenaPage::validate_capacity(page_size)?;
        Ok(Self { page_size, pages: Vec::new() })
    }

    pub(crate) fn contains_allocation(&self, header: NonNull<AllocationHeader>) -> bool {
        self.pages.iter().any(|page| page.contains_allocation(header))
    }

    pub(crate) fn malloc(&mut self, size: usize) -> Option<NonNull<AllocationHeader>> {
        if size + HEADER_BLOCKS * crate::header::BLOCK_SIZE > self.page_size {
            return None;
        }

        for page in self.pages.iter_mut() {
            if let Some(header) = page.make_allocation(size) {
                return Some(header);
            }
        }

        let mut page = ArenaPage::new_owned_or_abort(self.page_size);
        let result = page.make_allocation(size);
        self.pages.push(page);
        result
    }

    pub(crate) fn free(&mut self, header: NonNull<AllocationHeader>) {
        let owner = self
            .pages
            .iter_mut()
            .find(|page| page.contains_allocation(header))
            .expect("caller already verified this arena owns the allocation");
        owner.free_allocation(header);
    }

    pub(crate) fn realloc(&mut self, header: NonNull<AllocationHeader>, size: usize) -> Option<NonNull<AllocationHeader>> {
        if size > self.page_size {
            return None;
        }

        let owner = self.pages.iter_mut().find(|page| page.contains_allocation(header))?;
        if owner.try_reallocate_in_place(header, size) {
            return Some(header);
        }

        let new_header = self.malloc(size)?;
        unsafe {
            let old_len = AllocationHeader::payload_len_bytes(header);
            let new_len = AllocationHeader::payload_len_bytes(new_header);
            let copy_len = old_len.min(new_len);
            core::ptr::copy_nonoverlapping(
                AllocationHeader::payload(header).as_ptr(),
                AllocationHeader::payload(new_header).as_ptr(),
                copy_len,
            );
        }

        let owner = self
            .pages
            .iter_mut()
            .find(|page| page.contains_allocation(header))
            .expect("owning page cannot vanish between lookups");
        owner.free_allocation(header);
        Some(new_header)
    }
}
