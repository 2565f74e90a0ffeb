//! The composable allocator façade: a tagged strategy plus an optional
//! fallback chain.
//!
//! Grounded in `examples/original_source/src/allocator.c`'s `struct
//! allocator` tagged union and its `allocator_malloc` / `allocator_realloc` /
//! `allocator_free` / `allocator_destroy` dispatch. The original threads a
//! bare `struct allocator*` (nullable, meaning "use the default") through
//! free functions; that shape survives here as `Option<&mut Allocator>` so a
//! missing allocator and the `Default` strategy share one code path.

use core::ptr::NonNull;
use std::alloc::{alloc, dealloc, realloc as sys_realloc, Layout};

use crate::array::AllocationArray;
use crate::arena::Arena;
use crate::error::{abort_process, ConfigError};
use crate::header::{blocks_for, AllocationHeader, BLOCK_SIZE, DEFAULT_SENTINEL, HEADER_BLOCKS};
use crate::page::ArenaPage;

enum AllocatorKind {
    /// The process-wide system-heap allocator. Carries no state.
    Default,
    /// Like `Default`, but every live allocation is recorded so ownership
    /// can be tested without relying on the sentinel `freelist_id`.
    TrackedDefault(AllocationArray),
    /// A single fixed-capacity page, caller-owned or allocator-owned.
    StaticPage(ArenaPage),
    /// A growable collection of equal-sized pages.
    MultiPageArena(Arena),
}

/// A block allocator: one strategy plus an optional fallback invoked when
/// the primary strategy cannot satisfy a request.
pub struct Allocator {
    kind: AllocatorKind,
    fallback: Option<Box<Allocator>>,
}

fn header_layout(header_blocks: usize) -> Layout {
    Layout::from_size_align(header_blocks * BLOCK_SIZE, BLOCK_SIZE).expect("allocation size overflows isize")
}

unsafe fn header_layout_of(header: NonNull<AllocationHeader>) -> Layout {
    let blocks = HEADER_BLOCKS + header.as_ref().block_count as usize;
    header_layout(blocks)
}

fn system_malloc(size: usize) -> Option<NonNull<AllocationHeader>> {
    let layout = header_layout(HEADER_BLOCKS + blocks_for(size));
    let raw = unsafe { alloc(layout) };
    let mut header = NonNull::new(raw.cast::<AllocationHeader>())?;
    unsafe {
        header.as_mut().block_count = blocks_for(size) as u32;
        header.as_mut().freelist_id = 0;
    }
    Some(header)
}

fn system_free(header: NonNull<AllocationHeader>) {
    let layout = unsafe { header_layout_of(header) };
    unsafe { dealloc(header.as_ptr().cast::<u8>(), layout) };
}

fn system_realloc(header: NonNull<AllocationHeader>, size: usize) -> Option<NonNull<AllocationHeader>> {
    let old_layout = unsafe { header_layout_of(header) };
    let new_blocks = HEADER_BLOCKS + blocks_for(size);
    let new_bytes = new_blocks * BLOCK_SIZE;
    let raw = unsafe { sys_realloc(header.as_ptr().cast::<u8>(), old_layout, new_bytes) };
    let mut header = NonNull::new(raw.cast::<AllocationHeader>())?;
    unsafe {
        header.as_mut().block_count = blocks_for(size) as u32;
    }
    Some(header)
}

fn default_malloc(size: usize) -> Option<NonNull<AllocationHeader>> {
    let mut header = system_malloc(size)?;
    unsafe {
        header.as_mut().freelist_id = DEFAULT_SENTINEL;
    }
    Some(header)
}

fn owns_default(header: NonNull<AllocationHeader>) -> bool {
    unsafe { header.as_ref().freelist_id == DEFAULT_SENTINEL }
}

fn dispatch_owns(kind: &AllocatorKind, header: NonNull<AllocationHeader>) -> bool {
    match kind {
        AllocatorKind::Default => owns_default(header),
        AllocatorKind::TrackedDefault(tracked) => tracked.contains(header),
        AllocatorKind::StaticPage(page) => page.contains_allocation(header),
        AllocatorKind::MultiPageArena(arena) => arena.contains_allocation(header),
    }
}

fn dispatch_malloc(kind: &mut AllocatorKind, size: usize) -> Option<NonNull<AllocationHeader>> {
    match kind {
        AllocatorKind::Default => default_malloc(size),
        AllocatorKind::TrackedDefault(tracked) => {
            let header = system_malloc(size)?;
            tracked.append(header);
            Some(header)
        }
        AllocatorKind::StaticPage(page) => page.make_allocation(size),
        AllocatorKind::MultiPageArena(arena) => arena.malloc(size),
    }
}

fn dispatch_free(kind: &mut AllocatorKind, header: NonNull<AllocationHeader>) {
    match kind {
        AllocatorKind::Default => system_free(header),
        AllocatorKind::TrackedDefault(tracked) => {
            tracked.remove(header);
            system_free(header);
        }
        AllocatorKind::StaticPage(page) => page.free_allocation(header),
        AllocatorKind::MultiPageArena(arena) => arena.free(header),
    }
}

fn dispatch_realloc(kind: &mut AllocatorKind, header: NonNull<AllocationHeader>, size: usize) -> Option<NonNull<AllocationHeader>> {
    match kind {
        AllocatorKind::Default => system_realloc(header, size).map(|mut h| {
            unsafe {
                h.as_mut().freelist_id = DEFAULT_SENTINEL;
            }
            h
        }),
        AllocatorKind::TrackedDefault(tracked) => {
            // Patch the tracking slot only after `system_realloc` succeeds: on
            // failure the original block is left live and valid, and must stay
            // tracked rather than being forgotten.
            let slot = unsafe { header.as_ref().freelist_id } as usize - 1;
            let grown = system_realloc(header, size)?;
            tracked.set(slot, grown);
            Some(grown)
        }
        AllocatorKind::StaticPage(page) => {
            if page.try_reallocate_in_place(header, size) {
                Some(header)
            } else {
                None
            }
        }
        AllocatorKind::MultiPageArena(arena) => arena.realloc(header, size),
    }
}

fn find_owner_mut(allocator: &mut Allocator, header: NonNull<AllocationHeader>) -> Option<&mut Allocator> {
    if dispatch_owns(&allocator.kind, header) {
        return Some(allocator);
    }
    match allocator.fallback.as_deref_mut() {
        Some(fallback) => find_owner_mut(fallback, header),
        None => None,
    }
}

impl Allocator {
    /// The process-wide system-heap strategy. Stateless; calling
    /// [`Allocator::destroy`] on it, directly or by reaching it through a
    /// fallback chain, aborts the process. Simply letting it (or a chain
    /// that falls back to it) go out of scope is always safe.
    pub fn new_default() -> Self {
        Self { kind: AllocatorKind::Default, fallback: None }
    }

    /// Like [`Allocator::new_default`], but tracks every live allocation so
    /// ownership queries do not rely on a sentinel bit pattern.
    pub fn new_tracked_default() -> Self {
        Self { kind: AllocatorKind::TrackedDefault(AllocationArray::new()), fallback: None }
    }

    /// A single page backed by memory this allocator owns and will free on drop.
    pub fn new_static_page_owned(capacity_bytes: usize) -> Result<Self, ConfigError> {
        let page = ArenaPage::new_owned(capacity_bytes)?;
        Ok(Self { kind: AllocatorKind::StaticPage(page), fallback: None })
    }

    /// A single page backed by caller-supplied memory that outlives it.
    ///
    /// The buffer must be `'static`: `ArenaPage` stores a raw pointer into it
    /// with no lifetime of its own, so a shorter-lived buffer could be freed
    /// out from under a still-live allocator.
    pub fn new_static_page_from(buffer: &'static mut [u8]) -> Result<Self, ConfigError> {
        let page = ArenaPage::from_caller_memory(buffer)?;
        Ok(Self { kind: AllocatorKind::StaticPage(page), fallback: None })
    }

    /// A growable arena of `page_size`-byte pages, each owned by the arena.
    pub fn new_multi_page_arena(page_size: usize) -> Result<Self, ConfigError> {
        let arena = Arena::new(page_size)?;
        Ok(Self { kind: AllocatorKind::MultiPageArena(arena), fallback: None })
    }

    /// Attaches `fallback`, consulted whenever this allocator's own strategy
    /// cannot satisfy a request.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Allocator) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    pub fn malloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        malloc(Some(self), size)
    }

    pub fn calloc(&mut self, count: usize, size: usize) -> Option<NonNull<u8>> {
        calloc(Some(self), count, size)
    }

    pub fn copy(&mut self, src: NonNull<u8>, size: usize) -> Option<NonNull<u8>> {
        unsafe { copy(Some(self), src, size) }
    }

    pub fn realloc(&mut self, ptr: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
        realloc(Some(self), ptr, size)
    }

    pub fn free(&mut self, ptr: Option<NonNull<u8>>) {
        free(Some(self), ptr);
    }

    /// Explicitly tears down this allocator and its fallback chain,
    /// recursing into the fallback first. Aborts the process if any node in
    /// the chain (this one, or a fallback reached along the way) is the
    /// `Default` strategy, which is never meant to be destroyed.
    ///
    /// Ordinary scope exit (an `Allocator` simply going out of scope without
    /// a call to `destroy`) never aborts: it only releases the memory each
    /// strategy owns, the same as dropping any other Rust value. `destroy`
    /// exists for callers who want the original's singleton invariant
    /// enforced explicitly.
    pub fn destroy(mut self) {
        if let Some(fallback) = self.fallback.take() {
            fallback.destroy();
        }
        // `TrackedDefault` hands out system-heap blocks directly; dropping its
        // tracking array only frees the `Vec`'s own buffer, not the blocks it
        // points at. Free each still-live block explicitly, the same way the
        // original walks its tracking table on teardown.
        if let AllocatorKind::TrackedDefault(tracked) = &self.kind {
            for i in 0..tracked.len() {
                system_free(tracked.get(i));
            }
        }
        if matches!(self.kind, AllocatorKind::Default) {
            abort_process("destroying the process-global default allocator");
        }
    }
}

/// Allocates `size` bytes. `None` for `allocator` is the system-heap
/// `Default` strategy. Returns `None` only on exhaustion of every strategy in
/// the chain; never panics.
pub fn malloc(allocator: Option<&mut Allocator>, size: usize) -> Option<NonNull<u8>> {
    if size == 0 {
        return None;
    }
    let header = match allocator {
        None => default_malloc(size),
        Some(root) => {
            let mut node: &mut Allocator = root;
            loop {
                if let Some(header) = dispatch_malloc(&mut node.kind, size) {
                    break Some(header);
                }
                match node.fallback.as_deref_mut() {
                    Some(fallback) => node = fallback,
                    None => break None,
                }
            }
        }
    }?;
    Some(unsafe { AllocationHeader::payload(header) })
}

/// Allocates space for `count` elements of `size` bytes, zeroed. Returns
/// `None` on overflow of `count * size` rather than silently truncating.
pub fn calloc(allocator: Option<&mut Allocator>, count: usize, size: usize) -> Option<NonNull<u8>> {
    let total = count.checked_mul(size)?;
    let ptr = malloc(allocator, total)?;
    unsafe {
        ptr.as_ptr().write_bytes(0, total);
    }
    Some(ptr)
}

/// Allocates `size` bytes and copies `size` bytes from `src` into them.
///
/// # Safety
/// `src` must be valid to read for `size` bytes.
pub unsafe fn copy(allocator: Option<&mut Allocator>, src: NonNull<u8>, size: usize) -> Option<NonNull<u8>> {
    let dest = malloc(allocator, size)?;
    core::ptr::copy_nonoverlapping(src.as_ptr(), dest.as_ptr(), size);
    Some(dest)
}

/// Resizes the allocation at `ptr` to `size` bytes, preserving the
/// overlapping prefix of bytes. `ptr = None` behaves as `malloc`.
pub fn realloc(allocator: Option<&mut Allocator>, ptr: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
    let Some(ptr) = ptr else {
        return malloc(allocator, size);
    };
    if size == 0 {
        free(allocator, Some(ptr));
        return None;
    }
    let header = unsafe { AllocationHeader::from_payload(ptr) };

    match allocator {
        None => {
            if !owns_default(header) {
                abort_process("reallocating a pointer not owned by any allocator");
            }
            system_realloc(header, size).map(|mut h| {
                unsafe {
                    h.as_mut().freelist_id = DEFAULT_SENTINEL;
                }
                unsafe { AllocationHeader::payload(h) }
            })
        }
        Some(root) => {
            let Some(owner) = find_owner_mut(root, header) else {
                abort_process("reallocating a pointer not owned by any allocator");
            };
            if let Some(resized) = dispatch_realloc(&mut owner.kind, header, size) {
                return Some(unsafe { AllocationHeader::payload(resized) });
            }

            // In-place growth failed: fall back to a fresh allocation plus copy,
            // same as the original's `allocator_realloc` fallback path.
            let old_len = unsafe { AllocationHeader::payload_len_bytes(header) };
            let fresh = malloc(Some(root), size)?;
            unsafe {
                let copy_len = old_len.min(size);
                core::ptr::copy_nonoverlapping(ptr.as_ptr(), fresh.as_ptr(), copy_len);
            }
            free(Some(root), Some(ptr));
            Some(fresh)
        }
    }
}

/// Frees the allocation at `ptr`, or does nothing if `ptr` is `None`.
/// Aborts the process if `ptr` is not owned by `allocator` or any allocator
/// in its fallback chain.
pub fn free(allocator: Option<&mut Allocator>, ptr: Option<NonNull<u8>>) {
    let Some(ptr) = ptr else {
        return;
    };
    let header = unsafe { AllocationHeader::from_payload(ptr) };
    match allocator {
        None => {
            if owns_default(header) {
                system_free(header);
            } else {
                abort_process("freeing a pointer not owned by any allocator");
            }
        }
        Some(root) => match find_owner_mut(root, header) {
            Some(owner) => dispatch_free(&mut owner.kind, header),
            None => abort_process("freeing a pointer not owned by any allocator"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_malloc_and_free_round_trip() {
        let ptr = malloc(None, 64).unwrap();
        unsafe {
            ptr.as_ptr().write_bytes(0x7, 64);
        }
        free(None, Some(ptr));
    }

    #[test]
    fn static_page_serves_until_exhausted_then_falls_back() {
        let mut allocator = Allocator::new_static_page_owned(450).unwrap().with_fallback(Allocator::new_default());
        let mut successes = 0;
        let mut pointers = Vec::new();
        for _ in 0..5 {
            match allocator.malloc(100) {
                Some(p) => {
                    successes += 1;
                    pointers.push(p);
                }
                None => break,
            }
        }
        assert!(successes >= 1);
        for p in pointers {
            allocator.free(Some(p));
        }
    }

    #[test]
    fn calloc_rejects_overflowing_multiplication() {
        let mut allocator = Allocator::new_default();
        assert!(allocator.calloc(usize::MAX, 2).is_none());
    }

    #[test]
    fn tracked_default_owns_only_its_own_allocations() {
        let mut tracked = Allocator::new_tracked_default();
        let owned = tracked.malloc(32).unwrap();
        let header = unsafe { AllocationHeader::from_payload(owned) };
        assert!(dispatch_owns(&tracked.kind, header));
        tracked.free(Some(owned));
    }

    #[test]
    fn static_page_from_caller_buffer_round_trips() {
        let buffer: &'static mut [u8] = Box::leak(Box::new([0u8; 256]));
        let mut allocator = Allocator::new_static_page_from(buffer).unwrap();
        let ptr = allocator.malloc(32).unwrap();
        unsafe {
            ptr.as_ptr().write_bytes(0x5, 32);
        }
        allocator.free(Some(ptr));
    }

    #[test]
    fn multi_page_arena_reallocation_preserves_bytes() {
        let mut allocator = Allocator::new_multi_page_arena(4096).unwrap();
        let ptr = allocator.malloc(16).unwrap();
        unsafe {
            ptr.as_ptr().write_bytes(0x42, 16);
        }
        let grown = allocator.realloc(Some(ptr), 256).unwrap();
        unsafe {
            assert_eq!(*grown.as_ptr(), 0x42);
        }
        allocator.free(Some(grown));
    }

    #[test]
    fn destroy_frees_every_tracked_default_allocation() {
        let mut allocator = Allocator::new_tracked_default();
        for _ in 0..4 {
            allocator.malloc(32).unwrap();
        }
        let tracked_len = match &allocator.kind {
            AllocatorKind::TrackedDefault(tracked) => tracked.len(),
            _ => unreachable!(),
        };
        assert_eq!(tracked_len, 4);
        // `destroy` must walk and free every one of these before dropping the
        // tracking array out from under them.
        allocator.destroy();
    }

    #[test]
    fn tracked_default_realloc_patches_slot_to_new_address() {
        // `dispatch_realloc`'s `TrackedDefault` arm must only touch the
        // tracking slot after `system_realloc` succeeds, and must leave the
        // header recognised as owned at its (possibly new) address afterward.
        let mut tracked = Allocator::new_tracked_default();
        let ptr = tracked.malloc(32).unwrap();
        let header = unsafe { AllocationHeader::from_payload(ptr) };
        assert!(dispatch_owns(&tracked.kind, header));

        let grown = dispatch_realloc(&mut tracked.kind, header, 4096).unwrap();
        assert!(dispatch_owns(&tracked.kind, grown));
        tracked.free(Some(unsafe { AllocationHeader::payload(grown) }));
    }
}
