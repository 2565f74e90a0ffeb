use block_allocator::Allocator;

// Grounded in `examples/original_source/src/allocator.h`'s
// `ALLOCATOR_TEST_MAIN`: a page sized so only three 100-byte requests fit.
#[test]
fn stack_allocator_exhausts_after_three_requests() {
    let mut allocator = Allocator::new_static_page_owned(450).unwrap();
    let mut granted = Vec::new();
    while let Some(ptr) = allocator.malloc(100) {
        granted.push(ptr);
    }
    assert_eq!(granted.len(), 3);
    for ptr in granted {
        allocator.free(Some(ptr));
    }
}

// Same source, stack-plus-fallback scenario: twenty 120-byte requests must
// all succeed once a default fallback is attached.
#[test]
fn stack_with_fallback_satisfies_every_request() {
    let mut allocator = Allocator::new_static_page_owned(500)
        .unwrap()
        .with_fallback(Allocator::new_default());

    let mut granted = Vec::new();
    for _ in 0..20 {
        granted.push(allocator.malloc(120).expect("fallback absorbs overflow"));
    }
    assert_eq!(granted.len(), 20);
    for ptr in granted {
        allocator.free(Some(ptr));
    }
}

// A static page backed by a tracked-default fallback must release every
// allocation the fallback served when the chain is torn down, not just the
// page's own backing memory.
#[test]
fn destroying_tracked_default_fallback_releases_every_allocation() {
    let mut allocator = Allocator::new_static_page_owned(500)
        .unwrap()
        .with_fallback(Allocator::new_tracked_default());

    let mut granted = Vec::new();
    for _ in 0..20 {
        granted.push(allocator.malloc(120).expect("tracked-default fallback absorbs overflow"));
    }
    assert_eq!(granted.len(), 20);

    allocator.destroy();
}

// A multi-page arena should grow to as many pages as the workload needs and
// preserve data across both in-place and relocating reallocations.
#[test]
fn multi_page_arena_grows_and_preserves_data() {
    let mut allocator = Allocator::new_multi_page_arena(256).unwrap();
    let mut live = Vec::new();

    for i in 0..40u8 {
        let ptr = allocator.malloc(16).unwrap();
        unsafe {
            *ptr.as_ptr() = i;
        }
        live.push((i, ptr));
    }

    for (tag, ptr) in &mut live {
        let grown = allocator.realloc(Some(*ptr), 48).unwrap();
        unsafe {
            assert_eq!(*grown.as_ptr(), *tag);
        }
        *ptr = grown;
    }

    for (_, ptr) in live {
        allocator.free(Some(ptr));
    }
}

// Tracked-default ownership must not be confused with a sibling allocator's
// allocations even when both ultimately draw from the system heap.
#[test]
fn tracked_default_does_not_claim_foreign_pointers() {
    let mut tracked = Allocator::new_tracked_default();
    let mut plain_default = Allocator::new_default();

    let owned = tracked.malloc(32).unwrap();
    let foreign = plain_default.malloc(32).unwrap();

    // Freeing the tracked allocator's own pointer must succeed.
    tracked.free(Some(owned));
    plain_default.free(Some(foreign));
}

// An allocation too large for a static page but satisfiable by its fallback
// must not advance the page's own bump frontier.
#[test]
fn oversized_request_skips_the_page_and_uses_fallback() {
    let mut allocator = Allocator::new_static_page_owned(128)
        .unwrap()
        .with_fallback(Allocator::new_default());

    let small = allocator.malloc(16).expect("small request fits on the page");
    let large = allocator.malloc(4096).expect("large request falls through");
    allocator.free(Some(small));
    allocator.free(Some(large));
}

// Splitting a free block for a small request, then coalescing two adjacent
// freed blocks sitting behind a still-live allocation (so the space can only
// come back via the free list, never via bump-frontier retraction), must
// return enough contiguous space to satisfy a request neither block alone
// could have.
#[test]
fn split_and_coalesce_round_trip() {
    let mut allocator = Allocator::new_static_page_owned(512).unwrap();
    let a = allocator.malloc(32).unwrap();
    let b = allocator.malloc(32).unwrap();
    let keep_alive = allocator.malloc(32).unwrap();

    allocator.free(Some(b));
    allocator.free(Some(a));

    let again = allocator.malloc(48);
    assert!(again.is_some(), "coalesced free space should satisfy a request larger than either half");

    allocator.free(Some(keep_alive));
    if let Some(p) = again {
        allocator.free(Some(p));
    }
}
