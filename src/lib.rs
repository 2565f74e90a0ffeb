//! # `block-allocator`
//!
//! A composable block allocator. Every allocation is rounded up to a whole
//! number of 8-byte blocks and prefixed with a one-block header; strategies
//! can be chained so that a request which overflows one allocator's capacity
//! falls through to the next.
//!
//! ## Strategies
//!
//! - [`Allocator::new_default`] – the system heap, tagged with a sentinel so
//!   ownership is always recognised.
//! - [`Allocator::new_tracked_default`] – the system heap with an explicit
//!   live-allocation table instead of a sentinel tag.
//! - [`Allocator::new_static_page_owned`] / [`Allocator::new_static_page_from`]
//!   – a single fixed-capacity page, bump-allocated from the front with a
//!   free list recycling blocks freed below the frontier.
//! - [`Allocator::new_multi_page_arena`] – a growable collection of
//!   equal-sized pages.
//!
//! Chain strategies with [`Allocator::with_fallback`]: a request that the
//! primary strategy cannot satisfy is retried against the fallback.
//!
//! ## Example
//!
//! ```rust
//! use block_allocator::Allocator;
//!
//! let mut allocator = Allocator::new_static_page_owned(4096)
//!     .unwrap()
//!     .with_fallback(Allocator::new_default());
//!
//! let ptr = allocator.malloc(128).expect("page or fallback has room");
//! allocator.free(Some(ptr));
//! ```
//!
//! ## Safety and failure model
//!
//! Every operation returns `Option`/`Result` for exhaustion; none of them
//! panic. Two classes of misuse abort the process instead of returning an
//! error, since there is no well-typed value that could represent them
//! safely: freeing or reallocating a pointer that the given allocator chain
//! does not own, and calling [`Allocator::destroy`] on a chain that reaches
//! the [`Allocator::new_default`] strategy. Simply letting any allocator go
//! out of scope without calling `destroy` is always safe.

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod allocator;
mod arena;
mod array;
mod error;
mod freelist;
mod header;
mod page;

pub use allocator::{calloc, copy, free, malloc, realloc, Allocator};
pub use error::ConfigError;
