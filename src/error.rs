//! Construction-time error type and the process-abort path for programmer errors.
//!
//! Grounded in `examples/original_source/src/allocator.h`'s `ALLOCATOR_ABORT`
//! macro (`fprintf` to stderr followed by `abort()`); recoverable construction
//! failures are a Rust-native addition (see `SPEC_FULL.md` section 9) since the
//! original never validates caller-supplied buffers before use.

use core::fmt;

/// Failure constructing an allocator from caller-supplied configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The supplied buffer or page size cannot host even one allocation.
    PageTooSmall {
        /// The byte length that was supplied.
        capacity_bytes: usize,
        /// The minimum byte length a page needs.
        minimum_bytes: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::PageTooSmall { capacity_bytes, minimum_bytes } => write!(
                f,
                "page capacity of {capacity_bytes} bytes is below the minimum of {minimum_bytes} bytes"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Logs `message` (when the `tracing` feature is enabled) and aborts the process.
///
/// Used for conditions the original treats as programmer error rather than an
/// allocation failure: freeing an unrecognized pointer, destroying the
/// process-global default allocator, or exhausting the system heap while a
/// bookkeeping structure grows.
pub(crate) fn abort_process(message: &str) -> ! {
    #[cfg(feature = "tracing")]
    tracing::error!("{message}");
    eprintln!("block-allocator: {message}");
    std::process::abort();
}
