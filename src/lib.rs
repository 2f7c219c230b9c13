//! # pagealloc - Page-Aligned Buffer Allocation
//!
//! This crate hands out large, page-aligned buffers (disk cache blocks, I/O
//! buffers) straight from the C allocator, with an optional debug mode that
//! fences every buffer with read-only guard pages.
//!
//! ## Overview
//!
//! ```text
//!   Production mode:
//!
//!   ┌──────────────────────────────────────────────┐
//!   │        caller's block (>= one page)          │
//!   └──────────────────────────────────────────────┘
//!   ▲
//!   └── address is a multiple of page_size()
//!
//!   Debug mode (feature "debug-buffers"):
//!
//!   ┌─────────────┬──────────────────────────────┬─────────────┐
//!   │ header page │   caller's block (rounded    │ guard page  │
//!   │  read-only  │   up to whole pages)         │  read-only  │
//!   └─────────────┴──────────────────────────────┴─────────────┘
//!                 ▲
//!                 └── pointer returned to the caller
//! ```
//!
//! A stray write one byte before or after a guarded block hits a read-only
//! page and the process faults at the offending instruction, instead of
//! silently corrupting a neighbour.
//!
//! ## Crate Structure
//!
//! ```text
//!   pagealloc
//!   ├── align     - page_align! macro and guarded page arithmetic
//!   ├── page      - cached hardware page size
//!   ├── platform  - aligned malloc strategies and mprotect
//!   ├── aligned   - AlignedBlockAllocator
//!   ├── header    - GuardHeader record (internal)
//!   ├── trace     - call-stack capture into fixed buffers
//!   └── guard     - GuardedAllocator
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use pagealloc::{PageAlignedAllocator, page_size};
//!
//! let allocator = PageAlignedAllocator::new();
//! let block = allocator.allocate(4 * page_size()).expect("out of memory");
//!
//! assert_eq!(block.as_ptr() as usize % page_size(), 0);
//!
//! unsafe {
//!     block.as_ptr().write_bytes(0, 4 * page_size());
//!     allocator.free(block.as_ptr());
//! }
//! ```
//!
//! ## Build Configuration
//!
//! - `debug-buffers`: [`PageAlignedAllocator`] becomes [`GuardedAllocator`].
//! - `memalign` / `valloc`: back allocations with `memalign(3)` or
//!   `valloc(3)` instead of `posix_memalign(3)`.
//! - `fixed-page-size`: skip the OS query and use 4096-byte pages.
//!
//! ## Limitations
//!
//! - **Unix-only**: relies on `libc` for allocation and `mprotect`
//! - **Page-granular**: requests below one page are rejected
//! - **No reuse**: every block is a fresh request to the C allocator
//!
//! ## Safety
//!
//! Freeing takes a raw pointer and is `unsafe`. Production mode trusts the
//! caller completely; debug mode catches double frees and boundary writes.

mod align;
mod aligned;
mod error;
mod guard;
mod header;
mod page;
mod platform;
pub mod trace;

pub use align::guarded_page_count;
pub use aligned::{AlignedBlockAllocator, MAX_ALLOCATION};
pub use error::AllocError;
pub use guard::GuardedAllocator;
pub use header::{CLEARED_TAG, LIVE_TAG, TRACE_CAPACITY};
pub use page::{DEFAULT_PAGE_SIZE, page_size};
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use platform::Memalign;
pub use platform::{AlignedAlloc, DefaultStrategy, PosixMemalign, Protection, Valloc, protect};

/// The allocator selected by the build configuration.
#[cfg(feature = "debug-buffers")]
pub type PageAlignedAllocator = GuardedAllocator<DefaultStrategy>;

/// The allocator selected by the build configuration.
#[cfg(not(feature = "debug-buffers"))]
pub type PageAlignedAllocator = AlignedBlockAllocator<DefaultStrategy>;
