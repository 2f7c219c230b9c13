//! Guard-page decorator for [`AlignedBlockAllocator`].
//!
//! Each block is bracketed by two read-only pages:
//!
//! ```text
//!   ┌──────────────┬──────────────────────────────┬──────────────┐
//!   │ GuardHeader  │        caller's block        │ trailing     │
//!   │ (read-only)  │   ceil(size / page) pages    │ guard (r/o)  │
//!   └──────────────┴──────────────────────────────┴──────────────┘
//!                  ▲
//!                  └── pointer returned to the caller
//! ```
//!
//! Writing one byte before or past the block faults on the spot. The header
//! page records the requested size, a liveness tag and the call stack of the
//! last allocate or free.
//!
//! Liveness is also kept out of band in a process-wide set of block
//! addresses, so `in_use` and double-free detection never read memory that
//! has already gone back to the C allocator.

use std::{
  collections::BTreeSet,
  ptr::NonNull,
  sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{
  aligned::{AlignedBlockAllocator, check_request},
  align::guarded_page_count,
  error::AllocError,
  header::{CLEARED_TAG, GuardHeader},
  page::page_size,
  platform::{AlignedAlloc, DefaultStrategy, Protection, protect},
  trace,
};

// Addresses of blocks between allocate and free, shared by every
// `GuardedAllocator` since they all draw from the same C heap.
static LIVE_BLOCKS: Mutex<BTreeSet<usize>> = Mutex::new(BTreeSet::new());

fn live_blocks() -> MutexGuard<'static, BTreeSet<usize>> {
  LIVE_BLOCKS.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct GuardedAllocator<S = DefaultStrategy> {
  inner: AlignedBlockAllocator<S>,
}

impl GuardedAllocator<DefaultStrategy> {
  pub const fn new() -> Self {
    Self {
      inner: AlignedBlockAllocator::new(),
    }
  }
}

impl<S: AlignedAlloc> GuardedAllocator<S> {
  pub const fn with_strategy(strategy: S) -> Self {
    Self {
      inner: AlignedBlockAllocator::with_strategy(strategy),
    }
  }

  /// Bytes actually taken from the OS for a request of `size` bytes.
  pub fn reserved_bytes(
    &self,
    size: usize,
  ) -> usize {
    let page = page_size();
    guarded_page_count(size, page) * page
  }

  /// Allocates `size` bytes between a header page and a trailing guard page.
  ///
  /// # Panics
  ///
  /// On the same invalid sizes as [`AlignedBlockAllocator::allocate`].
  pub fn allocate(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    check_request(size);

    let page = page_size();
    debug_assert!(size_of::<GuardHeader>() <= page);

    let pages = guarded_page_count(size, page);
    let base = self.inner.allocate_raw(pages * page)?;
    let header = base.cast::<GuardHeader>().as_ptr();
    let tail = unsafe { base.add((pages - 1) * page) };

    unsafe {
      header.write(GuardHeader::new(size));
      trace::capture(&mut (*header).trace);
    }

    let protected = unsafe {
      protect(base, page, Protection::ReadOnly).and_then(|()| protect(tail, page, Protection::ReadOnly))
    };

    if let Err(err) = protected {
      tracing::warn!(address = ?base, size, %err, "could not arm guard pages");

      let restored = unsafe {
        protect(base, page, Protection::ReadWrite).and_then(|()| protect(tail, page, Protection::ReadWrite))
      };

      match restored {
        Ok(()) => unsafe { self.inner.free(base.as_ptr()) },
        Err(restore_err) => tracing::error!(
          address = ?base,
          reserved = pages * page,
          %restore_err,
          "guard pages stuck read-only, leaking region"
        ),
      }

      return Err(err);
    }

    let block = unsafe { base.add(page) };
    live_blocks().insert(block.as_ptr() as usize);

    tracing::trace!(
      address = ?block,
      head = ?base,
      tail = ?tail,
      size,
      reserved = pages * page,
      "allocated guarded block"
    );

    Ok(block)
  }

  /// Disarms the guard pages and returns the whole region to the OS. Null is
  /// ignored.
  ///
  /// # Panics
  ///
  /// If `block` is not live (a double free or a foreign pointer) or its
  /// header no longer carries the live tag (a corrupted header).
  ///
  /// # Safety
  ///
  /// `block` must be null or have come from [`allocate`] on this allocator.
  ///
  /// [`allocate`]: GuardedAllocator::allocate
  pub unsafe fn free(
    &self,
    block: *mut u8,
  ) {
    let Some(block) = NonNull::new(block) else {
      return;
    };

    if !live_blocks().remove(&(block.as_ptr() as usize)) {
      tracing::error!(address = ?block, "free of a block that is not live");
      panic!("guarded block {block:p} is not live: double free or foreign pointer");
    }

    let page = page_size();
    let base = unsafe { block.sub(page) };

    if let Err(err) = unsafe { protect(base, page, Protection::ReadWrite) } {
      panic!("cannot unprotect header of guarded block {block:p}: {err}");
    }

    let header = base.cast::<GuardHeader>().as_ptr();
    let (size, live) = unsafe { ((*header).size, (*header).is_live()) };

    if !live {
      let tag = unsafe { (*header).tag };
      let last_trace = unsafe { trace::read(&(*header).trace) };
      tracing::error!(address = ?block, size, tag, "guard header lost its live tag");
      panic!(
        "guarded block {block:p} has a corrupted header (tag {tag:#x}, size {size})\n\
         last recorded trace:\n{last_trace}"
      );
    }

    let pages = guarded_page_count(size as usize, page);
    let tail = unsafe { base.add((pages - 1) * page) };

    if let Err(err) = unsafe { protect(tail, page, Protection::ReadWrite) } {
      panic!("cannot unprotect trailing guard of block {block:p} ({size} bytes): {err}");
    }

    unsafe {
      (*header).tag = CLEARED_TAG;
      trace::capture(&mut (*header).trace);
    }

    tracing::trace!(
      address = ?block,
      head = ?base,
      tail = ?tail,
      size,
      "freeing guarded block"
    );

    unsafe { self.inner.free(base.as_ptr()) }
  }

  /// Whether `block` is between its allocation and its free.
  ///
  /// Only the live-block set is consulted, so this is safe to call on freed
  /// or foreign pointers.
  pub fn in_use(
    &self,
    block: NonNull<u8>,
  ) -> bool {
    live_blocks().contains(&(block.as_ptr() as usize))
  }

  /// The call stack recorded when `block` was allocated, or `None` if it is
  /// not live.
  pub fn allocation_trace(
    &self,
    block: NonNull<u8>,
  ) -> Option<String> {
    // Holding the set keeps a concurrent free from releasing the header.
    let live = live_blocks();
    if !live.contains(&(block.as_ptr() as usize)) {
      return None;
    }

    let header = unsafe { block.sub(page_size()) }.cast::<GuardHeader>();
    Some(unsafe { trace::read(&(*header.as_ptr()).trace) })
  }
}
