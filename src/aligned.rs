use std::ptr::NonNull;

use crate::{
  error::AllocError,
  page::page_size,
  platform::{AlignedAlloc, DefaultStrategy},
};

/// Upper bound on a single request. Anything at or above it is treated as a
/// miscomputed size rather than a real buffer.
pub const MAX_ALLOCATION: usize = 0x3000_0000;

/// Hands out page-aligned blocks of at least one page.
///
/// Blocks are not zeroed. Every block must go back through [`free`] on the
/// allocator that produced it.
///
/// [`free`]: AlignedBlockAllocator::free
#[derive(Clone, Copy, Debug, Default)]
pub struct AlignedBlockAllocator<S = DefaultStrategy> {
  strategy: S,
}

impl AlignedBlockAllocator<DefaultStrategy> {
  pub const fn new() -> Self {
    Self {
      strategy: DefaultStrategy {},
    }
  }
}

impl<S: AlignedAlloc> AlignedBlockAllocator<S> {
  pub const fn with_strategy(strategy: S) -> Self {
    Self { strategy }
  }

  /// Allocates `size` bytes aligned to [`page_size`].
  ///
  /// # Panics
  ///
  /// If `size` is zero, smaller than a page, or not below
  /// [`MAX_ALLOCATION`].
  pub fn allocate(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    check_request(size);
    self.allocate_raw(size)
  }

  pub(crate) fn allocate_raw(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let page = page_size();

    let block = self
      .strategy
      .alloc_aligned(page, size)
      .inspect_err(|err| tracing::warn!(size, strategy = S::NAME, %err, "aligned allocation failed"))?;

    tracing::trace!(
      address = ?block,
      size,
      strategy = S::NAME,
      "allocated page-aligned block"
    );

    Ok(block)
  }

  /// Returns a block to the OS. Null is ignored.
  ///
  /// # Safety
  ///
  /// `block` must be null or a live block returned by [`allocate`] on this
  /// allocator, and must not be used afterwards.
  ///
  /// [`allocate`]: AlignedBlockAllocator::allocate
  pub unsafe fn free(
    &self,
    block: *mut u8,
  ) {
    let Some(block) = NonNull::new(block) else {
      return;
    };

    tracing::trace!(address = ?block, strategy = S::NAME, "freeing page-aligned block");

    unsafe { self.strategy.free_aligned(block) }
  }
}

pub(crate) fn check_request(size: usize) {
  assert!(size > 0, "zero-byte page allocation");
  assert!(
    size < MAX_ALLOCATION,
    "page allocation of {size} bytes exceeds the {MAX_ALLOCATION:#x} byte limit"
  );
  assert!(
    size >= page_size(),
    "page allocation of {size} bytes is smaller than one {} byte page",
    page_size()
  );
}

#[cfg(test)]
mod tests {
  use std::ptr;

  use proptest::prelude::*;

  use super::*;
  use crate::platform::Valloc;

  #[test]
  fn test_alloc() {
    let allocator = AlignedBlockAllocator::new();
    let page = page_size();

    unsafe {
      let first = allocator.allocate(page).unwrap();
      let second = allocator.allocate(4 * page + 17).unwrap();

      assert_eq!(first.as_ptr() as usize % page, 0);
      assert_eq!(second.as_ptr() as usize % page, 0);
      assert_ne!(first, second);

      ptr::write_bytes(first.as_ptr(), 0xAB, page);
      ptr::write_bytes(second.as_ptr(), 0xCD, 4 * page + 17);

      assert_eq!(*first.as_ptr().add(page - 1), 0xAB);
      assert_eq!(*second.as_ptr().add(4 * page + 16), 0xCD);

      allocator.free(first.as_ptr());
      allocator.free(second.as_ptr());
    }
  }

  #[test]
  fn test_free_null_is_noop() {
    let allocator = AlignedBlockAllocator::new();

    unsafe { allocator.free(ptr::null_mut()) };
  }

  #[test]
  fn test_explicit_strategy() {
    let allocator = AlignedBlockAllocator::with_strategy(Valloc);
    let page = page_size();

    let block = allocator.allocate(2 * page).unwrap();
    assert_eq!(block.as_ptr() as usize % page, 0);

    unsafe { allocator.free(block.as_ptr()) };
  }

  #[test]
  fn test_allocate_largest_permitted() {
    let allocator = AlignedBlockAllocator::new();

    // Near the limit the OS may legitimately refuse; both outcomes are fine
    // as long as a success is aligned.
    match allocator.allocate(MAX_ALLOCATION - 1) {
      Ok(block) => {
        assert_eq!(block.as_ptr() as usize % page_size(), 0);
        unsafe { allocator.free(block.as_ptr()) };
      }
      Err(err) => assert!(matches!(err, AllocError::OutOfMemory { .. })),
    }
  }

  #[test]
  #[should_panic(expected = "zero-byte")]
  fn test_zero_size_panics() {
    let _ = AlignedBlockAllocator::new().allocate(0);
  }

  #[test]
  #[should_panic(expected = "smaller than one")]
  fn test_sub_page_size_panics() {
    let _ = AlignedBlockAllocator::new().allocate(page_size() - 1);
  }

  #[test]
  #[should_panic(expected = "exceeds")]
  fn test_oversized_request_panics() {
    let _ = AlignedBlockAllocator::new().allocate(MAX_ALLOCATION);
  }

  proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn allocations_are_page_aligned(extra in 0usize..(1 << 20)) {
      let allocator = AlignedBlockAllocator::new();
      let size = page_size() + extra;

      let block = allocator.allocate(size).unwrap();
      prop_assert_eq!(block.as_ptr() as usize % page_size(), 0);

      unsafe {
        block.as_ptr().add(size - 1).write(1);
        allocator.free(block.as_ptr());
      }
    }
  }
}
