//! OS primitives: aligned allocation and per-page protection.
//!
//! Exactly one [`AlignedAlloc`] strategy is picked at build time as
//! [`DefaultStrategy`]; the allocators never probe primitives at runtime.

use std::io;
use std::ptr::NonNull;

use libc::{c_int, c_void, size_t};

use crate::error::AllocError;

unsafe extern "C" {
  #[cfg(any(target_os = "linux", target_os = "android"))]
  fn memalign(
    alignment: size_t,
    size: size_t,
  ) -> *mut c_void;

  fn valloc(size: size_t) -> *mut c_void;
}

/// An aligned allocate/free capability backed by the C allocator.
///
/// # Safety
///
/// Implementors must return regions aligned to at least the requested
/// alignment and at least `size` bytes long, and `free_aligned` must accept
/// every pointer `alloc_aligned` handed out.
pub unsafe trait AlignedAlloc {
  /// Name used in log events.
  const NAME: &'static str;

  /// Allocates `size` bytes aligned to `alignment` (a power of two).
  fn alloc_aligned(
    &self,
    alignment: usize,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError>;

  /// Releases a region returned by [`AlignedAlloc::alloc_aligned`].
  ///
  /// # Safety
  ///
  /// `ptr` must come from this strategy and must not have been freed.
  unsafe fn free_aligned(
    &self,
    ptr: NonNull<u8>,
  );
}

/// `posix_memalign(3)`, available on every Unix.
#[derive(Clone, Copy, Debug, Default)]
pub struct PosixMemalign;

unsafe impl AlignedAlloc for PosixMemalign {
  const NAME: &'static str = "posix_memalign";

  fn alloc_aligned(
    &self,
    alignment: usize,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let mut ret: *mut c_void = std::ptr::null_mut();

    if unsafe { libc::posix_memalign(&mut ret, alignment, size) } != 0 {
      return Err(AllocError::OutOfMemory {
        requested: size,
        alignment,
      });
    }

    NonNull::new(ret.cast()).ok_or(AllocError::OutOfMemory {
      requested: size,
      alignment,
    })
  }

  unsafe fn free_aligned(
    &self,
    ptr: NonNull<u8>,
  ) {
    unsafe { libc::free(ptr.as_ptr().cast()) }
  }
}

/// The obsolete `memalign(3)`, for libcs that lack `posix_memalign`.
#[cfg(any(target_os = "linux", target_os = "android"))]
#[derive(Clone, Copy, Debug, Default)]
pub struct Memalign;

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe impl AlignedAlloc for Memalign {
  const NAME: &'static str = "memalign";

  fn alloc_aligned(
    &self,
    alignment: usize,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let ret = unsafe { memalign(alignment, size) };

    NonNull::new(ret.cast()).ok_or(AllocError::OutOfMemory {
      requested: size,
      alignment,
    })
  }

  unsafe fn free_aligned(
    &self,
    ptr: NonNull<u8>,
  ) {
    unsafe { libc::free(ptr.as_ptr().cast()) }
  }
}

/// `valloc(3)`, which always aligns to the page size.
///
/// The `alignment` argument is only checked against the page size.
#[derive(Clone, Copy, Debug, Default)]
pub struct Valloc;

unsafe impl AlignedAlloc for Valloc {
  const NAME: &'static str = "valloc";

  fn alloc_aligned(
    &self,
    alignment: usize,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    debug_assert!(alignment <= crate::page::page_size());

    let ret = unsafe { valloc(size) };

    NonNull::new(ret.cast()).ok_or(AllocError::OutOfMemory {
      requested: size,
      alignment,
    })
  }

  unsafe fn free_aligned(
    &self,
    ptr: NonNull<u8>,
  ) {
    unsafe { libc::free(ptr.as_ptr().cast()) }
  }
}

#[cfg(all(feature = "memalign", any(target_os = "linux", target_os = "android")))]
pub type DefaultStrategy = Memalign;

#[cfg(all(
  feature = "valloc",
  not(all(feature = "memalign", any(target_os = "linux", target_os = "android")))
))]
pub type DefaultStrategy = Valloc;

#[cfg(not(any(
  feature = "valloc",
  all(feature = "memalign", any(target_os = "linux", target_os = "android"))
)))]
pub type DefaultStrategy = PosixMemalign;

/// Page access rights toggled on guard pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protection {
  ReadOnly,
  ReadWrite,
}

impl Protection {
  fn flags(self) -> c_int {
    match self {
      Protection::ReadOnly => libc::PROT_READ,
      Protection::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
    }
  }
}

/// Changes the access rights of `len` bytes starting at `addr`.
///
/// # Safety
///
/// `addr` must be page-aligned and the range must lie within memory owned
/// by the caller.
pub unsafe fn protect(
  addr: NonNull<u8>,
  len: usize,
  protection: Protection,
) -> Result<(), AllocError> {
  let rc = unsafe { libc::mprotect(addr.as_ptr().cast(), len, protection.flags()) };

  if rc != 0 {
    return Err(AllocError::Protect {
      addr: addr.as_ptr() as usize,
      len,
      source: io::Error::last_os_error(),
    });
  }

  Ok(())
}
