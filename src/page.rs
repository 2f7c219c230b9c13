use std::sync::atomic::{AtomicUsize, Ordering};

/// Page size assumed when the OS cannot be queried.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

// Zero means "not computed yet". Concurrent first callers may all query the
// OS, but they store the same value, so no lock is needed.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Returns the hardware page size in bytes.
///
/// The value is queried once and cached for the life of the process. A failed
/// or non-positive query yields [`DEFAULT_PAGE_SIZE`].
pub fn page_size() -> usize {
  let cached = PAGE_SIZE.load(Ordering::Relaxed);
  if cached != 0 {
    return cached;
  }

  let size = query_page_size();
  debug_assert!(size.is_power_of_two());
  PAGE_SIZE.store(size, Ordering::Relaxed);

  tracing::debug!(page_size = size, "page size initialized");
  size
}

#[cfg(feature = "fixed-page-size")]
fn query_page_size() -> usize {
  DEFAULT_PAGE_SIZE
}

#[cfg(not(feature = "fixed-page-size"))]
fn query_page_size() -> usize {
  let reported = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

  if reported <= 0 {
    tracing::warn!(
      reported,
      fallback = DEFAULT_PAGE_SIZE,
      "sysconf(_SC_PAGESIZE) failed, assuming default page size"
    );
    return DEFAULT_PAGE_SIZE;
  }

  reported as usize
}

#[cfg(test)]
mod tests {
  use std::thread;

  use super::*;

  #[test]
  fn test_page_size_is_power_of_two() {
    let size = page_size();

    assert!(size.is_power_of_two());
    assert!(size >= 512);
  }

  #[test]
  fn test_page_size_is_stable() {
    let first = page_size();

    for _ in 0..100 {
      assert_eq!(first, page_size());
    }
  }

  #[test]
  fn test_page_size_agrees_across_threads() {
    let expected = page_size();

    let handles: Vec<_> = (0..8).map(|_| thread::spawn(page_size)).collect();

    for handle in handles {
      assert_eq!(expected, handle.join().unwrap());
    }
  }

  #[cfg(not(feature = "fixed-page-size"))]
  #[test]
  fn test_page_size_matches_sysconf() {
    let reported = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

    assert!(reported > 0);
    assert_eq!(reported as usize, page_size());
  }
}
