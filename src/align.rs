/// Rounds `value` up to the next multiple of `page`.
///
/// `page` must be a power of two, which every hardware page size is.
///
/// # Examples
///
/// ```rust
/// use pagealloc::page_align;
///
/// assert_eq!(page_align!(1, 4096), 4096);
/// assert_eq!(page_align!(4096, 4096), 4096);
/// assert_eq!(page_align!(4097, 4096), 8192);
/// ```
#[macro_export]
macro_rules! page_align {
  ($value:expr, $page:expr) => {
    ($value + $page - 1) & !($page - 1)
  };
}

/// Number of pages a guarded allocation of `size` bytes occupies: the data
/// pages plus the leading header page and the trailing guard page.
pub fn guarded_page_count(
  size: usize,
  page: usize,
) -> usize {
  size.div_ceil(page) + 2
}

#[cfg(test)]
mod tests {
  use proptest::prelude::*;

  use super::*;

  #[test]
  fn test_page_align() {
    let page = 4096;

    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (page * i + 1)..=(page * (i + 1));
      alignments.push((sizes, page * (i + 1)));
    }

    for (sizes, expected) in alignments {
      for size in sizes.step_by(511) {
        assert_eq!(expected, page_align!(size, page));
      }
      assert_eq!(expected, page_align!(expected, page));
    }
  }

  #[test]
  fn test_guarded_page_count() {
    assert_eq!(guarded_page_count(4096, 4096), 3);
    assert_eq!(guarded_page_count(4097, 4096), 4);
    assert_eq!(guarded_page_count(16384, 16384), 3);
    assert_eq!(guarded_page_count(1 << 20, 4096), 258);
  }

  proptest! {
    #[test]
    fn page_align_is_smallest_covering_multiple(
      size in 1usize..0x3000_0000,
      shift in 12u32..17,
    ) {
      let page = 1usize << shift;
      let aligned = page_align!(size, page);

      prop_assert_eq!(aligned % page, 0);
      prop_assert!(aligned >= size);
      prop_assert!(aligned - size < page);
      prop_assert_eq!(guarded_page_count(size, page) * page, aligned + 2 * page);
    }
  }
}
