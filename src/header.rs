/// Capacity of the call-stack buffer kept in each guard header.
pub const TRACE_CAPACITY: usize = 3072;

/// Tag stored while a guarded block is live.
pub const LIVE_TAG: u32 = 0x1337;

/// Tag stored once a guarded block has been freed.
pub const CLEARED_TAG: u32 = 0;

/// Bookkeeping kept in the page just before every guarded block.
#[repr(C)]
pub struct GuardHeader {
  pub size: i64,
  pub tag: u32,
  pub trace: [u8; TRACE_CAPACITY],
}

impl GuardHeader {
  pub fn new(size: usize) -> Self {
    Self {
      size: size as i64,
      tag: LIVE_TAG,
      trace: [0; TRACE_CAPACITY],
    }
  }

  pub fn is_live(&self) -> bool {
    self.tag == LIVE_TAG
  }
}

#[cfg(test)]
mod tests {
  use std::mem;

  use super::*;
  use crate::page::DEFAULT_PAGE_SIZE;

  #[test]
  fn test_header_fits_in_smallest_page() {
    assert!(mem::size_of::<GuardHeader>() <= DEFAULT_PAGE_SIZE);
  }

  #[test]
  fn test_new_header_is_live() {
    let header = GuardHeader::new(8192);

    assert!(header.is_live());
    assert_eq!(header.size, 8192);
    assert!(header.trace.iter().all(|&b| b == 0));
  }

  #[test]
  fn test_cleared_header_is_not_live() {
    let mut header = GuardHeader::new(4096);

    header.tag = CLEARED_TAG;

    assert!(!header.is_live());
  }
}
