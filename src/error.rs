use std::io;

use thiserror::Error;

/// Recoverable allocation failures.
///
/// Misuse of the allocator (zero or sub-page sizes, double frees, corrupted
/// headers) is not reported here; it panics.
#[derive(Debug, Error)]
pub enum AllocError {
  #[error("out of memory: requested {requested} bytes aligned to {alignment}")]
  OutOfMemory { requested: usize, alignment: usize },

  #[error("failed to protect {len} bytes at {addr:#x}: {source}")]
  Protect {
    addr: usize,
    len: usize,
    #[source]
    source: io::Error,
  },
}
