//! Call-stack capture into fixed-size buffers.

use std::backtrace::Backtrace;

/// Fills `buf` with the current call stack as NUL-terminated text.
///
/// Text that does not fit is cut off; the last byte is always the
/// terminator.
pub fn capture(buf: &mut [u8]) {
  let stack = Backtrace::force_capture().to_string();
  write_truncated(buf, stack.as_bytes());
}

/// Reads back the text stored by [`capture`].
pub fn read(buf: &[u8]) -> String {
  let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
  String::from_utf8_lossy(&buf[..len]).into_owned()
}

fn write_truncated(
  buf: &mut [u8],
  text: &[u8],
) {
  let Some(room) = buf.len().checked_sub(1) else {
    return;
  };

  let len = text.len().min(room);
  buf[..len].copy_from_slice(&text[..len]);
  buf[len] = 0;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_capture_produces_terminated_text() {
    let mut buf = [0xFFu8; 3072];

    capture(&mut buf);

    let text = read(&buf);
    assert!(!text.is_empty());
    assert!(buf.contains(&0));
  }

  #[test]
  fn test_write_truncates_and_terminates() {
    let mut buf = [0xFFu8; 8];

    write_truncated(&mut buf, b"0123456789");

    assert_eq!(&buf, b"0123456\0");
    assert_eq!(read(&buf), "0123456");
  }

  #[test]
  fn test_write_short_text() {
    let mut buf = [0xFFu8; 8];

    write_truncated(&mut buf, b"abc");

    assert_eq!(read(&buf), "abc");
  }

  #[test]
  fn test_write_into_empty_buffer() {
    let mut buf = [0u8; 0];

    write_truncated(&mut buf, b"abc");

    assert_eq!(read(&buf), "");
  }

  #[test]
  fn test_read_without_terminator() {
    assert_eq!(read(b"xyz"), "xyz");
  }
}
