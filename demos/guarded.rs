use std::io::Read;

use pagealloc::{AlignedBlockAllocator, GuardedAllocator, page_size};
use tracing_subscriber::{EnvFilter, fmt};

/// Waits until the user presses ENTER.
/// Useful for inspecting the mappings with `pmap` or `/proc/<pid>/maps`
/// between steps.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn main() {
  fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace")))
    .with_thread_names(true)
    .init();

  let page = page_size();
  println!("PID = {}, page size = {page} bytes", std::process::id());

  // --------------------------------------------------------------------
  // 1) Plain page-aligned block.
  // --------------------------------------------------------------------
  let plain = AlignedBlockAllocator::new();
  let block = plain.allocate(2 * page).expect("out of memory");
  println!(
    "\n[1] plain block at {:?}, addr % page = {}",
    block,
    block.as_ptr() as usize % page
  );
  unsafe { plain.free(block.as_ptr()) };

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Guarded block: one data page between two read-only pages.
  // --------------------------------------------------------------------
  let guarded = GuardedAllocator::new();
  let block = guarded.allocate(page).expect("out of memory");
  println!(
    "\n[2] guarded block at {:?}, {} bytes reserved",
    block,
    guarded.reserved_bytes(page)
  );

  unsafe { block.as_ptr().write_bytes(0xAB, page) };
  println!("[2] in use = {}", guarded.in_use(block));
  if let Some(trace) = guarded.allocation_trace(block) {
    println!("[2] allocated at:\n{trace}");
  }

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Set PAGEALLOC_OVERRUN=1 to write one byte past the block. The
  //    process dies with SIGSEGV right here.
  // --------------------------------------------------------------------
  if std::env::var_os("PAGEALLOC_OVERRUN").is_some() {
    println!("\n[3] writing one byte past the end...");
    unsafe { block.as_ptr().add(page).write_volatile(1) };
  }

  unsafe { guarded.free(block.as_ptr()) };
  println!("\n[4] freed, in use = {}", guarded.in_use(block));
}
