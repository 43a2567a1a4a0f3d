//! End-to-end tests against the real process-wide allocator, exercised
//! through the public `init`/`malloc`/`free`/`realloc` functions.
//!
//! There is exactly one heap backing this whole process (it sits on top
//! of the real `sbrk`), and `cargo test` runs test functions on multiple
//! threads by default, so every test here takes `SERIAL` first. That's
//! test plumbing to share one process's program break safely - it's not
//! a statement about the allocator itself, which remains single-threaded
//! by design.

use rallocator::{free, init, malloc, realloc};
use std::sync::Mutex;

static SERIAL: Mutex<()> = Mutex::new(());

fn serialize() -> std::sync::MutexGuard<'static, ()> {
  SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[test]
fn init_returns_success() {
  let _guard = serialize();
  assert_eq!(init(), 0);
}

#[test]
fn malloc_returns_aligned_nonnull_pointers() {
  let _guard = serialize();
  assert_eq!(init(), 0);

  unsafe {
    for size in [1usize, 7, 8, 16, 100, 448, 4096] {
      let p = malloc(size);
      assert!(!p.is_null(), "malloc({size}) returned null");
      assert_eq!(p as usize % 8, 0, "malloc({size}) returned a misaligned pointer");
      free(p);
    }
  }
}

#[test]
fn freed_block_is_available_for_reuse() {
  let _guard = serialize();
  assert_eq!(init(), 0);

  unsafe {
    let a = malloc(64);
    assert!(!a.is_null());
    free(a);

    let b = malloc(64);
    assert!(!b.is_null());
    assert_eq!(a, b, "a same-bucket request right after free should reuse the LIFO head");
  }
}

#[test]
fn realloc_preserves_overlapping_bytes_on_growth() {
  let _guard = serialize();
  assert_eq!(init(), 0);

  unsafe {
    let p = malloc(24);
    assert!(!p.is_null());
    for i in 0..24u8 {
      *p.add(i as usize) = i;
    }

    let q = realloc(p, 500);
    assert!(!q.is_null());
    for i in 0..24u8 {
      assert_eq!(*q.add(i as usize), i);
    }
    free(q);
  }
}

#[test]
fn realloc_preserves_bytes_on_shrink() {
  let _guard = serialize();
  assert_eq!(init(), 0);

  unsafe {
    let p = malloc(200);
    assert!(!p.is_null());
    for i in 0..200u8 {
      *p.add(i as usize) = i;
    }

    let q = realloc(p, 16);
    assert!(!q.is_null());
    for i in 0..16u8 {
      assert_eq!(*q.add(i as usize), i);
    }
    free(q);
  }
}

#[test]
fn many_small_allocations_eventually_force_heap_growth() {
  let _guard = serialize();
  assert_eq!(init(), 0);

  unsafe {
    let mut ptrs = Vec::new();
    for _ in 0..2000 {
      let p = malloc(64);
      assert!(!p.is_null(), "allocation should keep succeeding across at least one heap extension");
      ptrs.push(p);
    }
    for p in ptrs {
      free(p);
    }
  }
}
