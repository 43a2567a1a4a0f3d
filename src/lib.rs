//! # rallocator - a segregated free-list heap allocator
//!
//! This crate implements a general-purpose dynamic memory allocator over a
//! contiguous, monotonically-growable arena obtained from `sbrk`. It's the
//! classic three operations - `malloc`, `free`, `realloc` - built around a
//! segregated free-list design rather than a bump pointer: freed memory is
//! tracked and reused, not just handed back to the OS when it happens to
//! be the most recent allocation.
//!
//! ## Overview
//!
//! ```text
//!   Heap layout:
//!
//!   ┌──────────────────┬──────────┬───────────────────────┬──────────┐
//!   │ bucket-root table│ prologue │  blocks (free/alloc)  │ epilogue │
//!   │   47 × 8 bytes    │ (8 bytes)│                       │ (0 bytes)│
//!   └──────────────────┴──────────┴───────────────────────┴──────────┘
//!                                  ▲
//!                                  └── grows via sbrk when a fit search misses
//! ```
//!
//! Every block carries an 8-byte header - a size-with-flags word and a
//! back-reference to the previous block's size - and nothing else; there
//! are no footers. A free block borrows the first 16 bytes of its own
//! payload to thread itself into a doubly-linked, per-size-class free
//! list:
//!
//! ```text
//!   Bucket roots                 Free blocks (LIFO within a bucket)
//!   ┌─────────────┐
//!   │ roots[0]  ──┼──► [32-byte blk] ◄──► [32-byte blk] ◄──► null
//!   │ roots[1]  ──┼──► null
//!   │    ...      │
//!   │ roots[46] ──┼──► [huge blk]
//!   └─────────────┘
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rallocator
//!   ├── align     - word-alignment macros, kept from the bump allocator this grew out of
//!   ├── block     - BlockRef: header bit-packing and free-list link accessors
//!   ├── bucket    - the size-class map (47 buckets, pow-of-two / 800-stride hybrid)
//!   ├── freelist  - the segregated free-list registry
//!   ├── sbrk      - the ArenaProvider trait and its real sbrk(2)-backed impl
//!   ├── error     - HeapError (ArenaExhausted, InitFailure)
//!   └── heap      - Heap<P>: init / malloc / free / realloc, the finder, placer, coalescer
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rallocator::{init, malloc, free};
//!
//! fn main() {
//!     assert_eq!(init(), 0);
//!
//!     unsafe {
//!         let p = malloc(64);
//!         assert!(!p.is_null());
//!         *(p as *mut u64) = 42;
//!         free(p);
//!     }
//! }
//! ```
//!
//! Or, to embed the allocator directly (e.g. for tests against a fake
//! arena instead of the real process break):
//!
//! ```rust,ignore
//! use rallocator::{Heap, SbrkProvider};
//!
//! let mut heap = Heap::new(SbrkProvider::new());
//! heap.init().expect("sbrk should supply the initial chunk");
//! let p = heap.malloc(64);
//! ```
//!
//! ## Policy
//!
//! - **Fit**: first-fit within the request's bucket, falling back to
//!   striding through larger buckets, or - for a near-empty heap or a
//!   jumbo request - searching from the largest bucket down.
//! - **Insertion order**: LIFO. The most recently freed block in a bucket
//!   is found first; this favors throughput over utilization.
//! - **Coalescing**: footerless. A freed block's neighbors are found by
//!   address arithmetic on the header's size fields, not boundary tags.
//! - **Growth**: the arena only grows, by a fixed amount on a miss. It is
//!   never returned to the OS, compacted, or garbage collected.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no internal synchronization beyond what's
//!   needed to store the default global instance safely; concurrent
//!   mutation of one `Heap` from multiple threads is undefined behavior.
//! - **No shrinking**: the arena is write-once-extend; freed memory is
//!   reused in place, never released back to the provider.
//! - **8-byte alignment only**: payload pointers are 8-byte aligned;
//!   arbitrary `Layout` alignment requests are out of scope.
//! - **Unix-only**: requires `libc` and `sbrk` (POSIX systems).
//!
//! ## Safety
//!
//! This crate is inherently unsafe: it manages raw memory handed back as
//! untyped pointers. `malloc`/`free`/`realloc` all require the caller to
//! uphold the usual C allocator contract - free each pointer at most
//! once, never use it afterward, never pass a pointer this allocator
//! didn't hand out.

pub mod align;
mod block;
mod bucket;
mod error;
mod freelist;
mod heap;
mod sbrk;

pub use block::{HEADER_SIZE, MIN_BLOCK_SIZE};
pub use bucket::NUM_BUCKETS;
pub use error::HeapError;
pub use heap::Heap;
pub use sbrk::{ArenaProvider, SbrkProvider};

use std::ptr;
use std::sync::Mutex;

/// The process-wide default heap backing the free-function API below.
static HEAP: Mutex<Option<Heap<SbrkProvider>>> = Mutex::new(None);

/// Prepares the default heap. Must be called before any of
/// `malloc`/`free`/`realloc` below. Returns `0` on success, `-1` if the
/// memory provider couldn't supply the initial chunk.
pub fn init() -> i32 {
  let mut heap = Heap::new(SbrkProvider::new());
  match heap.init() {
    Ok(()) => {
      *HEAP.lock().unwrap() = Some(heap);
      0
    }
    Err(err) => {
      log::warn!("rallocator init failed: {err}");
      -1
    }
  }
}

/// Returns an 8-byte-aligned address to a region of at least `size`
/// usable bytes, or a null pointer on exhaustion.
///
/// # Safety
/// `init()` must have returned `0` before this is called.
pub unsafe fn malloc(size: usize) -> *mut u8 {
  match HEAP.lock().unwrap().as_mut() {
    Some(heap) => heap.malloc(size),
    None => ptr::null_mut(),
  }
}

/// Releases a block previously returned by `malloc`/`realloc`.
///
/// # Safety
/// `address` must have been returned by a prior `malloc`/`realloc` call
/// and not yet freed; passing anything else is undefined behavior.
pub unsafe fn free(address: *mut u8) {
  if let Some(heap) = HEAP.lock().unwrap().as_mut() {
    unsafe { heap.free(address) };
  }
}

/// Equivalent to `malloc(new_size)` followed by copying the overlap and
/// freeing `address`.
///
/// # Safety
/// `address` must have been returned by a prior `malloc`/`realloc` call
/// and not yet freed.
pub unsafe fn realloc(address: *mut u8, new_size: usize) -> *mut u8 {
  match HEAP.lock().unwrap().as_mut() {
    Some(heap) => unsafe { heap.realloc(address, new_size) },
    None => ptr::null_mut(),
  }
}
