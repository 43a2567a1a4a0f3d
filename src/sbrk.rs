//! The memory provider adapter: a thin contract over an `sbrk`-style
//! primitive that extends the arena contiguously and reports the base of
//! the newly added region.
//!
//! This is the allocator's only external collaborator. Everything above
//! this module treats [`ArenaProvider`] as the whole of the operating
//! system; [`SbrkProvider`] is the one real implementation, backed by
//! `libc::sbrk`, and [`Heap`](crate::heap::Heap) is generic over the
//! trait so tests can swap in an in-process fake arena instead of
//! fighting the real, process-wide program break.

use crate::error::HeapError;
use libc::{c_void, intptr_t, sbrk};

/// Extends a contiguous, monotonically-growing arena.
pub trait ArenaProvider {
  /// Grows the arena by `bytes` and returns the address of the newly
  /// added region, which is contiguous with whatever this provider
  /// handed out before. Returns [`HeapError::ArenaExhausted`] if no more
  /// memory can be supplied.
  fn extend(&mut self, bytes: usize) -> Result<*mut u8, HeapError>;
}

/// An [`ArenaProvider`] backed by the real `sbrk(2)` system call.
#[derive(Debug, Default)]
pub struct SbrkProvider {
  _private: (),
}

impl SbrkProvider {
  pub fn new() -> Self {
    Self { _private: () }
  }
}

impl ArenaProvider for SbrkProvider {
  fn extend(&mut self, bytes: usize) -> Result<*mut u8, HeapError> {
    // sbrk(0) would merely report the break; every caller here wants to
    // grow it, so a zero-byte request is the caller's bug, not ours.
    debug_assert!(bytes > 0);

    let addr = unsafe { sbrk(bytes as intptr_t) };
    if addr == usize::MAX as *mut c_void {
      log::warn!("sbrk failed to extend the arena by {bytes} bytes");
      return Err(HeapError::ArenaExhausted);
    }

    Ok(addr as *mut u8)
  }
}

#[cfg(test)]
pub(crate) mod test_support {
  //! An in-process fake arena for deterministic, parallel-friendly unit
  //! tests. Backed by a `Box<[u8]>` allocated once up front; `extend`
  //! just bumps a cursor through it, so pointers stay stable for the
  //! fake's whole lifetime no matter how the `Heap` that owns it moves.

  use super::*;

  pub struct FakeArena {
    buf: Box<[u8]>,
    used: usize,
  }

  impl FakeArena {
    pub fn new(capacity: usize) -> Self {
      Self {
        buf: vec![0u8; capacity].into_boxed_slice(),
        used: 0,
      }
    }
  }

  impl ArenaProvider for FakeArena {
    fn extend(&mut self, bytes: usize) -> Result<*mut u8, HeapError> {
      if self.used + bytes > self.buf.len() {
        return Err(HeapError::ArenaExhausted);
      }
      let ptr = unsafe { self.buf.as_mut_ptr().add(self.used) };
      self.used += bytes;
      Ok(ptr)
    }
  }
}
