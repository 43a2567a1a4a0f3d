//! Block header encoding and address arithmetic.
//!
//! Every block in the arena begins with an 8-byte header: a `block_size`
//! word (size in bytes, low 3 bits used as flags, bit 0 = allocated) and a
//! `prev_block_size` word (the size of the block immediately preceding this
//! one in address order). There are no footers; a block's neighbors are
//! found purely by address arithmetic on these two fields.
//!
//! A free block additionally stores `next`/`prev` free-list pointers in the
//! first 16 bytes of its own payload. Those bytes are only meaningful while
//! the block is free; once allocated they belong to the caller.
//!
//! `BlockRef` is a thin handle over a raw address into the arena. None of
//! its accessors are safe on their own terms - the arena is untyped memory
//! owned by the allocator, not a Rust-checked structure - so every method is
//! `unsafe` and callers are expected to uphold the block-layout invariants
//! themselves.

use std::ptr;

/// Size in bytes of the in-band header (`block_size` + `prev_block_size`).
pub const HEADER_SIZE: usize = 8;

/// Smallest block that can ever exist in the free list: header (8) plus
/// the `next`/`prev` free-list pointer pair (16), already 8-byte aligned.
pub const MIN_BLOCK_SIZE: usize = 24;

const ALLOC_BIT: u32 = 0x1;
const SIZE_MASK: u32 = !0x7;

/// A handle to a block header somewhere in the arena.
///
/// Two `BlockRef`s are equal iff they point at the same header address.
/// A null `BlockRef` represents "no block" (an empty free-list slot, or a
/// free block with no predecessor/successor).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlockRef(pub *mut u8);

impl BlockRef {
  /// The null block reference, used for empty free-list links.
  pub const NULL: BlockRef = BlockRef(ptr::null_mut());

  #[inline]
  pub fn is_null(self) -> bool {
    self.0.is_null()
  }

  fn header_words(self) -> *mut u32 {
    self.0 as *mut u32
  }

  /// Total byte size of this block (header + payload), with the
  /// allocation flag masked out.
  ///
  /// # Safety
  /// `self` must point at a valid, live block header.
  #[inline]
  pub unsafe fn size(self) -> usize {
    unsafe { (*self.header_words() & SIZE_MASK) as usize }
  }

  /// # Safety
  /// `self` must point at a valid, live block header.
  #[inline]
  pub unsafe fn is_allocated(self) -> bool {
    unsafe { *self.header_words() & ALLOC_BIT != 0 }
  }

  /// Overwrites this block's size and allocation bit.
  ///
  /// # Safety
  /// `self` must point at a valid block header; `size` must already be a
  /// multiple of 8.
  #[inline]
  pub unsafe fn set_size_and_alloc(self, size: usize, allocated: bool) {
    let flag = if allocated { ALLOC_BIT } else { 0 };
    unsafe {
      *self.header_words() = size as u32 | flag;
    }
  }

  /// Sets the allocation bit without touching the size.
  ///
  /// # Safety
  /// `self` must point at a valid block header.
  #[inline]
  pub unsafe fn mark_allocated(self) {
    unsafe {
      let raw = *self.header_words();
      *self.header_words() = raw | ALLOC_BIT;
    }
  }

  /// Clears the allocation bit without touching the size.
  ///
  /// # Safety
  /// `self` must point at a valid block header.
  #[inline]
  pub unsafe fn mark_free(self) {
    unsafe {
      let raw = *self.header_words();
      *self.header_words() = raw & SIZE_MASK;
    }
  }

  /// Size of the block immediately before this one in address order.
  ///
  /// # Safety
  /// `self` must point at a valid block header.
  #[inline]
  pub unsafe fn prev_size(self) -> usize {
    unsafe { *self.header_words().add(1) as usize }
  }

  /// # Safety
  /// `self` must point at a valid block header.
  #[inline]
  pub unsafe fn set_prev_size(self, size: usize) {
    unsafe {
      *self.header_words().add(1) = size as u32;
    }
  }

  /// Address of the first usable payload byte, just past the header.
  ///
  /// # Safety
  /// `self` must point at a valid block header.
  #[inline]
  pub unsafe fn payload(self) -> *mut u8 {
    unsafe { self.0.add(HEADER_SIZE) }
  }

  /// Recovers the block header from a payload pointer previously handed
  /// out by the allocator.
  ///
  /// # Safety
  /// `payload` must have been returned by a prior allocation from this
  /// arena and not already freed.
  #[inline]
  pub unsafe fn from_payload(payload: *mut u8) -> BlockRef {
    unsafe { BlockRef(payload.sub(HEADER_SIZE)) }
  }

  /// The block immediately following this one in address order.
  ///
  /// # Safety
  /// `self` must point at a valid block header whose `size` field is
  /// already set; the block walked to must lie within the arena (callers
  /// rely on the epilogue sentinel to guarantee this).
  #[inline]
  pub unsafe fn next_block(self) -> BlockRef {
    unsafe { BlockRef(self.0.add(self.size())) }
  }

  /// The block immediately preceding this one in address order.
  ///
  /// # Safety
  /// `self` must point at a valid block header whose `prev_size` field is
  /// already set; relies on the prologue sentinel to guarantee the result
  /// lies within the arena.
  #[inline]
  pub unsafe fn prev_block(self) -> BlockRef {
    unsafe { BlockRef(self.0.sub(self.prev_size())) }
  }

  // Free-list link pointers. Only valid while the block is free; they
  // alias the first 16 bytes of payload.

  unsafe fn link_slot(self, byte_offset: usize) -> *mut *mut u8 {
    unsafe { self.payload().add(byte_offset) as *mut *mut u8 }
  }

  /// # Safety
  /// `self` must be a free block (its link pointers must be live).
  #[inline]
  pub unsafe fn next_free(self) -> BlockRef {
    unsafe { BlockRef(*self.link_slot(0)) }
  }

  /// # Safety
  /// `self` must be a free block.
  #[inline]
  pub unsafe fn set_next_free(self, block: BlockRef) {
    unsafe {
      *self.link_slot(0) = block.0;
    }
  }

  /// # Safety
  /// `self` must be a free block.
  #[inline]
  pub unsafe fn prev_free(self) -> BlockRef {
    unsafe { BlockRef(*self.link_slot(8)) }
  }

  /// # Safety
  /// `self` must be a free block.
  #[inline]
  pub unsafe fn set_prev_free(self, block: BlockRef) {
    unsafe {
      *self.link_slot(8) = block.0;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  // A standalone buffer big enough to hold a few blocks, used to exercise
  // the header bit-packing and free-list links without touching sbrk.
  fn scratch(bytes: usize) -> Box<[u8]> {
    vec![0u8; bytes].into_boxed_slice()
  }

  #[test]
  fn size_and_alloc_bit_round_trip() {
    let mut buf = scratch(64);
    let block = BlockRef(buf.as_mut_ptr());

    unsafe {
      block.set_size_and_alloc(32, false);
      assert_eq!(block.size(), 32);
      assert!(!block.is_allocated());

      block.mark_allocated();
      assert_eq!(block.size(), 32);
      assert!(block.is_allocated());

      block.mark_free();
      assert_eq!(block.size(), 32);
      assert!(!block.is_allocated());
    }
  }

  #[test]
  fn prev_size_round_trip() {
    let mut buf = scratch(32);
    let block = BlockRef(buf.as_mut_ptr());
    unsafe {
      block.set_prev_size(24);
      assert_eq!(block.prev_size(), 24);
    }
  }

  #[test]
  fn neighbor_walk_matches_size_arithmetic() {
    let mut buf = scratch(96);
    let base = buf.as_mut_ptr();
    let a = BlockRef(base);
    let b = BlockRef(unsafe { base.add(32) });

    unsafe {
      a.set_size_and_alloc(32, true);
      b.set_prev_size(32);
      assert_eq!(a.next_block(), b);
      assert_eq!(b.prev_block(), a);
    }
  }

  #[test]
  fn free_list_links_round_trip() {
    let mut buf = scratch(64);
    let block = BlockRef(buf.as_mut_ptr());
    unsafe {
      block.set_size_and_alloc(32, false);
      block.set_next_free(BlockRef::NULL);
      block.set_prev_free(BlockRef::NULL);
      assert!(block.next_free().is_null());
      assert!(block.prev_free().is_null());

      let other = BlockRef(buf.as_mut_ptr()); // same address, fine for link check
      block.set_next_free(other);
      assert_eq!(block.next_free(), other);
    }
  }

  #[test]
  fn payload_roundtrips_to_header() {
    let mut buf = scratch(32);
    let block = BlockRef(buf.as_mut_ptr());
    unsafe {
      let payload = block.payload();
      assert_eq!(BlockRef::from_payload(payload), block);
    }
  }
}
