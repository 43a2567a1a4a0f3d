//! The allocator core: orchestrates `init`, `malloc`, `free`, and `realloc`
//! over a [`Heap`] - request normalization, the segregated-fit search, the
//! placer/splitter, and footerless coalescing.
//!
//! [`Heap`] is generic over [`ArenaProvider`] so the policy and
//! data-structure layer can be exercised against an in-process fake arena
//! in unit tests, independent of the one real, process-wide `sbrk` break.

use crate::block::{BlockRef, HEADER_SIZE, MIN_BLOCK_SIZE};
use crate::bucket::{NUM_BUCKETS, bucket_for_size};
use crate::error::HeapError;
use crate::freelist::{FreeList, ROOT_TABLE_BYTES};
use crate::sbrk::ArenaProvider;
use std::ptr;

/// Size of the first chunk obtained from the provider at `init` time, not
/// counting the bucket-root table.
const CHUNKSIZE: usize = 58176;

/// Fixed amount the heap grows by whenever a fit search comes up empty.
/// This is a throughput/utilization tuning knob, not something callers
/// need to adjust - spec-equivalent source left it a compile-time
/// constant, and so do we.
///
/// Because it's fixed rather than `max(EXTEND_SIZE, request)`, a single
/// allocation request larger than this amount can fail even though the
/// provider could in principle satisfy it across more than one
/// extension; see [`Heap::malloc`] and the `huge_request_exceeds_fixed_extension`
/// test below.
const EXTEND_SIZE: usize = 4400 * 8;

/// Requests in this open interval get rounded up to the next power of
/// two if they land within 1/8th of it, trading a little internal
/// fragmentation (the request is padded) for a lot less external
/// fragmentation (sizes near a boundary tend to recur at the boundary).
const ROUND_WINDOW: std::ops::Range<usize> = 101..500;

unsafe impl<P: ArenaProvider> Send for Heap<P> {}

/// A segregated-fit allocator over an arena obtained from `P`.
///
/// Must be initialized with [`Heap::init`] before any other call; every
/// other method assumes the bucket-root table and prologue/epilogue
/// sentinels are already laid out.
pub struct Heap<P: ArenaProvider> {
  provider: P,
  roots: *mut u8,
  free_list: FreeList,
}

impl<P: ArenaProvider> Heap<P> {
  /// Builds an uninitialized heap. Call [`Heap::init`] before using it.
  pub fn new(provider: P) -> Self {
    Self {
      provider,
      roots: ptr::null_mut(),
      free_list: FreeList::new(ptr::null_mut()),
    }
  }

  /// Lays out the bucket-root table and the initial prologue / free
  /// block / epilogue chain.
  pub fn init(&mut self) -> Result<(), HeapError> {
    let roots = self.provider.extend(ROOT_TABLE_BYTES)?;
    unsafe { ptr::write_bytes(roots, 0, ROOT_TABLE_BYTES) };
    self.roots = roots;
    self.free_list = FreeList::new(roots);

    let chunk = self.provider.extend(CHUNKSIZE).map_err(|_| HeapError::InitFailure)?;

    unsafe {
      let prologue = BlockRef(chunk);
      prologue.set_size_and_alloc(HEADER_SIZE, true);
      prologue.set_prev_size(0);

      let initial_free = prologue.next_block();
      let initial_size = (CHUNKSIZE - 2 * HEADER_SIZE) & !0x7;
      initial_free.set_size_and_alloc(initial_size, false);
      initial_free.set_prev_size(prologue.size());

      let epilogue = initial_free.next_block();
      epilogue.set_size_and_alloc(0, true);
      epilogue.set_prev_size(initial_free.size());

      self.free_list.insert(initial_free);
    }

    Ok(())
  }

  fn prologue(&self) -> BlockRef {
    debug_assert!(!self.roots.is_null(), "Heap::init must run before use");
    BlockRef(unsafe { self.roots.add(ROOT_TABLE_BYTES) })
  }

  /// Allocates a region of at least `size` usable bytes, 8-byte aligned.
  /// Returns a null pointer if the arena cannot be grown further, or if
  /// a fit still can't be found after one fixed-size extension.
  pub fn malloc(&mut self, size: usize) -> *mut u8 {
    if self.roots.is_null() {
      return ptr::null_mut();
    }

    let asize = Self::adjusted_size(size);
    log::trace!("malloc({size}) -> asize {asize}, bucket {}", bucket_for_size(asize));

    if let Some(block) = self.find_fit(asize) {
      return unsafe {
        self.place(block, asize);
        block.payload()
      };
    }

    match self.extend_heap(EXTEND_SIZE) {
      Some(block) if unsafe { block.size() } >= asize => unsafe {
        self.place(block, asize);
        block.payload()
      },
      Some(block) => {
        // The fixed extension amount wasn't enough for this request.
        // Rather than silently corrupting the heap by splitting a block
        // that's smaller than asize, report exhaustion - the extended
        // block is left in the free list, available to a smaller future
        // request.
        log::warn!(
          "extension of {EXTEND_SIZE} bytes ({} available) could not satisfy a {asize}-byte request",
          unsafe { block.size() }
        );
        ptr::null_mut()
      }
      None => {
        log::warn!("heap exhausted: could not extend arena for a {asize}-byte request");
        ptr::null_mut()
      }
    }
  }

  /// Releases a block previously returned by `malloc`/`realloc`, then
  /// coalesces it with any free neighbors.
  ///
  /// # Safety
  /// `ptr` must have been returned by a prior `malloc`/`realloc` call on
  /// this heap and not already freed.
  pub unsafe fn free(&mut self, ptr: *mut u8) {
    if ptr.is_null() {
      return;
    }
    unsafe {
      let block = BlockRef::from_payload(ptr);
      block.mark_free();
      self.coalesce(block);
    }
  }

  /// Equivalent to `malloc(new_size)` followed by copying
  /// `min(new_size, old_size)` bytes and freeing the original block.
  ///
  /// # Safety
  /// `ptr` must have been returned by a prior `malloc`/`realloc` call on
  /// this heap and not already freed.
  pub unsafe fn realloc(&mut self, ptr: *mut u8, new_size: usize) -> *mut u8 {
    let new_ptr = self.malloc(new_size);
    if new_ptr.is_null() {
      return ptr::null_mut();
    }

    unsafe {
      let old_block = BlockRef::from_payload(ptr);
      let copy_len = old_block.size().min(new_size);
      ptr::copy_nonoverlapping(ptr, new_ptr, copy_len);
      self.free(ptr);
    }

    new_ptr
  }

  /// Rounds a raw request up to an aligned, header-inclusive block size.
  fn adjusted_size(raw: usize) -> usize {
    let rounded = Self::round_near_power_of_two(raw);
    let with_header = (rounded + HEADER_SIZE + 7) & !0x7;
    with_header.max(MIN_BLOCK_SIZE)
  }

  /// Requests in (100, 500) within 1/8 of the next power of two round up
  /// to it, pre-empting the fragmentation that recurring near-boundary
  /// sizes would otherwise cause.
  fn round_near_power_of_two(size: usize) -> usize {
    if ROUND_WINDOW.contains(&size) {
      let next_pow2 = size.next_power_of_two();
      if size >= next_pow2 - next_pow2 / 8 {
        return next_pow2;
      }
    }
    size
  }

  /// First-fit search with bucket striding: walks the target bucket's
  /// list first, then strides through larger buckets. For a near-empty
  /// heap or a jumbo request, searches from the largest bucket down
  /// instead, since big free blocks only ever live in the top buckets.
  fn find_fit(&self, asize: usize) -> Option<BlockRef> {
    if self.free_list.free_count() == 0 {
      return None;
    }

    let bucket = bucket_for_size(asize);

    if self.free_list.free_count() == 1 || bucket >= 44 {
      for b in (bucket..NUM_BUCKETS).rev() {
        let candidate = self.free_list.root(b);
        if !candidate.is_null() && unsafe { candidate.size() } >= asize {
          return Some(candidate);
        }
      }
      return None;
    }

    let mut candidate = self.free_list.root(bucket);
    while !candidate.is_null() {
      if unsafe { candidate.size() } >= asize {
        return Some(candidate);
      }
      candidate = unsafe { candidate.next_free() };
    }

    for b in (bucket + 1)..NUM_BUCKETS {
      let candidate = self.free_list.root(b);
      if !candidate.is_null() {
        return Some(candidate);
      }
    }

    None
  }

  /// Commits `asize` bytes of `block` to an allocation, splitting off a
  /// trailing free fragment when the remainder still meets
  /// `MIN_BLOCK_SIZE`.
  ///
  /// # Safety
  /// `block` must currently be a member of the free list and
  /// `asize <= block.size()`.
  unsafe fn place(&mut self, block: BlockRef, asize: usize) {
    unsafe {
      let original_size = block.size();
      self.free_list.remove(block);

      let remainder = original_size - asize;
      if remainder < MIN_BLOCK_SIZE {
        block.mark_allocated();
        return;
      }

      block.set_size_and_alloc(asize, true);

      let fragment = block.next_block();
      fragment.set_size_and_alloc(remainder, false);
      fragment.set_prev_size(asize);

      let after_fragment = fragment.next_block();
      after_fragment.set_prev_size(remainder);

      self.free_list.insert(fragment);
    }
  }

  /// Merges `block` (just freed, or the remnant of an old epilogue) with
  /// whichever of its address-adjacent neighbors are currently free, and
  /// inserts the result into the free list.
  ///
  /// # Safety
  /// `block`'s allocation bit must already reflect its post-free state
  /// (cleared); its neighbors must be valid blocks (guaranteed by the
  /// prologue/epilogue sentinels).
  unsafe fn coalesce(&mut self, block: BlockRef) -> BlockRef {
    unsafe {
      let next = block.next_block();
      let prev = block.prev_block();
      let next_is_free = !next.is_allocated();
      let prev_is_free = !prev.is_allocated();

      let merged = match (prev_is_free, next_is_free) {
        (false, false) => block,
        (false, true) => {
          self.free_list.remove(next);
          let merged_size = block.size() + next.size();
          block.set_size_and_alloc(merged_size, false);
          block.next_block().set_prev_size(merged_size);
          block
        }
        (true, false) => {
          self.free_list.remove(prev);
          let merged_size = prev.size() + block.size();
          prev.set_size_and_alloc(merged_size, false);
          next.set_prev_size(merged_size);
          prev
        }
        (true, true) => {
          let after = next.next_block();
          self.free_list.remove(next);
          self.free_list.remove(prev);
          let merged_size = prev.size() + block.size() + next.size();
          prev.set_size_and_alloc(merged_size, false);
          after.set_prev_size(merged_size);
          prev
        }
      };

      self.free_list.insert(merged);
      merged
    }
  }

  /// Grows the arena by `bytes` (rounded up to a multiple of 8), relays
  /// out the epilogue, and coalesces the new free block with the old
  /// tail if it was free. Returns the (possibly coalesced) free block.
  fn extend_heap(&mut self, bytes: usize) -> Option<BlockRef> {
    let bytes = (bytes + 7) & !0x7;
    let raw = self.provider.extend(bytes).ok()?;

    unsafe {
      // The new region starts exactly where the old epilogue's header
      // was; reclaim those 8 bytes into the new free block.
      let block = BlockRef(raw.sub(HEADER_SIZE));
      block.set_size_and_alloc(bytes, false);

      let epilogue = block.next_block();
      epilogue.set_size_and_alloc(0, true);
      epilogue.set_prev_size(bytes);

      Some(self.coalesce(block))
    }
  }
}

#[cfg(test)]
impl<P: ArenaProvider> Heap<P> {
  /// Walks the block chain from the prologue to the epilogue, returning
  /// every block's [`BlockRef`] including both sentinels.
  /// Test-only: this is the diagnostic heap-walk spec non-goals exclude
  /// as a shipped feature, kept here purely to assert invariants.
  fn walk(&self) -> Vec<BlockRef> {
    let mut out = Vec::new();
    let mut current = self.prologue();
    loop {
      let size = unsafe { current.size() };
      out.push(current);
      if size == 0 {
        break;
      }
      current = unsafe { current.next_block() };
    }
    out
  }

  fn free_block_sizes(&self) -> Vec<usize> {
    self
      .walk()
      .into_iter()
      .filter(|&block| !unsafe { block.is_allocated() })
      .map(|block| unsafe { block.size() })
      .collect()
  }

  /// Asserts every testable property from spec.md §8 holds for the
  /// current heap: coverage (the walk terminates at the epilogue),
  /// linkage consistency (`prev_block_size` matches the predecessor's
  /// actual size), no adjacent free blocks, and free-list soundness
  /// (every bucket-reachable block is free, classified under its
  /// current size's bucket, and `free_count` matches the total
  /// reachable count).
  fn assert_heap_consistent(&self) {
    let blocks = self.walk();
    assert_eq!(
      blocks.last().map(|&b| unsafe { b.size() }),
      Some(0),
      "epilogue must terminate the walk"
    );

    let mut prev_was_free = false;
    let mut prev_block: Option<BlockRef> = None;
    for &block in &blocks {
      let allocated = unsafe { block.is_allocated() };

      if let Some(prev) = prev_block {
        assert_eq!(
          unsafe { block.prev_size() },
          unsafe { prev.size() },
          "prev_block_size must match the predecessor's actual size"
        );
      }

      if !allocated && prev_was_free {
        panic!("two adjacent free blocks survived coalescing");
      }

      prev_was_free = !allocated;
      prev_block = Some(block);
    }

    let walked_free: std::collections::HashSet<*mut u8> = blocks
      .iter()
      .filter(|&&block| !unsafe { block.is_allocated() })
      .map(|&block| block.0)
      .collect();

    let mut reachable = 0usize;
    for bucket in 0..NUM_BUCKETS {
      let mut current = self.free_list.root(bucket);
      while !current.is_null() {
        assert!(
          !unsafe { current.is_allocated() },
          "bucket {bucket} contains an allocated block"
        );
        assert_eq!(
          bucket_for_size(unsafe { current.size() }),
          bucket,
          "block of size {} is misclassified into bucket {bucket}",
          unsafe { current.size() }
        );
        assert!(
          walked_free.contains(&current.0),
          "bucket {bucket} references a block not reachable from the prologue/epilogue walk"
        );
        reachable += 1;
        current = unsafe { current.next_free() };
      }
    }

    assert_eq!(
      reachable,
      self.free_list.free_count(),
      "free_count must equal the total reachable count across all buckets"
    );
  }
}
