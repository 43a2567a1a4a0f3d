//! Size-class map: a pure function from a block size to one of
//! [`NUM_BUCKETS`] segregated free-list indices.
//!
//! The mapping is piecewise:
//!
//! - Below 1024, classes follow powers of two (32, 64, 128, 256, 512,
//!   1024), so a request just over a power of two costs at most that
//!   power's worth of internal fragmentation.
//! - At and above 1024, classes are an arithmetic progression with a
//!   stride of 800 bytes, keeping the bucket count bounded instead of
//!   doubling forever.
//!
//! The arithmetic is the single source of truth for bucket boundaries.
//! (An earlier write-up of this scheme described class 7 as covering
//! 2625..3424, skipping 1825..2624 - that was never what the formula
//! below computes; the classes are contiguous 800-wide spans starting
//! at 1025. Trust the code, not old comments about it.)

/// Number of segregated size classes.
pub const NUM_BUCKETS: usize = 47;

const ARITH_THRESHOLD: usize = 1024;
const ARITH_STRIDE: usize = 800;
const ARITH_ROUND: usize = 575; // ARITH_STRIDE - 225, rounds the division up
const ARITH_BASE: usize = 4;

/// Maps a block size to its segregated free-list bucket.
pub fn bucket_for_size(size: usize) -> usize {
  if size >= ARITH_THRESHOLD {
    let class = (size + ARITH_ROUND) / ARITH_STRIDE + ARITH_BASE;
    return class.min(NUM_BUCKETS - 1);
  }

  match size.max(32).next_power_of_two() {
    32 => 0,
    64 => 1,
    128 => 2,
    256 => 3,
    512 => 4,
    1024 => 5,
    _ => NUM_BUCKETS - 1,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn small_sizes_clamp_to_class_zero() {
    assert_eq!(bucket_for_size(1), 0);
    assert_eq!(bucket_for_size(24), 0);
    assert_eq!(bucket_for_size(32), 0);
  }

  #[test]
  fn power_of_two_boundaries() {
    assert_eq!(bucket_for_size(33), 1);
    assert_eq!(bucket_for_size(64), 1);
    assert_eq!(bucket_for_size(65), 2);
    assert_eq!(bucket_for_size(128), 2);
    assert_eq!(bucket_for_size(129), 3);
    assert_eq!(bucket_for_size(256), 3);
    assert_eq!(bucket_for_size(257), 4);
    assert_eq!(bucket_for_size(512), 4);
    assert_eq!(bucket_for_size(513), 5);
    assert_eq!(bucket_for_size(1023), 5);
  }

  #[test]
  fn arithmetic_region_is_contiguous_800_wide_spans() {
    // Class 6 covers 1025..1824, class 7 covers 1825..2624, etc. - a
    // contiguous run, regardless of what any stale comment claims.
    assert_eq!(bucket_for_size(1024), 5);
    assert_eq!(bucket_for_size(1025), 6);
    assert_eq!(bucket_for_size(1824), 6);
    assert_eq!(bucket_for_size(1825), 7);
    assert_eq!(bucket_for_size(2624), 7);
    assert_eq!(bucket_for_size(2625), 8);
  }

  #[test]
  fn huge_sizes_clamp_to_the_last_bucket() {
    assert_eq!(bucket_for_size(10_000_000), NUM_BUCKETS - 1);
  }

  #[test]
  fn bucket_boundaries_are_monotonic() {
    let mut prev = bucket_for_size(1);
    for size in 1..20_000 {
      let b = bucket_for_size(size);
      assert!(b >= prev, "bucket_for_size regressed at size {size}");
      prev = b;
    }
  }
}
