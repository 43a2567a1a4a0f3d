//! Error kinds surfaced by the allocator's fallible seams.
//!
//! The public `malloc`/`realloc`/`init` functions still speak the C-shaped
//! contract (null pointer, `-1`) that the rest of this crate's external
//! interface matches. `HeapError` exists one layer down, at the arena
//! provider and `Heap::init` boundary, so that failure paths are testable
//! and `match`-able instead of being bare sentinel values.

use thiserror::Error;

/// Failure modes the allocator can encounter while growing or
/// initializing its arena.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
  /// The memory provider refused to extend the arena further.
  #[error("memory provider failed to extend the arena")]
  ArenaExhausted,
  /// The memory provider could not supply the initial chunk during
  /// `init`.
  #[error("memory provider could not supply the initial heap chunk")]
  InitFailure,
}
