//! # Bitdex
//!
//! A succinct rank/select index over static bit sequences.
//!
//! Given an immutable bit sequence stored as 64-bit words, the index answers
//! two queries in constant time:
//!
//! - `rank1(i)` — the number of set bits in positions `[0, i)`
//! - `select1(i)` — the position of the i-th set bit (1-indexed)
//!
//! The index keeps a three-level counting hierarchy next to the bits: an
//! absolute prefix-sum layer, one 128-bit record per 5632-bit block that packs
//! an 18-bit relative count together with ten Elias-Fano-coded intra-block
//! counts, and a coarse sampled layer that accelerates select. Space overhead
//! is about 2.4% of the bit sequence.
//!
//! ## Quick Start
//!
//! ```
//! use bitdex::{BitVec, IndexedBits, RankSelect};
//!
//! let mut bv = BitVec::with_lower_block_padding(128).unwrap();
//! bv.set_bit(3);
//! bv.set_bit(64);
//!
//! let indexed = IndexedBits::build(bv).unwrap();
//! assert_eq!(indexed.rank1(4), 1);
//! assert_eq!(indexed.select1(1), Some(64));
//! ```
//!
//! The raw [`RankSelectIndex`] does not store a pointer to the bits; callers
//! that manage their own buffers pass the same word slice to every query.
//!
//! ## Features
//!
//! Popcount strategies (mutually exclusive, for benchmarking):
//! - Default: Uses Rust's `count_ones()` which auto-vectorizes
//! - `simd` - Use explicit SIMD intrinsics (NEON on ARM, AVX-512 on x86)
//! - `portable-popcount` - Use portable bitwise algorithm (no intrinsics)
//!
//! Other features:
//! - `std` (default) - Runtime CPU feature detection, `std::error::Error`
//! - `cli` - The `bitdex` benchmark binary

// Use no_std unless std feature is enabled or we're in test mode
#![cfg_attr(not(any(test, feature = "std")), no_std)]

// When using no_std, we need to explicitly link the alloc crate
#[cfg(not(any(test, feature = "std")))]
extern crate alloc;

// When using std, re-export alloc types from std for compatibility
#[cfg(any(test, feature = "std"))]
extern crate std as alloc;

mod bitvec;
mod broadword;
pub mod elias_fano;
mod error;
pub mod index;
mod popcount;

pub use bitvec::BitVec;
pub use broadword::{bit_select, select_in_word};
pub use error::Error;
pub use index::{IndexedBits, RankSelectIndex};
pub use popcount::{popcount_word, popcount_words};

/// Trait for rank/select operations on bitvectors.
///
/// Rank and select are fundamental operations for succinct data structures:
/// - `rank1(i)`: Count 1-bits in positions `[0, i)`
/// - `select1(k)`: Find position of the k-th 1-bit (0-indexed)
///
/// `rank0` is deliberately not part of the trait; see
/// [`RankSelectIndex::rank0`](crate::index::RankSelectIndex::rank0) for its
/// one-based contract.
pub trait RankSelect {
    /// Count 1-bits in positions `[0, i)`.
    ///
    /// Returns 0 if `i == 0`.
    fn rank1(&self, i: usize) -> usize;

    /// Find position of the k-th 1-bit (0-indexed).
    ///
    /// Returns `None` if fewer than `k+1` ones exist.
    fn select1(&self, k: usize) -> Option<usize>;
}
