//! Three-level rank/select index.
//!
//! The index divides the bit sequence into three granularities:
//!
//! - **Basic blocks** of 512 bits (8 words): counted on the fly at query
//!   time, never stored.
//! - **Lower blocks** of 11 basic blocks (5632 bits): one 128-bit record per
//!   lower block. The top 18 bits hold the popcount of the enclosing upper
//!   block up to this lower block (L1); the low 110 bits Elias-Fano encode
//!   the ten cumulative basic-block counts inside the lower block (L2).
//! - **Upper blocks** of 46 lower blocks (259072 bits): one absolute 64-bit
//!   prefix sum per upper block (L0). The upper block is sized so L1 never
//!   overflows its 18 bits.
//!
//! An 18-bit L1 cannot address positions inside the ~2^32-bit windows select
//! wants to jump across, so select gets its own coarse layer: absolute
//! prefix sums at select-upper-block boundaries (few enough entries that a
//! linear scan wins) plus, per select upper block, the local record index of
//! every 8192nd set bit.
//!
//! `rank1` walks L0 -> L1 -> L2 -> word popcounts. `select1` walks the
//! coarse layer, jumps via the sample, scans records forward, scans the ten
//! L2 values, then finishes inside one basic block with popcounts and an
//! in-word select.
//!
//! The index never stores a pointer to the bits; every query takes the same
//! word slice the index was built from. Sizes assume a 64-bit target.

#[cfg(not(test))]
use alloc::vec::Vec;

use core::alloc::Layout;
use core::cmp;
use core::fmt;
use core::ptr::NonNull;

use crate::bitvec::BitVec;
use crate::broadword::bit_select;
use crate::elias_fano::{self, EF_TOTAL_BITS};
use crate::error::Error;
use crate::popcount::{popcount_word, popcount_words};
use crate::RankSelect;

/// Bits per basic block.
pub const BASIC_BLOCK_BITS: usize = 512;

/// Words per basic block.
const BASIC_BLOCK_WORDS: usize = BASIC_BLOCK_BITS / 64;

/// Elias-Fano-coded cumulative counts per record.
pub const N_L2: usize = elias_fano::N_L2;

/// Bits per lower block: the ten counted basic blocks plus the implicit
/// eleventh whose count lives only in the next record's L1.
pub const LOWER_BLOCK_BITS: usize = (N_L2 + 1) * BASIC_BLOCK_BITS;

/// Words per lower block.
const LOWER_BLOCK_WORDS: usize = LOWER_BLOCK_BITS / 64;

/// Maximum cumulative count a record's L2 entries can carry.
pub const L2_UNIVERSE: usize = elias_fano::L2_UNIVERSE as usize;

/// Bits of the per-record L1 counter.
const L1_BITS: usize = 128 - EF_TOTAL_BITS;

/// Bits per rank upper block: as many whole lower blocks as L1 can count.
pub const UPPER_BLOCK_BITS: usize = LOWER_BLOCK_BITS * ((1 << L1_BITS) / LOWER_BLOCK_BITS);

/// Lower blocks per rank upper block.
const LOWER_PER_UPPER: usize = UPPER_BLOCK_BITS / LOWER_BLOCK_BITS;

/// Bits per select upper block: the largest multiple of both the lower and
/// the rank upper block size that fits in 2^32.
pub const SELECT_UPPER_BLOCK_BITS: usize = 4_294_895_616;

/// Words per select upper block.
const SELECT_UPPER_BLOCK_WORDS: usize = SELECT_UPPER_BLOCK_BITS / 64;

/// Records per select upper block.
const L1L2_PER_SELECT_UPPER: usize = SELECT_UPPER_BLOCK_BITS / LOWER_BLOCK_BITS;

/// Set bits between select samples.
pub const SELECT_SAMPLE: usize = 8192;

/// Cache line size in bytes.
const CACHE_LINE_SIZE: usize = 64;

/// Cache-aligned storage for the 128-bit L1L2 records.
///
/// Queries load one whole record per lookup, so the array is allocated with
/// 64-byte alignment: four 16-byte records per cache line, and a record
/// never straddles two lines.
struct RecordArray {
    /// Pointer to the cache-aligned allocation.
    ptr: NonNull<u128>,
    /// Number of records.
    len: usize,
}

impl RecordArray {
    fn empty() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
        }
    }

    /// Move records into a cache-aligned allocation.
    fn try_from_vec(data: Vec<u128>) -> Result<Self, Error> {
        if data.is_empty() {
            return Ok(Self::empty());
        }

        let len = data.len();
        let layout =
            Layout::from_size_align(len * 16, CACHE_LINE_SIZE).map_err(|_| Error::OutOfMemory)?;

        // SAFETY: layout is valid (non-zero size, power-of-two alignment)
        let raw = unsafe { alloc::alloc::alloc(layout) as *mut u128 };
        let ptr = NonNull::new(raw).ok_or(Error::OutOfMemory)?;

        // SAFETY: ptr is valid and has enough space for len elements
        unsafe {
            core::ptr::copy_nonoverlapping(data.as_ptr(), raw, len);
        }

        Ok(Self { ptr, len })
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    #[inline]
    fn get(&self, idx: usize) -> u128 {
        debug_assert!(idx < self.len);
        self.as_slice()[idx]
    }

    #[inline]
    fn as_slice(&self) -> &[u128] {
        if self.len == 0 {
            &[]
        } else {
            // SAFETY: ptr is valid and points to len elements
            unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
        }
    }
}

impl Drop for RecordArray {
    fn drop(&mut self) {
        if self.len > 0 {
            let layout =
                Layout::from_size_align(self.len * 16, CACHE_LINE_SIZE).expect("layout error");
            // SAFETY: ptr was allocated with this layout
            unsafe {
                alloc::alloc::dealloc(self.ptr.as_ptr() as *mut u8, layout);
            }
        }
    }
}

impl Clone for RecordArray {
    fn clone(&self) -> Self {
        if self.len == 0 {
            return Self::empty();
        }

        let layout =
            Layout::from_size_align(self.len * 16, CACHE_LINE_SIZE).expect("layout error");
        // SAFETY: layout is valid
        let raw = unsafe { alloc::alloc::alloc(layout) as *mut u128 };
        if raw.is_null() {
            alloc::alloc::handle_alloc_error(layout);
        }
        // SAFETY: both pointers are valid for len elements
        unsafe {
            core::ptr::copy_nonoverlapping(self.ptr.as_ptr(), raw, self.len);
        }

        Self {
            ptr: NonNull::new(raw).unwrap(),
            len: self.len,
        }
    }
}

impl fmt::Debug for RecordArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordArray").field("len", &self.len).finish()
    }
}

// Safety: the records are owned and immutable after construction
unsafe impl Send for RecordArray {}
unsafe impl Sync for RecordArray {}

/// Succinct rank/select index over a static bit sequence.
///
/// Built once from a word slice; afterwards every structure is read-only, so
/// any number of threads may query concurrently. The index does not keep a
/// pointer to the bits: callers pass the same (unchanged) slice to each
/// query, and remain free to move the index independently of the buffer.
///
/// The slice must be 8-byte aligned (any `&[u64]` is) and padded so that
/// whole basic blocks can be read past the last logical bit;
/// [`BitVec`](crate::BitVec) provides that padding.
///
/// # Example
///
/// ```
/// use bitdex::{BitVec, RankSelectIndex};
///
/// let bv = BitVec::from_words(&[0b1011], 64).unwrap();
/// let index = RankSelectIndex::build(bv.words(), bv.len()).unwrap();
///
/// assert_eq!(index.rank1(bv.words(), 2), 2);
/// assert_eq!(index.select1(bv.words(), 3), 3);
/// ```
#[derive(Clone, Debug)]
pub struct RankSelectIndex {
    /// Absolute prefix sums at rank-upper-block boundaries.
    l0: Vec<u64>,
    /// One 128-bit record per lower block: L1 above the Elias-Fano payload.
    l1l2: RecordArray,
    /// Absolute prefix sums at select-upper-block boundaries.
    select_l0: Vec<u64>,
    /// Per select upper block: local record index of every SELECT_SAMPLE-th
    /// set bit. `[0]` for blocks without set bits.
    select_samples: Vec<Vec<u32>>,
    /// Logical length in bits.
    bits: usize,
    /// Total set bits.
    ones: usize,
    /// Number of lower blocks actually covering bits (excludes the trailing
    /// closeout record).
    lower_blocks: usize,
}

/// Allocate a zeroed `Vec`, surfacing allocation failure.
fn try_zeroed<T: Clone + Default>(len: usize) -> Result<Vec<T>, Error> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
    v.resize(len, T::default());
    Ok(v)
}

impl RankSelectIndex {
    /// Build the index over `bits` bits of `words` in one sequential pass.
    ///
    /// # Panics
    ///
    /// Panics if `bits == 0` or `words` is shorter than the padded basic
    /// block span (`ceil(bits / 512) * 8` words).
    pub fn build(words: &[u64], bits: usize) -> Result<Self, Error> {
        assert!(bits > 0, "cannot index an empty bit sequence");

        let num_basic = bits.div_ceil(BASIC_BLOCK_BITS);
        assert!(
            words.len() >= num_basic * BASIC_BLOCK_WORDS,
            "word buffer not padded to whole basic blocks: {} words for {} bits",
            words.len(),
            bits,
        );

        let bb_per_lower = N_L2 + 1;
        let bb_per_upper = UPPER_BLOCK_BITS / BASIC_BLOCK_BITS;
        let bb_per_select_upper = SELECT_UPPER_BLOCK_BITS / BASIC_BLOCK_BITS;

        // The record array carries one extra trailing record so that a rank
        // query at an exact lower-block boundary (including i == bits) reads
        // a real L1 value.
        let l1l2_len = bits / LOWER_BLOCK_BITS + 1;
        let l0_len = bits.div_ceil(UPPER_BLOCK_BITS) + 1;
        let select_blocks = bits.div_ceil(SELECT_UPPER_BLOCK_BITS);

        let mut l0: Vec<u64> = try_zeroed(l0_len)?;
        let mut select_l0: Vec<u64> = try_zeroed(select_blocks + 1)?;
        let mut records: Vec<u128> = try_zeroed(l1l2_len)?;

        let mut total = 0usize;
        let mut within_upper = 0usize;
        let mut within_lower = 0usize;
        let mut l2 = [0u32; N_L2];
        let mut l0_idx = 1usize;
        let mut select_idx = 1usize;
        let mut rec_idx = 0usize;

        for bb in 1..=num_basic {
            let start = (bb - 1) * BASIC_BLOCK_WORDS;
            let count = popcount_words(&words[start..start + BASIC_BLOCK_WORDS]) as usize;
            total += count;
            within_lower += count;

            // Slot k holds the cumulative count after basic block k+1; the
            // eleventh basic block has no slot of its own.
            let slot = bb % bb_per_lower;
            if slot > 0 {
                l2[slot - 1] = within_lower as u32;
            }

            if bb.is_multiple_of(bb_per_lower) {
                if !elias_fano::fits(&l2) {
                    return Err(Error::InvalidL2Sequence { record: rec_idx });
                }
                records[rec_idx] =
                    ((within_upper as u128) << EF_TOTAL_BITS) | elias_fano::encode(&l2);
                within_upper += within_lower;
                within_lower = 0;
                rec_idx += 1;
            }
            if bb.is_multiple_of(bb_per_upper) {
                l0[l0_idx] = total as u64;
                within_upper = 0;
                l0_idx += 1;
            }
            if bb.is_multiple_of(bb_per_select_upper) {
                select_l0[select_idx] = total as u64;
                select_idx += 1;
            }
        }

        // Close out the partial trailing blocks. Slots past the last counted
        // basic block are raised to the running count so the sequence stays
        // non-decreasing and decodes exactly for the slots that are queried.
        if l0_idx < l0.len() {
            l0[l0_idx] = total as u64;
        }
        if select_idx < select_l0.len() {
            select_l0[select_idx] = total as u64;
        }
        if rec_idx < records.len() {
            for slot in (num_basic % bb_per_lower)..N_L2 {
                l2[slot] = within_lower as u32;
            }
            if !elias_fano::fits(&l2) {
                return Err(Error::InvalidL2Sequence { record: rec_idx });
            }
            records[rec_idx] =
                ((within_upper as u128) << EF_TOTAL_BITS) | elias_fano::encode(&l2);
        }

        let select_samples = Self::build_select_samples(words, bits, &select_l0, select_blocks)?;

        Ok(Self {
            l0,
            l1l2: RecordArray::try_from_vec(records)?,
            select_l0,
            select_samples,
            bits,
            ones: total,
            lower_blocks: bits.div_ceil(LOWER_BLOCK_BITS),
        })
    }

    /// Per select upper block, record the local lower-block index of every
    /// SELECT_SAMPLE-th set bit.
    fn build_select_samples(
        words: &[u64],
        bits: usize,
        select_l0: &[u64],
        select_blocks: usize,
    ) -> Result<Vec<Vec<u32>>, Error> {
        let total_words = bits.div_ceil(64);
        let mut samples = Vec::new();
        samples
            .try_reserve_exact(select_blocks)
            .map_err(|_| Error::OutOfMemory)?;

        for block in 0..select_blocks {
            let block_ones = (select_l0[block + 1] - select_l0[block]) as usize;
            let mut bucket: Vec<u32> = Vec::new();
            bucket
                .try_reserve_exact(block_ones / SELECT_SAMPLE + 1)
                .map_err(|_| Error::OutOfMemory)?;

            let start = block * SELECT_UPPER_BLOCK_WORDS;
            let end = cmp::min(start + SELECT_UPPER_BLOCK_WORDS, total_words);
            let mut cum = 0usize;
            let mut next = 1usize;
            for (local, &word) in words[start..end].iter().enumerate() {
                cum += popcount_word(word) as usize;
                // SELECT_SAMPLE exceeds the 64 bits one word can add, so at
                // most one threshold falls in any word.
                if cum >= next {
                    bucket.push((local / LOWER_BLOCK_WORDS) as u32);
                    next += SELECT_SAMPLE;
                }
            }
            if bucket.is_empty() {
                bucket.push(0);
            }
            samples.push(bucket);
        }

        Ok(samples)
    }

    /// Logical length of the indexed bit sequence, in bits.
    #[inline]
    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Total number of set bits.
    #[inline]
    pub fn ones(&self) -> usize {
        self.ones
    }

    /// Bytes consumed by the index structures (the bit sequence itself is
    /// not owned and not counted).
    pub fn index_size_bytes(&self) -> usize {
        self.l0.len() * 8
            + self.l1l2.len() * 16
            + self.select_l0.len() * 8
            + self
                .select_samples
                .iter()
                .map(|bucket| bucket.len() * 4)
                .sum::<usize>()
    }

    /// Count set bits in positions `[0, i)`.
    ///
    /// `words` must be the slice the index was built over, and `i <= bits()`.
    #[inline]
    pub fn rank1(&self, words: &[u64], i: usize) -> usize {
        debug_assert!(i <= self.bits);

        let record = self.l1l2.get(i / LOWER_BLOCK_BITS);
        let mut rank = (record >> EF_TOTAL_BITS) as usize;
        rank += self.l0[i / UPPER_BLOCK_BITS] as usize;

        // Basic block index within the lower block, 0..=N_L2
        let in_lower = i % LOWER_BLOCK_BITS;
        let bb = in_lower / BASIC_BLOCK_BITS;
        if bb > 0 {
            rank += elias_fano::decode_at(record, bb - 1) as usize;
        }

        let word_base = (i / BASIC_BLOCK_BITS) * BASIC_BLOCK_WORDS;
        let in_block = i % BASIC_BLOCK_BITS;
        let full_words = in_block / 64;
        for k in 0..full_words {
            rank += popcount_word(words[word_base + k]) as usize;
        }
        let tail_bits = in_block % 64;
        if tail_bits > 0 {
            // Shift out everything at and above position i within the word
            rank += popcount_word(words[word_base + full_words] << (64 - tail_bits)) as usize;
        }
        rank
    }

    /// Count zero bits in positions `[0, i)`, plus one.
    ///
    /// This is deliberately `1 + (i - rank1(i))`, not `i - rank1(i)`:
    /// existing callers depend on the one-based form, so it is preserved
    /// bit-for-bit. Subtract one for the conventional zero-based count.
    #[inline]
    pub fn rank0(&self, words: &[u64], i: usize) -> usize {
        1 + (i - self.rank1(words, i))
    }

    /// Position (0-indexed) of the i-th set bit, with `1 <= i <= ones()`.
    ///
    /// `words` must be the slice the index was built over. Calling with
    /// `i == 0` or `i > ones()` is a contract violation; the result is
    /// unspecified.
    pub fn select1(&self, words: &[u64], i: usize) -> usize {
        debug_assert!(i >= 1 && i <= self.ones);

        // Coarse layer: few entries, linear scan beats binary search.
        let mut sel = 0usize;
        let select_blocks = self.select_samples.len();
        while sel + 1 < select_blocks && (self.select_l0[sel + 1] as usize) < i {
            sel += 1;
        }
        let base = self.select_l0[sel] as usize;
        let mut rank = i - base;

        // Sampled jump to a lower block at or before the target.
        let bucket = &self.select_samples[sel];
        let mut rec_idx =
            bucket[(rank - 1) / SELECT_SAMPLE] as usize + sel * L1L2_PER_SELECT_UPPER;

        // Walk records forward while the next one still starts below rank i.
        // L1 alone is not cumulative across upper blocks, so the absolute
        // rank at a record is L0 of its upper block plus its L1.
        let mut record_rank =
            self.l0[rec_idx / LOWER_PER_UPPER] as usize + self.record_l1(rec_idx);
        let limit = cmp::min(self.lower_blocks, (sel + 1) * L1L2_PER_SELECT_UPPER);
        while rec_idx + 1 < limit {
            let next_rank =
                self.l0[(rec_idx + 1) / LOWER_PER_UPPER] as usize + self.record_l1(rec_idx + 1);
            if next_rank >= i {
                break;
            }
            record_rank = next_rank;
            rec_idx += 1;
        }
        debug_assert!(record_rank < i);
        rank -= record_rank - base;

        // Scan the ten Elias-Fano counts for the basic block holding the bit.
        let record = self.l1l2.get(rec_idx);
        let mut prev_l2 = 0usize;
        let mut bb = 0usize;
        while bb < N_L2 {
            let l2 = elias_fano::decode_at(record, bb) as usize;
            if l2 >= rank {
                break;
            }
            prev_l2 = l2;
            bb += 1;
        }
        rank -= prev_l2;

        // Word scan inside the basic block; trailing padding words are zero
        // and contribute nothing.
        let mut word_idx = rec_idx * LOWER_BLOCK_WORDS + bb * BASIC_BLOCK_WORDS;
        loop {
            let count = popcount_word(words[word_idx]) as usize;
            if count >= rank {
                break;
            }
            rank -= count;
            word_idx += 1;
        }
        word_idx * 64 + bit_select(words[word_idx], (rank - 1) as u32) as usize
    }

    /// L1 field of a record: absolute within its upper block.
    #[inline(always)]
    fn record_l1(&self, rec_idx: usize) -> usize {
        (self.l1l2.get(rec_idx) >> EF_TOTAL_BITS) as usize
    }
}

/// A bit sequence paired with its index.
///
/// Owns both halves, so queries need no word-slice argument and the bits can
/// never drift out from under the index. Implements [`RankSelect`] with its
/// zero-indexed `select1`.
///
/// ```
/// use bitdex::{BitVec, IndexedBits, RankSelect};
///
/// let mut bv = BitVec::with_lower_block_padding(1000).unwrap();
/// for i in (0..1000).step_by(3) {
///     bv.set_bit(i);
/// }
/// let indexed = IndexedBits::build(bv).unwrap();
///
/// assert_eq!(indexed.rank1(10), 4);
/// assert_eq!(indexed.select1(4), Some(12));
/// ```
#[derive(Clone, Debug)]
pub struct IndexedBits {
    bits: BitVec,
    index: RankSelectIndex,
}

impl IndexedBits {
    /// Index a bit sequence, taking ownership of it.
    pub fn build(bits: BitVec) -> Result<Self, Error> {
        let index = RankSelectIndex::build(bits.words(), bits.len())?;
        Ok(Self { bits, index })
    }

    /// The underlying bit sequence.
    #[inline]
    pub fn bit_vec(&self) -> &BitVec {
        &self.bits
    }

    /// The underlying index.
    #[inline]
    pub fn index(&self) -> &RankSelectIndex {
        &self.index
    }

    /// Number of bits.
    #[inline]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Returns true if the sequence is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Total number of set bits.
    #[inline]
    pub fn ones(&self) -> usize {
        self.index.ones()
    }
}

impl RankSelect for IndexedBits {
    /// Count 1-bits in positions `[0, i)`.
    ///
    /// Returns `ones()` for any `i >= len()`.
    #[inline]
    fn rank1(&self, i: usize) -> usize {
        let i = cmp::min(i, self.bits.len());
        self.index.rank1(self.bits.words(), i)
    }

    /// Find position of the k-th 1-bit (0-indexed).
    #[inline]
    fn select1(&self, k: usize) -> Option<usize> {
        if k >= self.index.ones() {
            return None;
        }
        Some(self.index.select1(self.bits.words(), k + 1))
    }
}
