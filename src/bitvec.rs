//! Aligned, padded bit-vector container.
//!
//! [`BitVec`] owns the raw bit sequence the index is built over. The index
//! performs aligned 8-word loads over whole basic blocks, so the buffer is
//! 64-byte aligned and padded to a caller-specified bit multiple (one lower
//! block, 5632 bits, by default). Padding bits are zero and stay zero: only
//! `set_bit` within `len()` can flip bits.
//!
//! The container is mutable; the index built from it is not. Callers set
//! bits first, then build, and must not touch the bits while an index over
//! them is in use.

use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;
use core::slice;

use crate::error::Error;
use crate::index::LOWER_BLOCK_BITS;
use crate::popcount::popcount_words;

/// Buffer alignment in bytes. One cache line, and wide enough for any load
/// the query paths issue.
const BUFFER_ALIGN: usize = 64;

/// A 64-byte-aligned, zero-initialized bit buffer.
///
/// Bits are stored little-endian within each word: bit `i` lives at word
/// `i / 64`, position `i % 64`.
pub struct BitVec {
    /// Pointer to the aligned allocation; dangling when `words == 0`.
    ptr: NonNull<u64>,
    /// Allocated length in words (logical length rounded up to the pad
    /// multiple).
    words: usize,
    /// Logical length in bits.
    bits: usize,
}

impl BitVec {
    /// Allocate a zeroed buffer for `bits` bits, padded up to a multiple of
    /// `pad_multiple_bits`.
    ///
    /// `pad_multiple_bits` must be a positive multiple of 64. Returns
    /// [`Error::OutOfMemory`] if the allocation fails.
    pub fn new(bits: usize, pad_multiple_bits: usize) -> Result<Self, Error> {
        assert!(
            pad_multiple_bits > 0 && pad_multiple_bits.is_multiple_of(64),
            "pad multiple must be a positive multiple of 64 bits"
        );

        let pad_words = pad_multiple_bits / 64;
        let words = bits.div_ceil(64).div_ceil(pad_words) * pad_words;
        if words == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                words: 0,
                bits: 0,
            });
        }

        let layout =
            Layout::from_size_align(words * 8, BUFFER_ALIGN).map_err(|_| Error::OutOfMemory)?;
        // SAFETY: layout has non-zero size and power-of-two alignment.
        let raw = unsafe { alloc::alloc::alloc_zeroed(layout) as *mut u64 };
        let ptr = NonNull::new(raw).ok_or(Error::OutOfMemory)?;

        Ok(Self { ptr, words, bits })
    }

    /// Allocate a buffer padded to whole lower blocks (5632 bits), the
    /// padding the index requires.
    pub fn with_lower_block_padding(bits: usize) -> Result<Self, Error> {
        Self::new(bits, LOWER_BLOCK_BITS)
    }

    /// Copy raw words into a fresh aligned buffer of `bits` bits with the
    /// default lower-block padding.
    ///
    /// Bits at positions `>= bits` are cleared, so the source may carry
    /// garbage in its final partial word.
    ///
    /// # Panics
    ///
    /// Panics if `bits > words.len() * 64`.
    pub fn from_words(words: &[u64], bits: usize) -> Result<Self, Error> {
        assert!(
            bits <= words.len().saturating_mul(64),
            "len {} exceeds capacity {}",
            bits,
            words.len().saturating_mul(64)
        );

        let mut bv = Self::with_lower_block_padding(bits)?;
        let used = bits.div_ceil(64);
        bv.words_mut()[..used].copy_from_slice(&words[..used]);

        // Clear bits beyond the logical length
        let tail = bits % 64;
        if tail > 0 {
            bv.words_mut()[used - 1] &= (1u64 << tail) - 1;
        }
        Ok(bv)
    }

    /// Number of bits in the bitvector.
    #[inline]
    pub fn len(&self) -> usize {
        self.bits
    }

    /// Returns true if the bitvector is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Number of allocated 64-bit words, padding included.
    #[inline]
    pub fn word_count(&self) -> usize {
        self.words
    }

    /// Set the bit at position `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= len`.
    #[inline]
    pub fn set_bit(&mut self, i: usize) {
        assert!(i < self.bits, "index {} out of bounds (len={})", i, self.bits);
        self.words_mut()[i / 64] |= 1u64 << (i % 64);
    }

    /// Access the bit at position `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= len`.
    #[inline]
    pub fn get_bit(&self, i: usize) -> bool {
        assert!(i < self.bits, "index {} out of bounds (len={})", i, self.bits);
        (self.words()[i / 64] >> (i % 64)) & 1 == 1
    }

    /// Total number of 1-bits.
    pub fn count_ones(&self) -> usize {
        popcount_words(self.words()) as usize
    }

    /// All words, padding included.
    #[inline]
    pub fn words(&self) -> &[u64] {
        if self.words == 0 {
            &[]
        } else {
            // SAFETY: ptr is valid for words elements while self lives.
            unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.words) }
        }
    }

    #[inline]
    fn words_mut(&mut self) -> &mut [u64] {
        if self.words == 0 {
            &mut []
        } else {
            // SAFETY: ptr is valid and uniquely borrowed through &mut self.
            unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.words) }
        }
    }

    fn layout(&self) -> Layout {
        // The constructor validated this exact layout.
        Layout::from_size_align(self.words * 8, BUFFER_ALIGN).expect("layout error")
    }
}

impl Drop for BitVec {
    fn drop(&mut self) {
        if self.words > 0 {
            // SAFETY: ptr was allocated with this layout.
            unsafe {
                alloc::alloc::dealloc(self.ptr.as_ptr() as *mut u8, self.layout());
            }
        }
    }
}

impl Clone for BitVec {
    fn clone(&self) -> Self {
        if self.words == 0 {
            return Self {
                ptr: NonNull::dangling(),
                words: 0,
                bits: 0,
            };
        }

        let layout = self.layout();
        // SAFETY: layout is valid (checked at construction).
        let raw = unsafe { alloc::alloc::alloc(layout) as *mut u64 };
        if raw.is_null() {
            alloc::alloc::handle_alloc_error(layout);
        }
        // SAFETY: both buffers hold self.words elements.
        unsafe {
            core::ptr::copy_nonoverlapping(self.ptr.as_ptr(), raw, self.words);
        }

        Self {
            ptr: NonNull::new(raw).unwrap(),
            words: self.words,
            bits: self.bits,
        }
    }
}

impl fmt::Debug for BitVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitVec")
            .field("bits", &self.bits)
            .field("words", &self.words)
            .finish()
    }
}

// Safety: the allocation is owned and only mutated through &mut self.
unsafe impl Send for BitVec {}
unsafe impl Sync for BitVec {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let bv = BitVec::new(0, LOWER_BLOCK_BITS).unwrap();
        assert_eq!(bv.len(), 0);
        assert_eq!(bv.word_count(), 0);
        assert!(bv.is_empty());
        assert!(bv.words().is_empty());
    }

    #[test]
    fn test_padding_rounds_up_to_lower_block() {
        // 1 bit still allocates a whole lower block of words
        let bv = BitVec::with_lower_block_padding(1).unwrap();
        assert_eq!(bv.word_count(), LOWER_BLOCK_BITS / 64);

        let bv = BitVec::with_lower_block_padding(LOWER_BLOCK_BITS).unwrap();
        assert_eq!(bv.word_count(), LOWER_BLOCK_BITS / 64);

        let bv = BitVec::with_lower_block_padding(LOWER_BLOCK_BITS + 1).unwrap();
        assert_eq!(bv.word_count(), 2 * LOWER_BLOCK_BITS / 64);
    }

    #[test]
    fn test_custom_pad_multiple() {
        let bv = BitVec::new(100, 64).unwrap();
        assert_eq!(bv.word_count(), 2);

        let bv = BitVec::new(100, 512).unwrap();
        assert_eq!(bv.word_count(), 8);
    }

    #[test]
    fn test_alignment() {
        let bv = BitVec::with_lower_block_padding(5632).unwrap();
        assert_eq!(bv.words().as_ptr() as usize % BUFFER_ALIGN, 0);
    }

    #[test]
    fn test_zero_initialized() {
        let bv = BitVec::with_lower_block_padding(5632).unwrap();
        assert!(bv.words().iter().all(|&w| w == 0));
        assert_eq!(bv.count_ones(), 0);
    }

    #[test]
    fn test_set_get() {
        let mut bv = BitVec::with_lower_block_padding(200).unwrap();
        bv.set_bit(0);
        bv.set_bit(63);
        bv.set_bit(64);
        bv.set_bit(199);

        assert!(bv.get_bit(0));
        assert!(!bv.get_bit(1));
        assert!(bv.get_bit(63));
        assert!(bv.get_bit(64));
        assert!(!bv.get_bit(65));
        assert!(bv.get_bit(199));
        assert_eq!(bv.count_ones(), 4);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_set_out_of_bounds() {
        let mut bv = BitVec::with_lower_block_padding(100).unwrap();
        bv.set_bit(100);
    }

    #[test]
    fn test_from_words_masks_tail() {
        // Garbage beyond bit 8 must be cleared
        let bv = BitVec::from_words(&[u64::MAX], 8).unwrap();
        assert_eq!(bv.count_ones(), 8);
        for i in 0..8 {
            assert!(bv.get_bit(i));
        }
    }

    #[test]
    fn test_from_words_roundtrip() {
        let words = [0xDEAD_BEEF_u64, 0x0123_4567_89AB_CDEF, 0b1011];
        let bv = BitVec::from_words(&words, 192).unwrap();
        assert_eq!(&bv.words()[..3], &words);
        assert!(bv.words()[3..].iter().all(|&w| w == 0));
    }

    #[test]
    fn test_clone() {
        let mut bv = BitVec::with_lower_block_padding(300).unwrap();
        bv.set_bit(5);
        bv.set_bit(250);

        let copy = bv.clone();
        assert_eq!(copy.len(), 300);
        assert_eq!(copy.words(), bv.words());
    }

    #[test]
    fn test_from_words_vec_source() {
        let words: Vec<u64> = (0..100).map(|i| i as u64).collect();
        let bv = BitVec::from_words(&words, 6400).unwrap();
        assert_eq!(bv.len(), 6400);
        assert_eq!(&bv.words()[..100], words.as_slice());
    }
}
