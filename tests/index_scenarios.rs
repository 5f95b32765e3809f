//! End-to-end scenarios for the rank/select index.
//!
//! Each scenario pins down concrete inputs and the exact expected answers,
//! covering block-boundary layout cases the property tests only hit by
//! chance. The large-vector scenario at the bottom needs ~600 MB and is
//! ignored by default.

use bitdex::index::{LOWER_BLOCK_BITS, SELECT_SAMPLE, SELECT_UPPER_BLOCK_BITS, UPPER_BLOCK_BITS};
use bitdex::{BitVec, RankSelectIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn build_from_positions(bits: usize, positions: &[usize]) -> (BitVec, RankSelectIndex) {
    let mut bv = BitVec::with_lower_block_padding(bits).unwrap();
    for &p in positions {
        bv.set_bit(p);
    }
    let index = RankSelectIndex::build(bv.words(), bv.len()).unwrap();
    (bv, index)
}

#[test]
fn scenario_all_zeros() {
    let (bv, index) = build_from_positions(5632, &[]);
    assert_eq!(index.ones(), 0);
    assert_eq!(index.rank1(bv.words(), 0), 0);
    assert_eq!(index.rank1(bv.words(), 1000), 0);
    assert_eq!(index.rank1(bv.words(), 5632), 0);
}

#[test]
fn scenario_all_ones() {
    let positions: Vec<usize> = (0..5632).collect();
    let (bv, index) = build_from_positions(5632, &positions);
    assert_eq!(index.ones(), 5632);
    for i in 0..=5632 {
        assert_eq!(index.rank1(bv.words(), i), i, "rank1({})", i);
    }
    for k in 1..=5632 {
        assert_eq!(index.select1(bv.words(), k), k - 1, "select1({})", k);
    }
}

#[test]
fn scenario_single_bit() {
    let (bv, index) = build_from_positions(5632, &[4321]);
    assert_eq!(index.ones(), 1);
    assert_eq!(index.rank1(bv.words(), 4321), 0);
    assert_eq!(index.rank1(bv.words(), 4322), 1);
    assert_eq!(index.rank1(bv.words(), 5632), 1);
    assert_eq!(index.select1(bv.words(), 1), 4321);
}

#[test]
fn scenario_one_upper_block_boundary_bits() {
    // Exactly one rank upper block, with bits straddling every boundary kind:
    // word edges, basic block edges, lower block edges, and the last bit.
    let positions = [0usize, 1, 2, 511, 512, 5631, 5632, 5633, 259071];
    assert_eq!(UPPER_BLOCK_BITS, 259072);
    let (bv, index) = build_from_positions(UPPER_BLOCK_BITS, &positions);

    assert_eq!(index.ones(), positions.len());
    for (idx, &pos) in positions.iter().enumerate() {
        let rank = idx + 1;
        assert_eq!(index.rank1(bv.words(), pos), rank - 1, "rank1({})", pos);
        assert_eq!(index.rank1(bv.words(), pos + 1), rank, "rank1({})", pos + 1);
        assert_eq!(index.select1(bv.words(), rank), pos, "select1({})", rank);
    }
    assert_eq!(index.rank1(bv.words(), UPPER_BLOCK_BITS), positions.len());
}

#[test]
fn scenario_every_seventh_bit() {
    // Bits at 3, 10, 17, ... below one million
    let bits = 1_000_000;
    let positions: Vec<usize> = (3..bits).step_by(7).collect();
    let total = (bits - 3 - 1) / 7 + 1;
    assert_eq!(positions.len(), total);
    assert_eq!(total, 142_857);

    let (bv, index) = build_from_positions(bits, &positions);
    assert_eq!(index.ones(), total);

    for k in 1..=total {
        assert_eq!(index.select1(bv.words(), k), 3 + 7 * (k - 1), "select1({})", k);
    }
    for i in (0..=bits).step_by(997) {
        let expected = if i <= 3 { 0 } else { (i - 4) / 7 + 1 };
        assert_eq!(index.rank1(bv.words(), i), expected, "rank1({})", i);
    }
    assert_eq!(index.rank1(bv.words(), bits), total);
}

#[test]
fn scenario_sample_boundary_queries() {
    // Dense vector so that sample thresholds (1, 8193, 16385, ...) land at
    // exact lower-block ranks; queries around each threshold exercise the
    // case where the sampled record already starts at the target rank.
    let bits = 6 * LOWER_BLOCK_BITS;
    let positions: Vec<usize> = (0..bits).collect();
    let (bv, index) = build_from_positions(bits, &positions);

    let mut k = 1;
    while k <= bits {
        for probe in [k.saturating_sub(1).max(1), k, (k + 1).min(bits)] {
            assert_eq!(index.select1(bv.words(), probe), probe - 1, "select1({})", probe);
        }
        k += SELECT_SAMPLE;
    }

    // First set bit of every lower block
    for block in 0..6 {
        let rank = block * LOWER_BLOCK_BITS + 1;
        assert_eq!(index.select1(bv.words(), rank), rank - 1);
    }
}

#[test]
fn scenario_randomized_multi_upper_cross_check() {
    // Mixed densities across three rank upper blocks, checked against a
    // naive reference on random queries.
    let bits = 3 * UPPER_BLOCK_BITS - 1234;
    let mut rng = ChaCha8Rng::seed_from_u64(0xB17D_E01);
    let mut bv = BitVec::with_lower_block_padding(bits).unwrap();

    let mut set_positions: Vec<usize> = Vec::new();
    for i in 0..bits {
        // Alternate sparse and dense stretches every upper block half
        let dense = (i / (UPPER_BLOCK_BITS / 2)) % 2 == 1;
        let p = if dense { 0.6 } else { 0.02 };
        if rng.gen_bool(p) {
            bv.set_bit(i);
            set_positions.push(i);
        }
    }
    let index = RankSelectIndex::build(bv.words(), bv.len()).unwrap();
    assert_eq!(index.ones(), set_positions.len());

    for _ in 0..10_000 {
        let i = rng.gen_range(0..=bits);
        let expected = set_positions.partition_point(|&p| p < i);
        assert_eq!(index.rank1(bv.words(), i), expected, "rank1({})", i);
    }
    for _ in 0..10_000 {
        let k = rng.gen_range(1..=set_positions.len());
        assert_eq!(index.select1(bv.words(), k), set_positions[k - 1], "select1({})", k);
    }
}

#[test]
fn scenario_concurrent_queries() {
    // Immutable after build: concurrent queries must agree with the
    // sequential answers.
    let bits = 2 * UPPER_BLOCK_BITS;
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let mut bv = BitVec::with_lower_block_padding(bits).unwrap();
    for i in 0..bits {
        if rng.gen_bool(0.3) {
            bv.set_bit(i);
        }
    }
    let index = RankSelectIndex::build(bv.words(), bv.len()).unwrap();
    let ones = index.ones();

    let sequential: Vec<(usize, usize)> = (0..1000)
        .map(|q| {
            let i = (q * 7919) % bits + 1;
            let k = (q * 6121) % ones + 1;
            (index.rank1(bv.words(), i), index.select1(bv.words(), k))
        })
        .collect();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for (q, &(expected_rank, expected_select)) in sequential.iter().enumerate() {
                    let i = (q * 7919) % bits + 1;
                    let k = (q * 6121) % ones + 1;
                    assert_eq!(index.rank1(bv.words(), i), expected_rank);
                    assert_eq!(index.select1(bv.words(), k), expected_select);
                }
            });
        }
    });
}

/// Reference with coarse per-chunk prefix sums, fast enough for gigabit
/// vectors.
struct ChunkedReference {
    chunk_words: usize,
    prefix: Vec<u64>,
}

impl ChunkedReference {
    fn new(words: &[u64]) -> Self {
        let chunk_words = 1024;
        let mut prefix = Vec::with_capacity(words.len() / chunk_words + 2);
        prefix.push(0);
        let mut total = 0u64;
        for chunk in words.chunks(chunk_words) {
            total += chunk.iter().map(|w| w.count_ones() as u64).sum::<u64>();
            prefix.push(total);
        }
        Self { chunk_words, prefix }
    }

    fn rank(&self, words: &[u64], i: usize) -> usize {
        let chunk = i / 64 / self.chunk_words;
        let mut count = self.prefix[chunk] as usize;
        for w in chunk * self.chunk_words..i / 64 {
            count += words[w].count_ones() as usize;
        }
        if i % 64 > 0 {
            count += (words[i / 64] & ((1u64 << (i % 64)) - 1)).count_ones() as usize;
        }
        count
    }

    fn select(&self, words: &[u64], k: usize) -> usize {
        let chunk = self.prefix.partition_point(|&c| (c as usize) < k) - 1;
        let mut remaining = k - self.prefix[chunk] as usize;
        let mut w = chunk * self.chunk_words;
        loop {
            let count = words[w].count_ones() as usize;
            if count >= remaining {
                break;
            }
            remaining -= count;
            w += 1;
        }
        let mut x = words[w];
        for _ in 1..remaining {
            x &= x - 1;
        }
        w * 64 + x.trailing_zeros() as usize
    }
}

/// One full select upper block plus one lower block at density 0.5.
/// Needs ~600 MB; run with `cargo test --release -- --ignored`.
#[test]
#[ignore]
fn scenario_full_select_upper_block() {
    let bits = SELECT_UPPER_BLOCK_BITS + LOWER_BLOCK_BITS;
    let mut rng = ChaCha8Rng::seed_from_u64(0x5E1E_C7);

    let word_count = bits / 64;
    let mut words: Vec<u64> = Vec::with_capacity(word_count);
    for _ in 0..word_count {
        words.push(rng.r#gen::<u64>());
    }
    let bv = BitVec::from_words(&words, bits).unwrap();
    drop(words);

    let index = RankSelectIndex::build(bv.words(), bv.len()).unwrap();
    let reference = ChunkedReference::new(&bv.words()[..bits / 64]);
    assert_eq!(index.ones(), reference.prefix[reference.prefix.len() - 1] as usize);

    let words = bv.words();
    for _ in 0..10_000 {
        let i = rng.gen_range(0..=bits);
        assert_eq!(index.rank1(words, i), reference.rank(words, i), "rank1({})", i);
    }
    for _ in 0..10_000 {
        let k = rng.gen_range(1..=index.ones());
        assert_eq!(index.select1(words, k), reference.select(words, k), "select1({})", k);
    }
}
