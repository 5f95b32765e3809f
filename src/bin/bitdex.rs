//! Benchmark CLI for the rank/select index.
//!
//! Fills a bit vector at a requested sparsity from a seeded RNG, builds the
//! index, times a batch of queries, and emits one CSV line on stdout:
//!
//! ```text
//! bitdex,<query>,<sparsity>,<size>,<seconds_per_query>
//! ```
//!
//! Progress goes to stderr so the CSV stream stays clean for collection
//! scripts.

use anyhow::{Result, bail};
use bitdex::{BitVec, RankSelectIndex};
use clap::{Parser, ValueEnum};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::hint::black_box;
use std::time::Instant;

#[derive(Debug, Parser)]
#[command(name = "bitdex")]
#[command(about = "Rank/select query microbenchmark", long_about = None)]
#[command(version)]
struct Cli {
    /// Query type to benchmark
    #[arg(value_enum)]
    query: QueryKind,

    /// Bit vector length in bits
    n_bits: usize,

    /// Percentage of zero bits; each bit is set with probability (100 - sparsity)/100
    #[arg(value_parser = clap::value_parser!(u8).range(0..=99))]
    sparsity: u8,

    /// RNG seed for bit fill and query generation
    seed: u64,

    /// Number of timed queries
    #[arg(long, default_value_t = 10_000_000)]
    queries: usize,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum QueryKind {
    Rank,
    Select,
}

impl QueryKind {
    fn name(self) -> &'static str {
        match self {
            QueryKind::Rank => "rank",
            QueryKind::Select => "select",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.n_bits == 0 {
        bail!("bit vector length must be positive");
    }

    eprintln!("query type: {}", cli.query.name());
    eprintln!("seed: {}", cli.seed);
    eprintln!("bv size: {}", cli.n_bits);
    eprintln!("bv sparsity: {}", cli.sparsity);

    let mut rng = ChaCha8Rng::seed_from_u64(cli.seed);
    let mut bv = BitVec::with_lower_block_padding(cli.n_bits)?;
    let mut ones = 0usize;
    for i in 0..cli.n_bits {
        if rng.gen_range(1..=100u32) > cli.sparsity as u32 {
            bv.set_bit(i);
            ones += 1;
        }
    }
    eprintln!("hot bits: {ones}");

    eprintln!("building index...");
    let index = RankSelectIndex::build(bv.words(), bv.len())?;
    eprintln!(
        "index size: {} bytes ({:.3}% of bits)",
        index.index_size_bytes(),
        index.index_size_bytes() as f64 / (cli.n_bits as f64 / 8.0) * 100.0
    );

    let positions: Vec<usize> = match cli.query {
        QueryKind::Rank => (0..cli.queries)
            .map(|_| rng.gen_range(1..=cli.n_bits))
            .collect(),
        QueryKind::Select => {
            if ones == 0 {
                bail!("select benchmark needs at least one set bit");
            }
            (0..cli.queries).map(|_| rng.gen_range(1..=ones)).collect()
        }
    };

    eprintln!("running {} queries...", cli.queries);
    let words = bv.words();
    let start = Instant::now();
    let mut sum = 0usize;
    match cli.query {
        QueryKind::Rank => {
            for &i in &positions {
                sum += index.rank1(words, black_box(i));
            }
        }
        QueryKind::Select => {
            for &i in &positions {
                sum += index.select1(words, black_box(i));
            }
        }
    }
    let elapsed = start.elapsed();
    black_box(sum);
    eprintln!("finished in {:.3}s", elapsed.as_secs_f64());

    println!(
        "bitdex,{},{},{},{:e}",
        cli.query.name(),
        cli.sparsity,
        cli.n_bits,
        elapsed.as_secs_f64() / cli.queries as f64
    );
    Ok(())
}
