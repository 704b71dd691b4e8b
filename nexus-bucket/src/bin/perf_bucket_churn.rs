//! Profiling binary for churn (insert/erase cycles across many buckets).
//!
//! Run with:
//!   cargo build --release --bin perf_bucket_churn
//!   perf stat -e cycles,instructions,cache-misses,cache-references \
//!       ./target/release/perf_bucket_churn

use std::hint::black_box;

use nexus_bucket::BucketStorage;

const RESIDENT: usize = 100_000;
const CYCLES: usize = 10_000_000;

fn main() {
    let mut storage: BucketStorage<u64> = BucketStorage::with_block_capacity(64).unwrap();

    // Setup: resident population so erases land in partly filled buckets
    let mut live: Vec<_> = (0..RESIDENT as u64).map(|i| storage.insert(i)).collect();

    // Timed section - erase a pseudo-random resident, insert a replacement
    let mut x = 0x9E37_79B9_7F4A_7C15u64;
    for i in 0..CYCLES as u64 {
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        let slot = (x as usize) % live.len();

        black_box(storage.erase(live[slot]));
        live[slot] = storage.insert(i);
    }

    black_box(storage.len());
}
