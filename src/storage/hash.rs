//! Shard routing.
//!
//! Keys are mapped to shards with the djb2 string hash. It is not
//! collision-resistant, only deterministic and spread well enough across
//! the small shard counts a single process uses.

/// Seed value of the djb2 accumulator.
const DJB2_SEED: u32 = 5381;

/// Multiplier applied to the accumulator for every character.
const DJB2_FACTOR: u32 = 33;

/// Computes the djb2 hash of `key`, one step per Unicode scalar value,
/// wrapping at 32 bits.
#[inline]
pub fn djb2(key: &str) -> u32 {
    key.chars().fold(DJB2_SEED, |r, c| {
        r.wrapping_mul(DJB2_FACTOR).wrapping_add(c as u32)
    })
}

/// Returns the index of the shard owning `key`.
///
/// `shard_count` must be non-zero; [`Storage`](super::Storage) guarantees
/// this at construction.
#[inline]
pub fn shard_index(key: &str, shard_count: usize) -> usize {
    djb2(key) as usize % shard_count
}
