//! Seeded hashing.
//!
//! Turns composite string keys (seed + module + field + date) into
//! reproducible numbers. The derivation is SHA-256 truncated to its first
//! 8 hex characters; it is stable across processes and platforms but is not
//! a uniform or secure RNG (`hash % 10000` carries a small modulo bias).

use sha2::{Digest, Sha256};

/// Resolution of [`normalized_hash`]: the hash is reduced modulo this value.
pub const NORMALIZE_BUCKETS: u32 = 10_000;

/// Derives a 32-bit value from `input`.
///
/// Equals the first 8 hex characters of the SHA-256 hex digest read as a
/// hexadecimal integer.
pub fn deterministic_hash(input: &str) -> u32 {
    let digest = Sha256::digest(input.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Maps `input` linearly into `[min, max)`.
pub fn normalized_hash(input: &str, min: f64, max: f64) -> f64 {
    scale_hash(deterministic_hash(input), min, max)
}

/// Scales an already computed hash into `[min, max)`.
pub fn scale_hash(hash: u32, min: f64, max: f64) -> f64 {
    let unit = (hash % NORMALIZE_BUCKETS) as f64 / NORMALIZE_BUCKETS as f64;
    min + unit * (max - min)
}

/// Anything that can derive seeded hashes.
///
/// Implemented by [`DirectHash`] and by the computation cache, so callers
/// choose memoization without changing the numbers they get.
pub trait HashSource {
    fn hash(&self, input: &str) -> u32;

    fn normalized(&self, input: &str, min: f64, max: f64) -> f64 {
        scale_hash(self.hash(input), min, max)
    }
}

/// Uncached hashing straight through SHA-256.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectHash;

impl HashSource for DirectHash {
    fn hash(&self, input: &str) -> u32 {
        deterministic_hash(input)
    }
}

/// Derives decorrelated values for one scope (a module, a metric) under a
/// fixed seed and date.
///
/// Keys take the form `seed:scope:field:date`.
pub struct SeedStream<'a, H: HashSource + ?Sized> {
    hasher: &'a H,
    seed: &'a str,
    date: &'a str,
    scope: &'a str,
}

impl<'a, H: HashSource + ?Sized> SeedStream<'a, H> {
    pub fn new(hasher: &'a H, seed: &'a str, date: &'a str, scope: &'a str) -> Self {
        Self {
            hasher,
            seed,
            date,
            scope,
        }
    }

    fn key(&self, field: &str) -> String {
        format!("{}:{}:{}:{}", self.seed, self.scope, field, self.date)
    }

    /// Value in `[0, 1)`.
    pub fn unit(&self, field: &str) -> f64 {
        self.hasher.normalized(&self.key(field), 0.0, 1.0)
    }

    /// Value in `[min, max)`.
    pub fn range(&self, field: &str, min: f64, max: f64) -> f64 {
        self.hasher.normalized(&self.key(field), min, max)
    }

    /// Index in `0..n`; 0 when `n` is 0.
    pub fn index(&self, field: &str, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        self.hasher.hash(&self.key(field)) as usize % n
    }

    /// True with probability `p` (in the seeded sense).
    pub fn chance(&self, field: &str, p: f64) -> bool {
        self.unit(field) < p
    }

    /// Picks one element of `items`.
    pub fn pick<'b, T>(&self, field: &str, items: &'b [T]) -> Option<&'b T> {
        if items.is_empty() {
            None
        } else {
            items.get(self.index(field, items.len()))
        }
    }
}
