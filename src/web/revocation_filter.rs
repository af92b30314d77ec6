//! In-memory revocation filter for session identifiers (`jti`).
//!
//! A fixed-size Bloom filter: `m` bits and `k` salted hash functions. Lookups
//! never miss an identifier that was inserted. They can report an identifier
//! that was never inserted, with probability close to `(1 - e^{-kn/m})^k`
//! after `n` distinct inserts. That rate is accepted in exchange for bounded
//! memory; a false positive only forces the affected client to log in again.
//!
//! Bits are never cleared and the filter never resizes, so it gets denser for
//! the lifetime of the process. Past its design capacity the false-positive
//! rate climbs towards 1.0 instead of failing. Nothing is persisted; a restart
//! forgets every revocation.
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Default number of bits.
pub const DEFAULT_CAPACITY_BITS: usize = 10_000;
/// Default number of hash functions.
pub const DEFAULT_HASH_COUNT: u32 = 3;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub struct RevocationFilter {
    words: Box<[AtomicU64]>,
    capacity: usize,
    salts: Box<[u64]>,
    set_bits: AtomicUsize,
    saturation_warning: f64,
    warned: AtomicBool,
}

impl RevocationFilter {
    pub fn new(capacity: usize) -> Self {
        Self::with_hashes(capacity, DEFAULT_HASH_COUNT)
    }

    /// Builds a filter with `capacity` bits and `hash_count` hash functions.
    /// Both are clamped to at least 1.
    pub fn with_hashes(capacity: usize, hash_count: u32) -> Self {
        let capacity = capacity.max(1);
        let words = (0..capacity.div_ceil(64)).map(|_| AtomicU64::new(0)).collect();
        // 123, 456, 789, ...
        let salts = (0..u64::from(hash_count.max(1))).map(|i| 123 + 333 * i).collect();
        Self {
            words,
            capacity,
            salts,
            set_bits: AtomicUsize::new(0),
            saturation_warning: 0.5,
            warned: AtomicBool::new(false),
        }
    }

    /// Fill ratio above which a single warning is logged.
    pub fn with_saturation_warning(mut self, ratio: f64) -> Self {
        self.saturation_warning = ratio;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hash_count(&self) -> u32 {
        self.salts.len() as u32
    }

    /// Marks `id` as revoked. Idempotent; accepts any string, including "".
    pub fn insert(&self, id: &str) {
        for &salt in self.salts.iter() {
            let index = self.index(id, salt);
            let mask = 1u64 << (index % 64);
            let previous = self.words[index / 64].fetch_or(mask, Ordering::AcqRel);
            if previous & mask == 0 {
                self.set_bits.fetch_add(1, Ordering::Relaxed);
            }
        }
        tracing::debug!(jti = %id, "revocation filter insert");

        let ratio = self.fill_ratio();
        if ratio >= self.saturation_warning && !self.warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                fill_ratio = ratio,
                estimated_fp_rate = self.estimated_false_positive_rate(),
                "revocation filter is saturating; false positives will keep rising until restart"
            );
        }
    }

    /// True if every bit for `id` is set. Never false for an inserted id.
    pub fn contains(&self, id: &str) -> bool {
        self.salts.iter().all(|&salt| {
            let index = self.index(id, salt);
            self.words[index / 64].load(Ordering::Acquire) & (1u64 << (index % 64)) != 0
        })
    }

    /// Share of bits currently set.
    pub fn fill_ratio(&self) -> f64 {
        self.set_bits.load(Ordering::Relaxed) as f64 / self.capacity as f64
    }

    /// False-positive probability for a fresh lookup, computed from the
    /// observed fill as `fill_ratio^k`. This is the measured counterpart of
    /// `(1 - e^{-kn/m})^k` and needs no count of distinct inserts.
    pub fn estimated_false_positive_rate(&self) -> f64 {
        self.fill_ratio().powi(self.hash_count() as i32)
    }

    fn index(&self, id: &str, salt: u64) -> usize {
        (salted_hash(id, salt) % self.capacity as u64) as usize
    }
}

impl Default for RevocationFilter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY_BITS)
    }
}

/// FNV-1a over the bytes of `id`, each byte mixed with `salt`, followed by a
/// 64-bit finalizer so nearby salts give unrelated outputs.
fn salted_hash(id: &str, salt: u64) -> u64 {
    let mut h = FNV_OFFSET ^ salt;
    for &byte in id.as_bytes() {
        h ^= u64::from(byte) ^ salt;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^ (h >> 33)
}
