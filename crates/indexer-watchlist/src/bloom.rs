//! Per-chain bloom filter (spec §3.4, §6 serialization format).

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BloomError {
    #[error("bloom filter requires m > 0")]
    ZeroBits,
    #[error("cannot merge bloom filters with differing bit counts ({0} vs {1})")]
    SizeMismatch(usize, usize),
}

/// A Bloom filter over arbitrary byte keys (here: 20-byte addresses),
/// sized from `{expected_items, target_fpr}` per spec §3.4:
/// `m = ceil(-n*ln(p) / (ln 2)^2)` rounded up to a multiple of 64,
/// `k = ceil((m/n) * ln 2)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u64>,
    m: usize,
    k: u32,
}

impl BloomFilter {
    /// Sizes a filter for `expected_items` at `target_fpr`.
    pub fn new(expected_items: usize, target_fpr: f64) -> Result<Self, BloomError> {
        let n = expected_items.max(1) as f64;
        let m_bits = (-n * target_fpr.ln() / (std::f64::consts::LN_2.powi(2))).ceil() as usize;
        let m = ((m_bits + 63) / 64).max(1) * 64;
        let k = ((m as f64 / n) * std::f64::consts::LN_2).ceil().max(1.0) as u32;
        Self::with_params(m, k)
    }

    /// Constructs a filter with explicit `m` (bits) and `k` (hash count),
    /// used when deserializing. Rejects `m == 0` (spec §8 boundary case).
    pub fn with_params(m: usize, k: u32) -> Result<Self, BloomError> {
        if m == 0 {
            return Err(BloomError::ZeroBits);
        }
        let words = (m + 63) / 64;
        Ok(Self { bits: vec![0u64; words], m, k: k.max(1) })
    }

    pub fn add(&mut self, key: &[u8]) {
        for i in 0..self.k {
            let idx = self.hash_index(key, i);
            self.bits[idx / 64] |= 1 << (idx % 64);
        }
    }

    pub fn might_contain(&self, key: &[u8]) -> bool {
        (0..self.k).all(|i| {
            let idx = self.hash_index(key, i);
            self.bits[idx / 64] & (1 << (idx % 64)) != 0
        })
    }

    /// Double-hashing scheme: `h_i(x) = (fnv1a(x) + i * fnv1a(x || i)) mod m`.
    fn hash_index(&self, key: &[u8], i: u32) -> usize {
        let h1 = fnv1a(key);
        let mut salted = Vec::with_capacity(key.len() + 4);
        salted.extend_from_slice(key);
        salted.extend_from_slice(&i.to_le_bytes());
        let h2 = fnv1a(&salted);
        let combined = h1.wrapping_add((i as u64).wrapping_mul(h2));
        (combined % self.m as u64) as usize
    }

    /// Bitwise-OR merge; requires identical `m`.
    pub fn merge(&mut self, other: &BloomFilter) -> Result<(), BloomError> {
        if self.m != other.m {
            return Err(BloomError::SizeMismatch(self.m, other.m));
        }
        for (a, b) in self.bits.iter_mut().zip(other.bits.iter()) {
            *a |= *b;
        }
        Ok(())
    }

    /// `m/8` bytes, big-endian 64-bit words, word-by-word (spec §6).
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bits.len() * 8);
        for word in &self.bits {
            out.extend_from_slice(&word.to_be_bytes());
        }
        out
    }

    pub fn deserialize(bytes: &[u8], k: u32) -> Result<Self, BloomError> {
        let m = bytes.len() * 8;
        if m == 0 {
            return Err(BloomError::ZeroBits);
        }
        let bits = bytes
            .chunks(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf[..chunk.len()].copy_from_slice(chunk);
                u64::from_be_bytes(buf)
            })
            .collect();
        Ok(Self { bits, m, k: k.max(1) })
    }

    pub fn m(&self) -> usize {
        self.m
    }

    pub fn k(&self) -> u32 {
        self.k
    }
}

fn fnv1a(data: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
