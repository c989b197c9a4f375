//! xorshift64* random number generator
//!
//! Fast, deterministic PRNG used to fill the random bits of record uuids.
//!
//! # Determinism
//!
//! Same seed → same sequence. Per-entity streams are derived from
//! `(seed, stream key)` rather than drawn from one shared generator, so the
//! bytes an entity receives do not depend on which worker thread processed
//! it or in what order.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use multiyear_sim_core_rs::RngManager;
///
/// let mut a = RngManager::for_stream(7, "2026/EMP_001");
/// let mut b = RngManager::for_stream(7, "2026/EMP_001");
/// assert_eq!(a.next(), b.next());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    state: u64,
}

impl RngManager {
    /// Create a new RNG with given seed
    pub fn new(seed: u64) -> Self {
        // xorshift must never hold a zero state
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Derive an independent stream for `key` under a run-level seed
    pub fn for_stream(seed: u64, key: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(seed.to_be_bytes());
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        Self::new(u64::from_be_bytes(prefix))
    }

    /// Generate next random u64 value
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Fill `buf` with random bytes
    pub fn fill_bytes(&mut self, buf: &mut [u8]) {
        for chunk in buf.chunks_mut(8) {
            let bytes = self.next().to_be_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    /// Current internal state (for diagnostics/replay)
    pub fn get_state(&self) -> u64 {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_seed_converted_to_nonzero() {
        let rng = RngManager::new(0);
        assert_ne!(rng.get_state(), 0, "Zero seed should be converted to 1");
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = RngManager::new(12345);
        let mut b = RngManager::new(12345);
        for _ in 0..100 {
            assert_eq!(a.next(), b.next());
        }
    }

    #[test]
    fn test_streams_differ_by_key() {
        let mut a = RngManager::for_stream(1, "2025/A");
        let mut b = RngManager::for_stream(1, "2025/B");
        assert_ne!(a.next(), b.next());
    }

    #[test]
    fn test_fill_bytes_handles_partial_chunks() {
        let mut rng = RngManager::new(99);
        let mut buf = [0u8; 10];
        rng.fill_bytes(&mut buf);
        assert!(buf.iter().any(|b| *b != 0));
    }
}
