//! Seeded Spawn RNG
//!
//! Xorshift128+ with both state words taken from a SHA-256 digest of the
//! seed. The authority seeds one from the map name and only draws from it
//! when picking a spawn point with no opponent to keep away from, so a
//! recorded input stream replays to the same spawns.

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

/// Deterministic Xorshift128+ generator.
///
/// ```
/// use hookline::core::rng::DeterministicRng;
///
/// let spawns = [1, 2, 3];
/// let mut a = DeterministicRng::from_label("arena");
/// let mut b = DeterministicRng::from_label("arena");
/// assert_eq!(a.choose(&spawns), b.choose(&spawns));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl DeterministicRng {
    /// Generator for a numeric seed.
    pub fn new(seed: u64) -> Self {
        Self::from_bytes(&seed.to_le_bytes())
    }

    /// Generator for a label such as a map name.
    pub fn from_label(label: &str) -> Self {
        Self::from_bytes(label.as_bytes())
    }

    fn from_bytes(seed: &[u8]) -> Self {
        let digest = Sha256::new()
            .chain_update(b"HOOKLINE_RNG_V1")
            .chain_update(seed)
            .finalize();
        let mut words = [0u64; 2];
        for (word, chunk) in words.iter_mut().zip(digest.chunks_exact(8)) {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            *word = u64::from_le_bytes(bytes);
        }
        // An all-zero state would only ever produce zeros
        if words == [0, 0] {
            words = [1, 1];
        }
        Self { state: words }
    }

    /// Next raw 64-bit value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let [s0, mut s1] = self.state;
        let out = s0.wrapping_add(s1);
        s1 ^= s0;
        self.state = [s0.rotate_left(24) ^ s1 ^ (s1 << 16), s1.rotate_left(37)];
        out
    }

    /// Uniform pick from a slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.next_u64() % items.len() as u64;
        items.get(index as usize)
    }
}
