//! State Hashing
//!
//! SHA-256 digest over the authoritative world, shipped inside every snapshot
//! so clients and replays can detect desyncs without diffing full state.

use sha2::{Sha256, Digest};
use super::vec2::Vec2;

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

const WORLD_DOMAIN: &[u8] = b"HOOKLINE_STATE_V1";

/// Field-by-field world hasher.
///
/// Integers go in little-endian and floats by bit pattern, so `-0.0` and
/// `0.0` differ. Field order is part of the digest.
pub struct StateHasher {
    digest: Sha256,
}

impl StateHasher {
    fn world() -> Self {
        Self { digest: Sha256::new_with_prefix(WORLD_DOMAIN) }
    }

    /// Append a byte.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.digest.update([value]);
    }

    /// Append a u16.
    #[inline]
    pub fn update_u16(&mut self, value: u16) {
        self.digest.update(value.to_le_bytes());
    }

    /// Append a u32.
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.digest.update(value.to_le_bytes());
    }

    /// Append an i32.
    #[inline]
    pub fn update_i32(&mut self, value: i32) {
        self.digest.update(value.to_le_bytes());
    }

    /// Append both components of a vector.
    #[inline]
    pub fn update_vec2(&mut self, value: Vec2) {
        self.update_u32(value.x.to_bits());
        self.update_u32(value.y.to_bits());
    }

    /// Append a flag as one byte.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(u8::from(value));
    }
}

/// Hash the world at `tick`; `add_state` appends entities in a stable order.
pub fn compute_state_hash<F>(tick: u32, add_state: F) -> StateHash
where
    F: FnOnce(&mut StateHasher),
{
    let mut hasher = StateHasher::world();
    hasher.update_u32(tick);
    add_state(&mut hasher);
    hasher.digest.finalize().into()
}
