//! Authoritative Snapshots
//!
//! A [`Snapshot`] is the full serialized world at one tick plus, per
//! character, the last input sequence the server consumed. Clients
//! reconcile their prediction against it.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::core::hash::StateHash;
use crate::game::state::{Character, CharacterId, Projectile, RoundPhase, WorldState};

/// Full authoritative state at one tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Tick this state is the result of
    pub tick: u32,
    /// Round phase
    pub phase: RoundPhase,
    /// Present characters in id order
    pub characters: Vec<Character>,
    /// Live projectiles, oldest first
    pub projectiles: Vec<Projectile>,
    /// Team scores (team modes)
    pub team_scores: BTreeMap<u8, i32>,
    /// Last consumed input sequence per character
    pub acks: BTreeMap<CharacterId, u32>,
    /// Hash of the world this was taken from
    pub state_hash: StateHash,
}

impl Snapshot {
    /// Capture the world.
    pub fn capture(world: &WorldState, acks: BTreeMap<CharacterId, u32>) -> Self {
        Self {
            tick: world.tick,
            phase: world.phase,
            characters: world.characters().cloned().collect(),
            projectiles: world.projectiles.clone(),
            team_scores: world.team_scores.clone(),
            acks,
            state_hash: world.compute_hash(),
        }
    }

    /// Character by id.
    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    /// Last input sequence consumed for a character.
    pub fn ack_for(&self, id: CharacterId) -> Option<u32> {
        self.acks.get(&id).copied()
    }

    /// Hex-encoded state hash for logs.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.state_hash)
    }

    /// True if every projectile's owner is present.
    pub fn is_consistent(&self) -> bool {
        self.projectiles
            .iter()
            .all(|p| self.characters.iter().any(|c| c.id == p.owner))
    }
}
