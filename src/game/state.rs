//! World State Definitions
//!
//! Characters and projectiles live in dense arenas indexed by stable integer
//! ids. Iteration is always in id order, which keeps every tick
//! deterministic and makes a snapshot a plain copy of two vectors.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::core::rng::DeterministicRng;
use crate::core::hash::{StateHash, StateHasher, compute_state_hash};
use crate::game::events::GameEvent;
use crate::game::weapon::{WeaponKind, WeaponTable};

// =============================================================================
// CHARACTER ID
// =============================================================================

/// Stable index of a character slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct CharacterId(pub u16);

impl CharacterId {
    /// Slot index in the character arena.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Team id used when the mode has no teams.
pub const NO_TEAM: u8 = 0;

// =============================================================================
// HOOK
// =============================================================================

/// Grappling hook state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookState {
    /// Not in use
    #[default]
    Idle,
    /// Travelling away from the character
    Flying,
    /// Attached to a solid tile
    Grabbed,
    /// Returning to the character; no physical effect
    Retracting,
}

/// Hook state plus its kinematics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    /// Current state
    pub state: HookState,
    /// Hook head position (anchor while Grabbed)
    pub position: Vec2,
    /// Unit travel direction while Flying
    pub direction: Vec2,
    /// Ticks spent in the current state
    pub ticks: u32,
}

impl Hook {
    /// Anchor position, valid only while Flying or Grabbed.
    pub fn anchor(&self) -> Option<Vec2> {
        match self.state {
            HookState::Flying | HookState::Grabbed => Some(self.position),
            HookState::Idle | HookState::Retracting => None,
        }
    }
}

// =============================================================================
// CHARACTER
// =============================================================================

/// Per-weapon ammunition and regeneration timers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmmoState {
    /// Rounds left per weapon (`None` = infinite)
    pub rounds: [Option<u32>; WeaponKind::COUNT],
    /// Ticks until the next regenerated round per weapon
    pub regen_ticks: [u32; WeaponKind::COUNT],
}

impl AmmoState {
    /// Full ammunition according to the weapon table.
    pub fn full(table: &WeaponTable) -> Self {
        let mut rounds = [None; WeaponKind::COUNT];
        let mut regen_ticks = [0; WeaponKind::COUNT];
        for kind in WeaponKind::ALL {
            rounds[kind.index()] = table.get(kind).max_ammo;
            regen_ticks[kind.index()] = table.get(kind).ammo_regen_ticks;
        }
        Self { rounds, regen_ticks }
    }

    /// Rounds left for a weapon.
    pub fn rounds(&self, kind: WeaponKind) -> Option<u32> {
        self.rounds[kind.index()]
    }

    /// True if the weapon can fire at least once.
    pub fn has_round(&self, kind: WeaponKind) -> bool {
        self.rounds[kind.index()].map_or(true, |n| n > 0)
    }

    /// Spend one round of a finite weapon.
    pub fn spend(&mut self, kind: WeaponKind) {
        if let Some(n) = &mut self.rounds[kind.index()] {
            *n = n.saturating_sub(1);
        }
    }
}

/// Authoritative state of one character.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Character {
    /// Stable id
    pub id: CharacterId,
    /// Display name
    pub name: String,
    /// Team (`NO_TEAM` in free-for-all)
    pub team: u8,

    /// Box center
    pub position: Vec2,
    /// Velocity in units/s
    pub velocity: Vec2,
    /// Facing direction: -1 or 1
    pub facing: i8,
    /// Standing on solid ground
    pub grounded: bool,
    /// Air jumps left before landing again
    pub jumps_remaining: u8,
    /// Buttons the player held on the previous tick, frozen or not (edge detection)
    pub last_buttons: u8,
    /// Grappling hook
    pub hook: Hook,
    /// Ticks of ignored input left
    pub frozen_ticks: u32,

    /// Health points
    pub health: i32,
    /// Alive flag
    pub alive: bool,
    /// Ticks until respawn while dead
    pub respawn_ticks: u32,
    /// Where the character last spawned
    pub spawn_point: Vec2,

    /// Selected weapon
    pub weapon: WeaponKind,
    /// Ticks until the weapon may fire again
    pub fire_cooldown: u32,
    /// Ammunition
    pub ammo: AmmoState,

    /// Mode score
    pub score: i32,
    /// Kills credited
    pub kills: u32,
    /// Deaths suffered
    pub deaths: u32,
}

impl Character {
    /// Create a live character at a spawn point.
    pub fn new(
        id: CharacterId,
        name: impl Into<String>,
        team: u8,
        spawn: Vec2,
        max_health: i32,
        table: &WeaponTable,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            team,
            position: spawn,
            velocity: Vec2::ZERO,
            facing: 1,
            grounded: false,
            jumps_remaining: 0,
            last_buttons: 0,
            hook: Hook::default(),
            frozen_ticks: 0,
            health: max_health,
            alive: true,
            respawn_ticks: 0,
            spawn_point: spawn,
            weapon: WeaponKind::default(),
            fire_cooldown: 0,
            ammo: AmmoState::full(table),
            score: 0,
            kills: 0,
            deaths: 0,
        }
    }

    /// Reset body state at a new spawn point, keeping identity and stats.
    pub fn respawn(&mut self, spawn: Vec2, max_health: i32, table: &WeaponTable) {
        self.position = spawn;
        self.spawn_point = spawn;
        self.velocity = Vec2::ZERO;
        self.grounded = false;
        self.jumps_remaining = 0;
        self.last_buttons = 0;
        self.hook = Hook::default();
        self.frozen_ticks = 0;
        self.health = max_health;
        self.alive = true;
        self.respawn_ticks = 0;
        self.fire_cooldown = 0;
        self.ammo = AmmoState::full(table);
    }

    /// Teleport back to the last spawn point after an invariant violation.
    pub fn reset_to_spawn(&mut self) {
        self.position = self.spawn_point;
        self.velocity = Vec2::ZERO;
        self.hook = Hook::default();
        self.grounded = false;
    }

    /// Apply damage. Returns true if this hit killed the character.
    pub fn take_damage(&mut self, amount: i32) -> bool {
        if !self.alive || amount <= 0 {
            return false;
        }
        self.health -= amount;
        if self.health <= 0 {
            self.health = 0;
            self.alive = false;
            return true;
        }
        false
    }

    /// Hash this character's state.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u16(self.id.0);
        hasher.update_u8(self.team);
        hasher.update_vec2(self.position);
        hasher.update_vec2(self.velocity);
        hasher.update_u8(self.facing as u8);
        hasher.update_bool(self.grounded);
        hasher.update_u8(self.jumps_remaining);
        hasher.update_u8(self.last_buttons);
        hasher.update_u8(self.hook.state as u8);
        hasher.update_vec2(self.hook.position);
        hasher.update_u32(self.hook.ticks);
        hasher.update_u32(self.frozen_ticks);
        hasher.update_i32(self.health);
        hasher.update_bool(self.alive);
        hasher.update_u32(self.respawn_ticks);
        hasher.update_u8(self.weapon as u8);
        hasher.update_u32(self.fire_cooldown);
        for rounds in self.ammo.rounds {
            hasher.update_u32(rounds.unwrap_or(u32::MAX));
        }
        hasher.update_i32(self.score);
        hasher.update_u32(self.kills);
        hasher.update_u32(self.deaths);
    }
}

// =============================================================================
// PROJECTILE
// =============================================================================

/// A physical projectile in flight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    /// Unique id (monotonic counter)
    pub id: u32,
    /// Weapon that fired it
    pub kind: WeaponKind,
    /// Current position
    pub position: Vec2,
    /// Velocity in units/s
    pub velocity: Vec2,
    /// Firing character
    pub owner: CharacterId,
    /// Ticks left before expiry
    pub lifetime_ticks: u32,
    /// Wall bounces left (grenades)
    pub bounces_left: u8,
}

/// A kill resolved during a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kill {
    /// Character that died
    pub victim: CharacterId,
    /// Character credited (`None` for world deaths)
    pub killer: Option<CharacterId>,
    /// Weapon used (`None` for world deaths)
    pub weapon: Option<WeaponKind>,
}

/// Why a projectile could not be spawned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SpawnRejected {
    /// Live projectile count is at the safety cap
    #[error("projectile cap of {cap} reached")]
    CapReached {
        /// The configured cap
        cap: usize,
    },
}

// =============================================================================
// ROUND PHASE
// =============================================================================

/// Round lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundPhase {
    /// Normal play
    #[default]
    Playing,
    /// Score or time limit reached; scores are frozen
    Ended {
        /// Tick the round ended
        at_tick: u32,
    },
}

// =============================================================================
// WORLD STATE
// =============================================================================

/// Canonical simulation state owned by the authority.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldState {
    /// Current tick
    pub tick: u32,

    /// Round phase
    pub phase: RoundPhase,

    /// Tick the current round started
    pub round_start_tick: u32,

    /// Character slots; `None` is a free slot
    pub characters: Vec<Option<Character>>,

    /// Live projectiles, oldest first
    pub projectiles: Vec<Projectile>,

    /// Next projectile id (monotonic counter)
    pub next_projectile_id: u32,

    /// Team scores (team modes only)
    pub team_scores: BTreeMap<u8, i32>,

    /// Deterministic RNG (spawn selection)
    pub rng: DeterministicRng,

    /// Events generated this tick (cleared each tick)
    #[serde(skip)]
    pub pending_events: Vec<GameEvent>,
}

impl WorldState {
    /// Create an empty world with `max_characters` slots.
    pub fn new(max_characters: usize, rng: DeterministicRng) -> Self {
        Self {
            tick: 0,
            phase: RoundPhase::Playing,
            round_start_tick: 0,
            characters: vec![None; max_characters],
            projectiles: Vec::new(),
            next_projectile_id: 0,
            team_scores: BTreeMap::new(),
            rng,
            pending_events: Vec::new(),
        }
    }

    /// First free character slot.
    pub fn free_slot(&self) -> Option<CharacterId> {
        self.characters
            .iter()
            .position(Option::is_none)
            .map(|i| CharacterId(i as u16))
    }

    /// Place a character into its slot.
    pub fn insert_character(&mut self, character: Character) {
        let idx = character.id.index();
        if idx < self.characters.len() {
            self.characters[idx] = Some(character);
        }
    }

    /// Remove a character and every projectile it owns.
    pub fn remove_character(&mut self, id: CharacterId) -> Option<Character> {
        let removed = self.characters.get_mut(id.index()).and_then(Option::take);
        if removed.is_some() {
            self.projectiles.retain(|p| p.owner != id);
        }
        removed
    }

    /// Get a character by id.
    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.get(id.index()).and_then(Option::as_ref)
    }

    /// Get a character mutably by id.
    pub fn character_mut(&mut self, id: CharacterId) -> Option<&mut Character> {
        self.characters.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Present characters in id order.
    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.iter().flatten()
    }

    /// Ids of present characters in id order.
    pub fn character_ids(&self) -> Vec<CharacterId> {
        self.characters().map(|c| c.id).collect()
    }

    /// Number of present characters.
    pub fn character_count(&self) -> usize {
        self.characters().count()
    }

    /// Characters on a team.
    pub fn team_size(&self, team: u8) -> usize {
        self.characters().filter(|c| c.team == team).count()
    }

    /// Spawn projectiles, enforcing the safety cap.
    ///
    /// Expired projectiles are evicted first; if the batch still does not
    /// fit, nothing is spawned. Returns the new ids.
    pub fn spawn_projectiles(
        &mut self,
        batch: Vec<Projectile>,
        cap: usize,
    ) -> Result<Vec<u32>, SpawnRejected> {
        if self.projectiles.len() + batch.len() > cap {
            self.projectiles.retain(|p| p.lifetime_ticks > 0);
        }
        if self.projectiles.len() + batch.len() > cap {
            return Err(SpawnRejected::CapReached { cap });
        }

        let mut ids = Vec::with_capacity(batch.len());
        for mut projectile in batch {
            projectile.id = self.next_projectile_id;
            self.next_projectile_id = self.next_projectile_id.wrapping_add(1);
            ids.push(projectile.id);
            self.projectiles.push(projectile);
        }
        Ok(ids)
    }

    /// Characters sorted by score, then kills, then id.
    pub fn leaderboard(&self) -> Vec<(CharacterId, i32, u32, u32)> {
        let mut rows: Vec<_> = self
            .characters()
            .map(|c| (c.id, c.score, c.kills, c.deaths))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)));
        rows
    }

    /// Ticks elapsed in the current round.
    pub fn round_ticks(&self) -> u32 {
        self.tick.saturating_sub(self.round_start_tick)
    }

    /// True once the round is over.
    pub fn is_ended(&self) -> bool {
        matches!(self.phase, RoundPhase::Ended { .. })
    }

    /// Compute hash of current state for desync detection.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.tick, |hasher| {
            hasher.update_u32(self.round_start_tick);
            if let RoundPhase::Ended { at_tick } = self.phase {
                hasher.update_u32(at_tick);
            }
            for character in self.characters() {
                character.hash_into(hasher);
            }
            for projectile in &self.projectiles {
                hasher.update_u32(projectile.id);
                hasher.update_u8(projectile.kind as u8);
                hasher.update_vec2(projectile.position);
                hasher.update_vec2(projectile.velocity);
                hasher.update_u16(projectile.owner.0);
                hasher.update_u32(projectile.lifetime_ticks);
                hasher.update_u8(projectile.bounces_left);
            }
            for (team, score) in &self.team_scores {
                hasher.update_u8(*team);
                hasher.update_i32(*score);
            }
        })
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Push a game event.
    pub fn push_event(&mut self, event: GameEvent) {
        self.pending_events.push(event);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn world_with(n: u16) -> WorldState {
        let table = WeaponTable::default();
        let mut world = WorldState::new(8, DeterministicRng::new(1));
        for i in 0..n {
            let c = Character::new(CharacterId(i), format!("p{i}"), NO_TEAM, Vec2::new(100.0, 100.0), 10, &table);
            world.insert_character(c);
        }
        world
    }

    fn projectile(owner: u16, lifetime: u32) -> Projectile {
        Projectile {
            id: 0,
            kind: WeaponKind::Gun,
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            owner: CharacterId(owner),
            lifetime_ticks: lifetime,
            bounces_left: 0,
        }
    }

    #[test]
    fn test_slots_are_reused() {
        let mut world = world_with(3);
        assert_eq!(world.free_slot(), Some(CharacterId(3)));
        world.remove_character(CharacterId(1));
        assert_eq!(world.free_slot(), Some(CharacterId(1)));
        assert_eq!(world.character_ids(), vec![CharacterId(0), CharacterId(2)]);
    }

    #[test]
    fn test_remove_character_removes_its_projectiles() {
        let mut world = world_with(2);
        world.spawn_projectiles(vec![projectile(0, 10), projectile(1, 10)], 16).unwrap();
        world.remove_character(CharacterId(0));
        assert_eq!(world.projectiles.len(), 1);
        assert!(world.projectiles.iter().all(|p| p.owner == CharacterId(1)));
    }

    #[test]
    fn test_projectile_cap() {
        let mut world = world_with(1);
        let ids = world.spawn_projectiles(vec![projectile(0, 10), projectile(0, 0)], 2).unwrap();
        assert_eq!(ids, vec![0, 1]);

        // Expired projectile is evicted to make room
        assert!(world.spawn_projectiles(vec![projectile(0, 10)], 2).is_ok());
        assert_eq!(world.projectiles.len(), 2);

        // Still full: rejected, nothing spawned
        assert_eq!(
            world.spawn_projectiles(vec![projectile(0, 10)], 2),
            Err(SpawnRejected::CapReached { cap: 2 })
        );
        assert_eq!(world.projectiles.len(), 2);
    }

    #[test]
    fn test_take_damage() {
        let mut world = world_with(1);
        let c = world.character_mut(CharacterId(0)).unwrap();
        assert!(!c.take_damage(9));
        assert!(c.alive);
        assert!(c.take_damage(1));
        assert!(!c.alive);
        // Dead characters take no further damage
        assert!(!c.take_damage(5));
    }

    #[test]
    fn test_leaderboard_order() {
        let mut world = world_with(3);
        world.character_mut(CharacterId(0)).unwrap().score = 2;
        world.character_mut(CharacterId(1)).unwrap().score = 5;
        world.character_mut(CharacterId(2)).unwrap().score = 2;
        world.character_mut(CharacterId(2)).unwrap().kills = 3;
        let order: Vec<_> = world.leaderboard().into_iter().map(|r| r.0).collect();
        assert_eq!(order, vec![CharacterId(1), CharacterId(2), CharacterId(0)]);
    }

    #[test]
    fn test_hash_determinism() {
        let a = world_with(3);
        let b = world_with(3);
        assert_eq!(a.compute_hash(), b.compute_hash());

        let mut c = world_with(3);
        c.character_mut(CharacterId(2)).unwrap().position.x += 1.0;
        assert_ne!(a.compute_hash(), c.compute_hash());
    }
}
