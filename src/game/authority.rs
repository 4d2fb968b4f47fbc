//! Game Authority
//!
//! The single owner of the canonical world. Network code talks to it only
//! through [`Authority::join`], [`Authority::leave`],
//! [`Authority::apply_input`], [`Authority::tick`] and
//! [`Authority::snapshot`]; it lives on the simulation task and is never
//! shared.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::MatchConfig;
use crate::core::rng::DeterministicRng;
use crate::game::events::GameEvent;
use crate::game::input::{InputDisposition, InputFrame, InputQueue};
use crate::game::map::GameMap;
use crate::game::mode::{mode_for, GameMode};
use crate::game::snapshot::Snapshot;
use crate::game::state::{Character, CharacterId, WorldState};
use crate::game::tick::{tick, TickResult};

/// Longest accepted display name.
pub const MAX_NAME_LEN: usize = 16;

/// Why a join was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    /// Every character slot is taken
    #[error("server full ({capacity} players)")]
    Full {
        /// Slot count
        capacity: usize,
    },
}

/// Authoritative simulation state plus per-character input queues.
pub struct Authority {
    world: WorldState,
    map: Arc<GameMap>,
    config: MatchConfig,
    mode: Box<dyn GameMode>,
    queues: BTreeMap<CharacterId, InputQueue>,
    pending_leaves: BTreeSet<CharacterId>,
    latest: Arc<Snapshot>,
}

impl Authority {
    /// Create an authority for a map. Spawn randomness is seeded from the
    /// map name, so two authorities built alike evolve identically.
    pub fn new(map: Arc<GameMap>, config: MatchConfig, max_characters: usize) -> Self {
        let world = WorldState::new(max_characters, DeterministicRng::from_label(&map.name));
        let mode = mode_for(config.mode);
        let latest = Arc::new(Snapshot::capture(&world, BTreeMap::new()));
        Self {
            world,
            map,
            config,
            mode,
            queues: BTreeMap::new(),
            pending_leaves: BTreeSet::new(),
            latest,
        }
    }

    /// Replace the mode policy (tests and custom modes).
    pub fn with_mode(mut self, mode: Box<dyn GameMode>) -> Self {
        self.mode = mode;
        self
    }

    /// Allocate a character at a mode-chosen spawn point.
    ///
    /// The latest snapshot is refreshed so it already contains the new
    /// character.
    pub fn join(&mut self, name: &str) -> Result<CharacterId, JoinError> {
        let id = self.world.free_slot().ok_or(JoinError::Full {
            capacity: self.world.characters.len(),
        })?;
        let team = self.mode.assign_team(&self.world);
        let spawn = self.mode.choose_spawn(&mut self.world, &self.map, id, team);

        let character = Character::new(
            id,
            sanitize_name(name),
            team,
            spawn,
            self.config.max_health,
            &self.config.weapons,
        );
        info!(character = %id, name = %character.name, team, "character joined");
        self.world.insert_character(character);
        self.world.push_event(GameEvent::joined(self.world.tick, id, team));
        self.queues.insert(id, InputQueue::default());
        self.pending_leaves.remove(&id);
        self.refresh_snapshot();
        Ok(id)
    }

    /// Schedule a character for removal at the next tick boundary.
    pub fn leave(&mut self, id: CharacterId) {
        if self.world.character(id).is_some() {
            self.pending_leaves.insert(id);
        }
    }

    /// Buffer an input frame for a future tick.
    pub fn apply_input(&mut self, id: CharacterId, frame: InputFrame) -> InputDisposition {
        if self.pending_leaves.contains(&id) {
            return InputDisposition::Unknown;
        }
        match self.queues.get_mut(&id) {
            Some(queue) => {
                let disposition = queue.push(frame);
                if disposition != InputDisposition::Queued {
                    debug!(character = %id, sequence = frame.sequence, ?disposition, "input not queued cleanly");
                }
                disposition
            }
            None => InputDisposition::Unknown,
        }
    }

    /// Advance the simulation by one tick.
    pub fn tick(&mut self) -> TickResult {
        self.process_leaves();

        let inputs: BTreeMap<CharacterId, InputFrame> = self
            .queues
            .iter_mut()
            .map(|(id, queue)| (*id, queue.next_for_tick()))
            .collect();

        let result = tick(&mut self.world, &self.map, &inputs, &self.config, self.mode.as_ref());
        if let Some(round) = &result.round_ended {
            info!(tick = self.world.tick, winner = ?round.winner, team = ?round.winning_team, "round ended");
        }
        self.refresh_snapshot();
        result
    }

    /// Latest authoritative snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.latest)
    }

    /// Read-only world access.
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// The map being played.
    pub fn map(&self) -> &Arc<GameMap> {
        &self.map
    }

    /// Match rules.
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Characters sorted by score, then kills, then id.
    pub fn leaderboard(&self) -> Vec<(CharacterId, i32, u32, u32)> {
        self.world.leaderboard()
    }

    fn process_leaves(&mut self) {
        if self.pending_leaves.is_empty() {
            return;
        }
        for id in std::mem::take(&mut self.pending_leaves) {
            if self.world.remove_character(id).is_some() {
                info!(character = %id, "character left");
                let tick = self.world.tick;
                self.world.push_event(GameEvent::left(tick, id));
            }
            self.queues.remove(&id);
        }
        for moved in self.mode.rebalance(&mut self.world) {
            info!(character = %moved, "moved to balance teams");
        }
    }

    fn refresh_snapshot(&mut self) {
        let acks = self
            .queues
            .iter()
            .map(|(id, queue)| (*id, queue.last_consumed_sequence()))
            .collect();
        self.latest = Arc::new(Snapshot::capture(&self.world, acks));
    }
}

fn sanitize_name(name: &str) -> String {
    let trimmed: String = name
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_LEN)
        .collect();
    if trimmed.is_empty() {
        "player".to_string()
    } else {
        trimmed
    }
}

// =============================================================================
// TESTS
// =============================================================================
