//! Game Events
//!
//! Events generated during a tick. They are carried alongside snapshots so
//! clients can show kill feeds, and sorted deterministically for replay
//! comparison.

use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::state::CharacterId;
use crate::game::weapon::WeaponKind;

/// Priority for event processing order.
///
/// Lower value = processed first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventPriority {
    /// Joins and leaves first
    Membership = 0,
    /// Then deaths
    Elimination = 1,
    /// Then respawns
    Respawn = 2,
    /// Then movement events (teleport, hook)
    Movement = 3,
    /// Then weapon use
    Combat = 4,
    /// Lowest priority
    Other = 255,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameEventData {
    /// Character entered the match
    CharacterJoined {
        character_id: CharacterId,
        team: u8,
    },

    /// Character left the match
    CharacterLeft {
        character_id: CharacterId,
    },

    /// Character died
    Killed {
        victim_id: CharacterId,
        /// `None` for world deaths (death tiles)
        killer_id: Option<CharacterId>,
        weapon: Option<WeaponKind>,
    },

    /// Character respawned
    Respawned {
        character_id: CharacterId,
        position: Vec2,
    },

    /// Character went through a teleporter
    Teleported {
        character_id: CharacterId,
        destination: Vec2,
    },

    /// Hook attached to a wall
    HookAttached {
        character_id: CharacterId,
        anchor: Vec2,
    },

    /// Weapon fired
    WeaponFired {
        character_id: CharacterId,
        weapon: WeaponKind,
    },

    /// Character state was non-finite and got reset to its spawn
    InvariantReset {
        character_id: CharacterId,
    },

    /// New round started; scores were reset
    RoundStarted,

    /// Round ended
    RoundEnded {
        /// Winning character (DM) if any
        winner_id: Option<CharacterId>,
        /// Winning team (TDM) if any
        winning_team: Option<u8>,
    },
}

/// A game event with timing and priority.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when event occurred
    pub tick: u32,

    /// Processing priority
    pub priority: EventPriority,

    /// Character involved (for tie-breaking)
    pub character_id: Option<CharacterId>,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tick: u32, priority: EventPriority, data: GameEventData) -> Self {
        let character_id = match &data {
            GameEventData::CharacterJoined { character_id, .. }
            | GameEventData::CharacterLeft { character_id }
            | GameEventData::Respawned { character_id, .. }
            | GameEventData::Teleported { character_id, .. }
            | GameEventData::HookAttached { character_id, .. }
            | GameEventData::WeaponFired { character_id, .. }
            | GameEventData::InvariantReset { character_id } => Some(*character_id),
            GameEventData::Killed { victim_id, .. } => Some(*victim_id),
            GameEventData::RoundEnded { winner_id, .. } => *winner_id,
            GameEventData::RoundStarted => None,
        };

        Self {
            tick,
            priority,
            character_id,
            data,
        }
    }

    /// Create character joined event.
    pub fn joined(tick: u32, character_id: CharacterId, team: u8) -> Self {
        Self::new(
            tick,
            EventPriority::Membership,
            GameEventData::CharacterJoined { character_id, team },
        )
    }

    /// Create character left event.
    pub fn left(tick: u32, character_id: CharacterId) -> Self {
        Self::new(tick, EventPriority::Membership, GameEventData::CharacterLeft { character_id })
    }

    /// Create killed event.
    pub fn killed(
        tick: u32,
        victim_id: CharacterId,
        killer_id: Option<CharacterId>,
        weapon: Option<WeaponKind>,
    ) -> Self {
        Self::new(
            tick,
            EventPriority::Elimination,
            GameEventData::Killed {
                victim_id,
                killer_id,
                weapon,
            },
        )
    }

    /// Create respawned event.
    pub fn respawned(tick: u32, character_id: CharacterId, position: Vec2) -> Self {
        Self::new(
            tick,
            EventPriority::Respawn,
            GameEventData::Respawned { character_id, position },
        )
    }

    /// Create teleported event.
    pub fn teleported(tick: u32, character_id: CharacterId, destination: Vec2) -> Self {
        Self::new(
            tick,
            EventPriority::Movement,
            GameEventData::Teleported { character_id, destination },
        )
    }

    /// Create hook attached event.
    pub fn hook_attached(tick: u32, character_id: CharacterId, anchor: Vec2) -> Self {
        Self::new(
            tick,
            EventPriority::Movement,
            GameEventData::HookAttached { character_id, anchor },
        )
    }

    /// Create weapon fired event.
    pub fn weapon_fired(tick: u32, character_id: CharacterId, weapon: WeaponKind) -> Self {
        Self::new(
            tick,
            EventPriority::Combat,
            GameEventData::WeaponFired { character_id, weapon },
        )
    }

    /// Create invariant reset event.
    pub fn invariant_reset(tick: u32, character_id: CharacterId) -> Self {
        Self::new(tick, EventPriority::Other, GameEventData::InvariantReset { character_id })
    }

    /// Create round started event.
    pub fn round_started(tick: u32) -> Self {
        Self::new(tick, EventPriority::Other, GameEventData::RoundStarted)
    }

    /// Create round ended event.
    pub fn round_ended(tick: u32, winner_id: Option<CharacterId>, winning_team: Option<u8>) -> Self {
        Self::new(
            tick,
            EventPriority::Other,
            GameEventData::RoundEnded { winner_id, winning_team },
        )
    }
}

impl PartialEq for GameEvent {
    fn eq(&self, other: &Self) -> bool {
        self.tick == other.tick
            && self.priority == other.priority
            && self.character_id == other.character_id
    }
}

impl Eq for GameEvent {}

impl PartialOrd for GameEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GameEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Sort by: tick, then priority, then character id
        self.tick
            .cmp(&other.tick)
            .then(self.priority.cmp(&other.priority))
            .then(self.character_id.cmp(&other.character_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ordering() {
        let a = CharacterId(1);
        let b = CharacterId(2);

        let death = GameEvent::killed(10, a, Some(b), Some(WeaponKind::Gun));
        let fired = GameEvent::weapon_fired(10, a, WeaponKind::Gun);
        let other_death = GameEvent::killed(10, b, None, None);

        // Same tick, but elimination < combat
        assert!(death < fired);

        // Same tick and priority, but a < b
        assert!(death < other_death);

        // Earlier tick always first
        assert!(GameEvent::round_ended(9, None, Some(1)) < death);
    }

    #[test]
    fn test_character_id_extracted() {
        let event = GameEvent::killed(1, CharacterId(3), Some(CharacterId(4)), None);
        assert_eq!(event.character_id, Some(CharacterId(3)));
        assert_eq!(GameEvent::round_ended(1, None, Some(2)).character_id, None);
    }
}
