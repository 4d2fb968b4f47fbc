//! Client-Side Prediction
//!
//! The client runs [`physics_step`] on its own character the moment an
//! input is produced instead of waiting a round trip. Each authoritative
//! snapshot then replaces the predicted state with the server's value for
//! the last acknowledged input, and every input sent after it is replayed
//! through the same function.
//!
//! Unacknowledged inputs live in a ring of [`PREDICTION_WINDOW`] frames.
//! If the server falls further behind than that, the replay base is lost
//! and the next snapshot is adopted as-is (a full resync).

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::MatchConfig;
use crate::game::input::InputFrame;
use crate::game::map::GameMap;
use crate::game::physics::{physics_step, PhysicsEnv};
use crate::game::snapshot::Snapshot;
use crate::game::state::{Character, CharacterId};

/// Unacknowledged inputs kept for replay.
pub const PREDICTION_WINDOW: usize = 64;

/// What a reconcile did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Reconciliation {
    /// Adopted the server state and replayed pending inputs.
    Replayed {
        /// Inputs replayed on top of the server state
        replayed: usize,
        /// Distance between the old and the corrected prediction
        correction: f32,
    },
    /// Pending inputs overflowed; server state adopted with nothing replayed.
    Resynced,
    /// Snapshot acknowledged less than an earlier one; ignored.
    Stale,
    /// Our character is not in the snapshot (dead slot or removed).
    Missing,
}

/// Predicts the locally controlled character.
pub struct Predictor {
    character_id: CharacterId,
    map: Arc<GameMap>,
    config: MatchConfig,
    predicted: Character,
    pending: VecDeque<InputFrame>,
    next_sequence: u32,
    last_acked: u32,
    overflowed: bool,
    resyncs: u64,
}

impl Predictor {
    /// Start predicting from the join snapshot.
    ///
    /// Returns `None` if the character is not in the snapshot.
    pub fn new(
        character_id: CharacterId,
        snapshot: &Snapshot,
        map: Arc<GameMap>,
        config: MatchConfig,
    ) -> Option<Self> {
        let predicted = snapshot.character(character_id)?.clone();
        let last_acked = snapshot.ack_for(character_id).unwrap_or(0);
        Some(Self {
            character_id,
            map,
            config,
            predicted,
            pending: VecDeque::with_capacity(PREDICTION_WINDOW),
            next_sequence: last_acked + 1,
            last_acked,
            overflowed: false,
            resyncs: 0,
        })
    }

    /// Build the next input frame with a fresh sequence number.
    pub fn next_frame(&mut self) -> InputFrame {
        let frame = InputFrame::new(self.next_sequence);
        self.next_sequence = self.next_sequence.wrapping_add(1);
        frame
    }

    /// Apply a locally produced input immediately and remember it for replay.
    pub fn predict(&mut self, frame: InputFrame) -> &Character {
        let frame = frame.sanitized();
        if self.pending.len() == PREDICTION_WINDOW {
            self.pending.pop_front();
            if !self.overflowed {
                warn!(character = %self.character_id, "prediction window overflowed, will resync");
            }
            self.overflowed = true;
        }
        self.pending.push_back(frame);
        self.next_sequence = self.next_sequence.max(frame.sequence.wrapping_add(1));
        step(&mut self.predicted, &frame, &self.map, &self.config);
        &self.predicted
    }

    /// Correct the prediction against an authoritative snapshot.
    pub fn reconcile(&mut self, snapshot: &Snapshot) -> Reconciliation {
        let Some(authoritative) = snapshot.character(self.character_id) else {
            return Reconciliation::Missing;
        };
        let ack = snapshot.ack_for(self.character_id).unwrap_or(0);
        if ack < self.last_acked {
            return Reconciliation::Stale;
        }
        self.last_acked = ack;

        while self.pending.front().is_some_and(|f| f.sequence <= ack) {
            self.pending.pop_front();
        }

        let before = self.predicted.position;
        self.predicted = authoritative.clone();

        // Inputs between the ack and the oldest kept frame were evicted
        let gap = self
            .pending
            .front()
            .is_some_and(|f| f.sequence > ack.wrapping_add(1));
        if self.overflowed && gap {
            self.pending.clear();
            self.overflowed = false;
            self.resyncs += 1;
            debug!(character = %self.character_id, ack, "prediction resynced");
            return Reconciliation::Resynced;
        }
        self.overflowed = false;

        for frame in &self.pending {
            step(&mut self.predicted, frame, &self.map, &self.config);
        }

        Reconciliation::Replayed {
            replayed: self.pending.len(),
            correction: before.distance(self.predicted.position),
        }
    }

    /// Current predicted state of the local character.
    pub fn predicted(&self) -> &Character {
        &self.predicted
    }

    /// Controlled character.
    pub fn character_id(&self) -> CharacterId {
        self.character_id
    }

    /// Inputs sent but not yet acknowledged.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Highest acknowledged sequence seen.
    pub fn last_acked(&self) -> u32 {
        self.last_acked
    }

    /// Full resyncs so far.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }
}

/// The same per-character work the server does each tick, minus combat.
fn step(character: &mut Character, frame: &InputFrame, map: &GameMap, config: &MatchConfig) {
    if !character.alive {
        return;
    }
    character.weapon = frame.weapon;
    let env = PhysicsEnv {
        map,
        tuning: &config.tuning,
        freeze_enabled: config.freeze_enabled,
    };
    physics_step(character, frame, &env, config.dt());
}
