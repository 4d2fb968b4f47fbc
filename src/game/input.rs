//! Input Frames and Buffering
//!
//! Clients send one [`InputFrame`] per tick carrying held-button levels.
//! Press edges are derived during the physics step by comparing against the
//! buttons the character held on the previous tick, so a lost or repeated
//! frame can never fabricate a press.

use std::collections::VecDeque;
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::weapon::WeaponKind;

// =============================================================================
// INPUT TYPES
// =============================================================================

/// One tick of player intent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InputFrame {
    /// Monotonically increasing per-client sequence number
    pub sequence: u32,

    /// Horizontal intent: -1 (left), 0, +1 (right)
    pub direction: i8,

    /// Aim vector relative to the character (need not be normalized)
    pub aim: Vec2,

    /// Held buttons (packed bits):
    /// - Bit 0: Jump
    /// - Bit 1: Hook
    /// - Bit 2: Fire
    pub buttons: u8,

    /// Requested weapon
    pub weapon: WeaponKind,
}

impl InputFrame {
    /// Jump button bit
    pub const FLAG_JUMP: u8 = 0x01;

    /// Hook button bit
    pub const FLAG_HOOK: u8 = 0x02;

    /// Fire button bit
    pub const FLAG_FIRE: u8 = 0x04;

    /// Create an idle frame with a sequence number.
    pub fn new(sequence: u32) -> Self {
        Self {
            sequence,
            ..Self::default()
        }
    }

    /// Builder: set horizontal direction.
    pub fn with_direction(mut self, direction: i8) -> Self {
        self.direction = direction;
        self
    }

    /// Builder: set aim vector.
    pub fn with_aim(mut self, aim: Vec2) -> Self {
        self.aim = aim;
        self
    }

    /// Builder: set weapon selection.
    pub fn with_weapon(mut self, weapon: WeaponKind) -> Self {
        self.weapon = weapon;
        self
    }

    /// Builder: set or clear a button.
    pub fn with_button(mut self, flag: u8, held: bool) -> Self {
        self.set_button(flag, held);
        self
    }

    /// Set or clear a button.
    #[inline]
    pub fn set_button(&mut self, flag: u8, held: bool) {
        if held {
            self.buttons |= flag;
        } else {
            self.buttons &= !flag;
        }
    }

    /// Horizontal direction clamped to -1, 0 or 1.
    #[inline]
    pub fn move_direction(&self) -> f32 {
        self.direction.signum() as f32
    }

    /// Unit aim direction, or zero if aim is degenerate.
    #[inline]
    pub fn aim_direction(&self) -> Vec2 {
        self.aim.normalize()
    }

    /// Jump held this frame.
    #[inline]
    pub fn jump_held(&self) -> bool {
        self.buttons & Self::FLAG_JUMP != 0
    }

    /// Hook held this frame.
    #[inline]
    pub fn hook_held(&self) -> bool {
        self.buttons & Self::FLAG_HOOK != 0
    }

    /// Fire held this frame.
    #[inline]
    pub fn fire_held(&self) -> bool {
        self.buttons & Self::FLAG_FIRE != 0
    }

    /// Copy of this frame with all intent removed (used while frozen).
    pub fn neutralized(&self) -> Self {
        Self {
            sequence: self.sequence,
            weapon: self.weapon,
            ..Self::default()
        }
    }

    /// Replace non-finite aim so a hostile client cannot inject NaN.
    pub fn sanitized(mut self) -> Self {
        if !self.aim.is_finite() {
            self.aim = Vec2::ZERO;
        }
        self.direction = self.direction.signum();
        self
    }
}

/// True if `flag` is held now but was not held on the previous tick.
#[inline]
pub fn pressed(previous: u8, current: u8, flag: u8) -> bool {
    current & flag != 0 && previous & flag == 0
}

// =============================================================================
// INPUT QUEUE (server side)
// =============================================================================

/// What happened to a frame offered to an [`InputQueue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputDisposition {
    /// Buffered for a future tick
    Queued,
    /// Sequence not newer than one already received; dropped
    Stale,
    /// Buffered, but the oldest pending frame was evicted to make room
    Evicted,
    /// No such character; dropped
    Unknown,
}

/// Per-character buffer of received frames, consumed one per tick.
///
/// Frames are accepted only with a sequence strictly greater than every
/// sequence seen before, so a late frame is never applied retroactively.
#[derive(Clone, Debug)]
pub struct InputQueue {
    pending: VecDeque<InputFrame>,
    highest_received: Option<u32>,
    current: InputFrame,
    capacity: usize,
}

impl InputQueue {
    /// Default number of frames buffered ahead of the simulation.
    pub const DEFAULT_CAPACITY: usize = 32;

    /// Create an empty queue.
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity),
            highest_received: None,
            current: InputFrame::default(),
            capacity: capacity.max(1),
        }
    }

    /// Offer a frame received from the client.
    pub fn push(&mut self, frame: InputFrame) -> InputDisposition {
        if let Some(highest) = self.highest_received {
            if frame.sequence <= highest {
                return InputDisposition::Stale;
            }
        }
        self.highest_received = Some(frame.sequence);

        let mut disposition = InputDisposition::Queued;
        if self.pending.len() >= self.capacity {
            self.pending.pop_front();
            disposition = InputDisposition::Evicted;
        }
        self.pending.push_back(frame.sanitized());
        disposition
    }

    /// Frame to simulate this tick.
    ///
    /// Pops the oldest pending frame; when none is pending the previous
    /// frame is held (same sequence, so nothing new is acknowledged).
    pub fn next_for_tick(&mut self) -> InputFrame {
        if let Some(frame) = self.pending.pop_front() {
            self.current = frame;
        }
        self.current
    }

    /// Sequence of the most recently consumed frame (0 before any).
    pub fn last_consumed_sequence(&self) -> u32 {
        self.current.sequence
    }

    /// Frames waiting to be simulated.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for InputQueue {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

// =============================================================================
// TESTS
// =============================================================================
