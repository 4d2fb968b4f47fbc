//! Physics Tuning
//!
//! Every movement and hook constant lives here so servers can ship a
//! different feel without recompiling. Values are in world units and
//! seconds; the defaults reproduce the classic 50 Hz feel.

use std::path::Path;
use serde::{Serialize, Deserialize};

use crate::config::ConfigError;
use crate::core::vec2::Vec2;
use crate::game::map::TILE_SIZE;

/// Movement, gravity, jump and hook constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Character box side length
    pub character_size: f32,

    /// Max horizontal speed reachable by input on the ground (units/s)
    pub ground_control_speed: f32,
    /// Horizontal acceleration on the ground (units/s^2)
    pub ground_control_accel: f32,
    /// Velocity multiplier per tick on the ground with no input
    pub ground_friction: f32,
    /// Max horizontal speed reachable by input in the air (units/s)
    pub air_control_speed: f32,
    /// Horizontal acceleration in the air (units/s^2)
    pub air_control_accel: f32,
    /// Velocity multiplier per tick in the air with no input (1.0 = none)
    pub air_friction: f32,

    /// Downward acceleration (units/s^2)
    pub gravity: f32,
    /// Max downward speed (units/s)
    pub terminal_fall_speed: f32,
    /// Upward speed set by a grounded jump (units/s)
    pub ground_jump_impulse: f32,
    /// Upward speed set by an air jump (units/s)
    pub air_jump_impulse: f32,
    /// Jumps available after leaving the ground
    pub air_jumps: u8,

    /// Hook travel speed while flying (units/s)
    pub hook_fire_speed: f32,
    /// Max distance between character and flying hook
    pub hook_length: f32,
    /// Ticks a hook may fly before it gives up
    pub hook_flight_ticks: u32,
    /// Ticks spent retracting before the hook is idle again
    pub hook_retract_ticks: u32,
    /// Pull acceleration toward the anchor (units/s^2)
    pub hook_drag_accel: f32,
    /// Speed above which the hook stops adding pull (units/s)
    pub hook_drag_speed: f32,
    /// No pull closer than this to the anchor
    pub hook_min_pull_distance: f32,

    /// Ticks of ignored input after touching a freeze tile
    pub freeze_ticks: u32,
    /// Per-axis velocity limit (units/s)
    pub max_velocity: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            character_size: 28.0,

            ground_control_speed: 500.0,
            ground_control_accel: 5000.0,
            ground_friction: 0.5,
            air_control_speed: 250.0,
            air_control_accel: 3750.0,
            air_friction: 1.0,

            gravity: 1250.0,
            terminal_fall_speed: 1000.0,
            ground_jump_impulse: 660.0,
            air_jump_impulse: 600.0,
            air_jumps: 1,

            hook_fire_speed: 4000.0,
            hook_length: 380.0,
            hook_flight_ticks: 30,
            hook_retract_ticks: 3,
            hook_drag_accel: 7500.0,
            hook_drag_speed: 750.0,
            hook_min_pull_distance: 46.0,

            freeze_ticks: 150,
            max_velocity: 6000.0,
        }
    }
}

impl Tuning {
    /// Half extents of the character box.
    #[inline]
    pub fn half_extents(&self) -> Vec2 {
        let h = self.character_size / 2.0;
        Vec2::new(h, h)
    }

    /// Parse tuning from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let tuning: Self = serde_json::from_str(json)
            .map_err(|e| ConfigError::Invalid { key: "tuning", reason: e.to_string() })?;
        tuning.validate()?;
        Ok(tuning)
    }

    /// Load tuning from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json(&text)
    }

    /// Reject values that would break the simulation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("character_size", self.character_size),
            ("gravity", self.gravity),
            ("terminal_fall_speed", self.terminal_fall_speed),
            ("hook_fire_speed", self.hook_fire_speed),
            ("hook_length", self.hook_length),
            ("max_velocity", self.max_velocity),
        ];
        for (key, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid {
                    key: "tuning",
                    reason: format!("{key} must be positive, got {value}"),
                });
            }
        }
        if self.character_size >= TILE_SIZE {
            return Err(ConfigError::Invalid {
                key: "tuning",
                reason: "character_size must be smaller than a tile".into(),
            });
        }
        for (key, value) in [("ground_friction", self.ground_friction), ("air_friction", self.air_friction)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    key: "tuning",
                    reason: format!("{key} must be within [0, 1], got {value}"),
                });
            }
        }
        Ok(())
    }
}
