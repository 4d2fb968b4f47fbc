//! Character Physics
//!
//! [`physics_step`] advances one character by one tick. It is a pure
//! function of (character, input, map, tuning, dt): the server runs it for
//! every live character and clients replay it for prediction, so it must
//! never read anything else.
//!
//! Order per tick:
//! 1. horizontal acceleration / friction
//! 2. gravity, clamped to terminal fall speed
//! 3. jump (ground jump or one of the air jumps)
//! 4. hook state machine
//! 5. swept integration, X then Y
//! 6. tile effects (death, teleport, freeze)

use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::collision::Aabb;
use crate::game::input::{pressed, InputFrame};
use crate::game::map::{GameMap, TeleportMode};
use crate::game::state::{Character, Hook, HookState};
use crate::game::tuning::Tuning;

/// Read-only environment of a physics step.
#[derive(Clone, Copy, Debug)]
pub struct PhysicsEnv<'a> {
    /// Map geometry
    pub map: &'a GameMap,
    /// Movement constants
    pub tuning: &'a Tuning,
    /// Whether freeze tiles are active in this mode
    pub freeze_enabled: bool,
}

/// What happened during one step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicsOutcome {
    /// A jump was performed
    pub jumped: bool,
    /// The character touched ground after being airborne
    pub landed: bool,
    /// New hook state, if it changed
    pub hook_changed: Option<HookState>,
    /// Touched a death tile
    pub died: bool,
    /// Teleported to this position
    pub teleported: Option<Vec2>,
    /// Touched a freeze tile
    pub frozen: bool,
}

/// Add `modifier` to `current` without pushing it past `[min, max]`.
///
/// A value already outside the range is never pulled back by input, so
/// hook or knockback speed survives holding a direction.
#[inline]
pub fn saturated_add(min: f32, max: f32, current: f32, modifier: f32) -> f32 {
    if modifier < 0.0 {
        if current < min {
            return current;
        }
        (current + modifier).max(min)
    } else {
        if current > max {
            return current;
        }
        (current + modifier).min(max)
    }
}

/// True if solid ground lies directly beneath the box.
fn standing_on_solid(map: &GameMap, position: Vec2, half: Vec2) -> bool {
    let feet = Aabb {
        min: Vec2::new(position.x - half.x, position.y + half.y),
        max: Vec2::new(position.x + half.x, position.y + half.y + 1.0),
    };
    map.grid.rect_overlaps_solid(&feet)
}

/// Advance one character by one tick.
pub fn physics_step(
    character: &mut Character,
    input: &InputFrame,
    env: &PhysicsEnv<'_>,
    dt: f32,
) -> PhysicsOutcome {
    let mut outcome = PhysicsOutcome::default();
    if !character.alive {
        return outcome;
    }
    let tuning = env.tuning;

    // Edges are taken against the real held buttons, so a button held
    // through a freeze does not count as pressed when it ends.
    let held = character.last_buttons;
    character.last_buttons = input.buttons;
    let input = if character.frozen_ticks > 0 {
        character.frozen_ticks -= 1;
        input.neutralized()
    } else {
        *input
    };
    let jump_edge = pressed(held, input.buttons, InputFrame::FLAG_JUMP);
    let hook_edge = pressed(held, input.buttons, InputFrame::FLAG_HOOK);

    let direction = input.move_direction();
    if direction != 0.0 {
        character.facing = direction as i8;
    }

    // 1. Horizontal control
    let (max_speed, accel, friction) = if character.grounded {
        (tuning.ground_control_speed, tuning.ground_control_accel, tuning.ground_friction)
    } else {
        (tuning.air_control_speed, tuning.air_control_accel, tuning.air_friction)
    };
    if direction != 0.0 {
        character.velocity.x =
            saturated_add(-max_speed, max_speed, character.velocity.x, direction * accel * dt);
    } else {
        character.velocity.x *= friction;
    }

    // 2. Gravity
    character.velocity.y =
        (character.velocity.y + tuning.gravity * dt).min(tuning.terminal_fall_speed);

    // 3. Jump
    if jump_edge {
        if character.grounded {
            character.velocity.y = -tuning.ground_jump_impulse;
            character.grounded = false;
            outcome.jumped = true;
        } else if character.jumps_remaining > 0 {
            character.velocity.y = -tuning.air_jump_impulse;
            character.jumps_remaining -= 1;
            outcome.jumped = true;
        }
    }

    // 4. Hook
    let hook_before = character.hook.state;
    step_hook(character, &input, hook_edge, env, dt);
    if character.hook.state != hook_before {
        outcome.hook_changed = Some(character.hook.state);
    }

    // 5. Integrate
    character.velocity = character.velocity.clamp_abs(tuning.max_velocity);
    let half = tuning.half_extents();
    let moved = env.map.grid.move_box(character.position, half, character.velocity * dt);
    character.position = moved.position;
    if moved.blocked_x {
        character.velocity.x = 0.0;
    }
    let falling = character.velocity.y > 0.0;
    if moved.blocked_y {
        character.velocity.y = 0.0;
    }
    let was_grounded = character.grounded;
    character.grounded = (moved.blocked_y && falling)
        || (character.velocity.y >= 0.0 && standing_on_solid(env.map, character.position, half));
    if character.grounded {
        character.jumps_remaining = tuning.air_jumps;
        outcome.landed = !was_grounded;
    }

    // 6. Tile effects
    apply_tile_effects(character, env, &mut outcome);

    outcome
}

fn apply_tile_effects(character: &mut Character, env: &PhysicsEnv<'_>, outcome: &mut PhysicsOutcome) {
    let half = env.tuning.half_extents();
    let tiles = env.map.grid.tiles_in_rect(&Aabb::from_center(character.position, half));

    if tiles.iter().any(|t| t.is_death()) {
        character.alive = false;
        character.hook = Hook::default();
        outcome.died = true;
        return;
    }

    if let Some((destination, mode)) = tiles.iter().find_map(|t| env.map.teleport_for(*t)) {
        character.position = destination;
        if mode == TeleportMode::Stop {
            character.velocity = Vec2::ZERO;
        }
        if character.hook.state != HookState::Idle {
            character.hook = Hook::default();
            outcome.hook_changed = Some(HookState::Idle);
        }
        character.grounded = false;
        outcome.teleported = Some(destination);
    }

    if env.freeze_enabled && tiles.iter().any(|t| t.is_freeze()) {
        character.frozen_ticks = env.tuning.freeze_ticks;
        outcome.frozen = true;
    }
}

// =============================================================================
// HOOK
// =============================================================================

fn step_hook(character: &mut Character, input: &InputFrame, hook_edge: bool, env: &PhysicsEnv<'_>, dt: f32) {
    let tuning = env.tuning;
    let held = input.hook_held();

    match character.hook.state {
        HookState::Idle => {
            if hook_edge {
                let aim = input.aim_direction();
                let direction = if aim == Vec2::ZERO {
                    Vec2::new(character.facing as f32, 0.0)
                } else {
                    aim
                };
                character.hook = Hook {
                    state: HookState::Flying,
                    position: character.position,
                    direction,
                    ticks: 0,
                };
                advance_flying_hook(character, env, dt);
            }
        }
        HookState::Flying => {
            if held {
                advance_flying_hook(character, env, dt);
            } else {
                character.hook = Hook::default();
            }
        }
        HookState::Grabbed => {
            if held {
                character.hook.ticks += 1;
                apply_hook_pull(character, input, tuning, dt);
            } else {
                character.hook.state = HookState::Retracting;
                character.hook.ticks = 0;
            }
        }
        HookState::Retracting => {
            character.hook.ticks += 1;
            if character.hook.ticks >= tuning.hook_retract_ticks {
                character.hook = Hook::default();
            }
        }
    }
}

fn advance_flying_hook(character: &mut Character, env: &PhysicsEnv<'_>, dt: f32) {
    let tuning = env.tuning;
    let hook = &mut character.hook;
    hook.ticks += 1;

    let from = hook.position;
    let mut to = from + hook.direction * (tuning.hook_fire_speed * dt);
    let mut exhausted = hook.ticks >= tuning.hook_flight_ticks;
    let reach = to - character.position;
    if reach.length_squared() > tuning.hook_length * tuning.hook_length {
        to = character.position + reach.normalize() * tuning.hook_length;
        exhausted = true;
    }

    if let Some(hit) = env.map.grid.intersect_line(from, to) {
        hook.state = HookState::Grabbed;
        hook.position = hit.point;
        hook.ticks = 0;
    } else if exhausted {
        hook.state = HookState::Retracting;
        hook.position = to;
        hook.ticks = 0;
    } else {
        hook.position = to;
    }
}

/// Accelerate toward the anchor. Pull is weaker downward, and stronger
/// horizontally when it agrees with the movement input. It only applies
/// while it does not push speed past `hook_drag_speed`.
fn apply_hook_pull(character: &mut Character, input: &InputFrame, tuning: &Tuning, dt: f32) {
    let to_anchor = character.hook.position - character.position;
    if to_anchor.length() <= tuning.hook_min_pull_distance {
        return;
    }

    let mut pull = to_anchor.normalize() * (tuning.hook_drag_accel * dt);
    if pull.y > 0.0 {
        pull.y *= 0.3;
    }
    let direction = input.move_direction();
    if (pull.x < 0.0 && direction < 0.0) || (pull.x > 0.0 && direction > 0.0) {
        pull.x *= 0.95;
    } else {
        pull.x *= 0.75;
    }

    let new_velocity = character.velocity + pull;
    let new_speed = new_velocity.length();
    if new_speed < tuning.hook_drag_speed || new_speed < character.velocity.length() {
        character.velocity = new_velocity;
    }
}

// =============================================================================
// TESTS
// =============================================================================
