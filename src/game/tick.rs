//! Authoritative Simulation Tick
//!
//! One call to [`tick`] advances the whole world by one fixed step. Given
//! the same world, inputs, rules and mode it always produces the same
//! world: characters are visited in id order, inputs come from a BTreeMap
//! and all randomness comes from `world.rng`.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::config::MatchConfig;
use crate::core::vec2::Vec2;
use crate::game::events::GameEvent;
use crate::game::input::{pressed, InputFrame};
use crate::game::map::GameMap;
use crate::game::mode::{GameMode, RoundResult};
use crate::game::physics::{physics_step, PhysicsEnv};
use crate::game::state::{Character, CharacterId, HookState, Kill, RoundPhase, WorldState};
use crate::game::weapon::{
    advance_projectiles, fire_weapon, tick_weapon_timers, BallisticsContext, FireOutcome,
};

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick
    pub events: Vec<GameEvent>,
    /// Deaths resolved this tick
    pub kills: Vec<Kill>,
    /// Set when the round ended this tick
    pub round_ended: Option<RoundResult>,
    /// Characters reset after an invariant violation
    pub resets: Vec<CharacterId>,
}

/// Run one simulation tick.
///
/// # Arguments
///
/// * `world` - The world state (will be mutated)
/// * `map` - Immutable map resource
/// * `inputs` - Input per character for this tick (missing = idle)
/// * `config` - Match rules
/// * `mode` - Scoring and spawn policy
pub fn tick(
    world: &mut WorldState,
    map: &GameMap,
    inputs: &BTreeMap<CharacterId, InputFrame>,
    config: &MatchConfig,
    mode: &dyn GameMode,
) -> TickResult {
    let mut result = TickResult::default();

    // 0. Advance tick counter
    world.tick += 1;

    // 1. Round restart after the scoreboard pause
    if let RoundPhase::Ended { at_tick } = world.phase {
        if world.tick.saturating_sub(at_tick) >= config.round_restart_ticks {
            restart_round(world, map, config, mode);
        }
    }
    let playing = !world.is_ended();

    // 2. Respawn characters whose delay ran out
    process_respawns(world, map, config, mode);

    // 3. Movement
    let fire_requests = update_characters(world, map, inputs, config, &mut result);

    // 4. Projectiles already in flight, then new shots
    let ctx = BallisticsContext {
        map,
        table: &config.weapons,
        rules: &config.ballistics,
        dt: config.dt(),
        character_size: config.tuning.character_size,
    };
    result.kills.extend(advance_projectiles(world, &ctx));
    if playing {
        for (id, aim) in fire_requests {
            process_fire(world, &ctx, id, aim, &mut result);
        }
    }

    // 5. Knockback can push past the velocity clamp
    clamp_speeds(world, config);

    // 6. Deaths and scoring
    process_kills(world, config, mode, playing, &result.kills);

    // 7. Round end
    if playing {
        if let Some(round) = mode.check_round_end(world, config) {
            world.phase = RoundPhase::Ended { at_tick: world.tick };
            world.push_event(GameEvent::round_ended(world.tick, round.winner, round.winning_team));
            result.round_ended = Some(round);
        }
    }

    // Collect events
    let mut events = world.take_events();
    events.sort();
    result.events = events;

    result
}

/// Respawn every dead character whose delay has elapsed.
fn process_respawns(world: &mut WorldState, map: &GameMap, config: &MatchConfig, mode: &dyn GameMode) {
    for id in world.character_ids() {
        let Some(character) = world.character_mut(id) else { continue };
        if character.alive {
            continue;
        }
        character.respawn_ticks = character.respawn_ticks.saturating_sub(1);
        if character.respawn_ticks > 0 {
            continue;
        }
        let team = character.team;
        let spawn = mode.choose_spawn(world, map, id, team);
        if let Some(character) = world.character_mut(id) {
            character.respawn(spawn, config.max_health, &config.weapons);
        }
        let tick = world.tick;
        world.push_event(GameEvent::respawned(tick, id, spawn));
    }
}

/// Apply inputs and physics to every live character.
///
/// Returns the fire requests (press edges) in id order.
fn update_characters(
    world: &mut WorldState,
    map: &GameMap,
    inputs: &BTreeMap<CharacterId, InputFrame>,
    config: &MatchConfig,
    result: &mut TickResult,
) -> Vec<(CharacterId, Vec2)> {
    let env = PhysicsEnv {
        map,
        tuning: &config.tuning,
        freeze_enabled: config.freeze_enabled,
    };
    let dt = config.dt();
    let tick = world.tick;
    let mut fire_requests = Vec::new();
    let mut events = Vec::new();

    for id in world.character_ids() {
        let Some(character) = world.character_mut(id) else { continue };
        if !character.alive {
            continue;
        }
        let input = inputs.get(&id).copied().unwrap_or_default();

        // Weapon switch does not touch the cooldown
        character.weapon = input.weapon;
        tick_weapon_timers(character, &config.weapons);

        let fire_edge = character.frozen_ticks == 0
            && pressed(character.last_buttons, input.buttons, InputFrame::FLAG_FIRE);

        // NaN must never reach the sweep; the step itself can overflow
        if reset_if_non_finite(character, tick, &mut events, result) {
            continue;
        }
        let outcome = physics_step(character, &input, &env, dt);
        if reset_if_non_finite(character, tick, &mut events, result) {
            continue;
        }

        if let Some(destination) = outcome.teleported {
            events.push(GameEvent::teleported(tick, id, destination));
        }
        if outcome.hook_changed == Some(HookState::Grabbed) {
            events.push(GameEvent::hook_attached(tick, id, character.hook.position));
        }
        if outcome.died {
            result.kills.push(Kill { victim: id, killer: None, weapon: None });
        } else if fire_edge {
            fire_requests.push((id, input.aim));
        }
    }

    for event in events {
        world.push_event(event);
    }
    fire_requests
}

/// Reset a character whose position or velocity is no longer finite.
fn reset_if_non_finite(
    character: &mut Character,
    tick: u32,
    events: &mut Vec<GameEvent>,
    result: &mut TickResult,
) -> bool {
    if character.position.is_finite() && character.velocity.is_finite() {
        return false;
    }
    let id = character.id;
    warn!(
        character = %id,
        tick,
        position = %character.position,
        velocity = %character.velocity,
        "non-finite character state, resetting to spawn"
    );
    character.reset_to_spawn();
    events.push(GameEvent::invariant_reset(tick, id));
    result.resets.push(id);
    true
}

fn process_fire(
    world: &mut WorldState,
    ctx: &BallisticsContext<'_>,
    id: CharacterId,
    aim: Vec2,
    result: &mut TickResult,
) {
    let weapon = match world.character(id) {
        Some(c) => c.weapon,
        None => return,
    };
    match fire_weapon(world, ctx, id, aim) {
        FireOutcome::Launched { .. } => {
            world.push_event(GameEvent::weapon_fired(world.tick, id, weapon));
        }
        FireOutcome::Resolved { kills, .. } => {
            world.push_event(GameEvent::weapon_fired(world.tick, id, weapon));
            result.kills.extend(kills);
        }
        FireOutcome::Rejected => {
            debug!(character = %id, tick = world.tick, "projectile cap reached");
        }
        FireOutcome::CoolingDown | FireOutcome::OutOfAmmo | FireOutcome::Unavailable => {}
    }
}

fn clamp_speeds(world: &mut WorldState, config: &MatchConfig) {
    let limit = config.tuning.max_velocity;
    for slot in world.characters.iter_mut() {
        let Some(character) = slot.as_mut() else { continue };
        let v = character.velocity;
        if v.x.abs() > limit || v.y.abs() > limit {
            debug!(character = %character.id, velocity = %v, "speed clamped");
            character.velocity = v.clamp_abs(limit);
        }
    }
}

/// Schedule respawns, emit kill events and credit the mode.
fn process_kills(
    world: &mut WorldState,
    config: &MatchConfig,
    mode: &dyn GameMode,
    playing: bool,
    kills: &[Kill],
) {
    for kill in kills {
        let Some(victim) = world.character_mut(kill.victim) else { continue };
        victim.respawn_ticks = config.respawn_ticks.max(1);
        victim.velocity = Vec2::ZERO;
        victim.hook = Default::default();

        let tick = world.tick;
        world.push_event(GameEvent::killed(tick, kill.victim, kill.killer, kill.weapon));
        if playing {
            mode.on_kill(world, kill);
        }
    }
}

/// Reset scores and respawn everyone for a new round.
pub fn restart_round(world: &mut WorldState, map: &GameMap, config: &MatchConfig, mode: &dyn GameMode) {
    world.phase = RoundPhase::Playing;
    world.round_start_tick = world.tick;
    world.team_scores.clear();
    world.projectiles.clear();

    for id in world.character_ids() {
        let team = match world.character_mut(id) {
            Some(c) => {
                c.score = 0;
                c.kills = 0;
                c.deaths = 0;
                c.alive = false;
                c.team
            }
            None => continue,
        };
        let spawn = mode.choose_spawn(world, map, id, team);
        if let Some(c) = world.character_mut(id) {
            c.respawn(spawn, config.max_health, &config.weapons);
        }
    }
    let tick = world.tick;
    world.push_event(GameEvent::round_started(tick));
}

/// Replay a match from recorded inputs.
///
/// Returns the final world and every event.
pub fn replay_match(
    initial: WorldState,
    map: &GameMap,
    inputs: &BTreeMap<CharacterId, Vec<InputFrame>>,
    tick_count: u32,
    config: &MatchConfig,
    mode: &dyn GameMode,
) -> (WorldState, Vec<GameEvent>) {
    let mut world = initial;
    let mut all_events = Vec::new();

    for t in 0..tick_count {
        let tick_inputs: BTreeMap<CharacterId, InputFrame> = inputs
            .iter()
            .map(|(id, frames)| (*id, frames.get(t as usize).copied().unwrap_or_default()))
            .collect();
        let result = tick(&mut world, map, &tick_inputs, config, mode);
        all_events.extend(result.events);
    }

    (world, all_events)
}

// =============================================================================
// TESTS
// =============================================================================
