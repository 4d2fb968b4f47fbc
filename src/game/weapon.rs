//! Weapon Ballistics
//!
//! Weapons are a closed enum plus a per-kind parameter table. Firing
//! resolves melee and hitscan immediately and spawns physical projectiles
//! for the rest; [`advance_projectiles`] moves them once per tick and
//! resolves wall and character hits.

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::core::vec2::Vec2;
use crate::game::collision::Aabb;
use crate::game::map::GameMap;
use crate::game::state::{Character, CharacterId, Kill, Projectile, WorldState, NO_TEAM};

// =============================================================================
// WEAPON KINDS
// =============================================================================

/// Every weapon in the game.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum WeaponKind {
    /// Melee swing in front of the character
    Hammer = 0,
    /// Single fast bullet
    #[default]
    Gun = 1,
    /// Spread of short-lived pellets
    Shotgun = 2,
    /// Bouncing explosive under gravity
    Grenade = 3,
    /// Instant laser stopped by walls
    Rifle = 4,
}

impl WeaponKind {
    /// Number of weapon kinds
    pub const COUNT: usize = 5;

    /// All kinds in table order.
    pub const ALL: [WeaponKind; Self::COUNT] = [
        WeaponKind::Hammer,
        WeaponKind::Gun,
        WeaponKind::Shotgun,
        WeaponKind::Grenade,
        WeaponKind::Rifle,
    ];

    /// Table index.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// How a weapon delivers damage.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum FireBehavior {
    /// Instant hit on every target within `range` and inside the arc
    /// `dot(aim, to_target) >= arc_cos`
    Melee {
        /// Reach from the character center
        range: f32,
        /// Cosine of the half arc angle
        arc_cos: f32,
    },
    /// Spawns projectiles that travel each tick
    Projectile,
    /// Instant ray up to `reach`, stopped by the first wall
    Hitscan {
        /// Max ray length
        reach: f32,
    },
}

/// Parameters of one weapon kind.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeaponSpec {
    /// Delivery behavior
    pub behavior: FireBehavior,
    /// Ticks between shots
    pub cooldown_ticks: u32,
    /// Damage per hit
    pub damage: i32,
    /// Projectiles per shot
    pub pellets: u8,
    /// Lateral spread of the outermost pellet (tangent of its angle)
    pub spread: f32,
    /// Projectile speed (units/s)
    pub speed: f32,
    /// Projectile lifetime
    pub lifetime_ticks: u32,
    /// Downward acceleration on the projectile (units/s^2)
    pub gravity: f32,
    /// Wall bounces before the projectile is destroyed
    pub bounces: u8,
    /// Velocity kept per bounce
    pub elasticity: f32,
    /// Splash radius on detonation (0 = none)
    pub explosion_radius: f32,
    /// Knockback speed applied to hit characters (units/s)
    pub knockback: f32,
    /// Starting and max ammunition (`None` = infinite)
    pub max_ammo: Option<u32>,
    /// Ticks to regenerate one round
    pub ammo_regen_ticks: u32,
}

impl WeaponSpec {
    fn base(behavior: FireBehavior, cooldown_ticks: u32, damage: i32) -> Self {
        Self {
            behavior,
            cooldown_ticks,
            damage,
            pellets: 1,
            spread: 0.0,
            speed: 0.0,
            lifetime_ticks: 0,
            gravity: 0.0,
            bounces: 0,
            elasticity: 0.0,
            explosion_radius: 0.0,
            knockback: 0.0,
            max_ammo: None,
            ammo_regen_ticks: 0,
        }
    }
}

/// Parameter table for all weapon kinds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeaponTable {
    specs: [WeaponSpec; WeaponKind::COUNT],
}

impl WeaponTable {
    /// Parameters of one kind.
    #[inline]
    pub fn get(&self, kind: WeaponKind) -> &WeaponSpec {
        &self.specs[kind.index()]
    }

    /// Mutable parameters of one kind.
    pub fn get_mut(&mut self, kind: WeaponKind) -> &mut WeaponSpec {
        &mut self.specs[kind.index()]
    }
}

impl Default for WeaponTable {
    fn default() -> Self {
        let hammer = WeaponSpec {
            knockback: 300.0,
            ..WeaponSpec::base(FireBehavior::Melee { range: 48.0, arc_cos: 0.5 }, 10, 3)
        };
        let gun = WeaponSpec {
            speed: 2200.0,
            lifetime_ticks: 100,
            max_ammo: Some(10),
            ammo_regen_ticks: 25,
            ..WeaponSpec::base(FireBehavior::Projectile, 8, 1)
        };
        let shotgun = WeaponSpec {
            pellets: 8,
            spread: 0.1,
            speed: 2750.0,
            lifetime_ticks: 10,
            knockback: 100.0,
            max_ammo: Some(5),
            ammo_regen_ticks: 50,
            ..WeaponSpec::base(FireBehavior::Projectile, 35, 1)
        };
        let grenade = WeaponSpec {
            speed: 1000.0,
            lifetime_ticks: 100,
            gravity: 400.0,
            bounces: 3,
            elasticity: 0.4,
            explosion_radius: 100.0,
            knockback: 400.0,
            max_ammo: Some(3),
            ammo_regen_ticks: 75,
            ..WeaponSpec::base(FireBehavior::Projectile, 25, 5)
        };
        let rifle = WeaponSpec {
            max_ammo: Some(10),
            ammo_regen_ticks: 50,
            ..WeaponSpec::base(FireBehavior::Hitscan { reach: 800.0 }, 40, 4)
        };

        Self {
            specs: [hammer, gun, shotgun, grenade, rifle],
        }
    }
}

// =============================================================================
// RULES & OUTCOMES
// =============================================================================

/// Match-level rules ballistics must respect.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BallisticsRules {
    /// Same-team hits deal damage
    pub friendly_fire: bool,
    /// Safety cap on live projectiles
    pub max_projectiles: usize,
    /// Projectile collision radius against characters
    pub projectile_radius: f32,
}

impl Default for BallisticsRules {
    fn default() -> Self {
        Self {
            friendly_fire: false,
            max_projectiles: 256,
            projectile_radius: 4.0,
        }
    }
}

impl BallisticsRules {
    /// Whether `attacker` may damage `victim`.
    pub fn can_damage(&self, attacker: &Character, victim: &Character) -> bool {
        if attacker.id == victim.id || !victim.alive {
            return false;
        }
        self.friendly_fire || attacker.team == NO_TEAM || attacker.team != victim.team
    }
}

/// Result of a fire request.
#[derive(Clone, Debug, PartialEq)]
pub enum FireOutcome {
    /// Projectiles spawned
    Launched {
        /// New projectile ids
        ids: Vec<u32>,
    },
    /// Melee or hitscan resolved immediately
    Resolved {
        /// Characters hit
        hits: Vec<CharacterId>,
        /// Characters killed by this activation
        kills: Vec<Kill>,
    },
    /// Cooldown still running
    CoolingDown,
    /// Finite ammo exhausted
    OutOfAmmo,
    /// Projectile cap reached; shot not taken
    Rejected,
    /// Shooter missing, dead or frozen
    Unavailable,
}

/// Everything ballistics reads besides the world itself.
#[derive(Clone, Copy, Debug)]
pub struct BallisticsContext<'a> {
    /// Map for wall tests
    pub map: &'a GameMap,
    /// Weapon parameters
    pub table: &'a WeaponTable,
    /// Match rules
    pub rules: &'a BallisticsRules,
    /// Tick duration in seconds
    pub dt: f32,
    /// Character box side length
    pub character_size: f32,
}

// =============================================================================
// TIMERS
// =============================================================================

/// Advance cooldown and ammo regeneration for one character.
pub fn tick_weapon_timers(character: &mut Character, table: &WeaponTable) {
    character.fire_cooldown = character.fire_cooldown.saturating_sub(1);

    for kind in WeaponKind::ALL {
        let spec = table.get(kind);
        let (Some(max), Some(rounds)) = (spec.max_ammo, character.ammo.rounds(kind)) else {
            continue;
        };
        let idx = kind.index();
        if rounds >= max || spec.ammo_regen_ticks == 0 {
            character.ammo.regen_ticks[idx] = spec.ammo_regen_ticks;
            continue;
        }
        character.ammo.regen_ticks[idx] = character.ammo.regen_ticks[idx].saturating_sub(1);
        if character.ammo.regen_ticks[idx] == 0 {
            character.ammo.rounds[idx] = Some(rounds + 1);
            character.ammo.regen_ticks[idx] = spec.ammo_regen_ticks;
        }
    }
}

// =============================================================================
// FIRING
// =============================================================================

/// Pellet directions for a shot: the aim direction rotated toward its
/// perpendicular by evenly spaced offsets in `[-spread, spread]`.
pub fn pellet_directions(aim: Vec2, pellets: u8, spread: f32) -> Vec<Vec2> {
    if pellets <= 1 || spread == 0.0 {
        return vec![aim; pellets.max(1) as usize];
    }
    let side = aim.perpendicular();
    let last = (pellets - 1) as f32;
    (0..pellets)
        .map(|i| {
            let t = (i as f32 / last) * 2.0 - 1.0;
            (aim + side * (t * spread)).normalize()
        })
        .collect()
}

/// Fire the shooter's selected weapon along `aim`.
///
/// Rejected requests (cooldown, ammo, projectile cap) change nothing.
pub fn fire_weapon(
    world: &mut WorldState,
    ctx: &BallisticsContext<'_>,
    shooter_id: CharacterId,
    aim: Vec2,
) -> FireOutcome {
    let BallisticsContext { map, table, rules, character_size, .. } = *ctx;
    let Some(shooter) = world.character(shooter_id) else {
        return FireOutcome::Unavailable;
    };
    if !shooter.alive || shooter.frozen_ticks > 0 {
        return FireOutcome::Unavailable;
    }
    if shooter.fire_cooldown > 0 {
        return FireOutcome::CoolingDown;
    }
    let kind = shooter.weapon;
    if !shooter.ammo.has_round(kind) {
        return FireOutcome::OutOfAmmo;
    }

    let spec = *table.get(kind);
    let dir = match aim.normalize() {
        d if d == Vec2::ZERO => Vec2::new(shooter.facing as f32, 0.0),
        d => d,
    };
    let origin = shooter.position;
    let half = Vec2::new(character_size / 2.0, character_size / 2.0);

    let outcome = match spec.behavior {
        FireBehavior::Projectile => {
            let muzzle = origin + dir * (character_size * 0.75);
            let batch = pellet_directions(dir, spec.pellets, spec.spread)
                .into_iter()
                .map(|d| Projectile {
                    id: 0,
                    kind,
                    position: muzzle,
                    velocity: d * spec.speed,
                    owner: shooter_id,
                    lifetime_ticks: spec.lifetime_ticks,
                    bounces_left: spec.bounces,
                })
                .collect();
            match world.spawn_projectiles(batch, rules.max_projectiles) {
                Ok(ids) => FireOutcome::Launched { ids },
                Err(e) => {
                    debug!(shooter = %shooter_id, error = %e, "shot rejected");
                    return FireOutcome::Rejected;
                }
            }
        }
        FireBehavior::Melee { range, arc_cos } => {
            let targets = melee_targets(world, shooter_id, origin, dir, range, arc_cos, rules);
            let mut kills = Vec::new();
            for target in &targets {
                let push = (world_position(world, *target) - origin).normalize() * spec.knockback;
                if let Some(kill) = damage(world, *target, shooter_id, kind, spec.damage, push) {
                    kills.push(kill);
                }
            }
            FireOutcome::Resolved { hits: targets, kills }
        }
        FireBehavior::Hitscan { reach } => {
            let mut end = origin + dir * reach;
            if let Some(hit) = map.grid.intersect_line(origin, end) {
                end = hit.before;
            }
            let target = first_character_on_segment(world, shooter_id, origin, end, half, 0.0, rules)
                .map(|(id, _)| id);
            let mut kills = Vec::new();
            if let Some(target) = target {
                if let Some(kill) = damage(world, target, shooter_id, kind, spec.damage, dir * spec.knockback) {
                    kills.push(kill);
                }
            }
            FireOutcome::Resolved { hits: target.into_iter().collect(), kills }
        }
    };

    if let Some(shooter) = world.character_mut(shooter_id) {
        shooter.fire_cooldown = spec.cooldown_ticks;
        shooter.ammo.spend(kind);
    }
    outcome
}

fn world_position(world: &WorldState, id: CharacterId) -> Vec2 {
    world.character(id).map_or(Vec2::ZERO, |c| c.position)
}

fn melee_targets(
    world: &WorldState,
    shooter_id: CharacterId,
    origin: Vec2,
    dir: Vec2,
    range: f32,
    arc_cos: f32,
    rules: &BallisticsRules,
) -> Vec<CharacterId> {
    let Some(shooter) = world.character(shooter_id) else {
        return Vec::new();
    };
    let range_sq = range * range;
    world
        .characters()
        .filter(|c| rules.can_damage(shooter, c))
        .filter(|c| {
            let to = c.position - origin;
            to.length_squared() <= range_sq && dir.dot(to.normalize()) >= arc_cos
        })
        .map(|c| c.id)
        .collect()
}

/// First damageable character whose (expanded) box the segment enters.
fn first_character_on_segment(
    world: &WorldState,
    owner: CharacterId,
    from: Vec2,
    to: Vec2,
    half: Vec2,
    radius: f32,
    rules: &BallisticsRules,
) -> Option<(CharacterId, f32)> {
    let attacker = world.character(owner);
    let mut best: Option<(CharacterId, f32)> = None;
    for victim in world.characters() {
        let allowed = match attacker {
            Some(a) => rules.can_damage(a, victim),
            // Owner left: hit anyone alive
            None => victim.alive && victim.id != owner,
        };
        if !allowed {
            continue;
        }
        let bounds = Aabb::from_center(victim.position, half).expand(radius);
        if let Some(t) = bounds.segment_entry(from, to) {
            if best.map_or(true, |(_, bt)| t < bt) {
                best = Some((victim.id, t));
            }
        }
    }
    best
}

/// Apply damage and knockback; returns the kill if the hit was lethal.
fn damage(
    world: &mut WorldState,
    victim: CharacterId,
    attacker: CharacterId,
    weapon: WeaponKind,
    amount: i32,
    impulse: Vec2,
) -> Option<Kill> {
    let target = world.character_mut(victim)?;
    target.velocity += impulse;
    target.take_damage(amount).then_some(Kill {
        victim,
        killer: Some(attacker),
        weapon: Some(weapon),
    })
}

/// Splash damage around `center`, scaled down linearly with distance.
fn explode(
    world: &mut WorldState,
    center: Vec2,
    owner: CharacterId,
    spec: &WeaponSpec,
    rules: &BallisticsRules,
) -> Vec<Kill> {
    let radius = spec.explosion_radius;
    if radius <= 0.0 {
        return Vec::new();
    }
    let attacker = world.character(owner).cloned();
    let victims: Vec<(CharacterId, f32, Vec2)> = world
        .characters()
        .filter(|v| match &attacker {
            Some(a) => rules.can_damage(a, v),
            None => v.alive && v.id != owner,
        })
        .filter_map(|v| {
            let offset = v.position - center;
            let dist = offset.length();
            (dist < radius).then_some((v.id, dist, offset.normalize()))
        })
        .collect();

    let mut kills = Vec::new();
    for (victim, dist, dir) in victims {
        let falloff = 1.0 - dist / radius;
        let amount = ((spec.damage as f32) * falloff).ceil() as i32;
        if let Some(kill) = damage(world, victim, owner, WeaponKind::Grenade, amount.max(1), dir * (spec.knockback * falloff)) {
            kills.push(kill);
        }
    }
    kills
}

// =============================================================================
// PROJECTILE ADVANCE
// =============================================================================

/// Advance every projectile by one tick and resolve hits.
///
/// Projectiles are processed oldest first. Returns the kills caused.
pub fn advance_projectiles(world: &mut WorldState, ctx: &BallisticsContext<'_>) -> Vec<Kill> {
    let BallisticsContext { map, table, rules, dt, character_size } = *ctx;
    let half = Vec2::new(character_size / 2.0, character_size / 2.0);
    let mut kills = Vec::new();
    let mut projectiles = std::mem::take(&mut world.projectiles);

    for projectile in projectiles.iter_mut() {
        let spec = table.get(projectile.kind);
        projectile.velocity.y += spec.gravity * dt;

        let from = projectile.position;
        let to = from + projectile.velocity * dt;
        let travel = from.distance(to);

        let wall = map.grid.intersect_line(from, to);
        let wall_t = match (&wall, travel > 0.0) {
            (Some(hit), true) => from.distance(hit.point) / travel,
            (Some(_), false) => 0.0,
            (None, _) => f32::INFINITY,
        };
        let victim = first_character_on_segment(
            world, projectile.owner, from, to, half, rules.projectile_radius, rules,
        )
        .filter(|(_, t)| *t <= wall_t);

        if let Some((victim, t)) = victim {
            let impact = from.lerp(to, t);
            if spec.explosion_radius > 0.0 {
                kills.extend(explode(world, impact, projectile.owner, spec, rules));
            } else {
                let push = projectile.velocity.normalize() * spec.knockback;
                kills.extend(damage(world, victim, projectile.owner, projectile.kind, spec.damage, push));
            }
            projectile.lifetime_ticks = 0;
            continue;
        }

        if wall.is_some() {
            if projectile.bounces_left > 0 {
                let (pos, vel, _) = map.grid.bounce_point(from, to - from, projectile.velocity, spec.elasticity);
                projectile.position = pos;
                projectile.velocity = vel;
                projectile.bounces_left -= 1;
                if projectile.bounces_left == 0 {
                    kills.extend(explode(world, pos, projectile.owner, spec, rules));
                    projectile.lifetime_ticks = 0;
                    continue;
                }
            } else {
                if let Some(hit) = wall {
                    kills.extend(explode(world, hit.before, projectile.owner, spec, rules));
                }
                projectile.lifetime_ticks = 0;
                continue;
            }
        } else {
            projectile.position = to;
        }

        projectile.lifetime_ticks = projectile.lifetime_ticks.saturating_sub(1);
        if projectile.lifetime_ticks == 0 {
            kills.extend(explode(world, projectile.position, projectile.owner, spec, rules));
        }
    }

    projectiles.retain(|p| p.lifetime_ticks > 0);
    // Anything spawned during resolution (none today) stays after the survivors
    projectiles.append(&mut world.projectiles);
    world.projectiles = projectiles;
    kills
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::DeterministicRng;

    const DT: f32 = 1.0 / 50.0;
    const SIZE: f32 = 28.0;

    fn flat_map() -> GameMap {
        GameMap::from_ascii(
            "flat",
            &[
                "####################",
                "#..................#",
                "#..................#",
                "#..................#",
                "#@.................#",
                "####################",
            ],
        )
        .unwrap()
    }

    fn world_with(positions: &[Vec2]) -> WorldState {
        world_with_table(positions, &WeaponTable::default())
    }

    fn world_with_table(positions: &[Vec2], table: &WeaponTable) -> WorldState {
        let mut world = WorldState::new(8, DeterministicRng::new(7));
        for (i, pos) in positions.iter().enumerate() {
            world.insert_character(Character::new(CharacterId(i as u16), "c", NO_TEAM, *pos, 10, table));
        }
        world
    }

    fn ctx<'a>(map: &'a GameMap, table: &'a WeaponTable, rules: &'a BallisticsRules) -> BallisticsContext<'a> {
        BallisticsContext { map, table, rules, dt: DT, character_size: SIZE }
    }

    fn run_ticks(world: &mut WorldState, map: &GameMap, table: &WeaponTable, rules: &BallisticsRules, n: u32) -> Vec<Kill> {
        let mut kills = Vec::new();
        for _ in 0..n {
            kills.extend(advance_projectiles(world, &ctx(map, table, rules)));
            for id in world.character_ids() {
                if let Some(c) = world.character_mut(id) {
                    tick_weapon_timers(c, table);
                }
            }
        }
        kills
    }

    #[test]
    fn test_gun_kills_on_exact_hit_count() {
        let map = flat_map();
        let table = WeaponTable::default();
        let rules = BallisticsRules::default();
        let mut world = world_with(&[Vec2::new(80.0, 146.0), Vec2::new(300.0, 146.0)]);

        let damage = table.get(WeaponKind::Gun).damage;
        let shots = 10 / damage;
        let cooldown = table.get(WeaponKind::Gun).cooldown_ticks;

        for shot in 1..=shots {
            assert!(world.character(CharacterId(1)).unwrap().alive, "died before shot {shot}");
            let outcome = fire_weapon(&mut world, &ctx(&map, &table, &rules), CharacterId(0), Vec2::RIGHT);
            assert!(matches!(outcome, FireOutcome::Launched { .. }), "shot {shot}: {outcome:?}");
            let kills = run_ticks(&mut world, &map, &table, &rules, cooldown);
            if shot < shots {
                assert!(kills.is_empty());
            } else {
                assert_eq!(kills, vec![Kill {
                    victim: CharacterId(1),
                    killer: Some(CharacterId(0)),
                    weapon: Some(WeaponKind::Gun),
                }]);
            }
        }
        assert!(!world.character(CharacterId(1)).unwrap().alive);
    }

    #[test]
    fn test_cooldown_and_ammo() {
        let map = flat_map();
        let mut table = WeaponTable::default();
        table.get_mut(WeaponKind::Gun).max_ammo = Some(1);
        let rules = BallisticsRules::default();
        let mut world = world_with_table(&[Vec2::new(80.0, 146.0)], &table);
        assert_eq!(world.character(CharacterId(0)).unwrap().ammo.rounds(WeaponKind::Gun), Some(1));

        let first = fire_weapon(&mut world, &ctx(&map, &table, &rules), CharacterId(0), Vec2::RIGHT);
        assert!(matches!(first, FireOutcome::Launched { .. }));
        let second = fire_weapon(&mut world, &ctx(&map, &table, &rules), CharacterId(0), Vec2::RIGHT);
        assert_eq!(second, FireOutcome::CoolingDown);

        world.character_mut(CharacterId(0)).unwrap().fire_cooldown = 0;
        let third = fire_weapon(&mut world, &ctx(&map, &table, &rules), CharacterId(0), Vec2::RIGHT);
        assert_eq!(third, FireOutcome::OutOfAmmo);
        assert_eq!(world.projectiles.len(), 1);
        assert_eq!(world.character(CharacterId(0)).unwrap().fire_cooldown, 0);
    }

    #[test]
    fn test_shotgun_spawns_spread() {
        let map = flat_map();
        let table = WeaponTable::default();
        let rules = BallisticsRules::default();
        let mut world = world_with(&[Vec2::new(80.0, 146.0)]);
        world.character_mut(CharacterId(0)).unwrap().weapon = WeaponKind::Shotgun;

        let outcome = fire_weapon(&mut world, &ctx(&map, &table, &rules), CharacterId(0), Vec2::RIGHT);
        let FireOutcome::Launched { ids } = outcome else { panic!("expected launch") };
        assert_eq!(ids.len(), 8);
        let ys: Vec<f32> = world.projectiles.iter().map(|p| p.velocity.y).collect();
        assert!(ys[0] < 0.0 && ys[7] > 0.0);
        assert_eq!(world.character(CharacterId(0)).unwrap().ammo.rounds(WeaponKind::Shotgun), Some(4));
    }

    #[test]
    fn test_projectile_cap_rejects_without_spending() {
        let map = flat_map();
        let table = WeaponTable::default();
        let rules = BallisticsRules { max_projectiles: 4, ..BallisticsRules::default() };
        let mut world = world_with(&[Vec2::new(80.0, 146.0)]);
        world.character_mut(CharacterId(0)).unwrap().weapon = WeaponKind::Shotgun;

        let outcome = fire_weapon(&mut world, &ctx(&map, &table, &rules), CharacterId(0), Vec2::RIGHT);
        assert_eq!(outcome, FireOutcome::Rejected);
        let shooter = world.character(CharacterId(0)).unwrap();
        assert_eq!(shooter.fire_cooldown, 0);
        assert_eq!(shooter.ammo.rounds(WeaponKind::Shotgun), Some(5));
        assert!(world.projectiles.is_empty());
    }

    #[test]
    fn test_hammer_hits_in_front_only() {
        let map = flat_map();
        let table = WeaponTable::default();
        let rules = BallisticsRules::default();
        let mut world = world_with(&[
            Vec2::new(200.0, 146.0),
            Vec2::new(235.0, 146.0),
            Vec2::new(165.0, 146.0),
        ]);
        world.character_mut(CharacterId(0)).unwrap().weapon = WeaponKind::Hammer;

        let outcome = fire_weapon(&mut world, &ctx(&map, &table, &rules), CharacterId(0), Vec2::RIGHT);
        let FireOutcome::Resolved { hits, kills } = outcome else { panic!("expected melee") };
        assert_eq!(hits, vec![CharacterId(1)]);
        assert!(kills.is_empty());
        assert_eq!(world.character(CharacterId(1)).unwrap().health, 7);
        assert_eq!(world.character(CharacterId(2)).unwrap().health, 10);
        assert!(world.character(CharacterId(1)).unwrap().velocity.x > 0.0);
    }

    #[test]
    fn test_rifle_stopped_by_wall() {
        let map = GameMap::from_ascii(
            "wall",
            &[
                "############",
                "#@...#.....#",
                "############",
            ],
        )
        .unwrap();
        let table = WeaponTable::default();
        let rules = BallisticsRules::default();
        let mut world = world_with(&[Vec2::new(48.0, 48.0), Vec2::new(240.0, 48.0)]);
        world.character_mut(CharacterId(0)).unwrap().weapon = WeaponKind::Rifle;

        let outcome = fire_weapon(&mut world, &ctx(&map, &table, &rules), CharacterId(0), Vec2::RIGHT);
        assert_eq!(outcome, FireOutcome::Resolved { hits: vec![], kills: vec![] });
        assert_eq!(world.character(CharacterId(1)).unwrap().health, 10);
    }

    #[test]
    fn test_grenade_bounces_then_detonates() {
        let map = flat_map();
        let table = WeaponTable::default();
        let rules = BallisticsRules::default();
        let mut world = world_with(&[Vec2::new(80.0, 146.0)]);
        world.projectiles.push(Projectile {
            id: 0,
            kind: WeaponKind::Grenade,
            position: Vec2::new(300.0, 150.0),
            velocity: Vec2::new(0.0, 900.0),
            owner: CharacterId(0),
            lifetime_ticks: 100,
            bounces_left: 2,
        });

        // First floor contact reflects upward
        let mut bounced = false;
        for _ in 0..5 {
            advance_projectiles(&mut world, &ctx(&map, &table, &rules));
            if let Some(p) = world.projectiles.first() {
                if p.bounces_left == 1 {
                    assert!(p.velocity.y < 0.0);
                    bounced = true;
                    break;
                }
            }
        }
        assert!(bounced);

        // Eventually it runs out of bounces and is removed
        for _ in 0..200 {
            advance_projectiles(&mut world, &ctx(&map, &table, &rules));
        }
        assert!(world.projectiles.is_empty());
    }

    #[test]
    fn test_grenade_splash_spares_owner_and_friends() {
        let map = flat_map();
        let table = WeaponTable::default();
        let rules = BallisticsRules::default();
        let mut world = world_with(&[Vec2::new(300.0, 146.0), Vec2::new(330.0, 146.0), Vec2::new(270.0, 146.0)]);
        world.character_mut(CharacterId(0)).unwrap().team = 1;
        world.character_mut(CharacterId(1)).unwrap().team = 2;
        world.character_mut(CharacterId(2)).unwrap().team = 1;

        let spec = *table.get(WeaponKind::Grenade);
        explode(&mut world, Vec2::new(310.0, 146.0), CharacterId(0), &spec, &rules);
        assert_eq!(world.character(CharacterId(0)).unwrap().health, 10);
        assert!(world.character(CharacterId(1)).unwrap().health < 10);
        assert_eq!(world.character(CharacterId(2)).unwrap().health, 10);
    }

    #[test]
    fn test_grenade_direct_hit_explodes_at_impact() {
        let map = flat_map();
        let table = WeaponTable::default();
        let rules = BallisticsRules::default();
        let mut world = world_with(&[
            Vec2::new(200.0, 146.0),
            Vec2::new(300.0, 146.0),
            Vec2::new(360.0, 146.0),
            Vec2::new(340.0, 146.0),
        ]);
        for (id, team) in [(0, 1), (1, 2), (2, 2), (3, 1)] {
            world.character_mut(CharacterId(id)).unwrap().team = team;
        }
        world.projectiles.push(Projectile {
            id: 0,
            kind: WeaponKind::Grenade,
            position: Vec2::new(250.0, 146.0),
            velocity: Vec2::new(1000.0, 0.0),
            owner: CharacterId(0),
            lifetime_ticks: 100,
            bounces_left: 3,
        });

        run_ticks(&mut world, &map, &table, &rules, 3);
        assert!(world.projectiles.is_empty());

        let target = world.character(CharacterId(1)).unwrap();
        // Impact at the near edge of the target, 18 units from its center
        assert_eq!(target.health, 5);
        assert!(target.velocity.x > 0.0);
        // Splash reaches the enemy behind, weaker
        let behind = world.character(CharacterId(2)).unwrap();
        assert!(behind.health < 10 && behind.health > target.health);
        assert!(behind.velocity.x > 0.0);
        // Thrower and teammate in radius are spared
        assert_eq!(world.character(CharacterId(0)).unwrap().health, 10);
        assert_eq!(world.character(CharacterId(3)).unwrap().health, 10);
        assert_eq!(world.character(CharacterId(3)).unwrap().velocity, Vec2::ZERO);
    }

    #[test]
    fn test_gun_passes_teammates_without_friendly_fire() {
        let map = flat_map();
        let table = WeaponTable::default();
        let positions = [Vec2::new(80.0, 146.0), Vec2::new(200.0, 146.0), Vec2::new(320.0, 146.0)];

        for friendly_fire in [false, true] {
            let rules = BallisticsRules { friendly_fire, ..BallisticsRules::default() };
            let mut world = world_with(&positions);
            for (id, team) in [(0, 1), (1, 1), (2, 2)] {
                world.character_mut(CharacterId(id)).unwrap().team = team;
            }

            let outcome = fire_weapon(&mut world, &ctx(&map, &table, &rules), CharacterId(0), Vec2::RIGHT);
            assert!(matches!(outcome, FireOutcome::Launched { .. }));
            run_ticks(&mut world, &map, &table, &rules, 10);
            assert!(world.projectiles.is_empty());

            let mate = world.character(CharacterId(1)).unwrap().health;
            let enemy = world.character(CharacterId(2)).unwrap().health;
            if friendly_fire {
                assert_eq!((mate, enemy), (9, 10));
            } else {
                assert_eq!((mate, enemy), (10, 9));
            }
        }
    }

    #[test]
    fn test_ammo_regenerates() {
        let table = WeaponTable::default();
        let mut c = Character::new(CharacterId(0), "c", NO_TEAM, Vec2::ZERO, 10, &table);
        c.ammo.rounds[WeaponKind::Gun.index()] = Some(9);
        c.ammo.regen_ticks[WeaponKind::Gun.index()] = table.get(WeaponKind::Gun).ammo_regen_ticks;
        for _ in 0..table.get(WeaponKind::Gun).ammo_regen_ticks {
            tick_weapon_timers(&mut c, &table);
        }
        assert_eq!(c.ammo.rounds(WeaponKind::Gun), Some(10));
    }
}
