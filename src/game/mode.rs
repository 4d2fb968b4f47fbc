//! Game Modes
//!
//! A mode is a policy consulted by the tick for scoring on kill, team
//! assignment, spawn selection and round end. It never touches physics.
//! All mode state lives in [`WorldState`] so it is hashed and snapshotted
//! with everything else.

use crate::config::{MatchConfig, ModeKind};
use crate::core::vec2::Vec2;
use crate::game::map::GameMap;
use crate::game::state::{CharacterId, Kill, WorldState, NO_TEAM};

/// First team id in team modes.
pub const TEAM_RED: u8 = 1;

/// Second team id in team modes.
pub const TEAM_BLUE: u8 = 2;

/// Who won a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundResult {
    /// Winning character, if a single one
    pub winner: Option<CharacterId>,
    /// Winning team, if a team mode produced one
    pub winning_team: Option<u8>,
}

/// Scoring and spawning policy.
pub trait GameMode: Send + Sync {
    /// Which mode this is.
    fn kind(&self) -> ModeKind;

    /// Team for a newly joining character.
    fn assign_team(&self, world: &WorldState) -> u8;

    /// Credit a kill. Called once per death while the round is playing.
    fn on_kill(&self, world: &mut WorldState, kill: &Kill);

    /// Move characters between teams if they became uneven.
    /// Returns the characters that changed team.
    fn rebalance(&self, _world: &mut WorldState) -> Vec<CharacterId> {
        Vec::new()
    }

    /// Check score and time limits.
    fn check_round_end(&self, world: &WorldState, config: &MatchConfig) -> Option<RoundResult>;

    /// Pick a spawn position for a character on `team`.
    ///
    /// Prefers the spawn point farthest from the nearest live opponent;
    /// with no opponents alive the choice is random (seeded).
    fn choose_spawn(&self, world: &mut WorldState, map: &GameMap, id: CharacterId, team: u8) -> Vec2 {
        let filter = if team == NO_TEAM { None } else { Some(team) };
        let candidates = map.spawns_for_team(filter);

        let opponents: Vec<Vec2> = world
            .characters()
            .filter(|c| c.alive && c.id != id && (team == NO_TEAM || c.team != team))
            .map(|c| c.position)
            .collect();

        if opponents.is_empty() {
            return world
                .rng
                .choose(&candidates)
                .map(|s| s.position)
                .unwrap_or(Vec2::ZERO);
        }

        let mut best: Option<(f32, Vec2)> = None;
        for spawn in &candidates {
            let nearest = opponents
                .iter()
                .map(|p| p.distance_squared(spawn.position))
                .fold(f32::INFINITY, f32::min);
            if best.map_or(true, |(d, _)| nearest > d) {
                best = Some((nearest, spawn.position));
            }
        }
        best.map(|(_, p)| p).unwrap_or(Vec2::ZERO)
    }
}

/// Build the policy for a mode.
pub fn mode_for(kind: ModeKind) -> Box<dyn GameMode> {
    match kind {
        ModeKind::Deathmatch => Box::new(Deathmatch),
        ModeKind::TeamDeathmatch => Box::new(TeamDeathmatch),
    }
}

/// Credit individual stats shared by every mode.
///
/// Returns true if the death was a suicide or world death.
fn credit_individual(world: &mut WorldState, kill: &Kill) -> bool {
    let suicide = kill.killer.map_or(true, |k| k == kill.victim);
    if let Some(victim) = world.character_mut(kill.victim) {
        victim.deaths += 1;
        if suicide {
            victim.score -= 1;
        }
    }
    suicide
}

// =============================================================================
// DEATHMATCH
// =============================================================================

/// Free for all. One point per kill, minus one per suicide.
#[derive(Clone, Copy, Debug, Default)]
pub struct Deathmatch;

impl GameMode for Deathmatch {
    fn kind(&self) -> ModeKind {
        ModeKind::Deathmatch
    }

    fn assign_team(&self, _world: &WorldState) -> u8 {
        NO_TEAM
    }

    fn on_kill(&self, world: &mut WorldState, kill: &Kill) {
        if credit_individual(world, kill) {
            return;
        }
        if let Some(killer) = kill.killer.and_then(|k| world.character_mut(k)) {
            killer.score += 1;
            killer.kills += 1;
        }
    }

    fn check_round_end(&self, world: &WorldState, config: &MatchConfig) -> Option<RoundResult> {
        let leader = world.leaderboard().first().map(|row| (row.0, row.1));
        let score_reached = config.score_limit > 0
            && leader.map_or(false, |(_, score)| score >= config.score_limit);
        let time_up = config.time_limit_ticks.map_or(false, |limit| world.round_ticks() >= limit);

        if score_reached || time_up {
            Some(RoundResult {
                winner: leader.map(|(id, _)| id),
                winning_team: None,
            })
        } else {
            None
        }
    }
}

// =============================================================================
// TEAM DEATHMATCH
// =============================================================================

/// Two teams. Kills score for the killer's team, suicides and team kills
/// cost a point. Teams are kept within one member of each other.
#[derive(Clone, Copy, Debug, Default)]
pub struct TeamDeathmatch;

impl TeamDeathmatch {
    fn add_team_score(world: &mut WorldState, team: u8, delta: i32) {
        *world.team_scores.entry(team).or_insert(0) += delta;
    }
}

impl GameMode for TeamDeathmatch {
    fn kind(&self) -> ModeKind {
        ModeKind::TeamDeathmatch
    }

    fn assign_team(&self, world: &WorldState) -> u8 {
        if world.team_size(TEAM_BLUE) < world.team_size(TEAM_RED) {
            TEAM_BLUE
        } else {
            TEAM_RED
        }
    }

    fn on_kill(&self, world: &mut WorldState, kill: &Kill) {
        let victim_team = world.character(kill.victim).map(|c| c.team);
        if credit_individual(world, kill) {
            if let Some(team) = victim_team {
                Self::add_team_score(world, team, -1);
            }
            return;
        }

        let Some(killer_id) = kill.killer else { return };
        let Some(killer) = world.character_mut(killer_id) else { return };
        let killer_team = killer.team;
        if Some(killer_team) == victim_team {
            killer.score -= 1;
            Self::add_team_score(world, killer_team, -1);
        } else {
            killer.score += 1;
            killer.kills += 1;
            Self::add_team_score(world, killer_team, 1);
        }
    }

    fn rebalance(&self, world: &mut WorldState) -> Vec<CharacterId> {
        let mut moved = Vec::new();
        loop {
            let red = world.team_size(TEAM_RED);
            let blue = world.team_size(TEAM_BLUE);
            let (from, to) = match red.abs_diff(blue) {
                0 | 1 => break,
                _ if red > blue => (TEAM_RED, TEAM_BLUE),
                _ => (TEAM_BLUE, TEAM_RED),
            };
            // Most recently joined (highest id) switches
            let Some(id) = world.characters().filter(|c| c.team == from).map(|c| c.id).last() else {
                break;
            };
            if let Some(c) = world.character_mut(id) {
                c.team = to;
            }
            moved.push(id);
        }
        moved
    }

    fn check_round_end(&self, world: &WorldState, config: &MatchConfig) -> Option<RoundResult> {
        let red = world.team_scores.get(&TEAM_RED).copied().unwrap_or(0);
        let blue = world.team_scores.get(&TEAM_BLUE).copied().unwrap_or(0);
        let score_reached = config.score_limit > 0 && red.max(blue) >= config.score_limit;
        let time_up = config.time_limit_ticks.map_or(false, |limit| world.round_ticks() >= limit);

        if !(score_reached || time_up) {
            return None;
        }
        let winning_team = match red.cmp(&blue) {
            std::cmp::Ordering::Greater => Some(TEAM_RED),
            std::cmp::Ordering::Less => Some(TEAM_BLUE),
            std::cmp::Ordering::Equal => None,
        };
        Some(RoundResult {
            winner: None,
            winning_team,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::DeterministicRng;
    use crate::game::state::Character;
    use crate::game::weapon::{WeaponKind, WeaponTable};

    fn world_with(teams: &[u8]) -> WorldState {
        let mut world = WorldState::new(8, DeterministicRng::new(7));
        for (i, team) in teams.iter().enumerate() {
            let id = CharacterId(i as u16);
            world.insert_character(Character::new(
                id,
                format!("p{i}"),
                *team,
                Vec2::new(100.0 + i as f32 * 50.0, 100.0),
                10,
                &WeaponTable::default(),
            ));
        }
        world
    }

    fn kill(victim: u16, killer: Option<u16>) -> Kill {
        Kill {
            victim: CharacterId(victim),
            killer: killer.map(CharacterId),
            weapon: killer.map(|_| WeaponKind::Gun),
        }
    }

    #[test]
    fn test_deathmatch_scoring() {
        let mut world = world_with(&[NO_TEAM, NO_TEAM]);
        Deathmatch.on_kill(&mut world, &kill(1, Some(0)));
        Deathmatch.on_kill(&mut world, &kill(0, None));

        let killer = world.character(CharacterId(0)).unwrap();
        assert_eq!((killer.score, killer.kills, killer.deaths), (0, 1, 1));
        let victim = world.character(CharacterId(1)).unwrap();
        assert_eq!((victim.score, victim.deaths), (0, 1));
    }

    #[test]
    fn test_deathmatch_score_limit() {
        let mut world = world_with(&[NO_TEAM, NO_TEAM]);
        let config = MatchConfig { score_limit: 2, ..MatchConfig::default() };
        Deathmatch.on_kill(&mut world, &kill(0, Some(1)));
        assert_eq!(Deathmatch.check_round_end(&world, &config), None);
        Deathmatch.on_kill(&mut world, &kill(0, Some(1)));
        let result = Deathmatch.check_round_end(&world, &config).unwrap();
        assert_eq!(result.winner, Some(CharacterId(1)));
    }

    #[test]
    fn test_time_limit() {
        let mut world = world_with(&[NO_TEAM]);
        let config = MatchConfig { time_limit_ticks: Some(100), ..MatchConfig::default() };
        world.tick = 99;
        assert!(Deathmatch.check_round_end(&world, &config).is_none());
        world.tick = 100;
        assert!(Deathmatch.check_round_end(&world, &config).is_some());
    }

    #[test]
    fn test_team_assignment_balances() {
        let world = world_with(&[TEAM_RED, TEAM_RED, TEAM_BLUE]);
        assert_eq!(TeamDeathmatch.assign_team(&world), TEAM_BLUE);
        let world = world_with(&[TEAM_RED, TEAM_BLUE]);
        assert_eq!(TeamDeathmatch.assign_team(&world), TEAM_RED);
    }

    #[test]
    fn test_team_scoring() {
        let mut world = world_with(&[TEAM_RED, TEAM_BLUE, TEAM_RED]);
        TeamDeathmatch.on_kill(&mut world, &kill(1, Some(0)));
        assert_eq!(world.team_scores.get(&TEAM_RED), Some(&1));

        // Team kill costs the killer and the team
        TeamDeathmatch.on_kill(&mut world, &kill(2, Some(0)));
        assert_eq!(world.team_scores.get(&TEAM_RED), Some(&0));
        assert_eq!(world.character(CharacterId(0)).unwrap().score, 0);

        // Suicide costs the victim's team
        TeamDeathmatch.on_kill(&mut world, &kill(1, None));
        assert_eq!(world.team_scores.get(&TEAM_BLUE), Some(&-1));
    }

    #[test]
    fn test_rebalance_moves_newest() {
        let mut world = world_with(&[TEAM_RED, TEAM_RED, TEAM_RED, TEAM_BLUE]);
        world.remove_character(CharacterId(3));
        let moved = TeamDeathmatch.rebalance(&mut world);
        assert_eq!(moved, vec![CharacterId(2)]);
        assert_eq!(world.character(CharacterId(2)).unwrap().team, TEAM_BLUE);
    }

    #[test]
    fn test_spawn_avoids_opponents() {
        let map = GameMap::from_ascii(
            "spawns",
            &[
                "##########",
                "#@......@#",
                "##########",
            ],
        )
        .unwrap();
        let mut world = world_with(&[NO_TEAM, NO_TEAM]);
        if let Some(c) = world.character_mut(CharacterId(0)) {
            c.position = Vec2::new(60.0, 48.0);
        }
        if let Some(c) = world.character_mut(CharacterId(1)) {
            c.alive = false;
        }
        let spawn = Deathmatch.choose_spawn(&mut world, &map, CharacterId(1), NO_TEAM);
        assert_eq!(spawn, Vec2::new(272.0, 48.0));
    }
}
