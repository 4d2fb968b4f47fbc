//! Remote Character Interpolation
//!
//! Characters the client does not control are never predicted. They are
//! drawn between the two most recent snapshots at a render time that
//! trails the newest one, so motion stays smooth between broadcasts.

use std::sync::Arc;

use crate::core::vec2::Vec2;
use crate::game::snapshot::Snapshot;
use crate::game::state::CharacterId;

/// Jumps longer than this between two snapshots are drawn without blending
/// (teleports and respawns).
pub const SNAP_DISTANCE: f32 = 256.0;

/// A remote character as it should be drawn this frame.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedCharacter {
    /// Character id
    pub id: CharacterId,
    /// Blended position
    pub position: Vec2,
    /// Alive in the newer snapshot
    pub alive: bool,
    /// Hook anchor, taken from the newer snapshot
    pub hook_anchor: Option<Vec2>,
}

/// Keeps the two newest snapshots and blends between them.
#[derive(Debug, Default)]
pub struct Interpolator {
    previous: Option<Arc<Snapshot>>,
    latest: Option<Arc<Snapshot>>,
}

impl Interpolator {
    /// Empty interpolator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a snapshot. Older or duplicate ticks are ignored.
    pub fn push(&mut self, snapshot: Arc<Snapshot>) -> bool {
        if let Some(latest) = &self.latest {
            if snapshot.tick <= latest.tick {
                return false;
            }
        }
        self.previous = self.latest.take();
        self.latest = Some(snapshot);
        true
    }

    /// Tick of the newest snapshot.
    pub fn latest_tick(&self) -> Option<u32> {
        self.latest.as_ref().map(|s| s.tick)
    }

    /// Newest snapshot.
    pub fn latest(&self) -> Option<&Arc<Snapshot>> {
        self.latest.as_ref()
    }

    /// Blend factor for a render time given in (fractional) ticks.
    ///
    /// 0 is the previous snapshot, 1 the newest; values outside are clamped,
    /// so the interpolator never extrapolates.
    pub fn alpha(&self, render_tick: f32) -> f32 {
        match (&self.previous, &self.latest) {
            (Some(previous), Some(latest)) => {
                let span = latest.tick.saturating_sub(previous.tick) as f32;
                if span <= 0.0 {
                    return 1.0;
                }
                ((render_tick - previous.tick as f32) / span).clamp(0.0, 1.0)
            }
            _ => 1.0,
        }
    }

    /// Blended position of one character.
    pub fn position(&self, id: CharacterId, render_tick: f32) -> Option<Vec2> {
        let latest = self.latest.as_ref()?.character(id)?;
        let previous = self.previous.as_ref().and_then(|s| s.character(id));
        Some(match previous {
            Some(previous) if Self::blendable(previous.position, latest.position) => {
                previous.position.lerp(latest.position, self.alpha(render_tick))
            }
            _ => latest.position,
        })
    }

    /// Every character of the newest snapshot except `local`.
    pub fn sample(&self, render_tick: f32, local: Option<CharacterId>) -> Vec<RenderedCharacter> {
        let Some(latest) = &self.latest else {
            return Vec::new();
        };
        latest
            .characters
            .iter()
            .filter(|c| Some(c.id) != local)
            .filter_map(|c| {
                Some(RenderedCharacter {
                    id: c.id,
                    position: self.position(c.id, render_tick)?,
                    alive: c.alive,
                    hook_anchor: c.hook.anchor(),
                })
            })
            .collect()
    }

    fn blendable(from: Vec2, to: Vec2) -> bool {
        from.distance_squared(to) <= SNAP_DISTANCE * SNAP_DISTANCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use crate::core::rng::DeterministicRng;
    use crate::game::state::{Character, NO_TEAM, WorldState};
    use crate::game::weapon::WeaponTable;

    fn snapshot_at(tick: u32, positions: &[(u16, Vec2)]) -> Arc<Snapshot> {
        let table = WeaponTable::default();
        let mut world = WorldState::new(4, DeterministicRng::new(1));
        for (id, pos) in positions {
            world.insert_character(Character::new(CharacterId(*id), "p", NO_TEAM, *pos, 10, &table));
        }
        world.tick = tick;
        Arc::new(Snapshot::capture(&world, BTreeMap::new()))
    }

    #[test]
    fn test_blends_between_snapshots() {
        let mut interp = Interpolator::new();
        interp.push(snapshot_at(10, &[(1, Vec2::new(100.0, 50.0))]));
        interp.push(snapshot_at(12, &[(1, Vec2::new(120.0, 50.0))]));

        assert_eq!(interp.position(CharacterId(1), 11.0), Some(Vec2::new(110.0, 50.0)));
        assert_eq!(interp.position(CharacterId(1), 10.0), Some(Vec2::new(100.0, 50.0)));
        // Never extrapolates
        assert_eq!(interp.position(CharacterId(1), 20.0), Some(Vec2::new(120.0, 50.0)));
    }

    #[test]
    fn test_single_snapshot_uses_latest() {
        let mut interp = Interpolator::new();
        interp.push(snapshot_at(4, &[(0, Vec2::new(10.0, 10.0))]));
        assert_eq!(interp.position(CharacterId(0), 0.0), Some(Vec2::new(10.0, 10.0)));
        assert_eq!(interp.position(CharacterId(3), 0.0), None);
    }

    #[test]
    fn test_teleport_snaps() {
        let mut interp = Interpolator::new();
        interp.push(snapshot_at(2, &[(0, Vec2::new(0.0, 0.0))]));
        interp.push(snapshot_at(4, &[(0, Vec2::new(900.0, 0.0))]));
        assert_eq!(interp.position(CharacterId(0), 3.0), Some(Vec2::new(900.0, 0.0)));
    }

    #[test]
    fn test_out_of_order_ignored() {
        let mut interp = Interpolator::new();
        assert!(interp.push(snapshot_at(8, &[])));
        assert!(!interp.push(snapshot_at(6, &[])));
        assert!(!interp.push(snapshot_at(8, &[])));
        assert_eq!(interp.latest_tick(), Some(8));
    }

    #[test]
    fn test_sample_skips_local_character() {
        let mut interp = Interpolator::new();
        interp.push(snapshot_at(1, &[(0, Vec2::new(1.0, 1.0)), (1, Vec2::new(2.0, 2.0))]));
        let rendered = interp.sample(1.0, Some(CharacterId(0)));
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].id, CharacterId(1));
        assert!(rendered[0].alive);
    }
}
