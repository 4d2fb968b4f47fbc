//! Collision Detection
//!
//! Queries against the tile grid: point, rectangle and circle overlap,
//! per-axis swept box movement, and segment casts for hooks and projectiles.
//!
//! Rectangles are half-open: a box whose right edge sits exactly on a tile
//! boundary does not overlap the tile beyond it. Swept moves snap to the
//! contact boundary, so resolved boxes never overlap a solid tile.

use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::map::{TileGrid, TileKind, TILE_SIZE};

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Top-left corner
    pub min: Vec2,
    /// Bottom-right corner (exclusive)
    pub max: Vec2,
}

impl Aabb {
    /// Box centered on `center` with half extents `half`.
    #[inline]
    pub fn from_center(center: Vec2, half: Vec2) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Grow the box by `margin` on every side.
    #[inline]
    pub fn expand(self, margin: f32) -> Self {
        Self {
            min: self.min - Vec2::new(margin, margin),
            max: self.max + Vec2::new(margin, margin),
        }
    }

    /// True if the point lies inside (min inclusive, max exclusive).
    #[inline]
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x < self.max.x && p.y >= self.min.y && p.y < self.max.y
    }

    /// True if two boxes overlap with positive area.
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }

    /// Entry parameter `t` in [0, 1] where the segment `from -> to` first
    /// touches the box, or `None` if it misses.
    pub fn segment_entry(&self, from: Vec2, to: Vec2) -> Option<f32> {
        let d = to - from;
        let mut t_min = 0.0f32;
        let mut t_max = 1.0f32;

        for (origin, delta, lo, hi) in [
            (from.x, d.x, self.min.x, self.max.x),
            (from.y, d.y, self.min.y, self.max.y),
        ] {
            if delta == 0.0 {
                if origin < lo || origin >= hi {
                    return None;
                }
            } else {
                let inv = 1.0 / delta;
                let mut t0 = (lo - origin) * inv;
                let mut t1 = (hi - origin) * inv;
                if t0 > t1 {
                    std::mem::swap(&mut t0, &mut t1);
                }
                t_min = t_min.max(t0);
                t_max = t_max.min(t1);
                if t_min > t_max {
                    return None;
                }
            }
        }

        Some(t_min)
    }
}

/// Movement axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    /// Horizontal
    X,
    /// Vertical
    Y,
}

/// Result of sweeping a box along one axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisSweep {
    /// New center coordinate on the swept axis
    pub position: f32,
    /// True if the box stopped against a solid tile
    pub blocked: bool,
}

/// Result of moving a box on both axes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxMove {
    /// Resolved center
    pub position: Vec2,
    /// Horizontal movement was stopped
    pub blocked_x: bool,
    /// Vertical movement was stopped
    pub blocked_y: bool,
}

/// First solid contact of a segment cast.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineHit {
    /// First sampled point inside a solid tile
    pub point: Vec2,
    /// Last sampled free point before the contact
    pub before: Vec2,
    /// Cell that was hit
    pub cell: (i32, i32),
}

/// Inclusive cell range covered by the half-open interval `[lo, hi)`.
#[inline]
fn cell_span(lo: f32, hi: f32) -> (i32, i32) {
    let first = TileGrid::cell_coord(lo);
    let last = ((hi / TILE_SIZE).ceil() as i32).saturating_sub(1);
    (first, last.max(first))
}

impl TileGrid {
    /// True if the point lies in a solid tile.
    #[inline]
    pub fn is_solid_at(&self, point: Vec2) -> bool {
        self.tile_at(point).is_solid()
    }

    /// Solid cells overlapped by a rectangle, row-major.
    pub fn solid_tiles_in_rect(&self, rect: &Aabb) -> Vec<(i32, i32)> {
        let (x0, x1) = cell_span(rect.min.x, rect.max.x);
        let (y0, y1) = cell_span(rect.min.y, rect.max.y);
        let mut out = Vec::new();
        for cy in y0..=y1 {
            for cx in x0..=x1 {
                if self.tile(cx, cy).is_solid() {
                    out.push((cx, cy));
                }
            }
        }
        out
    }

    /// True if any solid tile overlaps the rectangle.
    pub fn rect_overlaps_solid(&self, rect: &Aabb) -> bool {
        let (x0, x1) = cell_span(rect.min.x, rect.max.x);
        let (y0, y1) = cell_span(rect.min.y, rect.max.y);
        (y0..=y1).any(|cy| (x0..=x1).any(|cx| self.tile(cx, cy).is_solid()))
    }

    /// Tile kinds overlapped by a rectangle, row-major.
    pub fn tiles_in_rect(&self, rect: &Aabb) -> Vec<TileKind> {
        let (x0, x1) = cell_span(rect.min.x, rect.max.x);
        let (y0, y1) = cell_span(rect.min.y, rect.max.y);
        let mut out = Vec::with_capacity(((x1 - x0 + 1) * (y1 - y0 + 1)).max(0) as usize);
        for cy in y0..=y1 {
            for cx in x0..=x1 {
                out.push(self.tile(cx, cy));
            }
        }
        out
    }

    /// True if a circle overlaps any solid tile.
    pub fn circle_overlaps_solid(&self, center: Vec2, radius: f32) -> bool {
        let bounds = Aabb::from_center(center, Vec2::new(radius, radius));
        let (x0, x1) = cell_span(bounds.min.x, bounds.max.x);
        let (y0, y1) = cell_span(bounds.min.y, bounds.max.y);
        let radius_sq = radius * radius;

        for cy in y0..=y1 {
            for cx in x0..=x1 {
                if !self.tile(cx, cy).is_solid() {
                    continue;
                }
                let tile_min = Vec2::new(cx as f32 * TILE_SIZE, cy as f32 * TILE_SIZE);
                let tile_max = tile_min + Vec2::new(TILE_SIZE, TILE_SIZE);
                let closest = center.clamp(tile_min, tile_max);
                if closest.distance_squared(center) < radius_sq {
                    return true;
                }
            }
        }
        false
    }

    /// Sweep a box (center, half extents) along one axis by `delta`.
    ///
    /// Every tile column (or row) between the start and end position is
    /// tested, so no speed can tunnel through a wall. On contact the center
    /// snaps so the leading edge sits exactly on the tile boundary.
    pub fn sweep_axis(&self, center: Vec2, half: Vec2, axis: Axis, delta: f32) -> AxisSweep {
        let (along, across, half_along, half_across) = match axis {
            Axis::X => (center.x, center.y, half.x, half.y),
            Axis::Y => (center.y, center.x, half.y, half.x),
        };
        let solid = |line: i32, cross: i32| match axis {
            Axis::X => self.tile(line, cross).is_solid(),
            Axis::Y => self.tile(cross, line).is_solid(),
        };

        if delta == 0.0 || !delta.is_finite() || !along.is_finite() || !across.is_finite() {
            return AxisSweep { position: along, blocked: false };
        }

        let (c0, c1) = cell_span(across - half_across, across + half_across);
        let target = along + delta;

        if delta > 0.0 {
            let first = ((along + half_along) / TILE_SIZE).ceil() as i32;
            let last = (((target + half_along) / TILE_SIZE).ceil() as i32).saturating_sub(1);
            let mut line = first;
            while line <= last {
                if (c0..=c1).any(|c| solid(line, c)) {
                    let edge = line as f32 * TILE_SIZE;
                    return AxisSweep { position: edge - half_along, blocked: true };
                }
                if line == last {
                    break;
                }
                line += 1;
            }
        } else {
            let first = TileGrid::cell_coord(along - half_along).saturating_sub(1);
            let last = TileGrid::cell_coord(target - half_along);
            let mut line = first;
            while line >= last {
                if (c0..=c1).any(|c| solid(line, c)) {
                    let edge = (line as f32 + 1.0) * TILE_SIZE;
                    return AxisSweep { position: edge + half_along, blocked: true };
                }
                if line == last {
                    break;
                }
                line -= 1;
            }
        }

        AxisSweep { position: target, blocked: false }
    }

    /// Move a box by `delta`, horizontal axis first, then vertical.
    ///
    /// Resolving the axes independently lets a box slide along a wall or
    /// over a corner instead of stopping dead.
    pub fn move_box(&self, center: Vec2, half: Vec2, delta: Vec2) -> BoxMove {
        let sx = self.sweep_axis(center, half, Axis::X, delta.x);
        let after_x = Vec2::new(sx.position, center.y);
        let sy = self.sweep_axis(after_x, half, Axis::Y, delta.y);

        BoxMove {
            position: Vec2::new(sx.position, sy.position),
            blocked_x: sx.blocked,
            blocked_y: sy.blocked,
        }
    }

    /// Walk the segment `from -> to` in steps of at most one unit and
    /// report the first sample inside a solid tile.
    pub fn intersect_line(&self, from: Vec2, to: Vec2) -> Option<LineHit> {
        let distance = from.distance(to);
        if !distance.is_finite() {
            return None;
        }
        let steps = (distance.ceil() as u32).max(1);
        let mut before = from;

        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let point = from.lerp(to, t);
            if self.is_solid_at(point) {
                return Some(LineHit {
                    point,
                    before,
                    cell: TileGrid::cell_of(point),
                });
            }
            before = point;
        }
        None
    }

    /// Move a point by `delta`, reflecting velocity on contact.
    ///
    /// Returns the new position, the new velocity and whether a bounce
    /// occurred. The blocked axes are found by testing the contact point
    /// against the pre-contact position one axis at a time; a head-on corner
    /// hit reflects both.
    pub fn bounce_point(&self, pos: Vec2, delta: Vec2, vel: Vec2, elasticity: f32) -> (Vec2, Vec2, bool) {
        match self.intersect_line(pos, pos + delta) {
            None => (pos + delta, vel, false),
            Some(hit) => {
                let blocked_x = self.is_solid_at(Vec2::new(hit.point.x, hit.before.y));
                let blocked_y = self.is_solid_at(Vec2::new(hit.before.x, hit.point.y));
                let mut out = vel;
                if blocked_x {
                    out.x = -out.x * elasticity;
                }
                if blocked_y {
                    out.y = -out.y * elasticity;
                }
                if !blocked_x && !blocked_y {
                    out = -out * elasticity;
                }
                (hit.before, out, true)
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HALF: Vec2 = Vec2 { x: 14.0, y: 14.0 };

    /// 20x12 grid, floor on row 10 (y = 320), a one-tile wall at column 12.
    fn arena() -> TileGrid {
        let mut grid = TileGrid::new(20, 12);
        for x in 0..20 {
            grid.set(x, 10, TileKind::Solid);
        }
        for y in 0..10 {
            grid.set(12, y, TileKind::Solid);
        }
        grid
    }

    #[test]
    fn test_point_and_rect_queries() {
        let grid = arena();
        assert!(grid.is_solid_at(Vec2::new(5.0, 320.0)));
        assert!(!grid.is_solid_at(Vec2::new(5.0, 319.9)));

        // Box resting exactly on the floor does not overlap it
        let resting = Aabb::from_center(Vec2::new(100.0, 306.0), HALF);
        assert!(!grid.rect_overlaps_solid(&resting));

        let sunk = Aabb::from_center(Vec2::new(100.0, 310.0), HALF);
        assert_eq!(grid.solid_tiles_in_rect(&sunk), vec![(2, 10), (3, 10)]);
    }

    #[test]
    fn test_circle_query() {
        let grid = arena();
        assert!(grid.circle_overlaps_solid(Vec2::new(100.0, 315.0), 6.0));
        assert!(!grid.circle_overlaps_solid(Vec2::new(100.0, 300.0), 6.0));
        // Wall column starts at x = 384
        assert!(grid.circle_overlaps_solid(Vec2::new(380.0, 100.0), 5.0));
        assert!(!grid.circle_overlaps_solid(Vec2::new(370.0, 100.0), 5.0));
    }

    #[test]
    fn test_sweep_stops_at_wall() {
        let grid = arena();
        let sweep = grid.sweep_axis(Vec2::new(300.0, 200.0), HALF, Axis::X, 500.0);
        assert!(sweep.blocked);
        assert_eq!(sweep.position, 384.0 - 14.0);
    }

    #[test]
    fn test_sweep_left_and_free() {
        let grid = arena();
        let free = grid.sweep_axis(Vec2::new(200.0, 200.0), HALF, Axis::X, -50.0);
        assert!(!free.blocked);
        assert_eq!(free.position, 150.0);

        // Left map edge is solid
        let edge = grid.sweep_axis(Vec2::new(100.0, 200.0), HALF, Axis::X, -500.0);
        assert!(edge.blocked);
        assert_eq!(edge.position, 14.0);
    }

    #[test]
    fn test_sweep_lands_on_floor() {
        let grid = arena();
        let sweep = grid.sweep_axis(Vec2::new(100.0, 250.0), HALF, Axis::Y, 1000.0);
        assert!(sweep.blocked);
        assert_eq!(sweep.position, 306.0);
    }

    #[test]
    fn test_corner_slide_keeps_free_axis() {
        let grid = arena();
        // Falling diagonally onto the floor: vertical blocked, horizontal free
        let mv = grid.move_box(Vec2::new(100.0, 300.0), HALF, Vec2::new(20.0, 20.0));
        assert!(!mv.blocked_x);
        assert!(mv.blocked_y);
        assert_eq!(mv.position, Vec2::new(120.0, 306.0));
    }

    #[test]
    fn test_sweep_at_extreme_coordinates() {
        let grid = arena();
        // Cell index saturates at i32::MIN: still blocked by the closed border
        let far = grid.sweep_axis(Vec2::new(-1.0e30, 100.0), HALF, Axis::X, -10.0);
        assert!(far.blocked);

        // Non-finite positions are left alone
        let mv = grid.move_box(Vec2::new(f32::NEG_INFINITY, 100.0), HALF, Vec2::new(-5.0, 5.0));
        assert!(!mv.blocked_x && !mv.blocked_y);
        assert_eq!(mv.position.x, f32::NEG_INFINITY);
        assert_eq!(mv.position.y, 100.0);
    }

    #[test]
    fn test_intersect_line() {
        let grid = arena();
        let hit = grid.intersect_line(Vec2::new(300.0, 100.0), Vec2::new(500.0, 100.0)).unwrap();
        assert_eq!(hit.cell, (12, 3));
        assert!(hit.point.x >= 384.0 && hit.point.x <= 385.0);
        assert!(hit.before.x < 384.0);
        assert!(grid.intersect_line(Vec2::new(10.0, 10.0), Vec2::new(300.0, 10.0)).is_none());
    }

    #[test]
    fn test_bounce_point_reflects() {
        let grid = arena();
        let (pos, vel, bounced) =
            grid.bounce_point(Vec2::new(100.0, 315.0), Vec2::new(0.0, 10.0), Vec2::new(50.0, 500.0), 0.5);
        assert!(bounced);
        assert!(pos.y < 320.0);
        assert_eq!(vel, Vec2::new(50.0, -250.0));
    }

    #[test]
    fn test_segment_entry() {
        let rect = Aabb::from_center(Vec2::new(100.0, 100.0), HALF);
        let t = rect.segment_entry(Vec2::new(0.0, 100.0), Vec2::new(200.0, 100.0)).unwrap();
        assert!((t - 0.43).abs() < 1e-5);
        assert!(rect.segment_entry(Vec2::new(0.0, 0.0), Vec2::new(200.0, 0.0)).is_none());
        assert_eq!(rect.segment_entry(Vec2::new(100.0, 100.0), Vec2::new(101.0, 100.0)), Some(0.0));
    }

    proptest! {
        #[test]
        fn prop_swept_move_never_ends_in_wall(
            x in 20.0f32..360.0,
            y in 20.0f32..300.0,
            dx in -20000.0f32..20000.0,
            dy in -20000.0f32..20000.0,
        ) {
            let grid = arena();
            let start = Aabb::from_center(Vec2::new(x, y), HALF);
            prop_assume!(!grid.rect_overlaps_solid(&start));

            let mv = grid.move_box(Vec2::new(x, y), HALF, Vec2::new(dx, dy));
            let end = Aabb::from_center(mv.position, HALF);
            prop_assert!(!grid.rect_overlaps_solid(&end));
            // The wall at column 12 is never crossed
            prop_assert!(mv.position.x + HALF.x <= 384.0);
        }
    }
}
