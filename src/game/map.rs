//! Tile Map
//!
//! Immutable tile grid plus the metadata the simulation needs from a map:
//! spawn points and teleporter channel pairings. Maps are produced by an
//! external loader (or the ASCII constructor used by tests and the demo arena)
//! and are read-only once the simulation starts.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;

/// Side length of one tile in world units.
pub const TILE_SIZE: f32 = 32.0;

/// What a teleporter does to the velocity of the character it moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeleportMode {
    /// Velocity is preserved through the teleport
    Keep,
    /// Velocity is zeroed on arrival
    Stop,
}

/// Kind of a single tile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileKind {
    /// Free space
    #[default]
    Empty,
    /// Blocks movement
    Solid,
    /// Kills on contact
    Death,
    /// Freezes on contact
    Freeze,
    /// Teleporter entrance on a channel
    TeleportIn {
        /// Channel pairing this entrance with its exit
        channel: u8,
        /// Velocity handling
        mode: TeleportMode,
    },
    /// Teleporter exit on a channel
    TeleportOut {
        /// Channel pairing this exit with its entrances
        channel: u8,
    },
}

impl TileKind {
    /// True for tiles that block movement.
    #[inline]
    pub fn is_solid(self) -> bool {
        matches!(self, TileKind::Solid)
    }

    /// True for tiles that kill.
    #[inline]
    pub fn is_death(self) -> bool {
        matches!(self, TileKind::Death)
    }

    /// True for freeze tiles.
    #[inline]
    pub fn is_freeze(self) -> bool {
        matches!(self, TileKind::Freeze)
    }
}

/// Errors raised while building a map.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MapError {
    /// Map has no rows or columns
    #[error("map is empty")]
    Empty,

    /// Rows have different widths
    #[error("row {row} has width {width}, expected {expected}")]
    RaggedRow {
        /// Offending row
        row: usize,
        /// Its width
        width: usize,
        /// Width of the first row
        expected: usize,
    },

    /// Unknown ASCII tile glyph
    #[error("unknown tile '{glyph}' at ({x}, {y})")]
    UnknownGlyph {
        /// The character
        glyph: char,
        /// Column
        x: usize,
        /// Row
        y: usize,
    },

    /// A teleporter entrance has no exit on its channel
    #[error("teleporter channel {0} has no exit")]
    UnpairedTeleporter(u8),

    /// A map needs at least one spawn point
    #[error("map has no spawn points")]
    NoSpawnPoints,
}

/// Row-major tile storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tiles: Vec<TileKind>,
}

impl TileGrid {
    /// Create an all-empty grid.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tiles: vec![TileKind::Empty; (width as usize) * (height as usize)],
        }
    }

    /// Grid width in tiles.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in tiles.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// World-space size of the grid.
    pub fn world_size(&self) -> Vec2 {
        Vec2::new(self.width as f32 * TILE_SIZE, self.height as f32 * TILE_SIZE)
    }

    /// Map a world coordinate to a cell index: `floor(coord / 32)`.
    #[inline]
    pub fn cell_coord(coord: f32) -> i32 {
        (coord / TILE_SIZE).floor() as i32
    }

    /// Cell containing a world point.
    #[inline]
    pub fn cell_of(point: Vec2) -> (i32, i32) {
        (Self::cell_coord(point.x), Self::cell_coord(point.y))
    }

    /// World-space center of a cell.
    #[inline]
    pub fn cell_center(cx: i32, cy: i32) -> Vec2 {
        Vec2::new(
            cx as f32 * TILE_SIZE + TILE_SIZE / 2.0,
            cy as f32 * TILE_SIZE + TILE_SIZE / 2.0,
        )
    }

    /// Tile at a cell. Cells outside the grid are Solid.
    #[inline]
    pub fn tile(&self, cx: i32, cy: i32) -> TileKind {
        if cx < 0 || cy < 0 || cx >= self.width as i32 || cy >= self.height as i32 {
            return TileKind::Solid;
        }
        self.tiles[cy as usize * self.width as usize + cx as usize]
    }

    /// Tile at a world point.
    #[inline]
    pub fn tile_at(&self, point: Vec2) -> TileKind {
        let (cx, cy) = Self::cell_of(point);
        self.tile(cx, cy)
    }

    /// Overwrite a cell. Out-of-range writes are ignored.
    pub fn set(&mut self, cx: u32, cy: u32, kind: TileKind) {
        if cx < self.width && cy < self.height {
            self.tiles[cy as usize * self.width as usize + cx as usize] = kind;
        }
    }

    /// Iterate all cells with their coordinates.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32, TileKind)> + '_ {
        let width = self.width as usize;
        self.tiles
            .iter()
            .enumerate()
            .map(move |(i, kind)| ((i % width) as i32, (i / width) as i32, *kind))
    }
}

/// A spawn location, optionally restricted to a team.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    /// Character center on spawn
    pub position: Vec2,
    /// Team restriction (`None` = any team)
    pub team: Option<u8>,
}

/// A loaded map: tiles plus spawn and teleporter metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameMap {
    /// Map name (also seeds spawn selection)
    pub name: String,
    /// The tile grid
    pub grid: TileGrid,
    /// Spawn points in map order
    pub spawn_points: Vec<SpawnPoint>,
    /// Teleporter channel -> exit position
    teleport_exits: BTreeMap<u8, Vec2>,
}

impl GameMap {
    /// Assemble a map from its parts, pairing teleporters by channel.
    ///
    /// The first exit tile of a channel (row-major order) is its destination.
    pub fn new(
        name: impl Into<String>,
        grid: TileGrid,
        spawn_points: Vec<SpawnPoint>,
    ) -> Result<Self, MapError> {
        if grid.width() == 0 || grid.height() == 0 {
            return Err(MapError::Empty);
        }
        if spawn_points.is_empty() {
            return Err(MapError::NoSpawnPoints);
        }

        let mut teleport_exits = BTreeMap::new();
        for (cx, cy, kind) in grid.cells() {
            if let TileKind::TeleportOut { channel } = kind {
                teleport_exits
                    .entry(channel)
                    .or_insert_with(|| TileGrid::cell_center(cx, cy));
            }
        }
        for (_, _, kind) in grid.cells() {
            if let TileKind::TeleportIn { channel, .. } = kind {
                if !teleport_exits.contains_key(&channel) {
                    return Err(MapError::UnpairedTeleporter(channel));
                }
            }
        }

        Ok(Self {
            name: name.into(),
            grid,
            spawn_points,
            teleport_exits,
        })
    }

    /// Build a map from ASCII rows.
    ///
    /// Legend: `.`/space empty, `#` solid, `X` death, `~` freeze,
    /// `@` spawn, `<` team 1 spawn, `>` team 2 spawn,
    /// `1`-`9` teleporter entrance keeping velocity,
    /// `a`-`i` teleporter entrance stopping velocity,
    /// `A`-`I` teleporter exit. Spawn glyphs are empty tiles.
    pub fn from_ascii(name: impl Into<String>, rows: &[&str]) -> Result<Self, MapError> {
        let height = rows.len();
        let width = rows.first().map(|r| r.chars().count()).unwrap_or(0);
        if height == 0 || width == 0 {
            return Err(MapError::Empty);
        }

        let mut grid = TileGrid::new(width as u32, height as u32);
        let mut spawn_points = Vec::new();

        for (y, row) in rows.iter().enumerate() {
            let row_width = row.chars().count();
            if row_width != width {
                return Err(MapError::RaggedRow { row: y, width: row_width, expected: width });
            }
            for (x, glyph) in row.chars().enumerate() {
                let kind = match glyph {
                    '.' | ' ' => TileKind::Empty,
                    '#' => TileKind::Solid,
                    'X' => TileKind::Death,
                    '~' => TileKind::Freeze,
                    '@' | '<' | '>' => {
                        let team = match glyph {
                            '<' => Some(1),
                            '>' => Some(2),
                            _ => None,
                        };
                        spawn_points.push(SpawnPoint {
                            position: TileGrid::cell_center(x as i32, y as i32),
                            team,
                        });
                        TileKind::Empty
                    }
                    '1'..='9' => TileKind::TeleportIn {
                        channel: glyph as u8 - b'0',
                        mode: TeleportMode::Keep,
                    },
                    'a'..='i' => TileKind::TeleportIn {
                        channel: glyph as u8 - b'a' + 1,
                        mode: TeleportMode::Stop,
                    },
                    'A'..='I' => TileKind::TeleportOut {
                        channel: glyph as u8 - b'A' + 1,
                    },
                    other => return Err(MapError::UnknownGlyph { glyph: other, x, y }),
                };
                grid.set(x as u32, y as u32, kind);
            }
        }

        Self::new(name, grid, spawn_points)
    }

    /// Destination for a teleporter channel.
    pub fn teleport_destination(&self, channel: u8) -> Option<Vec2> {
        self.teleport_exits.get(&channel).copied()
    }

    /// If the tile is a teleporter entrance, its destination and mode.
    pub fn teleport_for(&self, kind: TileKind) -> Option<(Vec2, TeleportMode)> {
        match kind {
            TileKind::TeleportIn { channel, mode } => {
                self.teleport_destination(channel).map(|dest| (dest, mode))
            }
            _ => None,
        }
    }

    /// Spawn points usable by `team`: untagged points plus those tagged for it.
    /// Falls back to every spawn point when none qualify.
    pub fn spawns_for_team(&self, team: Option<u8>) -> Vec<SpawnPoint> {
        let matching: Vec<SpawnPoint> = self
            .spawn_points
            .iter()
            .copied()
            .filter(|s| s.team.is_none() || s.team == team)
            .collect();
        if matching.is_empty() {
            self.spawn_points.clone()
        } else {
            matching
        }
    }

    /// Small closed arena used by the demo server.
    pub fn demo_arena() -> Result<Self, MapError> {
        Self::from_ascii(
            "demo_arena",
            &[
                "##############################",
                "#............................#",
                "#..........#######...........#",
                "#............................#",
                "#..<......................>..#",
                "#######..............#########",
                "#..........~~~~..............#",
                "#.....1..............A.......#",
                "#....#####......#######......#",
                "#............................#",
                "#..@......................@..#",
                "#########XXXX####XXXX#########",
            ],
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_mapping_floors() {
        assert_eq!(TileGrid::cell_coord(0.0), 0);
        assert_eq!(TileGrid::cell_coord(31.99), 0);
        assert_eq!(TileGrid::cell_coord(32.0), 1);
        assert_eq!(TileGrid::cell_coord(-0.5), -1);
        assert_eq!(TileGrid::cell_coord(320.0), 10);
    }

    #[test]
    fn test_out_of_bounds_is_solid() {
        let grid = TileGrid::new(4, 4);
        assert_eq!(grid.tile(0, 0), TileKind::Empty);
        assert_eq!(grid.tile(-1, 0), TileKind::Solid);
        assert_eq!(grid.tile(4, 0), TileKind::Solid);
        assert_eq!(grid.tile(0, 4), TileKind::Solid);
    }

    #[test]
    fn test_from_ascii() {
        let map = GameMap::from_ascii(
            "t",
            &[
                "#####",
                "#@1A#",
                "#X~b#",
                "#####",
            ],
        );
        // channel 2 ('b') has no exit
        assert_eq!(map, Err(MapError::UnpairedTeleporter(2)));

        let map = GameMap::from_ascii(
            "t",
            &[
                "#####",
                "#@1A#",
                "#X~.#",
                "#####",
            ],
        )
        .unwrap();
        assert_eq!(map.grid.tile(0, 0), TileKind::Solid);
        assert_eq!(map.grid.tile(1, 2), TileKind::Death);
        assert_eq!(map.grid.tile(2, 2), TileKind::Freeze);
        assert_eq!(map.spawn_points.len(), 1);
        assert_eq!(map.spawn_points[0].position, Vec2::new(48.0, 48.0));
        assert_eq!(
            map.grid.tile(2, 1),
            TileKind::TeleportIn { channel: 1, mode: TeleportMode::Keep }
        );
        assert_eq!(map.teleport_destination(1), Some(Vec2::new(112.0, 48.0)));
    }

    #[test]
    fn test_ascii_errors() {
        assert_eq!(GameMap::from_ascii("e", &[]), Err(MapError::Empty));
        assert_eq!(
            GameMap::from_ascii("r", &["##", "#"]),
            Err(MapError::RaggedRow { row: 1, width: 1, expected: 2 })
        );
        assert_eq!(
            GameMap::from_ascii("g", &["#?"]),
            Err(MapError::UnknownGlyph { glyph: '?', x: 1, y: 0 })
        );
        assert_eq!(GameMap::from_ascii("n", &["##"]), Err(MapError::NoSpawnPoints));
    }

    #[test]
    fn test_team_spawns() {
        let map = GameMap::demo_arena().unwrap();
        let red = map.spawns_for_team(Some(1));
        assert!(red.iter().all(|s| s.team.is_none() || s.team == Some(1)));
        assert!(red.iter().any(|s| s.team == Some(1)));
        let any = map.spawns_for_team(None);
        assert!(any.iter().all(|s| s.team.is_none()));
    }
}
