//! Game Logic Module
//!
//! All game simulation code. Deterministic for a given tick rate and input
//! stream: ids and maps iterate in order, randomness is seeded.
//!
//! ## Module Structure
//!
//! - `map`: Tile grid, spawn points, teleporter channels
//! - `collision`: Swept box and line queries against the grid
//! - `tuning`: Movement and hook constants
//! - `physics`: Per-character physics step (shared with the client)
//! - `weapon`: Weapon table, firing and projectiles
//! - `input`: Input frames and server-side buffering
//! - `state`: Characters, projectiles, world
//! - `mode`: Deathmatch / Team Deathmatch policies
//! - `tick`: Authoritative simulation loop
//! - `events`: Game events for logs and replay
//! - `snapshot`: Serialized world sent to clients
//! - `authority`: Owner of the canonical world

pub mod map;
pub mod collision;
pub mod tuning;
pub mod physics;
pub mod weapon;
pub mod input;
pub mod state;
pub mod mode;
pub mod tick;
pub mod events;
pub mod snapshot;
pub mod authority;

// Re-export key types
pub use authority::{Authority, JoinError};
pub use events::{GameEvent, GameEventData};
pub use input::{InputDisposition, InputFrame, InputQueue};
pub use map::{GameMap, TileGrid, TileKind, TILE_SIZE};
pub use mode::{GameMode, RoundResult};
pub use physics::{physics_step, PhysicsEnv, PhysicsOutcome};
pub use snapshot::Snapshot;
pub use state::{Character, CharacterId, HookState, Projectile, RoundPhase, WorldState};
pub use tick::TickResult;
pub use tuning::Tuning;
pub use weapon::{WeaponKind, WeaponTable};
