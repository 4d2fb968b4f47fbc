//! # Hookline Game Server
//!
//! Authoritative server for a tile-based 2D platformer with grappling-hook
//! movement, plus the client-side prediction that makes it playable over
//! a network.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HOOKLINE SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── vec2.rs     - 2D float vector                           │
//! │  ├── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │  └── hash.rs     - SHA-256 state hashing                     │
//! │                                                              │
//! │  config.rs       - Server and match configuration            │
//! │                                                              │
//! │  game/           - Game logic (deterministic)                │
//! │  ├── map.rs      - Tile grid, spawns, teleporters            │
//! │  ├── collision.rs- Swept AABB and line queries               │
//! │  ├── physics.rs  - Movement, jumps, grappling hook           │
//! │  ├── weapon.rs   - Weapons and projectiles                   │
//! │  ├── tick.rs     - Authoritative simulation loop             │
//! │  ├── mode.rs     - Deathmatch / Team Deathmatch              │
//! │  └── authority.rs- Owner of the canonical world              │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── server.rs   - WebSocket server, simulation task         │
//! │  ├── protocol.rs - Versioned message types                   │
//! │  ├── session.rs  - Per-connection session table              │
//! │  ├── prediction.rs - Client prediction and reconciliation    │
//! │  ├── interpolation.rs - Remote character smoothing           │
//! │  └── client.rs   - WebSocket client                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! The `game/` modules reproduce a run exactly from the same initial state
//! and input stream on the same build:
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - All randomness from seeded Xorshift128+
//! - A fixed `dt` per tick
//!
//! This is what lets a client replay its unacknowledged inputs through
//! [`game::physics::physics_step`] and land where the server will.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod config;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::vec2::Vec2;
pub use core::rng::DeterministicRng;
pub use config::{ConfigError, MatchConfig, ModeKind, ServerConfig};
pub use game::authority::Authority;
pub use game::input::InputFrame;
pub use game::map::GameMap;
pub use game::snapshot::Snapshot;
pub use game::state::{Character, CharacterId, WorldState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default simulation tick rate (Hz)
pub const TICK_RATE: u32 = config::DEFAULT_TICK_RATE;
