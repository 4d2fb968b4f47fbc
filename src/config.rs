//! Configuration
//!
//! [`ServerConfig`] is read from `HOOKLINE_*` environment variables by the
//! binary. [`MatchConfig`] holds the rules handed to the authority: tuning,
//! weapon table, mode and limits. Every value has a default, so an empty
//! environment yields a playable server.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Serialize, Deserialize};

use crate::game::tuning::Tuning;
use crate::game::weapon::{BallisticsRules, WeaponTable};

/// Default simulation rate (Hz).
pub const DEFAULT_TICK_RATE: u32 = 50;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A value was present but malformed or out of range
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Offending variable or section
        key: &'static str,
        /// What was wrong
        reason: String,
    },

    /// A referenced file could not be read
    #[error("failed to read {path}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

// =============================================================================
// MATCH RULES
// =============================================================================

/// Which game mode policy runs the match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeKind {
    /// Free for all
    #[default]
    Deathmatch,
    /// Two teams, team score
    TeamDeathmatch,
}

impl ModeKind {
    /// Score that ends a round unless overridden.
    pub fn default_score_limit(self) -> i32 {
        match self {
            ModeKind::Deathmatch => 20,
            ModeKind::TeamDeathmatch => 30,
        }
    }
}

impl FromStr for ModeKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dm" | "deathmatch" => Ok(ModeKind::Deathmatch),
            "tdm" | "team_deathmatch" => Ok(ModeKind::TeamDeathmatch),
            other => Err(ConfigError::Invalid {
                key: "HOOKLINE_MODE",
                reason: format!("unknown mode '{other}', expected dm or tdm"),
            }),
        }
    }
}

/// Rules of one match. Immutable once the authority is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Simulation rate; `dt` is its reciprocal
    pub tick_rate: u32,
    /// Movement constants
    pub tuning: Tuning,
    /// Per-weapon parameters
    pub weapons: WeaponTable,
    /// Projectile cap and friendly fire
    pub ballistics: BallisticsRules,
    /// Scoring policy
    pub mode: ModeKind,
    /// Health on spawn
    pub max_health: i32,
    /// Ticks between death and respawn
    pub respawn_ticks: u32,
    /// Whether freeze tiles have an effect
    pub freeze_enabled: bool,
    /// Score (player in DM, team in TDM) that ends the round; 0 disables
    pub score_limit: i32,
    /// Round length in ticks; `None` for unlimited
    pub time_limit_ticks: Option<u32>,
    /// Ticks the scoreboard is shown before the next round starts
    pub round_restart_ticks: u32,
}

impl MatchConfig {
    /// Defaults for a mode.
    pub fn for_mode(mode: ModeKind) -> Self {
        Self {
            mode,
            score_limit: mode.default_score_limit(),
            ..Self::default()
        }
    }

    /// Fixed tick duration in seconds.
    #[inline]
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    /// Seconds to ticks at this tick rate.
    pub fn seconds_to_ticks(&self, seconds: u32) -> u32 {
        seconds.saturating_mul(self.tick_rate)
    }

    /// Reject rules that would break the simulation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err(ConfigError::Invalid {
                key: "tick_rate",
                reason: format!("must be within 1..=1000, got {}", self.tick_rate),
            });
        }
        if self.max_health <= 0 {
            return Err(ConfigError::Invalid {
                key: "max_health",
                reason: "must be positive".into(),
            });
        }
        if self.ballistics.max_projectiles == 0 {
            return Err(ConfigError::Invalid {
                key: "max_projectiles",
                reason: "must be positive".into(),
            });
        }
        self.tuning.validate()
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            tuning: Tuning::default(),
            weapons: WeaponTable::default(),
            ballistics: BallisticsRules::default(),
            mode: ModeKind::Deathmatch,
            max_health: 10,
            respawn_ticks: 25,
            freeze_enabled: true,
            score_limit: ModeKind::Deathmatch.default_score_limit(),
            time_limit_ticks: None,
            round_restart_ticks: DEFAULT_TICK_RATE * 5,
        }
    }
}

// =============================================================================
// SERVER
// =============================================================================

/// Process-level settings for the binary.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// WebSocket listen address
    pub bind_addr: SocketAddr,
    /// Broadcast a snapshot every N ticks
    pub snapshot_interval: u32,
    /// Max simultaneous characters
    pub max_players: usize,
    /// Ticks without input before a session is dropped
    pub input_timeout_ticks: u32,
    /// Match rules
    pub match_config: MatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8303)),
            snapshot_interval: 2,
            max_players: 16,
            input_timeout_ticks: DEFAULT_TICK_RATE * 10,
            match_config: MatchConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = lookup("HOOKLINE_BIND") {
            config.bind_addr = parse_var("HOOKLINE_BIND", &addr)?;
        }
        if let Some(rate) = lookup("HOOKLINE_TICK_RATE") {
            config.match_config.tick_rate = parse_var("HOOKLINE_TICK_RATE", &rate)?;
        }
        if let Some(interval) = lookup("HOOKLINE_SNAPSHOT_INTERVAL") {
            config.snapshot_interval = parse_var("HOOKLINE_SNAPSHOT_INTERVAL", &interval)?;
        }
        if let Some(max) = lookup("HOOKLINE_MAX_PLAYERS") {
            config.max_players = parse_var("HOOKLINE_MAX_PLAYERS", &max)?;
        }
        config.input_timeout_ticks = match lookup("HOOKLINE_INPUT_TIMEOUT_TICKS") {
            Some(timeout) => parse_var("HOOKLINE_INPUT_TIMEOUT_TICKS", &timeout)?,
            None => config.match_config.seconds_to_ticks(10),
        };

        if let Some(mode) = lookup("HOOKLINE_MODE") {
            let mode: ModeKind = mode.parse()?;
            config.match_config.mode = mode;
            config.match_config.score_limit = mode.default_score_limit();
        }
        if let Some(limit) = lookup("HOOKLINE_SCORE_LIMIT") {
            config.match_config.score_limit = parse_var("HOOKLINE_SCORE_LIMIT", &limit)?;
        }
        if let Some(secs) = lookup("HOOKLINE_TIME_LIMIT_SECS") {
            let secs: u32 = parse_var("HOOKLINE_TIME_LIMIT_SECS", &secs)?;
            config.match_config.time_limit_ticks =
                (secs > 0).then(|| config.match_config.seconds_to_ticks(secs));
        }
        if let Some(path) = lookup("HOOKLINE_TUNING") {
            config.match_config.tuning = Tuning::from_json_file(path)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.snapshot_interval == 0 {
            return Err(ConfigError::Invalid {
                key: "HOOKLINE_SNAPSHOT_INTERVAL",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_players == 0 || self.max_players > usize::from(u16::MAX) {
            return Err(ConfigError::Invalid {
                key: "HOOKLINE_MAX_PLAYERS",
                reason: format!("must be within 1..=65535, got {}", self.max_players),
            });
        }
        self.match_config.validate()
    }
}

fn parse_var<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: format!("'{value}': {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.match_config.tick_rate, 50);
        assert_eq!(config.snapshot_interval, 2);
        assert_eq!(config.input_timeout_ticks, 500);
        assert_eq!(config.match_config.mode, ModeKind::Deathmatch);
        assert_eq!(config.match_config.score_limit, 20);
    }

    #[test]
    fn test_team_mode_changes_score_limit() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HOOKLINE_MODE", "tdm"),
            ("HOOKLINE_TIME_LIMIT_SECS", "300"),
        ]))
        .unwrap();
        assert_eq!(config.match_config.mode, ModeKind::TeamDeathmatch);
        assert_eq!(config.match_config.score_limit, 30);
        assert_eq!(config.match_config.time_limit_ticks, Some(15_000));
    }

    #[test]
    fn test_malformed_values_rejected() {
        assert!(ServerConfig::from_lookup(lookup(&[("HOOKLINE_TICK_RATE", "fast")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("HOOKLINE_MODE", "ctf")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("HOOKLINE_SNAPSHOT_INTERVAL", "0")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("HOOKLINE_BIND", "nowhere")])).is_err());
    }

    #[test]
    fn test_missing_tuning_file_is_io_error() {
        let err = ServerConfig::from_lookup(lookup(&[("HOOKLINE_TUNING", "/nonexistent/tuning.json")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_dt() {
        assert_eq!(MatchConfig::default().dt(), 1.0 / 50.0);
    }
}
