//! Client Session Tracking
//!
//! One [`Session`] per WebSocket connection, walking
//! Connecting → Synced → Disconnected. The table is owned by the
//! simulation task alongside the authority, so it needs no locking; the
//! tick loop sweeps it for connections that stopped sending input.

use std::collections::BTreeMap;
use std::fmt;

use uuid::Uuid;

use crate::game::state::CharacterId;
use crate::network::protocol::{ErrorCode, ErrorInfo, WireFormat};

/// Unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell connections apart in logs
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Socket open, no character yet.
    Connecting,
    /// Owns a character and streams input.
    Synced,
    /// Left, timed out or dropped; character removal is pending.
    Disconnected,
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No session with this id
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// Connection id registered twice
    #[error("connection {0} already registered")]
    DuplicateConnection(ConnectionId),

    /// Operation needs a character
    #[error("connection {0} has not joined")]
    NotJoined(ConnectionId),

    /// Join on a connection that already has a character
    #[error("connection {0} already controls {1}")]
    AlreadyJoined(ConnectionId, CharacterId),
}

impl SessionError {
    /// Error reply for the peer.
    pub fn to_info(&self) -> ErrorInfo {
        let code = match self {
            SessionError::AlreadyJoined(..) => ErrorCode::AlreadyJoined,
            SessionError::NotJoined(_) => ErrorCode::NotJoined,
            SessionError::UnknownConnection(_) | SessionError::DuplicateConnection(_) => {
                ErrorCode::InternalError
            }
        };
        ErrorInfo::new(code, self.to_string())
    }
}

/// One connected client.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Lifecycle state.
    pub state: SessionState,
    /// Controlled character once synced.
    pub character: Option<CharacterId>,
    /// Tick the last input (or the join) arrived on.
    pub last_input_tick: u32,
    /// Encoding the client last used.
    pub format: WireFormat,
}

/// All sessions of one server, keyed by connection.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: BTreeMap<ConnectionId, Session>,
    timeout_ticks: u32,
}

impl SessionTable {
    /// Create a table that times out sessions after `timeout_ticks`
    /// without input. Zero disables the timeout.
    pub fn new(timeout_ticks: u32) -> Self {
        Self {
            sessions: BTreeMap::new(),
            timeout_ticks,
        }
    }

    /// Register a new connection in the Connecting state.
    pub fn open(&mut self, id: ConnectionId, format: WireFormat, tick: u32) -> Result<(), SessionError> {
        if self.sessions.contains_key(&id) {
            return Err(SessionError::DuplicateConnection(id));
        }
        self.sessions.insert(id, Session {
            id,
            state: SessionState::Connecting,
            character: None,
            last_input_tick: tick,
            format,
        });
        Ok(())
    }

    /// Check that a join may proceed.
    pub fn can_join(&self, id: ConnectionId) -> Result<(), SessionError> {
        let session = self.sessions.get(&id).ok_or(SessionError::UnknownConnection(id))?;
        match session.character {
            Some(character) => Err(SessionError::AlreadyJoined(id, character)),
            None => Ok(()),
        }
    }

    /// Bind a character and move to Synced.
    pub fn bind(&mut self, id: ConnectionId, character: CharacterId, tick: u32) -> Result<(), SessionError> {
        self.can_join(id)?;
        let session = self.sessions.get_mut(&id).ok_or(SessionError::UnknownConnection(id))?;
        session.character = Some(character);
        session.state = SessionState::Synced;
        session.last_input_tick = tick;
        Ok(())
    }

    /// Note an input arriving; returns the character it drives.
    pub fn record_input(&mut self, id: ConnectionId, tick: u32) -> Result<CharacterId, SessionError> {
        let session = self.sessions.get_mut(&id).ok_or(SessionError::UnknownConnection(id))?;
        match (session.state, session.character) {
            (SessionState::Synced, Some(character)) => {
                session.last_input_tick = tick;
                Ok(character)
            }
            _ => Err(SessionError::NotJoined(id)),
        }
    }

    /// Remember which encoding the client speaks.
    pub fn set_format(&mut self, id: ConnectionId, format: WireFormat) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.format = format;
        }
    }

    /// Drop a session. Returns the character to remove, if any.
    pub fn close(&mut self, id: ConnectionId) -> Option<CharacterId> {
        let mut session = self.sessions.remove(&id)?;
        session.state = SessionState::Disconnected;
        session.character
    }

    /// Remove every synced session idle for longer than the timeout.
    pub fn sweep_timeouts(&mut self, now_tick: u32) -> Vec<(ConnectionId, CharacterId)> {
        if self.timeout_ticks == 0 {
            return Vec::new();
        }
        let timeout = self.timeout_ticks;
        let expired: Vec<ConnectionId> = self
            .sessions
            .values()
            .filter(|s| s.state == SessionState::Synced)
            .filter(|s| now_tick.saturating_sub(s.last_input_tick) > timeout)
            .map(|s| s.id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.close(id).map(|character| (id, character)))
            .collect()
    }

    /// Look up a session.
    pub fn get(&self, id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no session is open.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions that own a character.
    pub fn synced_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| s.state == SessionState::Synced)
            .count()
    }
}
