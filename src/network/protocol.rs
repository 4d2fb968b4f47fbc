//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is an [`Envelope`] carrying [`PROTOCOL_VERSION`] and one
//! message. Text frames are JSON for debugging ease; binary frames are
//! bincode. A server answers in the format the client last used.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Serialize, Deserialize};
use tokio_tungstenite::tungstenite::Message;

use crate::game::input::InputFrame;
use crate::game::snapshot::Snapshot;
use crate::game::state::CharacterId;

/// Bumped on any incompatible change to the messages below.
pub const PROTOCOL_VERSION: u16 = 1;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for a character.
    Join {
        /// Display name; trimmed and truncated by the server
        name: String,
    },

    /// One tick of input.
    Input(InputFrame),

    /// Leave the match.
    Leave,

    /// Ping for latency measurement.
    Ping {
        /// Client clock, echoed back
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join accepted.
    JoinAck {
        /// The character this connection controls
        character_id: CharacterId,
        /// Full state including the new character
        snapshot: Arc<Snapshot>,
    },

    /// Periodic authoritative state.
    Snapshot(Arc<Snapshot>),

    /// Reply to a ping.
    Pong {
        /// Echo of the ping timestamp
        timestamp: u64,
        /// Tick of the newest snapshot this connection saw
        server_tick: u32,
    },

    /// Request could not be served.
    Error(ErrorInfo),

    /// Server is going away.
    Shutdown {
        /// Why
        reason: String,
    },
}

/// Error reply body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ErrorInfo {
    /// Build an error reply.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame could not be decoded.
    InvalidMessage,
    /// Frame carried another protocol version.
    VersionMismatch,
    /// No free character slot.
    ServerFull,
    /// Input or leave before a successful join.
    NotJoined,
    /// Second join on the same connection.
    AlreadyJoined,
    /// No input for too long.
    TimedOut,
    /// Internal error.
    InternalError,
}

// =============================================================================
// ENVELOPE AND CODEC
// =============================================================================

/// Versioned wrapper around every message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Sender's protocol version
    pub version: u16,
    /// Payload
    pub message: T,
}

/// Encoding of a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WireFormat {
    /// JSON in a text frame
    #[default]
    Json,
    /// bincode in a binary frame
    Binary,
}

/// An encoded frame ready for the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    /// JSON text
    Text(String),
    /// bincode bytes
    Binary(Vec<u8>),
}

impl WireFrame {
    /// Format of this frame.
    pub fn format(&self) -> WireFormat {
        match self {
            WireFrame::Text(_) => WireFormat::Json,
            WireFrame::Binary(_) => WireFormat::Binary,
        }
    }
}

impl From<WireFrame> for Message {
    fn from(frame: WireFrame) -> Self {
        match frame {
            WireFrame::Text(text) => Message::Text(text),
            WireFrame::Binary(bytes) => Message::Binary(bytes),
        }
    }
}

/// Wire decode failures.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Malformed JSON frame
    #[error("malformed JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed binary frame
    #[error("malformed binary frame: {0}")]
    Binary(#[from] bincode::Error),

    /// Peer speaks another protocol version
    #[error("protocol version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Our version
        expected: u16,
        /// Theirs
        found: u16,
    },
}

impl ProtocolError {
    /// Code to report back to the peer.
    pub fn code(&self) -> ErrorCode {
        match self {
            ProtocolError::Json(_) | ProtocolError::Binary(_) => ErrorCode::InvalidMessage,
            ProtocolError::VersionMismatch { .. } => ErrorCode::VersionMismatch,
        }
    }

    /// Error reply for the peer.
    pub fn to_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.code(), self.to_string())
    }
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u16,
}

fn check_version(found: u16) -> Result<(), ProtocolError> {
    if found != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            found,
        });
    }
    Ok(())
}

fn encode<T: Serialize>(message: &T, format: WireFormat) -> Result<WireFrame, ProtocolError> {
    let envelope = Envelope {
        version: PROTOCOL_VERSION,
        message,
    };
    Ok(match format {
        WireFormat::Json => WireFrame::Text(serde_json::to_string(&envelope)?),
        WireFormat::Binary => WireFrame::Binary(bincode::serialize(&envelope)?),
    })
}

fn decode_json<T: DeserializeOwned>(text: &str) -> Result<T, ProtocolError> {
    // Probe first so a newer peer gets a version error, not a parse error
    let probe: VersionProbe = serde_json::from_str(text)?;
    check_version(probe.version)?;
    let envelope: Envelope<T> = serde_json::from_str(text)?;
    Ok(envelope.message)
}

fn decode_binary<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    // The version is the leading u16 of the envelope
    let version: u16 = bincode::deserialize(data)?;
    check_version(version)?;
    let envelope: Envelope<T> = bincode::deserialize(data)?;
    Ok(envelope.message)
}

fn decode_frame<T: DeserializeOwned>(frame: &WireFrame) -> Result<T, ProtocolError> {
    match frame {
        WireFrame::Text(text) => decode_json(text),
        WireFrame::Binary(data) => decode_binary(data),
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Encode in an envelope.
    pub fn encode(&self, format: WireFormat) -> Result<WireFrame, ProtocolError> {
        encode(self, format)
    }

    /// Decode a frame, checking its version.
    pub fn decode(frame: &WireFrame) -> Result<Self, ProtocolError> {
        decode_frame(frame)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let envelope = Envelope {
            version: PROTOCOL_VERSION,
            message: self,
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        decode_json(s)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        decode_binary(data)
    }
}

impl ServerMessage {
    /// Encode in an envelope.
    pub fn encode(&self, format: WireFormat) -> Result<WireFrame, ProtocolError> {
        encode(self, format)
    }

    /// Decode a frame, checking its version.
    pub fn decode(frame: &WireFrame) -> Result<Self, ProtocolError> {
        decode_frame(frame)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        decode_json(s)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        decode_binary(data)
    }
}
