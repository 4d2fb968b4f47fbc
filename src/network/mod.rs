//! Network Layer
//!
//! WebSocket server and client plus the client-side prediction and
//! interpolation that hide latency. This layer is **non-deterministic**;
//! all game logic runs through `game/`.

pub mod protocol;
pub mod session;
pub mod server;
pub mod prediction;
pub mod interpolation;
pub mod client;

pub use protocol::{
    ClientMessage, ServerMessage, ErrorCode, ErrorInfo, ProtocolError, WireFormat, PROTOCOL_VERSION,
};
pub use session::{ConnectionId, SessionError, SessionState, SessionTable};
pub use server::{GameServer, ServerError};
pub use prediction::{Predictor, Reconciliation, PREDICTION_WINDOW};
pub use interpolation::{Interpolator, RenderedCharacter};
pub use client::{ClientError, ClientEvent, GameClient};
