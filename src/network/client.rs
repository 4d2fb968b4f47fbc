//! WebSocket Game Client
//!
//! Joins a server, streams input frames and feeds every snapshot into a
//! [`Predictor`] (own character) and an [`Interpolator`] (everyone else).
//! Used by bots, load tests and the integration tests; a graphical client
//! would drive the same type from its frame loop.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument};

use crate::config::MatchConfig;
use crate::core::vec2::Vec2;
use crate::game::input::InputFrame;
use crate::game::map::GameMap;
use crate::game::state::{Character, CharacterId};
use crate::game::weapon::WeaponKind;
use crate::network::interpolation::{Interpolator, RenderedCharacter};
use crate::network::prediction::{Predictor, Reconciliation};
use crate::network::protocol::{
    ClientMessage, ErrorInfo, ProtocolError, ServerMessage, WireFormat, WireFrame,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Wire decode error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Server answered with an error.
    #[error("Server rejected request: {} ({:?})", .0.message, .0.code)]
    Rejected(ErrorInfo),

    /// Server closed the connection.
    #[error("Connection closed")]
    Closed,

    /// Join ack did not contain our character.
    #[error("Character {0} missing from join snapshot")]
    MissingCharacter(CharacterId),
}

/// Something the server told us.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A snapshot was applied.
    Snapshot {
        /// Server tick
        tick: u32,
        /// What prediction did with it
        reconciliation: Reconciliation,
    },
    /// Ping answer.
    Pong {
        /// Our timestamp, echoed
        timestamp: u64,
        /// Server tick at reply time
        server_tick: u32,
    },
    /// Non-fatal error reply (bad frame and the like).
    Error(ErrorInfo),
    /// Server is shutting down.
    Shutdown(String),
}

/// A connected, joined client.
pub struct GameClient {
    sink: SplitSink<Socket, Message>,
    stream: SplitStream<Socket>,
    format: WireFormat,
    character_id: CharacterId,
    predictor: Predictor,
    interpolator: Interpolator,
}

impl GameClient {
    /// Connect and join.
    ///
    /// The map and rules must match the server's; prediction runs the same
    /// physics locally.
    #[instrument(skip(map, config))]
    pub async fn connect(
        url: &str,
        name: &str,
        format: WireFormat,
        map: Arc<GameMap>,
        config: MatchConfig,
    ) -> Result<Self, ClientError> {
        let (socket, _) = connect_async(url).await?;
        let (mut sink, mut stream) = socket.split();

        let join = ClientMessage::Join { name: name.to_string() };
        sink.send(join.encode(format)?.into()).await?;

        let (character_id, snapshot) = loop {
            match next_message(&mut stream).await? {
                ServerMessage::JoinAck { character_id, snapshot } => break (character_id, snapshot),
                ServerMessage::Error(info) => return Err(ClientError::Rejected(info)),
                ServerMessage::Shutdown { .. } => return Err(ClientError::Closed),
                other => debug!(?other, "ignoring message before join ack"),
            }
        };

        let predictor = Predictor::new(character_id, &snapshot, map, config)
            .ok_or(ClientError::MissingCharacter(character_id))?;
        let mut interpolator = Interpolator::new();
        interpolator.push(snapshot);
        info!(character = %character_id, "joined");

        Ok(Self {
            sink,
            stream,
            format,
            character_id,
            predictor,
            interpolator,
        })
    }

    /// Predict and send one tick of input. Returns the frame sent.
    pub async fn send_input(
        &mut self,
        direction: i8,
        aim: Vec2,
        buttons: u8,
        weapon: WeaponKind,
    ) -> Result<InputFrame, ClientError> {
        let mut frame = self
            .predictor
            .next_frame()
            .with_direction(direction)
            .with_aim(aim)
            .with_weapon(weapon);
        frame.buttons = buttons;
        self.predictor.predict(frame);
        self.send(ClientMessage::Input(frame)).await?;
        Ok(frame)
    }

    /// Send a ping.
    pub async fn ping(&mut self, timestamp: u64) -> Result<(), ClientError> {
        self.send(ClientMessage::Ping { timestamp }).await
    }

    /// Wait for the next server message and apply it.
    pub async fn next_event(&mut self) -> Result<ClientEvent, ClientError> {
        loop {
            match next_message(&mut self.stream).await? {
                ServerMessage::Snapshot(snapshot) => {
                    let tick = snapshot.tick;
                    let reconciliation = self.predictor.reconcile(&snapshot);
                    self.interpolator.push(snapshot);
                    return Ok(ClientEvent::Snapshot { tick, reconciliation });
                }
                ServerMessage::Pong { timestamp, server_tick } => {
                    return Ok(ClientEvent::Pong { timestamp, server_tick });
                }
                ServerMessage::Error(info) => return Ok(ClientEvent::Error(info)),
                ServerMessage::Shutdown { reason } => return Ok(ClientEvent::Shutdown(reason)),
                ServerMessage::JoinAck { .. } => debug!("ignoring repeated join ack"),
            }
        }
    }

    /// Leave and close the socket.
    pub async fn leave(mut self) -> Result<(), ClientError> {
        self.send(ClientMessage::Leave).await?;
        self.sink.close().await?;
        Ok(())
    }

    /// Our character id.
    pub fn character_id(&self) -> CharacterId {
        self.character_id
    }

    /// Predicted state of our character.
    pub fn predicted(&self) -> &Character {
        self.predictor.predicted()
    }

    /// Everyone else, blended at `render_tick`.
    pub fn remote_characters(&self, render_tick: f32) -> Vec<RenderedCharacter> {
        self.interpolator.sample(render_tick, Some(self.character_id))
    }

    /// Prediction state.
    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    /// Interpolation state.
    pub fn interpolator(&self) -> &Interpolator {
        &self.interpolator
    }

    async fn send(&mut self, msg: ClientMessage) -> Result<(), ClientError> {
        self.sink.send(msg.encode(self.format)?.into()).await?;
        Ok(())
    }
}

async fn next_message(stream: &mut SplitStream<Socket>) -> Result<ServerMessage, ClientError> {
    loop {
        let frame = match stream.next().await {
            Some(Ok(Message::Text(text))) => WireFrame::Text(text),
            Some(Ok(Message::Binary(data))) => WireFrame::Binary(data),
            Some(Ok(Message::Close(_))) | None => return Err(ClientError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        };
        return Ok(ServerMessage::decode(&frame)?);
    }
}
