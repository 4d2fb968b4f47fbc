//! WebSocket Game Server
//!
//! One simulation task owns the [`Authority`] and the [`SessionTable`] and
//! is the only code that mutates game state. Connection tasks talk to it
//! through a bounded command queue and receive snapshots from a broadcast
//! channel; nothing mutable is shared between them.
//!
//! ```text
//! conn task ──Command──► simulation task ──Arc<Snapshot>──► every conn task
//!     ▲                        │
//!     └──── direct replies ────┘ (errors, timeouts, shutdown)
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::{ConfigError, ServerConfig};
use crate::game::authority::Authority;
use crate::game::input::{InputDisposition, InputFrame};
use crate::game::map::GameMap;
use crate::game::snapshot::Snapshot;
use crate::game::state::CharacterId;
use crate::network::protocol::{
    ClientMessage, ErrorCode, ErrorInfo, ProtocolError, ServerMessage, WireFormat, WireFrame,
};
use crate::network::session::{ConnectionId, SessionError, SessionTable};

/// Commands buffered between connection tasks and the simulation.
const COMMAND_BUFFER: usize = 1024;

/// Snapshots a slow connection may fall behind before skipping ahead.
const SNAPSHOT_BUFFER: usize = 16;

/// Frames queued for one socket writer.
const OUTBOUND_BUFFER: usize = 64;

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    Bind(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Wire decode error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Invalid configuration.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The simulation task panicked or was cancelled.
    #[error("Simulation task stopped unexpectedly")]
    SimulationStopped,
}

// =============================================================================
// SIMULATION TASK
// =============================================================================

type JoinReply = oneshot::Sender<Result<(CharacterId, Arc<Snapshot>), ErrorInfo>>;

/// Requests from connection tasks to the simulation.
enum Command {
    /// Socket accepted; `outbox` carries direct replies.
    Connect {
        conn: ConnectionId,
        outbox: mpsc::Sender<ServerMessage>,
    },
    /// Allocate a character.
    Join {
        conn: ConnectionId,
        name: String,
        format: WireFormat,
        reply: JoinReply,
    },
    /// One input frame.
    Input {
        conn: ConnectionId,
        frame: InputFrame,
    },
    /// Explicit leave or dropped socket.
    Disconnect { conn: ConnectionId },
}

/// State owned by the simulation task.
struct Simulation {
    authority: Authority,
    sessions: SessionTable,
    outboxes: BTreeMap<ConnectionId, mpsc::Sender<ServerMessage>>,
    snapshots: broadcast::Sender<Arc<Snapshot>>,
    snapshot_interval: u32,
}

impl Simulation {
    fn new(
        authority: Authority,
        sessions: SessionTable,
        snapshots: broadcast::Sender<Arc<Snapshot>>,
        snapshot_interval: u32,
    ) -> Self {
        Self {
            authority,
            sessions,
            outboxes: BTreeMap::new(),
            snapshots,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Tick at a fixed rate until shutdown, serving commands in between.
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let tick_rate = self.authority.config().tick_rate.max(1);
        let mut ticker = interval(Duration::from_micros(1_000_000 / tick_rate as u64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(tick_rate, "simulation started");

        loop {
            tokio::select! {
                _ = ticker.tick() => self.step(),
                Some(command) = commands.recv() => self.handle(command),
                _ = shutdown_rx.recv() => break,
            }
        }

        for (_, outbox) in std::mem::take(&mut self.outboxes) {
            let _ = outbox.try_send(ServerMessage::Shutdown {
                reason: "Server shutting down".to_string(),
            });
        }
        info!(tick = self.authority.world().tick, "simulation stopped");
    }

    fn handle(&mut self, command: Command) {
        let tick = self.authority.world().tick;
        match command {
            Command::Connect { conn, outbox } => {
                if let Err(e) = self.sessions.open(conn, WireFormat::default(), tick) {
                    error!(%conn, "{}", e);
                    return;
                }
                self.outboxes.insert(conn, outbox);
            }
            Command::Join { conn, name, format, reply } => {
                let _ = reply.send(self.join(conn, &name, format, tick));
            }
            Command::Input { conn, frame } => match self.sessions.record_input(conn, tick) {
                Ok(character) => {
                    let disposition = self.authority.apply_input(character, frame);
                    if disposition != InputDisposition::Queued {
                        trace!(%conn, sequence = frame.sequence, ?disposition, "input not queued");
                    }
                }
                Err(e) => debug!(%conn, "dropping input: {}", e),
            },
            Command::Disconnect { conn } => {
                self.outboxes.remove(&conn);
                if let Some(character) = self.sessions.close(conn) {
                    info!(%conn, character = %character, "session closed");
                    self.authority.leave(character);
                }
            }
        }
    }

    fn join(
        &mut self,
        conn: ConnectionId,
        name: &str,
        format: WireFormat,
        tick: u32,
    ) -> Result<(CharacterId, Arc<Snapshot>), ErrorInfo> {
        self.sessions.can_join(conn).map_err(|e| e.to_info())?;
        let character = self
            .authority
            .join(name)
            .map_err(|e| ErrorInfo::new(ErrorCode::ServerFull, e.to_string()))?;
        self.sessions.bind(conn, character, tick).map_err(|e| e.to_info())?;
        self.sessions.set_format(conn, format);
        info!(%conn, character = %character, "session synced");
        Ok((character, self.authority.snapshot()))
    }

    fn step(&mut self) {
        let result = self.authority.tick();
        let tick = self.authority.world().tick;

        for kill in &result.kills {
            debug!(tick, victim = %kill.victim, killer = ?kill.killer, weapon = ?kill.weapon, "kill");
        }

        for (conn, character) in self.sessions.sweep_timeouts(tick) {
            warn!(%conn, character = %character, "no input received, disconnecting");
            self.authority.leave(character);
            if let Some(outbox) = self.outboxes.remove(&conn) {
                let _ = outbox.try_send(ServerMessage::Error(ErrorInfo::new(
                    ErrorCode::TimedOut,
                    "no input received",
                )));
            }
        }

        if tick % self.snapshot_interval == 0 {
            let snapshot = self.authority.snapshot();
            trace!(tick, hash = %snapshot.hash_hex(), "broadcast snapshot");
            // No receivers is fine
            let _ = self.snapshots.send(snapshot);
        }
    }
}

// =============================================================================
// SERVER
// =============================================================================

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Map every match on this server is played on.
    map: Arc<GameMap>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig, map: Arc<GameMap>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            map,
            shutdown_tx,
        }
    }

    /// Bind the configured address and run until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run on an already bound listener.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.config.validate()?;
        info!("Game server listening on {}", listener.local_addr()?);

        let authority = Authority::new(
            Arc::clone(&self.map),
            self.config.match_config.clone(),
            self.config.max_players,
        );
        let sessions = SessionTable::new(self.config.input_timeout_ticks);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, _) = broadcast::channel(SNAPSHOT_BUFFER);

        let simulation = Simulation::new(
            authority,
            sessions,
            snapshot_tx.clone(),
            self.config.snapshot_interval,
        );
        let simulation_handle = tokio::spawn(simulation.run(command_rx, self.shutdown_tx.subscribe()));

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!("New connection from {}", addr);
                            tokio::spawn(handle_connection(
                                stream,
                                addr,
                                command_tx.clone(),
                                snapshot_tx.subscribe(),
                            ));
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        drop(command_tx);
        simulation_handle.await.map_err(|_| ServerError::SimulationStopped)
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

// =============================================================================
// CONNECTION TASK
// =============================================================================

/// Per-connection view the handler keeps between messages.
struct ConnectionState {
    conn: ConnectionId,
    format: WireFormat,
    character: Option<CharacterId>,
    last_tick: u32,
}

/// Serve one WebSocket until it closes, leaves, times out or the server stops.
#[instrument(skip(stream, commands, snapshots))]
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    commands: mpsc::Sender<Command>,
    mut snapshots: broadcast::Receiver<Arc<Snapshot>>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);
    let (direct_tx, mut direct_rx) = mpsc::channel::<ServerMessage>(16);

    let mut state = ConnectionState {
        conn: ConnectionId::new(),
        format: WireFormat::default(),
        character: None,
        last_tick: 0,
    };

    if commands
        .send(Command::Connect { conn: state.conn, outbox: direct_tx })
        .await
        .is_err()
    {
        warn!("Simulation not running, dropping {}", addr);
        return;
    }
    info!(conn = %state.conn, "client connected from {}", addr);

    // Socket writer; exits once every frame queued before the drop is sent
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                return;
            }
        }
        let _ = ws_sender.close().await;
    });

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                let frame = match msg {
                    Some(Ok(Message::Text(text))) => WireFrame::Text(text),
                    Some(Ok(Message::Binary(data))) => WireFrame::Binary(data),
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client {} disconnected", addr);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", addr, e);
                        break;
                    }
                    Some(Ok(_)) => continue,
                };
                state.format = frame.format();

                let client_msg = match ClientMessage::decode(&frame) {
                    Ok(m) => m,
                    Err(e) => {
                        debug!("Invalid message from {}: {}", addr, e);
                        send(&out_tx, &ServerMessage::Error(e.to_info()), state.format).await;
                        continue;
                    }
                };

                match handle_client_message(&mut state, client_msg, &commands, &out_tx).await {
                    Flow::Continue => {}
                    Flow::Close => break,
                }
            }
            snapshot = snapshots.recv() => {
                match snapshot {
                    Ok(snapshot) => {
                        if state.character.is_some() {
                            state.last_tick = snapshot.tick;
                            send(&out_tx, &ServerMessage::Snapshot(snapshot), state.format).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Client {} lagging behind snapshots", addr);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            direct = direct_rx.recv() => {
                match direct {
                    Some(msg) => {
                        send(&out_tx, &msg, state.format).await;
                    }
                    // Simulation dropped us: timeout or shutdown
                    None => break,
                }
            }
        }
    }

    let _ = commands.send(Command::Disconnect { conn: state.conn }).await;
    // Forward anything the simulation queued before letting go
    while let Ok(msg) = direct_rx.try_recv() {
        send(&out_tx, &msg, state.format).await;
    }
    drop(out_tx);
    let _ = writer.await;
    info!(conn = %state.conn, "Client {} cleaned up", addr);
}

enum Flow {
    Continue,
    Close,
}

async fn handle_client_message(
    state: &mut ConnectionState,
    msg: ClientMessage,
    commands: &mpsc::Sender<Command>,
    out_tx: &mpsc::Sender<Message>,
) -> Flow {
    match msg {
        ClientMessage::Join { name } => {
            let (reply, response) = oneshot::channel();
            let command = Command::Join {
                conn: state.conn,
                name,
                format: state.format,
                reply,
            };
            if commands.send(command).await.is_err() {
                return Flow::Close;
            }
            let reply = match response.await {
                Ok(Ok((character_id, snapshot))) => {
                    state.character = Some(character_id);
                    state.last_tick = snapshot.tick;
                    ServerMessage::JoinAck { character_id, snapshot }
                }
                Ok(Err(info)) => ServerMessage::Error(info),
                Err(_) => return Flow::Close,
            };
            send(out_tx, &reply, state.format).await;
        }
        ClientMessage::Input(frame) => {
            match commands.try_send(Command::Input { conn: state.conn, frame }) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!(conn = %state.conn, sequence = frame.sequence, "command queue full, input dropped");
                }
                Err(TrySendError::Closed(_)) => return Flow::Close,
            }
        }
        ClientMessage::Leave => return Flow::Close,
        ClientMessage::Ping { timestamp } => {
            let pong = ServerMessage::Pong {
                timestamp,
                server_tick: state.last_tick,
            };
            send(out_tx, &pong, state.format).await;
        }
    }
    Flow::Continue
}

async fn send(out_tx: &mpsc::Sender<Message>, msg: &ServerMessage, format: WireFormat) {
    match msg.encode(format) {
        Ok(frame) => {
            let _ = out_tx.send(frame.into()).await;
        }
        Err(e) => error!("Failed to serialize message: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchConfig;
    use tokio::time::timeout;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        }
    }

    async fn start_server(config: ServerConfig) -> (Arc<GameServer>, SocketAddr, tokio::task::JoinHandle<Result<(), ServerError>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let map = Arc::new(GameMap::demo_arena().unwrap());
        let server = Arc::new(GameServer::new(config, map));
        let running = Arc::clone(&server);
        let handle = tokio::spawn(async move { running.serve(listener).await });
        (server, addr, handle)
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        ws
    }

    async fn send_msg(ws: &mut Client, msg: ClientMessage, format: WireFormat) {
        ws.send(msg.encode(format).unwrap().into()).await.unwrap();
    }

    async fn next_msg(ws: &mut Client) -> Option<ServerMessage> {
        loop {
            let msg = timeout(Duration::from_secs(5), ws.next()).await.ok()??.ok()?;
            match msg {
                Message::Text(text) => return Some(ServerMessage::from_json(&text).unwrap()),
                Message::Binary(data) => return Some(ServerMessage::from_bytes(&data).unwrap()),
                Message::Close(_) => return None,
                _ => continue,
            }
        }
    }

    async fn join(ws: &mut Client, name: &str, format: WireFormat) -> (CharacterId, Arc<Snapshot>) {
        send_msg(ws, ClientMessage::Join { name: name.into() }, format).await;
        match next_msg(ws).await {
            Some(ServerMessage::JoinAck { character_id, snapshot }) => (character_id, snapshot),
            other => panic!("expected join ack, got {other:?}"),
        }
    }

    #[test]
    fn test_simulation_leave_applies_on_next_tick() {
        let map = Arc::new(GameMap::demo_arena().unwrap());
        let authority = Authority::new(map, MatchConfig::default(), 4);
        let (snapshot_tx, mut snapshot_rx) = broadcast::channel(4);
        let mut sim = Simulation::new(authority, SessionTable::new(100), snapshot_tx, 1);

        let conn = ConnectionId::new();
        let (outbox, _outbox_rx) = mpsc::channel(4);
        sim.handle(Command::Connect { conn, outbox });
        let (reply, mut response) = oneshot::channel();
        sim.handle(Command::Join { conn, name: "solo".into(), format: WireFormat::Json, reply });
        let (character, snapshot) = response.try_recv().unwrap().unwrap();
        assert!(snapshot.character(character).is_some());

        sim.handle(Command::Input { conn, frame: InputFrame::new(1).with_direction(1) });
        sim.step();
        let snapshot = snapshot_rx.try_recv().unwrap();
        assert_eq!(snapshot.ack_for(character), Some(1));

        sim.handle(Command::Disconnect { conn });
        assert!(sim.authority.world().character(character).is_some());
        sim.step();
        assert!(sim.authority.world().character(character).is_none());
        assert!(sim.sessions.is_empty());
    }

    #[test]
    fn test_simulation_second_join_rejected() {
        let map = Arc::new(GameMap::demo_arena().unwrap());
        let authority = Authority::new(map, MatchConfig::default(), 4);
        let (snapshot_tx, _) = broadcast::channel(4);
        let mut sim = Simulation::new(authority, SessionTable::new(100), snapshot_tx, 1);

        let conn = ConnectionId::new();
        let (outbox, _outbox_rx) = mpsc::channel(4);
        sim.handle(Command::Connect { conn, outbox });
        for expect_ok in [true, false] {
            let (reply, mut response) = oneshot::channel();
            sim.handle(Command::Join { conn, name: "twice".into(), format: WireFormat::Json, reply });
            let result = response.try_recv().unwrap();
            assert_eq!(result.is_ok(), expect_ok);
            if let Err(info) = result {
                assert_eq!(info.code, ErrorCode::AlreadyJoined);
            }
        }
        assert_eq!(sim.authority.world().character_count(), 1);
    }

    #[tokio::test]
    async fn test_join_input_and_snapshots() {
        let (server, addr, handle) = start_server(test_config()).await;
        let mut ws = connect(addr).await;

        let (id, snapshot) = join(&mut ws, "alice", WireFormat::Json).await;
        assert!(snapshot.character(id).is_some());

        for seq in 1..=5 {
            let frame = InputFrame::new(seq).with_direction(1);
            send_msg(&mut ws, ClientMessage::Input(frame), WireFormat::Json).await;
        }

        let mut acked = false;
        while let Some(msg) = next_msg(&mut ws).await {
            if let ServerMessage::Snapshot(snapshot) = msg {
                if snapshot.ack_for(id) == Some(5) {
                    acked = true;
                    break;
                }
            }
        }
        assert!(acked, "server never acknowledged sequence 5");

        server.shutdown();
        let mut saw_shutdown = false;
        while let Some(msg) = next_msg(&mut ws).await {
            if matches!(msg, ServerMessage::Shutdown { .. }) {
                saw_shutdown = true;
                break;
            }
        }
        assert!(saw_shutdown);
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_binary_client_gets_binary_replies() {
        let (server, addr, _handle) = start_server(test_config()).await;
        let mut ws = connect(addr).await;
        send_msg(&mut ws, ClientMessage::Join { name: "bin".into() }, WireFormat::Binary).await;

        let raw = timeout(Duration::from_secs(5), ws.next()).await.unwrap().unwrap().unwrap();
        let Message::Binary(data) = raw else { panic!("expected binary frame, got {raw:?}") };
        assert!(matches!(ServerMessage::from_bytes(&data).unwrap(), ServerMessage::JoinAck { .. }));
        server.shutdown();
    }

    #[tokio::test]
    async fn test_server_full() {
        let config = ServerConfig {
            max_players: 1,
            ..test_config()
        };
        let (server, addr, _handle) = start_server(config).await;
        let mut first = connect(addr).await;
        join(&mut first, "one", WireFormat::Json).await;

        let mut second = connect(addr).await;
        send_msg(&mut second, ClientMessage::Join { name: "two".into() }, WireFormat::Json).await;
        match next_msg(&mut second).await {
            Some(ServerMessage::Error(info)) => assert_eq!(info.code, ErrorCode::ServerFull),
            other => panic!("expected error, got {other:?}"),
        }
        server.shutdown();
    }

    #[tokio::test]
    async fn test_bad_frames_do_not_disconnect() {
        let (server, addr, _handle) = start_server(test_config()).await;
        let mut ws = connect(addr).await;

        ws.send(Message::Text("{\"version\":99,\"message\":\"leave\"}".into())).await.unwrap();
        match next_msg(&mut ws).await {
            Some(ServerMessage::Error(info)) => assert_eq!(info.code, ErrorCode::VersionMismatch),
            other => panic!("expected version error, got {other:?}"),
        }

        ws.send(Message::Text("garbage".into())).await.unwrap();
        match next_msg(&mut ws).await {
            Some(ServerMessage::Error(info)) => assert_eq!(info.code, ErrorCode::InvalidMessage),
            other => panic!("expected decode error, got {other:?}"),
        }

        join(&mut ws, "survivor", WireFormat::Json).await;
        send_msg(&mut ws, ClientMessage::Ping { timestamp: 42 }, WireFormat::Json).await;
        let mut ponged = false;
        while let Some(msg) = next_msg(&mut ws).await {
            if let ServerMessage::Pong { timestamp, .. } = msg {
                assert_eq!(timestamp, 42);
                ponged = true;
                break;
            }
        }
        assert!(ponged);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_idle_client_times_out() {
        let config = ServerConfig {
            input_timeout_ticks: 5,
            ..test_config()
        };
        let (server, addr, _handle) = start_server(config).await;
        let mut ws = connect(addr).await;
        join(&mut ws, "idle", WireFormat::Json).await;

        let mut timed_out = false;
        while let Some(msg) = next_msg(&mut ws).await {
            if let ServerMessage::Error(info) = msg {
                assert_eq!(info.code, ErrorCode::TimedOut);
                timed_out = true;
                break;
            }
        }
        assert!(timed_out);
        // Socket closes after the notice
        while let Some(msg) = next_msg(&mut ws).await {
            assert!(matches!(msg, ServerMessage::Snapshot(_)));
        }
        server.shutdown();
    }
}
