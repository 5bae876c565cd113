//! WebSocket Game Server
//!
//! Async WebSocket server for multiplayer connections.
//! Routes requests into the match store, fans match events out to the
//! connections watching each match, and resolves turn timeouts.
//!
//! Every mutation of game state happens under one write lock, so a move
//! and a timeout for the same match can never interleave.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex, MutexGuard, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::events::MatchEvent;
use crate::game::state::{MatchId, MatchMode, PlayerId};
use crate::game::stats::StatsTracker;
use crate::game::store::{MatchStore, StoreConfig};
use crate::game::timer::TimerFired;
use crate::network::protocol::{
    ClientMessage, ErrorCode, HealthStatus, ServerError, ServerMessage,
};
use crate::network::timer::TokioTurnTimer;
use crate::{LEADERBOARD_LIMIT, TURN_TIME_LIMIT_SECS, VERSION};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Time each player has per turn in timed matches.
    pub turn_time_limit: Duration,
    /// Matches with no activity for this long are dropped.
    pub match_idle_timeout: Duration,
    /// Entries returned by a leaderboard request.
    pub leaderboard_limit: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 4000)),
            max_connections: 1000,
            turn_time_limit: Duration::from_secs(TURN_TIME_LIMIT_SECS),
            match_idle_timeout: Duration::from_secs(30 * 60),
            leaderboard_limit: LEADERBOARD_LIMIT,
            version: VERSION.to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_parse("SERVER_BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_connections: env_parse("SERVER_MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
            turn_time_limit: env_parse("TURN_TIME_LIMIT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.turn_time_limit),
            match_idle_timeout: env_parse("MATCH_IDLE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.match_idle_timeout),
            leaderboard_limit: defaults.leaderboard_limit,
            version: defaults.version,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// `run` was called twice.
    #[error("Server already running")]
    AlreadyRunning,
}

/// Matches and statistics, mutated together under one lock.
pub struct GameState {
    /// All matches.
    pub matches: MatchStore<TokioTurnTimer>,
    /// All player records.
    pub stats: StatsTracker,
}

/// Connected client state.
struct ConnectedClient {
    /// Message sender (for direct messaging to client).
    sender: mpsc::Sender<ServerMessage>,
}

/// Handles shared by the accept loop, connection tasks and background loops.
#[derive(Clone)]
struct ServerContext {
    config: Arc<ServerConfig>,
    state: Arc<RwLock<GameState>>,
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    /// Connections watching each match.
    rooms: Arc<RwLock<BTreeMap<MatchId, BTreeSet<SocketAddr>>>>,
    /// Serializes event delivery in commit order.
    delivery: Arc<Mutex<()>>,
}

/// The game server.
pub struct GameServer {
    ctx: ServerContext,
    /// Fired turn timers, consumed by the timeout loop once running.
    timer_rx: Mutex<Option<mpsc::Receiver<TimerFired>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (timer, timer_rx) = TokioTurnTimer::new(256);

        let store = MatchStore::new(timer, StoreConfig {
            turn_time_limit: config.turn_time_limit,
        });

        Self {
            ctx: ServerContext {
                config: Arc::new(config),
                state: Arc::new(RwLock::new(GameState {
                    matches: store,
                    stats: StatsTracker::new(),
                })),
                clients: Arc::new(RwLock::new(BTreeMap::new())),
                rooms: Arc::new(RwLock::new(BTreeMap::new())),
                delivery: Arc::new(Mutex::new(())),
            },
            timer_rx: Mutex::new(Some(timer_rx)),
            shutdown_tx,
        }
    }

    /// Run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let timer_rx = self.timer_rx.lock().await.take()
            .ok_or(GameServerError::AlreadyRunning)?;

        let listener = TcpListener::bind(&self.ctx.config.bind_addr).await?;
        info!("Game server v{} listening on {}", self.ctx.config.version, self.ctx.config.bind_addr);

        // Spawn turn timeout task
        let timeout_ctx = self.ctx.clone();
        let timeout_handle = tokio::spawn(async move {
            Self::run_timeout_loop(timeout_ctx, timer_rx).await;
        });

        // Spawn cleanup task
        let cleanup_ctx = self.ctx.clone();
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_ctx).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.ctx.clients.read().await.len();
                            if clients_count >= self.ctx.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
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

        timeout_handle.abort();
        cleanup_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let ctx = self.ctx.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            Self::register_client(&ctx, addr, msg_tx.clone()).await;

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error(ServerError {
                                            code: ErrorCode::InvalidInput,
                                            message: format!("Invalid message format: {}", e),
                                        })).await;
                                        continue;
                                    }
                                };

                                Self::handle_client_message(&ctx, addr, client_msg, &msg_tx).await;
                            }
                            Some(Ok(Message::Binary(_))) => {
                                debug!("Ignoring binary frame from {}", addr);
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            sender_task.abort();
            Self::unregister_client(&ctx, &addr).await;

            info!("Client {} cleaned up", addr);
        });
    }

    /// Track a connection so room broadcasts can reach it.
    async fn register_client(ctx: &ServerContext, addr: SocketAddr, sender: mpsc::Sender<ServerMessage>) {
        let mut clients = ctx.clients.write().await;
        clients.insert(addr, ConnectedClient { sender });
    }

    /// Forget a connection and drop it from every room.
    async fn unregister_client(ctx: &ServerContext, addr: &SocketAddr) {
        ctx.clients.write().await.remove(addr);

        let mut rooms = ctx.rooms.write().await;
        for members in rooms.values_mut() {
            members.remove(addr);
        }
        rooms.retain(|_, members| !members.is_empty());
    }

    /// Subscribe a connection to a match's updates.
    async fn join_room(ctx: &ServerContext, match_id: MatchId, addr: SocketAddr) {
        ctx.rooms.write().await.entry(match_id).or_default().insert(addr);
    }

    /// Handle a client message.
    async fn handle_client_message(
        ctx: &ServerContext,
        addr: SocketAddr,
        msg: ClientMessage,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::CreateGame { player, mode } => {
                Self::handle_create(ctx, addr, player, mode, sender).await;
            }
            ClientMessage::CreateTimedGame { player } => {
                Self::handle_create(ctx, addr, player, MatchMode::Timed, sender).await;
            }
            ClientMessage::JoinGame { game_id, player } => {
                Self::handle_join(ctx, addr, game_id, player, sender).await;
            }
            ClientMessage::MakeMove { game_id, player, index } => {
                let (result, events, _order) = Self::commit(ctx, |state| {
                    state.matches.apply_move(&mut state.stats, &game_id, &player, index)
                }).await;

                if let Err(e) = result {
                    debug!("Move by {} in {} rejected: {}", player, game_id, e);
                    let _ = sender.send(ServerMessage::match_error(e)).await;
                }
                Self::dispatch_events(ctx, events).await;
            }
            ClientMessage::ResetGame { game_id } => {
                let (result, events, _order) = Self::commit(ctx, |state| {
                    state.matches.reset(&game_id)
                }).await;

                if let Err(e) = result {
                    let _ = sender.send(ServerMessage::match_error(e)).await;
                }
                Self::dispatch_events(ctx, events).await;
            }
            ClientMessage::GetGame { game_id } => {
                let result = ctx.state.read().await.matches.get(&game_id);
                let reply = match result {
                    Ok(snapshot) => ServerMessage::GameUpdate(snapshot),
                    Err(e) => ServerMessage::match_error(e),
                };
                let _ = sender.send(reply).await;
            }
            ClientMessage::GetLeaderboard => {
                let entries = ctx.state.read().await.stats.leaderboard(ctx.config.leaderboard_limit);
                let _ = sender.send(ServerMessage::LeaderboardData { entries }).await;
            }
            ClientMessage::GetPlayerStats { player } => {
                let stats = ctx.state.write().await.stats.get_player(&player);
                let _ = sender.send(ServerMessage::PlayerStats(stats)).await;
            }
            ClientMessage::Health => {
                let _ = sender.send(ServerMessage::Health(HealthStatus::now())).await;
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender.send(ServerMessage::Pong {
                    timestamp,
                    server_time: Utc::now().timestamp_millis().max(0) as u64,
                }).await;
            }
        }
    }

    /// Handle match creation.
    async fn handle_create(
        ctx: &ServerContext,
        addr: SocketAddr,
        player: PlayerId,
        mode: MatchMode,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let (game_id, events, _order) = Self::commit(ctx, |state| {
            state.matches.create(&mut state.stats, player, mode)
        }).await;

        Self::join_room(ctx, game_id, addr).await;
        let _ = sender.send(ServerMessage::GameCreated { game_id, mode }).await;
        Self::dispatch_events(ctx, events).await;
    }

    /// Handle a join; starts the turn clock once a timed match is full.
    async fn handle_join(
        ctx: &ServerContext,
        addr: SocketAddr,
        game_id: MatchId,
        player: PlayerId,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let (result, events, _order) = Self::commit(ctx, |state| {
            let GameState { matches, stats } = state;
            let result = matches.join(stats, &game_id, player);

            if let Ok(snapshot) = &result {
                if snapshot.mode == MatchMode::Timed && snapshot.players.len() == 2 {
                    info!("Starting initial timer for match {}", game_id);
                    if let Err(e) = matches.start_turn_timer(&game_id) {
                        error!("Failed to start turn timer for {}: {}", game_id, e);
                    }
                }
            }
            result
        }).await;

        match result {
            Ok(_) => Self::join_room(ctx, game_id, addr).await,
            Err(e) => {
                let _ = sender.send(ServerMessage::match_error(e)).await;
            }
        }
        Self::dispatch_events(ctx, events).await;
    }

    /// Run `f` against the game state and drain the events it emitted.
    ///
    /// The returned guard is taken before the state lock is released, so
    /// whoever commits first also delivers first. Hold it until
    /// `dispatch_events` has returned.
    async fn commit<R>(
        ctx: &ServerContext,
        f: impl FnOnce(&mut GameState) -> R,
    ) -> (R, Vec<MatchEvent>, MutexGuard<'_, ()>) {
        let mut state = ctx.state.write().await;
        let result = f(&mut *state);
        let events = state.matches.take_events();
        let order = ctx.delivery.lock().await;
        drop(state);
        (result, events, order)
    }

    /// Deliver store events to the rooms they concern.
    async fn dispatch_events(ctx: &ServerContext, events: Vec<MatchEvent>) {
        for event in events {
            if let MatchEvent::Removed { match_id } = &event {
                ctx.rooms.write().await.remove(match_id);
                continue;
            }

            let match_id = event.match_id();
            for message in event_messages(&event) {
                Self::broadcast_to_room(ctx, &match_id, message).await;
            }
        }
    }

    /// Send a message to every connection watching a match.
    async fn broadcast_to_room(ctx: &ServerContext, match_id: &MatchId, message: ServerMessage) {
        let senders: Vec<mpsc::Sender<ServerMessage>> = {
            let rooms = ctx.rooms.read().await;
            let Some(members) = rooms.get(match_id) else {
                return;
            };
            let clients = ctx.clients.read().await;
            members.iter()
                .filter_map(|addr| clients.get(addr))
                .map(|client| client.sender.clone())
                .collect()
        };

        for sender in senders {
            let _ = sender.send(message.clone()).await;
        }
    }

    /// Resolve fired turn timers.
    async fn run_timeout_loop(ctx: ServerContext, mut timer_rx: mpsc::Receiver<TimerFired>) {
        while let Some(fired) = timer_rx.recv().await {
            let (_, events, _order) = Self::commit(&ctx, |state| {
                state.matches.handle_turn_timeout(&mut state.stats, fired)
            }).await;
            Self::dispatch_events(&ctx, events).await;
        }
        debug!("Timeout loop finished");
    }

    /// Run cleanup loop.
    async fn run_cleanup_loop(ctx: ServerContext) {
        let mut interval = interval(Duration::from_secs(60));
        let max_idle = chrono::Duration::from_std(ctx.config.match_idle_timeout)
            .unwrap_or_else(|_| chrono::Duration::minutes(30));

        loop {
            interval.tick().await;

            let (_, events, _order) = Self::commit(&ctx, |state| {
                state.matches.evict_idle(Utc::now(), max_idle)
            }).await;
            Self::dispatch_events(&ctx, events).await;
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.ctx.clients.read().await.len()
    }

    /// Get live match count.
    pub async fn match_count(&self) -> usize {
        self.ctx.state.read().await.matches.len()
    }

    /// Get known player count.
    pub async fn player_count(&self) -> usize {
        self.ctx.state.read().await.stats.player_count()
    }
}

/// Wire messages a room should receive for a store event.
fn event_messages(event: &MatchEvent) -> Vec<ServerMessage> {
    match event {
        MatchEvent::PlayerJoined { match_id, player, mode, .. } => {
            vec![ServerMessage::PlayerJoined {
                player: player.clone(),
                game_id: *match_id,
                mode: *mode,
            }]
        }
        MatchEvent::TimerStarted { match_id, deadline } => {
            vec![ServerMessage::TurnStarted {
                game_id: *match_id,
                deadline: *deadline,
            }]
        }
        MatchEvent::MoveApplied { snapshot, .. } | MatchEvent::Reset { snapshot } => {
            vec![ServerMessage::GameUpdate(snapshot.clone())]
        }
        MatchEvent::TurnTimedOut { timed_out, snapshot } => {
            vec![
                ServerMessage::TurnTimedOut {
                    game_id: snapshot.id,
                    player: timed_out.clone(),
                },
                ServerMessage::GameUpdate(snapshot.clone()),
            ]
        }
        // Creator gets a direct reply; conclusions ride on the final update
        MatchEvent::Created { .. } | MatchEvent::Concluded { .. } | MatchEvent::Removed { .. } => {
            Vec::new()
        }
    }
}
