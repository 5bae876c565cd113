//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are JSON objects tagged by `type`.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::game::state::{MatchId, MatchMode, MatchSnapshot, PlayerId};
use crate::game::stats::PlayerStats;
use crate::game::store::MatchError;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open a new match; classic unless `mode` says otherwise.
    CreateGame {
        player: PlayerId,
        #[serde(default)]
        mode: MatchMode,
    },

    /// Open a new timed match.
    CreateTimedGame { player: PlayerId },

    /// Take the second seat of a match.
    JoinGame { game_id: MatchId, player: PlayerId },

    /// Place a mark on cell `index` (0-8, row-major).
    MakeMove {
        game_id: MatchId,
        player: PlayerId,
        index: usize,
    },

    /// Clear the board for a rematch.
    ResetGame { game_id: MatchId },

    /// Fetch the current state of a match.
    GetGame { game_id: MatchId },

    /// Fetch the top players.
    GetLeaderboard,

    /// Fetch one player's statistics.
    GetPlayerStats { player: PlayerId },

    /// Liveness probe.
    Health,

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to a create request.
    GameCreated { game_id: MatchId, mode: MatchMode },

    /// A player joined (sent to the whole room).
    PlayerJoined {
        player: PlayerId,
        game_id: MatchId,
        mode: MatchMode,
    },

    /// Current match state (after moves, resets, timeouts, or on request).
    GameUpdate(MatchSnapshot),

    /// A turn clock started.
    TurnStarted {
        game_id: MatchId,
        deadline: DateTime<Utc>,
    },

    /// The player on turn ran out of time.
    TurnTimedOut { game_id: MatchId, player: PlayerId },

    /// Leaderboard reply.
    LeaderboardData { entries: Vec<PlayerStats> },

    /// Player statistics reply.
    PlayerStats(PlayerStats),

    /// Liveness reply.
    Health(HealthStatus),

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Liveness probe reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Always `"healthy"` while the server answers.
    pub status: String,
    /// Server wall-clock time.
    pub timestamp: DateTime<Utc>,
}

impl HealthStatus {
    /// Status as of now.
    pub fn now() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl From<MatchError> for ServerError {
    fn from(err: MatchError) -> Self {
        Self {
            code: err.into(),
            message: err.to_string(),
        }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Invalid message.
    InvalidInput,
    /// Match not found.
    MatchNotFound,
    /// Match has no free seat.
    MatchFull,
    /// Match already decided.
    GameOver,
    /// Player not seated in the match.
    NotInMatch,
    /// Not the player's turn.
    WrongTurn,
    /// Cell index out of range.
    InvalidCell,
    /// Cell already marked.
    CellOccupied,
    /// Server overloaded.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl From<MatchError> for ErrorCode {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::NotFound => ErrorCode::MatchNotFound,
            MatchError::Full => ErrorCode::MatchFull,
            MatchError::GameOver => ErrorCode::GameOver,
            MatchError::PlayerNotInMatch => ErrorCode::NotInMatch,
            MatchError::WrongTurn => ErrorCode::WrongTurn,
            MatchError::InvalidCell => ErrorCode::InvalidCell,
            MatchError::CellOccupied => ErrorCode::CellOccupied,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Error reply for a failed match operation.
    pub fn match_error(err: MatchError) -> Self {
        ServerMessage::Error(err.into())
    }
}
