//! Network Layer
//!
//! WebSocket server for real-time multiplayer communication.
//! Match rules live in `game/`; this layer only routes requests and events.

pub mod protocol;
pub mod server;
pub mod timer;

pub use protocol::{ClientMessage, ServerMessage, ServerError, ErrorCode, HealthStatus};
pub use server::{GameServer, ServerConfig, GameServerError};
pub use timer::TokioTurnTimer;
