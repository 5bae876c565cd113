//! # Tic-Tac-Toe Match Server
//!
//! Two-player tic-tac-toe over WebSocket, with optional per-turn time
//! limits and a win/loss leaderboard.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TIC-TAC-TOE SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Match rules (no I/O)                      │
//! │  ├── board.rs    - Marks, win lines, evaluation              │
//! │  ├── state.rs    - Match record and snapshots                │
//! │  ├── store.rs    - Match store and turn clock                │
//! │  ├── stats.rs    - Player records and leaderboard            │
//! │  ├── timer.rs    - Turn timer trait and tokens               │
//! │  └── events.rs   - Emitted match events                      │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── server.rs   - WebSocket server and rooms                │
//! │  ├── protocol.rs - Message types                             │
//! │  └── timer.rs    - Tokio-backed turn timer                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! Matches and statistics change only through `MatchStore`, and the
//! server holds one write lock around every store call. A timer fire
//! carries the token it was armed with; a fire whose token no longer
//! matches the match's pending token is ignored, so late or duplicate
//! fires can never forfeit a turn that already ended.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::board::{Mark, Outcome};
pub use game::state::{MatchId, MatchMode, MatchSnapshot, PlayerId};
pub use game::stats::{PlayerStats, StatsTracker};
pub use game::store::{MatchError, MatchStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default time per turn in timed matches (seconds)
pub const TURN_TIME_LIMIT_SECS: u64 = 30;

/// Default leaderboard length
pub const LEADERBOARD_LIMIT: usize = 10;

/// Cells on the board (3x3, row-major)
pub const BOARD_CELLS: usize = 9;
