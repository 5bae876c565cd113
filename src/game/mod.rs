//! Game Logic Module
//!
//! Match rules and bookkeeping. Nothing here does I/O; time enters
//! through explicit `now` arguments and the `TurnTimer` trait.
//!
//! ## Module Structure
//!
//! - `board`: Marks, win lines, terminal-state evaluation
//! - `state`: Match record, identifiers, snapshots
//! - `store`: Match store, the only path that mutates matches
//! - `stats`: Per-player win/loss records and leaderboard
//! - `timer`: Turn timer seam and fencing tokens
//! - `events`: Effects emitted after each mutation

pub mod board;
pub mod state;
pub mod store;
pub mod stats;
pub mod timer;
pub mod events;

// Re-export key types
pub use board::{evaluate, Board, Mark, Outcome};
pub use state::{Match, MatchId, MatchMode, MatchSnapshot, PlayerId};
pub use store::{MatchError, MatchStore, StoreConfig};
pub use stats::{PlayerRecord, PlayerStats, StatsTracker};
pub use timer::{TimerFired, TimerToken, TurnTimer};
pub use events::MatchEvent;
