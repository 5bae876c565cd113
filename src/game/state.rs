//! Match State Definitions
//!
//! Identifiers, the owned `Match` entity, and the snapshot handed to
//! callers. Only the store mutates a `Match`; everyone else sees copies.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::game::board::{self, Board, Cell, Mark, Outcome, EMPTY_BOARD};
use crate::game::timer::TimerToken;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Player identifier (the display name chosen by the client).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Create from anything string-like.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Unique match identifier (UUID v4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub uuid::Uuid);

impl MatchId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse from a UUID string.
    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// MATCH MODE
// =============================================================================

/// Rule variant of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// No clock.
    #[default]
    Classic,
    /// Each turn must be played before the turn timer fires.
    Timed,
}

// =============================================================================
// MATCH
// =============================================================================

/// A single match. Owned exclusively by `MatchStore`.
#[derive(Clone, Debug)]
pub struct Match {
    /// Match identifier.
    pub id: MatchId,
    /// Board cells.
    pub cells: Board,
    /// Mark expected to move next.
    pub turn: Mark,
    /// Seated players; seat 0 plays X, seat 1 plays O.
    pub players: Vec<PlayerId>,
    /// Current outcome.
    pub outcome: Outcome,
    /// Rule variant.
    pub mode: MatchMode,
    /// When the current turn expires (timed, undecided matches only).
    pub turn_deadline: Option<DateTime<Utc>>,
    /// Token of the one pending turn timer.
    pub pending_timer: Option<TimerToken>,
    /// Last successful mutation.
    pub last_activity: DateTime<Utc>,
}

impl Match {
    /// Maximum seats.
    pub const MAX_PLAYERS: usize = 2;

    /// Create a fresh match with the creator in seat 0.
    pub fn new(id: MatchId, creator: PlayerId, mode: MatchMode, now: DateTime<Utc>) -> Self {
        Self {
            id,
            cells: EMPTY_BOARD,
            turn: Mark::X,
            players: vec![creator],
            outcome: Outcome::Undecided,
            mode,
            turn_deadline: None,
            pending_timer: None,
            last_activity: now,
        }
    }

    /// True once both seats are taken.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.players.len() >= Self::MAX_PLAYERS
    }

    /// Mark held by `player`, if seated.
    pub fn mark_of(&self, player: &PlayerId) -> Option<Mark> {
        self.players
            .iter()
            .position(|p| p == player)
            .and_then(Mark::from_seat)
    }

    /// Player holding `mark`, if that seat is taken.
    pub fn player_for(&self, mark: Mark) -> Option<&PlayerId> {
        self.players.get(mark.seat())
    }

    /// True when a turn timer should be running.
    #[inline]
    pub fn wants_timer(&self) -> bool {
        self.mode == MatchMode::Timed && !self.outcome.is_decided() && self.is_full()
    }

    /// Copy out the caller-visible state.
    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            id: self.id,
            cells: self.cells,
            turn: self.turn,
            players: self.players.clone(),
            outcome: self.outcome,
            mode: self.mode,
            turn_deadline: self.turn_deadline,
        }
    }
}

/// Caller-visible copy of a match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    /// Match identifier.
    pub id: MatchId,
    /// Board cells (`null`, `"X"` or `"O"`).
    pub cells: [Cell; crate::BOARD_CELLS],
    /// Mark expected to move next.
    pub turn: Mark,
    /// Seated players in seat order.
    pub players: Vec<PlayerId>,
    /// Current outcome.
    pub outcome: Outcome,
    /// Rule variant.
    pub mode: MatchMode,
    /// When the current turn expires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_deadline: Option<DateTime<Utc>>,
}

impl MatchSnapshot {
    /// Number of occupied cells.
    pub fn filled_cells(&self) -> usize {
        board::filled_cells(&self.cells)
    }
}
