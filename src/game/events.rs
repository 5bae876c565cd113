//! Match Events
//!
//! Effects emitted by the store after each successful mutation. The
//! transport layer decides who hears about them.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::game::state::{MatchId, MatchMode, MatchSnapshot, PlayerId};

/// Something that happened to a match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MatchEvent {
    /// Match created.
    Created {
        match_id: MatchId,
        creator: PlayerId,
        mode: MatchMode,
    },

    /// Second player took a seat.
    PlayerJoined {
        match_id: MatchId,
        player: PlayerId,
        mode: MatchMode,
        snapshot: MatchSnapshot,
    },

    /// A turn timer was armed.
    TimerStarted {
        match_id: MatchId,
        deadline: DateTime<Utc>,
    },

    /// A legal move was applied.
    MoveApplied {
        player: PlayerId,
        cell: usize,
        snapshot: MatchSnapshot,
    },

    /// The player on turn ran out of time and forfeited.
    TurnTimedOut {
        timed_out: PlayerId,
        snapshot: MatchSnapshot,
    },

    /// Match reached a terminal outcome.
    Concluded {
        winner: Option<PlayerId>,
        loser: Option<PlayerId>,
        snapshot: MatchSnapshot,
    },

    /// Board cleared for a rematch.
    Reset {
        snapshot: MatchSnapshot,
    },

    /// Match dropped from the store.
    Removed {
        match_id: MatchId,
    },
}

impl MatchEvent {
    /// Match this event belongs to.
    pub fn match_id(&self) -> MatchId {
        match self {
            MatchEvent::Created { match_id, .. }
            | MatchEvent::TimerStarted { match_id, .. }
            | MatchEvent::Removed { match_id } => *match_id,
            MatchEvent::PlayerJoined { snapshot, .. }
            | MatchEvent::MoveApplied { snapshot, .. }
            | MatchEvent::TurnTimedOut { snapshot, .. }
            | MatchEvent::Concluded { snapshot, .. }
            | MatchEvent::Reset { snapshot } => snapshot.id,
        }
    }

    /// Snapshot carried by the event, if any.
    pub fn snapshot(&self) -> Option<&MatchSnapshot> {
        match self {
            MatchEvent::PlayerJoined { snapshot, .. }
            | MatchEvent::MoveApplied { snapshot, .. }
            | MatchEvent::TurnTimedOut { snapshot, .. }
            | MatchEvent::Concluded { snapshot, .. }
            | MatchEvent::Reset { snapshot } => Some(snapshot),
            _ => None,
        }
    }
}
