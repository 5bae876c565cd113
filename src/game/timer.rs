//! Turn Timer Capability
//!
//! The store needs one thing from its environment: fire a callback after a
//! delay, and forget it on request. Every arm carries a `TimerToken`; the
//! store only honours a fire whose token is still the match's pending one,
//! so a cancelled or superseded timer can never commit a timeout.

use std::time::Duration;

use serde::{Serialize, Deserialize};

use crate::game::state::MatchId;

/// Identity of one armed timer. Strictly increasing per store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimerToken(pub u64);

/// A timer that has fired and must be fed back to
/// `MatchStore::handle_turn_timeout`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerFired {
    /// Match the timer belongs to.
    pub match_id: MatchId,
    /// Token the timer was armed with.
    pub token: TimerToken,
}

/// Scheduling capability used by the match store.
pub trait TurnTimer {
    /// Schedule a fire for `match_id` after `after`, replacing any timer
    /// already armed for that match.
    fn arm(&mut self, match_id: MatchId, token: TimerToken, after: Duration);

    /// Cancel the timer for `match_id`, if any.
    fn disarm(&mut self, match_id: &MatchId);
}
