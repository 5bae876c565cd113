//! Player Statistics
//!
//! Cumulative win/loss/streak counters per player, plus the derived
//! totals and win rate used by the leaderboard.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::game::state::PlayerId;

/// Raw counters for one player.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Decisive wins.
    pub wins: u32,
    /// Decisive losses (including timeouts).
    pub losses: u32,
    /// Current consecutive wins.
    pub streak: u32,
    /// Best streak ever reached.
    pub max_streak: u32,
}

impl PlayerRecord {
    fn record_win(&mut self) {
        self.wins += 1;
        self.streak += 1;
        self.max_streak = self.max_streak.max(self.streak);
    }

    fn record_loss(&mut self) {
        self.losses += 1;
        self.streak = 0;
    }

    /// Wins plus losses.
    #[inline]
    pub fn total(&self) -> u32 {
        self.wins + self.losses
    }

    /// Win percentage in `[0, 100]`; zero when no games were recorded.
    pub fn win_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            f64::from(self.wins) / f64::from(total) * 100.0
        }
    }
}

/// Snapshot of a player's record with derived fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    /// Player identifier.
    pub player: PlayerId,
    /// Decisive wins.
    pub wins: u32,
    /// Decisive losses.
    pub losses: u32,
    /// Current consecutive wins.
    pub streak: u32,
    /// Best streak ever reached.
    pub max_streak: u32,
    /// Wins plus losses.
    pub total: u32,
    /// Win percentage.
    pub win_rate: f64,
}

impl PlayerStats {
    fn from_record(player: &PlayerId, record: &PlayerRecord) -> Self {
        Self {
            player: player.clone(),
            wins: record.wins,
            losses: record.losses,
            streak: record.streak,
            max_streak: record.max_streak,
            total: record.total(),
            win_rate: record.win_rate(),
        }
    }

    /// Leaderboard order: win rate, then wins, both descending, then
    /// player id ascending.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .win_rate
            .total_cmp(&self.win_rate)
            .then(other.wins.cmp(&self.wins))
            .then(self.player.cmp(&other.player))
    }
}

/// Owns every `PlayerRecord`.
#[derive(Debug, Default)]
pub struct StatsTracker {
    records: BTreeMap<PlayerId, PlayerRecord>,
}

impl StatsTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a zero record for `player` if none exists.
    pub fn ensure_player(&mut self, player: &PlayerId) -> &mut PlayerRecord {
        self.records.entry(player.clone()).or_default()
    }

    /// Record a decisive result. Draws never reach this.
    pub fn record_outcome(&mut self, winner: &PlayerId, loser: &PlayerId) {
        self.ensure_player(winner).record_win();
        self.ensure_player(loser).record_loss();
        debug!("Recorded win for {} over {}", winner, loser);
    }

    /// Snapshot one player, creating a zero record on first reference.
    pub fn get_player(&mut self, player: &PlayerId) -> PlayerStats {
        let record = *self.ensure_player(player);
        PlayerStats::from_record(player, &record)
    }

    /// Raw record without creating one.
    pub fn record(&self, player: &PlayerId) -> Option<&PlayerRecord> {
        self.records.get(player)
    }

    /// Top `limit` players by win rate.
    pub fn leaderboard(&self, limit: usize) -> Vec<PlayerStats> {
        let mut entries: Vec<PlayerStats> = self.records.iter()
            .map(|(id, record)| PlayerStats::from_record(id, record))
            .collect();

        entries.sort_by(PlayerStats::rank_cmp);
        entries.truncate(limit);
        entries
    }

    /// Number of known players.
    pub fn player_count(&self) -> usize {
        self.records.len()
    }
}
