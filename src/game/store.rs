//! Match Store
//!
//! Owns every match and applies the only mutation path: create, join,
//! move, timeout, reset, remove. Each operation either commits fully and
//! returns a snapshot, or fails with one `MatchError` and leaves state
//! untouched.
//!
//! Statistics are owned elsewhere; operations that can conclude a match
//! take the `StatsTracker` by reference.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::game::board::{evaluate, Mark, Outcome, EMPTY_BOARD};
use crate::game::events::MatchEvent;
use crate::game::state::{Match, MatchId, MatchMode, MatchSnapshot, PlayerId};
use crate::game::stats::StatsTracker;
use crate::game::timer::{TimerFired, TimerToken, TurnTimer};
use crate::{BOARD_CELLS, TURN_TIME_LIMIT_SECS};

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Time each player has per turn in timed matches.
    pub turn_time_limit: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            turn_time_limit: Duration::from_secs(TURN_TIME_LIMIT_SECS),
        }
    }
}

/// Match operation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// No match with that id.
    #[error("Game not found")]
    NotFound,

    /// Both seats are taken.
    #[error("Game already full")]
    Full,

    /// Match already has an outcome.
    #[error("Game is over")]
    GameOver,

    /// Player holds no seat in this match.
    #[error("Player not in this game")]
    PlayerNotInMatch,

    /// Not this player's mark to move.
    #[error("Not your turn")]
    WrongTurn,

    /// Cell index outside the board.
    #[error("Cell index out of range")]
    InvalidCell,

    /// Target cell already marked.
    #[error("Cell occupied")]
    CellOccupied,
}

/// Arms and disarms turn timers, keeping each match's pending token and
/// deadline in step with the scheduler.
struct TurnClock<T> {
    timer: T,
    limit: Duration,
    next_token: u64,
}

impl<T: TurnTimer> TurnClock<T> {
    fn arm(&mut self, m: &mut Match, now: DateTime<Utc>) -> DateTime<Utc> {
        self.disarm(m);

        self.next_token += 1;
        let token = TimerToken(self.next_token);
        let deadline = chrono::Duration::from_std(self.limit)
            .ok()
            .and_then(|limit| now.checked_add_signed(limit))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.timer.arm(m.id, token, self.limit);
        m.pending_timer = Some(token);
        m.turn_deadline = Some(deadline);
        deadline
    }

    fn disarm(&mut self, m: &mut Match) {
        if m.pending_timer.take().is_some() {
            self.timer.disarm(&m.id);
        }
        m.turn_deadline = None;
    }
}

/// In-memory store of all matches.
pub struct MatchStore<T: TurnTimer> {
    matches: BTreeMap<MatchId, Match>,
    clock: TurnClock<T>,
    events: Vec<MatchEvent>,
}

impl<T: TurnTimer> MatchStore<T> {
    /// Create an empty store driving `timer`.
    pub fn new(timer: T, config: StoreConfig) -> Self {
        Self {
            matches: BTreeMap::new(),
            clock: TurnClock {
                timer,
                limit: config.turn_time_limit,
                next_token: 0,
            },
            events: Vec::new(),
        }
    }

    /// Open a match with `creator` in seat 0. No timer runs until a
    /// second player joins and `start_turn_timer` is called.
    #[instrument(skip(self, stats))]
    pub fn create(&mut self, stats: &mut StatsTracker, creator: PlayerId, mode: MatchMode) -> MatchId {
        let mut id = MatchId::generate();
        while self.matches.contains_key(&id) {
            id = MatchId::generate();
        }

        stats.ensure_player(&creator);
        self.matches.insert(id, Match::new(id, creator.clone(), mode, Utc::now()));
        self.events.push(MatchEvent::Created { match_id: id, creator: creator.clone(), mode });

        info!("Match {} created by {} ({:?})", id, creator, mode);
        id
    }

    /// Seat `player` as O.
    #[instrument(skip(self, stats))]
    pub fn join(
        &mut self,
        stats: &mut StatsTracker,
        id: &MatchId,
        player: PlayerId,
    ) -> Result<MatchSnapshot, MatchError> {
        let m = self.matches.get_mut(id).ok_or(MatchError::NotFound)?;

        if m.is_full() {
            return Err(MatchError::Full);
        }

        stats.ensure_player(&player);
        m.players.push(player.clone());
        m.last_activity = Utc::now();

        let snapshot = m.snapshot();
        self.events.push(MatchEvent::PlayerJoined {
            match_id: *id,
            player: player.clone(),
            mode: m.mode,
            snapshot: snapshot.clone(),
        });

        info!("{} joined match {}", player, id);
        Ok(snapshot)
    }

    /// Arm the turn timer for a timed match that has both players.
    ///
    /// Returns the new deadline, or `None` when the match does not run a
    /// clock (classic, decided, or still waiting for an opponent).
    pub fn start_turn_timer(&mut self, id: &MatchId) -> Result<Option<DateTime<Utc>>, MatchError> {
        let m = self.matches.get_mut(id).ok_or(MatchError::NotFound)?;

        if !m.wants_timer() {
            return Ok(None);
        }

        let deadline = self.clock.arm(m, Utc::now());
        self.events.push(MatchEvent::TimerStarted { match_id: *id, deadline });

        debug!("Turn timer for match {} armed until {}", id, deadline);
        Ok(Some(deadline))
    }

    /// Place `player`'s mark on `cell`.
    #[instrument(skip(self, stats))]
    pub fn apply_move(
        &mut self,
        stats: &mut StatsTracker,
        id: &MatchId,
        player: &PlayerId,
        cell: usize,
    ) -> Result<MatchSnapshot, MatchError> {
        let m = self.matches.get_mut(id).ok_or(MatchError::NotFound)?;

        if m.outcome.is_decided() {
            return Err(MatchError::GameOver);
        }
        let mark = m.mark_of(player).ok_or(MatchError::PlayerNotInMatch)?;
        if mark != m.turn {
            return Err(MatchError::WrongTurn);
        }
        if cell >= BOARD_CELLS {
            return Err(MatchError::InvalidCell);
        }
        if m.cells[cell].is_some() {
            return Err(MatchError::CellOccupied);
        }

        // Validated; commit.
        let now = Utc::now();
        self.clock.disarm(m);
        m.cells[cell] = Some(mark);
        m.outcome = evaluate(&m.cells);
        m.last_activity = now;

        let mut deadline = None;
        if !m.outcome.is_decided() {
            m.turn = m.turn.opponent();
            if m.wants_timer() {
                deadline = Some(self.clock.arm(m, now));
            }
        }

        let snapshot = m.snapshot();
        self.events.push(MatchEvent::MoveApplied {
            player: player.clone(),
            cell,
            snapshot: snapshot.clone(),
        });
        debug!("{} played {:?} at {} in match {}", player, mark, cell, id);

        if let Some(deadline) = deadline {
            self.events.push(MatchEvent::TimerStarted { match_id: *id, deadline });
        }

        match m.outcome {
            Outcome::Undecided => {}
            Outcome::Winner(winner) => {
                let (winner_id, loser_id) = Self::settle(stats, m, winner);
                info!("Match {} won by {:?}", id, winner);
                self.events.push(MatchEvent::Concluded {
                    winner: winner_id,
                    loser: loser_id,
                    snapshot: snapshot.clone(),
                });
            }
            Outcome::Draw => {
                info!("Match {} drawn", id);
                self.events.push(MatchEvent::Concluded {
                    winner: None,
                    loser: None,
                    snapshot: snapshot.clone(),
                });
            }
        }

        Ok(snapshot)
    }

    /// Resolve a fired turn timer: the player on turn forfeits.
    ///
    /// Returns `None` without touching anything when the match is gone,
    /// already decided, or armed with a different token.
    #[instrument(skip(self, stats))]
    pub fn handle_turn_timeout(
        &mut self,
        stats: &mut StatsTracker,
        fired: TimerFired,
    ) -> Option<MatchSnapshot> {
        let Some(m) = self.matches.get_mut(&fired.match_id) else {
            debug!("Timer fired for removed match {}", fired.match_id);
            return None;
        };

        if m.outcome.is_decided() || m.pending_timer != Some(fired.token) {
            debug!("Stale timer {:?} for match {}", fired.token, fired.match_id);
            return None;
        }

        let loser_mark = m.turn;
        let winner_mark = loser_mark.opponent();

        self.clock.disarm(m);
        m.outcome = Outcome::Winner(winner_mark);
        m.last_activity = Utc::now();

        let (winner_id, loser_id) = Self::settle(stats, m, winner_mark);
        let snapshot = m.snapshot();

        info!("Timeout in match {} for player {:?}", fired.match_id, loser_mark);

        if let Some(timed_out) = loser_id.clone() {
            self.events.push(MatchEvent::TurnTimedOut {
                timed_out,
                snapshot: snapshot.clone(),
            });
        }
        self.events.push(MatchEvent::Concluded {
            winner: winner_id,
            loser: loser_id,
            snapshot: snapshot.clone(),
        });

        Some(snapshot)
    }

    /// Clear the board for a rematch, keeping players and mode.
    #[instrument(skip(self))]
    pub fn reset(&mut self, id: &MatchId) -> Result<MatchSnapshot, MatchError> {
        let m = self.matches.get_mut(id).ok_or(MatchError::NotFound)?;

        let now = Utc::now();
        self.clock.disarm(m);
        m.cells = EMPTY_BOARD;
        m.turn = Mark::X;
        m.outcome = Outcome::Undecided;
        m.last_activity = now;

        let deadline = if m.wants_timer() {
            Some(self.clock.arm(m, now))
        } else {
            None
        };

        let snapshot = m.snapshot();
        self.events.push(MatchEvent::Reset { snapshot: snapshot.clone() });
        if let Some(deadline) = deadline {
            self.events.push(MatchEvent::TimerStarted { match_id: *id, deadline });
        }

        info!("Match {} reset", id);
        Ok(snapshot)
    }

    /// Snapshot one match.
    pub fn get(&self, id: &MatchId) -> Result<MatchSnapshot, MatchError> {
        self.matches.get(id).map(Match::snapshot).ok_or(MatchError::NotFound)
    }

    /// Drop a match and cancel its timer. Returns false if absent.
    pub fn remove(&mut self, id: &MatchId) -> bool {
        match self.matches.remove(id) {
            Some(mut m) => {
                self.clock.disarm(&mut m);
                self.events.push(MatchEvent::Removed { match_id: *id });
                true
            }
            None => false,
        }
    }

    /// Remove every match with no activity for longer than `max_idle`.
    pub fn evict_idle(&mut self, now: DateTime<Utc>, max_idle: chrono::Duration) -> Vec<MatchId> {
        let idle: Vec<MatchId> = self.matches.values()
            .filter(|m| now.signed_duration_since(m.last_activity) > max_idle)
            .map(|m| m.id)
            .collect();

        for id in &idle {
            self.remove(id);
            info!("Evicted idle match {}", id);
        }

        idle
    }

    /// Drain events emitted since the last call.
    pub fn take_events(&mut self) -> Vec<MatchEvent> {
        std::mem::take(&mut self.events)
    }

    /// Number of live matches.
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// True when no matches exist.
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// The scheduler driving turn timers.
    pub fn timer(&self) -> &T {
        &self.clock.timer
    }

    /// Credit the winner and debit the loser of a decisive result.
    fn settle(
        stats: &mut StatsTracker,
        m: &Match,
        winner: Mark,
    ) -> (Option<PlayerId>, Option<PlayerId>) {
        let winner_id = m.player_for(winner).cloned();
        let loser_id = m.player_for(winner.opponent()).cloned();

        if let (Some(w), Some(l)) = (&winner_id, &loser_id) {
            stats.record_outcome(w, l);
        }

        (winner_id, loser_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::timer::testing::ManualTimer;
    use proptest::prelude::*;

    fn id(name: &str) -> PlayerId {
        PlayerId::new(name)
    }

    fn new_store() -> (MatchStore<ManualTimer>, StatsTracker) {
        (MatchStore::new(ManualTimer::default(), StoreConfig::default()), StatsTracker::new())
    }

    /// alice (X) vs bob (O), both seated.
    fn seated(
        store: &mut MatchStore<ManualTimer>,
        stats: &mut StatsTracker,
        mode: MatchMode,
    ) -> MatchId {
        let match_id = store.create(stats, id("alice"), mode);
        store.join(stats, &match_id, id("bob")).unwrap();
        match_id
    }

    fn play(
        store: &mut MatchStore<ManualTimer>,
        stats: &mut StatsTracker,
        match_id: &MatchId,
        moves: &[usize],
    ) -> MatchSnapshot {
        let mut last = None;
        for (i, &cell) in moves.iter().enumerate() {
            let player = if i % 2 == 0 { id("alice") } else { id("bob") };
            last = Some(store.apply_move(stats, match_id, &player, cell).unwrap());
        }
        last.unwrap()
    }

    #[test]
    fn test_create_initial_state() {
        let (mut store, mut stats) = new_store();
        let match_id = store.create(&mut stats, id("alice"), MatchMode::Classic);

        let snap = store.get(&match_id).unwrap();
        assert_eq!(snap.cells, EMPTY_BOARD);
        assert_eq!(snap.turn, Mark::X);
        assert_eq!(snap.players, vec![id("alice")]);
        assert_eq!(snap.outcome, Outcome::Undecided);
        assert!(snap.turn_deadline.is_none());
        assert!(stats.record(&id("alice")).is_some());
        assert_eq!(store.timer().arm_count, 0);
    }

    #[test]
    fn test_ids_unique() {
        let (mut store, mut stats) = new_store();
        let a = store.create(&mut stats, id("alice"), MatchMode::Classic);
        let b = store.create(&mut stats, id("alice"), MatchMode::Classic);
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_join_errors() {
        let (mut store, mut stats) = new_store();
        let missing = MatchId::generate();
        assert_eq!(store.join(&mut stats, &missing, id("bob")), Err(MatchError::NotFound));

        let match_id = store.create(&mut stats, id("alice"), MatchMode::Classic);
        let snap = store.join(&mut stats, &match_id, id("bob")).unwrap();
        assert_eq!(snap.players, vec![id("alice"), id("bob")]);
        assert!(stats.record(&id("bob")).is_some());

        assert_eq!(store.join(&mut stats, &match_id, id("carol")), Err(MatchError::Full));
        assert_eq!(store.get(&match_id).unwrap().players.len(), 2);
    }

    #[test]
    fn test_join_same_player_twice() {
        let (mut store, mut stats) = new_store();
        let match_id = store.create(&mut stats, id("alice"), MatchMode::Classic);

        let snap = store.join(&mut stats, &match_id, id("alice")).unwrap();
        assert_eq!(snap.players, vec![id("alice"), id("alice")]);

        // Her first seat decides her mark
        store.apply_move(&mut stats, &match_id, &id("alice"), 0).unwrap();
        assert_eq!(
            store.apply_move(&mut stats, &match_id, &id("alice"), 1),
            Err(MatchError::WrongTurn)
        );
        assert_eq!(store.join(&mut stats, &match_id, id("bob")), Err(MatchError::Full));
    }

    #[test]
    fn test_opening_move_before_opponent_joins() {
        let (mut store, mut stats) = new_store();
        let match_id = store.create(&mut stats, id("alice"), MatchMode::Timed);

        let snap = store.apply_move(&mut stats, &match_id, &id("alice"), 4).unwrap();
        assert_eq!(snap.cells[4], Some(Mark::X));
        assert_eq!(snap.turn, Mark::O);
        assert!(snap.turn_deadline.is_none());
        assert_eq!(store.timer().arm_count, 0);

        // O's seat is empty, so nobody can move until bob joins
        assert_eq!(
            store.apply_move(&mut stats, &match_id, &id("alice"), 0),
            Err(MatchError::WrongTurn)
        );

        store.join(&mut stats, &match_id, id("bob")).unwrap();
        assert!(store.start_turn_timer(&match_id).unwrap().is_some());
        let snap = store.apply_move(&mut stats, &match_id, &id("bob"), 0).unwrap();
        assert_eq!(snap.turn, Mark::X);
        assert!(snap.turn_deadline.is_some());
    }

    #[test]
    fn test_huge_turn_limit_saturates_deadline() {
        let limit = Duration::from_secs(i64::MAX as u64 / 1000 - 1);
        let mut store = MatchStore::new(ManualTimer::default(), StoreConfig { turn_time_limit: limit });
        let mut stats = StatsTracker::new();
        let match_id = seated(&mut store, &mut stats, MatchMode::Timed);

        let deadline = store.start_turn_timer(&match_id).unwrap();
        assert_eq!(deadline, Some(DateTime::<Utc>::MAX_UTC));
        assert_eq!(store.timer().armed.get(&match_id).map(|(_, after)| *after), Some(limit));
    }

    #[test]
    fn test_join_does_not_start_timer() {
        let (mut store, mut stats) = new_store();
        let match_id = seated(&mut store, &mut stats, MatchMode::Timed);
        assert_eq!(store.timer().arm_count, 0);
        assert!(store.get(&match_id).unwrap().turn_deadline.is_none());

        let deadline = store.start_turn_timer(&match_id).unwrap();
        assert!(deadline.is_some());
        assert!(store.timer().token(&match_id).is_some());
        assert_eq!(store.get(&match_id).unwrap().turn_deadline, deadline);
    }

    #[test]
    fn test_start_turn_timer_noop_cases() {
        let (mut store, mut stats) = new_store();
        let classic = seated(&mut store, &mut stats, MatchMode::Classic);
        assert_eq!(store.start_turn_timer(&classic), Ok(None));

        let lonely = store.create(&mut stats, id("carol"), MatchMode::Timed);
        assert_eq!(store.start_turn_timer(&lonely), Ok(None));

        assert_eq!(store.start_turn_timer(&MatchId::generate()), Err(MatchError::NotFound));
        assert_eq!(store.timer().arm_count, 0);
    }

    #[test]
    fn test_rearm_replaces_timer() {
        let (mut store, mut stats) = new_store();
        let match_id = seated(&mut store, &mut stats, MatchMode::Timed);

        store.start_turn_timer(&match_id).unwrap();
        let first = store.timer().token(&match_id).unwrap();
        store.start_turn_timer(&match_id).unwrap();
        let second = store.timer().token(&match_id).unwrap();

        assert_ne!(first, second);
        assert_eq!(store.timer().armed.len(), 1);

        // The superseded token no longer resolves anything
        let stale = TimerFired { match_id, token: first };
        assert!(store.handle_turn_timeout(&mut stats, stale).is_none());
        assert_eq!(store.get(&match_id).unwrap().outcome, Outcome::Undecided);
    }

    #[test]
    fn test_row_win_scenario() {
        let (mut store, mut stats) = new_store();
        let match_id = seated(&mut store, &mut stats, MatchMode::Classic);

        let snap = play(&mut store, &mut stats, &match_id, &[0, 4, 1, 5, 2]);
        assert_eq!(snap.outcome, Outcome::Winner(Mark::X));

        let alice = stats.get_player(&id("alice"));
        let bob = stats.get_player(&id("bob"));
        assert_eq!(alice.wins, 1);
        assert_eq!(bob.losses, 1);
        assert_eq!(bob.streak, 0);
    }

    #[test]
    fn test_draw_leaves_stats_untouched() {
        let (mut store, mut stats) = new_store();
        let match_id = seated(&mut store, &mut stats, MatchMode::Classic);

        // X O X / X O O / O X X
        let snap = play(&mut store, &mut stats, &match_id, &[0, 1, 2, 4, 3, 5, 7, 6, 8]);
        assert_eq!(snap.outcome, Outcome::Draw);
        assert_eq!(snap.filled_cells(), 9);

        assert_eq!(stats.get_player(&id("alice")).total, 0);
        assert_eq!(stats.get_player(&id("bob")).total, 0);

        let events = store.take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            MatchEvent::Concluded { winner: None, loser: None, .. }
        )));
    }

    #[test]
    fn test_move_error_order() {
        let (mut store, mut stats) = new_store();
        let missing = MatchId::generate();
        assert_eq!(
            store.apply_move(&mut stats, &missing, &id("alice"), 0),
            Err(MatchError::NotFound)
        );

        let match_id = seated(&mut store, &mut stats, MatchMode::Classic);
        assert_eq!(
            store.apply_move(&mut stats, &match_id, &id("mallory"), 0),
            Err(MatchError::PlayerNotInMatch)
        );
        assert_eq!(
            store.apply_move(&mut stats, &match_id, &id("bob"), 0),
            Err(MatchError::WrongTurn)
        );
        assert_eq!(
            store.apply_move(&mut stats, &match_id, &id("alice"), 9),
            Err(MatchError::InvalidCell)
        );
    }

    #[test]
    fn test_cell_occupied_leaves_board_unchanged() {
        let (mut store, mut stats) = new_store();
        let match_id = seated(&mut store, &mut stats, MatchMode::Classic);
        play(&mut store, &mut stats, &match_id, &[4]);
        store.take_events();

        let before = store.get(&match_id).unwrap();
        assert_eq!(
            store.apply_move(&mut stats, &match_id, &id("bob"), 4),
            Err(MatchError::CellOccupied)
        );
        assert_eq!(store.get(&match_id).unwrap(), before);
        assert!(store.take_events().is_empty());
    }

    #[test]
    fn test_game_over_rejects_moves() {
        let (mut store, mut stats) = new_store();
        let match_id = seated(&mut store, &mut stats, MatchMode::Classic);
        play(&mut store, &mut stats, &match_id, &[0, 4, 1, 5, 2]);

        assert_eq!(
            store.apply_move(&mut stats, &match_id, &id("bob"), 8),
            Err(MatchError::GameOver)
        );
    }

    #[test]
    fn test_timed_move_rearms_for_next_player() {
        let (mut store, mut stats) = new_store();
        let match_id = seated(&mut store, &mut stats, MatchMode::Timed);
        store.start_turn_timer(&match_id).unwrap();
        let first = store.timer().token(&match_id).unwrap();

        let snap = play(&mut store, &mut stats, &match_id, &[0]);
        let second = store.timer().token(&match_id).unwrap();
        assert!(second > first);
        assert!(snap.turn_deadline.is_some());
        assert_eq!(snap.turn, Mark::O);

        // Old timer firing late must not end the match
        let late = TimerFired { match_id, token: first };
        assert!(store.handle_turn_timeout(&mut stats, late).is_none());
    }

    #[test]
    fn test_timed_win_clears_timer() {
        let (mut store, mut stats) = new_store();
        let match_id = seated(&mut store, &mut stats, MatchMode::Timed);
        store.start_turn_timer(&match_id).unwrap();

        let snap = play(&mut store, &mut stats, &match_id, &[0, 4, 1, 5, 2]);
        assert_eq!(snap.outcome, Outcome::Winner(Mark::X));
        assert!(snap.turn_deadline.is_none());
        assert!(store.timer().armed.is_empty());
    }

    #[test]
    fn test_timeout_scenario() {
        let (mut store, mut stats) = new_store();
        let match_id = seated(&mut store, &mut stats, MatchMode::Timed);
        store.start_turn_timer(&match_id).unwrap();
        play(&mut store, &mut stats, &match_id, &[0]);
        store.take_events();

        // bob (O) is on turn and lets the clock run out
        let fired = store.timer().fire(&match_id).unwrap();
        let snap = store.handle_turn_timeout(&mut stats, fired).unwrap();

        assert_eq!(snap.outcome, Outcome::Winner(Mark::X));
        assert!(snap.turn_deadline.is_none());
        assert!(store.timer().armed.is_empty());
        assert_eq!(stats.get_player(&id("alice")).wins, 1);
        assert_eq!(stats.get_player(&id("bob")).losses, 1);

        let events = store.take_events();
        assert!(matches!(
            &events[0],
            MatchEvent::TurnTimedOut { timed_out, .. } if *timed_out == id("bob")
        ));

        // Second fire of the same timer is a no-op
        assert!(store.handle_turn_timeout(&mut stats, fired).is_none());
        assert_eq!(stats.get_player(&id("alice")).wins, 1);
        assert!(store.take_events().is_empty());
    }

    #[test]
    fn test_timeout_on_first_turn_x_loses() {
        let (mut store, mut stats) = new_store();
        let match_id = seated(&mut store, &mut stats, MatchMode::Timed);
        store.start_turn_timer(&match_id).unwrap();

        let fired = store.timer().fire(&match_id).unwrap();
        let snap = store.handle_turn_timeout(&mut stats, fired).unwrap();
        assert_eq!(snap.outcome, Outcome::Winner(Mark::O));
        assert_eq!(stats.get_player(&id("bob")).wins, 1);
        assert_eq!(stats.get_player(&id("alice")).losses, 1);
    }

    #[test]
    fn test_timeout_after_removal_is_noop() {
        let (mut store, mut stats) = new_store();
        let match_id = seated(&mut store, &mut stats, MatchMode::Timed);
        store.start_turn_timer(&match_id).unwrap();
        let fired = store.timer().fire(&match_id).unwrap();

        assert!(store.remove(&match_id));
        assert!(store.timer().armed.is_empty());
        assert!(store.handle_turn_timeout(&mut stats, fired).is_none());
        assert!(!store.remove(&match_id));
    }

    #[test]
    fn test_reset_decided_timed_match() {
        let (mut store, mut stats) = new_store();
        let match_id = seated(&mut store, &mut stats, MatchMode::Timed);
        store.start_turn_timer(&match_id).unwrap();
        play(&mut store, &mut stats, &match_id, &[0, 4, 1, 5, 2]);
        assert!(store.timer().armed.is_empty());

        let snap = store.reset(&match_id).unwrap();
        assert_eq!(snap.cells, EMPTY_BOARD);
        assert_eq!(snap.turn, Mark::X);
        assert_eq!(snap.outcome, Outcome::Undecided);
        assert_eq!(snap.players, vec![id("alice"), id("bob")]);
        assert_eq!(snap.mode, MatchMode::Timed);
        assert!(snap.turn_deadline.is_some());
        assert!(store.timer().token(&match_id).is_some());

        // Reapplying reaches the same state
        let again = store.reset(&match_id).unwrap();
        assert_eq!(again.cells, snap.cells);
        assert_eq!(again.outcome, snap.outcome);
        assert_eq!(store.timer().armed.len(), 1);

        // Stats from the first game are kept
        assert_eq!(stats.get_player(&id("alice")).wins, 1);
    }

    #[test]
    fn test_reset_invalidates_pending_timer() {
        let (mut store, mut stats) = new_store();
        let match_id = seated(&mut store, &mut stats, MatchMode::Timed);
        store.start_turn_timer(&match_id).unwrap();
        let before = store.timer().fire(&match_id).unwrap();

        store.reset(&match_id).unwrap();
        assert!(store.handle_turn_timeout(&mut stats, before).is_none());
        assert_eq!(store.get(&match_id).unwrap().outcome, Outcome::Undecided);
    }

    #[test]
    fn test_reset_classic_no_timer() {
        let (mut store, mut stats) = new_store();
        let match_id = seated(&mut store, &mut stats, MatchMode::Classic);
        play(&mut store, &mut stats, &match_id, &[0, 4]);

        let snap = store.reset(&match_id).unwrap();
        assert_eq!(snap.filled_cells(), 0);
        assert!(snap.turn_deadline.is_none());
        assert_eq!(store.timer().arm_count, 0);
        assert_eq!(store.reset(&MatchId::generate()), Err(MatchError::NotFound));
    }

    #[test]
    fn test_event_stream() {
        let (mut store, mut stats) = new_store();
        let match_id = seated(&mut store, &mut stats, MatchMode::Timed);
        store.start_turn_timer(&match_id).unwrap();
        play(&mut store, &mut stats, &match_id, &[4]);

        let events = store.take_events();
        let kinds: Vec<&str> = events.iter().map(|e| match e {
            MatchEvent::Created { .. } => "created",
            MatchEvent::PlayerJoined { .. } => "joined",
            MatchEvent::TimerStarted { .. } => "timer",
            MatchEvent::MoveApplied { .. } => "move",
            MatchEvent::TurnTimedOut { .. } => "timeout",
            MatchEvent::Concluded { .. } => "concluded",
            MatchEvent::Reset { .. } => "reset",
            MatchEvent::Removed { .. } => "removed",
        }).collect();
        assert_eq!(kinds, vec!["created", "joined", "timer", "move", "timer"]);
        assert!(events.iter().all(|e| e.match_id() == match_id));
        assert!(store.take_events().is_empty());
    }

    #[test]
    fn test_evict_idle() {
        let (mut store, mut stats) = new_store();
        let match_id = seated(&mut store, &mut stats, MatchMode::Timed);
        store.start_turn_timer(&match_id).unwrap();

        let soon = Utc::now() + chrono::Duration::seconds(5);
        assert!(store.evict_idle(soon, chrono::Duration::minutes(30)).is_empty());

        let later = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(store.evict_idle(later, chrono::Duration::minutes(30)), vec![match_id]);
        assert!(store.is_empty());
        assert!(store.timer().armed.is_empty());
    }

    proptest! {
        #[test]
        fn prop_marks_never_change(cells in proptest::collection::vec(0usize..9, 0..40)) {
            let (mut store, mut stats) = new_store();
            let match_id = seated(&mut store, &mut stats, MatchMode::Classic);
            let mut applied = 0usize;
            let mut prev = store.get(&match_id).unwrap();

            for cell in cells {
                let player = prev.players[prev.turn.seat()].clone();
                match store.apply_move(&mut stats, &match_id, &player, cell) {
                    Ok(snap) => {
                        applied += 1;
                        for i in 0..BOARD_CELLS {
                            if prev.cells[i].is_some() {
                                prop_assert_eq!(prev.cells[i], snap.cells[i]);
                            }
                        }
                        prev = snap;
                    }
                    Err(err) => {
                        prop_assert!(matches!(err, MatchError::CellOccupied | MatchError::GameOver));
                        prop_assert_eq!(&store.get(&match_id).unwrap(), &prev);
                    }
                }
                prop_assert!(prev.filled_cells() <= applied);
            }

            let alice = stats.get_player(&id("alice"));
            let bob = stats.get_player(&id("bob"));
            match prev.outcome {
                Outcome::Winner(_) => {
                    prop_assert_eq!(alice.wins + bob.wins, 1);
                    prop_assert_eq!(alice.losses + bob.losses, 1);
                }
                _ => {
                    prop_assert_eq!(alice.total + bob.total, 0);
                }
            }
        }
    }
}
