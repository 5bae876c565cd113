//! Tokio Turn Timer
//!
//! One sleeping task per armed match. When it wakes it posts a
//! `TimerFired` to the server's timeout loop; disarming aborts the task.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::game::state::MatchId;
use crate::game::timer::{TimerFired, TimerToken, TurnTimer};

/// `TurnTimer` backed by `tokio::time::sleep`.
pub struct TokioTurnTimer {
    /// Sleeping tasks by match.
    tasks: BTreeMap<MatchId, JoinHandle<()>>,
    /// Where fired timers are delivered.
    fired_tx: mpsc::Sender<TimerFired>,
}

impl TokioTurnTimer {
    /// Create a timer and the receiver its fires arrive on.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<TimerFired>) {
        let (fired_tx, fired_rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                tasks: BTreeMap::new(),
                fired_tx,
            },
            fired_rx,
        )
    }

    /// Number of timers currently tracked.
    pub fn armed_count(&self) -> usize {
        self.tasks.len()
    }
}

impl TurnTimer for TokioTurnTimer {
    fn arm(&mut self, match_id: MatchId, token: TimerToken, after: Duration) {
        self.disarm(&match_id);

        let tx = self.fired_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if tx.send(TimerFired { match_id, token }).await.is_err() {
                debug!("Timeout loop gone, dropping fire for match {}", match_id);
            }
        });

        self.tasks.insert(match_id, handle);
    }

    fn disarm(&mut self, match_id: &MatchId) {
        if let Some(handle) = self.tasks.remove(match_id) {
            handle.abort();
        }
    }
}

impl Drop for TokioTurnTimer {
    fn drop(&mut self) {
        for handle in self.tasks.values() {
            handle.abort();
        }
    }
}
