//! Agency-completion barrier: the one-shot transition from "betting open"
//! to "winners computed" once every expected agency has reported done.
//!
//! Built from `tokio::sync::Mutex` (the shared state, held across the
//! `await` that scans the store) and `tokio::sync::Notify` (the wakeup): a
//! waiter builds its `notified()` future *before* releasing the lock, so a
//! `mark_done` that flips the barrier between the check and the wait can
//! never be missed.

use crate::bet::Bet;
use crate::error::ServerResult;
use crate::store::BetStore;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::info;

struct BarrierState {
    finished: HashSet<u8>,
    winners: Option<Vec<Bet>>,
}

/// Tracks which agencies have announced completion and memoises the
/// one-shot winners computation.
pub struct CompletionBarrier {
    state: Mutex<BarrierState>,
    notify: Notify,
    store: Arc<BetStore>,
    expected: u8,
    lottery_winner_number: u16,
}

impl CompletionBarrier {
    pub fn new(store: Arc<BetStore>, expected: u8, lottery_winner_number: u16) -> Self {
        Self {
            state: Mutex::new(BarrierState {
                finished: HashSet::new(),
                winners: None,
            }),
            notify: Notify::new(),
            store,
            expected,
            lottery_winner_number,
        }
    }

    /// True iff `agency` has not yet finished and the draw has not run.
    /// Used by the handler to accept/reject bet batches.
    pub async fn is_open(&self, agency: u8) -> bool {
        let state = self.state.lock().await;
        !state.finished.contains(&agency) && state.winners.is_none()
    }

    /// Records that `agency` is done betting. Idempotent: a repeat call for
    /// an agency that already finished is a no-op. If this call is the one
    /// that brings `|finished|` to `expected`, it scans the store, computes
    /// the winners exactly once, and wakes every waiter.
    pub async fn mark_done(&self, agency: u8) -> ServerResult<()> {
        let mut state = self.state.lock().await;
        let newly_finished = state.finished.insert(agency);

        if newly_finished && state.finished.len() == self.expected as usize && state.winners.is_none() {
            let all_bets = self.store.scan().await?;
            let winners: Vec<Bet> = all_bets
                .into_iter()
                .filter(|bet| bet.is_winner(self.lottery_winner_number))
                .collect();
            info!(action = "sorteo", result = "success", winners = winners.len());
            state.winners = Some(winners);
            self.notify.notify_waiters();
        }

        Ok(())
    }

    /// Blocks until the draw has run, then returns the winning bets for
    /// `agency`. Spurious-wakeup safe: every wakeup re-checks `winners`.
    pub async fn wait_and_get(&self, agency: u8) -> Vec<Bet> {
        loop {
            let state = self.state.lock().await;
            if let Some(winners) = &state.winners {
                return winners
                    .iter()
                    .filter(|bet| bet.agency == agency)
                    .cloned()
                    .collect();
            }

            // Register interest in a notification before dropping the lock,
            // otherwise a `mark_done` that runs between the check above and
            // `notified().await` below would notify nobody.
            let notified = self.notify.notified();
            drop(state);
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bet(agency: u8, document: u32, number: u16) -> Bet {
        Bet {
            agency,
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            document,
            birthdate: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            number,
        }
    }

    #[tokio::test]
    async fn is_open_before_and_after_mark_done() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(BetStore::new(dir.path().join("bets.csv")));
        let barrier = CompletionBarrier::new(store, 2, 7574);

        assert!(barrier.is_open(1).await);
        barrier.mark_done(1).await.unwrap();
        assert!(!barrier.is_open(1).await);
        assert!(barrier.is_open(2).await);
    }

    #[tokio::test]
    async fn end_betting_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(BetStore::new(dir.path().join("bets.csv")));
        let barrier = CompletionBarrier::new(store, 2, 7574);

        barrier.mark_done(1).await.unwrap();
        barrier.mark_done(1).await.unwrap();

        let state = barrier.state.lock().await;
        assert_eq!(state.finished.len(), 1);
    }

    #[tokio::test]
    async fn flips_exactly_once_and_filters_by_agency() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(BetStore::new(dir.path().join("bets.csv")));
        store
            .append(vec![bet(1, 1, 7574), bet(2, 2, 7574), bet(1, 3, 1)])
            .await
            .unwrap();

        let barrier = CompletionBarrier::new(store, 2, 7574);
        barrier.mark_done(1).await.unwrap();
        barrier.mark_done(2).await.unwrap();

        let winners_for_1 = barrier.wait_and_get(1).await;
        let winners_for_2 = barrier.wait_and_get(2).await;

        assert_eq!(winners_for_1.iter().map(|b| b.document).collect::<Vec<_>>(), vec![1]);
        assert_eq!(winners_for_2.iter().map(|b| b.document).collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn wait_and_get_blocks_until_the_last_agency_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(BetStore::new(dir.path().join("bets.csv")));
        store.append(vec![bet(1, 1, 7574)]).await.unwrap();

        let barrier = Arc::new(CompletionBarrier::new(store, 2, 7574));
        barrier.mark_done(1).await.unwrap();

        let waiter_barrier = Arc::clone(&barrier);
        let waiter = tokio::spawn(async move { waiter_barrier.wait_and_get(1).await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        barrier.mark_done(2).await.unwrap();
        let winners = waiter.await.unwrap();
        assert_eq!(winners.len(), 1);
    }
}
