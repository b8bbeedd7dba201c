//! Process-wide coordination of agencies and the lottery draw
//!
//! The [`Coordinator`] owns everything connection handlers share:
//! - which agencies are known and which have signalled completion
//! - the one-shot lottery barrier (`Collecting` until enough agencies are
//!   done, then `Drawn` for the rest of the process lifetime)
//! - the rendezvous that parks winner queries until the draw happens
//! - the storage handle used for batch appends and for the draw itself
//!
//! Lock order is coordination state first, storage second. Batch appends
//! take the storage lock on its own and release it before touching the
//! coordination state, so the two never nest the other way round.

use crate::error::{Result, ServerError, StorageError};
use crate::storage::{BetStore, StorageHandle};
use log::{debug, error, info};
use shared::Bet;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

/// Bet number that wins the draw
pub const LOTTERY_WINNER_NUMBER: u32 = 7574;

/// Default number of agencies that must finish before the draw
pub const DEFAULT_EXPECTED_AGENCIES: usize = 5;

/// How long a winner query sleeps between checks of the shutdown flag
pub const WINNERS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Decides whether a stored bet is a winner
pub type WinnerPredicate = Arc<dyn Fn(&Bet) -> bool + Send + Sync>;

/// Winning rule used by the server binary
pub fn has_won(bet: &Bet) -> bool {
    bet.number == LOTTERY_WINNER_NUMBER
}

/// Winning documents grouped by agency, in store order
pub type WinnersMap = HashMap<u8, Vec<String>>;

#[derive(Debug)]
enum LotteryState {
    Collecting,
    Drawn(WinnersMap),
}

#[derive(Debug)]
struct CoordinationState {
    known: HashSet<u8>,
    done: HashSet<u8>,
    lottery: LotteryState,
}

/// Answer to a winner query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WinnersOutcome {
    Ready(Vec<String>),
    /// Shutdown began before the draw
    NotReady,
}

/// Shared state behind every connection handler
pub struct Coordinator {
    state: Mutex<CoordinationState>,
    drawn: Notify,
    running: AtomicBool,
    storage: StorageHandle,
    has_won: WinnerPredicate,
    expected_agencies: usize,
    poll_interval: Duration,
}

impl Coordinator {
    pub fn new<S>(store: S, has_won: WinnerPredicate, expected_agencies: usize) -> Self
    where
        S: BetStore + 'static,
    {
        Self {
            state: Mutex::new(CoordinationState {
                known: HashSet::new(),
                done: HashSet::new(),
                lottery: LotteryState::Collecting,
            }),
            drawn: Notify::new(),
            running: AtomicBool::new(true),
            storage: StorageHandle::new(store),
            has_won,
            expected_agencies,
            poll_interval: WINNERS_POLL_INTERVAL,
        }
    }

    /// Overrides how often parked winner queries re-check for shutdown
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn expected_agencies(&self) -> usize {
        self.expected_agencies
    }

    /// Persists a batch and returns the number of its last bet
    ///
    /// The whole batch goes through one storage critical section, so the draw
    /// sees either all of it or none of it. The first bet's agency becomes
    /// known once the batch is stored.
    pub async fn store_batch(&self, bets: Vec<Bet>) -> Result<u32> {
        let (agency, last_number) = match (bets.first(), bets.last()) {
            (Some(first), Some(last)) => (first.agency, last.number),
            _ => return Err(ServerError::EmptyBatch),
        };
        let count = bets.len();

        self.storage.store_bets(bets).await?;

        let mut state = self.state.lock().await;
        if state.known.insert(agency) {
            debug!("Agency {} is now known ({} total)", agency, state.known.len());
        }
        drop(state);

        info!("Stored {} bets from agency {}", count, agency);
        Ok(last_number)
    }

    /// Records that an agency finished sending bets
    ///
    /// Runs the draw when this call brings the done count to the expected
    /// number of agencies. Returns `true` only for the call that performed
    /// the draw; later calls just update the bookkeeping.
    pub async fn mark_done(&self, agency: u8) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.known.insert(agency);
        state.done.insert(agency);

        debug!(
            "Agency {} done ({}/{} expected)",
            agency,
            state.done.len(),
            self.expected_agencies
        );

        let ready = matches!(state.lottery, LotteryState::Collecting)
            && state.done.len() >= self.expected_agencies;
        if !ready {
            return Ok(false);
        }

        // The flip to Drawn happens under this same guard, so concurrent
        // DONEs can never both see Collecting here
        if let Err(e) = self.draw_locked(&mut state).await {
            error!("Lottery draw failed, will retry: {}", e);
            return Err(e.into());
        }
        Ok(true)
    }

    /// Runs the draw and flips the barrier; the caller holds the state lock
    async fn draw_locked(
        &self,
        state: &mut CoordinationState,
    ) -> std::result::Result<(), StorageError> {
        let winners = self.draw().await?;
        let total: usize = winners.values().map(Vec::len).sum();
        state.lottery = LotteryState::Drawn(winners);

        info!("Lottery drawn: {} winners", total);
        self.drawn.notify_waiters();
        Ok(())
    }

    async fn draw(&self) -> std::result::Result<WinnersMap, StorageError> {
        let bets = self.storage.load_bets().await?;
        debug!("Drawing over {} stored bets", bets.len());

        let mut winners = WinnersMap::new();
        for bet in bets {
            if (self.has_won)(&bet) {
                winners.entry(bet.agency).or_default().push(bet.document);
            }
        }
        Ok(winners)
    }

    /// Waits for the draw and returns this agency's winning documents
    ///
    /// Parks until the lottery is drawn or the coordinator shuts down. The
    /// wait wakes up every poll interval even without a notification, and
    /// retries a draw that is due but failed.
    pub async fn wait_for_winners(&self, agency: u8) -> WinnersOutcome {
        loop {
            // Register interest before checking so a draw in between is not missed
            let notified = self.drawn.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                // A draw that failed on the last DONE gets no other trigger
                if matches!(state.lottery, LotteryState::Collecting)
                    && state.done.len() >= self.expected_agencies
                {
                    if let Err(e) = self.draw_locked(&mut state).await {
                        error!("Lottery draw retry failed: {}", e);
                    }
                }

                if let LotteryState::Drawn(winners) = &state.lottery {
                    return WinnersOutcome::Ready(
                        winners.get(&agency).cloned().unwrap_or_default(),
                    );
                }
            }

            if !self.is_running() {
                return WinnersOutcome::NotReady;
            }

            debug!("Agency {} waiting for the draw", agency);
            let _ = tokio::time::timeout(self.poll_interval, notified).await;
        }
    }

    pub async fn is_drawn(&self) -> bool {
        matches!(self.state.lock().await.lottery, LotteryState::Drawn(_))
    }

    pub async fn known_agencies(&self) -> usize {
        self.state.lock().await.known.len()
    }

    pub async fn done_agencies(&self) -> usize {
        self.state.lock().await.done.len()
    }

    /// Reads every stored bet through the storage lock
    pub async fn load_bets(&self) -> std::result::Result<Vec<Bet>, StorageError> {
        self.storage.load_bets().await
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the coordinator and releases every parked winner query
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Coordinator shutting down, releasing waiting agencies");
        }
        self.drawn.notify_waiters();
    }
}
