// The crank: a single-flight ticker that owns every lifecycle transition.
//
// User requests only append facts; this loop is the one place epochs roll,
// auctions settle, rewards distribute and refunds retry. Each tick runs the
// four steps in a fixed order, and every step is isolated: a failure is
// logged and the tick moves on, because each step is independently
// idempotent against the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::epoch::EpochOutcome;
use crate::AuctionHouse;

pub struct Crank {
    house: Arc<AuctionHouse>,
    interval: Duration,
    token: CancellationToken,
    // Single-flight: a tick that is still running when the next one is due
    // makes the scheduler skip entirely — no overlap, no queueing.
    in_flight: tokio::sync::Mutex<()>,
}

impl Crank {
    pub fn new(house: Arc<AuctionHouse>, interval: Duration) -> Arc<Self> {
        Arc::new(Crank {
            house,
            interval,
            token: CancellationToken::new(),
            in_flight: tokio::sync::Mutex::new(()),
        })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Run one complete pass over all due work. Public so tests can drive
    /// the lifecycle manually instead of waiting on wall-clock intervals.
    pub async fn tick(&self, now: DateTime<Utc>) {
        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("tick skipped: previous tick still running");
                return;
            }
        };

        // 1. Epoch boundary.
        match self.house.advance_if_due(now) {
            Ok(EpochOutcome::NotDue) => {}
            Ok(EpochOutcome::Skipped { epoch }) => info!("tick: epoch {epoch} skipped"),
            Ok(EpochOutcome::AuctionStarted { epoch, winner, votes }) => {
                info!("tick: epoch {epoch} won by {winner} ({votes} votes), auction open")
            }
            Err(e) => error!("tick: epoch advance failed: {e}"),
        }

        // 2. Auction settlement.
        match self.house.settle_due(now).await {
            Ok(settlements) if settlements.is_empty() => {}
            Ok(settlements) => info!("tick: settled {} auction(s)", settlements.len()),
            Err(e) => error!("tick: settlement failed: {e}"),
        }

        // 3. Prediction grading and reward distribution.
        match self.house.distribute_rewards() {
            Ok(0) => {}
            Ok(graded) => info!("tick: graded {graded} epoch(s)"),
            Err(e) => error!("tick: reward distribution failed: {e}"),
        }

        // 4. Refund retry.
        match self.house.retry_refunds().await {
            Ok(0) => {}
            Ok(repaid) => info!("tick: repaid {repaid} outstanding refund(s)"),
            Err(e) => error!("tick: refund retry failed: {e}"),
        }
    }

    /// Start the recurring loop. Runs until the token is cancelled.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let crank = self;
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(crank.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("crank started (interval {:?})", crank.interval);
            loop {
                tokio::select! {
                    _ = crank.token.cancelled() => {
                        info!("crank stopped");
                        break;
                    }
                    _ = timer.tick() => {
                        crank.tick(Utc::now()).await;
                    }
                }
            }
        })
    }
}
