// Epoch manager.
//
// The whole epoch boundary lives in one operation, `advance_if_due`, invoked
// only from the crank. Inserting epoch N+1 is the sole finalizer of epoch N,
// so repeated or resumed ticks cannot roll the round forward twice: every
// sub-write is guarded by "does the row already say so", which makes the
// operation safe to re-run after a crash at any point.

use chrono::{DateTime, Duration, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use atelier_store::{AuctionRow, CandidateRow, EpochRow};

use crate::error::HouseError;
use crate::AuctionHouse;

/// What a boundary check did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EpochOutcome {
    /// The current epoch is still running.
    NotDue,
    /// The epoch ended with no votes; no auction, next round started.
    Skipped { epoch: u64 },
    /// A winner went to auction and the next round started.
    AuctionStarted { epoch: u64, winner: String, votes: u64 },
}

/// Deterministic winner selection: highest tally wins, ties go to the
/// earliest joiner (epoch first, then join instant, then asset id).
/// An all-zero field selects nobody.
fn select_winner(mut candidates: Vec<CandidateRow>) -> Option<CandidateRow> {
    candidates.sort_by(|a, b| {
        b.votes
            .cmp(&a.votes)
            .then(a.epoch_joined.cmp(&b.epoch_joined))
            .then(a.joined_at.cmp(&b.joined_at))
            .then(a.asset.cmp(&b.asset))
    });
    candidates.into_iter().next().filter(|c| c.votes > 0)
}

impl AuctionHouse {
    /// The current (non-finalized) epoch, creating the first one — or the
    /// successor of an all-finalized history — if none is open.
    pub fn ensure_current_epoch(&self, now: DateTime<Utc>) -> Result<EpochRow, HouseError> {
        if let Some(current) = self.store.current_epoch()? {
            return Ok(current);
        }

        let number = match self.store.latest_epoch()? {
            Some(latest) => latest.number + 1,
            None => 1,
        };
        let epoch = EpochRow {
            number,
            start_time: now,
            duration_secs: self.rules.epoch_duration_secs,
            finalized: false,
            winner_candidate: None,
            auction_started: false,
            skipped: false,
        };
        self.store.put_epoch(&epoch)?;
        info!("epoch {number} started");
        Ok(epoch)
    }

    /// Run the epoch boundary if the current round's time is up.
    ///
    /// Order matters for crash recovery: record the winner on the epoch row,
    /// mark the candidate, create the auction, and only then open the next
    /// epoch (finalizing this one). A tick that dies in the middle resumes
    /// exactly where it stopped.
    pub fn advance_if_due(&self, now: DateTime<Utc>) -> Result<EpochOutcome, HouseError> {
        let mut epoch = self.ensure_current_epoch(now)?;
        if !epoch.is_due(now) {
            return Ok(EpochOutcome::NotDue);
        }

        if epoch.winner_candidate.is_none() && !epoch.skipped {
            match select_winner(self.store.eligible_candidates()?) {
                Some(winner) => {
                    epoch.winner_candidate = Some(winner.asset.clone());
                    self.store.put_epoch(&epoch)?;
                }
                None => {
                    epoch.skipped = true;
                    self.store.put_epoch(&epoch)?;
                }
            }
        }

        let outcome = match epoch.winner_candidate.clone() {
            Some(winner_asset) => {
                let mut winner = self.store.require_candidate(&winner_asset)?;
                if !winner.won {
                    winner.won = true;
                    self.store.put_candidate(&winner)?;
                }

                if self.store.auction(epoch.number)?.is_none() {
                    let auction = AuctionRow {
                        epoch_number: epoch.number,
                        asset: winner.asset.clone(),
                        creator: winner.creator.clone(),
                        reserve: self.rules.reserve_bid,
                        start_time: now,
                        end_time: now + Duration::seconds(self.rules.auction_duration_secs as i64),
                        current_bid: 0,
                        current_bidder: None,
                        current_bid_id: None,
                        bid_count: 0,
                        settled: false,
                    };
                    self.store.put_auction(&auction)?;
                }
                if !epoch.auction_started {
                    epoch.auction_started = true;
                    self.store.put_epoch(&epoch)?;
                }

                info!(
                    "epoch {} ended, winner {} with {} votes",
                    epoch.number, winner.asset, winner.votes
                );
                EpochOutcome::AuctionStarted {
                    epoch: epoch.number,
                    winner: winner.asset,
                    votes: winner.votes,
                }
            }
            None => {
                info!("epoch {} skipped: no candidates or no votes", epoch.number);
                EpochOutcome::Skipped { epoch: epoch.number }
            }
        };

        // Finalize, then open the successor. A crash in between leaves no
        // open epoch; the next tick's ensure_current_epoch repairs that.
        epoch.finalized = true;
        self.store.put_epoch(&epoch)?;

        let next = EpochRow {
            number: epoch.number + 1,
            start_time: now,
            duration_secs: self.rules.epoch_duration_secs,
            finalized: false,
            winner_candidate: None,
            auction_started: false,
            skipped: false,
        };
        self.store.put_epoch(&next)?;
        info!("epoch {} started", next.number);

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(asset: &str, votes: u64, epoch_joined: u64, joined_secs: i64) -> CandidateRow {
        CandidateRow {
            asset: asset.to_string(),
            creator: "creator".to_string(),
            name: asset.to_string(),
            uri: String::new(),
            epoch_joined,
            joined_at: DateTime::<Utc>::from_timestamp(joined_secs, 0).unwrap(),
            votes,
            won: false,
            withdrawn: false,
        }
    }

    #[test]
    fn highest_tally_wins() {
        let winner = select_winner(vec![
            candidate("a", 5, 1, 0),
            candidate("b", 9, 1, 0),
            candidate("c", 2, 1, 0),
        ]);
        assert_eq!(winner.unwrap().asset, "b");
    }

    #[test]
    fn tie_goes_to_the_earliest_joiner() {
        let winner = select_winner(vec![
            candidate("late", 9, 3, 500),
            candidate("early", 9, 1, 100),
        ]);
        assert_eq!(winner.unwrap().asset, "early");
    }

    #[test]
    fn selection_is_deterministic_under_reordering() {
        let field = vec![
            candidate("a", 4, 2, 10),
            candidate("b", 4, 2, 10),
            candidate("c", 4, 1, 99),
        ];
        let mut reversed = field.clone();
        reversed.reverse();
        assert_eq!(
            select_winner(field).unwrap().asset,
            select_winner(reversed).unwrap().asset
        );
    }

    #[test]
    fn zero_votes_selects_nobody() {
        assert!(select_winner(vec![candidate("a", 0, 1, 0)]).is_none());
        assert!(select_winner(Vec::new()).is_none());
    }
}
