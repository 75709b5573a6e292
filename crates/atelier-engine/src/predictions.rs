// Prediction book and reward calculator.
//
// A prediction is a voter's call on one candidate for one epoch. "Yes"
// predictions are written by the voting paths (backing a candidate with a
// vote is the prediction); the predict endpoint records explicit passes.
// Grading happens once per epoch, after its auction settles, gated by
// `correct IS NULL` so a retried tick can never re-grade or double-pay.

use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use atelier_store::{EpochRow, PredictionDirection, PredictionRow};

use crate::error::HouseError;
use crate::AuctionHouse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub amount: u64,
    pub signature: String,
    pub predictions_claimed: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionStats {
    pub total: u64,
    pub correct: u64,
    pub current_streak: u64,
    pub total_earnings: u64,
}

/// Earlier calls weigh more: half-life of roughly an hour from epoch start.
fn decay_weight(epoch: &EpochRow, prediction: &PredictionRow) -> f64 {
    let minutes = (prediction.submitted_at - epoch.start_time).num_seconds() as f64 / 60.0;
    1.0 / (1.0 + minutes.max(0.0) / 60.0)
}

impl AuctionHouse {
    /// Record a prediction. Backing a candidate (`Yes`) goes through the
    /// free-vote path — the vote *is* the prediction; a `Skip` is a pure
    /// fact append. One prediction per voter/candidate/epoch either way.
    pub async fn submit_prediction(
        &self,
        voter: &str,
        candidate: &str,
        direction: PredictionDirection,
    ) -> Result<(), HouseError> {
        match direction {
            PredictionDirection::Yes => {
                self.free_vote(voter, candidate).await?;
                Ok(())
            }
            PredictionDirection::Skip => {
                self.ensure_not_paused()?;
                self.require_eligible_candidate(candidate)?;
                let epoch = self.ensure_current_epoch(Utc::now())?;
                let row = PredictionRow {
                    id: self.store.next_id()?,
                    voter: voter.to_string(),
                    candidate: candidate.to_string(),
                    epoch_number: epoch.number,
                    direction: PredictionDirection::Skip,
                    submitted_at: Utc::now(),
                    correct: None,
                    reward: 0,
                    claimed: false,
                    claim_tx: None,
                };
                if !self.store.try_insert_prediction(&row)? {
                    return Err(HouseError::AlreadyPredicted);
                }
                Ok(())
            }
        }
    }

    /// Write the `Yes` prediction that accompanies a voter's first vote on
    /// a candidate. A duplicate is fine — the first call won the slot.
    pub(crate) fn ensure_yes_prediction(
        &self,
        voter: &str,
        candidate: &str,
        epoch_number: u64,
    ) -> Result<(), HouseError> {
        let row = PredictionRow {
            id: self.store.next_id()?,
            voter: voter.to_string(),
            candidate: candidate.to_string(),
            epoch_number,
            direction: PredictionDirection::Yes,
            submitted_at: Utc::now(),
            correct: None,
            reward: 0,
            claimed: false,
            claim_tx: None,
        };
        self.store.try_insert_prediction(&row)?;
        Ok(())
    }

    /// Grade every epoch whose outcome is known and whose predictions are
    /// still ungraded, distributing the reward pool for sold auctions.
    /// Returns the number of epochs graded this pass.
    pub fn distribute_rewards(&self) -> Result<u64, HouseError> {
        let mut graded = 0;

        for auction in self.store.settled_auctions()? {
            let predictions = self.store.predictions_for_epoch(auction.epoch_number)?;
            if !predictions.iter().any(|p| p.correct.is_none()) {
                continue;
            }
            let epoch = self
                .store
                .epoch(auction.epoch_number)?
                .ok_or_else(|| HouseError::Store(atelier_store::StoreError::NotFound(
                    format!("epoch {}", auction.epoch_number),
                )))?;
            let pool = (auction.current_bid as u128 * self.rules.prediction_pool_bps as u128
                / 10_000) as u64;
            self.grade_epoch(&epoch, Some(&auction.asset), pool, predictions)?;
            graded += 1;
        }

        // Skipped epochs have no winner: everything grades false.
        for epoch in self.store.all_epochs()? {
            if !(epoch.finalized && epoch.skipped) {
                continue;
            }
            let predictions = self.store.predictions_for_epoch(epoch.number)?;
            if !predictions.iter().any(|p| p.correct.is_none()) {
                continue;
            }
            self.grade_epoch(&epoch, None, 0, predictions)?;
            graded += 1;
        }

        Ok(graded)
    }

    fn grade_epoch(
        &self,
        epoch: &EpochRow,
        winner_asset: Option<&str>,
        pool: u64,
        predictions: Vec<PredictionRow>,
    ) -> Result<(), HouseError> {
        let (correct, rest): (Vec<_>, Vec<_>) =
            predictions.into_iter().partition(|p| {
                p.correct.is_none()
                    && p.direction == PredictionDirection::Yes
                    && winner_asset == Some(p.candidate.as_str())
            });

        let total_weight: f64 = correct.iter().map(|p| decay_weight(epoch, p)).sum();
        let mut distributed: u64 = 0;

        for mut prediction in correct {
            let reward = if pool > 0 && total_weight > 0.0 {
                let share =
                    (decay_weight(epoch, &prediction) / total_weight * pool as f64).floor() as u64;
                // Float rounding must never push the sum past the pool.
                share.min(pool - distributed)
            } else {
                0
            };
            distributed += reward;
            prediction.correct = Some(true);
            prediction.reward = reward;
            self.store.put_prediction(&prediction)?;
        }

        for mut prediction in rest {
            if prediction.correct.is_some() {
                continue;
            }
            prediction.correct = Some(false);
            self.store.put_prediction(&prediction)?;
        }

        if pool > 0 {
            info!(
                "epoch {} graded: {distributed} of {pool} distributed (remainder stays in treasury)",
                epoch.number
            );
        } else {
            info!("epoch {} graded with no reward pool", epoch.number);
        }
        Ok(())
    }

    /// Pay out a voter's unclaimed rewards in one authority transfer.
    /// Rows are only marked claimed after the transfer succeeds.
    pub async fn claim_rewards(&self, voter: &str) -> Result<ClaimReceipt, HouseError> {
        let unclaimed: Vec<PredictionRow> = self
            .store
            .predictions_for_voter(voter)?
            .into_iter()
            .filter(|p| p.correct == Some(true) && !p.claimed && p.reward > 0)
            .collect();

        let amount: u64 = unclaimed.iter().map(|p| p.reward).sum();
        if amount == 0 {
            return Err(HouseError::NothingToClaim);
        }

        let signature = match self.ledger.authority_transfer(voter, amount).await {
            Ok(signature) => signature,
            Err(e) => {
                warn!("reward claim transfer for {voter} failed: {e}");
                return Err(e.into());
            }
        };

        let count = unclaimed.len() as u64;
        for mut prediction in unclaimed {
            prediction.claimed = true;
            prediction.claim_tx = Some(signature.clone());
            self.store.put_prediction(&prediction)?;
        }

        info!("{voter} claimed {amount} across {count} predictions ({signature})");
        Ok(ClaimReceipt {
            amount,
            signature,
            predictions_claimed: count,
        })
    }

    /// Lifetime prediction record for a voter.
    pub fn prediction_stats(&self, voter: &str) -> Result<PredictionStats, HouseError> {
        let mut predictions = self.store.predictions_for_voter(voter)?;
        predictions.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));

        let mut stats = PredictionStats::default();
        let mut streak_open = true;
        for prediction in &predictions {
            stats.total += 1;
            stats.total_earnings += prediction.reward;
            match prediction.correct {
                Some(true) => {
                    stats.correct += 1;
                    if streak_open {
                        stats.current_streak += 1;
                    }
                }
                Some(false) => streak_open = false,
                // Ungraded rows don't interrupt a streak.
                None => {}
            }
        }
        Ok(stats)
    }
}
