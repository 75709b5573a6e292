// Voting paths: free votes (immediate, eligibility-gated) and paid votes
// (two-phase, re-priced at confirm).

use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use atelier_store::VoteRow;

use crate::error::HouseError;
use crate::pricing;
use crate::twophase::await_confirmation;
use crate::AuctionHouse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub candidate: String,
    pub total_votes: u64,
    /// What the voter actually paid, recomputed at confirmation time.
    pub cost: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaidVoteQuote {
    pub transaction: String,
    pub cost: u64,
    pub current_votes: u64,
    pub epoch_number: u64,
}

impl AuctionHouse {
    /// True iff the wallet demonstrably holds a membership asset or a
    /// founder key. Any holder-query failure counts as ineligible: an
    /// indexer outage must never hand out free votes.
    async fn free_vote_eligible(&self, voter: &str) -> bool {
        for collection in [&self.rules.membership_collection, &self.rules.collection] {
            match self.ledger.query_holdings(voter, collection).await {
                Ok(count) if count > 0 => return true,
                Ok(_) => {}
                Err(e) => {
                    warn!("holder query failed for {voter}, denying free vote: {e}");
                    return false;
                }
            }
        }
        false
    }

    /// Cast the one free vote a holder gets per candidate per epoch.
    /// Immediate: no ledger transaction is involved.
    pub async fn free_vote(&self, voter: &str, candidate: &str) -> Result<VoteReceipt, HouseError> {
        self.ensure_not_paused()?;

        let row = self.require_eligible_candidate(candidate)?;
        if !self.free_vote_eligible(voter).await {
            return Err(HouseError::NotEligible);
        }

        let epoch = self.ensure_current_epoch(Utc::now())?;
        let vote = VoteRow {
            id: self.store.next_id()?,
            voter: voter.to_string(),
            candidate: candidate.to_string(),
            epoch_number: epoch.number,
            count: 1,
            is_paid: false,
            cost: 0,
            cast_at: Utc::now(),
        };

        if !self.store.try_insert_free_vote(&vote)? {
            return Err(HouseError::FreeVoteUsed);
        }
        let total_votes = self.store.add_votes(candidate, 1)?;
        self.ensure_yes_prediction(voter, candidate, epoch.number)?;

        info!("free vote: {voter} -> {candidate} (total {total_votes})");
        Ok(VoteReceipt {
            candidate: row.asset,
            total_votes,
            cost: 0,
        })
    }

    /// Quote a paid-vote batch. The cost is indicative: the batch is
    /// re-priced against the candidate's tally at confirmation time.
    pub async fn paid_vote_quote(
        &self,
        voter: &str,
        candidate: &str,
        count: u64,
    ) -> Result<PaidVoteQuote, HouseError> {
        self.ensure_not_paused()?;
        if count == 0 {
            return Err(HouseError::InvalidVoteCount);
        }

        let row = self.require_eligible_candidate(candidate)?;
        let cost = pricing::batch_cost(self.rules.base_vote_price, row.votes, count)?;
        let epoch = self.ensure_current_epoch(Utc::now())?;

        let draft = self
            .ledger
            .build_transfer(voter, &self.rules.treasury_wallet, cost)
            .await?;

        Ok(PaidVoteQuote {
            transaction: draft.transaction,
            cost,
            current_votes: row.votes,
            epoch_number: epoch.number,
        })
    }

    /// Confirm a paid-vote batch after the user signed and submitted it.
    /// The price is recomputed from the candidate's current tally — the
    /// quote may be arbitrarily stale by now.
    pub async fn paid_vote_confirm(
        &self,
        voter: &str,
        candidate: &str,
        count: u64,
        signature: &str,
    ) -> Result<VoteReceipt, HouseError> {
        if count == 0 {
            return Err(HouseError::InvalidVoteCount);
        }
        await_confirmation(self.ledger.as_ref(), signature).await?;

        let row = self.require_eligible_candidate(candidate)?;
        let cost = pricing::batch_cost(self.rules.base_vote_price, row.votes, count)?;
        let epoch = self.ensure_current_epoch(Utc::now())?;

        let vote = VoteRow {
            id: self.store.next_id()?,
            voter: voter.to_string(),
            candidate: candidate.to_string(),
            epoch_number: epoch.number,
            count,
            is_paid: true,
            cost,
            cast_at: Utc::now(),
        };
        self.store.put_vote(&vote)?;
        let total_votes = self.store.add_votes(candidate, count)?;
        self.ensure_yes_prediction(voter, candidate, epoch.number)?;

        info!("paid votes: {voter} -> {candidate} x{count} for {cost} (total {total_votes})");
        Ok(VoteReceipt {
            candidate: row.asset,
            total_votes,
            cost,
        })
    }
}
