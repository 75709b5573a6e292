//! The Atelier lifecycle engine.
//!
//! Epochs rotate on a fixed cadence, paid votes escalate with demand, each
//! epoch's most-voted candidate goes to a timed ascending auction, outbid
//! bidders are refunded exactly once, settlement pays out a revenue split,
//! and voters who backed the winner share a time-decay-weighted reward pool.
//!
//! The load-bearing design rule: request handlers only append facts (votes,
//! bids, predictions, joins). Lifecycle state advances exclusively inside the
//! [`Crank`] tick, so two concurrent requests can never both decide "the
//! epoch is over, I'll roll it forward".

pub mod auction;
pub mod config;
pub mod crank;
pub mod epoch;
pub mod error;
pub mod predictions;
pub mod pricing;
pub mod registry;
pub mod twophase;
pub mod voting;

use std::sync::Arc;

use atelier_ledger::{AssetService, LedgerClient};
use atelier_store::Store;

pub use auction::{BidQuote, BidReceipt, Settlement};
pub use config::HouseRules;
pub use crank::Crank;
pub use epoch::EpochOutcome;
pub use error::HouseError;
pub use predictions::{ClaimReceipt, PredictionStats};
pub use registry::{JoinQuote, MintQuote, MintReceipt};
pub use twophase::SignedSubmission;
pub use voting::{PaidVoteQuote, VoteReceipt};

/// The auction house aggregate: store, ledger seams and house rules.
///
/// Operations live in the component modules (`registry`, `voting`, `epoch`,
/// `auction`, `predictions`) as `impl AuctionHouse` blocks.
pub struct AuctionHouse {
    store: Arc<Store>,
    ledger: Arc<dyn LedgerClient>,
    assets: Arc<dyn AssetService>,
    rules: HouseRules,
}

impl AuctionHouse {
    pub fn new(
        store: Arc<Store>,
        ledger: Arc<dyn LedgerClient>,
        assets: Arc<dyn AssetService>,
        rules: HouseRules,
    ) -> Result<Self, HouseError> {
        rules.validate()?;
        Ok(AuctionHouse { store, ledger, assets, rules })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn rules(&self) -> &HouseRules {
        &self.rules
    }

    /// Look up a candidate that is still in the running.
    pub(crate) fn require_eligible_candidate(
        &self,
        asset: &str,
    ) -> Result<atelier_store::CandidateRow, HouseError> {
        let row = self
            .store
            .candidate(asset)?
            .ok_or_else(|| HouseError::UnknownCandidate(asset.to_string()))?;
        if !row.eligible() {
            return Err(HouseError::CandidateNotEligible(asset.to_string()));
        }
        Ok(row)
    }

    /// Refuse every state-changing path while the house is paused.
    pub(crate) fn ensure_not_paused(&self) -> Result<(), HouseError> {
        if self.store.counters()?.paused {
            return Err(HouseError::Paused);
        }
        Ok(())
    }

    /// Flip the pause switch (operator action).
    pub fn set_paused(&self, paused: bool) -> Result<(), HouseError> {
        let mut counters = self.store.counters()?;
        counters.paused = paused;
        self.store.put_counters(&counters)?;
        Ok(())
    }
}
