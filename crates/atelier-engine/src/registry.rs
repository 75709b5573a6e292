// Candidate registry: minting, entering the competition, withdrawal.
//
// Minting and joining follow the two-phase protocol (`twophase`): the quote
// builds an unsigned transaction and persists nothing; the store mutation
// happens only in the confirm call, after the ledger confirms and the
// current state re-validates.

use chrono::Utc;
use log::{error, info};
use serde::{Deserialize, Serialize};

use atelier_store::CandidateRow;

use crate::error::HouseError;
use crate::twophase::await_confirmation;
use crate::AuctionHouse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintQuote {
    pub transaction: String,
    pub asset: String,
    pub mint_number: u64,
    pub fee: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintReceipt {
    pub asset: String,
    pub name: String,
    pub total_minted: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinQuote {
    pub transaction: String,
    pub fee: u64,
    pub epoch_number: u64,
}

impl AuctionHouse {
    /// Quote a mint: unsigned mint transaction with the fee attached.
    /// `total_minted` is NOT incremented here — only after the confirm.
    pub async fn mint_quote(
        &self,
        creator: &str,
        name: &str,
        uri: &str,
    ) -> Result<MintQuote, HouseError> {
        self.ensure_not_paused()?;

        let mint_number = self.store.counters()?.total_minted + 1;
        let name = if name.is_empty() {
            format!("Atelier Piece #{mint_number:04}")
        } else {
            name.to_string()
        };

        let draft = self
            .ledger
            .build_mint(creator, &name, uri, self.rules.mint_fee, &self.rules.team_wallet)
            .await?;

        Ok(MintQuote {
            transaction: draft.transaction,
            asset: draft.asset,
            mint_number,
            fee: self.rules.mint_fee,
        })
    }

    /// Confirm a mint: verify the asset exists on-ledger inside the house
    /// collection, then bump the mint counter.
    pub async fn mint_confirm(&self, asset: &str, signature: &str) -> Result<MintReceipt, HouseError> {
        await_confirmation(self.ledger.as_ref(), signature).await?;

        let info = self.assets.asset_info(asset).await?;
        if info.collection != self.rules.collection {
            return Err(HouseError::WrongCollection);
        }

        let mut counters = self.store.counters()?;
        counters.total_minted += 1;
        self.store.put_counters(&counters)?;

        info!("mint confirmed: {asset} ({})", info.name);
        Ok(MintReceipt {
            asset: asset.to_string(),
            name: info.name,
            total_minted: counters.total_minted,
        })
    }

    /// Quote joining the competition: validates ownership and collection
    /// membership, returns the unsigned join-fee transfer.
    pub async fn join_quote(&self, creator: &str, asset: &str) -> Result<JoinQuote, HouseError> {
        self.ensure_not_paused()?;

        let info = self.assets.asset_info(asset).await?;
        if info.owner != creator {
            return Err(HouseError::NotAssetOwner);
        }
        if info.collection != self.rules.collection {
            return Err(HouseError::WrongCollection);
        }
        if let Some(existing) = self.store.candidate(asset)? {
            if existing.eligible() {
                return Err(HouseError::AlreadyEntered);
            }
        }

        let epoch = self.ensure_current_epoch(Utc::now())?;
        let draft = self
            .ledger
            .build_transfer(creator, &self.rules.treasury_wallet, self.rules.join_fee)
            .await?;

        Ok(JoinQuote {
            transaction: draft.transaction,
            fee: self.rules.join_fee,
            epoch_number: epoch.number,
        })
    }

    /// Confirm a join: verify the fee transaction, re-verify ownership,
    /// move the asset into the vault, then insert the candidate.
    pub async fn join_confirm(
        &self,
        creator: &str,
        asset: &str,
        signature: &str,
    ) -> Result<CandidateRow, HouseError> {
        await_confirmation(self.ledger.as_ref(), signature).await?;

        let info = self.assets.asset_info(asset).await?;
        if info.owner != creator {
            return Err(HouseError::NotAssetOwner);
        }
        if info.collection != self.rules.collection {
            return Err(HouseError::WrongCollection);
        }

        // Custody first, candidate row second: a candidate must never exist
        // whose asset the vault does not hold.
        let custody_sig = self
            .assets
            .transfer_ownership(asset, &self.rules.vault_wallet)
            .await?;
        info!("asset {asset} moved to vault ({custody_sig})");

        let epoch = self.ensure_current_epoch(Utc::now())?;
        let candidate = CandidateRow {
            asset: asset.to_string(),
            creator: creator.to_string(),
            name: info.name,
            uri: info.uri,
            epoch_joined: epoch.number,
            joined_at: Utc::now(),
            votes: 0,
            won: false,
            withdrawn: false,
        };
        self.store.put_candidate(&candidate)?;

        info!("candidate entered: {asset} by {creator} (epoch {})", epoch.number);
        Ok(candidate)
    }

    /// Withdraw a candidate: the asset leaves the vault and the candidate
    /// loses future eligibility. Historical vote tallies are kept.
    pub async fn withdraw(&self, creator: &str, asset: &str) -> Result<CandidateRow, HouseError> {
        self.ensure_not_paused()?;

        let mut candidate = self
            .store
            .candidate(asset)?
            .ok_or_else(|| HouseError::UnknownCandidate(asset.to_string()))?;

        if candidate.creator != creator {
            return Err(HouseError::NotAssetOwner);
        }
        if candidate.won {
            return Err(HouseError::WithdrawWinner);
        }
        if candidate.withdrawn {
            return Err(HouseError::CandidateNotEligible(asset.to_string()));
        }
        if self.store.open_auction_for_asset(asset)?.is_some() {
            return Err(HouseError::WithdrawDuringAuction);
        }

        // Return the asset before flagging the row, so a failed custody
        // transfer leaves the candidate fully entered and retryable.
        match self.assets.transfer_ownership(asset, creator).await {
            Ok(signature) => info!("asset {asset} returned to {creator} ({signature})"),
            Err(e) => {
                error!("withdraw of {asset} aborted, custody transfer failed: {e}");
                return Err(e.into());
            }
        }

        candidate.withdrawn = true;
        self.store.put_candidate(&candidate)?;
        Ok(candidate)
    }

    /// Active candidates ordered by votes, highest first.
    pub fn leaderboard(&self) -> Result<Vec<CandidateRow>, HouseError> {
        let mut rows = self.store.eligible_candidates()?;
        rows.sort_by(|a, b| {
            b.votes
                .cmp(&a.votes)
                .then(a.epoch_joined.cmp(&b.epoch_joined))
                .then(a.joined_at.cmp(&b.joined_at))
        });
        Ok(rows)
    }
}
