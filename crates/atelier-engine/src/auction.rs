// Auction state machine: bid quote/confirm, refunds, settlement.
//
// A bid follows the two-phase protocol: quoting the minimum reserves
// nothing, and concurrent bidders may race to confirm. Confirmation
// therefore re-reads the auction and re-validates the minimum against the
// current bid, not the quoted one.

use chrono::{DateTime, Duration, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use atelier_store::{AuctionRow, BidRow, FounderEntryRow};

use crate::error::HouseError;
use crate::pricing;
use crate::twophase::await_confirmation;
use crate::AuctionHouse;

/// Attribute value stamped onto an auction-won asset.
pub const FOUNDER_KEY_STATUS: &str = "Founder Key";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidQuote {
    pub transaction: String,
    pub epoch_number: u64,
    pub minimum: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidReceipt {
    pub epoch_number: u64,
    pub current_bid: u64,
    pub bid_count: u64,
    pub end_time: DateTime<Utc>,
}

/// How a due auction was resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Settlement {
    /// No bids: the asset went back to its creator.
    Returned { epoch_number: u64, asset: String },
    /// Sold: the asset went to the bidder, the creator was paid.
    Won {
        epoch_number: u64,
        asset: String,
        winner: String,
        amount: u64,
    },
}

impl AuctionHouse {
    fn open_auction(&self, epoch_number: u64) -> Result<AuctionRow, HouseError> {
        let auction = self
            .store
            .auction(epoch_number)?
            .ok_or(HouseError::NoOpenAuction(epoch_number))?;
        if auction.settled {
            return Err(HouseError::NoOpenAuction(epoch_number));
        }
        Ok(auction)
    }

    /// Quote a bid: validate the amount against the current minimum and
    /// build the unsigned transfer. Nothing is reserved by quoting.
    pub async fn bid_quote(
        &self,
        bidder: &str,
        epoch_number: u64,
        amount: u64,
    ) -> Result<BidQuote, HouseError> {
        self.ensure_not_paused()?;

        let auction = self.open_auction(epoch_number)?;
        if auction.ended(Utc::now()) {
            return Err(HouseError::AuctionEnded);
        }

        let minimum = pricing::min_bid(
            auction.reserve,
            auction.current_bid,
            self.rules.min_bid_increment_bps,
        );
        if amount < minimum {
            return Err(HouseError::BidTooLow { offered: amount, minimum });
        }

        let draft = self
            .ledger
            .build_transfer(bidder, &self.rules.treasury_wallet, amount)
            .await?;

        Ok(BidQuote {
            transaction: draft.transaction,
            epoch_number,
            minimum,
        })
    }

    /// Confirm a bid. Re-validates against the auction's *current* state:
    /// another bidder may have confirmed since the quote. On success the
    /// previous bidder is refunded from the authority balance; a refund
    /// failure is recorded for the crank and never rejects the new bid.
    pub async fn bid_confirm(
        &self,
        bidder: &str,
        epoch_number: u64,
        amount: u64,
        signature: &str,
    ) -> Result<BidReceipt, HouseError> {
        await_confirmation(self.ledger.as_ref(), signature).await?;

        let mut auction = self.open_auction(epoch_number)?;
        let minimum = pricing::min_bid(
            auction.reserve,
            auction.current_bid,
            self.rules.min_bid_increment_bps,
        );
        if amount < minimum {
            return Err(HouseError::BidTooLow { offered: amount, minimum });
        }

        // Supersede and refund the previous high bid before recording the
        // new one. The money has to leave the treasury exactly once, so the
        // bid row is flagged first and the refund outcome recorded on it.
        if let (Some(previous_bidder), Some(previous_id)) =
            (auction.current_bidder.clone(), auction.current_bid_id)
        {
            if let Some(mut previous) = self.store.bid(previous_id)? {
                previous.superseded = true;
                match self
                    .ledger
                    .authority_transfer(&previous_bidder, previous.amount)
                    .await
                {
                    Ok(refund_sig) => {
                        previous.refunded = true;
                        previous.refund_tx = Some(refund_sig.clone());
                        previous.refund_error = None;
                        info!(
                            "refunded {} to outbid {previous_bidder} ({refund_sig})",
                            previous.amount
                        );
                    }
                    Err(e) => {
                        error!("refund to {previous_bidder} failed, queued for retry: {e}");
                        previous.refund_error = Some(e.to_string());
                    }
                }
                self.store.put_bid(&previous)?;
            }
        }

        let now = Utc::now();
        let bid = BidRow {
            id: self.store.next_id()?,
            auction_epoch: epoch_number,
            bidder: bidder.to_string(),
            amount,
            placed_at: now,
            superseded: false,
            refunded: false,
            refund_tx: None,
            refund_error: None,
        };
        self.store.put_bid(&bid)?;

        // Anti-snipe: a bid landing near expiry pushes the end out so the
        // previous bidder has a window to respond.
        let window = Duration::seconds(self.rules.anti_snipe_window_secs as i64);
        if auction.end_time - now < window {
            auction.end_time = now + window;
        }

        auction.current_bid = amount;
        auction.current_bidder = Some(bidder.to_string());
        auction.current_bid_id = Some(bid.id);
        auction.bid_count += 1;
        self.store.put_auction(&auction)?;

        info!(
            "bid confirmed: {bidder} on epoch {epoch_number} for {amount} ({} bids)",
            auction.bid_count
        );
        Ok(BidReceipt {
            epoch_number,
            current_bid: auction.current_bid,
            bid_count: auction.bid_count,
            end_time: auction.end_time,
        })
    }

    /// Settle every auction whose time is up, in epoch order. Called once
    /// per tick; each settlement is independently idempotent because it is
    /// keyed off `settled = false`.
    pub async fn settle_due(&self, now: DateTime<Utc>) -> Result<Vec<Settlement>, HouseError> {
        let mut settlements = Vec::new();
        for auction in self.store.due_auctions(now)? {
            match self.settle_one(auction, now).await {
                Ok(settlement) => settlements.push(settlement),
                // One stuck auction must not block the ones behind it.
                Err(e) => error!("settlement failed, will retry next tick: {e}"),
            }
        }
        Ok(settlements)
    }

    async fn settle_one(
        &self,
        mut auction: AuctionRow,
        now: DateTime<Utc>,
    ) -> Result<Settlement, HouseError> {
        let winner = match (auction.current_bidder.clone(), auction.current_bid) {
            (Some(winner), amount) if amount > 0 => winner,
            _ => {
                // No bids: hand the piece back and close out.
                self.assets
                    .transfer_ownership(&auction.asset, &auction.creator)
                    .await?;
                auction.settled = true;
                self.store.put_auction(&auction)?;
                info!(
                    "auction for epoch {} settled with no bids, {} returned to {}",
                    auction.epoch_number, auction.asset, auction.creator
                );
                return Ok(Settlement::Returned {
                    epoch_number: auction.epoch_number,
                    asset: auction.asset,
                });
            }
        };

        let amount = auction.current_bid;

        // The ownership transfer is the gating effect: if it fails the
        // auction stays unsettled and the next tick retries the whole path.
        self.assets.transfer_ownership(&auction.asset, &winner).await?;

        // Everything after the transfer is best-effort.
        let attributes = vec![
            ("Status".to_string(), FOUNDER_KEY_STATUS.to_string()),
            ("Creator".to_string(), auction.creator.clone()),
            ("Epoch".to_string(), auction.epoch_number.to_string()),
        ];
        if let Err(e) = self.assets.update_attributes(&auction.asset, &attributes).await {
            warn!("attribute upgrade failed for {}: {e}", auction.asset);
        }

        let creator_share = share_of(amount, self.rules.creator_share_bps);
        let team_share = share_of(amount, self.rules.team_share_bps);
        let growth_share = share_of(amount, self.rules.growth_share_bps);
        self.pay_out(&auction.creator, creator_share, "creator").await;
        self.pay_out(&self.rules.team_wallet, team_share, "team").await;
        self.pay_out(&self.rules.growth_wallet, growth_share, "growth").await;

        self.store.put_founder_entry(&FounderEntryRow {
            asset: auction.asset.clone(),
            creator: auction.creator.clone(),
            owner: winner.clone(),
            epoch_won: auction.epoch_number,
            settled_at: now,
        })?;
        let mut counters = self.store.counters()?;
        counters.total_founder_keys += 1;
        self.store.put_counters(&counters)?;

        auction.settled = true;
        self.store.put_auction(&auction)?;

        info!(
            "auction for epoch {} settled: {} -> {winner} for {amount}",
            auction.epoch_number, auction.asset
        );
        Ok(Settlement::Won {
            epoch_number: auction.epoch_number,
            asset: auction.asset,
            winner,
            amount,
        })
    }

    async fn pay_out(&self, to: &str, amount: u64, label: &str) {
        if amount == 0 {
            return;
        }
        match self.ledger.authority_transfer(to, amount).await {
            Ok(signature) => info!("paid {label} {amount} to {to} ({signature})"),
            Err(e) => error!("{label} payout of {amount} to {to} failed: {e}"),
        }
    }

    /// Retry every superseded bid that still owes its bidder a refund.
    /// Returns how many were repaid this pass.
    pub async fn retry_refunds(&self) -> Result<u64, HouseError> {
        let mut repaid = 0;
        for mut bid in self.store.pending_refunds()? {
            match self.ledger.authority_transfer(&bid.bidder, bid.amount).await {
                Ok(signature) => {
                    bid.refunded = true;
                    bid.refund_tx = Some(signature);
                    bid.refund_error = None;
                    self.store.put_bid(&bid)?;
                    repaid += 1;
                    info!("retried refund of {} to {} succeeded", bid.amount, bid.bidder);
                }
                Err(e) => {
                    warn!("refund retry for {} still failing: {e}", bid.bidder);
                    bid.refund_error = Some(e.to_string());
                    self.store.put_bid(&bid)?;
                }
            }
        }
        Ok(repaid)
    }

    /// The auction for `epoch_number`, or the most recent one.
    pub fn auction_status(&self, epoch_number: Option<u64>) -> Result<Option<AuctionRow>, HouseError> {
        match epoch_number {
            Some(number) => Ok(self.store.auction(number)?),
            None => Ok(self.store.latest_auction()?),
        }
    }
}

fn share_of(amount: u64, bps: u64) -> u64 {
    ((amount as u128) * (bps as u128) / 10_000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_floor_toward_treasury() {
        assert_eq!(share_of(1_000_000_000, 6_000), 600_000_000);
        assert_eq!(share_of(999, 6_000), 599);
        assert_eq!(share_of(1, 6_000), 0);
    }
}
