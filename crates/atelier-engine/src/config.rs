// House rules: every tunable the lifecycle engine consumes.

use serde::{Deserialize, Serialize};

use crate::error::HouseError;

/// Operating parameters of the auction house. Loaded from the node config at
/// startup; amounts are in ledger base units, shares in basis points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseRules {
    /// The house artwork collection. Entered assets must belong to it.
    pub collection: String,
    /// Membership collection whose holders get free votes.
    pub membership_collection: String,
    /// Authority/vault wallet: holds entered assets, signs refunds and payouts.
    pub vault_wallet: String,
    /// Receives fees, paid votes and bids.
    pub treasury_wallet: String,
    pub team_wallet: String,
    pub growth_wallet: String,

    pub mint_fee: u64,
    pub join_fee: u64,
    /// Tier-zero price of one paid vote.
    pub base_vote_price: u64,
    pub reserve_bid: u64,

    pub epoch_duration_secs: u64,
    pub auction_duration_secs: u64,
    pub crank_interval_secs: u64,

    /// Minimum raise over the current bid, 500 = 5%.
    pub min_bid_increment_bps: u64,
    /// Winning-bid share paid to the piece's creator.
    pub creator_share_bps: u64,
    pub team_share_bps: u64,
    pub growth_share_bps: u64,
    /// Winning-bid share distributed across correct predictions.
    pub prediction_pool_bps: u64,

    /// A bid landing inside this window extends the auction to now + window.
    pub anti_snipe_window_secs: u64,
}

impl Default for HouseRules {
    fn default() -> Self {
        HouseRules {
            collection: String::new(),
            membership_collection: String::new(),
            vault_wallet: String::new(),
            treasury_wallet: String::new(),
            team_wallet: String::new(),
            growth_wallet: String::new(),
            mint_fee: 50_000_000,
            join_fee: 10_000_000,
            base_vote_price: 1_000_000,
            reserve_bid: 200_000_000,
            epoch_duration_secs: 86_400,
            auction_duration_secs: 86_400,
            crank_interval_secs: 30,
            min_bid_increment_bps: 500,
            creator_share_bps: 6_000,
            team_share_bps: 1_000,
            growth_share_bps: 1_000,
            prediction_pool_bps: 1_000,
            anti_snipe_window_secs: 300,
        }
    }
}

impl HouseRules {
    pub fn validate(&self) -> Result<(), HouseError> {
        let shares = self.creator_share_bps
            + self.team_share_bps
            + self.growth_share_bps
            + self.prediction_pool_bps;
        if shares > 10_000 {
            return Err(HouseError::InvalidRules(format!(
                "revenue shares exceed 100%: {shares} bps"
            )));
        }
        if self.epoch_duration_secs == 0 || self.auction_duration_secs == 0 {
            return Err(HouseError::InvalidRules("zero duration".to_string()));
        }
        if self.base_vote_price == 0 {
            return Err(HouseError::InvalidRules("zero base vote price".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_are_valid() {
        assert!(HouseRules::default().validate().is_ok());
    }

    #[test]
    fn oversubscribed_shares_rejected() {
        let rules = HouseRules {
            creator_share_bps: 9_000,
            team_share_bps: 2_000,
            ..HouseRules::default()
        };
        assert!(rules.validate().is_err());
    }
}
