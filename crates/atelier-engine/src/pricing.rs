// Vote pricing policy and bid minimums. Pure functions, checked arithmetic.

use crate::error::HouseError;

/// Paid-vote prices are constant within a bucket of this many votes.
pub const VOTES_PER_TIER: u64 = 10;

/// Price of the next paid vote for a candidate sitting at `tally` votes.
///
/// The price multiplies by 3/2 per completed tier of ten votes:
/// `base * 3^tier / 2^tier`, integer-truncated.
pub fn vote_price(base_price: u64, tally: u64) -> Result<u64, HouseError> {
    let tier = u32::try_from(tally / VOTES_PER_TIER).map_err(|_| HouseError::Overflow)?;
    let num = 3u128.checked_pow(tier).ok_or(HouseError::Overflow)?;
    let den = 2u128.checked_pow(tier).ok_or(HouseError::Overflow)?;
    let price = (base_price as u128)
        .checked_mul(num)
        .ok_or(HouseError::Overflow)?
        / den;
    u64::try_from(price).map_err(|_| HouseError::Overflow)
}

/// Cost of buying `count` paid votes at once, summing the per-unit price
/// across the marginal tiers. A batch spanning a tier boundary is mix-priced.
pub fn batch_cost(base_price: u64, tally: u64, count: u64) -> Result<u64, HouseError> {
    let mut total: u64 = 0;
    for i in 0..count {
        let marginal_tally = tally.checked_add(i).ok_or(HouseError::Overflow)?;
        total = total
            .checked_add(vote_price(base_price, marginal_tally)?)
            .ok_or(HouseError::Overflow)?;
    }
    Ok(total)
}

/// Minimum acceptable bid: the reserve until a first bid lands, then the
/// greater of the reserve and the current bid plus the increment.
pub fn min_bid(reserve: u64, current_bid: u64, increment_bps: u64) -> u64 {
    if current_bid == 0 {
        return reserve;
    }
    let raised = (current_bid as u128) * (10_000 + increment_bps as u128) / 10_000;
    let raised = u64::try_from(raised).unwrap_or(u64::MAX);
    raised.max(reserve)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_zero_is_base_price() {
        for tally in 0..10 {
            assert_eq!(vote_price(1_000_000, tally).unwrap(), 1_000_000);
        }
    }

    #[test]
    fn price_escalates_by_three_halves_per_tier() {
        assert_eq!(vote_price(1_000_000, 10).unwrap(), 1_500_000);
        assert_eq!(vote_price(1_000_000, 20).unwrap(), 2_250_000);
        assert_eq!(vote_price(1_000_000, 30).unwrap(), 3_375_000);
    }

    #[test]
    fn batch_spanning_tier_boundary_is_mix_priced() {
        // At 9 votes, buying 3: two at tier 0, one at tier 1.
        assert_eq!(batch_cost(1_000_000, 9, 3).unwrap(), 3_500_000);
    }

    #[test]
    fn batch_cost_is_path_independent() {
        // Buying 25 votes in one batch costs the same as any split into
        // consecutive purchases starting from the same tally.
        let base = 777_777;
        let whole = batch_cost(base, 4, 25).unwrap();
        let split = batch_cost(base, 4, 7).unwrap()
            + batch_cost(base, 11, 11).unwrap()
            + batch_cost(base, 22, 7).unwrap();
        assert_eq!(whole, split);
    }

    #[test]
    fn first_bid_needs_only_the_reserve() {
        assert_eq!(min_bid(200_000_000, 0, 500), 200_000_000);
    }

    #[test]
    fn subsequent_bids_need_five_percent_more() {
        assert_eq!(min_bid(200_000_000, 200_000_000, 500), 210_000_000);
    }

    #[test]
    fn reserve_floors_the_minimum() {
        // A current bid far below the reserve cannot lower the bar.
        assert_eq!(min_bid(200_000_000, 1_000, 500), 200_000_000);
    }
}
