// End-to-end lifecycle scenarios over the mock ledger and a temporary store:
// epoch rotation, escalating votes, bidding with refunds, settlement payouts
// and prediction rewards, all driven by manual crank ticks.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};

use atelier_engine::{AuctionHouse, Crank, HouseError, HouseRules};
use atelier_ledger::{AssetService, LedgerClient, MockLedger};
use atelier_store::{PredictionDirection, PredictionRow, Store};

const HOUSE_COLLECTION: &str = "house-collection";
const MEMBER_COLLECTION: &str = "member-collection";

fn test_rules() -> HouseRules {
    HouseRules {
        collection: HOUSE_COLLECTION.to_string(),
        membership_collection: MEMBER_COLLECTION.to_string(),
        vault_wallet: "vault".to_string(),
        treasury_wallet: "treasury".to_string(),
        team_wallet: "team".to_string(),
        growth_wallet: "growth".to_string(),
        epoch_duration_secs: 3_600,
        auction_duration_secs: 3_600,
        ..HouseRules::default()
    }
}

fn build_house() -> (Arc<AuctionHouse>, Arc<MockLedger>) {
    let store = Arc::new(Store::open_temporary().unwrap());
    let ledger = Arc::new(MockLedger::new());
    ledger.confirm_everything();

    let ledger_seam: Arc<dyn LedgerClient> = ledger.clone();
    let asset_seam: Arc<dyn AssetService> = ledger.clone();
    let house = AuctionHouse::new(store, ledger_seam, asset_seam, test_rules()).unwrap();
    (Arc::new(house), ledger)
}

async fn enter_candidate(house: &AuctionHouse, ledger: &MockLedger, asset: &str, creator: &str) {
    ledger.put_asset(asset, creator, HOUSE_COLLECTION, asset, "ipfs://meta");
    house.join_quote(creator, asset).await.unwrap();
    house.join_confirm(creator, asset, "join-sig").await.unwrap();
}

#[tokio::test]
async fn epoch_with_no_votes_is_skipped_and_rolls_forward() {
    let (house, _ledger) = build_house();
    let crank = Crank::new(house.clone(), StdDuration::from_secs(30));

    // Bootstrap, then run the boundary well past the epoch's end.
    crank.tick(Utc::now()).await;
    crank.tick(Utc::now() + Duration::hours(2)).await;

    let store = house.store();
    let first = store.epoch(1).unwrap().unwrap();
    assert!(first.finalized);
    assert!(first.skipped);
    assert!(first.winner_candidate.is_none());

    let current = store.current_epoch().unwrap().unwrap();
    assert_eq!(current.number, 2);

    // Re-running the same tick must not advance again: epoch 2 only just
    // started, so the boundary is a no-op.
    crank.tick(Utc::now() + Duration::hours(2)).await;
    assert_eq!(store.current_epoch().unwrap().unwrap().number, 2);

    // Once epoch 2's own window passes it skips too; numbers stay contiguous.
    crank.tick(Utc::now() + Duration::hours(4)).await;
    assert_eq!(store.current_epoch().unwrap().unwrap().number, 3);
    assert!(store.epoch(2).unwrap().unwrap().skipped);
}

#[tokio::test]
async fn free_votes_are_gated_and_single_use() {
    let (house, ledger) = build_house();
    enter_candidate(&house, &ledger, "piece-1", "creator-1").await;

    // No holdings, no free vote.
    match house.free_vote("stranger", "piece-1").await {
        Err(HouseError::NotEligible) => {}
        other => panic!("unexpected: {other:?}"),
    }

    // A failing holder query denies instead of granting.
    ledger.set_holdings("holder", MEMBER_COLLECTION, 1);
    ledger.fail_holder_queries(true);
    assert!(matches!(
        house.free_vote("holder", "piece-1").await,
        Err(HouseError::NotEligible)
    ));
    ledger.fail_holder_queries(false);

    let receipt = house.free_vote("holder", "piece-1").await.unwrap();
    assert_eq!(receipt.total_votes, 1);
    assert_eq!(receipt.cost, 0);

    assert!(matches!(
        house.free_vote("holder", "piece-1").await,
        Err(HouseError::FreeVoteUsed)
    ));
}

#[tokio::test]
async fn paid_votes_are_repriced_at_confirmation() {
    let (house, ledger) = build_house();
    enter_candidate(&house, &ledger, "piece-1", "creator-1").await;

    // Put the candidate at 9 votes: a batch of three spans the tier
    // boundary, so the quote is 1M + 1M + 1.5M.
    let mut row = house.store().candidate("piece-1").unwrap().unwrap();
    row.votes = 9;
    house.store().put_candidate(&row).unwrap();

    let quote = house.paid_vote_quote("buyer", "piece-1", 3).await.unwrap();
    assert_eq!(quote.cost, 3_500_000);

    // Another batch confirms first; the tally the quote saw is stale.
    house
        .paid_vote_confirm("rival", "piece-1", 1, "rival-sig")
        .await
        .unwrap();

    let receipt = house
        .paid_vote_confirm("buyer", "piece-1", 3, "buyer-sig")
        .await
        .unwrap();
    // Re-priced from tally 10: three tier-1 votes.
    assert_eq!(receipt.cost, 4_500_000);
    assert_eq!(receipt.total_votes, 13);
}

#[tokio::test]
async fn full_auction_lifecycle_pays_the_split_and_the_predictors() {
    let (house, ledger) = build_house();
    let crank = Crank::new(house.clone(), StdDuration::from_secs(30));

    enter_candidate(&house, &ledger, "piece-a", "creator-a").await;
    enter_candidate(&house, &ledger, "piece-b", "creator-b").await;

    ledger.set_holdings("voter-1", MEMBER_COLLECTION, 1);
    ledger.set_holdings("voter-2", MEMBER_COLLECTION, 2);

    house.free_vote("voter-1", "piece-a").await.unwrap();
    house.free_vote("voter-2", "piece-a").await.unwrap();
    house.free_vote("voter-2", "piece-b").await.unwrap();
    house
        .paid_vote_confirm("voter-1", "piece-a", 1, "vote-sig")
        .await
        .unwrap();

    // Epoch boundary: piece-a (3 votes) beats piece-b (1 vote).
    let t1 = Utc::now() + Duration::hours(2);
    crank.tick(t1).await;

    let auction = house.auction_status(Some(1)).unwrap().unwrap();
    assert_eq!(auction.asset, "piece-a");
    assert_eq!(auction.reserve, 200_000_000);
    assert!(house.store().candidate("piece-a").unwrap().unwrap().won);

    // First bid must meet the reserve.
    match house.bid_quote("bidder-1", 1, 100).await {
        Err(HouseError::BidTooLow { minimum, .. }) => assert_eq!(minimum, 200_000_000),
        other => panic!("unexpected: {other:?}"),
    }
    house.bid_quote("bidder-1", 1, 200_000_000).await.unwrap();
    house
        .bid_confirm("bidder-1", 1, 200_000_000, "bid-1")
        .await
        .unwrap();

    // The next bid needs 5% more, re-checked at confirm time.
    match house.bid_confirm("bidder-2", 1, 205_000_000, "bid-2").await {
        Err(HouseError::BidTooLow { minimum, .. }) => assert_eq!(minimum, 210_000_000),
        other => panic!("unexpected: {other:?}"),
    }
    house
        .bid_confirm("bidder-2", 1, 210_000_000, "bid-2")
        .await
        .unwrap();

    // Outbidding refunded bidder-1 immediately.
    assert!(ledger
        .authority_transfers()
        .contains(&("bidder-1".to_string(), 200_000_000)));

    // Settlement tick, well past the auction end.
    crank.tick(Utc::now() + Duration::hours(5)).await;

    let settled = house.auction_status(Some(1)).unwrap().unwrap();
    assert!(settled.settled);

    // Asset custody moved to the winning bidder, with the upgraded status.
    let info = ledger.asset_info("piece-a").await.unwrap();
    assert_eq!(info.owner, "bidder-2");
    assert!(ledger
        .asset_attributes("piece-a")
        .contains(&("Status".to_string(), "Founder Key".to_string())));

    // Revenue split: 60% creator, 10% team, 10% growth.
    let transfers = ledger.authority_transfers();
    assert!(transfers.contains(&("creator-a".to_string(), 126_000_000)));
    assert!(transfers.contains(&("team".to_string(), 21_000_000)));
    assert!(transfers.contains(&("growth".to_string(), 21_000_000)));

    // Founder bookkeeping.
    let entry = house.store().founder_entry("piece-a").unwrap().unwrap();
    assert_eq!(entry.owner, "bidder-2");
    assert_eq!(entry.epoch_won, 1);
    assert_eq!(house.store().counters().unwrap().total_founder_keys, 1);

    // Both piece-a backers were graded correct and share ≤ 10% of the bid.
    let pool = 21_000_000;
    let predictions = house.store().predictions_for_epoch(1).unwrap();
    let mut distributed = 0;
    for prediction in &predictions {
        match prediction.candidate.as_str() {
            "piece-a" => {
                assert_eq!(prediction.correct, Some(true));
                distributed += prediction.reward;
            }
            _ => assert_eq!(prediction.correct, Some(false)),
        }
    }
    assert!(distributed > 0 && distributed <= pool);

    // A second grading pass must not double-pay.
    house.distribute_rewards().unwrap();
    let regraded: u64 = house
        .store()
        .predictions_for_epoch(1)
        .unwrap()
        .iter()
        .map(|p| p.reward)
        .sum();
    assert_eq!(regraded, distributed);

    // Claiming pays once and flags the rows.
    let claim = house.claim_rewards("voter-1").await.unwrap();
    assert!(claim.amount > 0);
    assert!(matches!(
        house.claim_rewards("voter-1").await,
        Err(HouseError::NothingToClaim)
    ));
}

#[tokio::test]
async fn settlement_with_no_bids_returns_the_piece() {
    let (house, ledger) = build_house();
    let crank = Crank::new(house.clone(), StdDuration::from_secs(30));

    enter_candidate(&house, &ledger, "piece-a", "creator-a").await;
    ledger.set_holdings("voter-1", MEMBER_COLLECTION, 1);
    house.free_vote("voter-1", "piece-a").await.unwrap();

    crank.tick(Utc::now() + Duration::hours(2)).await;
    crank.tick(Utc::now() + Duration::hours(5)).await;

    let settled = house.auction_status(Some(1)).unwrap().unwrap();
    assert!(settled.settled);
    assert_eq!(settled.current_bid, 0);

    // The piece went home and nobody was paid.
    let info = ledger.asset_info("piece-a").await.unwrap();
    assert_eq!(info.owner, "creator-a");
    assert!(ledger.authority_transfers().is_empty());
}

#[tokio::test]
async fn superseded_bid_is_eventually_refunded() {
    let (house, ledger) = build_house();
    let crank = Crank::new(house.clone(), StdDuration::from_secs(30));

    enter_candidate(&house, &ledger, "piece-a", "creator-a").await;
    ledger.set_holdings("voter-1", MEMBER_COLLECTION, 1);
    house.free_vote("voter-1", "piece-a").await.unwrap();
    crank.tick(Utc::now() + Duration::hours(2)).await;

    house
        .bid_confirm("bidder-1", 1, 200_000_000, "bid-1")
        .await
        .unwrap();

    // The refund path is down, but the higher bid still lands.
    ledger.fail_authority_transfers(true);
    house
        .bid_confirm("bidder-2", 1, 210_000_000, "bid-2")
        .await
        .unwrap();

    let stranded: Vec<_> = house.store().pending_refunds().unwrap();
    assert_eq!(stranded.len(), 1);
    assert_eq!(stranded[0].bidder, "bidder-1");
    assert!(stranded[0].refund_error.is_some());

    // Still failing: the crank keeps the debt on the books.
    crank.tick(Utc::now()).await;
    assert_eq!(house.store().pending_refunds().unwrap().len(), 1);

    // Ledger recovers; the next tick repays exactly once.
    ledger.fail_authority_transfers(false);
    crank.tick(Utc::now()).await;
    assert!(house.store().pending_refunds().unwrap().is_empty());

    let refunds: Vec<_> = ledger
        .authority_transfers()
        .into_iter()
        .filter(|(to, _)| to == "bidder-1")
        .collect();
    assert_eq!(refunds, vec![("bidder-1".to_string(), 200_000_000)]);

    let bid = house.store().bids_for_auction(1).unwrap();
    let superseded: Vec<_> = bid.iter().filter(|b| b.superseded).collect();
    assert_eq!(superseded.len(), 1);
    assert!(superseded[0].refunded);
}

#[tokio::test]
async fn reward_weights_decay_by_the_hour() {
    let (house, ledger) = build_house();
    let crank = Crank::new(house.clone(), StdDuration::from_secs(30));

    enter_candidate(&house, &ledger, "piece-a", "creator-a").await;
    let store = house.store();
    let epoch_start = store.current_epoch().unwrap().unwrap().start_time;

    // Two backers: one at epoch start, one a full hour in.
    for (voter, offset_minutes) in [("early", 0i64), ("late", 60)] {
        let row = PredictionRow {
            id: store.next_id().unwrap(),
            voter: voter.to_string(),
            candidate: "piece-a".to_string(),
            epoch_number: 1,
            direction: PredictionDirection::Yes,
            submitted_at: epoch_start + Duration::minutes(offset_minutes),
            correct: None,
            reward: 0,
            claimed: false,
            claim_tx: None,
        };
        assert!(store.try_insert_prediction(&row).unwrap());
    }

    ledger.set_holdings("early", MEMBER_COLLECTION, 1);
    house.free_vote("early", "piece-a").await.unwrap();

    crank.tick(Utc::now() + Duration::hours(2)).await;
    house
        .bid_confirm("bidder-1", 1, 200_000_000, "bid-1")
        .await
        .unwrap();
    crank.tick(Utc::now() + Duration::hours(5)).await;

    // Pool = 10% of 200M = 20M. Weights 1.0 and 0.5: the early backer
    // gets twice the late one's reward, floor-rounded, sum within pool.
    let predictions = store.predictions_for_epoch(1).unwrap();
    let early = predictions.iter().find(|p| p.voter == "early").unwrap();
    let late = predictions.iter().find(|p| p.voter == "late").unwrap();

    assert_eq!(early.correct, Some(true));
    assert_eq!(late.correct, Some(true));
    assert_eq!(early.reward, 13_333_333);
    assert_eq!(late.reward, 6_666_666);
    assert!(early.reward + late.reward <= 20_000_000);
}
