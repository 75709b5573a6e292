// Sled-backed store. One tree per entity, bincode row codecs, big-endian
// u64 keys so iteration order matches numeric order.
//
// There are deliberately no cross-tree transactions: the external ledger
// cannot participate in one, so correctness rests on the uniqueness indexes
// and on "does a row with this property already exist" guards instead.

use chrono::{DateTime, Utc};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Tree;
use thiserror::Error;

use crate::schema::{
    AuctionRow, BidRow, CandidateRow, CountersRow, EpochRow, FounderEntryRow, PredictionRow,
    VoteRow,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage engine error: {0}")]
    Backend(#[from] sled::Error),

    #[error("row codec error: {0}")]
    Codec(String),

    #[error("row not found: {0}")]
    NotFound(String),
}

const COUNTERS_KEY: &[u8] = b"counters";

fn encode<T: Serialize>(row: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(row).map_err(|e| StoreError::Codec(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Codec(e.to_string()))
}

/// Composite key for the per-(voter, candidate, epoch) uniqueness indexes.
fn triple_key(voter: &str, candidate: &str, epoch: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(voter.len() + candidate.len() + 10);
    key.extend_from_slice(voter.as_bytes());
    key.push(0);
    key.extend_from_slice(candidate.as_bytes());
    key.push(0);
    key.extend_from_slice(&epoch.to_be_bytes());
    key
}

pub struct Store {
    db: sled::Db,
    epochs: Tree,
    candidates: Tree,
    votes: Tree,
    free_vote_index: Tree,
    bids: Tree,
    auctions: Tree,
    predictions: Tree,
    prediction_index: Tree,
    founder_entries: Tree,
    meta: Tree,
}

impl Store {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    /// Throwaway store for tests and local experiments.
    pub fn open_temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        Ok(Store {
            epochs: db.open_tree("epochs")?,
            candidates: db.open_tree("candidates")?,
            votes: db.open_tree("votes")?,
            free_vote_index: db.open_tree("free_vote_index")?,
            bids: db.open_tree("bids")?,
            auctions: db.open_tree("auctions")?,
            predictions: db.open_tree("predictions")?,
            prediction_index: db.open_tree("prediction_index")?,
            founder_entries: db.open_tree("founder_entries")?,
            meta: db.open_tree("meta")?,
            db,
        })
    }

    pub fn next_id(&self) -> Result<u64, StoreError> {
        Ok(self.db.generate_id()?)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    // ── Epochs ──────────────────────────────────────────────────────────

    pub fn put_epoch(&self, epoch: &EpochRow) -> Result<(), StoreError> {
        self.epochs
            .insert(epoch.number.to_be_bytes(), encode(epoch)?)?;
        Ok(())
    }

    pub fn epoch(&self, number: u64) -> Result<Option<EpochRow>, StoreError> {
        match self.epochs.get(number.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The latest epoch row, which is the only one that can be non-finalized.
    pub fn latest_epoch(&self) -> Result<Option<EpochRow>, StoreError> {
        match self.epochs.last()? {
            Some((_, bytes)) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The current (non-finalized) epoch, if one exists.
    pub fn current_epoch(&self) -> Result<Option<EpochRow>, StoreError> {
        Ok(self.latest_epoch()?.filter(|e| !e.finalized))
    }

    pub fn all_epochs(&self) -> Result<Vec<EpochRow>, StoreError> {
        let mut rows = Vec::new();
        for entry in self.epochs.iter() {
            let (_, bytes) = entry?;
            rows.push(decode(&bytes)?);
        }
        Ok(rows)
    }

    // ── Candidates ──────────────────────────────────────────────────────

    pub fn put_candidate(&self, candidate: &CandidateRow) -> Result<(), StoreError> {
        self.candidates
            .insert(candidate.asset.as_bytes(), encode(candidate)?)?;
        Ok(())
    }

    pub fn candidate(&self, asset: &str) -> Result<Option<CandidateRow>, StoreError> {
        match self.candidates.get(asset.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn require_candidate(&self, asset: &str) -> Result<CandidateRow, StoreError> {
        self.candidate(asset)?
            .ok_or_else(|| StoreError::NotFound(format!("candidate {asset}")))
    }

    pub fn all_candidates(&self) -> Result<Vec<CandidateRow>, StoreError> {
        let mut rows = Vec::new();
        for entry in self.candidates.iter() {
            let (_, bytes) = entry?;
            rows.push(decode(&bytes)?);
        }
        Ok(rows)
    }

    /// Candidates still in the running: not withdrawn, not past winners.
    pub fn eligible_candidates(&self) -> Result<Vec<CandidateRow>, StoreError> {
        Ok(self
            .all_candidates()?
            .into_iter()
            .filter(|c| c.eligible())
            .collect())
    }

    /// Atomically add `count` votes to a candidate and return the new tally.
    pub fn add_votes(&self, asset: &str, count: u64) -> Result<u64, StoreError> {
        let updated = self.candidates.update_and_fetch(asset.as_bytes(), |old| {
            let bytes = old?;
            match bincode::deserialize::<CandidateRow>(bytes) {
                Ok(mut row) => {
                    row.votes = row.votes.saturating_add(count);
                    bincode::serialize(&row).ok().or_else(|| Some(bytes.to_vec()))
                }
                // Leave an undecodable row untouched rather than destroy it.
                Err(_) => Some(bytes.to_vec()),
            }
        })?;

        match updated {
            Some(bytes) => Ok(decode::<CandidateRow>(&bytes)?.votes),
            None => Err(StoreError::NotFound(format!("candidate {asset}"))),
        }
    }

    // ── Votes ───────────────────────────────────────────────────────────

    pub fn put_vote(&self, vote: &VoteRow) -> Result<(), StoreError> {
        self.votes.insert(vote.id.to_be_bytes(), encode(vote)?)?;
        Ok(())
    }

    /// Insert a free vote iff the voter has not already used their free vote
    /// for this candidate and epoch. Returns false when the index slot was
    /// already taken. The `compare_and_swap` is the uniqueness constraint —
    /// concurrent confirms race to the same key and exactly one wins.
    pub fn try_insert_free_vote(&self, vote: &VoteRow) -> Result<bool, StoreError> {
        let key = triple_key(&vote.voter, &vote.candidate, vote.epoch_number);
        let claimed = self
            .free_vote_index
            .compare_and_swap(key, None as Option<&[u8]>, Some(vote.id.to_be_bytes().to_vec()))?
            .is_ok();
        if !claimed {
            return Ok(false);
        }
        self.put_vote(vote)?;
        Ok(true)
    }

    // ── Bids ────────────────────────────────────────────────────────────

    pub fn put_bid(&self, bid: &BidRow) -> Result<(), StoreError> {
        self.bids.insert(bid.id.to_be_bytes(), encode(bid)?)?;
        Ok(())
    }

    pub fn bid(&self, id: u64) -> Result<Option<BidRow>, StoreError> {
        match self.bids.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn bids_for_auction(&self, epoch_number: u64) -> Result<Vec<BidRow>, StoreError> {
        let mut rows = Vec::new();
        for entry in self.bids.iter() {
            let (_, bytes) = entry?;
            let row: BidRow = decode(&bytes)?;
            if row.auction_epoch == epoch_number {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Superseded bids that still owe the bidder their money back.
    pub fn pending_refunds(&self) -> Result<Vec<BidRow>, StoreError> {
        let mut rows = Vec::new();
        for entry in self.bids.iter() {
            let (_, bytes) = entry?;
            let row: BidRow = decode(&bytes)?;
            if row.superseded && !row.refunded {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    // ── Auctions ────────────────────────────────────────────────────────

    pub fn put_auction(&self, auction: &AuctionRow) -> Result<(), StoreError> {
        self.auctions
            .insert(auction.epoch_number.to_be_bytes(), encode(auction)?)?;
        Ok(())
    }

    pub fn auction(&self, epoch_number: u64) -> Result<Option<AuctionRow>, StoreError> {
        match self.auctions.get(epoch_number.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn latest_auction(&self) -> Result<Option<AuctionRow>, StoreError> {
        match self.auctions.last()? {
            Some((_, bytes)) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Unsettled auctions whose end time has passed, in epoch order.
    pub fn due_auctions(&self, now: DateTime<Utc>) -> Result<Vec<AuctionRow>, StoreError> {
        let mut rows = Vec::new();
        for entry in self.auctions.iter() {
            let (_, bytes) = entry?;
            let row: AuctionRow = decode(&bytes)?;
            if !row.settled && row.ended(now) {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Settled auctions, in epoch order.
    pub fn settled_auctions(&self) -> Result<Vec<AuctionRow>, StoreError> {
        let mut rows = Vec::new();
        for entry in self.auctions.iter() {
            let (_, bytes) = entry?;
            let row: AuctionRow = decode(&bytes)?;
            if row.settled {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Any not-yet-settled auction holding this asset.
    pub fn open_auction_for_asset(&self, asset: &str) -> Result<Option<AuctionRow>, StoreError> {
        for entry in self.auctions.iter() {
            let (_, bytes) = entry?;
            let row: AuctionRow = decode(&bytes)?;
            if !row.settled && row.asset == asset {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    // ── Predictions ─────────────────────────────────────────────────────

    pub fn put_prediction(&self, prediction: &PredictionRow) -> Result<(), StoreError> {
        self.predictions
            .insert(prediction.id.to_be_bytes(), encode(prediction)?)?;
        Ok(())
    }

    /// Insert iff this voter has no prediction on this candidate for this
    /// epoch yet. Same compare-and-swap uniqueness as free votes.
    pub fn try_insert_prediction(&self, prediction: &PredictionRow) -> Result<bool, StoreError> {
        let key = triple_key(
            &prediction.voter,
            &prediction.candidate,
            prediction.epoch_number,
        );
        let claimed = self
            .prediction_index
            .compare_and_swap(
                key,
                None as Option<&[u8]>,
                Some(prediction.id.to_be_bytes().to_vec()),
            )?
            .is_ok();
        if !claimed {
            return Ok(false);
        }
        self.put_prediction(prediction)?;
        Ok(true)
    }

    pub fn prediction_for(
        &self,
        voter: &str,
        candidate: &str,
        epoch_number: u64,
    ) -> Result<Option<PredictionRow>, StoreError> {
        let key = triple_key(voter, candidate, epoch_number);
        let id_bytes = match self.prediction_index.get(key)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let mut id = [0u8; 8];
        if id_bytes.len() != 8 {
            warn!("prediction index entry with malformed id for voter {voter}");
            return Ok(None);
        }
        id.copy_from_slice(&id_bytes);
        match self.predictions.get(id)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn predictions_for_epoch(&self, epoch_number: u64) -> Result<Vec<PredictionRow>, StoreError> {
        let mut rows = Vec::new();
        for entry in self.predictions.iter() {
            let (_, bytes) = entry?;
            let row: PredictionRow = decode(&bytes)?;
            if row.epoch_number == epoch_number {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    pub fn predictions_for_voter(&self, voter: &str) -> Result<Vec<PredictionRow>, StoreError> {
        let mut rows = Vec::new();
        for entry in self.predictions.iter() {
            let (_, bytes) = entry?;
            let row: PredictionRow = decode(&bytes)?;
            if row.voter == voter {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    // ── Founder entries ─────────────────────────────────────────────────

    pub fn put_founder_entry(&self, entry: &FounderEntryRow) -> Result<(), StoreError> {
        self.founder_entries
            .insert(entry.asset.as_bytes(), encode(entry)?)?;
        Ok(())
    }

    pub fn founder_entry(&self, asset: &str) -> Result<Option<FounderEntryRow>, StoreError> {
        match self.founder_entries.get(asset.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    // ── Counters ────────────────────────────────────────────────────────

    pub fn counters(&self) -> Result<CountersRow, StoreError> {
        match self.meta.get(COUNTERS_KEY)? {
            Some(bytes) => decode(&bytes),
            None => Ok(CountersRow::default()),
        }
    }

    pub fn put_counters(&self, counters: &CountersRow) -> Result<(), StoreError> {
        self.meta.insert(COUNTERS_KEY, encode(counters)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PredictionDirection;

    fn vote(store: &Store, voter: &str, candidate: &str, epoch: u64) -> VoteRow {
        VoteRow {
            id: store.next_id().unwrap(),
            voter: voter.to_string(),
            candidate: candidate.to_string(),
            epoch_number: epoch,
            count: 1,
            is_paid: false,
            cost: 0,
            cast_at: Utc::now(),
        }
    }

    fn candidate(asset: &str, epoch: u64) -> CandidateRow {
        CandidateRow {
            asset: asset.to_string(),
            creator: "creator".to_string(),
            name: format!("Piece {asset}"),
            uri: "ipfs://meta".to_string(),
            epoch_joined: epoch,
            joined_at: Utc::now(),
            votes: 0,
            won: false,
            withdrawn: false,
        }
    }

    #[test]
    fn free_vote_unique_per_voter_candidate_epoch() {
        let store = Store::open_temporary().unwrap();

        let first = vote(&store, "alice", "asset-1", 1);
        assert!(store.try_insert_free_vote(&first).unwrap());

        let dup = vote(&store, "alice", "asset-1", 1);
        assert!(!store.try_insert_free_vote(&dup).unwrap());

        // Different epoch is a fresh slot.
        let next_epoch = vote(&store, "alice", "asset-1", 2);
        assert!(store.try_insert_free_vote(&next_epoch).unwrap());
    }

    #[test]
    fn add_votes_returns_new_tally() {
        let store = Store::open_temporary().unwrap();
        store.put_candidate(&candidate("asset-1", 1)).unwrap();

        assert_eq!(store.add_votes("asset-1", 3).unwrap(), 3);
        assert_eq!(store.add_votes("asset-1", 2).unwrap(), 5);
        assert!(store.add_votes("missing", 1).is_err());
    }

    #[test]
    fn current_epoch_is_latest_non_finalized() {
        let store = Store::open_temporary().unwrap();
        let mut first = EpochRow {
            number: 1,
            start_time: Utc::now(),
            duration_secs: 3600,
            finalized: false,
            winner_candidate: None,
            auction_started: false,
            skipped: false,
        };
        store.put_epoch(&first).unwrap();
        assert_eq!(store.current_epoch().unwrap().unwrap().number, 1);

        first.finalized = true;
        store.put_epoch(&first).unwrap();
        let mut second = first.clone();
        second.number = 2;
        second.finalized = false;
        store.put_epoch(&second).unwrap();

        assert_eq!(store.current_epoch().unwrap().unwrap().number, 2);
    }

    #[test]
    fn due_auctions_filters_on_settlement_and_time() {
        let store = Store::open_temporary().unwrap();
        let now = Utc::now();
        let base = AuctionRow {
            epoch_number: 1,
            asset: "asset-1".to_string(),
            creator: "creator".to_string(),
            reserve: 100,
            start_time: now - chrono::Duration::hours(2),
            end_time: now - chrono::Duration::hours(1),
            current_bid: 0,
            current_bidder: None,
            current_bid_id: None,
            bid_count: 0,
            settled: false,
        };
        store.put_auction(&base).unwrap();

        let mut live = base.clone();
        live.epoch_number = 2;
        live.end_time = now + chrono::Duration::hours(1);
        store.put_auction(&live).unwrap();

        let mut settled = base.clone();
        settled.epoch_number = 3;
        settled.settled = true;
        store.put_auction(&settled).unwrap();

        let due = store.due_auctions(now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].epoch_number, 1);
    }

    #[test]
    fn prediction_index_round_trip() {
        let store = Store::open_temporary().unwrap();
        let row = PredictionRow {
            id: store.next_id().unwrap(),
            voter: "bob".to_string(),
            candidate: "asset-1".to_string(),
            epoch_number: 4,
            direction: PredictionDirection::Yes,
            submitted_at: Utc::now(),
            correct: None,
            reward: 0,
            claimed: false,
            claim_tx: None,
        };
        assert!(store.try_insert_prediction(&row).unwrap());
        assert!(!store.try_insert_prediction(&row).unwrap());

        let found = store.prediction_for("bob", "asset-1", 4).unwrap().unwrap();
        assert_eq!(found.id, row.id);
        assert!(found.correct.is_none());
    }
}
