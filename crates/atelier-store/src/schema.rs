// Row types, 1:1 with the store trees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A voting round. Exactly one epoch has `finalized = false` at any time;
/// inserting epoch N+1 is the only way epoch N becomes finalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRow {
    pub number: u64,
    pub start_time: DateTime<Utc>,
    pub duration_secs: u64,
    pub finalized: bool,
    pub winner_candidate: Option<String>,
    pub auction_started: bool,
    pub skipped: bool,
}

impl EpochRow {
    /// Wall-clock end of the voting window.
    pub fn due_at(&self) -> DateTime<Utc> {
        self.start_time + chrono::Duration::seconds(self.duration_secs as i64)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.due_at()
    }
}

/// An asset entered into the competition. Votes only ever increase; a
/// withdrawal removes future eligibility without erasing the tally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRow {
    pub asset: String,
    pub creator: String,
    pub name: String,
    pub uri: String,
    pub epoch_joined: u64,
    pub joined_at: DateTime<Utc>,
    pub votes: u64,
    pub won: bool,
    pub withdrawn: bool,
}

impl CandidateRow {
    pub fn eligible(&self) -> bool {
        !self.withdrawn && !self.won
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRow {
    pub id: u64,
    pub voter: String,
    pub candidate: String,
    pub epoch_number: u64,
    pub count: u64,
    pub is_paid: bool,
    /// Total paid for this batch, in base units. Zero for free votes.
    pub cost: u64,
    pub cast_at: DateTime<Utc>,
}

/// Append-only bid history. A bid that is superseded by a higher one must
/// eventually reach `refunded = true`; the crank retries until it does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidRow {
    pub id: u64,
    pub auction_epoch: u64,
    pub bidder: String,
    pub amount: u64,
    pub placed_at: DateTime<Utc>,
    pub superseded: bool,
    pub refunded: bool,
    pub refund_tx: Option<String>,
    pub refund_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionRow {
    pub epoch_number: u64,
    pub asset: String,
    pub creator: String,
    pub reserve: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Zero with no bidder is the valid "no bids yet" state.
    pub current_bid: u64,
    pub current_bidder: Option<String>,
    /// Row id of the current winning bid, so the refund scan can tell
    /// superseded bids from the live one.
    pub current_bid_id: Option<u64>,
    pub bid_count: u64,
    pub settled: bool,
}

impl AuctionRow {
    pub fn ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionDirection {
    /// Backed the candidate to win the epoch.
    Yes,
    /// Passed on the candidate.
    Skip,
}

/// A voter's call on one candidate for one epoch. `correct` stays `None`
/// until the epoch's auction settles and is set exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRow {
    pub id: u64,
    pub voter: String,
    pub candidate: String,
    pub epoch_number: u64,
    pub direction: PredictionDirection,
    pub submitted_at: DateTime<Utc>,
    pub correct: Option<bool>,
    pub reward: u64,
    pub claimed: bool,
    pub claim_tx: Option<String>,
}

/// Record of a settled, won auction: the asset is now a founder key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FounderEntryRow {
    pub asset: String,
    pub creator: String,
    pub owner: String,
    pub epoch_won: u64,
    pub settled_at: DateTime<Utc>,
}

/// House-wide mutable counters and the pause switch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountersRow {
    pub total_minted: u64,
    pub total_founder_keys: u64,
    pub paused: bool,
}
