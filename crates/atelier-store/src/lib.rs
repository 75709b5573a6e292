//! Persistent bookkeeping for the auction house.
//!
//! The store is the source of truth for competition and financial state; the
//! external ledger is the source of truth for asset custody. Rows are
//! bincode-encoded into sled trees, one tree per entity. Two uniqueness
//! indexes are load-bearing rather than advisory: the free-vote index (at
//! most one free vote per voter/candidate/epoch) and the prediction index
//! (at most one prediction per voter/candidate/epoch). Both are enforced
//! with `compare_and_swap`, which is what makes the check-then-insert safe
//! under concurrent confirm handlers.

pub mod schema;
pub mod store;

pub use schema::{
    AuctionRow, BidRow, CandidateRow, CountersRow, EpochRow, FounderEntryRow, PredictionDirection,
    PredictionRow, VoteRow,
};
pub use store::{Store, StoreError};
