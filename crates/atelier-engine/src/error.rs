// Error taxonomy for the lifecycle engine.
//
// Quote-time validation and confirmation mismatches are the caller's problem
// (4xx); ledger and store failures are infrastructure (5xx). Refund and
// settlement side-effect failures never surface here — they are logged and
// retried by the crank.

use atelier_ledger::LedgerError;
use atelier_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HouseError {
    // ── Quote-time validation ───────────────────────────────────────────
    #[error("auction house is paused")]
    Paused,

    #[error("unknown candidate: {0}")]
    UnknownCandidate(String),

    #[error("candidate no longer in the running: {0}")]
    CandidateNotEligible(String),

    #[error("asset already entered into the competition")]
    AlreadyEntered,

    #[error("caller does not own this asset")]
    NotAssetOwner,

    #[error("asset is not part of the house collection")]
    WrongCollection,

    #[error("vote count must be positive")]
    InvalidVoteCount,

    #[error("not eligible for a free vote")]
    NotEligible,

    #[error("free vote already used for this candidate this epoch")]
    FreeVoteUsed,

    #[error("already predicted on this candidate this epoch")]
    AlreadyPredicted,

    #[error("no open auction for epoch {0}")]
    NoOpenAuction(u64),

    #[error("auction has ended")]
    AuctionEnded,

    #[error("bid too low: offered {offered}, minimum {minimum}")]
    BidTooLow { offered: u64, minimum: u64 },

    #[error("cannot withdraw a past winner")]
    WithdrawWinner,

    #[error("cannot withdraw while the piece is up for auction")]
    WithdrawDuringAuction,

    #[error("nothing to claim")]
    NothingToClaim,

    #[error("arithmetic overflow in price computation")]
    Overflow,

    #[error("invalid house rules: {0}")]
    InvalidRules(String),

    // ── Confirmation mismatches ─────────────────────────────────────────
    #[error("transaction not confirmed on ledger")]
    NotConfirmed,

    #[error("transaction failed on ledger: {0}")]
    LedgerRejected(String),

    // ── Infrastructure ──────────────────────────────────────────────────
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HouseError {
    /// True when the caller can fix the request (maps to 4xx); false for
    /// infrastructure faults (5xx).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, HouseError::Ledger(_) | HouseError::Store(_))
    }
}
