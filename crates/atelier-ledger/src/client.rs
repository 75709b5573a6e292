// Ledger seam types and traits.
//
// Invariants the engine relies on:
// 1. Building a draft moves no funds and persists nothing.
// 2. A confirmation poll is the only source of truth for a submitted tx.
// 3. Authority-signed calls either return a signature or an error — the
//    gateway never partially applies them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wallet, asset and collection addresses travel as base58 strings.
pub type Address = String;

/// Transaction signature, as returned by the ledger.
pub type Signature = String;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("gateway unreachable: {0}")]
    Transport(String),

    #[error("gateway rejected call: {0}")]
    Rpc(String),

    #[error("malformed gateway response: {0}")]
    Codec(String),

    #[error("asset not found: {0}")]
    AssetNotFound(String),
}

/// An unsigned transaction draft, base64-encoded, for the user's wallet to
/// countersign and submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub transaction: String,
}

/// Draft for minting a new asset. The asset address is derived before the
/// transaction is submitted, so callers can hand it back at confirm time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintDraft {
    pub transaction: String,
    pub asset: Address,
}

/// Result of polling a submitted transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmation {
    pub confirmed: bool,
    pub error: Option<String>,
}

impl Confirmation {
    pub fn confirmed() -> Self {
        Confirmation { confirmed: true, error: None }
    }

    pub fn pending() -> Self {
        Confirmation { confirmed: false, error: None }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Confirmation { confirmed: false, error: Some(reason.into()) }
    }
}

/// On-ledger view of an asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetInfo {
    pub asset: Address,
    pub owner: Address,
    pub collection: Address,
    pub name: String,
    pub uri: String,
}

/// Balance-movement side of the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Build an unsigned transfer draft `from -> to` for `amount` base units.
    async fn build_transfer(
        &self,
        from: &str,
        to: &str,
        amount: u64,
    ) -> Result<UnsignedTransaction, LedgerError>;

    /// Build an unsigned mint draft: new asset owned by `owner`, mint fee
    /// paid to `fee_recipient` in the same transaction.
    async fn build_mint(
        &self,
        owner: &str,
        name: &str,
        uri: &str,
        fee: u64,
        fee_recipient: &str,
    ) -> Result<MintDraft, LedgerError>;

    /// Poll the status of a submitted transaction. Pending is not an error.
    async fn poll_confirmation(&self, signature: &str) -> Result<Confirmation, LedgerError>;

    /// Transfer `amount` base units from the authority wallet to `to`.
    /// Signed and submitted by the gateway; used for refunds and payouts.
    async fn authority_transfer(&self, to: &str, amount: u64) -> Result<Signature, LedgerError>;

    /// Count assets of `collection` held by `wallet`.
    async fn query_holdings(&self, wallet: &str, collection: &str) -> Result<u64, LedgerError>;
}

/// Asset-custody side of the ledger.
#[async_trait]
pub trait AssetService: Send + Sync {
    /// Fetch the current on-ledger state of an asset.
    async fn asset_info(&self, asset: &str) -> Result<AssetInfo, LedgerError>;

    /// Authority-signed ownership transfer of `asset` to `new_owner`.
    async fn transfer_ownership(&self, asset: &str, new_owner: &str)
        -> Result<Signature, LedgerError>;

    /// Authority-signed attribute update on `asset`.
    async fn update_attributes(
        &self,
        asset: &str,
        attributes: &[(String, String)],
    ) -> Result<Signature, LedgerError>;
}
