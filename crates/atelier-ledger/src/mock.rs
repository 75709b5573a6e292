// Scriptable in-memory ledger double.
//
// Drives the engine test suites: holdings, asset custody and confirmations
// are plain maps, and failure injection flips authority transfers or holder
// queries into errors so refund-retry and fail-closed paths can be exercised.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine as _;
use parking_lot::Mutex;

use crate::client::{
    AssetInfo, AssetService, Confirmation, LedgerClient, LedgerError, MintDraft, Signature,
    UnsignedTransaction,
};

#[derive(Debug, Clone)]
struct MockAsset {
    owner: String,
    collection: String,
    name: String,
    uri: String,
    attributes: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct MockState {
    holdings: HashMap<(String, String), u64>,
    assets: HashMap<String, MockAsset>,
    confirmations: HashMap<String, Confirmation>,
    confirm_all: bool,
    fail_authority_transfers: bool,
    fail_holder_queries: bool,
    authority_transfers: Vec<(String, u64)>,
    next_signature: u64,
}

#[derive(Debug, Default)]
pub struct MockLedger {
    state: Mutex<MockState>,
}

impl MockLedger {
    pub fn new() -> Self {
        MockLedger::default()
    }

    /// Treat every polled signature as confirmed.
    pub fn confirm_everything(&self) {
        self.state.lock().confirm_all = true;
    }

    /// Script the status for one specific signature.
    pub fn set_confirmation(&self, signature: &str, confirmation: Confirmation) {
        self.state
            .lock()
            .confirmations
            .insert(signature.to_string(), confirmation);
    }

    pub fn set_holdings(&self, wallet: &str, collection: &str, count: u64) {
        self.state
            .lock()
            .holdings
            .insert((wallet.to_string(), collection.to_string()), count);
    }

    pub fn put_asset(&self, asset: &str, owner: &str, collection: &str, name: &str, uri: &str) {
        self.state.lock().assets.insert(
            asset.to_string(),
            MockAsset {
                owner: owner.to_string(),
                collection: collection.to_string(),
                name: name.to_string(),
                uri: uri.to_string(),
                attributes: Vec::new(),
            },
        );
    }

    pub fn fail_authority_transfers(&self, fail: bool) {
        self.state.lock().fail_authority_transfers = fail;
    }

    pub fn fail_holder_queries(&self, fail: bool) {
        self.state.lock().fail_holder_queries = fail;
    }

    /// Every authority transfer recorded so far, as `(to, amount)`.
    pub fn authority_transfers(&self) -> Vec<(String, u64)> {
        self.state.lock().authority_transfers.clone()
    }

    pub fn asset_attributes(&self, asset: &str) -> Vec<(String, String)> {
        self.state
            .lock()
            .assets
            .get(asset)
            .map(|a| a.attributes.clone())
            .unwrap_or_default()
    }

    fn next_signature(state: &mut MockState) -> Signature {
        state.next_signature += 1;
        format!("mock-sig-{}", state.next_signature)
    }

    fn encode_draft(kind: &str, detail: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(format!("{kind}:{detail}"))
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn build_transfer(
        &self,
        from: &str,
        to: &str,
        amount: u64,
    ) -> Result<UnsignedTransaction, LedgerError> {
        Ok(UnsignedTransaction {
            transaction: Self::encode_draft("transfer", &format!("{from}->{to}:{amount}")),
        })
    }

    async fn build_mint(
        &self,
        owner: &str,
        name: &str,
        uri: &str,
        _fee: u64,
        _fee_recipient: &str,
    ) -> Result<MintDraft, LedgerError> {
        let mut state = self.state.lock();
        let asset = format!("mock-asset-{}", state.assets.len() + 1);
        // The draft asset appears on-ledger immediately so confirm-side
        // verification can see it; tests override the collection as needed.
        state.assets.insert(
            asset.clone(),
            MockAsset {
                owner: owner.to_string(),
                collection: String::new(),
                name: name.to_string(),
                uri: uri.to_string(),
                attributes: Vec::new(),
            },
        );
        Ok(MintDraft {
            transaction: Self::encode_draft("mint", &asset),
            asset,
        })
    }

    async fn poll_confirmation(&self, signature: &str) -> Result<Confirmation, LedgerError> {
        let state = self.state.lock();
        if let Some(confirmation) = state.confirmations.get(signature) {
            return Ok(confirmation.clone());
        }
        if state.confirm_all {
            return Ok(Confirmation::confirmed());
        }
        Ok(Confirmation::pending())
    }

    async fn authority_transfer(&self, to: &str, amount: u64) -> Result<Signature, LedgerError> {
        let mut state = self.state.lock();
        if state.fail_authority_transfers {
            return Err(LedgerError::Rpc("injected authority transfer failure".into()));
        }
        state.authority_transfers.push((to.to_string(), amount));
        Ok(Self::next_signature(&mut state))
    }

    async fn query_holdings(&self, wallet: &str, collection: &str) -> Result<u64, LedgerError> {
        let state = self.state.lock();
        if state.fail_holder_queries {
            return Err(LedgerError::Transport("injected holder query failure".into()));
        }
        Ok(state
            .holdings
            .get(&(wallet.to_string(), collection.to_string()))
            .copied()
            .unwrap_or(0))
    }
}

#[async_trait]
impl AssetService for MockLedger {
    async fn asset_info(&self, asset: &str) -> Result<AssetInfo, LedgerError> {
        let state = self.state.lock();
        let found = state
            .assets
            .get(asset)
            .ok_or_else(|| LedgerError::AssetNotFound(asset.to_string()))?;
        Ok(AssetInfo {
            asset: asset.to_string(),
            owner: found.owner.clone(),
            collection: found.collection.clone(),
            name: found.name.clone(),
            uri: found.uri.clone(),
        })
    }

    async fn transfer_ownership(
        &self,
        asset: &str,
        new_owner: &str,
    ) -> Result<Signature, LedgerError> {
        let mut state = self.state.lock();
        if state.fail_authority_transfers {
            return Err(LedgerError::Rpc("injected custody transfer failure".into()));
        }
        match state.assets.get_mut(asset) {
            Some(found) => {
                found.owner = new_owner.to_string();
            }
            None => return Err(LedgerError::AssetNotFound(asset.to_string())),
        }
        Ok(Self::next_signature(&mut state))
    }

    async fn update_attributes(
        &self,
        asset: &str,
        attributes: &[(String, String)],
    ) -> Result<Signature, LedgerError> {
        let mut state = self.state.lock();
        match state.assets.get_mut(asset) {
            Some(found) => {
                found.attributes = attributes.to_vec();
            }
            None => return Err(LedgerError::AssetNotFound(asset.to_string())),
        }
        Ok(Self::next_signature(&mut state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn holdings_default_to_zero_and_can_be_scripted() {
        let ledger = MockLedger::new();
        assert_eq!(ledger.query_holdings("w1", "c1").await.unwrap(), 0);

        ledger.set_holdings("w1", "c1", 3);
        assert_eq!(ledger.query_holdings("w1", "c1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn injected_transfer_failure_then_recovery() {
        let ledger = MockLedger::new();
        ledger.fail_authority_transfers(true);
        assert!(ledger.authority_transfer("w1", 100).await.is_err());

        ledger.fail_authority_transfers(false);
        let sig = ledger.authority_transfer("w1", 100).await.unwrap();
        assert!(sig.starts_with("mock-sig-"));
        assert_eq!(ledger.authority_transfers(), vec![("w1".to_string(), 100)]);
    }

    #[tokio::test]
    async fn custody_transfer_moves_ownership() {
        let ledger = MockLedger::new();
        ledger.put_asset("a1", "creator", "col", "Piece #1", "ipfs://x");
        ledger.transfer_ownership("a1", "vault").await.unwrap();
        let info = ledger.asset_info("a1").await.unwrap();
        assert_eq!(info.owner, "vault");
    }
}
