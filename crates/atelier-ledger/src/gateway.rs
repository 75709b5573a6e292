// JSON-RPC client for the Atelier signing gateway.
//
// The gateway holds the authority keypair and fronts the chain RPC node, so
// this client only ever sees serialized drafts, signatures and query results.

use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::{
    AssetInfo, AssetService, Confirmation, LedgerClient, LedgerError, MintDraft, Signature,
    UnsignedTransaction,
};

#[derive(Debug, Clone)]
pub struct GatewayClient {
    url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    message: String,
}

#[derive(Deserialize)]
struct SignatureStatus {
    status: String,
    error: Option<String>,
}

#[derive(Deserialize)]
struct HoldingsResult {
    total: u64,
}

#[derive(Deserialize)]
struct SignatureResult {
    signature: String,
}

impl GatewayClient {
    pub fn new(url: impl Into<String>) -> Self {
        GatewayClient {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }

    async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, LedgerError> {
        let request = RpcRequest { jsonrpc: "2.0", id: 1, method, params };

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let body: RpcResponse<R> = response
            .json()
            .await
            .map_err(|e| LedgerError::Codec(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(LedgerError::Rpc(err.message));
        }

        body.result
            .ok_or_else(|| LedgerError::Codec(format!("{method}: empty result")))
    }
}

#[async_trait]
impl LedgerClient for GatewayClient {
    async fn build_transfer(
        &self,
        from: &str,
        to: &str,
        amount: u64,
    ) -> Result<UnsignedTransaction, LedgerError> {
        debug!("building transfer draft {from} -> {to} ({amount})");
        self.call("buildTransfer", json!({ "from": from, "to": to, "amount": amount }))
            .await
    }

    async fn build_mint(
        &self,
        owner: &str,
        name: &str,
        uri: &str,
        fee: u64,
        fee_recipient: &str,
    ) -> Result<MintDraft, LedgerError> {
        self.call(
            "buildMint",
            json!({
                "owner": owner,
                "name": name,
                "uri": uri,
                "fee": fee,
                "feeRecipient": fee_recipient,
            }),
        )
        .await
    }

    async fn poll_confirmation(&self, signature: &str) -> Result<Confirmation, LedgerError> {
        let status: SignatureStatus = self
            .call("getSignatureStatus", json!({ "signature": signature }))
            .await?;

        if let Some(err) = status.error {
            return Ok(Confirmation::failed(err));
        }
        match status.status.as_str() {
            "confirmed" | "finalized" => Ok(Confirmation::confirmed()),
            _ => Ok(Confirmation::pending()),
        }
    }

    async fn authority_transfer(&self, to: &str, amount: u64) -> Result<Signature, LedgerError> {
        let result: SignatureResult = self
            .call("authorityTransfer", json!({ "to": to, "amount": amount }))
            .await?;
        Ok(result.signature)
    }

    async fn query_holdings(&self, wallet: &str, collection: &str) -> Result<u64, LedgerError> {
        let result: HoldingsResult = self
            .call(
                "searchAssets",
                json!({ "owner": wallet, "collection": collection, "page": 1, "limit": 1000 }),
            )
            .await?;
        Ok(result.total)
    }
}

#[async_trait]
impl AssetService for GatewayClient {
    async fn asset_info(&self, asset: &str) -> Result<AssetInfo, LedgerError> {
        self.call("getAsset", json!({ "asset": asset })).await
    }

    async fn transfer_ownership(
        &self,
        asset: &str,
        new_owner: &str,
    ) -> Result<Signature, LedgerError> {
        let result: SignatureResult = self
            .call("transferAsset", json!({ "asset": asset, "newOwner": new_owner }))
            .await?;
        Ok(result.signature)
    }

    async fn update_attributes(
        &self,
        asset: &str,
        attributes: &[(String, String)],
    ) -> Result<Signature, LedgerError> {
        let attrs: Vec<_> = attributes
            .iter()
            .map(|(key, value)| json!({ "key": key, "value": value }))
            .collect();
        let result: SignatureResult = self
            .call("updateAssetAttributes", json!({ "asset": asset, "attributes": attrs }))
            .await?;
        Ok(result.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_constructors() {
        assert!(Confirmation::confirmed().confirmed);
        assert!(!Confirmation::pending().confirmed);
        let failed = Confirmation::failed("insufficient funds");
        assert!(!failed.confirmed);
        assert_eq!(failed.error.as_deref(), Some("insufficient funds"));
    }

    #[test]
    fn rpc_error_body_is_surfaced() {
        let body: RpcResponse<HoldingsResult> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"no such wallet"}}"#,
        )
        .unwrap();
        assert!(body.result.is_none());
        assert_eq!(body.error.unwrap().message, "no such wallet");
    }
}
