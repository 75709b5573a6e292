//! Ledger access for Atelier.
//!
//! The engine never talks to the chain directly. Everything goes through two
//! seams: [`LedgerClient`] for balance movement (unsigned drafts, confirmation
//! polling, authority-signed transfers, holdings queries) and [`AssetService`]
//! for asset custody (ownership lookup/transfer, attribute updates). The
//! production implementation is [`GatewayClient`], a thin JSON-RPC client for
//! the signing gateway; [`MockLedger`] is a scriptable in-memory double used
//! by the test suites.

pub mod client;
pub mod gateway;
pub mod mock;

pub use client::{
    Address, AssetInfo, AssetService, Confirmation, LedgerClient, LedgerError, MintDraft,
    Signature, UnsignedTransaction,
};
pub use gateway::GatewayClient;
pub use mock::MockLedger;
