//! HTTP surface for the auction house.
//!
//! Every handler here is thin: decode the request, call one engine
//! operation, map the result. Domain errors come back as 4xx, ledger/store
//! faults as 5xx; lifecycle transitions never happen on this path.

pub mod rpc;

pub use rpc::routes;
