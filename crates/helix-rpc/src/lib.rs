//! helix-rpc
//!
//! JSON-RPC 2.0 query facade for Helix nodes (§4.8, §11).
//!
//! Namespace: "helix". Read-only: latest/by-period/by-hash headers,
//! accounts, code, transactions, receipts, log search, validator
//! eligibility. The sole write path is `helix_sendTransaction`, which
//! routes into the node's pool rather than touching the store directly.

pub mod api;
pub mod cache;
pub mod error;
pub mod server;
pub mod types;

pub use api::{HelixApiClient, HelixApiServer};
pub use server::{RpcServer, RpcServerState};
pub use types::{
    RpcAccount, RpcEligibility, RpcGenesisInfo, RpcHeader, RpcLog, RpcLogEntry, RpcLogFilter,
    RpcNetworkInfo, RpcReceipt, RpcStorageValue, RpcTransaction, RpcVersionInfo,
};
