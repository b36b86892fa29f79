use serde::{Deserialize, Serialize};

/// Account state as of the latest finalised period, returned by
/// `helix_getAccount`. Balances are `u128`-range values rendered as decimal
/// strings (§6/§11's DTO convention), since `U256` does not round-trip
/// losslessly through a JSON number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcAccount {
    pub address: String,
    pub nonce: u64,
    pub balance: String,
    pub code_hash: String,
    pub code_size: u64,
    pub storage_root: String,
}

/// A single storage slot, returned by `helix_getStorageAt`.
///
/// Written by a call into a code-bearing account whose data is a sequence of
/// 64-byte `(slot, value)` pairs (`helix-state::executor::SimpleStateExecutor`
/// has no bytecode interpreter, so this is the one unambiguous way calldata
/// maps onto storage). An address with no such call, or a slot it never
/// targeted, reads back as the zero word.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcStorageValue {
    pub value: String,
}

/// A finalised period's header, returned by `helix_getHeaderByPeriod` /
/// `helix_getHeaderByHash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcHeader {
    pub period: u64,
    pub hash: String,
    pub parent_hash: String,
    pub author: String,
    pub timestamp: i64,
    pub transactions_root: String,
    pub receipts_root: String,
    pub log_bloom: String,
    pub gas_used: u64,
    pub gas_limit: u64,
}

/// A transaction, returned by `helix_getTransactionByHash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcTransaction {
    pub hash: String,
    pub sender: String,
    pub to: Option<String>,
    pub nonce: u64,
    pub gas_price: String,
    pub gas_limit: u64,
    pub value: String,
    pub data: String,
    pub period: Option<u64>,
}

/// One log entry within an `RpcReceipt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

/// A transaction receipt, returned by `helix_getTransactionReceipt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcReceipt {
    pub transaction_hash: String,
    pub period: u64,
    pub status: u8,
    pub gas_used: u64,
    pub cumulative_gas_used: u64,
    pub contract_address: Option<String>,
    pub logs: Vec<RpcLog>,
}

/// A filter for `helix_getLogs`: matches `addresses` (empty = any address)
/// and `topics` (empty = any topic), within `[from_period, to_period]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcLogFilter {
    pub from_period: u64,
    pub to_period: u64,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// A matched log, returned by `helix_getLogs`, annotated with its origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcLogEntry {
    pub period: u64,
    pub transaction_hash: String,
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

/// PBFT validator eligibility/weight, returned by `helix_getEligibility`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcEligibility {
    pub address: String,
    pub is_validator: bool,
    pub stake: u64,
}

/// Genesis / protocol constants, returned by `helix_getGenesisInfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcGenesisInfo {
    pub chain_id: u64,
    pub genesis_hash: String,
    pub gas_limit: u64,
}

/// Node / protocol version, returned by `helix_getVersion`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcVersionInfo {
    pub node_version: String,
    pub protocol_version: u32,
}

/// P2P network identity, returned by `helix_getNetworkInfo`. The full
/// libp2p multiaddress (including the trailing `/p2p/<peer id>`) a peer can
/// dial to bootstrap against this node; empty if the node has not finished
/// starting its P2P network yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcNetworkInfo {
    pub peer_multiaddr: String,
}
