use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use crate::types::{
    RpcAccount, RpcEligibility, RpcGenesisInfo, RpcHeader, RpcLogEntry, RpcLogFilter,
    RpcNetworkInfo, RpcReceipt, RpcStorageValue, RpcTransaction, RpcVersionInfo,
};

/// Helix JSON-RPC 2.0 API definition.
///
/// All method names are prefixed with "helix_" via `namespace = "helix"`.
/// This is the read-only query facade of §4.8 plus transaction submission,
/// the sole write path (§6/§11) — everything else about the node (peer
/// wire protocol, consensus) has no RPC surface.
#[rpc(client, server, namespace = "helix")]
pub trait HelixApi {
    /// The latest finalised period.
    #[method(name = "getLatestPeriod")]
    async fn get_latest_period(&self) -> RpcResult<u64>;

    /// A finalised period's header, by period number.
    #[method(name = "getHeaderByPeriod")]
    async fn get_header_by_period(&self, period: u64) -> RpcResult<Option<RpcHeader>>;

    /// A finalised period's header, by its own hash.
    #[method(name = "getHeaderByHash")]
    async fn get_header_by_hash(&self, hash: String) -> RpcResult<Option<RpcHeader>>;

    /// The period number a header hash was finalised at.
    #[method(name = "getPeriodByHash")]
    async fn get_period_by_hash(&self, hash: String) -> RpcResult<Option<u64>>;

    /// Account state (nonce, balance, code, storage root) as of the latest
    /// finalised period.
    #[method(name = "getAccount")]
    async fn get_account(&self, address: String) -> RpcResult<RpcAccount>;

    /// Balance only, as a decimal string, as of the latest finalised period.
    #[method(name = "getBalance")]
    async fn get_balance(&self, address: String) -> RpcResult<String>;

    /// Contract bytecode deployed at `address` (empty if the account has no
    /// code), hex-encoded.
    #[method(name = "getCode")]
    async fn get_code(&self, address: String) -> RpcResult<String>;

    /// Read a single storage slot (see `RpcStorageValue` for how a slot gets
    /// written in the first place).
    #[method(name = "getStorageAt")]
    async fn get_storage_at(&self, address: String, slot: String) -> RpcResult<RpcStorageValue>;

    /// A transaction by hash, regardless of whether it has been finalised.
    #[method(name = "getTransactionByHash")]
    async fn get_transaction_by_hash(&self, hash: String) -> RpcResult<Option<RpcTransaction>>;

    /// The receipt produced for a finalised transaction.
    #[method(name = "getTransactionReceipt")]
    async fn get_transaction_receipt(&self, hash: String) -> RpcResult<Option<RpcReceipt>>;

    /// Logs matching an address set, topic vector, and period range,
    /// narrowed first via the two-level bloom index (§4.8, §8 scenario 6).
    #[method(name = "getLogs")]
    async fn get_logs(&self, filter: RpcLogFilter) -> RpcResult<Vec<RpcLogEntry>>;

    /// Number of validators eligible to vote at `period` — the active
    /// validator set's size, not a per-round sortition count.
    #[method(name = "getEligibleVoteCount")]
    async fn get_eligible_vote_count(&self, period: u64) -> RpcResult<u64>;

    /// Whether `address` is a member of the validator set eligible to vote
    /// at `period`, and its stake weight.
    #[method(name = "getEligibility")]
    async fn get_eligibility(&self, address: String, period: u64) -> RpcResult<RpcEligibility>;

    /// Submit a signed transaction. `tx_hex` is hex-encoded RLP(Transaction).
    /// The sole write path — routes into the block/transaction pool.
    /// Returns the transaction hash on success.
    #[method(name = "sendTransaction")]
    async fn send_transaction(&self, tx_hex: String) -> RpcResult<String>;

    /// Genesis / protocol constants.
    #[method(name = "getGenesisInfo")]
    async fn get_genesis_info(&self) -> RpcResult<RpcGenesisInfo>;

    /// Node and protocol version information.
    #[method(name = "getVersion")]
    async fn get_version(&self) -> RpcResult<RpcVersionInfo>;

    /// This node's P2P peer identity, for other nodes to bootstrap against.
    #[method(name = "getNetworkInfo")]
    async fn get_network_info(&self) -> RpcResult<RpcNetworkInfo>;
}
