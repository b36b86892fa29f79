use thiserror::Error;

use crate::types::{Address, BlockHash, Period, TxHash, VoteHash};

/// Tagged error enumeration shared by the components that make up the core.
/// Individual crates (`helix-state`, `helix-consensus`, `helix-p2p`) define
/// their own narrower error types for internal plumbing (e.g. `StoreError`,
/// `DagError`, `PbftError`) and convert into this one at their public
/// boundary, mirroring §7's component-local tagged enumerations.
#[derive(Debug, Error)]
pub enum HelixError {
    // ── Wire (§7 "Wire") ─────────────────────────────────────────────────
    #[error("malformed frame from peer")]
    MalformedFrame,
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),
    #[error("incompatible peer: {reason}")]
    IncompatiblePeer { reason: String },

    // ── Block invalid (§7 "Block invalid") ──────────────────────────────
    #[error("DAG block {0:?} has a bad signature")]
    BlockBadSignature(BlockHash),
    #[error("DAG block {hash:?} has impossible level {level} (parents imply {expected})")]
    BlockImpossibleLevel {
        hash: BlockHash,
        level: u64,
        expected: u64,
    },
    #[error("DAG block {0:?} references unknown parent {1:?}")]
    BlockUnknownParent(BlockHash, BlockHash),
    #[error("DAG block {0:?} is already known")]
    BlockDuplicate(BlockHash),
    #[error("DAG block {0:?} declares {1} parents outside [{2}, {3}]")]
    BlockParentCountOutOfRange(BlockHash, usize, usize, usize),

    // ── Transaction invalid (§7 "Transaction invalid") ──────────────────
    #[error("transaction {0:?} has a bad signature")]
    TxBadSignature(TxHash),
    #[error("transaction {tx:?} from {sender:?} has stale or duplicate nonce {nonce}")]
    TxStaleNonce {
        tx: TxHash,
        sender: Address,
        nonce: u64,
    },
    #[error("transaction {0:?} gas limit {1} exceeds block gas limit {2}")]
    TxGasExceedsBlockLimit(TxHash, u64, u64),
    #[error("transaction {0:?} is already known")]
    TxDuplicate(TxHash),

    // ── Vote invalid (§7 "Vote invalid") ─────────────────────────────────
    #[error("vote {0:?} has a bad signature")]
    VoteBadSignature(VoteHash),
    #[error("vote {0:?} failed VRF verification")]
    VoteFailedVrf(VoteHash),
    #[error("voter {voter:?} is not eligible at period {period} round {round}")]
    VoteIneligibleVoter {
        voter: Address,
        period: Period,
        round: u32,
    },
    #[error("voter {voter:?} double-voted at period {period} round {round}")]
    VoteEquivocation {
        voter: Address,
        period: Period,
        round: u32,
    },

    // ── State executor (§7 "State executor failure") ────────────────────
    #[error("state executor panicked: {0}")]
    ExecutorPanic(String),

    // ── Store (§7 "Store failure", fatal — node halts) ──────────────────
    #[error("store error: {0}")]
    Store(String),

    // ── Sync (§7 "Sync failure") ──────────────────────────────────────────
    #[error("sync failed against peer after {attempts} attempts: {reason}")]
    SyncExhausted { attempts: u32, reason: String },

    // ── General ───────────────────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("crypto error: {0}")]
    Crypto(String),
}
