//! Protocol-wide constants: genesis parameters, DAG shape bounds, PBFT
//! committee sizing, replay-protection window, and log-bloom index fan-out.

// ── Genesis ──────────────────────────────────────────────────────────────────

/// Genesis timestamp: 2026-01-01 00:00:00 UTC.
pub const GENESIS_TIMESTAMP: i64 = 1_767_225_600;

/// Chain identifier included in `Status` handshakes and returned by RPC.
pub const CHAIN_ID: u64 = 1337;

/// The pre-funded genesis address used by the seed test scenarios (§8.1).
pub const GENESIS_PREFUNDED_ADDRESS_HEX: &str = "de2b1203d72d3549ee2f733b00b2789414c7cea5";

/// The pre-funded genesis balance used by the seed test scenarios (§8.1).
pub const GENESIS_PREFUNDED_BALANCE: u64 = 9_007_199_254_740_991;

/// Default block gas limit assigned at genesis.
pub const DEFAULT_GAS_LIMIT: u64 = 30_000_000;

// ── DAG manager ──────────────────────────────────────────────────────────────

/// Minimum number of parents (pivot + tips) a non-genesis block may declare.
pub const DAG_MIN_PARENTS: usize = 1;

/// Maximum number of parents (pivot + tips) a block may declare.
pub const DAG_MAX_PARENTS: usize = 8;

// ── PBFT ─────────────────────────────────────────────────────────────────────

/// Numerator/denominator of the Byzantine quorum fraction: 2f+1 out of total
/// stake, i.e. strictly more than 2/3.
pub const FINALITY_THRESHOLD_NUM: u64 = 2;
pub const FINALITY_THRESHOLD_DEN: u64 = 3;

/// Target PBFT committee size used to derive the VRF sortition threshold.
pub const PBFT_COMMITTEE_SIZE: u64 = 20;

/// Base step deadline in milliseconds, before the per-step and per-round
/// super-linear growth terms are added (§4.5).
pub const PBFT_STEP_BASE_MS: u64 = 2_000;

/// Per-step additive deadline growth (Δ_step), in milliseconds.
pub const PBFT_STEP_DELTA_MS: u64 = 500;

/// Per-round additive deadline growth (Δ_round), in milliseconds.
pub const PBFT_ROUND_DELTA_MS: u64 = 1_000;

// ── Replay protection ────────────────────────────────────────────────────────

/// Number of periods a sender's highest finalised nonce is retained before
/// being promoted to the replay-protection watermark (§4.4).
pub const REPLAY_PROTECTION_WINDOW: u64 = 64;

// ── Log-bloom index ──────────────────────────────────────────────────────────

/// Periods grouped into one level-0 log-bloom chunk.
pub const BLOOM_LEVEL0_FANOUT: u64 = 16;

/// Level-0 chunks grouped into one level-1 log-bloom chunk.
pub const BLOOM_LEVEL1_FANOUT: u64 = 16;

// ── Sync driver ──────────────────────────────────────────────────────────────

/// Maximum DAG levels requested per `GetBlocksLevel` batch.
pub const SYNC_DAG_LEVEL_BATCH: u64 = 32;

/// Maximum periods requested per `GetPbftBlock` batch.
pub const SYNC_PBFT_PERIOD_BATCH: u64 = 32;

/// Seconds with no new DAG level before rotating to the next-best peer.
pub const SYNC_STALL_TIMEOUT_SECS: u64 = 30;

// ── Peer timeouts ────────────────────────────────────────────────────────────

pub const ORPHAN_PARENT_TIMEOUT_SECS: u64 = 10;
pub const IDLE_PEER_TIMEOUT_SECS: u64 = 10;
pub const DEAD_PEER_TIMEOUT_SECS: u64 = 120;

/// Frames above this size are split into a multi-frame sequence (§6).
pub const MAX_SINGLE_FRAME_BYTES: usize = 15 * 1024 * 1024;
