pub mod account;
pub mod block;
pub mod constants;
pub mod error;
pub mod header;
pub mod receipt;
pub mod transaction;
pub mod types;
pub mod vote;

pub use account::*;
pub use block::*;
pub use constants::*;
pub use error::HelixError;
pub use header::*;
pub use receipt::*;
pub use transaction::*;
pub use types::*;
pub use vote::*;

/// Canonical hash function used throughout the protocol: keccak256, matching
/// an EVM-compatible state machine's own hashing.
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    alloy_primitives::keccak256(data).0
}
