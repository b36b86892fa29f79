use helix_core::types::{Address, BlockHash, TxHash};
use helix_core::HelixError;
use thiserror::Error;

/// Errors local to the store and the finalisation pipeline. Converts into
/// `HelixError` at the crate boundary; callers outside helix-state should
/// only ever see the latter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("rlp decode error: {0}")]
    Rlp(String),
    #[error("transaction {0:?} from {1:?} is stale: highest finalised nonce is {2}")]
    StaleNonce(TxHash, Address, u64),
    #[error("state executor failed: {0}")]
    ExecutorFailed(String),
    #[error("dag block {0:?} missing from the in-memory index during finalisation")]
    MissingBlock(BlockHash),
    #[error("transaction {0:?} referenced by a finalised block is missing from the pool")]
    MissingTransaction(TxHash),
}

impl From<StoreError> for HelixError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StaleNonce(tx, sender, nonce) => HelixError::TxStaleNonce {
                tx,
                sender,
                nonce,
            },
            StoreError::ExecutorFailed(msg) => HelixError::ExecutorPanic(msg),
            other => HelixError::Store(other.to_string()),
        }
    }
}
