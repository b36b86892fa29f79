use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("genesis already applied: final header for period 0 already exists")]
    AlreadyApplied,
    #[error("invalid genesis allocation: {0}")]
    InvalidAllocation(String),
    #[error("genesis params file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("genesis params malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] helix_state::StoreError),
}
