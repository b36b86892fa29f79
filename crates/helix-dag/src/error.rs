use helix_core::types::BlockHash;
use helix_core::HelixError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DagError {
    #[error("block {0:?} is already known")]
    DuplicateBlock(BlockHash),
    #[error("block {0:?} declares {1} parents outside [{2}, {3}]")]
    ParentCountOutOfRange(BlockHash, usize, usize, usize),
    #[error("block {0:?} references unknown parent {1:?}")]
    UnknownParent(BlockHash, BlockHash),
    #[error("block {hash:?} has impossible level {level} (parents imply {expected})")]
    ImpossibleLevel {
        hash: BlockHash,
        level: u64,
        expected: u64,
    },
    #[error("block {0:?} has a bad signature")]
    BadSignature(BlockHash),
    #[error("block {0:?} hash does not match its contents")]
    HashMismatch(BlockHash),
}

impl From<DagError> for HelixError {
    fn from(err: DagError) -> Self {
        match err {
            DagError::DuplicateBlock(h) => HelixError::BlockDuplicate(h),
            DagError::ParentCountOutOfRange(h, got, min, max) => {
                HelixError::BlockParentCountOutOfRange(h, got, min, max)
            }
            DagError::UnknownParent(h, p) => HelixError::BlockUnknownParent(h, p),
            DagError::ImpossibleLevel {
                hash,
                level,
                expected,
            } => HelixError::BlockImpossibleLevel {
                hash,
                level,
                expected,
            },
            DagError::BadSignature(h) | DagError::HashMismatch(h) => HelixError::BlockBadSignature(h),
        }
    }
}
