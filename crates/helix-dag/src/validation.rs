use helix_core::block::DagBlock;
use helix_core::constants::{DAG_MAX_PARENTS, DAG_MIN_PARENTS};
use helix_core::types::{BlockHash, Level};

use crate::error::DagError;

/// Structural and cryptographic checks that do not require DAG context:
/// hash integrity, signature recovery, and parent-count bounds. Run before a
/// block is handed to the DAG manager for linking.
pub fn validate_block_shape(block: &DagBlock) -> Result<(), DagError> {
    if block.compute_hash() != block.hash {
        return Err(DagError::HashMismatch(block.hash));
    }

    let digest = block.body.signing_digest();
    helix_crypto::verify_sender(&digest, &block.signature, block.sender)
        .map_err(|_| DagError::BadSignature(block.hash))?;

    if !block.is_genesis() {
        let parent_count = 1 + block.body.tips.len();
        if parent_count < DAG_MIN_PARENTS || parent_count > DAG_MAX_PARENTS {
            return Err(DagError::ParentCountOutOfRange(
                block.hash,
                parent_count,
                DAG_MIN_PARENTS,
                DAG_MAX_PARENTS,
            ));
        }
    }

    Ok(())
}

/// DAG-context checks: every declared parent must be known, and the block's
/// level must equal 1 + the maximum level among its parents. Called by the
/// DAG manager at insertion time, when parent levels are available.
pub fn validate_parents<F>(block: &DagBlock, level_of: F) -> Result<(), DagError>
where
    F: Fn(&BlockHash) -> Option<Level>,
{
    let mut max_parent_level: Option<Level> = None;
    for parent in block.parents() {
        let level =
            level_of(parent).ok_or_else(|| DagError::UnknownParent(block.hash, *parent))?;
        max_parent_level = Some(max_parent_level.map_or(level, |m| m.max(level)));
    }

    let expected = max_parent_level.unwrap_or(0) + 1;
    if block.level() != expected {
        return Err(DagError::ImpossibleLevel {
            hash: block.hash,
            level: block.level(),
            expected,
        });
    }

    Ok(())
}
