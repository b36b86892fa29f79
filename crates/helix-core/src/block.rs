use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

use crate::types::{Address, BlockHash, Level, RecoverableSignature, Timestamp, TxHash};

/// The signed fields of a DAG block, in RLP field order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct DagBlockBody {
    /// Hash of the parent on the pivot chain. Zero for the genesis block.
    pub pivot: BlockHash,
    /// Ordered set of hashes of additional (non-pivot) parents.
    pub tips: Vec<BlockHash>,
    /// Ordered list of transaction hashes contained in this block.
    pub transactions: Vec<TxHash>,
    /// 1 + max(level of pivot, level of any tip); genesis level = 0.
    pub level: Level,
    pub timestamp: Timestamp,
}

/// A DAG block as admitted to the pool and linked into the DAG manager.
///
/// `hash` is the digest of the RLP encoding of `body` followed by
/// `signature`; it serves as the block's identity. `sender` is recovered
/// from `signature` over the RLP encoding of `body` alone and is memoised
/// here rather than recomputed by every later reader.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct DagBlock {
    pub body: DagBlockBody,
    pub signature: RecoverableSignature,
    pub hash: BlockHash,
    pub sender: Address,
}

impl DagBlockBody {
    pub fn signing_digest(&self) -> [u8; 32] {
        let mut buf = Vec::new();
        alloy_rlp::Encodable::encode(self, &mut buf);
        crate::hash_bytes(&buf)
    }
}

impl DagBlock {
    /// Identity hash: keccak256 of `body` followed by `signature`.
    pub fn compute_hash(&self) -> BlockHash {
        let mut buf = Vec::new();
        alloy_rlp::Encodable::encode(&self.body, &mut buf);
        alloy_rlp::Encodable::encode(&self.signature, &mut buf);
        BlockHash::from_bytes(crate::hash_bytes(&buf))
    }

    pub fn is_genesis(&self) -> bool {
        self.body.level == 0
    }

    pub fn level(&self) -> Level {
        self.body.level
    }

    /// All parent hashes, pivot first, in the order invariant-checking code
    /// should walk them.
    pub fn parents(&self) -> impl Iterator<Item = &BlockHash> {
        std::iter::once(&self.body.pivot).chain(self.body.tips.iter())
    }
}
