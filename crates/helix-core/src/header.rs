use alloy_primitives::B256;
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

use crate::types::{Address, BlockHash, Bloom, Period, Timestamp};
use crate::hash_bytes;

/// The header written once per period by the finaliser (§4.6).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct FinalHeader {
    pub period: Period,
    pub parent_hash: BlockHash,
    pub author: Address,
    pub timestamp: Timestamp,
    pub state_root: B256,
    pub transactions_root: B256,
    pub receipts_root: B256,
    pub log_bloom: Bloom,
    pub gas_used: u64,
    pub gas_limit: u64,
}

impl FinalHeader {
    /// Digest identifying this header, used as `parent_hash` of the next one.
    pub fn hash(&self) -> BlockHash {
        let mut buf = Vec::new();
        alloy_rlp::Encodable::encode(self, &mut buf);
        BlockHash::from_bytes(hash_bytes(&buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FinalHeader {
        FinalHeader {
            period: 1,
            parent_hash: BlockHash::zero(),
            author: Address::ZERO,
            timestamp: 0,
            state_root: B256::ZERO,
            transactions_root: B256::ZERO,
            receipts_root: B256::ZERO,
            log_bloom: Bloom::default(),
            gas_used: 0,
            gas_limit: 30_000_000,
        }
    }

    #[test]
    fn hash_is_deterministic() {
        let header = sample();
        assert_eq!(header.hash(), header.hash());
    }

    #[test]
    fn different_headers_hash_differently() {
        let a = sample();
        let mut b = sample();
        b.period = 2;
        assert_ne!(a.hash(), b.hash());
    }
}
