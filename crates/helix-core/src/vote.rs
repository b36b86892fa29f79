use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

use crate::types::{Address, BlockHash, Period, RecoverableSignature, Round, VoteHash, VrfProof};

/// The four PBFT steps, each also the "vote type" of the vote cast during it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Step {
    Propose = 0,
    Soft = 1,
    Certify = 2,
    Next = 3,
}

impl alloy_rlp::Encodable for Step {
    fn encode(&self, out: &mut dyn alloy_rlp::bytes::BufMut) {
        (*self as u8).encode(out)
    }
    fn length(&self) -> usize {
        (*self as u8).length()
    }
}

impl alloy_rlp::Decodable for Step {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let tag = u8::decode(buf)?;
        match tag {
            0 => Ok(Step::Propose),
            1 => Ok(Step::Soft),
            2 => Ok(Step::Certify),
            3 => Ok(Step::Next),
            _ => Err(alloy_rlp::Error::Custom("unknown PBFT step tag")),
        }
    }
}

/// The signed fields of a PBFT vote, in RLP field order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct VoteBody {
    pub period: Period,
    pub round: Round,
    pub step: Step,
    /// The hash being voted for. `BlockHash::zero()` is the reserved "null"
    /// hash cast on step-timeout next-votes.
    pub voted_hash: BlockHash,
    pub vrf_proof: VrfProof,
}

/// A cast, signed PBFT vote.
///
/// Identity is `hash`, the digest of the RLP encoding of `body` followed by
/// `signature`. `voter` is recovered from `signature` over the RLP encoding
/// of `body` alone, exactly as for transactions and DAG blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct Vote {
    pub body: VoteBody,
    pub signature: RecoverableSignature,
    pub hash: VoteHash,
    pub voter: Address,
}

impl VoteBody {
    pub fn signing_digest(&self) -> [u8; 32] {
        let mut buf = Vec::new();
        alloy_rlp::Encodable::encode(self, &mut buf);
        crate::hash_bytes(&buf)
    }
}

impl Vote {
    /// Identity hash: keccak256 of `body` followed by `signature`.
    pub fn compute_hash(&self) -> VoteHash {
        let mut buf = Vec::new();
        alloy_rlp::Encodable::encode(&self.body, &mut buf);
        alloy_rlp::Encodable::encode(&self.signature, &mut buf);
        VoteHash::from_bytes(crate::hash_bytes(&buf))
    }

    pub fn is_null(&self) -> bool {
        self.body.voted_hash.is_zero()
    }

    /// Key identifying "one vote per (voter, period, round, step, type)" —
    /// since `step` already doubles as vote type here, this is the full key.
    pub fn dedup_key(&self) -> (Address, Period, Round, Step) {
        (self.voter, self.body.period, self.body.round, self.body.step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_rlp_round_trips() {
        for step in [Step::Propose, Step::Soft, Step::Certify, Step::Next] {
            let mut buf = Vec::new();
            alloy_rlp::Encodable::encode(&step, &mut buf);
            let decoded = Step::decode(&mut buf.as_slice()).unwrap();
            assert_eq!(step, decoded);
        }
    }

    #[test]
    fn null_vote_has_zero_hash() {
        let body = VoteBody {
            period: 1,
            round: 2,
            step: Step::Next,
            voted_hash: BlockHash::zero(),
            vrf_proof: VrfProof([0u8; 64]),
        };
        let vote = Vote {
            body,
            signature: RecoverableSignature([0u8; 65]),
            hash: VoteHash::from_bytes([9u8; 32]),
            voter: Address::ZERO,
        };
        assert!(vote.is_null());
    }

    #[test]
    fn compute_hash_is_signature_sensitive() {
        let body = VoteBody {
            period: 1,
            round: 1,
            step: Step::Propose,
            voted_hash: BlockHash::from_bytes([7u8; 32]),
            vrf_proof: VrfProof([0u8; 64]),
        };
        let a = Vote {
            body: body.clone(),
            signature: RecoverableSignature([1u8; 65]),
            hash: VoteHash::from_bytes([0u8; 32]),
            voter: Address::ZERO,
        };
        let b = Vote {
            signature: RecoverableSignature([2u8; 65]),
            ..a.clone()
        };
        assert_ne!(a.compute_hash(), b.compute_hash());
    }
}
