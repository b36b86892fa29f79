use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

use crate::types::{Address, Balance, Nonce, RecoverableSignature, TxHash};

/// The recipient of a transaction: either a call to an existing address, or
/// contract creation. Encoded on the wire exactly as Ethereum does — a
/// 20-byte string for `Call`, an empty string for `Create` — rather than as
/// an RLP-wrapped `Option`, so a `TransactionBody` decodes with the same
/// byte layout a peer running an unrelated client would produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    Call(Address),
    Create,
}

impl Recipient {
    pub fn address(&self) -> Option<Address> {
        match self {
            Recipient::Call(addr) => Some(*addr),
            Recipient::Create => None,
        }
    }
}

impl alloy_rlp::Encodable for Recipient {
    fn encode(&self, out: &mut dyn alloy_rlp::bytes::BufMut) {
        match self {
            Recipient::Call(addr) => addr.encode(out),
            Recipient::Create => alloy_rlp::Header {
                list: false,
                payload_length: 0,
            }
            .encode(out),
        }
    }

    fn length(&self) -> usize {
        match self {
            Recipient::Call(addr) => addr.length(),
            Recipient::Create => 1,
        }
    }
}

impl alloy_rlp::Decodable for Recipient {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let bytes = Vec::<u8>::decode(buf)?;
        if bytes.is_empty() {
            Ok(Recipient::Create)
        } else if bytes.len() == 20 {
            Ok(Recipient::Call(Address::from_slice(&bytes)))
        } else {
            Err(alloy_rlp::Error::UnexpectedLength)
        }
    }
}

/// The signed fields of a transaction, in RLP field order. This is exactly
/// what gets hashed to produce the signing digest — `signature` is not
/// included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct TransactionBody {
    pub nonce: Nonce,
    pub gas_price: Balance,
    pub gas_limit: u64,
    pub to: Recipient,
    pub value: Balance,
    pub data: Vec<u8>,
}

/// A fully signed transaction as admitted to the pool and stored.
///
/// `hash` and `sender` are derived, not independently settable: `hash` is the
/// keccak256 digest of the RLP encoding of `body` followed by `signature`;
/// `sender` is recovered from `signature` over the RLP encoding of `body`
/// alone. Both are computed once at construction time (see
/// `helix_crypto::recover_sender`) and carried on the value from then on so
/// that later stages (DAG manager, finaliser, RPC) never re-run recovery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct Transaction {
    pub body: TransactionBody,
    pub signature: RecoverableSignature,
    pub hash: TxHash,
    pub sender: Address,
}

impl TransactionBody {
    /// Digest signed by the sender: keccak256 of this body's RLP encoding
    /// alone, excluding the signature.
    pub fn signing_digest(&self) -> [u8; 32] {
        let mut buf = Vec::new();
        alloy_rlp::Encodable::encode(self, &mut buf);
        crate::hash_bytes(&buf)
    }
}

impl Transaction {
    pub fn nonce(&self) -> Nonce {
        self.body.nonce
    }

    pub fn gas_limit(&self) -> u64 {
        self.body.gas_limit
    }

    pub fn is_contract_creation(&self) -> bool {
        matches!(self.body.to, Recipient::Create)
    }

    /// Identity hash: keccak256 of `body` followed by `signature`. Recomputed
    /// during admission to catch tampering of the stored `hash` field.
    pub fn compute_hash(&self) -> TxHash {
        let mut buf = Vec::new();
        alloy_rlp::Encodable::encode(&self.body, &mut buf);
        alloy_rlp::Encodable::encode(&self.signature, &mut buf);
        TxHash::from_bytes(crate::hash_bytes(&buf))
    }
}
