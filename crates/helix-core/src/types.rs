use alloy_primitives::{Address as EvmAddress, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account balance and transaction value, 256-bit unsigned.
pub type Balance = U256;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

/// Transaction sequence number per account (monotonically increasing).
pub type Nonce = u64;

/// 160-bit account address derived from a public key (keccak256(pubkey)[12..]).
pub type Address = EvmAddress;

/// Deterministic DAG finalisation round. Period 0 is genesis.
pub type Period = u64;

/// DAG level: 1 + max(level of parents); genesis level = 0.
pub type Level = u64;

/// PBFT round counter within a period, starting at 1.
pub type Round = u32;

// ── BlockHash ──────────────────────────────────────────────────────────────

/// Identity of a DAG block: digest of its RLP encoding including `signature`.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, RlpEncodable, RlpDecodable,
)]
pub struct BlockHash(pub B256);

impl BlockHash {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(B256::from(b))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_ref().try_into().expect("B256 is 32 bytes")
    }

    pub fn zero() -> Self {
        Self(B256::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn to_hex(&self) -> String {
        format!("{:#x}", self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes[..32]);
        Ok(Self::from_bytes(arr))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({}…)", &self.to_hex()[..10])
    }
}

// ── TxHash ───────────────────────────────────────────────────────────────────

/// Identity of a transaction: digest of the RLP encoding of its signed body.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, RlpEncodable, RlpDecodable,
)]
pub struct TxHash(pub B256);

impl TxHash {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(B256::from(b))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_ref().try_into().expect("B256 is 32 bytes")
    }

    pub fn to_hex(&self) -> String {
        format!("{:#x}", self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes[..32]);
        Ok(Self::from_bytes(arr))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({}…)", &self.to_hex()[..10])
    }
}

// ── VoteHash ─────────────────────────────────────────────────────────────────

/// Identity of a PBFT vote: digest of its RLP encoding including `signature`.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, RlpEncodable, RlpDecodable,
)]
pub struct VoteHash(pub B256);

impl VoteHash {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(B256::from(b))
    }

    pub fn to_hex(&self) -> String {
        format!("{:#x}", self.0)
    }
}

impl fmt::Display for VoteHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for VoteHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VoteHash({}…)", &self.to_hex()[..10])
    }
}

// ── RecoverableSignature ───────────────────────────────────────────────────

/// A 65-byte recoverable ECDSA (secp256k1) signature: `r ‖ s ‖ recovery_id`.
/// The sender address is recovered from this plus the signed message — it is
/// never transmitted or stored separately.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverableSignature(pub [u8; 65]);

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoverableSignature({}…)", &hex::encode(&self.0[..6]))
    }
}

impl alloy_rlp::Encodable for RecoverableSignature {
    fn encode(&self, out: &mut dyn alloy_rlp::bytes::BufMut) {
        self.0.as_slice().encode(out)
    }
    fn length(&self) -> usize {
        self.0.as_slice().length()
    }
}

impl alloy_rlp::Decodable for RecoverableSignature {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let raw = Vec::<u8>::decode(buf)?;
        if raw.len() != 65 {
            return Err(alloy_rlp::Error::UnexpectedLength);
        }
        let mut arr = [0u8; 65];
        arr.copy_from_slice(&raw);
        Ok(Self(arr))
    }
}

// ── VrfProof ─────────────────────────────────────────────────────────────────

/// Ed25519 sortition proof: a signature over `(voter_key, period, round, step)`
/// whose hash is treated as the VRF output. See helix-crypto::vrf.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfProof(pub [u8; 64]);

impl fmt::Debug for VrfProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VrfProof({}…)", &hex::encode(&self.0[..6]))
    }
}

impl alloy_rlp::Encodable for VrfProof {
    fn encode(&self, out: &mut dyn alloy_rlp::bytes::BufMut) {
        self.0.as_slice().encode(out)
    }
    fn length(&self) -> usize {
        self.0.as_slice().length()
    }
}

impl alloy_rlp::Decodable for VrfProof {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let raw = Vec::<u8>::decode(buf)?;
        if raw.len() != 64 {
            return Err(alloy_rlp::Error::UnexpectedLength);
        }
        let mut arr = [0u8; 64];
        arr.copy_from_slice(&raw);
        Ok(Self(arr))
    }
}

/// A node's Ed25519 VRF public key, separate from its secp256k1 signing key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct VrfPublicKey(pub [u8; 32]);

impl fmt::Debug for VrfPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VrfPublicKey({})", hex::encode(self.0))
    }
}

// ── OptionalAddress ──────────────────────────────────────────────────────────

/// An address that may be absent, RLP-encoded as Ethereum encodes an empty
/// "to" field: a 20-byte string when present, an empty string when not.
/// `alloy_rlp`'s struct derive does not support `Option<T>` as a field, so
/// this wrapper carries the same encoding manually. Used for
/// `Receipt.contract_address`; see `transaction::Recipient` for the
/// call/create distinction on the sending side.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalAddress(pub Option<Address>);

impl OptionalAddress {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn some(addr: Address) -> Self {
        Self(Some(addr))
    }

    pub fn get(&self) -> Option<Address> {
        self.0
    }
}

impl fmt::Debug for OptionalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl alloy_rlp::Encodable for OptionalAddress {
    fn encode(&self, out: &mut dyn alloy_rlp::bytes::BufMut) {
        match self.0 {
            Some(addr) => addr.encode(out),
            None => alloy_rlp::Header {
                list: false,
                payload_length: 0,
            }
            .encode(out),
        }
    }

    fn length(&self) -> usize {
        match self.0 {
            Some(addr) => addr.length(),
            None => 1,
        }
    }
}

impl alloy_rlp::Decodable for OptionalAddress {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let bytes = Vec::<u8>::decode(buf)?;
        if bytes.is_empty() {
            Ok(Self(None))
        } else if bytes.len() == 20 {
            Ok(Self(Some(Address::from_slice(&bytes))))
        } else {
            Err(alloy_rlp::Error::UnexpectedLength)
        }
    }
}

/// Log bloom filter: 2048-bit (256-byte) bitmap over (address, topics) hashes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bloom(pub [u8; 256]);

impl Default for Bloom {
    fn default() -> Self {
        Self([0u8; 256])
    }
}

impl Bloom {
    pub fn accrue(&mut self, bytes: &[u8]) {
        // Standard Ethereum-style 3-hash bloom construction: hash the input,
        // then set 3 bits chosen from 11-bit slices of the hash.
        let digest = crate::hash_bytes(bytes);
        for i in 0..3 {
            let bit = (((digest[i * 2] as usize) << 8) | digest[i * 2 + 1] as usize) & 0x7ff;
            let byte_index = 255 - bit / 8;
            let bit_index = bit % 8;
            self.0[byte_index] |= 1 << bit_index;
        }
    }

    pub fn contains(&self, other: &Bloom) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| (a & b) == *b)
    }

    pub fn or_with(&mut self, other: &Bloom) {
        for i in 0..self.0.len() {
            self.0[i] |= other.0[i];
        }
    }
}

impl fmt::Debug for Bloom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bloom({}…)", &hex::encode(&self.0[..4]))
    }
}
