use alloy_rlp::{Decodable, Encodable, RlpDecodable, RlpEncodable};

use helix_core::block::DagBlock;
use helix_core::header::FinalHeader;
use helix_core::transaction::Transaction;
use helix_core::types::{BlockHash, Level, Period, Round};
use helix_core::vote::Vote;

use crate::error::P2pError;

/// A DAG block together with the transactions it references, exactly as
/// carried by the `NewDagBlock`/`DagBlock`/`Blocks` packets.
#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct DagBlockWithTxs {
    pub block: DagBlock,
    pub transactions: Vec<Transaction>,
}

/// A finalised period's header, its flattened block order and the
/// certify-votes that made it final — the `PbftBlock` wire payload, letting a
/// syncing peer verify finality without re-running the protocol (§4.5).
#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct PbftBlockWithVotes {
    pub header: FinalHeader,
    pub anchor: BlockHash,
    pub blocks: Vec<BlockHash>,
    pub certified_votes: Vec<Vote>,
}

#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct StatusPayload {
    pub protocol_version: u32,
    pub network_id: u64,
    pub genesis_hash: BlockHash,
    pub dag_max_level: Level,
    pub pbft_chain_size: Period,
}

#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
struct GetBlocksLevelPayload {
    start_level: Level,
    count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
struct GetPbftBlockPayload {
    start_period: Period,
    count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
struct GetNextVotesPayload {
    period: Period,
    round: Round,
}

#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
struct Hashes(Vec<BlockHash>);

#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
struct Votes(Vec<Vote>);

#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
struct Txs(Vec<Transaction>);

#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
struct Blocks(Vec<DagBlockWithTxs>);

#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
struct PbftBlocks(Vec<PbftBlockWithVotes>);

/// Every packet type the core must recognise and emit (§6). A frame on the
/// wire is this variant's tag byte followed by its RLP-encoded payload —
/// never one combined RLP value — so a peer can reject an unrecognised
/// packet type before attempting to decode its body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireMessage {
    Status(StatusPayload),
    NewDagBlock(DagBlockWithTxs),
    DagBlockHash(BlockHash),
    GetDagBlock(BlockHash),
    DagBlock(DagBlockWithTxs),
    GetBlocksLevel { start_level: Level, count: u64 },
    Blocks(Vec<DagBlockWithTxs>),
    NewPbftBlock(PbftBlockWithVotes),
    GetPbftBlock { start_period: Period, count: u64 },
    PbftBlock(Vec<PbftBlockWithVotes>),
    PbftVote(Vec<Vote>),
    GetNextVotes { period: Period, round: Round },
    NextVotes(Vec<Vote>),
    Transaction(Vec<Transaction>),
    Synced,
}

macro_rules! tag {
    ($($name:ident = $val:expr),* $(,)?) => {
        $(const $name: u8 = $val;)*
    };
}

tag! {
    TAG_STATUS = 0,
    TAG_NEW_DAG_BLOCK = 1,
    TAG_DAG_BLOCK_HASH = 2,
    TAG_GET_DAG_BLOCK = 3,
    TAG_DAG_BLOCK = 4,
    TAG_GET_BLOCKS_LEVEL = 5,
    TAG_BLOCKS = 6,
    TAG_NEW_PBFT_BLOCK = 7,
    TAG_GET_PBFT_BLOCK = 8,
    TAG_PBFT_BLOCK = 9,
    TAG_PBFT_VOTE = 10,
    TAG_GET_NEXT_VOTES = 11,
    TAG_NEXT_VOTES = 12,
    TAG_TRANSACTION = 13,
    TAG_SYNCED = 14,
}

impl WireMessage {
    fn tag(&self) -> u8 {
        match self {
            WireMessage::Status(_) => TAG_STATUS,
            WireMessage::NewDagBlock(_) => TAG_NEW_DAG_BLOCK,
            WireMessage::DagBlockHash(_) => TAG_DAG_BLOCK_HASH,
            WireMessage::GetDagBlock(_) => TAG_GET_DAG_BLOCK,
            WireMessage::DagBlock(_) => TAG_DAG_BLOCK,
            WireMessage::GetBlocksLevel { .. } => TAG_GET_BLOCKS_LEVEL,
            WireMessage::Blocks(_) => TAG_BLOCKS,
            WireMessage::NewPbftBlock(_) => TAG_NEW_PBFT_BLOCK,
            WireMessage::GetPbftBlock { .. } => TAG_GET_PBFT_BLOCK,
            WireMessage::PbftBlock(_) => TAG_PBFT_BLOCK,
            WireMessage::PbftVote(_) => TAG_PBFT_VOTE,
            WireMessage::GetNextVotes { .. } => TAG_GET_NEXT_VOTES,
            WireMessage::NextVotes(_) => TAG_NEXT_VOTES,
            WireMessage::Transaction(_) => TAG_TRANSACTION,
            WireMessage::Synced => TAG_SYNCED,
        }
    }

    /// Encode this message as it is carried on the wire: one tag byte
    /// followed by the RLP encoding of its payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.tag()];
        match self {
            WireMessage::Status(p) => p.encode(&mut out),
            WireMessage::NewDagBlock(p) => p.encode(&mut out),
            WireMessage::DagBlockHash(h) => h.encode(&mut out),
            WireMessage::GetDagBlock(h) => h.encode(&mut out),
            WireMessage::DagBlock(p) => p.encode(&mut out),
            WireMessage::GetBlocksLevel { start_level, count } => {
                GetBlocksLevelPayload { start_level: *start_level, count: *count }.encode(&mut out)
            }
            WireMessage::Blocks(v) => Blocks(v.clone()).encode(&mut out),
            WireMessage::NewPbftBlock(p) => p.encode(&mut out),
            WireMessage::GetPbftBlock { start_period, count } => {
                GetPbftBlockPayload { start_period: *start_period, count: *count }.encode(&mut out)
            }
            WireMessage::PbftBlock(v) => PbftBlocks(v.clone()).encode(&mut out),
            WireMessage::PbftVote(v) => Votes(v.clone()).encode(&mut out),
            WireMessage::GetNextVotes { period, round } => {
                GetNextVotesPayload { period: *period, round: *round }.encode(&mut out)
            }
            WireMessage::NextVotes(v) => Votes(v.clone()).encode(&mut out),
            WireMessage::Transaction(v) => Txs(v.clone()).encode(&mut out),
            WireMessage::Synced => {}
        }
        out
    }

    /// Decode a message from its wire form. Returns `UnknownPacketType` for
    /// an unrecognised tag rather than attempting to guess a payload shape.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, P2pError> {
        let (&tag, mut rest) = bytes.split_first().ok_or(P2pError::MalformedFrame)?;
        Ok(match tag {
            TAG_STATUS => WireMessage::Status(StatusPayload::decode(&mut rest)?),
            TAG_NEW_DAG_BLOCK => WireMessage::NewDagBlock(DagBlockWithTxs::decode(&mut rest)?),
            TAG_DAG_BLOCK_HASH => WireMessage::DagBlockHash(BlockHash::decode(&mut rest)?),
            TAG_GET_DAG_BLOCK => WireMessage::GetDagBlock(BlockHash::decode(&mut rest)?),
            TAG_DAG_BLOCK => WireMessage::DagBlock(DagBlockWithTxs::decode(&mut rest)?),
            TAG_GET_BLOCKS_LEVEL => {
                let p = GetBlocksLevelPayload::decode(&mut rest)?;
                WireMessage::GetBlocksLevel { start_level: p.start_level, count: p.count }
            }
            TAG_BLOCKS => WireMessage::Blocks(Blocks::decode(&mut rest)?.0),
            TAG_NEW_PBFT_BLOCK => WireMessage::NewPbftBlock(PbftBlockWithVotes::decode(&mut rest)?),
            TAG_GET_PBFT_BLOCK => {
                let p = GetPbftBlockPayload::decode(&mut rest)?;
                WireMessage::GetPbftBlock { start_period: p.start_period, count: p.count }
            }
            TAG_PBFT_BLOCK => WireMessage::PbftBlock(PbftBlocks::decode(&mut rest)?.0),
            TAG_PBFT_VOTE => WireMessage::PbftVote(Votes::decode(&mut rest)?.0),
            TAG_GET_NEXT_VOTES => {
                let p = GetNextVotesPayload::decode(&mut rest)?;
                WireMessage::GetNextVotes { period: p.period, round: p.round }
            }
            TAG_NEXT_VOTES => WireMessage::NextVotes(Votes::decode(&mut rest)?.0),
            TAG_TRANSACTION => WireMessage::Transaction(Txs::decode(&mut rest)?.0),
            TAG_SYNCED => WireMessage::Synced,
            other => return Err(P2pError::UnknownPacketType(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_core::types::{Address, RecoverableSignature};

    #[test]
    fn synced_round_trips() {
        let msg = WireMessage::Synced;
        assert_eq!(WireMessage::from_bytes(&msg.to_bytes()).unwrap(), msg);
    }

    #[test]
    fn get_dag_block_round_trips() {
        let msg = WireMessage::GetDagBlock(BlockHash::from_bytes([7u8; 32]));
        assert_eq!(WireMessage::from_bytes(&msg.to_bytes()).unwrap(), msg);
    }

    #[test]
    fn status_round_trips() {
        let msg = WireMessage::Status(StatusPayload {
            protocol_version: 1,
            network_id: 7,
            genesis_hash: BlockHash::zero(),
            dag_max_level: 0,
            pbft_chain_size: 0,
        });
        assert_eq!(WireMessage::from_bytes(&msg.to_bytes()).unwrap(), msg);
    }

    #[test]
    fn get_blocks_level_round_trips() {
        let msg = WireMessage::GetBlocksLevel { start_level: 3, count: 32 };
        assert_eq!(WireMessage::from_bytes(&msg.to_bytes()).unwrap(), msg);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let bytes = vec![255u8];
        assert!(matches!(
            WireMessage::from_bytes(&bytes),
            Err(P2pError::UnknownPacketType(255))
        ));
    }

    #[test]
    fn empty_frame_is_malformed() {
        assert!(matches!(
            WireMessage::from_bytes(&[]),
            Err(P2pError::MalformedFrame)
        ));
    }

    #[test]
    fn new_dag_block_round_trips_with_an_empty_tx_list() {
        let block = DagBlock {
            body: helix_core::block::DagBlockBody {
                pivot: BlockHash::zero(),
                tips: vec![],
                transactions: vec![],
                level: 0,
                timestamp: 0,
            },
            signature: RecoverableSignature([0u8; 65]),
            hash: BlockHash::zero(),
            sender: Address::ZERO,
        };
        let msg = WireMessage::NewDagBlock(DagBlockWithTxs { block, transactions: vec![] });
        assert_eq!(WireMessage::from_bytes(&msg.to_bytes()).unwrap(), msg);
    }
}
