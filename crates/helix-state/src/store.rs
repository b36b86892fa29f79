use std::sync::Arc;

use alloy_primitives::B256;
use helix_core::account::Account;
use helix_core::block::DagBlock;
use helix_core::header::FinalHeader;
use helix_core::receipt::Receipt;
use helix_core::transaction::Transaction;
use helix_core::types::{Address, BlockHash, Level, Nonce, Period, TxHash, VoteHash};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::StoreError;

// ── Key prefixes ─────────────────────────────────────────────────────────────
//
// sled's `Transactional` trait only composes a bounded tuple of trees, far
// fewer than the number of logical columns the finaliser's batch touches in
// one go. Rather than fight that arity limit, every column lives in the
// default tree under a distinct single-byte (or two-byte) prefix, and
// atomicity comes from `sled::Batch` + `Tree::apply_batch`, which sled
// guarantees is all-or-nothing within one tree.
const PREFIX_BLOCK: u8 = b'B';
const PREFIX_BLOCK_LEVEL: u8 = b'L';
const PREFIX_TX: u8 = b'T';
const PREFIX_TX_PERIOD: u8 = b'P';
const PREFIX_PERIOD_DATA: u8 = b'D';
const PREFIX_META: u8 = b'M';
const PREFIX_FINAL_HEADER: u8 = b'H';
const PREFIX_HASH_BY_PERIOD: u8 = b'I';
const PREFIX_PERIOD_BY_HASH: u8 = b'N';
const PREFIX_RECEIPT: u8 = b'R';
const PREFIX_BLOOM_L0: u8 = b'G';
const PREFIX_BLOOM_L1: u8 = b'J';
const PREFIX_ACCOUNT: u8 = b'A';
const PREFIX_CODE: u8 = b'C';
const PREFIX_NONCE_RECORD: u8 = b'W';
const PREFIX_DIRTY_SENDERS: u8 = b'X';
const PREFIX_VOTE_VERIFIED: u8 = b'V';
const PREFIX_STORAGE: u8 = b'S';

const META_LATEST_PERIOD: &[u8] = b"latest_period";
const META_FINALIZED_ANCHOR: &[u8] = b"finalized_anchor";

fn key1(prefix: u8, id: &[u8]) -> Vec<u8> {
    let mut k = Vec::with_capacity(1 + id.len());
    k.push(prefix);
    k.extend_from_slice(id);
    k
}

fn key2(prefix: u8, a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut k = Vec::with_capacity(1 + a.len() + b.len());
    k.push(prefix);
    k.extend_from_slice(a);
    k.extend_from_slice(b);
    k
}

/// One record per sender tracking the replay-protection window (§4.4):
/// `nonce_max` is the highest nonce ever finalised for this sender.
/// `watermark`, once set, is the floor at and below which any nonce is
/// rejected as stale — it starts unset and is only raised by
/// `replay::advance_watermarks` once a period falls outside
/// `REPLAY_PROTECTION_WINDOW`.
#[derive(Clone, Debug, Default, Serialize, serde::Deserialize)]
pub struct NonceRecord {
    pub nonce_max: Nonce,
    pub watermark: Option<Nonce>,
}

/// The set of DAG blocks flattened and executed for one finalised period,
/// together with the certify-votes that made it final, so a syncing peer can
/// verify the period without re-running the PBFT protocol itself (§4.5).
#[derive(Clone, Debug, Serialize, serde::Deserialize)]
pub struct PeriodData {
    pub anchor: BlockHash,
    pub blocks: Vec<BlockHash>,
    pub certified_votes: Vec<helix_core::vote::Vote>,
    /// Every transaction hash applied while finalising this period, in
    /// execution order, so the query facade can recover "what logs did
    /// this period produce" without re-walking the DAG (§4.1, §4.8).
    pub transactions: Vec<TxHash>,
}

/// A batch of pending writes across every logical column, committed to the
/// store atomically in one call. Mirrors the teacher's per-tree `put`
/// calls, but collapsed onto a single `sled::Batch` since the finaliser's
/// commit spans more columns than `sled::Transactional` can compose.
#[derive(Default)]
pub struct WriteBatch {
    inner: sled::Batch,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self {
            inner: sled::Batch::default(),
        }
    }

    fn put<T: Serialize>(&mut self, key: Vec<u8>, value: &T) -> Result<(), StoreError> {
        self.inner.insert(key, bincode::serialize(value)?);
        Ok(())
    }

    fn remove(&mut self, key: Vec<u8>) {
        self.inner.remove(key);
    }
}

/// The persistent store backing a node's chain state.
///
/// Wraps a single sled tree (the database's default tree); see the prefix
/// table above for the column layout. All reads are served directly from
/// sled; all multi-column writes go through a `WriteBatch` committed with
/// `commit`, never through individual `put` calls, so a crash between two
/// logically related writes (e.g. a receipt and its bloom chunk) is
/// impossible.
#[derive(Clone)]
pub struct Store {
    db: Arc<sled::Db>,
}

impl Store {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.db.apply_batch(batch.inner)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, StoreError> {
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    // ── Blocks ───────────────────────────────────────────────────────────

    pub fn stage_block(&self, batch: &mut WriteBatch, block: &DagBlock) -> Result<(), StoreError> {
        batch.put(key1(PREFIX_BLOCK, block.hash.as_bytes()), block)?;
        batch.put(
            key2(
                PREFIX_BLOCK_LEVEL,
                &block.body.level.to_be_bytes(),
                block.hash.as_bytes(),
            ),
            &(),
        )?;
        Ok(())
    }

    pub fn get_block(&self, hash: &BlockHash) -> Result<Option<DagBlock>, StoreError> {
        self.get(&key1(PREFIX_BLOCK, hash.as_bytes()))
    }

    pub fn block_exists(&self, hash: &BlockHash) -> Result<bool, StoreError> {
        Ok(self.db.contains_key(key1(PREFIX_BLOCK, hash.as_bytes()))?)
    }

    /// Every block hash recorded at exactly `level`, used to answer a peer's
    /// `GetBlocksLevel` request during sync.
    pub fn blocks_at_level(&self, level: Level) -> Result<Vec<BlockHash>, StoreError> {
        let prefix = key1(PREFIX_BLOCK_LEVEL, &level.to_be_bytes());
        let mut out = Vec::new();
        for entry in self.db.scan_prefix(&prefix) {
            let (key, _) = entry?;
            let hash_bytes = &key[prefix.len()..];
            let mut arr = [0u8; 32];
            arr.copy_from_slice(hash_bytes);
            out.push(BlockHash::from_bytes(arr));
        }
        Ok(out)
    }

    // ── Transactions ─────────────────────────────────────────────────────

    pub fn stage_transaction(
        &self,
        batch: &mut WriteBatch,
        tx: &Transaction,
    ) -> Result<(), StoreError> {
        batch.put(key1(PREFIX_TX, tx.hash.as_bytes()), tx)
    }

    pub fn get_transaction(&self, hash: &TxHash) -> Result<Option<Transaction>, StoreError> {
        self.get(&key1(PREFIX_TX, hash.as_bytes()))
    }

    pub fn stage_tx_period(
        &self,
        batch: &mut WriteBatch,
        tx: &TxHash,
        period: Period,
    ) -> Result<(), StoreError> {
        batch.put(key1(PREFIX_TX_PERIOD, tx.as_bytes()), &period)
    }

    pub fn tx_period(&self, tx: &TxHash) -> Result<Option<Period>, StoreError> {
        self.get(&key1(PREFIX_TX_PERIOD, tx.as_bytes()))
    }

    // ── Period data & final headers ──────────────────────────────────────

    pub fn stage_period_data(
        &self,
        batch: &mut WriteBatch,
        period: Period,
        data: &PeriodData,
    ) -> Result<(), StoreError> {
        batch.put(key1(PREFIX_PERIOD_DATA, &period.to_be_bytes()), data)
    }

    pub fn period_data(&self, period: Period) -> Result<Option<PeriodData>, StoreError> {
        self.get(&key1(PREFIX_PERIOD_DATA, &period.to_be_bytes()))
    }

    pub fn stage_final_header(
        &self,
        batch: &mut WriteBatch,
        header: &FinalHeader,
    ) -> Result<(), StoreError> {
        batch.put(
            key1(PREFIX_FINAL_HEADER, &header.period.to_be_bytes()),
            header,
        )?;
        let hash = header.hash();
        batch.put(key1(PREFIX_HASH_BY_PERIOD, &header.period.to_be_bytes()), &hash)?;
        batch.put(key1(PREFIX_PERIOD_BY_HASH, hash.as_bytes()), &header.period)
    }

    pub fn final_header(&self, period: Period) -> Result<Option<FinalHeader>, StoreError> {
        self.get(&key1(PREFIX_FINAL_HEADER, &period.to_be_bytes()))
    }

    pub fn block_hash_by_period(&self, period: Period) -> Result<Option<BlockHash>, StoreError> {
        self.get(&key1(PREFIX_HASH_BY_PERIOD, &period.to_be_bytes()))
    }

    pub fn period_by_hash(&self, hash: &BlockHash) -> Result<Option<Period>, StoreError> {
        self.get(&key1(PREFIX_PERIOD_BY_HASH, hash.as_bytes()))
    }

    pub fn stage_latest_period(&self, batch: &mut WriteBatch, period: Period) -> Result<(), StoreError> {
        batch.put(key1(PREFIX_META, META_LATEST_PERIOD), &period)
    }

    pub fn latest_period(&self) -> Result<Period, StoreError> {
        Ok(self.get(&key1(PREFIX_META, META_LATEST_PERIOD))?.unwrap_or(0))
    }

    pub fn stage_finalized_anchor(
        &self,
        batch: &mut WriteBatch,
        anchor: BlockHash,
    ) -> Result<(), StoreError> {
        batch.put(key1(PREFIX_META, META_FINALIZED_ANCHOR), &anchor)
    }

    pub fn finalized_anchor(&self) -> Result<BlockHash, StoreError> {
        Ok(self
            .get(&key1(PREFIX_META, META_FINALIZED_ANCHOR))?
            .unwrap_or_else(BlockHash::zero))
    }

    // ── Receipts & log blooms ────────────────────────────────────────────

    pub fn stage_receipt(
        &self,
        batch: &mut WriteBatch,
        tx: &TxHash,
        receipt: &Receipt,
    ) -> Result<(), StoreError> {
        batch.put(key1(PREFIX_RECEIPT, tx.as_bytes()), receipt)
    }

    pub fn receipt(&self, tx: &TxHash) -> Result<Option<Receipt>, StoreError> {
        self.get(&key1(PREFIX_RECEIPT, tx.as_bytes()))
    }

    pub fn stage_bloom_chunk_l0(
        &self,
        batch: &mut WriteBatch,
        chunk_index: u64,
        bloom: &helix_core::types::Bloom,
    ) -> Result<(), StoreError> {
        batch.put(key1(PREFIX_BLOOM_L0, &chunk_index.to_be_bytes()), bloom)
    }

    pub fn bloom_chunk_l0(&self, chunk_index: u64) -> Result<Option<helix_core::types::Bloom>, StoreError> {
        self.get(&key1(PREFIX_BLOOM_L0, &chunk_index.to_be_bytes()))
    }

    pub fn stage_bloom_chunk_l1(
        &self,
        batch: &mut WriteBatch,
        chunk_index: u64,
        bloom: &helix_core::types::Bloom,
    ) -> Result<(), StoreError> {
        batch.put(key1(PREFIX_BLOOM_L1, &chunk_index.to_be_bytes()), bloom)
    }

    pub fn bloom_chunk_l1(&self, chunk_index: u64) -> Result<Option<helix_core::types::Bloom>, StoreError> {
        self.get(&key1(PREFIX_BLOOM_L1, &chunk_index.to_be_bytes()))
    }

    // ── Accounts & code ──────────────────────────────────────────────────

    pub fn stage_account(
        &self,
        batch: &mut WriteBatch,
        address: Address,
        account: &Account,
    ) -> Result<(), StoreError> {
        batch.put(key1(PREFIX_ACCOUNT, address.as_slice()), account)
    }

    pub fn account(&self, address: Address) -> Result<Account, StoreError> {
        Ok(self
            .get(&key1(PREFIX_ACCOUNT, address.as_slice()))?
            .unwrap_or_default())
    }

    pub fn stage_code(
        &self,
        batch: &mut WriteBatch,
        code_hash: &[u8; 32],
        code: &[u8],
    ) -> Result<(), StoreError> {
        batch.put(key1(PREFIX_CODE, code_hash), &code.to_vec())
    }

    pub fn code(&self, code_hash: &[u8; 32]) -> Result<Vec<u8>, StoreError> {
        Ok(self.get(&key1(PREFIX_CODE, code_hash))?.unwrap_or_default())
    }

    /// A flat per-(address, slot) value, standing in for `state_acc_trie_*`'s
    /// Merkle-Patricia storage nodes. Sufficient to give `account storage` a
    /// real, addressable read/write path without a bytecode interpreter —
    /// matching the simplified, non-trie account model `simple_root` already
    /// uses for transaction/receipt roots.
    pub fn stage_storage(
        &self,
        batch: &mut WriteBatch,
        address: Address,
        slot: B256,
        value: B256,
    ) -> Result<(), StoreError> {
        batch.put(key2(PREFIX_STORAGE, address.as_slice(), slot.as_slice()), &value)
    }

    pub fn storage(&self, address: Address, slot: B256) -> Result<B256, StoreError> {
        Ok(self
            .get(&key2(PREFIX_STORAGE, address.as_slice(), slot.as_slice()))?
            .unwrap_or(B256::ZERO))
    }

    // ── Replay protection ─────────────────────────────────────────────────

    pub fn nonce_record(&self, sender: Address) -> Result<NonceRecord, StoreError> {
        Ok(self
            .get(&key1(PREFIX_NONCE_RECORD, sender.as_slice()))?
            .unwrap_or_default())
    }

    pub fn stage_nonce_record(
        &self,
        batch: &mut WriteBatch,
        sender: Address,
        record: &NonceRecord,
    ) -> Result<(), StoreError> {
        batch.put(key1(PREFIX_NONCE_RECORD, sender.as_slice()), record)
    }

    /// Senders who finalised a transaction in `period`, each paired with
    /// their `nonce_max` snapshot *as of that period* — not the sender's
    /// current `nonce_max`, which may have advanced further since. Promoting
    /// the snapshot rather than the live value keeps watermark advancement
    /// from rejecting nonces a sender hasn't used yet.
    pub fn dirty_senders(&self, period: Period) -> Result<Vec<(Address, Nonce)>, StoreError> {
        Ok(self
            .get(&key1(PREFIX_DIRTY_SENDERS, &period.to_be_bytes()))?
            .unwrap_or_default())
    }

    pub fn stage_dirty_senders(
        &self,
        batch: &mut WriteBatch,
        period: Period,
        senders: &[(Address, Nonce)],
    ) -> Result<(), StoreError> {
        batch.put(key1(PREFIX_DIRTY_SENDERS, &period.to_be_bytes()), &senders.to_vec())
    }

    pub fn clear_dirty_senders(&self, batch: &mut WriteBatch, period: Period) {
        batch.remove(key1(PREFIX_DIRTY_SENDERS, &period.to_be_bytes()));
    }

    // ── Votes ────────────────────────────────────────────────────────────

    pub fn vote_verified(&self, hash: &VoteHash) -> Result<bool, StoreError> {
        Ok(self.db.contains_key(key1(PREFIX_VOTE_VERIFIED, hash.as_bytes()))?)
    }

    pub fn stage_vote_verified(&self, batch: &mut WriteBatch, hash: &VoteHash) -> Result<(), StoreError> {
        batch.put(key1(PREFIX_VOTE_VERIFIED, hash.as_bytes()), &())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_core::types::Balance;

    fn temp_store() -> Store {
        let dir = tempfile_path();
        Store::open(dir).unwrap()
    }

    fn tempfile_path() -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("helix-state-test-{}", uniqueish()));
        p
    }

    fn uniqueish() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }

    #[test]
    fn account_round_trips_through_a_batch() {
        let store = temp_store();
        let address = Address::repeat_byte(0x11);
        let account = Account::new(Balance::from(500u64));

        let mut batch = WriteBatch::new();
        store.stage_account(&mut batch, address, &account).unwrap();
        store.commit(batch).unwrap();

        assert_eq!(store.account(address).unwrap(), account);
    }

    #[test]
    fn missing_account_is_the_default() {
        let store = temp_store();
        assert_eq!(store.account(Address::ZERO).unwrap(), Account::default());
    }

    #[test]
    fn blocks_at_level_finds_only_that_level() {
        let store = temp_store();
        let body = helix_core::block::DagBlockBody {
            pivot: BlockHash::zero(),
            tips: vec![],
            transactions: vec![],
            level: 3,
            timestamp: 0,
        };
        let block = DagBlock {
            body,
            signature: helix_core::types::RecoverableSignature([0u8; 65]),
            hash: BlockHash::from_bytes([7u8; 32]),
            sender: Address::ZERO,
        };

        let mut batch = WriteBatch::new();
        store.stage_block(&mut batch, &block).unwrap();
        store.commit(batch).unwrap();

        assert_eq!(store.blocks_at_level(3).unwrap(), vec![block.hash]);
        assert!(store.blocks_at_level(4).unwrap().is_empty());
    }

    #[test]
    fn nonce_record_round_trips() {
        let store = temp_store();
        let sender = Address::repeat_byte(0x22);
        let record = NonceRecord {
            nonce_max: 10,
            watermark: Some(3),
        };
        let mut batch = WriteBatch::new();
        store.stage_nonce_record(&mut batch, sender, &record).unwrap();
        store.commit(batch).unwrap();

        let read = store.nonce_record(sender).unwrap();
        assert_eq!(read.nonce_max, 10);
        assert_eq!(read.watermark, Some(3));
    }
}
