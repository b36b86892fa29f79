use std::collections::HashSet;

use helix_core::constants::{BLOOM_LEVEL0_FANOUT, BLOOM_LEVEL1_FANOUT, DEFAULT_GAS_LIMIT};
use helix_core::header::FinalHeader;
use helix_core::types::{Address, BlockHash, Bloom, Period, Timestamp, TxHash};
use helix_core::vote::Vote;
use helix_dag::{DagManager, Pool};

use crate::error::StoreError;
use crate::executor::StateExecutor;
use crate::replay;
use crate::store::{PeriodData, Store, WriteBatch};

/// Rolls a contiguous range of newly-finalised DAG blocks into one period:
/// flattens them via the DAG's deterministic order, executes every
/// transaction exactly once against the store, and writes the resulting
/// receipts, account state, and `FinalHeader` in a single atomic batch
/// (§4.6).
pub struct Finaliser<E> {
    store: Store,
    executor: E,
}

impl<E: StateExecutor> Finaliser<E> {
    pub fn new(store: Store, executor: E) -> Self {
        Self { store, executor }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Finalise everything in `S(anchor)` — the pivot-chain anchor block and
    /// every non-finalised block it transitively references — as `period`.
    /// `certified_votes` is the ≥2f+1 certify-vote set the PBFT machine
    /// collected for `anchor`; it is persisted alongside the period so a
    /// syncing peer can verify finality without re-running the protocol.
    pub fn finalize_period(
        &self,
        dag: &mut DagManager,
        pool: &mut Pool,
        anchor: BlockHash,
        period: Period,
        author: Address,
        timestamp: Timestamp,
        certified_votes: Vec<Vote>,
    ) -> Result<FinalHeader, StoreError> {
        let order = dag.dag_order_below(anchor);
        let mut batch = WriteBatch::new();

        let mut seen_tx: HashSet<TxHash> = HashSet::new();
        let mut cumulative_gas_used: u64 = 0;
        let mut aggregate_bloom = Bloom::default();
        let mut applied_tx_hashes: Vec<TxHash> = Vec::new();
        let mut receipts: Vec<helix_core::receipt::Receipt> = Vec::new();

        for block_hash in &order {
            let block = dag
                .get(block_hash)
                .ok_or(StoreError::MissingBlock(*block_hash))?;
            self.store.stage_block(&mut batch, block)?;

            for tx_hash in &block.body.transactions {
                if !seen_tx.insert(*tx_hash) {
                    continue;
                }
                let tx = pool
                    .remove_transaction(tx_hash)
                    .ok_or(StoreError::MissingTransaction(*tx_hash))?;

                // A stale-nonce transaction is dropped here, not failed: its
                // inclusion in a block does not abort the period (§4.4).
                if replay::is_stale(&self.store, tx.sender, tx.nonce())? {
                    continue;
                }

                let receipt = self
                    .executor
                    .execute(&self.store, &mut batch, &tx, cumulative_gas_used)?;
                cumulative_gas_used = receipt.cumulative_gas_used;
                aggregate_bloom.or_with(&receipt.bloom());

                self.store.stage_transaction(&mut batch, &tx)?;
                self.store.stage_receipt(&mut batch, tx_hash, &receipt)?;
                self.store.stage_tx_period(&mut batch, tx_hash, period)?;
                replay::record(&self.store, &mut batch, tx.sender, tx.nonce(), period)?;

                applied_tx_hashes.push(*tx_hash);
                receipts.push(receipt);
            }
        }

        let parent_hash = match period.checked_sub(1) {
            Some(prev) => self
                .store
                .final_header(prev)?
                .map(|h| h.hash())
                .unwrap_or_else(BlockHash::zero),
            None => BlockHash::zero(),
        };

        let header = FinalHeader {
            period,
            parent_hash,
            author,
            timestamp,
            state_root: Default::default(),
            transactions_root: simple_root(applied_tx_hashes.iter().cloned()),
            receipts_root: simple_root(receipts.iter().cloned()),
            log_bloom: aggregate_bloom,
            gas_used: cumulative_gas_used,
            gas_limit: DEFAULT_GAS_LIMIT,
        };

        self.store.stage_final_header(&mut batch, &header)?;
        self.store.stage_period_data(
            &mut batch,
            period,
            &PeriodData {
                anchor,
                blocks: order.clone(),
                certified_votes,
                transactions: applied_tx_hashes.clone(),
            },
        )?;
        self.store.stage_latest_period(&mut batch, period)?;
        self.store.stage_finalized_anchor(&mut batch, anchor)?;
        replay::advance_watermarks(&self.store, &mut batch, period)?;
        self.accrue_bloom_index(&mut batch, period, &header.log_bloom)?;

        self.store.commit(batch)?;

        dag.mark_finalised(&order, anchor);
        pool.note_finalized(order.iter().copied());

        Ok(header)
    }

    /// Fold a newly finalised period's bloom into its level-0 chunk, then the
    /// level-0 chunk into its level-1 chunk. Both folds are a plain
    /// bitwise-OR, so accruing incrementally (rather than rebuilding a chunk
    /// from scratch) is always correct (§4.6).
    fn accrue_bloom_index(
        &self,
        batch: &mut WriteBatch,
        period: Period,
        period_bloom: &Bloom,
    ) -> Result<(), StoreError> {
        let l0_index = period / BLOOM_LEVEL0_FANOUT;
        let mut l0 = self.store.bloom_chunk_l0(l0_index)?.unwrap_or_default();
        l0.or_with(period_bloom);
        self.store.stage_bloom_chunk_l0(batch, l0_index, &l0)?;

        let l1_index = l0_index / BLOOM_LEVEL1_FANOUT;
        let mut l1 = self.store.bloom_chunk_l1(l1_index)?.unwrap_or_default();
        l1.or_with(period_bloom);
        self.store.stage_bloom_chunk_l1(batch, l1_index, &l1)?;
        Ok(())
    }

    /// True if `bloom` might be present anywhere in `period`'s log index —
    /// letting the query facade skip reading receipts for periods the
    /// bloom hierarchy can rule out entirely (§4.6, §4.8).
    pub fn period_may_contain(&self, period: Period, needle: &Bloom) -> Result<bool, StoreError> {
        crate::query::period_may_contain(&self.store, period, needle)
    }
}

/// Digest of the concatenation of RLP-encoded items, standing in for a real
/// Merkle-Patricia trie root. Sufficient to detect tampering and to change
/// whenever the block's contents change, but not a Merkle proof root —
/// matching the store's simplified (non-trie) account model.
fn simple_root<T, I>(items: I) -> alloy_primitives::B256
where
    T: alloy_rlp::Encodable,
    I: IntoIterator<Item = T>,
{
    let mut buf = Vec::new();
    for item in items {
        item.encode(&mut buf);
    }
    alloy_primitives::B256::from(helix_core::hash_bytes(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_core::account::Account;
    use helix_core::block::{DagBlock, DagBlockBody};
    use helix_core::transaction::{Recipient, Transaction, TransactionBody};
    use helix_core::types::{Balance, TxHash};
    use helix_crypto::SigningKeyPair;

    use crate::executor::SimpleStateExecutor;

    fn temp_store() -> Store {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let mut p = std::env::temp_dir();
        p.push(format!(
            "helix-state-finalizer-test-{}",
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        Store::open(p).unwrap()
    }

    fn signed_tx(key: &SigningKeyPair, to: Address, value: Balance, nonce: u64) -> Transaction {
        let body = TransactionBody {
            nonce,
            gas_price: Balance::from(1u64),
            gas_limit: 21_000,
            to: Recipient::Call(to),
            value,
            data: vec![],
        };
        let digest = body.signing_digest();
        let signature = key.sign(&digest).unwrap();
        let mut tx = Transaction {
            body,
            signature,
            hash: TxHash::from_bytes([0u8; 32]),
            sender: key.address,
        };
        tx.hash = tx.compute_hash();
        tx
    }

    fn signed_block(key: &SigningKeyPair, pivot: BlockHash, level: u64, txs: Vec<TxHash>) -> DagBlock {
        let body = DagBlockBody {
            pivot,
            tips: vec![],
            transactions: txs,
            level,
            timestamp: 0,
        };
        let digest = body.signing_digest();
        let signature = key.sign(&digest).unwrap();
        let mut block = DagBlock {
            body,
            signature,
            hash: BlockHash::zero(),
            sender: key.address,
        };
        block.hash = block.compute_hash();
        block
    }

    #[test]
    fn finalizing_a_single_block_applies_its_transaction_and_advances_period() {
        let store = temp_store();
        let sender_key = SigningKeyPair::generate();
        let block_key = SigningKeyPair::generate();
        let recipient = Address::repeat_byte(0x77);

        let mut batch = WriteBatch::new();
        store
            .stage_account(&mut batch, sender_key.address, &Account::new(Balance::from(50_000u64)))
            .unwrap();
        store.commit(batch).unwrap();

        let tx = signed_tx(&sender_key, recipient, Balance::from(2_000u64), 0);
        let tx_hash = tx.hash;

        let mut dag = DagManager::new(BlockHash::zero());
        let mut pool = Pool::new(30_000_000);
        pool.submit_transaction(tx, |_, _| false).unwrap();

        let genesis = signed_block(&block_key, BlockHash::zero(), 0, vec![tx_hash]);
        let anchor = genesis.hash;
        dag.insert(genesis).unwrap();

        let finaliser = Finaliser::new(store, SimpleStateExecutor);
        let header = finaliser
            .finalize_period(&mut dag, &mut pool, anchor, 1, block_key.address, 0, vec![])
            .unwrap();

        assert_eq!(header.period, 1);
        assert_eq!(
            finaliser.store().account(recipient).unwrap().balance,
            Balance::from(2_000u64)
        );
        assert_eq!(finaliser.store().latest_period().unwrap(), 1);
        assert!(dag.tips().is_empty());
    }

    #[test]
    fn bloom_index_rules_out_periods_without_a_matching_log() {
        let store = temp_store();
        let block_key = SigningKeyPair::generate();
        let mut dag = DagManager::new(BlockHash::zero());
        let mut pool = Pool::new(30_000_000);

        let genesis = signed_block(&block_key, BlockHash::zero(), 0, vec![]);
        let anchor = genesis.hash;
        dag.insert(genesis).unwrap();

        let finaliser = Finaliser::new(store, SimpleStateExecutor);
        finaliser
            .finalize_period(&mut dag, &mut pool, anchor, 1, block_key.address, 0, vec![])
            .unwrap();

        let mut needle = Bloom::default();
        needle.accrue(Address::repeat_byte(0x99).as_slice());
        assert!(!finaliser.period_may_contain(1, &needle).unwrap());
    }
}
