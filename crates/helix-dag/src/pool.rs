use std::collections::{HashMap, HashSet};

use helix_core::block::DagBlock;
use helix_core::transaction::Transaction;
use helix_core::types::{Address, BlockHash, Nonce, Timestamp, TxHash};
use helix_core::HelixError;

use crate::manager::DagManager;
use crate::validation;

/// Stages blocks and transactions arriving from peers or RPC before they are
/// linked into the DAG manager or handed to a mempool.
///
/// Verification is staged: `submit_block`/`submit_transaction` perform the
/// cheap structural and cryptographic checks synchronously; parent-linking
/// (which needs a consistent view of the DAG) happens in `drain_ready`, the
/// single-threaded step the concurrency model reserves for the pool.
pub struct Pool {
    /// Blocks that passed shape validation but are waiting on one or more
    /// parents — also the orphan set, tracked by time first seen.
    pending_blocks: HashMap<BlockHash, (DagBlock, Timestamp)>,
    finalized_block_hashes: HashSet<BlockHash>,
    transactions: HashMap<TxHash, Transaction>,
    gas_limit: u64,
}

impl Pool {
    pub fn new(gas_limit: u64) -> Self {
        Self {
            pending_blocks: HashMap::new(),
            finalized_block_hashes: HashSet::new(),
            transactions: HashMap::new(),
            gas_limit,
        }
    }

    /// `submit_block`: rejects a block whose hash is already known, whose
    /// signature does not recover, or whose parent count is out of range.
    /// A structurally valid block is staged pending parent availability.
    pub fn submit_block(&mut self, block: DagBlock, now: Timestamp) -> Result<(), HelixError> {
        if self.is_known_block(&block.hash) {
            return Err(HelixError::BlockDuplicate(block.hash));
        }
        validation::validate_block_shape(&block)?;
        self.pending_blocks.insert(block.hash, (block, now));
        Ok(())
    }

    /// `submit_transaction`: rejects on duplicate hash, bad signature, gas
    /// limit in excess of the block gas limit, or a stale nonce per the
    /// replay-protection watermark. Nonce gaps are never rejected here.
    pub fn submit_transaction<F>(
        &mut self,
        tx: Transaction,
        is_stale: F,
    ) -> Result<(), HelixError>
    where
        F: Fn(Address, Nonce) -> bool,
    {
        if self.transactions.contains_key(&tx.hash) {
            return Err(HelixError::TxDuplicate(tx.hash));
        }
        if tx.compute_hash() != tx.hash {
            return Err(HelixError::TxBadSignature(tx.hash));
        }
        let digest = tx.body.signing_digest();
        helix_crypto::verify_sender(&digest, &tx.signature, tx.sender)
            .map_err(|_| HelixError::TxBadSignature(tx.hash))?;
        if tx.gas_limit() > self.gas_limit {
            return Err(HelixError::TxGasExceedsBlockLimit(
                tx.hash,
                tx.gas_limit(),
                self.gas_limit,
            ));
        }
        if is_stale(tx.sender, tx.nonce()) {
            return Err(HelixError::TxStaleNonce {
                tx: tx.hash,
                sender: tx.sender,
                nonce: tx.nonce(),
            });
        }
        self.transactions.insert(tx.hash, tx);
        Ok(())
    }

    pub fn transaction(&self, hash: &TxHash) -> Option<&Transaction> {
        self.transactions.get(hash)
    }

    pub fn remove_transaction(&mut self, hash: &TxHash) -> Option<Transaction> {
        self.transactions.remove(hash)
    }

    /// Every transaction currently staged, for a block proposer to pick a
    /// batch from. Order is unspecified; callers that care about priority
    /// sort the result themselves.
    pub fn pending_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    /// True if `hash` has been seen in the pool (pending block) or has
    /// already been finalised — lets the wire layer answer peer queries
    /// without a store hit.
    pub fn is_known_block(&self, hash: &BlockHash) -> bool {
        self.pending_blocks.contains_key(hash) || self.finalized_block_hashes.contains(hash)
    }

    pub fn is_known_transaction(&self, hash: &TxHash) -> bool {
        self.transactions.contains_key(hash)
    }

    /// Mark hashes as finalised so later duplicate submissions are rejected
    /// without a store round-trip. The DAG manager's own bookkeeping is
    /// updated separately via `mark_finalised`.
    pub fn note_finalized(&mut self, hashes: impl IntoIterator<Item = BlockHash>) {
        self.finalized_block_hashes.extend(hashes);
    }

    /// Link every pending block whose parents are all known into the DAG,
    /// repeating until no further progress is made (so a chain of orphans
    /// resolves in one call once its root parent arrives). Blocks that fail
    /// DAG-level validation (bad level) are dropped rather than retried.
    pub fn drain_ready(&mut self, dag: &mut DagManager) -> Vec<BlockHash> {
        let mut inserted = Vec::new();
        loop {
            let ready: Vec<BlockHash> = self
                .pending_blocks
                .iter()
                .filter(|(_, (block, _))| block.parents().all(|p| dag.contains(p)))
                .map(|(hash, _)| *hash)
                .collect();

            if ready.is_empty() {
                break;
            }

            for hash in ready {
                let (block, _) = self.pending_blocks.remove(&hash).expect("just selected");
                if dag.insert(block).is_ok() {
                    inserted.push(hash);
                }
            }
        }
        inserted
    }

    /// Drop pending blocks that have been waiting on parents longer than
    /// `timeout_secs` and are still not ready.
    pub fn expire_orphans(&mut self, now: Timestamp, timeout_secs: i64) -> Vec<BlockHash> {
        let expired: Vec<BlockHash> = self
            .pending_blocks
            .iter()
            .filter(|(_, (_, seen_at))| now - seen_at >= timeout_secs)
            .map(|(hash, _)| *hash)
            .collect();
        for hash in &expired {
            self.pending_blocks.remove(hash);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_core::block::DagBlockBody;
    use helix_crypto::SigningKeyPair;

    fn signed_block(pivot: BlockHash, level: u64) -> DagBlock {
        let keypair = SigningKeyPair::generate();
        let body = DagBlockBody {
            pivot,
            tips: vec![],
            transactions: vec![],
            level,
            timestamp: 0,
        };
        let digest = body.signing_digest();
        let signature = keypair.sign(&digest).unwrap();
        let mut block = DagBlock {
            body,
            signature,
            hash: BlockHash::zero(),
            sender: keypair.address,
        };
        block.hash = block.compute_hash();
        block
    }

    #[test]
    fn duplicate_block_is_rejected() {
        let mut pool = Pool::new(30_000_000);
        let block = signed_block(BlockHash::zero(), 0);
        pool.submit_block(block.clone(), 0).unwrap();
        assert!(matches!(
            pool.submit_block(block, 1),
            Err(HelixError::BlockDuplicate(_))
        ));
    }

    #[test]
    fn orphan_resolves_once_parent_links() {
        let mut pool = Pool::new(30_000_000);
        let mut dag = DagManager::new(BlockHash::zero());

        let genesis = signed_block(BlockHash::zero(), 0);
        let genesis_hash = genesis.hash;
        let child = signed_block(genesis_hash, 1);
        let child_hash = child.hash;

        // Child arrives first: it is an orphan until genesis links.
        pool.submit_block(child, 0).unwrap();
        assert!(pool.drain_ready(&mut dag).is_empty());

        pool.submit_block(genesis, 0).unwrap();
        let inserted = pool.drain_ready(&mut dag);
        assert!(inserted.contains(&genesis_hash));
        assert!(inserted.contains(&child_hash));
        assert!(dag.contains(&child_hash));
    }

    #[test]
    fn stale_orphan_expires() {
        let mut pool = Pool::new(30_000_000);
        let orphan = signed_block(BlockHash::from_bytes([5u8; 32]), 1);
        let hash = orphan.hash;
        pool.submit_block(orphan, 0).unwrap();

        assert!(pool.expire_orphans(5, 10).is_empty());
        let expired = pool.expire_orphans(11, 10);
        assert_eq!(expired, vec![hash]);
        assert!(!pool.is_known_block(&hash));
    }

    #[test]
    fn gas_limit_rejects_oversized_transaction() {
        use helix_core::transaction::{Recipient, TransactionBody};
        use helix_core::types::Balance;

        let mut pool = Pool::new(21_000);
        let keypair = SigningKeyPair::generate();
        let body = TransactionBody {
            nonce: 0,
            gas_price: Balance::from(1u64),
            gas_limit: 50_000,
            to: Recipient::Create,
            value: Balance::from(0u64),
            data: vec![],
        };
        let digest = body.signing_digest();
        let signature = keypair.sign(&digest).unwrap();
        let mut tx = Transaction {
            body,
            signature,
            hash: TxHash::from_bytes([0u8; 32]),
            sender: keypair.address,
        };
        tx.hash = tx.compute_hash();

        let result = pool.submit_transaction(tx, |_, _| false);
        assert!(matches!(
            result,
            Err(HelixError::TxGasExceedsBlockLimit(..))
        ));
    }
}
