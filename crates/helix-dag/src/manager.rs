use std::collections::{HashMap, HashSet};

use helix_core::block::DagBlock;
use helix_core::types::{BlockHash, Level};

use crate::error::DagError;
use crate::validation;

/// The non-finalised frontier of the block DAG: every admitted block that has
/// not yet been rolled into a finalised period.
///
/// Single-writer (linking is serialised through the pool's drain step);
/// readers take a consistent snapshot via `tips()`/`max_level()`/
/// `dag_order_below()` rather than iterating internal maps directly.
pub struct DagManager {
    finalized_anchor: BlockHash,
    blocks: HashMap<BlockHash, DagBlock>,
    levels: HashMap<BlockHash, Level>,
    pivot_chain_len: HashMap<BlockHash, u64>,
    /// Number of non-finalised blocks referencing each hash as a parent.
    referenced_by: HashMap<BlockHash, u32>,
    tips: HashSet<BlockHash>,
    max_level: Level,
}

impl DagManager {
    /// `finalized_anchor` is the hash of the most recently finalised period's
    /// anchor block — the implicit root every non-finalised block's parent
    /// chain must bottom out at.
    pub fn new(finalized_anchor: BlockHash) -> Self {
        Self {
            finalized_anchor,
            blocks: HashMap::new(),
            levels: HashMap::new(),
            pivot_chain_len: HashMap::new(),
            referenced_by: HashMap::new(),
            tips: HashSet::new(),
            max_level: 0,
        }
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.blocks.contains_key(hash) || *hash == self.finalized_anchor
    }

    fn level_of(&self, hash: &BlockHash) -> Option<Level> {
        if *hash == self.finalized_anchor {
            Some(0)
        } else {
            self.levels.get(hash).copied()
        }
    }

    fn pivot_len_of(&self, hash: &BlockHash) -> u64 {
        if *hash == self.finalized_anchor {
            0
        } else {
            *self.pivot_chain_len.get(hash).unwrap_or(&0)
        }
    }

    /// Link a structurally and cryptographically valid block into the DAG,
    /// recomputing its level and updating the tip set.
    pub fn insert(&mut self, block: DagBlock) -> Result<(), DagError> {
        if self.blocks.contains_key(&block.hash) {
            return Err(DagError::DuplicateBlock(block.hash));
        }

        if !block.is_genesis() {
            validation::validate_parents(&block, |h| self.level_of(h))?;
        }

        let hash = block.hash;
        let level = block.level();
        let pivot = block.body.pivot;

        for parent in block.parents() {
            *self.referenced_by.entry(*parent).or_insert(0) += 1;
            self.tips.remove(parent);
        }

        let pivot_len = if block.is_genesis() {
            0
        } else {
            self.pivot_len_of(&pivot) + 1
        };

        self.levels.insert(hash, level);
        self.pivot_chain_len.insert(hash, pivot_len);
        self.blocks.insert(hash, block);
        self.tips.insert(hash);
        self.max_level = self.max_level.max(level);

        Ok(())
    }

    pub fn tips(&self) -> Vec<BlockHash> {
        self.tips.iter().copied().collect()
    }

    pub fn max_level(&self) -> Level {
        self.max_level
    }

    pub fn get(&self, hash: &BlockHash) -> Option<&DagBlock> {
        self.blocks.get(hash)
    }

    /// The pivot-tip selection rule: maximum level, then longest pivot chain,
    /// then numerically smallest hash. Total and deterministic over any
    /// non-empty tip set.
    pub fn pivot_tip(&self) -> Option<BlockHash> {
        self.tips
            .iter()
            .copied()
            .max_by(|a, b| {
                let level_a = self.level_of(a).unwrap_or(0);
                let level_b = self.level_of(b).unwrap_or(0);
                level_a
                    .cmp(&level_b)
                    .then_with(|| self.pivot_len_of(a).cmp(&self.pivot_len_of(b)))
                    .then_with(|| b.cmp(a)) // smaller hash wins, so reverse for max_by
            })
    }

    /// The deterministic linearisation of `S(anchor_hash)`: every
    /// non-finalised block reachable from `anchor_hash` by walking parent
    /// edges until hitting the finalised frontier, ordered by (level
    /// ascending, hash ascending).
    pub fn dag_order_below(&self, anchor_hash: BlockHash) -> Vec<BlockHash> {
        let mut seen: HashSet<BlockHash> = HashSet::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(anchor_hash);
        seen.insert(anchor_hash);

        while let Some(hash) = queue.pop_front() {
            if hash == self.finalized_anchor {
                continue;
            }
            let Some(block) = self.blocks.get(&hash) else {
                continue;
            };
            for parent in block.parents() {
                if *parent == self.finalized_anchor {
                    continue;
                }
                if seen.insert(*parent) {
                    queue.push_back(*parent);
                }
            }
        }

        let mut ordered: Vec<BlockHash> = seen
            .into_iter()
            .filter(|h| *h != self.finalized_anchor)
            .collect();
        ordered.sort_by_key(|h| (self.level_of(h).unwrap_or(0), *h));
        ordered
    }

    /// Remove finalised hashes from the non-finalised index and tip set, and
    /// advance the implicit root to `new_anchor`.
    pub fn mark_finalised(&mut self, hashes: &[BlockHash], new_anchor: BlockHash) {
        for hash in hashes {
            self.blocks.remove(hash);
            self.levels.remove(hash);
            self.pivot_chain_len.remove(hash);
            self.referenced_by.remove(hash);
            self.tips.remove(hash);
        }
        self.finalized_anchor = new_anchor;
    }

    pub fn finalized_anchor(&self) -> BlockHash {
        self.finalized_anchor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_core::block::DagBlockBody;
    use helix_core::types::{Address, RecoverableSignature};

    fn block(hash: [u8; 32], pivot: BlockHash, tips: Vec<BlockHash>, level: Level) -> DagBlock {
        DagBlock {
            body: DagBlockBody {
                pivot,
                tips,
                transactions: vec![],
                level,
                timestamp: 0,
            },
            signature: RecoverableSignature([0u8; 65]),
            hash: BlockHash::from_bytes(hash),
            sender: Address::ZERO,
        }
    }

    #[test]
    fn genesis_becomes_sole_tip() {
        let mut dag = DagManager::new(BlockHash::zero());
        let genesis = block([1u8; 32], BlockHash::zero(), vec![], 0);
        dag.insert(genesis).unwrap();
        assert_eq!(dag.tips(), vec![BlockHash::from_bytes([1u8; 32])]);
        assert_eq!(dag.max_level(), 0);
    }

    #[test]
    fn child_removes_parent_from_tips() {
        let mut dag = DagManager::new(BlockHash::zero());
        let genesis_hash = BlockHash::from_bytes([1u8; 32]);
        dag.insert(block([1u8; 32], BlockHash::zero(), vec![], 0))
            .unwrap();

        let child_hash = BlockHash::from_bytes([2u8; 32]);
        let mut child = block([2u8; 32], genesis_hash, vec![], 1);
        child.hash = child_hash;
        dag.insert(child).unwrap();

        assert_eq!(dag.tips(), vec![child_hash]);
        assert_eq!(dag.max_level(), 1);
    }

    #[test]
    fn pivot_tip_prefers_higher_level() {
        let mut dag = DagManager::new(BlockHash::zero());
        let genesis_hash = BlockHash::from_bytes([1u8; 32]);
        dag.insert(block([1u8; 32], BlockHash::zero(), vec![], 0))
            .unwrap();
        let low = BlockHash::from_bytes([2u8; 32]);
        dag.insert(block([2u8; 32], genesis_hash, vec![], 1))
            .unwrap();
        let high_a = BlockHash::from_bytes([3u8; 32]);
        dag.insert(block([3u8; 32], low, vec![], 2)).unwrap();

        assert_eq!(dag.pivot_tip(), Some(high_a));
    }

    #[test]
    fn tie_break_picks_smaller_hash() {
        let mut dag = DagManager::new(BlockHash::zero());
        let genesis_hash = BlockHash::from_bytes([1u8; 32]);
        dag.insert(block([1u8; 32], BlockHash::zero(), vec![], 0))
            .unwrap();
        dag.insert(block([10u8; 32], genesis_hash, vec![], 1))
            .unwrap();
        dag.insert(block([5u8; 32], genesis_hash, vec![], 1))
            .unwrap();

        assert_eq!(dag.pivot_tip(), Some(BlockHash::from_bytes([5u8; 32])));
    }

    #[test]
    fn dag_order_below_is_ordered_by_level_then_hash() {
        let mut dag = DagManager::new(BlockHash::zero());
        let genesis_hash = BlockHash::from_bytes([1u8; 32]);
        dag.insert(block([1u8; 32], BlockHash::zero(), vec![], 0))
            .unwrap();
        let a = BlockHash::from_bytes([3u8; 32]);
        let b = BlockHash::from_bytes([2u8; 32]);
        dag.insert(block([3u8; 32], genesis_hash, vec![], 1))
            .unwrap();
        dag.insert(block([2u8; 32], genesis_hash, vec![], 1))
            .unwrap();
        let anchor = BlockHash::from_bytes([4u8; 32]);
        dag.insert(block([4u8; 32], a, vec![b], 2)).unwrap();

        let order = dag.dag_order_below(anchor);
        assert_eq!(order, vec![genesis_hash, b, a, anchor]);
    }

    #[test]
    fn mark_finalised_clears_index_and_advances_anchor() {
        let mut dag = DagManager::new(BlockHash::zero());
        let genesis_hash = BlockHash::from_bytes([1u8; 32]);
        dag.insert(block([1u8; 32], BlockHash::zero(), vec![], 0))
            .unwrap();
        dag.mark_finalised(&[genesis_hash], genesis_hash);
        assert!(!dag.contains(&BlockHash::from_bytes([99u8; 32])));
        assert_eq!(dag.finalized_anchor(), genesis_hash);
        assert!(dag.tips().is_empty());
    }
}
