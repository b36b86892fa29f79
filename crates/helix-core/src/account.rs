use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::types::{Balance, Nonce};

/// An account's state as tracked by the state executor.
///
/// An account with zero nonce, zero balance, empty storage, and no code is
/// indistinguishable from "absent" — the query facade and the store treat a
/// missing key and a default `Account` identically.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub nonce: Nonce,
    pub balance: Balance,
    pub storage_root: B256,
    pub code_hash: B256,
    pub code_size: u64,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: Balance::ZERO,
            storage_root: B256::ZERO,
            code_hash: B256::ZERO,
            code_size: 0,
        }
    }
}

impl Account {
    pub fn new(balance: Balance) -> Self {
        Self {
            balance,
            ..Self::default()
        }
    }

    /// True iff this account is indistinguishable from one that was never assigned.
    pub fn is_empty(&self) -> bool {
        self.nonce == 0
            && self.balance.is_zero()
            && self.storage_root == B256::ZERO
            && self.code_hash == B256::ZERO
            && self.code_size == 0
    }
}
