use std::collections::HashMap;

use helix_core::constants::{FINALITY_THRESHOLD_DEN, FINALITY_THRESHOLD_NUM, PBFT_COMMITTEE_SIZE};
use helix_core::types::{Address, VrfPublicKey};
use serde::{Deserialize, Serialize};

/// A single validator's stake-weighted sortition identity.
///
/// Stake is tracked here as a plain `u64` rather than the account model's
/// `Balance` (`U256`): sortition math needs fixed-width arithmetic, and a
/// validator's staking weight is a governance-layer concept distinct from
/// its spendable account balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorInfo {
    pub address: Address,
    pub vrf_key: VrfPublicKey,
    pub stake: u64,
}

/// The active validator set for the current epoch, keyed by address.
///
/// Validators are not ranked or selected by committee membership directly —
/// every validator is a candidate at every step, and VRF sortition
/// (`sortition_threshold`) decides who actually gets to vote in any given
/// round (§4.5).
#[derive(Debug, Clone, Default)]
pub struct ValidatorSet {
    validators: HashMap<Address, ValidatorInfo>,
}

impl ValidatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, info: ValidatorInfo) {
        self.validators.insert(info.address, info);
    }

    pub fn get(&self, address: &Address) -> Option<&ValidatorInfo> {
        self.validators.get(address)
    }

    pub fn is_validator(&self, address: &Address) -> bool {
        self.validators.contains_key(address)
    }

    pub fn total_count(&self) -> usize {
        self.validators.len()
    }

    pub fn total_stake(&self) -> u64 {
        self.validators.values().map(|v| v.stake).sum()
    }

    /// Byzantine quorum in units of stake: the smallest stake total that is
    /// strictly more than `FINALITY_THRESHOLD_NUM / FINALITY_THRESHOLD_DEN`
    /// of the total (2f+1 generalised from validator count to stake).
    pub fn quorum_threshold(&self) -> u64 {
        let total = self.total_stake();
        (FINALITY_THRESHOLD_NUM * total + FINALITY_THRESHOLD_DEN - 1) / FINALITY_THRESHOLD_DEN
    }

    /// The per-validator VRF output threshold for one sortition draw:
    /// scaled so that, summed across the whole set, the expected number of
    /// eligible voters per step is `PBFT_COMMITTEE_SIZE`.
    ///
    /// A validator is eligible for a step iff its VRF output (interpreted as
    /// the low 8 bytes of the proof's hash, big-endian) is strictly below
    /// this threshold. This is a single-trial stand-in for Algorand-style
    /// binomial sortition: simpler to verify, at the cost of the selected
    /// committee size varying more round to round than true binomial
    /// sampling would.
    pub fn sortition_threshold(&self, stake: u64) -> u64 {
        let total = self.total_stake();
        if total == 0 {
            return 0;
        }
        let scaled = u128::from(PBFT_COMMITTEE_SIZE) * u128::from(stake) * u128::from(u64::MAX);
        (scaled / u128::from(total)).min(u128::from(u64::MAX)) as u64
    }

    pub fn ranked(&self) -> Vec<&ValidatorInfo> {
        let mut list: Vec<_> = self.validators.values().collect();
        list.sort_by(|a, b| b.stake.cmp(&a.stake).then_with(|| a.address.cmp(&b.address)));
        list
    }
}
