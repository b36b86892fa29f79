use alloy_primitives::B256;
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

use crate::types::{Address, Bloom, OptionalAddress};

/// One EVM log entry emitted during transaction execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
}

impl Log {
    /// Bloom contribution of this log: address plus every topic.
    pub fn bloom(&self) -> Bloom {
        let mut bloom = Bloom::default();
        bloom.accrue(self.address.as_slice());
        for topic in &self.topics {
            bloom.accrue(topic.as_slice());
        }
        bloom
    }
}

/// Receipt produced by the state executor for one transaction.
///
/// `cumulative_gas_used` is the running total across the block up to and
/// including this transaction; the block's total `gas_used` equals the last
/// receipt's `cumulative_gas_used` (§4.6).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct Receipt {
    pub status: u8,
    pub gas_used: u64,
    pub cumulative_gas_used: u64,
    pub logs: Vec<Log>,
    pub contract_address: OptionalAddress,
}

impl Receipt {
    pub fn bloom(&self) -> Bloom {
        let mut bloom = Bloom::default();
        for log in &self.logs {
            bloom.or_with(&log.bloom());
        }
        bloom
    }

    pub fn succeeded(&self) -> bool {
        self.status == 1
    }

    pub fn created_contract(&self) -> Option<Address> {
        self.contract_address.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_receipt_has_empty_bloom() {
        let receipt = Receipt {
            status: 1,
            gas_used: 21_000,
            cumulative_gas_used: 21_000,
            logs: vec![],
            contract_address: OptionalAddress::none(),
        };
        assert_eq!(receipt.bloom(), Bloom::default());
    }

    #[test]
    fn log_bloom_is_contained_in_receipt_bloom() {
        let log = Log {
            address: Address::repeat_byte(0x11),
            topics: vec![B256::repeat_byte(0x22)],
            data: vec![],
        };
        let receipt = Receipt {
            status: 1,
            gas_used: 50_000,
            cumulative_gas_used: 50_000,
            logs: vec![log.clone()],
            contract_address: OptionalAddress::none(),
        };
        assert!(receipt.bloom().contains(&log.bloom()));
    }

    #[test]
    fn contract_address_rlp_round_trips_both_variants() {
        for contract_address in [
            OptionalAddress::none(),
            OptionalAddress::some(Address::repeat_byte(0x42)),
        ] {
            let receipt = Receipt {
                status: 1,
                gas_used: 21_000,
                cumulative_gas_used: 21_000,
                logs: vec![],
                contract_address,
            };
            let mut buf = Vec::new();
            alloy_rlp::Encodable::encode(&receipt, &mut buf);
            let decoded =
                <Receipt as alloy_rlp::Decodable>::decode(&mut buf.as_slice()).expect("decode");
            assert_eq!(receipt, decoded);
        }
    }
}
