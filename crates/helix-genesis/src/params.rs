use std::path::Path;

use helix_core::constants::{
    CHAIN_ID, DEFAULT_GAS_LIMIT, GENESIS_PREFUNDED_ADDRESS_HEX, GENESIS_PREFUNDED_BALANCE,
    PBFT_COMMITTEE_SIZE,
};
use helix_core::types::{Address, Balance};
use serde::{Deserialize, Serialize};

use crate::GenesisError;

/// One genesis account allocation, as stored in the params file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub address: String,
    pub balance: String,
}

/// Everything needed to build genesis state: chain identity, pre-funded
/// accounts, and the PBFT/state-machine parameters that ship with the
/// genesis block rather than being negotiated later (§4.7's "Persisted
/// genesis").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisParams {
    pub chain_id: u64,
    pub gas_limit: u64,
    pub committee_size: u64,
    pub allocations: Vec<GenesisAllocation>,
}

impl Default for GenesisParams {
    fn default() -> Self {
        Self {
            chain_id: CHAIN_ID,
            gas_limit: DEFAULT_GAS_LIMIT,
            committee_size: PBFT_COMMITTEE_SIZE,
            allocations: vec![GenesisAllocation {
                address: GENESIS_PREFUNDED_ADDRESS_HEX.to_string(),
                balance: GENESIS_PREFUNDED_BALANCE.to_string(),
            }],
        }
    }
}

impl GenesisParams {
    /// Decoded `(address, balance)` pairs, parsing each allocation's hex
    /// address and decimal balance string.
    pub fn parsed_allocations(&self) -> Result<Vec<(Address, Balance)>, GenesisError> {
        self.allocations
            .iter()
            .map(|a| {
                let stripped = a.address.strip_prefix("0x").unwrap_or(&a.address);
                let bytes = hex::decode(stripped)
                    .map_err(|e| GenesisError::InvalidAllocation(format!("address: {e}")))?;
                if bytes.len() != 20 {
                    return Err(GenesisError::InvalidAllocation(
                        "address must be 20 bytes".to_string(),
                    ));
                }
                let address = Address::from_slice(&bytes);
                let balance = a
                    .balance
                    .parse::<Balance>()
                    .map_err(|e| GenesisError::InvalidAllocation(format!("balance: {e}")))?;
                Ok((address, balance))
            })
            .collect()
    }

    /// Load genesis params from `path`, or write the built-in default to
    /// `path` and return it if the file does not yet exist — matching
    /// `chronx-node`'s "generated fresh on first boot, written back for
    /// reproducibility" convention.
    pub fn load_or_default(path: &Path) -> Result<Self, GenesisError> {
        if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            let params: GenesisParams = serde_json::from_str(&raw)?;
            Ok(params)
        } else {
            let params = GenesisParams::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(&params)?)?;
            Ok(params)
        }
    }
}
