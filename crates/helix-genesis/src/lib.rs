//! helix-genesis
//!
//! Builds the genesis period (period 0) state described by §4.7's
//! "Persisted genesis": the DAG genesis sentinel (level 0, zero pivot, no
//! tips — never a literal stored block, just the all-zero hash every
//! level-1 block's `pivot` bottoms out at), the pre-funded account
//! allocations, and the genesis `FinalHeader`. There is no time-lock
//! schedule and no multi-step release — genesis mints the full pre-funded
//! balance immediately, as a single atomic write directly into the store,
//! bypassing the transaction/executor path entirely (this is the one place
//! in the protocol where balances are created rather than transferred).

pub mod error;
pub mod params;

pub use error::GenesisError;
pub use params::{GenesisAllocation, GenesisParams};

use helix_core::account::Account;
use helix_core::header::FinalHeader;
use helix_core::types::{BlockHash, Bloom};
use helix_state::{PeriodData, Store, WriteBatch};
use tracing::info;

/// Apply genesis to `store`. Returns the genesis `FinalHeader` (period 0).
///
/// Idempotent in the sense that it refuses to run twice: a store that
/// already has a period-0 header is left untouched and `AlreadyApplied` is
/// returned, so the node's startup sequence can call this unconditionally
/// on every boot and just match on the error.
pub fn apply_genesis(store: &Store, params: &GenesisParams) -> Result<FinalHeader, GenesisError> {
    if store.final_header(0)?.is_some() {
        return Err(GenesisError::AlreadyApplied);
    }

    info!(chain_id = params.chain_id, "applying genesis state");

    let allocations = params.parsed_allocations()?;
    let mut batch = WriteBatch::new();

    for (address, balance) in &allocations {
        store.stage_account(&mut batch, *address, &Account::new(*balance))?;
        info!(%address, balance = %balance, "genesis: allocation");
    }

    let header = FinalHeader {
        period: 0,
        parent_hash: BlockHash::zero(),
        author: helix_core::types::Address::ZERO,
        timestamp: helix_core::constants::GENESIS_TIMESTAMP,
        state_root: Default::default(),
        transactions_root: Default::default(),
        receipts_root: Default::default(),
        log_bloom: Bloom::default(),
        gas_used: 0,
        gas_limit: params.gas_limit,
    };

    store.stage_final_header(&mut batch, &header)?;
    store.stage_period_data(
        &mut batch,
        0,
        &PeriodData {
            anchor: BlockHash::zero(),
            blocks: Vec::new(),
            certified_votes: Vec::new(),
            transactions: Vec::new(),
        },
    )?;
    store.stage_latest_period(&mut batch, 0)?;
    store.stage_finalized_anchor(&mut batch, BlockHash::zero())?;

    store.commit(batch)?;
    info!(hash = %header.hash(), "genesis state committed");

    Ok(header)
}
