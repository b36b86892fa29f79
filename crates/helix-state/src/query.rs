//! Read-only queries shared by the finaliser's own bookkeeping and by the
//! RPC query facade (§4.8): nothing here mutates the store.

use helix_core::constants::{BLOOM_LEVEL0_FANOUT, BLOOM_LEVEL1_FANOUT};
use helix_core::types::{Bloom, Period};

use crate::error::StoreError;
use crate::store::Store;

/// True if `needle` might be present anywhere in `period`'s log index,
/// consulting the two-level bloom hierarchy before ever touching a receipt.
pub fn period_may_contain(store: &Store, period: Period, needle: &Bloom) -> Result<bool, StoreError> {
    let l0_index = period / BLOOM_LEVEL0_FANOUT;
    let l1_index = l0_index / BLOOM_LEVEL1_FANOUT;

    if let Some(l1) = store.bloom_chunk_l1(l1_index)? {
        if !l1.contains(needle) {
            return Ok(false);
        }
    }
    if let Some(l0) = store.bloom_chunk_l0(l0_index)? {
        if !l0.contains(needle) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Scans `[from, to]` for periods whose final header bloom might contain
/// `needle`, skipping the chunked index wherever it rules a period out
/// (§8 scenario 6). Returns every period not ruled out; the caller still
/// has to check each surviving period's actual receipts, since a bloom
/// hit can be a false positive.
pub fn periods_matching_bloom(
    store: &Store,
    from: Period,
    to: Period,
    needle: &Bloom,
) -> Result<Vec<Period>, StoreError> {
    let mut hits = Vec::new();
    let mut period = from;
    while period <= to {
        if period_may_contain(store, period, needle)? {
            hits.push(period);
        }
        period += 1;
    }
    Ok(hits)
}
