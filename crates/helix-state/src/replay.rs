use helix_core::constants::REPLAY_PROTECTION_WINDOW;
use helix_core::types::{Address, Nonce, Period};

use crate::error::StoreError;
use crate::store::{Store, WriteBatch};

/// True iff a watermark has been set for `sender` and `nonce` falls at or
/// below it (§4.4). Nonces above the watermark are never rejected here,
/// including reuse of a nonce that hasn't yet aged into the window — that
/// is a deliberate property of the design, not an oversight.
pub fn is_stale(store: &Store, sender: Address, nonce: Nonce) -> Result<bool, StoreError> {
    let record = store.nonce_record(sender)?;
    Ok(record.watermark.is_some_and(|w| nonce <= w))
}

/// Record that `sender` finalised `nonce` during `period`: raises
/// `nonce_max` if `nonce` is strictly greater, then snapshots the sender's
/// resulting `nonce_max` into `period`'s dirty list. The snapshot — not the
/// sender's current `nonce_max` — is what later gets promoted to the
/// watermark, so a sender who keeps transacting after `period` doesn't have
/// its own future nonces rejected when that period ages out of the window.
pub fn record(
    store: &Store,
    batch: &mut WriteBatch,
    sender: Address,
    nonce: Nonce,
    period: Period,
) -> Result<(), StoreError> {
    let mut nonce_record = store.nonce_record(sender)?;
    if nonce > nonce_record.nonce_max {
        nonce_record.nonce_max = nonce;
    }
    store.stage_nonce_record(batch, sender, &nonce_record)?;

    let mut dirty = store.dirty_senders(period)?;
    match dirty.iter_mut().find(|(addr, _)| *addr == sender) {
        Some(entry) => entry.1 = nonce_record.nonce_max,
        None => dirty.push((sender, nonce_record.nonce_max)),
    }
    store.stage_dirty_senders(batch, period, &dirty)?;
    Ok(())
}

/// Promote the dirty senders of the period that is just falling outside
/// `REPLAY_PROTECTION_WINDOW` of `finalizing_period`: each sender's
/// `nonce_max`-at-that-period snapshot becomes (or raises) its watermark,
/// and the per-period dirty list is dropped. Called once per period
/// finalisation, after every `record` call for the period has been staged.
pub fn advance_watermarks(
    store: &Store,
    batch: &mut WriteBatch,
    finalizing_period: Period,
) -> Result<(), StoreError> {
    let Some(expiring_period) = finalizing_period.checked_sub(REPLAY_PROTECTION_WINDOW) else {
        return Ok(());
    };

    let dirty = store.dirty_senders(expiring_period)?;
    for (sender, snapshot) in &dirty {
        let mut record = store.nonce_record(*sender)?;
        record.watermark = Some(record.watermark.map_or(*snapshot, |w| w.max(*snapshot)));
        store.stage_nonce_record(batch, *sender, &record)?;
    }
    store.clear_dirty_senders(batch, expiring_period);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> Store {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let mut p = std::env::temp_dir();
        p.push(format!(
            "helix-state-replay-test-{}",
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        Store::open(p).unwrap()
    }

    #[test]
    fn fresh_sender_nonce_zero_is_not_stale() {
        let store = temp_store();
        assert!(!is_stale(&store, Address::ZERO, 0).unwrap());
    }

    #[test]
    fn no_watermark_means_even_a_reused_nonce_is_not_flagged_stale() {
        let store = temp_store();
        let sender = Address::repeat_byte(0x33);
        let mut batch = WriteBatch::new();
        record(&store, &mut batch, sender, 5, 1).unwrap();
        store.commit(batch).unwrap();

        // No watermark has been set yet (the period hasn't aged out of the
        // window), so is_stale only ever looks at the watermark — this is
        // the documented property, not a gap.
        assert!(!is_stale(&store, sender, 5).unwrap());
        assert!(!is_stale(&store, sender, 6).unwrap());
    }

    #[test]
    fn watermark_advances_once_period_exits_the_window() {
        let store = temp_store();
        let sender = Address::repeat_byte(0x44);
        let mut batch = WriteBatch::new();
        record(&store, &mut batch, sender, 7, 1).unwrap();
        store.commit(batch).unwrap();

        // Finalising a period well inside the window changes nothing.
        let mut batch = WriteBatch::new();
        advance_watermarks(&store, &mut batch, 10).unwrap();
        store.commit(batch).unwrap();
        assert_eq!(store.nonce_record(sender).unwrap().watermark, None);

        // Finalising REPLAY_PROTECTION_WINDOW periods later promotes it.
        let mut batch = WriteBatch::new();
        advance_watermarks(&store, &mut batch, 1 + REPLAY_PROTECTION_WINDOW).unwrap();
        store.commit(batch).unwrap();
        assert_eq!(store.nonce_record(sender).unwrap().watermark, Some(7));

        assert!(is_stale(&store, sender, 7).unwrap());
        assert!(!is_stale(&store, sender, 8).unwrap());
    }

    #[test]
    fn later_transactions_do_not_inflate_an_earlier_periods_snapshot() {
        let store = temp_store();
        let sender = Address::repeat_byte(0x55);

        let mut batch = WriteBatch::new();
        record(&store, &mut batch, sender, 3, 1).unwrap();
        store.commit(batch).unwrap();

        // The sender transacts again in a later period, well inside the
        // window; its global nonce_max advances but period 1's dirty-list
        // snapshot must stay at 3.
        let mut batch = WriteBatch::new();
        record(&store, &mut batch, sender, 9, 5).unwrap();
        store.commit(batch).unwrap();

        assert_eq!(store.dirty_senders(1).unwrap(), vec![(sender, 3)]);
        assert_eq!(store.nonce_record(sender).unwrap().nonce_max, 9);

        let mut batch = WriteBatch::new();
        advance_watermarks(&store, &mut batch, 1 + REPLAY_PROTECTION_WINDOW).unwrap();
        store.commit(batch).unwrap();

        // Promoted from period 1's snapshot (3), not the live nonce_max (9).
        assert_eq!(store.nonce_record(sender).unwrap().watermark, Some(3));
    }
}
