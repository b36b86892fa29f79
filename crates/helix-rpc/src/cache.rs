use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::RwLock;

use helix_core::types::Period;

/// Keeps at most `capacity` periods' worth of a loaded value, reading
/// through to `loader` on a miss and only caching the result if `period` is
/// within `capacity` of `latest` — the "near head" query pattern (§4.8) the
/// cache exists for. Entries for periods that fall out of that window are
/// never stored in the first place, so there is nothing to evict for them;
/// eviction only trims the common case of the window sliding forward.
///
/// Safe under concurrent readers and a single writer: reads take a shared
/// lock and only escalate to exclusive once a miss needs to insert.
pub struct ValueByBlockCache<V> {
    capacity: usize,
    entries: RwLock<BTreeMap<Period, V>>,
}

impl<V: Clone> ValueByBlockCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the cached value for `period` if present, otherwise calls
    /// `loader` and caches the result when `period` is within the capacity
    /// window of `latest`.
    pub fn get_or_load<E>(
        &self,
        period: Period,
        latest: Period,
        loader: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.entries.read().unwrap().get(&period) {
            return Ok(value.clone());
        }

        let value = loader()?;

        if latest.saturating_sub(period) < self.capacity as u64 {
            let mut entries = self.entries.write().unwrap();
            entries.insert(period, value.clone());
            while entries.len() > self.capacity {
                let Some(&oldest) = entries.keys().next() else { break };
                entries.remove(&oldest);
            }
        }

        Ok(value)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}

/// Same shape as `ValueByBlockCache`, but each cached period holds a
/// sub-map keyed by `K` rather than a single value — used for lookups that
/// are naturally grouped per period (e.g. the receipts finalised within
/// it) rather than one value per period.
pub struct MapByBlockCache<K, V> {
    capacity: usize,
    entries: RwLock<BTreeMap<Period, HashMap<K, V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> MapByBlockCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn get_or_load<E>(
        &self,
        period: Period,
        key: &K,
        latest: Period,
        loader: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self
            .entries
            .read()
            .unwrap()
            .get(&period)
            .and_then(|sub| sub.get(key))
        {
            return Ok(value.clone());
        }

        let value = loader()?;

        if latest.saturating_sub(period) < self.capacity as u64 {
            let mut entries = self.entries.write().unwrap();
            entries
                .entry(period)
                .or_default()
                .insert(key.clone(), value.clone());
            while entries.len() > self.capacity {
                let Some(&oldest) = entries.keys().next() else { break };
                entries.remove(&oldest);
            }
        }

        Ok(value)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}
