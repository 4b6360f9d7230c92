use std::collections::BTreeMap;

use super::key::PriceKey;
use super::spike::SpikeRecord;

// ---------------------------------------------------------------------------
// Holdings: Owned quantity per tracked printing
// ---------------------------------------------------------------------------

/// Copies owned per [`PriceKey`]. Entries for the same key are summed, so a
/// collection listing a printing on several rows counts every copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Holdings {
    qty: BTreeMap<PriceKey, u32>,
}

impl Holdings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: PriceKey, qty: u32) {
        let total = self.qty.entry(key).or_insert(0);
        *total = total.saturating_add(qty);
    }

    pub fn qty(&self, key: &PriceKey) -> Option<u32> {
        self.qty.get(key).copied()
    }

    /// Held keys in key order; the set a daily run prices.
    pub fn keys(&self) -> Vec<PriceKey> {
        self.qty.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.qty.len()
    }

    pub fn is_empty(&self) -> bool {
        self.qty.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.qty.values().map(|&q| u64::from(q)).sum()
    }

    /// Fill in each spike's owned quantity; keys not held stay `None`.
    pub fn annotate(&self, spikes: &mut [SpikeRecord]) {
        for spike in spikes {
            spike.qty = self.qty(&spike.key);
        }
    }
}

impl FromIterator<(PriceKey, u32)> for Holdings {
    fn from_iter<I: IntoIterator<Item = (PriceKey, u32)>>(iter: I) -> Self {
        let mut holdings = Holdings::new();
        for (key, qty) in iter {
            holdings.add(key, qty);
        }
        holdings
    }
}
