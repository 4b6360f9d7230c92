use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::key::PriceKey;

// ---------------------------------------------------------------------------
// PriceObservation: One (key, date) data point, price may be absent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub key: PriceKey,
    pub date: NaiveDate,
    pub price: Option<f64>,
}

/// Per-key history: strictly increasing, unique dates. `None` marks a date on
/// which the key was tracked but had no price.
pub type Series = BTreeMap<NaiveDate, Option<f64>>;

// ---------------------------------------------------------------------------
// RollingState: Bounded per-key price history persisted between runs
// ---------------------------------------------------------------------------

/// In-memory rolling state.
///
/// Mutation is crate-private: only the [`RollingStateStore`](crate::rolling::RollingStateStore)
/// ingest step and the persistence codec write into it, which keeps the
/// window-length and no-forward-fill invariants in one place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollingState {
    /// Pricing provider the history was recorded from (e.g. `tcgplayer`).
    pub provider: String,
    /// Price type the history was recorded from (e.g. `retail`).
    pub price_type: String,
    series: BTreeMap<PriceKey, Series>,
}

impl RollingState {
    /// Create an empty state for the given provider / price type.
    pub fn new(provider: impl Into<String>, price_type: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            price_type: price_type.into(),
            series: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Number of (key, date) rows, i.e. the size of the persisted table.
    pub fn row_count(&self) -> usize {
        self.series.values().map(|s| s.len()).sum()
    }

    pub fn keys(&self) -> impl Iterator<Item = &PriceKey> {
        self.series.keys()
    }

    pub fn contains_key(&self, key: &PriceKey) -> bool {
        self.series.contains_key(key)
    }

    pub fn series(&self, key: &PriceKey) -> Option<&Series> {
        self.series.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PriceKey, &Series)> {
        self.series.iter()
    }

    /// Dates held for a key, oldest first.
    pub fn dates(&self, key: &PriceKey) -> Vec<NaiveDate> {
        self.series
            .get(key)
            .map(|s| s.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Most recent date held for a key.
    pub fn latest_date(&self, key: &PriceKey) -> Option<NaiveDate> {
        self.series
            .get(key)
            .and_then(|s| s.keys().next_back().copied())
    }

    /// Exact-date price lookup. `None` both when the date is not held and when
    /// it is held with an absent price; no neighbouring date is consulted.
    pub fn price_on(&self, key: &PriceKey, date: NaiveDate) -> Option<f64> {
        self.series
            .get(key)
            .and_then(|s| s.get(&date))
            .copied()
            .flatten()
    }

    /// Whether the key has an entry (priced or absent) for the date.
    pub fn has_entry(&self, key: &PriceKey, date: NaiveDate) -> bool {
        self.series
            .get(key)
            .map(|s| s.contains_key(&date))
            .unwrap_or(false)
    }

    /// Flattened observations ordered by key, then date.
    pub fn observations(&self) -> impl Iterator<Item = PriceObservation> + '_ {
        self.series.iter().flat_map(|(key, series)| {
            series.iter().map(move |(date, price)| PriceObservation {
                key: key.clone(),
                date: *date,
                price: *price,
            })
        })
    }

    /// Insert or replace the observation for `(key, date)`. Returns `true` if
    /// an existing entry for that date was replaced.
    pub(crate) fn record(&mut self, key: PriceKey, date: NaiveDate, price: Option<f64>) -> bool {
        self.series
            .entry(key)
            .or_default()
            .insert(date, price)
            .is_some()
    }

    /// Drop the oldest dates of every key until at most `max_dates` remain.
    pub(crate) fn truncate(&mut self, max_dates: usize) {
        for series in self.series.values_mut() {
            while series.len() > max_dates {
                series.pop_first();
            }
        }
        self.series.retain(|_, s| !s.is_empty());
    }
}
