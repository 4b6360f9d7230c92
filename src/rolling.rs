//! Rolling-window state store.
//!
//! Merges a day's price observations into the bounded per-key history and
//! answers exact-offset window lookups. Everything here is a pure function of
//! its inputs; persistence lives in [`backend`](crate::backend).

use chrono::{Days, NaiveDate};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::models::{PriceKey, RollingState};

/// How far back a seed looks for history, in days including `as_of`.
pub const SEED_LOOKBACK_DAYS: u64 = 90;

/// Applies daily ingests to a [`RollingState`], holding at most `window_len`
/// distinct dates per key.
#[derive(Debug, Clone)]
pub struct RollingStateStore {
    window_len: usize,
    provider: String,
    price_type: String,
}

impl RollingStateStore {
    /// Create a store keeping `window_len` dates per key.
    pub fn new(
        window_len: usize,
        provider: impl Into<String>,
        price_type: impl Into<String>,
    ) -> Result<Self> {
        if window_len == 0 {
            return Err(TrackerError::Configuration(
                "rolling window length must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            window_len,
            provider: provider.into(),
            price_type: price_type.into(),
        })
    }

    /// Build from an already validated configuration.
    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        Self::new(
            config.state_days,
            config.provider.clone(),
            config.price_type.clone(),
        )
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    /// Merge `today`'s observations for `date` into a copy of `prior`.
    ///
    /// Every key present in `prior` or `today` gets an entry for `date`: the
    /// observed price, or an explicit absent marker when the key has no price
    /// (or an unusable one). An existing entry for `date` is replaced, so
    /// re-ingesting the same day is idempotent. Each key is then truncated to
    /// its `window_len` most recent dates.
    ///
    /// A non-empty `prior` recorded from another provider or price type is a
    /// `Configuration` error. Re-seed the state after changing the source.
    pub fn ingest(
        &self,
        prior: &RollingState,
        today: &HashMap<PriceKey, Option<f64>>,
        date: NaiveDate,
    ) -> Result<RollingState> {
        if !prior.is_empty()
            && (prior.provider != self.provider || prior.price_type != self.price_type)
        {
            return Err(TrackerError::Configuration(format!(
                "rolling state holds {}/{} prices but the tracker is configured for {}/{}; re-seed to switch sources",
                prior.provider, prior.price_type, self.provider, self.price_type
            )));
        }

        let mut next = prior.clone();
        next.provider = self.provider.clone();
        next.price_type = self.price_type.clone();

        let keys: BTreeSet<&PriceKey> = prior.keys().chain(today.keys()).collect();

        let mut priced = 0usize;
        let mut absent = 0usize;
        let mut rejected = 0usize;
        let mut replaced = 0usize;

        for key in keys {
            let price = match today.get(key).copied().flatten() {
                Some(p) if p.is_finite() && p >= 0.0 => Some(p),
                Some(p) => {
                    rejected += 1;
                    debug!(key = %key, price = p, "discarding unusable price");
                    None
                }
                None => None,
            };
            if price.is_some() {
                priced += 1;
            } else {
                absent += 1;
            }
            if next.record(key.clone(), date, price) {
                replaced += 1;
            }
        }

        next.truncate(self.window_len);

        if rejected > 0 {
            warn!(count = rejected, %date, "recorded unusable prices as absent");
        }
        debug!(
            %date,
            keys = next.len(),
            priced,
            absent,
            replaced,
            rows = next.row_count(),
            "ingested daily prices"
        );

        Ok(next)
    }

    /// Build a fresh state from a price history, keeping for each key its
    /// `window_len` most recent priced dates within [`SEED_LOOKBACK_DAYS`]
    /// of `as_of`. Dates after `as_of` are ignored; keys with nothing left are
    /// not tracked.
    pub fn seed(
        &self,
        history: &HashMap<PriceKey, BTreeMap<NaiveDate, f64>>,
        as_of: NaiveDate,
    ) -> RollingState {
        let earliest = as_of
            .checked_sub_days(Days::new(SEED_LOOKBACK_DAYS - 1))
            .unwrap_or(NaiveDate::MIN);

        let mut state = RollingState::new(self.provider.clone(), self.price_type.clone());
        for (key, series) in history {
            for (date, price) in series.range(earliest..=as_of) {
                if price.is_finite() && *price > 0.0 {
                    state.record(key.clone(), *date, Some(*price));
                }
            }
        }
        state.truncate(self.window_len);

        debug!(
            %as_of,
            keys = state.len(),
            rows = state.row_count(),
            "seeded rolling state"
        );
        state
    }

    /// `(today_price, past_price)` for the key's latest date and the date `n`
    /// days before it.
    pub fn window(state: &RollingState, key: &PriceKey, n: u32) -> Option<(f64, f64)> {
        let latest = state.latest_date(key)?;
        Self::window_at(state, key, latest, n)
    }

    /// `(today_price, past_price)` for `date` and exactly `date - n` days.
    ///
    /// Returns `None` if either endpoint is absent or not held. A nearby date
    /// is never substituted for the exact offset.
    pub fn window_at(
        state: &RollingState,
        key: &PriceKey,
        date: NaiveDate,
        n: u32,
    ) -> Option<(f64, f64)> {
        let past_date = date.checked_sub_days(Days::new(u64::from(n)))?;
        let today_price = state.price_on(key, date)?;
        let past_price = state.price_on(key, past_date)?;
        Some((today_price, past_price))
    }
}
