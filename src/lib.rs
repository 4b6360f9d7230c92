//! Daily MTG price spike tracker.
//!
//! Keeps a bounded rolling price history per tracked printing, persisted
//! between runs through a crash-safe [`StateBackend`], and flags statistically
//! meaningful price jumps with a price floor and a noise guardrail.
//!
//! # Quick start
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use mtg_spike_tracker::{PriceFeed, PriceKey, Finish, SpikeTracker, TrackerConfig};
//!
//! let config = TrackerConfig::from_path("tracker.json").unwrap();
//! let mut tracker = SpikeTracker::builder().config(config).build().unwrap();
//!
//! let feed = PriceFeed::from_path("AllPricesToday.json.gz").unwrap();
//! let keys = vec![PriceKey::new("5f8287b1-5bb6-5f4c-ad17-316a40d5bb0c", Finish::Foil)];
//! let run = tracker
//!     .run_daily_from_feed(&feed, &keys, chrono::Utc::now().date_naive())
//!     .unwrap();
//! println!("{}", run.markdown(tracker.config()));
//! ```

#[cfg(feature = "async")]
pub mod async_client;
pub mod backend;
pub mod config;
pub mod error;
pub mod feed;
pub mod logging;
pub mod models;
pub mod report;
pub mod retry;
pub mod rolling;
pub mod spikes;

#[cfg(feature = "async")]
pub use async_client::AsyncSpikeTracker;
pub use backend::{AssetStore, LocalPathBackend, RemoteAssetBackend, StateBackend};
pub use config::{BackendConfig, ReleaseConfig, TrackerConfig};
pub use error::{Result, TrackerError};
pub use feed::{PriceFeed, PriceSource};
pub use models::{
    Finish, Holdings, PriceKey, PriceObservation, RollingState, RunCounts, RunMeta,
    SpikeCandidate, SpikeRecord,
};
pub use retry::RetryPolicy;
pub use rolling::RollingStateStore;
pub use spikes::{DetectionSummary, SpikeConfig, SpikeDetector};

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{info, warn};

/// Key under which the price feed version is recorded in [`RunMeta::source_versions`].
pub const FEED_VERSION_KEY: &str = "all_prices_today";

// ---------------------------------------------------------------------------
// SpikeTrackerBuilder
// ---------------------------------------------------------------------------

/// Builder for a [`SpikeTracker`].
///
/// Use [`SpikeTracker::builder()`] to obtain one. Configuration is validated
/// in [`build()`](SpikeTrackerBuilder::build), before any I/O happens.
#[derive(Default)]
pub struct SpikeTrackerBuilder {
    config: Option<TrackerConfig>,
    backend: Option<StateBackend>,
    holdings: Option<Holdings>,
}

impl SpikeTrackerBuilder {
    /// Use this configuration. Defaults to [`TrackerConfig::default()`].
    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use an explicit backend instead of the one named in the configuration.
    pub fn backend(mut self, backend: impl Into<StateBackend>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Owned quantities joined onto every reported spike.
    pub fn holdings(mut self, holdings: Holdings) -> Self {
        self.holdings = Some(holdings);
        self
    }

    pub fn build(self) -> Result<SpikeTracker> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let store = RollingStateStore::from_config(&config)?;
        let detector = SpikeDetector::new(config.spikes.clone())?;
        let backend = match self.backend {
            Some(backend) => backend,
            None => StateBackend::from_config(&config)?,
        };
        let config_hash = config.fingerprint();
        Ok(SpikeTracker {
            config,
            config_hash,
            store,
            detector,
            backend,
            holdings: self.holdings.unwrap_or_default(),
        })
    }
}

// ---------------------------------------------------------------------------
// DailyRun
// ---------------------------------------------------------------------------

/// Everything produced by one committed daily run.
#[derive(Debug, Clone)]
pub struct DailyRun {
    pub run_date: NaiveDate,
    pub state: RollingState,
    pub meta: RunMeta,
    pub spikes: Vec<SpikeRecord>,
    pub summary: DetectionSummary,
}

impl DailyRun {
    pub fn markdown(&self, config: &TrackerConfig) -> String {
        report::render_markdown(&self.spikes, self.run_date, &config.spikes)
    }

    pub fn csv(&self) -> Result<String> {
        report::render_csv(&self.spikes)
    }
}

// ---------------------------------------------------------------------------
// SeedRun
// ---------------------------------------------------------------------------

/// Result of rebuilding the state from a price history.
#[derive(Debug, Clone)]
pub struct SeedRun {
    pub as_of: NaiveDate,
    pub state: RollingState,
    pub meta: RunMeta,
    /// Requested keys with no usable price in the lookback.
    pub missing_keys: Vec<PriceKey>,
}

// ---------------------------------------------------------------------------
// SpikeTracker
// ---------------------------------------------------------------------------

/// Sequences a daily run: load → ingest → detect → save.
///
/// The new state is saved only after detection succeeded. If any step fails
/// the previously committed state is left exactly as it was.
pub struct SpikeTracker {
    config: TrackerConfig,
    config_hash: String,
    store: RollingStateStore,
    detector: SpikeDetector,
    backend: StateBackend,
    holdings: Holdings,
}

impl SpikeTracker {
    pub fn builder() -> SpikeTrackerBuilder {
        SpikeTrackerBuilder::default()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Fingerprint of the detection-relevant configuration.
    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn store(&self) -> &RollingStateStore {
        &self.store
    }

    pub fn detector(&self) -> &SpikeDetector {
        &self.detector
    }

    pub fn holdings(&self) -> &Holdings {
        &self.holdings
    }

    pub fn backend_mut(&mut self) -> &mut StateBackend {
        &mut self.backend
    }

    /// Load the committed state without modifying anything.
    pub fn load(&mut self) -> Result<(RollingState, RunMeta)> {
        self.backend.load()
    }

    /// Run one day with already extracted prices and commit the result.
    pub fn run_daily(
        &mut self,
        date: NaiveDate,
        prices: &HashMap<PriceKey, Option<f64>>,
        source_versions: BTreeMap<String, String>,
    ) -> Result<DailyRun> {
        let (prior, prior_meta) = self.backend.load()?;

        if !prior_meta.is_initial() && prior_meta.config_hash != self.config_hash {
            warn!(
                previous = %prior_meta.config_hash,
                current = %self.config_hash,
                "configuration changed since the last committed run"
            );
        }
        if let Some(last) = prior_meta.run_date {
            if date < last {
                warn!(%date, last_run = %last, "running for a date before the last committed run");
            }
        }

        let state = self.store.ingest(&prior, prices, date)?;
        let (mut spikes, summary) = self.detector.detect_with_summary(&state, date);
        self.holdings.annotate(&mut spikes);
        let meta = RunMeta::describe(
            &state,
            date,
            self.config_hash.clone(),
            source_versions,
            spikes.len(),
        );

        self.backend.save(&state, &meta)?;

        info!(
            %date,
            backend = self.backend.kind(),
            keys = state.len(),
            priced = meta.counts.priced_keys,
            missing = meta.counts.missing_keys,
            spikes = meta.counts.spikes_found,
            "daily run committed"
        );

        Ok(DailyRun {
            run_date: date,
            state,
            meta,
            spikes,
            summary,
        })
    }

    /// Extract `keys`' prices from a feed, then [`run_daily`](Self::run_daily).
    pub fn run_daily_from_feed(
        &mut self,
        feed: &PriceFeed,
        keys: &[PriceKey],
        date: NaiveDate,
    ) -> Result<DailyRun> {
        let prices = feed.prices_for(keys, date, &self.price_source());
        self.run_daily(date, &prices, feed_versions(feed))
    }

    /// Replace the committed state with one rebuilt from a price history.
    ///
    /// The prior state is not read, so this also recovers from a corrupt
    /// committed state or a change of provider or price type.
    pub fn seed(
        &mut self,
        feed: &PriceFeed,
        keys: &[PriceKey],
        as_of: NaiveDate,
    ) -> Result<SeedRun> {
        let history = feed.price_history(keys, &self.price_source());
        let state = self.store.seed(&history, as_of);
        let missing_keys: Vec<PriceKey> = keys
            .iter()
            .filter(|k| !state.contains_key(k))
            .cloned()
            .collect();
        if !missing_keys.is_empty() {
            warn!(count = missing_keys.len(), %as_of, "keys without price history were not seeded");
        }

        let meta = RunMeta::describe(
            &state,
            as_of,
            self.config_hash.clone(),
            feed_versions(feed),
            0,
        );
        self.backend.save(&state, &meta)?;

        info!(
            %as_of,
            backend = self.backend.kind(),
            keys = state.len(),
            rows = state.row_count(),
            missing = missing_keys.len(),
            "seeded state committed"
        );

        Ok(SeedRun {
            as_of,
            state,
            meta,
            missing_keys,
        })
    }

    fn price_source(&self) -> PriceSource {
        PriceSource::new(
            self.config.market.clone(),
            self.config.provider.clone(),
            self.config.price_type.clone(),
        )
    }
}

fn feed_versions(feed: &PriceFeed) -> BTreeMap<String, String> {
    let mut versions = BTreeMap::new();
    if let Some(version) = feed.version() {
        versions.insert(FEED_VERSION_KEY.to_string(), version);
    }
    versions
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for SpikeTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SpikeTracker(backend={}, provider={}, price_type={}, state_days={}, windows={:?})",
            self.backend.kind(),
            self.config.provider,
            self.config.price_type,
            self.config.state_days,
            self.config.spikes.normalized_windows()
        )
    }
}
