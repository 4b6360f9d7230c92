//! Async wrapper around [`SpikeTracker`] for use in async runtimes (Tokio, etc.).
//!
//! Runs tracker operations on a blocking thread pool via
//! [`tokio::task::spawn_blocking`]. Backend I/O is synchronous (blocking HTTP
//! and filesystem), so it must stay off the async event loop.
//!
//! # Example
//!
//! ```no_run
//! use std::collections::{BTreeMap, HashMap};
//! use mtg_spike_tracker::{AsyncSpikeTracker, TrackerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let tracker = AsyncSpikeTracker::build(TrackerConfig::default()).await.unwrap();
//!     let today = chrono::Utc::now().date_naive();
//!     let run = tracker
//!         .run_daily(today, HashMap::new(), BTreeMap::new())
//!         .await
//!         .unwrap();
//!     println!("{} spikes", run.spikes.len());
//! }
//! ```

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::error::{Result, TrackerError};
use crate::models::PriceKey;
use crate::{DailyRun, SpikeTracker, TrackerConfig};

/// Async wrapper around [`SpikeTracker`].
///
/// The tracker is protected by a [`Mutex`], which also serializes runs made
/// through clones of this handle.
#[derive(Clone)]
pub struct AsyncSpikeTracker {
    inner: Arc<Mutex<SpikeTracker>>,
}

impl AsyncSpikeTracker {
    /// Build a tracker from `config` on the blocking pool.
    pub async fn build(config: TrackerConfig) -> Result<Self> {
        tokio::task::spawn_blocking(move || {
            let tracker = SpikeTracker::builder().config(config).build()?;
            Ok(Self::from_tracker(tracker))
        })
        .await
        .map_err(|e| TrackerError::InvalidArgument(format!("Task join error: {e}")))?
    }

    /// Wrap an already built tracker.
    pub fn from_tracker(tracker: SpikeTracker) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tracker)),
        }
    }

    /// Run a sync tracker operation on the blocking thread pool.
    pub async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SpikeTracker) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let tracker = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = tracker
                .lock()
                .map_err(|_| TrackerError::InvalidArgument("tracker lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| TrackerError::InvalidArgument(format!("Task join error: {e}")))?
    }

    /// Async [`SpikeTracker::run_daily`].
    pub async fn run_daily(
        &self,
        date: NaiveDate,
        prices: HashMap<PriceKey, Option<f64>>,
        source_versions: BTreeMap<String, String>,
    ) -> Result<DailyRun> {
        self.run(move |t| t.run_daily(date, &prices, source_versions))
            .await
    }
}
