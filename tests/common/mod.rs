//! Shared test fixtures for the spike tracker integration tests.
//!
//! Provides synthetic series builders, an in-memory [`AssetStore`] with fault
//! injection standing in for the release-asset network client, and a fake
//! [`Sleeper`] that records backoff delays instead of sleeping.

#![allow(dead_code)]

use chrono::NaiveDate;
use mtg_spike_tracker::retry::Sleeper;
use mtg_spike_tracker::{
    AssetStore, Finish, PriceKey, Result, RollingState, RollingStateStore, TrackerError,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn key(id: &str) -> PriceKey {
    PriceKey::new(id, Finish::Normal)
}

pub fn foil(id: &str) -> PriceKey {
    PriceKey::new(id, Finish::Foil)
}

pub fn store(window_len: usize) -> RollingStateStore {
    RollingStateStore::new(window_len, "tcgplayer", "retail").unwrap()
}

/// Build a state by ingesting each date in order. Keys without a value on a
/// date receive the ingest's absent marker.
pub fn build_state(
    store: &RollingStateStore,
    series: &[(PriceKey, Vec<(&str, Option<f64>)>)],
) -> RollingState {
    let dates: BTreeSet<NaiveDate> = series
        .iter()
        .flat_map(|(_, points)| points.iter().map(|(date, _)| d(date)))
        .collect();

    let mut state = RollingState::default();
    for date in dates {
        let mut today: HashMap<PriceKey, Option<f64>> = HashMap::new();
        for (k, points) in series {
            if let Some((_, price)) = points.iter().find(|(s, _)| d(s) == date) {
                today.insert(k.clone(), *price);
            }
        }
        state = store.ingest(&state, &today, date).unwrap();
    }
    state
}

/// Single-key two-point series: `past` on `today - window`, `now` on `today`.
pub fn pair_state(k: &PriceKey, today: &str, window: u64, past: f64, now: f64) -> RollingState {
    let today = d(today);
    let past_date = today - chrono::Days::new(window);
    let past_s = past_date.format("%Y-%m-%d").to_string();
    let today_s = today.format("%Y-%m-%d").to_string();
    build_state(
        &store(14),
        &[(k.clone(), vec![(past_s.as_str(), Some(past)), (today_s.as_str(), Some(now))])],
    )
}

// ---------------------------------------------------------------------------
// MemoryAssetStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, Vec<u8>>,
    pointer: Option<String>,
    transient_failures: u32,
    fail_puts_matching: Option<String>,
    fail_pointer_writes: bool,
    lose_pointer_acks: bool,
    fail_pointer_reads: bool,
    calls: u32,
}

/// In-memory asset store. Clones share the same storage, so a test can keep a
/// handle for inspection after boxing one into a backend.
#[derive(Clone, Default)]
pub struct MemoryAssetStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls (of any kind) with a transient error.
    pub fn fail_transiently(&self, n: u32) {
        self.inner.lock().unwrap().transient_failures = n;
    }

    /// Permanently reject uploads whose name starts with `prefix`.
    pub fn fail_puts_matching(&self, prefix: &str) {
        self.inner.lock().unwrap().fail_puts_matching = Some(prefix.to_string());
    }

    pub fn fail_pointer_writes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_pointer_writes = fail;
    }

    /// Pointer writes still apply but always report a transient failure, as
    /// when the response is lost after the server accepted the update.
    pub fn lose_pointer_acks(&self, lose: bool) {
        self.inner.lock().unwrap().lose_pointer_acks = lose;
    }

    pub fn fail_pointer_reads(&self, fail: bool) {
        self.inner.lock().unwrap().fail_pointer_reads = fail;
    }

    pub fn clear_faults(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.transient_failures = 0;
        inner.fail_puts_matching = None;
        inner.fail_pointer_writes = false;
        inner.lose_pointer_acks = false;
        inner.fail_pointer_reads = false;
    }

    pub fn pointer(&self) -> Option<String> {
        self.inner.lock().unwrap().pointer.clone()
    }

    /// Move the pointer behind the backend's back.
    pub fn force_pointer(&self, value: Option<&str>) {
        self.inner.lock().unwrap().pointer = value.map(str::to_string);
    }

    pub fn object_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn object(&self, name: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().objects.get(name).cloned()
    }

    pub fn insert_object(&self, name: &str, bytes: &[u8]) {
        self.inner
            .lock()
            .unwrap()
            .objects
            .insert(name.to_string(), bytes.to_vec());
    }

    pub fn remove_object(&self, name: &str) {
        self.inner.lock().unwrap().objects.remove(name);
    }

    pub fn calls(&self) -> u32 {
        self.inner.lock().unwrap().calls
    }

    fn enter(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls += 1;
        if inner.transient_failures > 0 {
            inner.transient_failures -= 1;
            return Err(TrackerError::Transient("injected 503".to_string()));
        }
        Ok(inner)
    }
}

impl AssetStore for MemoryAssetStore {
    fn read_pointer(&self) -> Result<Option<String>> {
        let inner = self.enter()?;
        if inner.fail_pointer_reads {
            return Err(TrackerError::Transient("injected pointer read 502".to_string()));
        }
        Ok(inner.pointer.clone())
    }

    fn write_pointer(&self, expected: Option<&str>, generation: &str) -> Result<()> {
        let mut inner = self.enter()?;
        if inner.fail_pointer_writes {
            return Err(TrackerError::BackendUnavailable("injected 403".to_string()));
        }
        if inner.lose_pointer_acks {
            if inner.pointer.as_deref() == expected {
                inner.pointer = Some(generation.to_string());
            }
            return Err(TrackerError::Transient("injected lost acknowledgement".to_string()));
        }
        if inner.pointer.as_deref() != expected {
            return Err(TrackerError::Conflict(format!(
                "pointer is {:?}, expected {:?}",
                inner.pointer, expected
            )));
        }
        inner.pointer = Some(generation.to_string());
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.enter()?.objects.get(name).cloned())
    }

    fn put(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let mut inner = self.enter()?;
        if let Some(prefix) = &inner.fail_puts_matching {
            if name.starts_with(prefix.as_str()) {
                return Err(TrackerError::BackendUnavailable(format!(
                    "injected upload failure for {}",
                    name
                )));
            }
        }
        inner.objects.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.enter()?.objects.remove(name);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.enter()?.objects.keys().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// RecordingSleeper
// ---------------------------------------------------------------------------

/// Fake clock: records requested delays and returns immediately.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }

    pub fn total(&self) -> Duration {
        self.delays().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}
