//! Remote asset backend.
//!
//! Drives any [`AssetStore`] with the generation scheme. Every network call
//! goes through the configured [`RetryPolicy`]; transient failures are retried
//! with backoff and surface as `BackendUnavailable` once the budget is spent.

use tracing::{debug, info, warn};

use super::{codec, generation_date, restore, stale_objects, AssetStore, Generation};
use crate::error::{Result, TrackerError};
use crate::models::{RollingState, RunMeta};
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};

/// Stores state as named assets in an [`AssetStore`].
pub struct RemoteAssetBackend {
    store: Box<dyn AssetStore>,
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
    observed: Option<Option<String>>,
}

impl RemoteAssetBackend {
    pub fn new(store: Box<dyn AssetStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            sleeper: Box::new(ThreadSleeper),
            observed: None,
        }
    }

    /// Replace the sleeper used between retries (tests use a fake clock).
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn load(&mut self) -> Result<(RollingState, RunMeta)> {
        let pointer = self.retry("read pointer", |s| s.read_pointer())?;
        self.observed = Some(pointer.clone());

        let Some(pointer) = pointer else {
            info!("no committed remote state found; starting empty");
            return Ok((RollingState::default(), RunMeta::default()));
        };

        let generation = Generation::from_pointer(&pointer)?;
        let state_bytes = self.fetch_committed(&generation.state_object())?;
        let meta_bytes = self.fetch_committed(&generation.meta_object())?;
        let (state, meta) = restore(&state_bytes, &meta_bytes)?;

        info!(
            generation = %generation,
            keys = state.len(),
            rows = state.row_count(),
            "loaded remote state"
        );
        Ok((state, meta))
    }

    pub fn save(&mut self, state: &RollingState, meta: &RunMeta) -> Result<()> {
        let state_bytes = codec::encode_state(state)?;
        let meta_bytes = codec::encode_meta(meta)?;
        let generation = Generation::new(generation_date(meta));

        let expected = match &self.observed {
            Some(seen) => seen.clone(),
            None => self.retry("read pointer", |s| s.read_pointer())?,
        };

        // Stage both objects; the pointer still names the previous generation.
        let staged = [
            (generation.state_object(), state_bytes),
            (generation.meta_object(), meta_bytes),
        ];
        for (name, bytes) in &staged {
            if let Err(e) = self.retry("upload state object", |s| s.put(name, bytes)) {
                warn!(generation = %generation, error = %e, "staging failed; committed state untouched");
                self.discard(&generation);
                return Err(e);
            }
            debug!(object = %name, bytes = bytes.len(), "staged state object");
        }

        // Promote. A failed write may still have landed; the pointer decides
        // before anything staged is removed.
        if let Err(e) = self.retry("promote pointer", |s| {
            s.write_pointer(expected.as_deref(), generation.as_str())
        }) {
            match self.retry("read pointer", |s| s.read_pointer()) {
                Ok(Some(current)) if current == generation.as_str() => {
                    info!(generation = %generation, error = %e, "promotion reported failure but the pointer moved");
                }
                Ok(_) => {
                    warn!(generation = %generation, error = %e, "promotion failed; committed state untouched");
                    self.discard(&generation);
                    return Err(e);
                }
                Err(read_err) => {
                    warn!(
                        generation = %generation,
                        error = %e,
                        read_error = %read_err,
                        "promotion outcome unknown; leaving staged objects for a later prune"
                    );
                    return Err(e);
                }
            }
        }
        self.observed = Some(Some(generation.as_str().to_string()));
        info!(generation = %generation, rows = state.row_count(), "committed remote state");

        let previous = expected
            .as_deref()
            .and_then(|g| Generation::from_pointer(g).ok());
        let mut keep = vec![&generation];
        if let Some(previous) = &previous {
            keep.push(previous);
        }
        self.prune(&keep);
        Ok(())
    }

    fn fetch_committed(&self, name: &str) -> Result<Vec<u8>> {
        self.retry("download state object", |s| s.get(name))?
            .ok_or_else(|| {
                TrackerError::StateCorrupt(format!("committed asset {} is missing", name))
            })
    }

    fn retry<T, F>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut(&dyn AssetStore) -> Result<T>,
    {
        let store = self.store.as_ref();
        self.policy
            .run(what, self.sleeper.as_ref(), || op(store))
            .map_err(TrackerError::into_backend_error)
    }

    fn discard(&self, generation: &Generation) {
        for name in [generation.state_object(), generation.meta_object()] {
            if let Err(e) = self.store.delete(&name) {
                debug!(object = %name, error = %e, "could not remove staged object");
            }
        }
    }

    fn prune(&self, keep: &[&Generation]) {
        let names = match self.store.list() {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "cannot list remote assets for pruning");
                return;
            }
        };
        for name in stale_objects(&names, keep) {
            match self.store.delete(&name) {
                Ok(()) => debug!(object = %name, "pruned old remote asset"),
                Err(e) => warn!(object = %name, error = %e, "failed to prune old remote asset"),
            }
        }
    }
}
