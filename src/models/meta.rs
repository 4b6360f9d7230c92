use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::state::RollingState;

/// Version of the persisted state table + metadata document layout.
pub const STATE_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// RunCounts: Summary counts derived from a RollingState snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunCounts {
    pub priced_keys: u64,
    pub missing_keys: u64,
    pub spikes_found: u64,
}

impl RunCounts {
    /// Count priced and missing keys on `run_date`.
    ///
    /// A key is missing when it is tracked but its `run_date` entry is absent
    /// (or it has no entry for that date at all).
    pub fn derive(state: &RollingState, run_date: NaiveDate, spikes_found: usize) -> Self {
        let mut priced = 0u64;
        let mut missing = 0u64;
        for key in state.keys() {
            if state.price_on(key, run_date).is_some() {
                priced += 1;
            } else {
                missing += 1;
            }
        }
        Self {
            priced_keys: priced,
            missing_keys: missing,
            spikes_found: spikes_found as u64,
        }
    }
}

// ---------------------------------------------------------------------------
// RunMeta: Diagnostic metadata persisted next to the state table
// ---------------------------------------------------------------------------

/// Run diagnostics. Not authoritative: counts are always derived from the
/// state snapshot they accompany via [`RunMeta::describe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunMeta {
    pub schema_version: u32,
    pub run_date: Option<NaiveDate>,
    pub config_hash: String,
    /// Price source of the accompanying state; lets an empty state table
    /// keep its provider across a save and load.
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub price_type: String,
    #[serde(default)]
    pub source_versions: BTreeMap<String, String>,
    pub counts: RunCounts,
}

impl Default for RunMeta {
    fn default() -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            run_date: None,
            config_hash: String::new(),
            provider: String::new(),
            price_type: String::new(),
            source_versions: BTreeMap::new(),
            counts: RunCounts::default(),
        }
    }
}

impl RunMeta {
    /// Build the metadata describing `state` after a run on `run_date`.
    pub fn describe(
        state: &RollingState,
        run_date: NaiveDate,
        config_hash: impl Into<String>,
        source_versions: BTreeMap<String, String>,
        spikes_found: usize,
    ) -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            run_date: Some(run_date),
            config_hash: config_hash.into(),
            provider: state.provider.clone(),
            price_type: state.price_type.clone(),
            source_versions,
            counts: RunCounts::derive(state, run_date, spikes_found),
        }
    }

    /// True for the zeroed metadata returned on a first run.
    pub fn is_initial(&self) -> bool {
        self.run_date.is_none()
    }
}
