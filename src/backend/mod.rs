//! Persistence of the rolling state and its run metadata.
//!
//! Two backends exist, selected by [`BackendConfig`]: a local directory and a
//! set of remote release assets. Both use the same generation scheme:
//!
//! - every save writes a fresh `state-<gen>.ndjson.gz` / `meta-<gen>.json` pair;
//! - a single pointer names the committed generation and is replaced only
//!   after both objects are fully written;
//! - load follows the pointer, so a failed or interrupted save is invisible.
//!
//! A missing pointer means "first run" and yields an empty state. A pointer
//! whose objects are missing or undecodable is reported as `StateCorrupt` and
//! never silently reset.

pub mod codec;
pub mod local;
pub mod release;
pub mod remote;

pub use local::LocalPathBackend;
pub use release::ReleaseAssetClient;
pub use remote::RemoteAssetBackend;

use chrono::NaiveDate;
use rand::Rng;
use std::fmt;

use crate::config::{
    BackendConfig, TrackerConfig, META_OBJECT_PREFIX, META_OBJECT_SUFFIX, STATE_OBJECT_PREFIX,
    STATE_OBJECT_SUFFIX,
};
use crate::error::{Result, TrackerError};
use crate::models::{RollingState, RunMeta};

// ---------------------------------------------------------------------------
// AssetStore
// ---------------------------------------------------------------------------

/// Named-object store with a single generation pointer.
///
/// Implemented over the network by [`ReleaseAssetClient`]; tests substitute
/// an in-memory store.
pub trait AssetStore: Send {
    /// The committed generation, or `None` if nothing was ever committed.
    fn read_pointer(&self) -> Result<Option<String>>;

    /// Replace the pointer with `generation`, provided it still equals
    /// `expected`. A mismatch fails with `TrackerError::Conflict`.
    fn write_pointer(&self, expected: Option<&str>, generation: &str) -> Result<()>;

    /// Fetch an object; `Ok(None)` if it does not exist.
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Create or overwrite an object.
    fn put(&self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Delete an object; deleting a missing object is not an error.
    fn delete(&self, name: &str) -> Result<()>;

    /// Names of all stored objects.
    fn list(&self) -> Result<Vec<String>>;
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Identifier of one saved (state, meta) pair: `YYYYMMDD-xxxxxxxx`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Generation(String);

impl Generation {
    pub fn new(run_date: NaiveDate) -> Self {
        let nonce: u32 = rand::thread_rng().gen();
        Generation(format!("{}-{:08x}", run_date.format("%Y%m%d"), nonce))
    }

    /// Parse a pointer value. Anything other than `YYYYMMDD-xxxxxxxx` (eight
    /// digits, a dash, eight lowercase hex digits) is `StateCorrupt`.
    pub fn from_pointer(value: &str) -> Result<Self> {
        let value = value.trim();
        if is_generation_id(value) {
            Ok(Generation(value.to_string()))
        } else {
            Err(TrackerError::StateCorrupt(format!(
                "pointer {:?} is not a generation id",
                value
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn state_object(&self) -> String {
        format!("{}{}{}", STATE_OBJECT_PREFIX, self.0, STATE_OBJECT_SUFFIX)
    }

    pub fn meta_object(&self) -> String {
        format!("{}{}{}", META_OBJECT_PREFIX, self.0, META_OBJECT_SUFFIX)
    }

    /// Generation named by a state or meta object name, if it is one.
    pub fn of_object(name: &str) -> Option<Generation> {
        let inner = name
            .strip_prefix(STATE_OBJECT_PREFIX)
            .and_then(|n| n.strip_suffix(STATE_OBJECT_SUFFIX))
            .or_else(|| {
                name.strip_prefix(META_OBJECT_PREFIX)
                    .and_then(|n| n.strip_suffix(META_OBJECT_SUFFIX))
            })?;
        is_generation_id(inner).then(|| Generation(inner.to_string()))
    }
}

fn is_generation_id(value: &str) -> bool {
    let Some((date, nonce)) = value.split_once('-') else {
        return false;
    };
    date.len() == 8
        && date.bytes().all(|b| b.is_ascii_digit())
        && nonce.len() == 8
        && nonce
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Objects belonging to generations other than `keep`.
pub(crate) fn stale_objects(names: &[String], keep: &[&Generation]) -> Vec<String> {
    names
        .iter()
        .filter(|name| match Generation::of_object(name) {
            Some(generation) => !keep.contains(&&generation),
            None => false,
        })
        .cloned()
        .collect()
}

/// Decode a committed (state, meta) pair and reconcile its price source.
///
/// An empty state table carries no provider or price type of its own, so it
/// takes them from the metadata. A non-empty table must agree with the
/// metadata when the metadata records a source.
pub(crate) fn restore(state_bytes: &[u8], meta_bytes: &[u8]) -> Result<(RollingState, RunMeta)> {
    let mut state = codec::decode_state(state_bytes)?;
    let meta = codec::decode_meta(meta_bytes)?;

    if state.is_empty() {
        state.provider = meta.provider.clone();
        state.price_type = meta.price_type.clone();
    } else if !meta.provider.is_empty()
        && (state.provider != meta.provider || state.price_type != meta.price_type)
    {
        return Err(TrackerError::StateCorrupt(format!(
            "state table holds {}/{} but metadata records {}/{}",
            state.provider, state.price_type, meta.provider, meta.price_type
        )));
    }
    Ok((state, meta))
}

/// Run date used to name a new generation.
pub(crate) fn generation_date(meta: &RunMeta) -> NaiveDate {
    meta.run_date
        .unwrap_or_else(|| chrono::Utc::now().date_naive())
}

// ---------------------------------------------------------------------------
// StateBackend
// ---------------------------------------------------------------------------

/// The configured persistence medium. Callers depend only on
/// [`load`](Self::load) / [`save`](Self::save).
pub enum StateBackend {
    LocalPath(LocalPathBackend),
    RemoteAsset(RemoteAssetBackend),
}

impl StateBackend {
    /// Build the backend named by `config.state_backend`.
    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        match &config.state_backend {
            BackendConfig::LocalPath { dir } => {
                Ok(StateBackend::LocalPath(LocalPathBackend::new(dir.clone())))
            }
            BackendConfig::RemoteReleaseAsset(release) => {
                let client = ReleaseAssetClient::from_config(release)?;
                Ok(StateBackend::RemoteAsset(RemoteAssetBackend::new(
                    Box::new(client),
                    config.retry.clone(),
                )))
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StateBackend::LocalPath(_) => "local_path",
            StateBackend::RemoteAsset(_) => "remote_release_asset",
        }
    }

    /// Load the committed state, or an empty state on first run.
    pub fn load(&mut self) -> Result<(RollingState, RunMeta)> {
        match self {
            StateBackend::LocalPath(b) => b.load(),
            StateBackend::RemoteAsset(b) => b.load(),
        }
    }

    /// Stage and atomically promote a new (state, meta) pair.
    pub fn save(&mut self, state: &RollingState, meta: &RunMeta) -> Result<()> {
        match self {
            StateBackend::LocalPath(b) => b.save(state, meta),
            StateBackend::RemoteAsset(b) => b.save(state, meta),
        }
    }
}

impl From<LocalPathBackend> for StateBackend {
    fn from(backend: LocalPathBackend) -> Self {
        StateBackend::LocalPath(backend)
    }
}

impl From<RemoteAssetBackend> for StateBackend {
    fn from(backend: RemoteAssetBackend) -> Self {
        StateBackend::RemoteAsset(backend)
    }
}
