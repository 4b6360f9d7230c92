//! Immutable run configuration.
//!
//! Built once per run (from JSON plus environment overrides, or in code) and
//! passed into each component. Nothing reads configuration from globals.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, TrackerError};
use crate::retry::RetryPolicy;
use crate::spikes::SpikeConfig;

pub const GITHUB_API_BASE: &str = "https://api.github.com";
pub const GITHUB_UPLOADS_BASE: &str = "https://uploads.github.com";

/// Environment variable that overrides `state_backend.kind`.
pub const BACKEND_ENV_VAR: &str = "MTG_TRACKER_STATE_BACKEND";

/// Name of the local pointer file naming the committed generation.
pub const POINTER_FILE: &str = "CURRENT";
pub const STATE_OBJECT_PREFIX: &str = "state-";
pub const STATE_OBJECT_SUFFIX: &str = ".ndjson.gz";
pub const META_OBJECT_PREFIX: &str = "meta-";
pub const META_OBJECT_SUFFIX: &str = ".json";

pub fn default_state_dir() -> PathBuf {
    if let Some(data) = dirs::data_dir() {
        data.join("mtg-spike-tracker").join("state")
    } else {
        PathBuf::from(".mtg-spike-tracker-state")
    }
}

// ---------------------------------------------------------------------------
// BackendConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    LocalPath {
        #[serde(default = "default_state_dir")]
        dir: PathBuf,
    },
    RemoteReleaseAsset(ReleaseConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::LocalPath {
            dir: default_state_dir(),
        }
    }
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::LocalPath { .. } => "local_path",
            BackendConfig::RemoteReleaseAsset(_) => "remote_release_asset",
        }
    }
}

/// Settings for the release-asset backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    /// `owner/name` of the hosting repository.
    pub repository: String,
    /// Stable tag of the release holding the state assets.
    pub tag: String,
    /// Environment variable holding the API token.
    pub token_env: String,
    pub api_base: String,
    pub uploads_base: String,
    pub timeout_secs: u64,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            repository: String::new(),
            tag: "state-latest".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            api_base: GITHUB_API_BASE.to_string(),
            uploads_base: GITHUB_UPLOADS_BASE.to_string(),
            timeout_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// TrackerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub market: String,
    pub provider: String,
    pub price_type: String,
    /// Rolling window length W: distinct dates kept per key.
    pub state_days: usize,
    pub spikes: SpikeConfig,
    pub state_backend: BackendConfig,
    pub retry: RetryPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            market: "paper".to_string(),
            provider: "tcgplayer".to_string(),
            price_type: "retail".to_string(),
            state_days: 14,
            spikes: SpikeConfig::default(),
            state_backend: BackendConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// The subset of configuration that changes detection results.
#[derive(Serialize)]
struct FingerprintInput<'a> {
    provider: &'a str,
    price_type: &'a str,
    state_days: usize,
    price_floor: f64,
    pct_threshold: f64,
    windows: Vec<u32>,
    abs_min: f64,
    pct_override: f64,
}

impl TrackerConfig {
    /// Load a JSON config file and apply environment overrides.
    ///
    /// The result is not validated; call [`validate`](Self::validate) (the
    /// tracker builder does this) before use.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: TrackerConfig = serde_json::from_str(&contents).map_err(|e| {
            TrackerError::Configuration(format!(
                "cannot parse {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        config.apply_env_overrides()
    }

    /// Apply `MTG_TRACKER_STATE_BACKEND` if set.
    pub fn apply_env_overrides(self) -> Result<Self> {
        match std::env::var(BACKEND_ENV_VAR) {
            Ok(kind) if !kind.trim().is_empty() => self.with_backend_kind(kind.trim()),
            _ => Ok(self),
        }
    }

    /// Switch the backend kind, keeping existing settings when it already matches.
    pub fn with_backend_kind(mut self, kind: &str) -> Result<Self> {
        if self.state_backend.kind() == kind {
            return Ok(self);
        }
        self.state_backend = match kind {
            "local_path" => BackendConfig::LocalPath {
                dir: default_state_dir(),
            },
            "remote_release_asset" => BackendConfig::RemoteReleaseAsset(ReleaseConfig::default()),
            other => {
                return Err(TrackerError::Configuration(format!(
                    "unknown state backend: {}",
                    other
                )))
            }
        };
        Ok(self)
    }

    /// Fail fast on values no component can work with.
    pub fn validate(&self) -> Result<()> {
        if self.provider.trim().is_empty() {
            return Err(TrackerError::Configuration("provider must not be empty".into()));
        }
        if self.price_type.trim().is_empty() {
            return Err(TrackerError::Configuration("price_type must not be empty".into()));
        }
        if self.state_days == 0 {
            return Err(TrackerError::Configuration("state_days must be at least 1".into()));
        }
        self.spikes.validate()?;
        if let Some(&w) = self.spikes.windows.iter().find(|&&w| w as usize >= self.state_days) {
            return Err(TrackerError::Configuration(format!(
                "window of {} days does not fit in a rolling state of {} days",
                w, self.state_days
            )));
        }
        self.retry.validate()?;
        if let BackendConfig::RemoteReleaseAsset(release) = &self.state_backend {
            if release.repository.trim().is_empty() {
                return Err(TrackerError::Configuration(
                    "remote_release_asset backend requires a non-empty repository".into(),
                ));
            }
            if release.tag.trim().is_empty() {
                return Err(TrackerError::Configuration(
                    "remote_release_asset backend requires a non-empty tag".into(),
                ));
            }
        }
        Ok(())
    }

    /// Hex SHA-256 of the detection-relevant settings, used to spot
    /// configuration drift between runs.
    pub fn fingerprint(&self) -> String {
        let input = FingerprintInput {
            provider: &self.provider,
            price_type: &self.price_type,
            state_days: self.state_days,
            price_floor: self.spikes.price_floor,
            pct_threshold: self.spikes.pct_threshold,
            windows: self.spikes.normalized_windows(),
            abs_min: self.spikes.abs_min,
            pct_override: self.spikes.pct_override,
        };
        // Serializing a plain struct of strings and numbers cannot fail.
        let canonical = serde_json::to_vec(&input).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }
}
