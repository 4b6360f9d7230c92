//! Multi-window spike detection with a price floor and a noise guardrail.
//!
//! Pipeline per key, evaluated against the post-ingest [`RollingState`]:
//!
//! 1. Eligibility: today's price or the highest lookback price reaches the floor.
//! 2. Baseline: a window is a candidate when its percent change meets the threshold.
//!    Windows with a non-positive past price are skipped.
//! 3. Guardrail: the best candidate window (largest percent change, shorter window
//!    on ties) is promoted when its absolute change or its percent change is large
//!    enough to not be noise.
//! 4. Records are ranked by percent change, then absolute change, then key.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::error::{Result, TrackerError};
use crate::models::{PriceKey, RollingState, SpikeCandidate, SpikeRecord};
use crate::rolling::RollingStateStore;

// ---------------------------------------------------------------------------
// SpikeConfig
// ---------------------------------------------------------------------------

/// Thresholds for spike detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpikeConfig {
    /// Minimum price (today, or peak lookback) for a key to be evaluated.
    pub price_floor: f64,
    /// Baseline percent change (as a fraction) to become a candidate.
    pub pct_threshold: f64,
    /// Lookback windows in days.
    pub windows: Vec<u32>,
    /// Guardrail: minimum absolute change.
    pub abs_min: f64,
    /// Guardrail: percent change that promotes regardless of `abs_min`.
    pub pct_override: f64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            price_floor: 5.0,
            pct_threshold: 0.20,
            windows: vec![1, 3, 7],
            abs_min: 1.0,
            pct_override: 0.50,
        }
    }
}

impl SpikeConfig {
    /// Windows sorted ascending with duplicates removed.
    pub fn normalized_windows(&self) -> Vec<u32> {
        let mut windows = self.windows.clone();
        windows.sort_unstable();
        windows.dedup();
        windows
    }

    /// Reject values the detector cannot meaningfully use.
    pub fn validate(&self) -> Result<()> {
        check_non_negative("price_floor", self.price_floor)?;
        check_non_negative("pct_threshold", self.pct_threshold)?;
        check_non_negative("abs_min", self.abs_min)?;
        check_non_negative("pct_override", self.pct_override)?;
        if self.windows.is_empty() {
            return Err(TrackerError::Configuration(
                "windows list must not be empty".to_string(),
            ));
        }
        if self.windows.contains(&0) {
            return Err(TrackerError::Configuration(
                "windows must be at least 1 day".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(TrackerError::Configuration(format!(
            "{} must be a finite non-negative number, got {}",
            name, value
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// DetectionSummary
// ---------------------------------------------------------------------------

/// Per-run tallies, for logging and the report header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub keys_evaluated: usize,
    pub below_floor: usize,
    pub candidates: usize,
    pub promoted: usize,
}

// ---------------------------------------------------------------------------
// SpikeDetector
// ---------------------------------------------------------------------------

/// Pure spike detector over a [`RollingState`] snapshot.
#[derive(Debug, Clone)]
pub struct SpikeDetector {
    config: SpikeConfig,
    windows: Vec<u32>,
}

impl SpikeDetector {
    pub fn new(config: SpikeConfig) -> Result<Self> {
        config.validate()?;
        let windows = config.normalized_windows();
        Ok(Self { config, windows })
    }

    pub fn config(&self) -> &SpikeConfig {
        &self.config
    }

    /// Detect spikes for `today` and return them ranked.
    pub fn detect(&self, state: &RollingState, today: NaiveDate) -> Vec<SpikeRecord> {
        self.detect_with_summary(state, today).0
    }

    /// Like [`detect`](Self::detect), also returning the run tallies.
    pub fn detect_with_summary(
        &self,
        state: &RollingState,
        today: NaiveDate,
    ) -> (Vec<SpikeRecord>, DetectionSummary) {
        let mut summary = DetectionSummary::default();
        let mut records = Vec::new();

        for key in state.keys() {
            let Some(today_price) = state.price_on(key, today) else {
                continue;
            };
            summary.keys_evaluated += 1;

            let pairs: Vec<(u32, f64)> = self
                .windows
                .iter()
                .filter_map(|&w| {
                    RollingStateStore::window_at(state, key, today, w).map(|(_, past)| (w, past))
                })
                .collect();

            if !self.is_eligible(today_price, &pairs) {
                summary.below_floor += 1;
                continue;
            }

            let candidates = self.candidates(key, today_price, &pairs);
            if candidates.is_empty() {
                continue;
            }
            summary.candidates += 1;

            if let Some(record) = self.promote(&candidates, today) {
                records.push(record);
            }
        }

        rank(&mut records);
        summary.promoted = records.len();

        debug!(
            %today,
            evaluated = summary.keys_evaluated,
            below_floor = summary.below_floor,
            candidates = summary.candidates,
            promoted = summary.promoted,
            "spike detection complete"
        );

        (records, summary)
    }

    /// Step 1: today's price or the peak lookback price reaches the floor.
    fn is_eligible(&self, today_price: f64, pairs: &[(u32, f64)]) -> bool {
        if today_price >= self.config.price_floor {
            return true;
        }
        pairs
            .iter()
            .map(|&(_, past)| past)
            .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))))
            .is_some_and(|peak| peak >= self.config.price_floor)
    }

    /// Step 2: windows meeting the baseline threshold, shortest first.
    pub fn candidates(
        &self,
        key: &PriceKey,
        today_price: f64,
        pairs: &[(u32, f64)],
    ) -> Vec<SpikeCandidate> {
        pairs
            .iter()
            .filter(|&&(_, past)| past > 0.0)
            .filter_map(|&(window, past_price)| {
                let abs_change = today_price - past_price;
                let pct_change = abs_change / past_price;
                (pct_change >= self.config.pct_threshold).then(|| SpikeCandidate {
                    key: key.clone(),
                    window,
                    today_price,
                    past_price,
                    abs_change,
                    pct_change,
                })
            })
            .collect()
    }

    /// Step 3: pick the triggering window and apply the guardrail.
    pub fn promote(&self, candidates: &[SpikeCandidate], today: NaiveDate) -> Option<SpikeRecord> {
        let trigger = triggering_candidate(candidates)?;
        let passes = trigger.abs_change >= self.config.abs_min
            || trigger.pct_change >= self.config.pct_override;
        if !passes {
            return None;
        }
        let mut qualifying: Vec<u32> = candidates.iter().map(|c| c.window).collect();
        qualifying.sort_unstable();
        Some(SpikeRecord::from_candidate(trigger, today, qualifying))
    }
}

/// Greatest percent change; the shorter window wins a tie.
pub fn triggering_candidate(candidates: &[SpikeCandidate]) -> Option<&SpikeCandidate> {
    candidates.iter().min_by(|a, b| {
        b.pct_change
            .partial_cmp(&a.pct_change)
            .unwrap_or(Ordering::Equal)
            .then(a.window.cmp(&b.window))
    })
}

/// Step 4: descending pct change, then descending abs change, then key.
fn rank(records: &mut [SpikeRecord]) {
    records.sort_by(|a, b| {
        b.pct_change
            .partial_cmp(&a.pct_change)
            .unwrap_or(Ordering::Equal)
            .then(
                b.abs_change
                    .partial_cmp(&a.abs_change)
                    .unwrap_or(Ordering::Equal),
            )
            .then_with(|| a.key.cmp(&b.key))
    });
}
