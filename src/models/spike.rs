use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::key::PriceKey;

// ---------------------------------------------------------------------------
// SpikeCandidate: One window meeting the baseline percent threshold
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SpikeCandidate {
    pub key: PriceKey,
    /// Lookback distance in days.
    pub window: u32,
    pub today_price: f64,
    pub past_price: f64,
    pub abs_change: f64,
    pub pct_change: f64,
}

// ---------------------------------------------------------------------------
// SpikeRecord: A candidate promoted by the guardrail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SpikeRecord {
    pub key: PriceKey,
    pub triggering_window: u32,
    pub today_date: NaiveDate,
    pub past_date: NaiveDate,
    pub today_price: f64,
    pub past_price: f64,
    pub abs_change: f64,
    pub pct_change: f64,
    /// Every window that met the baseline threshold, shortest first.
    pub qualifying_windows: Vec<u32>,
    /// Owned copies of this printing, when holdings were supplied.
    #[serde(default)]
    pub qty: Option<u32>,
}

impl SpikeRecord {
    /// Promote `trigger` into a record dated on `today`.
    pub fn from_candidate(
        trigger: &SpikeCandidate,
        today: NaiveDate,
        qualifying_windows: Vec<u32>,
    ) -> Self {
        Self {
            key: trigger.key.clone(),
            triggering_window: trigger.window,
            today_date: today,
            past_date: today - chrono::Days::new(u64::from(trigger.window)),
            today_price: trigger.today_price,
            past_price: trigger.past_price,
            abs_change: trigger.abs_change,
            pct_change: trigger.pct_change,
            qualifying_windows,
            qty: None,
        }
    }
}
