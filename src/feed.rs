//! Extraction of a day's prices from an MTGJSON `AllPricesToday` payload.
//!
//! Payload shape:
//! `data.<uuid>.<market>.<provider>.<price_type>.<finish>.<YYYY-MM-DD> = price`.

use chrono::NaiveDate;
use flate2::read::GzDecoder;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, TrackerError};
use crate::models::{Finish, PriceKey};

/// Which branch of the price tree to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceSource {
    pub market: String,
    pub provider: String,
    pub price_type: String,
}

impl PriceSource {
    pub fn new(
        market: impl Into<String>,
        provider: impl Into<String>,
        price_type: impl Into<String>,
    ) -> Self {
        Self {
            market: market.into(),
            provider: provider.into(),
            price_type: price_type.into(),
        }
    }
}

/// A parsed `AllPricesToday` document.
pub struct PriceFeed {
    root: Value,
}

impl PriceFeed {
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Load a feed file (handles `.gz` transparently).
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = if path.extension().and_then(|e| e.to_str()) == Some("gz") {
            let file = fs::File::open(path)?;
            let mut decoder = GzDecoder::new(BufReader::new(file));
            let mut contents = String::new();
            decoder.read_to_string(&mut contents)?;
            contents
        } else {
            fs::read_to_string(path)?
        };
        let root: Value = serde_json::from_str(&contents).map_err(|e| {
            TrackerError::InvalidArgument(format!(
                "price feed {} is not valid JSON: {}",
                path.display(),
                e
            ))
        })?;
        info!(path = %path.display(), "loaded price feed");
        Ok(Self::from_value(root))
    }

    /// `meta.version` of the feed, for run metadata.
    pub fn version(&self) -> Option<String> {
        self.root
            .get("meta")
            .and_then(|m| m.get("version"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    /// `meta.date` of the feed, if present.
    pub fn date(&self) -> Option<NaiveDate> {
        self.root
            .get("meta")
            .and_then(|m| m.get("date"))
            .and_then(|v| v.as_str())
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    }

    /// Prices on `date` for every tracked key.
    ///
    /// Every key in `keys` appears in the result. Keys without a usable price
    /// (missing, non-numeric, non-finite or `<= 0`) map to `None`.
    pub fn prices_for<'k, I>(
        &self,
        keys: I,
        date: NaiveDate,
        source: &PriceSource,
    ) -> HashMap<PriceKey, Option<f64>>
    where
        I: IntoIterator<Item = &'k PriceKey>,
    {
        let date_str = date.format("%Y-%m-%d").to_string();

        let prices: HashMap<PriceKey, Option<f64>> = keys
            .into_iter()
            .map(|key| {
                let price = self
                    .series(key, source)
                    .and_then(|series| series.get(&date_str))
                    .and_then(coerce_price);
                (key.clone(), price)
            })
            .collect();

        let priced = prices.values().filter(|p| p.is_some()).count();
        debug!(
            %date,
            keys = prices.len(),
            priced,
            provider = %source.provider,
            price_type = %source.price_type,
            "extracted prices from feed"
        );
        prices
    }

    /// Every usable dated price per key, for seeding a fresh state from an
    /// `AllPrices`-style history. Keys with no usable price are left out.
    pub fn price_history<'k, I>(
        &self,
        keys: I,
        source: &PriceSource,
    ) -> HashMap<PriceKey, BTreeMap<NaiveDate, f64>>
    where
        I: IntoIterator<Item = &'k PriceKey>,
    {
        let mut history = HashMap::new();
        for key in keys {
            let Some(series) = self.series(key, source) else {
                continue;
            };
            let points: BTreeMap<NaiveDate, f64> = series
                .iter()
                .filter_map(|(date, value)| {
                    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
                    Some((date, coerce_price(value)?))
                })
                .collect();
            if !points.is_empty() {
                history.insert(key.clone(), points);
            }
        }
        debug!(
            keys = history.len(),
            rows = history.values().map(BTreeMap::len).sum::<usize>(),
            provider = %source.provider,
            price_type = %source.price_type,
            "extracted price history from feed"
        );
        history
    }

    fn series(
        &self,
        key: &PriceKey,
        source: &PriceSource,
    ) -> Option<&serde_json::Map<String, Value>> {
        self.root
            .get("data")?
            .get(&key.printing_id)?
            .get(&source.market)?
            .get(&source.provider)?
            .get(&source.price_type)
            .and_then(|node| finish_series(node, key.finish))
    }
}

/// The `{date: price}` map for a finish. A `normal` finish also accepts a
/// price node keyed directly by dates.
fn finish_series(node: &Value, finish: Finish) -> Option<&serde_json::Map<String, Value>> {
    if let Some(series) = node.get(finish.as_str()).and_then(|v| v.as_object()) {
        return Some(series);
    }
    let obj = node.as_object()?;
    let dated = obj
        .keys()
        .any(|k| NaiveDate::parse_from_str(k, "%Y-%m-%d").is_ok());
    (finish == Finish::Normal && dated).then_some(obj)
}

fn coerce_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (price.is_finite() && price > 0.0).then_some(price)
}
