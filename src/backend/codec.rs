//! Encoding of the persisted state table and metadata document.
//!
//! The state table is newline-delimited JSON, one row per (key, date),
//! gzip-compressed. Decoding sniffs the gzip magic so plain NDJSON written by
//! hand (or by older tooling) is accepted too.

use chrono::NaiveDate;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read, Write};

use crate::error::{Result, TrackerError};
use crate::models::{Finish, PriceKey, RollingState, RunMeta, STATE_SCHEMA_VERSION};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One row of the persisted rolling-state table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRow {
    pub printing_id: String,
    pub finish: Finish,
    pub date: NaiveDate,
    pub price: Option<f64>,
    pub provider: String,
    pub price_type: String,
}

/// Flatten a state into table rows ordered by key, then date.
pub fn to_rows(state: &RollingState) -> Vec<StateRow> {
    state
        .observations()
        .map(|obs| StateRow {
            printing_id: obs.key.printing_id,
            finish: obs.key.finish,
            date: obs.date,
            price: obs.price,
            provider: state.provider.clone(),
            price_type: state.price_type.clone(),
        })
        .collect()
}

/// Rebuild a state from table rows, rejecting anything that breaks the
/// table's invariants.
pub fn from_rows(rows: Vec<StateRow>) -> Result<RollingState> {
    let mut state = match rows.first() {
        Some(first) => RollingState::new(first.provider.clone(), first.price_type.clone()),
        None => return Ok(RollingState::default()),
    };

    let mut seen: HashSet<(PriceKey, NaiveDate)> = HashSet::with_capacity(rows.len());
    for row in rows {
        if row.provider != state.provider || row.price_type != state.price_type {
            return Err(TrackerError::StateCorrupt(format!(
                "mixed price sources in state table: {}/{} and {}/{}",
                state.provider, state.price_type, row.provider, row.price_type
            )));
        }
        if let Some(p) = row.price {
            if !p.is_finite() || p < 0.0 {
                return Err(TrackerError::StateCorrupt(format!(
                    "invalid price {} for {} on {}",
                    p, row.printing_id, row.date
                )));
            }
        }
        let key = PriceKey::new(row.printing_id, row.finish);
        if !seen.insert((key.clone(), row.date)) {
            return Err(TrackerError::StateCorrupt(format!(
                "duplicate row for {} on {}",
                key, row.date
            )));
        }
        state.record(key, row.date, row.price);
    }
    Ok(state)
}

/// Serialize a state as gzip-compressed NDJSON.
pub fn encode_state(state: &RollingState) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    for row in to_rows(state) {
        serde_json::to_writer(&mut encoder, &row)?;
        encoder.write_all(b"\n")?;
    }
    Ok(encoder.finish()?)
}

/// Parse a state table (gzip or plain NDJSON).
pub fn decode_state(bytes: &[u8]) -> Result<RollingState> {
    let reader: Box<dyn Read + '_> = if bytes.starts_with(&GZIP_MAGIC) {
        Box::new(GzDecoder::new(bytes))
    } else {
        Box::new(bytes)
    };

    let mut rows = Vec::new();
    for (idx, line) in BufReader::new(reader).lines().enumerate() {
        let line = line
            .map_err(|e| TrackerError::StateCorrupt(format!("unreadable state table: {}", e)))?;
        if line.trim().is_empty() {
            continue;
        }
        let row: StateRow = serde_json::from_str(&line).map_err(|e| {
            TrackerError::StateCorrupt(format!("state table line {}: {}", idx + 1, e))
        })?;
        rows.push(row);
    }
    from_rows(rows)
}

pub fn encode_meta(meta: &RunMeta) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(meta)?)
}

pub fn decode_meta(bytes: &[u8]) -> Result<RunMeta> {
    let meta: RunMeta = serde_json::from_slice(bytes)
        .map_err(|e| TrackerError::StateCorrupt(format!("unreadable metadata: {}", e)))?;
    if meta.schema_version != STATE_SCHEMA_VERSION {
        return Err(TrackerError::StateCorrupt(format!(
            "metadata schema version {} does not match expected {}",
            meta.schema_version, STATE_SCHEMA_VERSION
        )));
    }
    Ok(meta)
}
