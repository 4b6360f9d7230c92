//! Markdown and CSV rendering of a day's spikes.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt::Write;
use std::io;

use crate::error::{Result, TrackerError};
use crate::models::SpikeRecord;
use crate::spikes::SpikeConfig;

/// Rows shown in the Markdown table.
pub const MARKDOWN_TOP_N: usize = 20;

/// CSV columns, in order.
pub const CSV_COLUMNS: [&str; 10] = [
    "printing_id",
    "finish",
    "qty",
    "today_date",
    "today_price",
    "window_days",
    "past_date",
    "past_price",
    "abs_change",
    "pct_change",
];

#[derive(Serialize)]
struct CsvRow<'a> {
    printing_id: &'a str,
    finish: &'static str,
    qty: Option<u32>,
    today_date: NaiveDate,
    today_price: f64,
    window_days: u32,
    past_date: NaiveDate,
    past_price: f64,
    abs_change: f64,
    pct_change: f64,
}

pub fn render_markdown(spikes: &[SpikeRecord], today: NaiveDate, config: &SpikeConfig) -> String {
    let windows: Vec<String> = config
        .normalized_windows()
        .iter()
        .map(|w| w.to_string())
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "# Daily Spikes Report ({})", today);
    let _ = writeln!(out);
    let _ = writeln!(out, "- Windows: {}", windows.join(", "));
    let _ = writeln!(out, "- Price floor: {:.2}", config.price_floor);
    let _ = writeln!(out, "- pct_threshold: {:.2}", config.pct_threshold);
    let _ = writeln!(
        out,
        "- Guardrail: abs_change >= {:.2} OR pct_change >= {:.2}",
        config.abs_min, config.pct_override
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Total spikes: {}", spikes.len());
    let _ = writeln!(out);

    if spikes.is_empty() {
        let _ = writeln!(out, "No spikes met thresholds today.");
        return out;
    }

    let _ = writeln!(out, "Top movers by pct_change:");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "| printing_id | finish | qty | window_days | today_price | past_price | abs_change | pct_change |"
    );
    let _ = writeln!(out, "|---|---|---:|---:|---:|---:|---:|---:|");
    for spike in spikes.iter().take(MARKDOWN_TOP_N) {
        let qty = spike.qty.map(|q| q.to_string()).unwrap_or_default();
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {:.2} | {:.2} | {:.2} | {:.2}% |",
            spike.key.printing_id,
            spike.key.finish,
            qty,
            spike.triggering_window,
            spike.today_price,
            spike.past_price,
            spike.abs_change,
            spike.pct_change * 100.0
        );
    }
    out
}

/// One header line plus one row per spike. Numbers are written in their
/// shortest round-trip form.
pub fn render_csv(spikes: &[SpikeRecord]) -> Result<String> {
    let mut buf = Vec::new();
    {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(&mut buf);
        wtr.write_record(CSV_COLUMNS)?;
        for spike in spikes {
            wtr.serialize(CsvRow {
                printing_id: &spike.key.printing_id,
                finish: spike.key.finish.as_str(),
                qty: spike.qty,
                today_date: spike.today_date,
                today_price: spike.today_price,
                window_days: spike.triggering_window,
                past_date: spike.past_date,
                past_price: spike.past_price,
                abs_change: spike.abs_change,
                pct_change: spike.pct_change,
            })?;
        }
        wtr.flush()?;
    }
    String::from_utf8(buf)
        .map_err(|e| TrackerError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}
