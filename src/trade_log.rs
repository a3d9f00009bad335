//! Persisted backtest artifacts
//!
//! One CSV row per filled order, plus a JSON summary of the run.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{PerformanceMetrics, TradeRecord};

/// Everything worth keeping about a run besides the trade rows
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<'a> {
    pub symbol: &'a str,
    pub name: &'a str,
    pub strategy: &'a str,
    pub parameters: &'a serde_json::Value,
    pub bars: usize,
    pub metrics: &'a PerformanceMetrics,
    pub ledger_value: f64,
    pub ledger_matches_cash: bool,
}

/// Write the trade log CSV (header included), creating parent directories
pub fn write_trade_log(path: impl AsRef<Path>, trades: &[TradeRecord]) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create trade log {}", path.display()))?;
    if trades.is_empty() {
        writer.write_record([
            "trade_time",
            "trade_direction",
            "set_price",
            "deal_price",
            "deal_quantity",
            "deal_amount",
            "commission",
        ])?;
    }
    for trade in trades {
        writer
            .serialize(trade)
            .context("Failed to write trade record")?;
    }
    writer.flush().context("Failed to flush trade log")?;

    Ok(())
}

/// Read a trade log written by [`write_trade_log`]
pub fn read_trade_log(path: impl AsRef<Path>) -> Result<Vec<TradeRecord>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open trade log {}", path.display()))?;
    reader
        .deserialize()
        .collect::<Result<Vec<TradeRecord>, _>>()
        .context("Failed to parse trade log")
}

/// Write the run summary as pretty JSON
pub fn write_summary(path: impl AsRef<Path>, summary: &RunSummary<'_>) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize summary")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// `{results_dir}/{symbol}_{suffix}`, falling back to `backtest` without a symbol
pub fn artifact_path(results_dir: impl AsRef<Path>, symbol: &str, suffix: &str) -> PathBuf {
    let stem = if symbol.is_empty() { "backtest" } else { symbol };
    results_dir.as_ref().join(format!("{}_{}", stem, suffix))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Side;
    use chrono::{TimeZone, Utc};

    fn record(side: Side, price: f64) -> TradeRecord {
        let time = Utc.with_ymd_and_hms(2023, 1, 3, 10, 30, 0).unwrap();
        TradeRecord::new(time, side, price, price, 200, 5.0)
    }

    #[test]
    fn test_trade_log_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("orders.csv");
        let trades = vec![record(Side::Sell, 20.0), record(Side::Buy, 18.0)];

        write_trade_log(&path, &trades).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next(),
            Some("trade_time,trade_direction,set_price,deal_price,deal_quantity,deal_amount,commission")
        );
        assert!(lines.next().unwrap().contains(",sell,20.0,20.0,200,4000.0,5.0"));

        assert_eq!(read_trade_log(&path).unwrap(), trades);
    }

    #[test]
    fn test_empty_trade_log_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.csv");
        write_trade_log(&path, &[]).unwrap();
        assert!(fs::read_to_string(&path)
            .unwrap()
            .starts_with("trade_time,trade_direction"));
        assert!(read_trade_log(&path).unwrap().is_empty());
    }

    #[test]
    fn test_summary_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = artifact_path(dir.path(), "300363", "summary.json");
        let metrics = PerformanceMetrics::default();
        let params = serde_json::json!({"top": 20.0});
        let summary = RunSummary {
            symbol: "300363",
            name: "Porton",
            strategy: "grid",
            parameters: &params,
            bars: 10,
            metrics: &metrics,
            ledger_value: 100_000.0,
            ledger_matches_cash: true,
        };
        write_summary(&path, &summary).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["symbol"], "300363");
        assert_eq!(value["metrics"]["total_trades"], 0);
        assert!(path.ends_with("300363_summary.json"));
    }
}
