//! Data loading and management
//!
//! Loads OHLCV bars from CSV files. Columns are looked up by header name so
//! both plain `datetime,open,high,low,close,volume` exports and broker
//! exports with `time`/`date` and `amount` columns load without conversion.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::StringRecord;
use std::path::Path;
use tracing::{info, warn};

use crate::Candle;

/// Header names accepted for the timestamp column, in lookup order
const DATETIME_COLUMNS: &[&str] = &["datetime", "time", "date", "timestamp"];

/// Header names accepted for the volume column; traded amount wins when present
const VOLUME_COLUMNS: &[&str] = &["amount", "volume"];

/// Naive timestamp layouts tried after RFC 3339
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y%m%d%H%M%S%3f",
    "%Y%m%d%H%M%S",
];

// =============================================================================
// CSV Data Loading
// =============================================================================

struct Columns {
    datetime: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let find = |names: &[&str]| {
            names.iter().find_map(|name| {
                headers
                    .iter()
                    .position(|h| h.trim().eq_ignore_ascii_case(name))
            })
        };

        Ok(Self {
            datetime: find(DATETIME_COLUMNS).context("Missing datetime column")?,
            open: find(&["open"]).context("Missing open column")?,
            high: find(&["high"]).context("Missing high column")?,
            low: find(&["low"]).context("Missing low column")?,
            close: find(&["close"]).context("Missing close column")?,
            volume: find(VOLUME_COLUMNS).context("Missing volume column")?,
        })
    }
}

fn parse_field(record: &StringRecord, index: usize, name: &str) -> Result<f64> {
    record
        .get(index)
        .with_context(|| format!("Missing {} column", name))?
        .trim()
        .parse()
        .with_context(|| format!("Failed to parse {}", name))
}

/// Load OHLCV data from CSV file with validation
///
/// Rows that parse but fail candle validation are skipped with a warning.
/// The result is sorted by time.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;
    let columns = Columns::from_headers(reader.headers().context("Failed to read CSV header")?)?;

    let mut candles = Vec::new();
    let mut invalid_count = 0;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record
            .get(columns.datetime)
            .context("Missing datetime column")?;
        let datetime = parse_datetime(dt_str)?;

        let open = parse_field(&record, columns.open, "open")?;
        let high = parse_field(&record, columns.high, "high")?;
        let low = parse_field(&record, columns.low, "low")?;
        let close = parse_field(&record, columns.close, "close")?;
        let volume = parse_field(&record, columns.volume, "volume")?;

        match Candle::new(datetime, open, high, low, close, volume) {
            Ok(candle) => candles.push(candle),
            Err(e) => {
                invalid_count += 1;
                warn!(
                    "Skipping invalid candle at row {} in {:?}: {}",
                    row_idx + 2, // +2 for 1-indexed and header row
                    path.file_name().unwrap_or_default(),
                    e
                );
            }
        }
    }

    if invalid_count > 0 {
        warn!(
            "Skipped {} invalid candles out of {} in {:?}",
            invalid_count,
            invalid_count + candles.len(),
            path.file_name().unwrap_or_default()
        );
    }

    candles.sort_by_key(|c| c.datetime);
    Ok(candles)
}

/// Load a file from `data_dir` and keep the bars inside `[start, end]`
pub fn load_range(
    data_dir: impl AsRef<Path>,
    file_name: &str,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<Vec<Candle>> {
    let path = data_dir.as_ref().join(file_name);
    let candles =
        load_csv(&path).with_context(|| format!("Failed to load data from {}", path.display()))?;
    let original_len = candles.len();

    let candles = filter_candles_by_date(candles, start, end);
    info!(
        file = file_name,
        candles = candles.len(),
        total = original_len,
        "Loaded price data"
    );

    Ok(candles)
}

/// Parse a bar timestamp in any of the supported layouts (UTC assumed)
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = s.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }

    for format in DATETIME_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
        }
    }

    for format in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(nd) = NaiveDate::parse_from_str(s, format) {
            let ndt = nd.and_hms_opt(0, 0, 0).context("Invalid midnight")?;
            return Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
        }
    }

    anyhow::bail!("Failed to parse datetime: {}", s)
}

/// Filter candles by date range (both ends inclusive)
pub fn filter_candles_by_date(
    candles: Vec<Candle>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Vec<Candle> {
    candles
        .into_iter()
        .filter(|c| {
            let after_start = start.map_or(true, |s| c.datetime >= s);
            let before_end = end.map_or(true, |e| c.datetime <= e);
            after_start && before_end
        })
        .collect()
}

/// Parse a date string (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS) to DateTime<Utc>
pub fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    parse_datetime(date_str).map_err(|_| {
        anyhow::anyhow!(
            "Failed to parse date: {}. Use YYYY-MM-DD or YYYY-MM-DD HH:MM:SS format",
            date_str
        )
    })
}

// =============================================================================
// Data Validation
// =============================================================================

/// Validate candle data for consistency
pub fn validate_candles(candles: &[Candle]) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if candles.is_empty() {
        errors.push("No candles provided".to_string());
        return ValidationResult { errors, warnings };
    }

    for (i, candle) in candles.iter().enumerate() {
        if let Err(e) = candle.validate() {
            errors.push(format!("Candle {}: {}", i, e));
        }
        if i > 0 && candle.datetime <= candles[i - 1].datetime {
            warnings.push(format!("Candle {}: not chronological", i));
        }
    }

    ValidationResult { errors, warnings }
}

/// Result of data validation
#[derive(Debug)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
