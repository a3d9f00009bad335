//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files, with `.env` and
//! environment variable overrides for the data and results directories.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::commission::CommissionScheme;
use crate::data::parse_date;
use crate::error::ConfigError;
use crate::strategies::grid_trading::GridTradingConfig;
use crate::Symbol;

/// Overrides `backtest.data_dir`
pub const DATA_DIR_ENV: &str = "GRID_DATA_DIR";

/// Overrides `backtest.results_dir`
pub const RESULTS_DIR_ENV: &str = "GRID_RESULTS_DIR";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub commission: CommissionScheme,
    #[serde(default = "default_strategy_name")]
    pub strategy_name: String,
    pub strategy: serde_json::Value,
    /// Parameter sweep for optimization (optional)
    /// Each key is a strategy param name, value is array of values to test
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep: Option<BTreeMap<String, Vec<serde_json::Value>>>,
}

fn default_strategy_name() -> String {
    "grid".to_string()
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        // A missing .env file is not an error
        dotenv::dotenv().ok();
        config.apply_env_overrides();

        Ok(config)
    }

    /// Replace the directories from `GRID_DATA_DIR` / `GRID_RESULTS_DIR` when set
    pub fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = std::env::var(DATA_DIR_ENV) {
            self.backtest.data_dir = data_dir;
        }
        if let Ok(results_dir) = std::env::var(RESULTS_DIR_ENV) {
            self.backtest.results_dir = results_dir;
        }
    }

    /// Check the backtest section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backtest.validate()
    }

    /// Set a single strategy parameter
    pub fn set_strategy_param(&mut self, key: &str, value: serde_json::Value) {
        if let Some(obj) = self.strategy.as_object_mut() {
            obj.insert(key.to_string(), value);
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backtest: BacktestConfig::default(),
            commission: CommissionScheme::default(),
            strategy_name: default_strategy_name(),
            strategy: serde_json::to_value(GridTradingConfig::default())
                .unwrap_or_else(|_| serde_json::json!({})),
            sweep: None,
        }
    }
}

/// Backtest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
    /// CSV file name inside `data_dir`
    #[serde(default)]
    pub data_file: String,
    /// Security code
    #[serde(default)]
    pub symbol: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// First bar to include (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// Last bar to include
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,
    /// Let the broker sell beyond the held position
    #[serde(default = "default_allow_short")]
    pub allow_short: bool,
    /// Bars per year for annualization
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: f64,
    /// Annual risk-free rate
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_results_dir() -> String {
    "results".to_string()
}

fn default_initial_capital() -> f64 {
    100_000.0
}

fn default_allow_short() -> bool {
    true
}

fn default_periods_per_year() -> f64 {
    252.0
}

fn default_risk_free_rate() -> f64 {
    0.02
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            data_dir: default_data_dir(),
            results_dir: default_results_dir(),
            data_file: String::new(),
            symbol: String::new(),
            name: String::new(),
            start: None,
            end: None,
            initial_capital: default_initial_capital(),
            allow_short: default_allow_short(),
            periods_per_year: default_periods_per_year(),
            risk_free_rate: default_risk_free_rate(),
        }
    }
}

impl BacktestConfig {
    pub fn symbol(&self) -> Symbol {
        Symbol::new(self.symbol.clone())
    }

    /// Data file name, `{symbol}.csv` when not set
    pub fn data_file_name(&self) -> Option<String> {
        if !self.data_file.is_empty() {
            Some(self.data_file.clone())
        } else if !self.symbol.is_empty() {
            Some(format!("{}.csv", self.symbol))
        } else {
            None
        }
    }

    pub fn start_date(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        self.start.as_deref().map(parse_date).transpose()
    }

    pub fn end_date(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        self.end.as_deref().map(parse_date).transpose()
    }

    /// Capital must not be negative and start must precede end
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.initial_capital.is_finite() {
            return Err(ConfigError::NonFinite {
                field: "initial_capital",
                value: self.initial_capital,
            });
        }
        if self.initial_capital < 0.0 {
            return Err(ConfigError::NegativeCapital(self.initial_capital));
        }

        if let (Some(start), Some(end)) = (&self.start, &self.end) {
            let ordered = match (parse_date(start), parse_date(end)) {
                (Ok(s), Ok(e)) => s < e,
                _ => false,
            };
            if !ordered {
                return Err(ConfigError::InvalidDateRange {
                    start: start.clone(),
                    end: end.clone(),
                });
            }
        }

        Ok(())
    }
}
