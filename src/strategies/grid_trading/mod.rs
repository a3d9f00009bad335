//! Grid Trading Strategy
//!
//! Holds a ladder of price rungs between a top and a bottom bound. When the
//! price rises through a rung it sells one lot, when it falls through a rung
//! it buys one lot, so the position grows as the price falls.

mod config;
mod ladder;
mod state;
mod strategy;

pub use config::GridTradingConfig;
pub use ladder::GridLadder;
pub use state::{GridState, PendingOrder, RungPointer};
pub use strategy::GridStrategy;

use crate::{Config, Strategy};
use anyhow::{Context, Result};

/// Create strategy from config (called by registry)
pub fn create(config: &Config) -> Result<Box<dyn Strategy>> {
    let strategy_config: GridTradingConfig = serde_json::from_value(config.strategy.clone())
        .context("Failed to parse grid strategy config")?;
    let strategy = GridStrategy::new(strategy_config).context("Invalid grid strategy config")?;
    Ok(Box::new(strategy))
}
