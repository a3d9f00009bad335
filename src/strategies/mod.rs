//! Trading Strategies Module
//!
//! Strategy framework with:
//! - A lifecycle trait driven by the backtester (`init`, `next`, `notify_order`, `stop`)
//! - A name → factory registry so the config picks the strategy

pub mod grid_trading;

use crate::error::StrategyError;
use crate::oms::{Broker, Order};
use crate::{Candle, Config, TradeRecord};
use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

// =============================================================================
// Strategy Trait - The contract all strategies must implement
// =============================================================================

/// Trading strategy driven one bar at a time
pub trait Strategy: Send + Sync {
    /// Strategy identifier (must match config's strategy_name)
    fn name(&self) -> &'static str;

    /// Called once before the first bar
    fn init(&mut self, _broker: &dyn Broker) {}

    /// Called once per bar after pending orders were resolved.
    /// The current price is the candle close.
    fn next(&mut self, candle: &Candle, broker: &mut dyn Broker) -> Result<(), StrategyError>;

    /// Called for every status change of an order this strategy submitted
    fn notify_order(&mut self, order: &Order) -> Result<(), StrategyError>;

    /// Called once after the last bar
    fn stop(&mut self, broker: &dyn Broker) -> StrategyReport;
}

/// What a strategy hands back at teardown
#[derive(Debug, Clone, Default, Serialize)]
pub struct StrategyReport {
    pub total_commission: f64,
    /// Commission over final account value (0 when the account is worthless)
    pub commission_ratio: f64,
    pub trades: Vec<TradeRecord>,
    /// Cash reconstructed from the fills: initial − buys + sells − commission
    pub ledger_value: f64,
    pub broker_cash: f64,
    pub account_value: f64,
    pub ledger_matches_cash: bool,
}

// =============================================================================
// Strategy Factory - Type alias for strategy constructor functions
// =============================================================================

/// Factory function type for creating strategies from config
pub type StrategyFactory = fn(&Config) -> Result<Box<dyn Strategy>>;

// =============================================================================
// Strategy Registry - Dynamic registration without hardcoding
// =============================================================================

/// Global strategy registry
static REGISTRY: OnceLock<RwLock<HashMap<&'static str, StrategyFactory>>> = OnceLock::new();

fn get_registry() -> &'static RwLock<HashMap<&'static str, StrategyFactory>> {
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        map.insert("grid", grid_trading::create as StrategyFactory);
        RwLock::new(map)
    })
}

/// Create a strategy from configuration
pub fn create_strategy(config: &Config) -> Result<Box<dyn Strategy>> {
    let registry = get_registry()
        .read()
        .map_err(|_| anyhow::anyhow!("strategy registry lock poisoned"))?;

    let factory = registry
        .get(config.strategy_name.as_str())
        .ok_or_else(|| {
            let mut available: Vec<_> = registry.keys().copied().collect();
            available.sort_unstable();
            anyhow::anyhow!(
                "Unknown strategy: '{}'. Available: {}",
                config.strategy_name,
                available.join(", ")
            )
        })?;

    factory(config)
}

/// Get list of available strategy names
pub fn available_strategies() -> Vec<&'static str> {
    let mut names: Vec<_> = get_registry()
        .read()
        .map(|registry| registry.keys().copied().collect())
        .unwrap_or_default();
    names.sort_unstable();
    names
}

/// Register a new strategy (for plugins or testing)
pub fn register_strategy(name: &'static str, factory: StrategyFactory) {
    if let Ok(mut registry) = get_registry().write() {
        registry.insert(name, factory);
    }
}
