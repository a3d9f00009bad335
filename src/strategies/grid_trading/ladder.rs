//! Price ladder
//!
//! Rungs run from `top` down towards `bottom`, each one `step_percent` below
//! the previous and rounded to two decimals. Rounding happens in decimal
//! space so a 10% step from 20 lands exactly on 18.00.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::ConfigError;

use super::config::GridTradingConfig;

/// Immutable, strictly decreasing sequence of rung prices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridLadder {
    rungs: Vec<f64>,
}

impl GridLadder {
    /// Build the ladder for `top`, `bottom` and `step_percent`
    pub fn new(top: f64, bottom: f64, step_percent: f64) -> Result<Self, ConfigError> {
        GridTradingConfig {
            top,
            bottom,
            step_percent,
            ..Default::default()
        }
        .validate()?;

        let to_decimal = |field: &'static str, value: f64| {
            Decimal::from_f64(value).ok_or(ConfigError::NonFinite { field, value })
        };
        let top_d = to_decimal("top", top)?;
        let bottom_d = to_decimal("bottom", bottom)?;
        let factor = Decimal::ONE - to_decimal("step_percent", step_percent)?;

        let mut rungs = Vec::new();
        let mut current = top_d;
        while current >= bottom_d {
            rungs.push(current.to_f64().ok_or(ConfigError::InvalidRungs)?);

            let next = (current * factor).round_dp(2);
            // Rounding can stall on tiny prices; stop before repeating a rung
            if next >= current {
                break;
            }
            current = next;
        }

        Ok(Self { rungs })
    }

    /// Build from a configuration section
    pub fn from_config(config: &GridTradingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::new(config.top, config.bottom, config.step_percent)
    }

    /// Use explicit rungs; they must be non-empty and strictly decreasing
    pub fn from_rungs(rungs: Vec<f64>) -> Result<Self, ConfigError> {
        let decreasing = rungs.windows(2).all(|w| w[0] > w[1]);
        if rungs.is_empty() || !decreasing || rungs.iter().any(|r| !r.is_finite()) {
            return Err(ConfigError::InvalidRungs);
        }
        Ok(Self { rungs })
    }

    pub fn rungs(&self) -> &[f64] {
        &self.rungs
    }

    pub fn len(&self) -> usize {
        self.rungs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.rungs.len().saturating_sub(1)
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.rungs.get(index).copied()
    }

    /// Rung above `index`, if any
    pub fn upper(&self, index: usize) -> Option<f64> {
        index.checked_sub(1).and_then(|i| self.get(i))
    }

    /// Rung below `index`, if any
    pub fn lower(&self, index: usize) -> Option<f64> {
        self.get(index + 1)
    }

    /// First rung, scanning from the top, that `price` is strictly above
    pub fn entry_index(&self, price: f64) -> Option<usize> {
        self.rungs.iter().position(|&rung| price > rung)
    }
}
