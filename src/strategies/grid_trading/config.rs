//! Grid Trading Configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::oms::OrderType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridTradingConfig {
    /// Highest rung of the ladder
    pub top: f64,

    /// Lowest price the ladder may reach (inclusive)
    pub bottom: f64,

    /// Distance between rungs as a fraction of the rung above (e.g. 0.1 = 10%)
    pub step_percent: f64,

    /// Units per order (default: 200)
    #[serde(default = "default_lot_size")]
    pub lot_size: u64,

    /// Emit per-order log lines (default: true)
    #[serde(default = "default_true")]
    pub log_enabled: bool,

    /// Order type used for rung crossings (default: market)
    #[serde(default)]
    pub order_type: OrderType,
}

fn default_lot_size() -> u64 {
    200
}

fn default_true() -> bool {
    true
}

impl Default for GridTradingConfig {
    fn default() -> Self {
        Self {
            top: 20.0,
            bottom: 10.0,
            step_percent: 0.1,
            lot_size: default_lot_size(),
            log_enabled: true,
            order_type: OrderType::Market,
        }
    }
}

impl GridTradingConfig {
    /// Reject settings the ladder cannot be built from
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("top", self.top),
            ("bottom", self.bottom),
            ("step_percent", self.step_percent),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { field, value });
            }
        }

        if self.bottom < 0.0 {
            return Err(ConfigError::NegativeBottom(self.bottom));
        }
        if self.top <= self.bottom {
            return Err(ConfigError::InvalidBounds {
                top: self.top,
                bottom: self.bottom,
            });
        }
        if self.step_percent <= 0.0 || self.step_percent >= 1.0 {
            return Err(ConfigError::InvalidStep(self.step_percent));
        }
        if self.lot_size == 0 {
            return Err(ConfigError::InvalidLotSize);
        }

        Ok(())
    }
}
