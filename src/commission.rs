//! Stock commission scheme
//!
//! Percentage commission with a per-order minimum, stamp duty charged on
//! sells only, and an optional flat platform fee.

use serde::{Deserialize, Serialize};

use crate::Side;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionScheme {
    /// Commission rate on traded value (e.g. 0.0005 = 0.05%)
    #[serde(default = "default_rate")]
    pub rate: f64,

    /// Minimum commission per order
    #[serde(default = "default_min_commission")]
    pub min_commission: f64,

    /// Stamp duty rate, sells only
    #[serde(default = "default_stamp_duty")]
    pub stamp_duty: f64,

    /// Flat fee per order
    #[serde(default)]
    pub platform_fee: f64,
}

fn default_rate() -> f64 {
    0.0005
}

fn default_min_commission() -> f64 {
    5.0
}

fn default_stamp_duty() -> f64 {
    0.0005
}

impl Default for CommissionScheme {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            min_commission: default_min_commission(),
            stamp_duty: default_stamp_duty(),
            platform_fee: 0.0,
        }
    }
}

impl CommissionScheme {
    /// Commission for trading `quantity` units at `price`
    pub fn commission(&self, side: Side, quantity: u64, price: f64) -> f64 {
        if quantity == 0 {
            return 0.0;
        }

        let value = quantity as f64 * price;
        let base = (value * self.rate).max(self.min_commission) + self.platform_fee;

        match side {
            Side::Buy => base,
            Side::Sell => base + value * self.stamp_duty,
        }
    }
}
