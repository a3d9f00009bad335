//! Grid Trading Backtester
//!
//! A bar-by-bar backtesting system for a price-ladder grid strategy on a
//! single instrument, with a simulated broker, performance analysis, and
//! parameter sweeps.

pub mod analyzer;
pub mod backtest;
pub mod commission;
pub mod config;
pub mod data;
pub mod error;
pub mod oms;
pub mod optimizer;
pub mod period_returns;
pub mod strategies;
pub mod sweep;
pub mod trade_log;
pub mod types;

pub use config::Config;
pub use period_returns::PeriodReturns;
pub use strategies::Strategy;
pub use types::*;
