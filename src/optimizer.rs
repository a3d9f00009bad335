//! Parameter optimization
//!
//! Runs one backtest per swept config over the same candles, in parallel with
//! rayon or sequentially, and ranks the outcomes.

use indicatif::ProgressBar;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::backtest::Backtester;
use crate::strategies::create_strategy;
use crate::sweep::extract_params;
use crate::{Candle, Config};

/// Metrics accepted by [`Optimizer::sort_results`]
pub const SORT_KEYS: [&str; 5] = ["sharpe", "calmar", "return", "win_rate", "sqn"];

/// Optimization result for a single parameter combination
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub params: BTreeMap<String, f64>,
    pub sharpe_ratio: f64,
    pub calmar_ratio: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub total_trades: usize,
    pub sqn: f64,
    pub total_commission: f64,
}

impl OptimizationResult {
    fn metric(&self, sort_by: &str) -> f64 {
        let value = match sort_by {
            "calmar" => self.calmar_ratio,
            "return" => self.total_return,
            "win_rate" => self.win_rate,
            "sqn" => self.sqn,
            _ => self.sharpe_ratio,
        };
        // NaN ranks last
        if value.is_nan() {
            f64::NEG_INFINITY
        } else {
            value
        }
    }
}

/// Runs sweeps against a fixed data set
pub struct Optimizer {
    candles: Vec<Candle>,
}

impl Optimizer {
    pub fn new(candles: Vec<Candle>) -> Self {
        Optimizer { candles }
    }

    /// Run every config in parallel
    ///
    /// Combinations that fail to build or run are skipped, so the result may
    /// be shorter than `configs`.
    pub fn optimize(
        &self,
        configs: &[Config],
        progress_bar: Option<&ProgressBar>,
    ) -> Vec<OptimizationResult> {
        info!(
            combinations = configs.len(),
            bars = self.candles.len(),
            "Running parallel optimization"
        );

        configs
            .par_iter()
            .filter_map(|config| {
                let result = self.run_single(config);
                if let Some(pb) = progress_bar {
                    pb.inc(1);
                }
                result
            })
            .collect()
    }

    /// Run every config on the current thread
    pub fn optimize_sequential(
        &self,
        configs: &[Config],
        progress_bar: Option<&ProgressBar>,
    ) -> Vec<OptimizationResult> {
        info!(
            combinations = configs.len(),
            bars = self.candles.len(),
            "Running sequential optimization"
        );

        configs
            .iter()
            .filter_map(|config| {
                let result = self.run_single(config);
                if let Some(pb) = progress_bar {
                    pb.inc(1);
                }
                result
            })
            .collect()
    }

    fn run_single(&self, config: &Config) -> Option<OptimizationResult> {
        let params = extract_params(config);

        let strategy = match create_strategy(config) {
            Ok(s) => s,
            Err(e) => {
                warn!(params = ?params, error = %e, "Skipping invalid parameter combination");
                return None;
            }
        };

        let mut backtester = Backtester::new(config.clone(), strategy);
        let result = match backtester.run(&self.candles) {
            Ok(r) => r,
            Err(e) => {
                warn!(params = ?params, error = format!("{:#}", e), "Backtest failed");
                return None;
            }
        };

        let m = result.metrics;
        debug!(params = ?params, sharpe = m.sharpe_ratio, total_return = m.total_return, "Combination done");

        Some(OptimizationResult {
            params,
            sharpe_ratio: m.sharpe_ratio,
            calmar_ratio: m.calmar_ratio,
            total_return: m.total_return,
            max_drawdown: m.max_drawdown,
            win_rate: m.win_rate,
            total_trades: m.total_trades,
            sqn: m.sqn,
            total_commission: m.total_commission,
        })
    }

    /// Sort results best-first by `sort_by` (unknown keys fall back to sharpe)
    pub fn sort_results(results: &mut [OptimizationResult], sort_by: &str) {
        results.sort_by(|a, b| b.metric(sort_by).total_cmp(&a.metric(sort_by)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::generate_sweep_configs;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn candles() -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        [15.0, 17.0, 22.0, 19.0, 9.0, 12.0, 16.0, 14.0]
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                Candle::new_unchecked(start + Duration::days(i as i64), p, p, p, p, 1_000.0)
            })
            .collect()
    }

    fn sweep_config(steps: Vec<serde_json::Value>) -> Config {
        let mut config = Config::default();
        config.set_strategy_param("log_enabled", json!(false));
        config.sweep = Some(BTreeMap::from([("step_percent".to_string(), steps)]));
        config
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let configs = generate_sweep_configs(&sweep_config(vec![json!(0.05), json!(0.1), json!(0.2)]));
        let optimizer = Optimizer::new(candles());

        let mut parallel = optimizer.optimize(&configs, None);
        let mut sequential = optimizer.optimize_sequential(&configs, None);
        assert_eq!(parallel.len(), 3);
        assert_eq!(sequential.len(), 3);

        Optimizer::sort_results(&mut parallel, "return");
        Optimizer::sort_results(&mut sequential, "return");
        for (p, s) in parallel.iter().zip(&sequential) {
            assert_eq!(p.params, s.params);
            assert_eq!(p.total_return, s.total_return);
        }
    }

    #[test]
    fn test_invalid_combinations_are_skipped() {
        // A zero step cannot build a ladder
        let configs = generate_sweep_configs(&sweep_config(vec![json!(0.0), json!(0.1)]));
        let results = Optimizer::new(candles()).optimize_sequential(&configs, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].params["step_percent"], 0.1);
    }

    #[test]
    fn test_sort_results() {
        let make = |sharpe: f64, ret: f64| OptimizationResult {
            params: BTreeMap::new(),
            sharpe_ratio: sharpe,
            calmar_ratio: 0.0,
            total_return: ret,
            max_drawdown: 0.0,
            win_rate: 0.0,
            total_trades: 0,
            sqn: 0.0,
            total_commission: 0.0,
        };
        let mut results = vec![make(0.5, 0.3), make(1.5, 0.1), make(f64::NAN, 0.2)];

        Optimizer::sort_results(&mut results, "return");
        assert_eq!(results[0].total_return, 0.3);
        assert_eq!(results[2].total_return, 0.1);

        Optimizer::sort_results(&mut results, "unknown");
        assert_eq!(results[0].sharpe_ratio, 1.5);
        assert!(results[2].sharpe_ratio.is_nan());
    }
}
