//! Backtesting engine
//!
//! Bar-synchronous event loop. On every bar the broker first resolves the
//! orders placed on the previous bar (T+1 execution) and the strategy is told
//! about each outcome, then the strategy sees the bar and may place new
//! orders. Orders still pending after the last bar are canceled and reported
//! before teardown.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::analyzer::Analyzer;
use crate::oms::{Broker, Order, SimulatedBroker};
use crate::strategies::StrategyReport;
use crate::Strategy;
use crate::{Candle, Config, PerformanceMetrics};

/// Backtest engine
pub struct Backtester {
    config: Config,
    strategy: Box<dyn Strategy>,
}

impl Backtester {
    pub fn new(config: Config, strategy: Box<dyn Strategy>) -> Self {
        Backtester { config, strategy }
    }

    /// Run the strategy over `candles` (chronological order)
    pub fn run(&mut self, candles: &[Candle]) -> Result<BacktestResult> {
        let initial_capital = self.config.backtest.initial_capital;
        let mut broker = SimulatedBroker::new(initial_capital, self.config.commission.clone())
            .with_allow_short(self.config.backtest.allow_short);
        let mut equity_curve = Vec::with_capacity(candles.len());

        info!(
            strategy = self.strategy.name(),
            bars = candles.len(),
            initial_capital,
            "Starting backtest"
        );
        self.strategy.init(&broker);

        for candle in candles {
            for order in broker.process_bar(candle) {
                self.notify(&order)?;
            }

            self.strategy
                .next(candle, &mut broker)
                .with_context(|| format!("Strategy failed on bar {}", candle.datetime))?;

            equity_curve.push((candle.datetime, broker.account_value()));
        }

        let canceled = broker.cancel_pending();
        if !canceled.is_empty() {
            debug!(count = canceled.len(), "Canceling orders left at end of data");
        }
        for order in &canceled {
            self.notify(order)?;
        }

        let report = self.strategy.stop(&broker);
        let fills: Vec<Order> = broker
            .orders()
            .iter()
            .filter(|o| o.executed.is_some())
            .cloned()
            .collect();

        let metrics = Analyzer::from_config(&self.config.backtest).analyze(
            initial_capital,
            &equity_curve,
            candles,
            &fills,
            report.total_commission,
        );

        info!(
            final_value = format!("{:.2}", metrics.final_value),
            total_return = format!("{:.2}%", metrics.total_return * 100.0),
            orders = broker.orders().len(),
            fills = fills.len(),
            "Backtest finished"
        );

        Ok(BacktestResult {
            orders: broker.orders().to_vec(),
            equity_curve,
            final_position: broker.position(),
            report,
            metrics,
        })
    }

    fn notify(&mut self, order: &Order) -> Result<()> {
        self.strategy
            .notify_order(order)
            .with_context(|| format!("Strategy failed handling order {}", order.id))
    }
}

#[derive(Debug, Default)]
pub struct BacktestResult {
    /// Every order with its final status, in resolution order
    pub orders: Vec<Order>,
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
    pub final_position: i64,
    pub report: StrategyReport,
    pub metrics: PerformanceMetrics,
}
