//! Grid Trading Strategy
//!
//! Binds the ladder, the configuration and the grid state to the strategy
//! lifecycle. Crossings found on a bar are submitted to the broker right away
//! and their outcomes come back through `notify_order`.

use tracing::{info, warn};

use crate::error::{ConfigError, StrategyError};
use crate::oms::{Broker, Order, OrderStatus};
use crate::strategies::{Strategy, StrategyReport};
use crate::{Candle, Side, TradeRecord};

use super::config::GridTradingConfig;
use super::ladder::GridLadder;
use super::state::GridState;

/// Relative tolerance when comparing the fill ledger with broker cash
const LEDGER_TOLERANCE: f64 = 1e-6;

pub struct GridStrategy {
    config: GridTradingConfig,
    ladder: GridLadder,
    state: GridState,
    initial_cash: f64,
}

impl GridStrategy {
    pub fn new(config: GridTradingConfig) -> Result<Self, ConfigError> {
        let ladder = GridLadder::from_config(&config)?;
        info!(
            top = config.top,
            bottom = config.bottom,
            step_percent = config.step_percent,
            rungs = ?ladder.rungs(),
            "Grid ladder built"
        );

        Ok(Self {
            config,
            ladder,
            state: GridState::new(),
            initial_cash: 0.0,
        })
    }

    pub fn config(&self) -> &GridTradingConfig {
        &self.config
    }

    pub fn ladder(&self) -> &GridLadder {
        &self.ladder
    }

    pub fn state(&self) -> &GridState {
        &self.state
    }

    fn log_fill(&self, order: &Order) {
        if !self.config.log_enabled {
            return;
        }
        if let Some(exec) = &order.executed {
            info!(
                time = %exec.time,
                side = %order.side,
                set_price = order.price,
                price = format!("{:.2}", exec.price),
                value = format!("{:.2}", exec.value),
                commission = format!("{:.2}", exec.commission),
                "Order executed"
            );
        }
    }

    /// Replay the fills into trade records and the cash they imply
    fn ledger(&self) -> (Vec<TradeRecord>, f64) {
        let mut cash = self.initial_cash;
        let trades = self
            .state
            .fills()
            .iter()
            .filter_map(|order| {
                let exec = order.executed.as_ref()?;
                match order.side {
                    Side::Buy => cash -= exec.value,
                    Side::Sell => cash += exec.value,
                }
                Some(TradeRecord::new(
                    exec.time,
                    order.side,
                    order.price,
                    exec.price,
                    exec.quantity,
                    exec.commission,
                ))
            })
            .collect();

        (trades, cash - self.state.total_commission())
    }
}

impl Strategy for GridStrategy {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn init(&mut self, broker: &dyn Broker) {
        self.initial_cash = broker.cash();
    }

    fn next(&mut self, candle: &Candle, broker: &mut dyn Broker) -> Result<(), StrategyError> {
        let was_positioned = self.state.pointer().index().is_some();
        let requests = self.state.on_price(
            &self.ladder,
            candle.close,
            self.config.lot_size,
            self.config.order_type,
        )?;

        if !was_positioned && self.config.log_enabled {
            if let Some(rung) = self.state.pointer().index() {
                info!(
                    time = %candle.datetime,
                    price = candle.close,
                    rung,
                    "Opening grid position"
                );
            }
        }

        for request in requests {
            if self.config.log_enabled {
                info!(
                    time = %candle.datetime,
                    side = %request.side,
                    set_price = request.price,
                    quantity = request.quantity,
                    close = candle.close,
                    "Submitting order"
                );
            }
            let order_id = broker.submit_order(request.clone(), candle.datetime);
            self.state.register(order_id, &request);
        }

        Ok(())
    }

    fn notify_order(&mut self, order: &Order) -> Result<(), StrategyError> {
        if order.status == OrderStatus::Completed {
            self.log_fill(order);
        }
        self.state
            .on_order(order, &self.ladder, self.config.lot_size)
    }

    fn stop(&mut self, broker: &dyn Broker) -> StrategyReport {
        let total_commission = self.state.total_commission();
        let account_value = broker.account_value();
        let commission_ratio = if account_value > 0.0 {
            total_commission / account_value
        } else {
            0.0
        };

        info!(
            commission = format!("{:.2}", total_commission),
            commission_ratio = format!("{:.5}", commission_ratio),
            "Grid strategy stopped"
        );

        let (trades, ledger_value) = self.ledger();
        let broker_cash = broker.cash();
        let ledger_matches_cash =
            (ledger_value - broker_cash).abs() <= LEDGER_TOLERANCE * broker_cash.abs().max(1.0);
        if !ledger_matches_cash {
            warn!(
                ledger_value,
                broker_cash, "Fill ledger does not match broker cash"
            );
        }

        StrategyReport {
            total_commission,
            commission_ratio,
            trades,
            ledger_value,
            broker_cash,
            account_value,
            ledger_matches_cash,
        }
    }
}
