//! Broker interface and the bar-by-bar execution simulator
//!
//! Orders submitted while processing bar T are resolved against bar T+1:
//! market orders fill at the open, limit orders fill when the bar trades
//! through the set price and expire otherwise. Every order receives exactly
//! one final status.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::debug;

use crate::commission::CommissionScheme;
use crate::oms::types::{Order, OrderExecution, OrderId, OrderRequest, OrderStatus, OrderType};
use crate::{Candle, Side};

/// What a strategy can see and do on the execution side
pub trait Broker {
    /// Queue an order; the outcome is reported later through the order callback
    fn submit_order(&mut self, request: OrderRequest, time: DateTime<Utc>) -> OrderId;

    /// Free cash
    fn cash(&self) -> f64;

    /// Cash plus the position marked at the last close
    fn account_value(&self) -> f64;

    /// Signed position in units (negative = short)
    fn position(&self) -> i64;

    /// Every order that reached a final status, in resolution order
    fn orders(&self) -> &[Order];
}

/// Simulated broker with cash and single-instrument position accounting
#[derive(Debug, Clone)]
pub struct SimulatedBroker {
    cash: f64,
    position: i64,
    last_price: f64,
    commission: CommissionScheme,
    allow_short: bool,
    pending: VecDeque<Order>,
    history: Vec<Order>,
}

impl SimulatedBroker {
    pub fn new(initial_cash: f64, commission: CommissionScheme) -> Self {
        Self {
            cash: initial_cash,
            position: 0,
            last_price: 0.0,
            commission,
            allow_short: true,
            pending: VecDeque::new(),
            history: Vec::new(),
        }
    }

    /// Allow sells beyond the held position (default: true)
    pub fn with_allow_short(mut self, allow_short: bool) -> Self {
        self.allow_short = allow_short;
        self
    }

    pub fn pending_orders(&self) -> usize {
        self.pending.len()
    }

    /// Check whether an order trades on this candle and at what price
    pub fn check_fill(&self, order: &Order, candle: &Candle) -> Option<f64> {
        match (order.side, order.order_type) {
            (_, OrderType::Market) => Some(candle.open),

            // Buy limit: fills if candle low ≤ limit, gaps below fill at the open
            (Side::Buy, OrderType::Limit) => {
                (candle.low <= order.price).then(|| candle.open.min(order.price))
            }

            // Sell limit: fills if candle high ≥ limit, gaps above fill at the open
            (Side::Sell, OrderType::Limit) => {
                (candle.high >= order.price).then(|| candle.open.max(order.price))
            }
        }
    }

    /// Resolve every queued order against `candle`, then mark to its close
    pub fn process_bar(&mut self, candle: &Candle) -> Vec<Order> {
        let mut resolved = Vec::with_capacity(self.pending.len());

        while let Some(mut order) = self.pending.pop_front() {
            match self.check_fill(&order, candle) {
                Some(price) => self.execute(&mut order, price, candle.datetime),
                None => order.fail(OrderStatus::Expired),
            }

            debug!(
                order_id = order.id,
                side = %order.side,
                status = ?order.status,
                set_price = order.price,
                "Order resolved"
            );

            self.history.push(order.clone());
            resolved.push(order);
        }

        self.last_price = candle.close;
        resolved
    }

    /// Cancel everything still queued (end of data)
    pub fn cancel_pending(&mut self) -> Vec<Order> {
        let mut canceled = Vec::with_capacity(self.pending.len());
        while let Some(mut order) = self.pending.pop_front() {
            order.fail(OrderStatus::Canceled);
            self.history.push(order.clone());
            canceled.push(order);
        }
        canceled
    }

    fn execute(&mut self, order: &mut Order, price: f64, time: DateTime<Utc>) {
        let quantity = order.quantity;
        let value = price * quantity as f64;
        let commission = self.commission.commission(order.side, quantity, price);

        match order.side {
            Side::Buy => {
                if self.cash < value + commission {
                    order.fail(OrderStatus::Margin);
                    return;
                }
                self.cash -= value + commission;
                self.position += quantity as i64;
            }
            Side::Sell => {
                if !self.allow_short && self.position < quantity as i64 {
                    order.fail(OrderStatus::Rejected);
                    return;
                }
                self.cash += value - commission;
                self.position -= quantity as i64;
            }
        }

        order.fill(OrderExecution {
            time,
            price,
            quantity,
            value,
            commission,
        });
    }
}

impl Broker for SimulatedBroker {
    fn submit_order(&mut self, request: OrderRequest, time: DateTime<Utc>) -> OrderId {
        let order = request.into_order(time);
        let id = order.id;
        self.pending.push_back(order);
        id
    }

    fn cash(&self) -> f64 {
        self.cash
    }

    fn account_value(&self) -> f64 {
        self.cash + self.position as f64 * self.last_price
    }

    fn position(&self) -> i64 {
        self.position
    }

    fn orders(&self) -> &[Order] {
        &self.history
    }
}
