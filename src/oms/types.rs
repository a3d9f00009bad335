//! Core OMS types
//!
//! Defines order requests, orders, execution details, and status enumerations.

use crate::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Order ID type
pub type OrderId = u64;

/// Atomic counter for order ID generation
static ORDER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate next order ID (thread-safe, lock-free)
pub fn next_order_id() -> OrderId {
    ORDER_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Order type - determines execution logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Execute at the next bar's open
    #[default]
    Market,

    /// Execute when the next bar reaches the set price
    /// Buy limit: low ≤ price
    /// Sell limit: high ≥ price
    Limit,
}

/// Order status as reported by the execution simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Submitted,
    Accepted,
    Partial,
    Completed,
    Canceled,
    Margin,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// Final status without a fill
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            OrderStatus::Canceled | OrderStatus::Margin | OrderStatus::Rejected | OrderStatus::Expired
        )
    }

    /// Status that will not change any more
    pub fn is_final(&self) -> bool {
        *self == OrderStatus::Completed || self.is_failed()
    }
}

/// Order execution details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderExecution {
    pub time: DateTime<Utc>,
    pub price: f64,
    pub quantity: u64,
    pub value: f64,
    pub commission: f64,
}

/// Order request from a strategy
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: u64,
    /// Rung price that triggered the request; the limit for limit orders
    pub price: f64,
}

impl OrderRequest {
    pub fn new(side: Side, order_type: OrderType, quantity: u64, price: f64) -> Self {
        Self {
            side,
            order_type,
            quantity,
            price,
        }
    }

    /// Create a market buy order
    pub fn market_buy(quantity: u64, price: f64) -> Self {
        Self::new(Side::Buy, OrderType::Market, quantity, price)
    }

    /// Create a market sell order
    pub fn market_sell(quantity: u64, price: f64) -> Self {
        Self::new(Side::Sell, OrderType::Market, quantity, price)
    }

    /// Create a limit buy order
    pub fn limit_buy(quantity: u64, price: f64) -> Self {
        Self::new(Side::Buy, OrderType::Limit, quantity, price)
    }

    /// Create a limit sell order
    pub fn limit_sell(quantity: u64, price: f64) -> Self {
        Self::new(Side::Sell, OrderType::Limit, quantity, price)
    }

    /// Convert to an order with a fresh id
    pub fn into_order(self, created_at: DateTime<Utc>) -> Order {
        Order {
            id: next_order_id(),
            side: self.side,
            order_type: self.order_type,
            quantity: self.quantity,
            price: self.price,
            status: OrderStatus::Submitted,
            created_at,
            remaining_quantity: Some(self.quantity),
            executed: None,
        }
    }
}

/// Order information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: u64,
    /// Price set at creation
    pub price: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    /// Unfilled quantity; `None` when the venue did not report it
    pub remaining_quantity: Option<u64>,
    pub executed: Option<OrderExecution>,
}

impl Order {
    pub fn is_buy(&self) -> bool {
        self.side == Side::Buy
    }

    pub fn is_sell(&self) -> bool {
        self.side == Side::Sell
    }

    pub(crate) fn fill(&mut self, execution: OrderExecution) {
        self.remaining_quantity = Some(self.quantity - execution.quantity);
        self.status = OrderStatus::Completed;
        self.executed = Some(execution);
    }

    pub(crate) fn fail(&mut self, status: OrderStatus) {
        self.status = status;
        self.remaining_quantity = Some(self.quantity);
    }
}
