//! Domain error types
//!
//! Configuration problems are fatal when a strategy is constructed. Strategy
//! errors are raised from the per-bar and order callbacks; the ones marked
//! as faults leave the strategy instance unusable.

use thiserror::Error;

use crate::oms::{OrderId, OrderStatus};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("top ({top}) must be greater than bottom ({bottom})")]
    InvalidBounds { top: f64, bottom: f64 },

    #[error("bottom ({0}) must be >= 0")]
    NegativeBottom(f64),

    #[error("step_percent ({0}) must be in (0, 1)")]
    InvalidStep(f64),

    #[error("lot_size must be > 0")]
    InvalidLotSize,

    #[error("{field} must be a finite number, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("ladder rungs must be non-empty and strictly decreasing")]
    InvalidRungs,

    #[error("initial capital ({0}) must not be negative")]
    NegativeCapital(f64),

    #[error("start ({start}) must be before end ({end})")]
    InvalidDateRange { start: String, end: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum StrategyError {
    #[error("order {order_id} failed with status {status:?} but reported no remaining quantity")]
    MissingRemainingQuantity { order_id: OrderId, status: OrderStatus },

    #[error("order {order_id} resolved with unhandled status {status:?}")]
    UnhandledOrderStatus { order_id: OrderId, status: OrderStatus },

    #[error("order {0} is not pending for this strategy")]
    UnknownOrder(OrderId),

    #[error("rung pointer {pointer} is not on the ladder (len {len})")]
    PointerOutOfRange { pointer: usize, len: usize },

    #[error("order resolved while the strategy holds no position")]
    NotPositioned,

    #[error("strategy is faulted: {0}")]
    Faulted(String),
}

impl StrategyError {
    /// Whether this error leaves the strategy bookkeeping inconsistent
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            StrategyError::MissingRemainingQuantity { .. }
                | StrategyError::PointerOutOfRange { .. }
                | StrategyError::NotPositioned
                | StrategyError::Faulted(_)
        )
    }
}
