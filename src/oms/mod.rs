//! Order Management System
//!
//! Order types and the simulated broker that resolves them bar by bar.

pub mod broker;
pub mod types;

pub use broker::{Broker, SimulatedBroker};
pub use types::{
    next_order_id, Order, OrderExecution, OrderId, OrderRequest, OrderStatus, OrderType,
};
