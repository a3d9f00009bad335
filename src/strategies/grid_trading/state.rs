//! Grid state machine
//!
//! Owns the rung pointer, the orders still in flight, the running commission
//! total and the filled orders. It is driven with a price and a ladder and
//! answers with the order requests to submit, so it has no broker of its own.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::StrategyError;
use crate::oms::{Order, OrderId, OrderRequest, OrderStatus, OrderType};
use crate::Side;

use super::ladder::GridLadder;

/// Which rung the price currently occupies (lower index = closer to top)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RungPointer {
    #[default]
    Unpositioned,
    Positioned(usize),
}

impl RungPointer {
    pub fn index(&self) -> Option<usize> {
        match self {
            RungPointer::Unpositioned => None,
            RungPointer::Positioned(i) => Some(*i),
        }
    }
}

/// Request in flight, tied to the crossing that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub side: Side,
    pub price: f64,
    pub quantity: u64,
}

#[derive(Debug, Default)]
pub struct GridState {
    pointer: RungPointer,
    pending: HashMap<OrderId, PendingOrder>,
    total_commission: f64,
    fills: Vec<Order>,
    fault: Option<String>,
}

impl GridState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known rung (replays and tests)
    pub fn positioned(index: usize) -> Self {
        Self {
            pointer: RungPointer::Positioned(index),
            ..Self::default()
        }
    }

    pub fn pointer(&self) -> RungPointer {
        self.pointer
    }

    pub fn total_commission(&self) -> f64 {
        self.total_commission
    }

    /// Filled orders in execution order
    pub fn fills(&self) -> &[Order] {
        &self.fills
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// Orders implied by the latest price
    ///
    /// Unpositioned: pick the first rung the price is above and sell one lot
    /// at every rung above it. Positioned: walk the pointer one rung at a time
    /// until the price sits between its neighbours, one order per step.
    pub fn on_price(
        &mut self,
        ladder: &GridLadder,
        price: f64,
        lot_size: u64,
        order_type: OrderType,
    ) -> Result<Vec<OrderRequest>, StrategyError> {
        self.ensure_healthy()?;

        let mut requests = Vec::new();
        match self.pointer {
            RungPointer::Unpositioned => {
                let Some(entry) = ladder.entry_index(price) else {
                    return Ok(requests);
                };
                self.pointer = RungPointer::Positioned(entry);
                requests.extend(
                    ladder.rungs()[..entry]
                        .iter()
                        .map(|&rung| OrderRequest::new(Side::Sell, order_type, lot_size, rung)),
                );
                debug!(price, rung = entry, sells = entry, "Grid positioned");
            }
            RungPointer::Positioned(mut index) => {
                self.check_on_ladder(index, ladder)?;
                loop {
                    if let Some(upper) = ladder.upper(index).filter(|&upper| price > upper) {
                        index -= 1;
                        requests.push(OrderRequest::new(Side::Sell, order_type, lot_size, upper));
                    } else if let Some(lower) = ladder.lower(index).filter(|&lower| price < lower) {
                        index += 1;
                        requests.push(OrderRequest::new(Side::Buy, order_type, lot_size, lower));
                    } else {
                        break;
                    }
                }
                self.pointer = RungPointer::Positioned(index);
            }
        }

        Ok(requests)
    }

    /// Track a submitted request until its final status arrives
    pub fn register(&mut self, order_id: OrderId, request: &OrderRequest) {
        self.pending.insert(
            order_id,
            PendingOrder {
                side: request.side,
                price: request.price,
                quantity: request.quantity,
            },
        );
    }

    /// Apply an order status update
    ///
    /// Fills add to the commission total. Failed orders move the pointer back
    /// by the number of unfilled lots, against the direction of the attempted
    /// move, without leaving the ladder.
    pub fn on_order(
        &mut self,
        order: &Order,
        ladder: &GridLadder,
        lot_size: u64,
    ) -> Result<(), StrategyError> {
        self.ensure_healthy()?;

        match order.status {
            OrderStatus::Submitted | OrderStatus::Accepted => return Ok(()),
            OrderStatus::Partial => {
                return Err(StrategyError::UnhandledOrderStatus {
                    order_id: order.id,
                    status: order.status,
                })
            }
            _ => {}
        }

        let pending = self
            .pending
            .remove(&order.id)
            .ok_or(StrategyError::UnknownOrder(order.id))?;

        if order.status == OrderStatus::Completed {
            let commission = order.executed.as_ref().map_or(0.0, |e| e.commission);
            self.total_commission += commission;
            self.fills.push(order.clone());
            return Ok(());
        }

        let Some(remaining) = order.remaining_quantity else {
            return Err(self.fault(StrategyError::MissingRemainingQuantity {
                order_id: order.id,
                status: order.status,
            }));
        };
        let lots = remaining / lot_size;

        let RungPointer::Positioned(index) = self.pointer else {
            return Err(self.fault(StrategyError::NotPositioned));
        };

        self.check_on_ladder(index, ladder)?;

        // Entry sells never stepped the pointer, so their rollback can run
        // past the bottom rung; stop at the ladder ends
        let lots = usize::try_from(lots).unwrap_or(usize::MAX);
        let (rolled_back, clamped) = match pending.side {
            Side::Buy => (index.saturating_sub(lots), lots > index),
            Side::Sell => {
                let target = index.saturating_add(lots);
                (target.min(ladder.last_index()), target > ladder.last_index())
            }
        };

        warn!(
            order_id = order.id,
            side = %pending.side,
            status = ?order.status,
            set_price = pending.price,
            remaining,
            from = index,
            to = rolled_back,
            "Order failed, rolling back grid pointer"
        );
        if clamped {
            warn!(
                order_id = order.id,
                lots,
                from = index,
                to = rolled_back,
                "Rollback clamped at the ladder end"
            );
        }
        self.pointer = RungPointer::Positioned(rolled_back);
        Ok(())
    }

    fn check_on_ladder(&mut self, index: usize, ladder: &GridLadder) -> Result<(), StrategyError> {
        if index < ladder.len() {
            Ok(())
        } else {
            Err(self.fault(StrategyError::PointerOutOfRange {
                pointer: index,
                len: ladder.len(),
            }))
        }
    }

    fn ensure_healthy(&self) -> Result<(), StrategyError> {
        match &self.fault {
            Some(reason) => Err(StrategyError::Faulted(reason.clone())),
            None => Ok(()),
        }
    }

    fn fault(&mut self, err: StrategyError) -> StrategyError {
        self.fault = Some(err.to_string());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oms::OrderExecution;
    use chrono::Utc;

    const LOT: u64 = 200;

    fn ladder(rungs: &[f64]) -> GridLadder {
        GridLadder::from_rungs(rungs.to_vec()).unwrap()
    }

    fn sides_and_prices(requests: &[OrderRequest]) -> Vec<(Side, f64)> {
        requests.iter().map(|r| (r.side, r.price)).collect()
    }

    /// Submit every request and return the matching orders
    fn submit(state: &mut GridState, requests: Vec<OrderRequest>) -> Vec<Order> {
        requests
            .into_iter()
            .map(|request| {
                let order = request.clone().into_order(Utc::now());
                state.register(order.id, &request);
                order
            })
            .collect()
    }

    fn failed(mut order: Order, status: OrderStatus, remaining: Option<u64>) -> Order {
        order.status = status;
        order.remaining_quantity = remaining;
        order
    }

    fn filled(mut order: Order, commission: f64) -> Order {
        order.fill(OrderExecution {
            time: Utc::now(),
            price: order.price,
            quantity: order.quantity,
            value: order.price * order.quantity as f64,
            commission,
        });
        order
    }

    #[test]
    fn test_entry_sells_every_rung_above() {
        let ladder = ladder(&[20.0, 18.0, 16.2]);
        let mut state = GridState::new();

        let requests = state.on_price(&ladder, 19.0, LOT, OrderType::Market).unwrap();
        assert_eq!(state.pointer(), RungPointer::Positioned(1));
        assert_eq!(sides_and_prices(&requests), vec![(Side::Sell, 20.0)]);
        assert_eq!(requests[0].quantity, LOT);
    }

    #[test]
    fn test_entry_above_top_positions_without_orders() {
        let ladder = ladder(&[20.0, 18.0, 16.2]);
        let mut state = GridState::new();

        let requests = state.on_price(&ladder, 25.0, LOT, OrderType::Market).unwrap();
        assert!(requests.is_empty());
        assert_eq!(state.pointer(), RungPointer::Positioned(0));
    }

    #[test]
    fn test_no_qualifying_rung_stays_unpositioned() {
        let ladder = ladder(&[20.0, 18.0, 16.2]);
        let mut state = GridState::new();

        let requests = state.on_price(&ladder, 16.2, LOT, OrderType::Market).unwrap();
        assert!(requests.is_empty());
        assert_eq!(state.pointer(), RungPointer::Unpositioned);

        // Retried on the next price
        let requests = state.on_price(&ladder, 17.0, LOT, OrderType::Market).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(state.pointer(), RungPointer::Positioned(2));
    }

    #[test]
    fn test_rally_drains_all_crossings() {
        let ladder = ladder(&[20.0, 18.0, 16.2, 14.58]);
        let mut state = GridState::positioned(2);

        let requests = state.on_price(&ladder, 21.0, LOT, OrderType::Market).unwrap();
        assert_eq!(
            sides_and_prices(&requests),
            vec![(Side::Sell, 18.0), (Side::Sell, 20.0)]
        );
        assert_eq!(state.pointer(), RungPointer::Positioned(0));
    }

    #[test]
    fn test_price_on_a_rung_does_not_cross() {
        let ladder = ladder(&[20.0, 18.0, 16.2, 14.58]);
        let mut state = GridState::positioned(1);

        assert!(state
            .on_price(&ladder, 20.0, LOT, OrderType::Market)
            .unwrap()
            .is_empty());
        assert!(state
            .on_price(&ladder, 16.2, LOT, OrderType::Market)
            .unwrap()
            .is_empty());
        assert_eq!(state.pointer(), RungPointer::Positioned(1));
    }

    #[test]
    fn test_pointer_stays_on_ladder() {
        let ladder = ladder(&[20.0, 18.0, 16.2]);
        let mut state = GridState::positioned(0);

        let requests = state.on_price(&ladder, 1.0, LOT, OrderType::Limit).unwrap();
        assert_eq!(
            sides_and_prices(&requests),
            vec![(Side::Buy, 18.0), (Side::Buy, 16.2)]
        );
        assert!(requests.iter().all(|r| r.order_type == OrderType::Limit));
        assert_eq!(state.pointer(), RungPointer::Positioned(2));

        let requests = state.on_price(&ladder, 100.0, LOT, OrderType::Market).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(state.pointer(), RungPointer::Positioned(0));
    }

    #[test]
    fn test_rejected_buy_rolls_back_by_remaining_lots() {
        let ladder = ladder(&[20.0, 18.0, 16.2, 14.58, 13.12]);
        let mut state = GridState::positioned(1);

        let requests = state.on_price(&ladder, 13.5, LOT, OrderType::Market).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(state.pointer(), RungPointer::Positioned(3));

        let orders = submit(&mut state, requests);
        let rejected = failed(orders[0].clone(), OrderStatus::Rejected, Some(2 * LOT));
        state.on_order(&rejected, &ladder, LOT).unwrap();
        assert_eq!(state.pointer(), RungPointer::Positioned(1));
        assert_eq!(state.pending_count(), 1);
    }

    #[test]
    fn test_every_failed_status_rolls_back() {
        let ladder = ladder(&[20.0, 18.0, 16.2, 14.58]);

        for status in [
            OrderStatus::Canceled,
            OrderStatus::Margin,
            OrderStatus::Rejected,
            OrderStatus::Expired,
        ] {
            let mut state = GridState::positioned(2);
            let requests = state.on_price(&ladder, 19.0, LOT, OrderType::Market).unwrap();
            assert_eq!(state.pointer(), RungPointer::Positioned(1));

            let orders = submit(&mut state, requests);
            let order = failed(orders[0].clone(), status, Some(LOT));
            state.on_order(&order, &ladder, LOT).unwrap();
            assert_eq!(state.pointer(), RungPointer::Positioned(2), "{status:?}");
        }
    }

    #[test]
    fn test_fill_accumulates_commission() {
        let ladder = ladder(&[20.0, 18.0, 16.2]);
        let mut state = GridState::new();
        let requests = state.on_price(&ladder, 17.0, LOT, OrderType::Market).unwrap();
        let orders = submit(&mut state, requests);

        for order in orders {
            state.on_order(&filled(order, 6.8), &ladder, LOT).unwrap();
        }
        assert_eq!(state.fills().len(), 2);
        assert!((state.total_commission() - 13.6).abs() < 1e-9);
        assert_eq!(state.pending_count(), 0);
        assert_eq!(state.pointer(), RungPointer::Positioned(2));
    }

    #[test]
    fn test_non_final_statuses_are_ignored() {
        let ladder = ladder(&[20.0, 18.0, 16.2]);
        let mut state = GridState::positioned(1);
        let requests = state.on_price(&ladder, 21.0, LOT, OrderType::Market).unwrap();
        let orders = submit(&mut state, requests);

        let accepted = failed(orders[0].clone(), OrderStatus::Accepted, None);
        assert!(state.on_order(&accepted, &ladder, LOT).is_ok());
        assert_eq!(state.pending_count(), 1);
        assert_eq!(state.pointer(), RungPointer::Positioned(0));
    }

    #[test]
    fn test_partial_status_is_unhandled() {
        let ladder = ladder(&[20.0, 18.0, 16.2]);
        let mut state = GridState::positioned(1);
        let requests = state.on_price(&ladder, 21.0, LOT, OrderType::Market).unwrap();
        let orders = submit(&mut state, requests);

        let partial = failed(orders[0].clone(), OrderStatus::Partial, Some(100));
        assert_eq!(
            state.on_order(&partial, &ladder, LOT),
            Err(StrategyError::UnhandledOrderStatus {
                order_id: partial.id,
                status: OrderStatus::Partial
            })
        );
        assert_eq!(state.pending_count(), 1);
        assert_eq!(state.pointer(), RungPointer::Positioned(0));
        assert!(!state.is_faulted());
    }

    #[test]
    fn test_missing_remaining_quantity_faults() {
        let ladder = ladder(&[20.0, 18.0, 16.2]);
        let mut state = GridState::positioned(1);
        let requests = state.on_price(&ladder, 21.0, LOT, OrderType::Market).unwrap();
        let orders = submit(&mut state, requests);

        let canceled = failed(orders[0].clone(), OrderStatus::Canceled, None);
        let err = state.on_order(&canceled, &ladder, LOT).unwrap_err();
        assert!(matches!(err, StrategyError::MissingRemainingQuantity { .. }));
        assert!(err.is_fault());
        assert!(state.is_faulted());

        assert!(matches!(
            state.on_price(&ladder, 15.0, LOT, OrderType::Market),
            Err(StrategyError::Faulted(_))
        ));
    }

    #[test]
    fn test_unknown_order_is_reported() {
        let ladder = ladder(&[20.0, 18.0, 16.2]);
        let mut state = GridState::positioned(1);
        let stray = failed(
            OrderRequest::market_buy(LOT, 16.2).into_order(Utc::now()),
            OrderStatus::Rejected,
            Some(LOT),
        );
        assert_eq!(
            state.on_order(&stray, &ladder, LOT),
            Err(StrategyError::UnknownOrder(stray.id))
        );
        assert!(!state.is_faulted());
    }

    #[test]
    fn test_buy_rollback_stops_at_top_rung() {
        let ladder = ladder(&[20.0, 18.0, 16.2]);
        let mut state = GridState::positioned(1);
        let requests = state.on_price(&ladder, 16.0, LOT, OrderType::Market).unwrap();
        let orders = submit(&mut state, requests);
        assert_eq!(state.pointer(), RungPointer::Positioned(2));

        let rejected = failed(orders[0].clone(), OrderStatus::Rejected, Some(5 * LOT));
        state.on_order(&rejected, &ladder, LOT).unwrap();
        assert_eq!(state.pointer(), RungPointer::Positioned(0));
        assert!(!state.is_faulted());
    }

    #[test]
    fn test_failed_entry_sells_at_bottom_rung_stay_on_ladder() {
        let ladder = GridLadder::new(20.0, 10.0, 0.1).unwrap();
        let mut state = GridState::new();

        // 11.0 sits between 11.81 and 10.63: entry on the last rung
        let requests = state.on_price(&ladder, 11.0, LOT, OrderType::Market).unwrap();
        assert_eq!(state.pointer(), RungPointer::Positioned(6));
        assert_eq!(requests.len(), 6);

        for order in submit(&mut state, requests) {
            let canceled = failed(order, OrderStatus::Canceled, Some(LOT));
            state.on_order(&canceled, &ladder, LOT).unwrap();
        }
        assert_eq!(state.pointer(), RungPointer::Positioned(6));
        assert_eq!(state.pending_count(), 0);
        assert!(!state.is_faulted());

        // Still tradable afterwards
        let requests = state.on_price(&ladder, 12.0, LOT, OrderType::Market).unwrap();
        assert_eq!(sides_and_prices(&requests), vec![(Side::Sell, ladder.rungs()[5])]);
    }

    #[test]
    fn test_pointer_off_the_ladder_faults() {
        let ladder = ladder(&[20.0, 18.0, 16.2]);
        let mut state = GridState::positioned(9);

        assert_eq!(
            state.on_price(&ladder, 17.0, LOT, OrderType::Market),
            Err(StrategyError::PointerOutOfRange { pointer: 9, len: 3 })
        );
        assert!(state.is_faulted());
        assert!(matches!(
            state.on_price(&ladder, 17.0, LOT, OrderType::Market),
            Err(StrategyError::Faulted(_))
        ));
    }

    #[test]
    fn test_documented_price_path() {
        let ladder = GridLadder::new(20.0, 10.0, 0.1).unwrap();
        let mut state = GridState::new();

        let per_bar: Vec<Vec<(Side, f64)>> = [15.0, 17.0, 22.0, 19.0, 9.0]
            .iter()
            .map(|&price| {
                let requests = state.on_price(&ladder, price, LOT, OrderType::Market).unwrap();
                sides_and_prices(&requests)
            })
            .collect();

        let r = ladder.rungs();
        assert_eq!(
            per_bar,
            vec![
                vec![(Side::Sell, r[0]), (Side::Sell, r[1]), (Side::Sell, r[2])],
                vec![(Side::Sell, r[2])],
                vec![(Side::Sell, r[1]), (Side::Sell, r[0])],
                vec![],
                vec![
                    (Side::Buy, r[1]),
                    (Side::Buy, r[2]),
                    (Side::Buy, r[3]),
                    (Side::Buy, r[4]),
                    (Side::Buy, r[5]),
                    (Side::Buy, r[6]),
                ],
            ]
        );
        assert_eq!(state.pointer(), RungPointer::Positioned(6));
    }
}
