//! Performance analysis
//!
//! Risk ratios from the per-bar equity curve and trade statistics from FIFO
//! matching of filled orders. Degenerate inputs (too few returns, zero
//! deviation) report 0 instead of NaN or infinity.

use chrono::{DateTime, Utc};
use statrs::statistics::Statistics;
use std::collections::VecDeque;

use crate::config::BacktestConfig;
use crate::oms::Order;
use crate::{Candle, PerformanceMetrics, Side};

/// A closed position leg produced by FIFO matching
#[derive(Debug, Clone, PartialEq)]
pub struct RoundTrip {
    /// Side of the opening fill (`Sell` = short round trip)
    pub direction: Side,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub quantity: u64,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Net of the commission attributed to both legs
    pub pnl: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Analyzer {
    pub periods_per_year: f64,
    pub risk_free_rate: f64,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self {
            periods_per_year: 252.0,
            risk_free_rate: 0.02,
        }
    }
}

impl Analyzer {
    pub fn new(periods_per_year: f64, risk_free_rate: f64) -> Self {
        Self {
            periods_per_year,
            risk_free_rate,
        }
    }

    pub fn from_config(config: &BacktestConfig) -> Self {
        Self::new(config.periods_per_year, config.risk_free_rate)
    }

    /// Required return per bar for Sharpe and Sortino
    fn required_return(&self) -> f64 {
        self.risk_free_rate / self.periods_per_year
    }

    /// Per-bar threshold equivalent to the annual risk-free rate, for Omega
    fn omega_threshold(&self) -> f64 {
        (1.0 + self.risk_free_rate).powf(1.0 / self.periods_per_year) - 1.0
    }

    pub fn analyze(
        &self,
        initial_value: f64,
        equity_curve: &[(DateTime<Utc>, f64)],
        candles: &[Candle],
        fills: &[Order],
        total_commission: f64,
    ) -> PerformanceMetrics {
        let mut values = Vec::with_capacity(equity_curve.len() + 1);
        values.push(initial_value);
        values.extend(equity_curve.iter().map(|(_, v)| *v));

        let final_value = values.last().copied().unwrap_or(initial_value);
        let returns = simple_returns(&values);
        let total_return = if initial_value > 0.0 {
            final_value / initial_value - 1.0
        } else {
            0.0
        };
        let annualized_return = annualize(total_return, returns.len(), self.periods_per_year);
        let (max_drawdown, max_drawdown_duration) = max_drawdown(&values);

        let calmar_ratio = if max_drawdown > 0.0 {
            annualized_return / max_drawdown
        } else {
            0.0
        };

        let benchmark_return = match (candles.first(), candles.last()) {
            (Some(first), Some(last)) if first.close > 0.0 => last.close / first.close - 1.0,
            _ => 0.0,
        };

        let trips = match_round_trips(fills);
        let pnls: Vec<f64> = trips.iter().map(|t| t.pnl).collect();
        let total_trades = trips.len();
        let winning_trades = pnls.iter().filter(|&&p| p > 0.0).count();
        let losing_trades = pnls.iter().filter(|&&p| p < 0.0).count();
        let rate = |count: usize| {
            if total_trades > 0 {
                count as f64 / total_trades as f64
            } else {
                0.0
            }
        };
        let sqn = system_quality_number(&pnls);

        PerformanceMetrics {
            initial_value,
            final_value,
            total_return,
            annualized_return,
            annual_volatility: annual_volatility(&returns, self.periods_per_year),
            sharpe_ratio: sharpe_ratio(&returns, self.required_return(), self.periods_per_year),
            sortino_ratio: sortino_ratio(&returns, self.required_return(), self.periods_per_year),
            calmar_ratio,
            omega_ratio: omega_ratio(&returns, self.omega_threshold()),
            max_drawdown,
            max_drawdown_duration,
            benchmark_return,
            total_trades,
            winning_trades,
            losing_trades,
            win_rate: rate(winning_trades),
            loss_rate: rate(losing_trades),
            sqn,
            sqn_rating: sqn_rating(sqn).to_string(),
            total_commission,
        }
    }
}

/// Period-over-period simple returns; a zero base yields a zero return
pub fn simple_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| if w[0] != 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

/// `(1 + total)^(periods_per_year / periods) - 1`
pub fn annualize(total_return: f64, periods: usize, periods_per_year: f64) -> f64 {
    if periods == 0 {
        return 0.0;
    }
    let growth = 1.0 + total_return;
    if growth <= 0.0 {
        return -1.0;
    }
    growth.powf(periods_per_year / periods as f64) - 1.0
}

/// Sample standard deviation scaled by √periods_per_year
pub fn annual_volatility(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    returns.iter().copied().std_dev() * periods_per_year.sqrt()
}

/// Annualized Sharpe ratio of returns in excess of `required_return` per bar
pub fn sharpe_ratio(returns: &[f64], required_return: f64, periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }

    let excess: Vec<f64> = returns.iter().map(|r| r - required_return).collect();
    let std_dev = excess.iter().copied().std_dev();
    if std_dev.is_nan() || std_dev <= 0.0 {
        return 0.0;
    }

    excess.iter().copied().mean() / std_dev * periods_per_year.sqrt()
}

/// Annualized Sortino ratio; downside deviation is taken over every bar
pub fn sortino_ratio(returns: &[f64], required_return: f64, periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }

    let downside = returns
        .iter()
        .map(|r| (r - required_return).min(0.0).powi(2))
        .sum::<f64>()
        / returns.len() as f64;
    let downside_dev = downside.sqrt();
    if downside_dev <= 0.0 {
        return 0.0;
    }

    let mean_excess = returns.iter().copied().mean() - required_return;
    mean_excess / downside_dev * periods_per_year.sqrt()
}

/// Gains above `threshold` over losses below it
pub fn omega_ratio(returns: &[f64], threshold: f64) -> f64 {
    let (gains, losses) = returns
        .iter()
        .map(|r| r - threshold)
        .fold((0.0, 0.0), |(g, l), r| {
            if r > 0.0 {
                (g + r, l)
            } else {
                (g, l - r)
            }
        });

    if losses > 0.0 {
        gains / losses
    } else {
        0.0
    }
}

/// Largest peak-to-trough fall as a fraction, and the longest run of bars
/// spent below a previous peak
pub fn max_drawdown(values: &[f64]) -> (f64, usize) {
    let Some(&first) = values.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut underwater = 0;
    let mut longest = 0;

    for &value in values {
        if value >= peak {
            peak = value;
            underwater = 0;
            continue;
        }
        underwater += 1;
        longest = longest.max(underwater);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
        }
    }

    (max_dd, longest)
}

/// An open lot waiting to be closed by an opposite fill
struct OpenLot {
    side: Side,
    time: DateTime<Utc>,
    quantity: u64,
    price: f64,
    commission_per_unit: f64,
}

/// Pair filled orders first-in first-out into round trips
///
/// Works for both long and short inventory: a fill opposite to the open lots
/// closes them oldest first, and any excess opens a lot on its own side.
pub fn match_round_trips(fills: &[Order]) -> Vec<RoundTrip> {
    let mut open: VecDeque<OpenLot> = VecDeque::new();
    let mut trips = Vec::new();

    for order in fills {
        let Some(exec) = &order.executed else {
            continue;
        };
        if exec.quantity == 0 {
            continue;
        }

        let exit_commission_per_unit = exec.commission / exec.quantity as f64;
        let mut remaining = exec.quantity;

        while remaining > 0 {
            let Some(lot) = open.front_mut().filter(|lot| lot.side != order.side) else {
                break;
            };

            let quantity = remaining.min(lot.quantity);
            let direction = match lot.side {
                Side::Buy => 1.0,
                Side::Sell => -1.0,
            };
            let gross = (exec.price - lot.price) * quantity as f64 * direction;
            let costs =
                (lot.commission_per_unit + exit_commission_per_unit) * quantity as f64;

            trips.push(RoundTrip {
                direction: lot.side,
                entry_time: lot.time,
                exit_time: exec.time,
                quantity,
                entry_price: lot.price,
                exit_price: exec.price,
                pnl: gross - costs,
            });

            lot.quantity -= quantity;
            remaining -= quantity;
            if lot.quantity == 0 {
                open.pop_front();
            }
        }

        if remaining > 0 {
            open.push_back(OpenLot {
                side: order.side,
                time: exec.time,
                quantity: remaining,
                price: exec.price,
                commission_per_unit: exit_commission_per_unit,
            });
        }
    }

    trips
}

/// System Quality Number: √n · mean(pnl) / std(pnl)
pub fn system_quality_number(pnls: &[f64]) -> f64 {
    if pnls.len() < 2 {
        return 0.0;
    }
    let std_dev = pnls.iter().copied().std_dev();
    if std_dev.is_nan() || std_dev <= 0.0 {
        return 0.0;
    }
    (pnls.len() as f64).sqrt() * pnls.iter().copied().mean() / std_dev
}

/// Verbal rating for an SQN value
pub fn sqn_rating(sqn: f64) -> &'static str {
    match sqn {
        s if (1.6..=1.9).contains(&s) => "below average",
        s if s > 1.9 && s <= 2.4 => "average",
        s if s > 2.4 && s <= 2.9 => "good",
        s if s > 2.9 && s <= 5.0 => "excellent",
        s if s > 5.0 && s <= 6.9 => "superb",
        s if s > 6.9 => "holy grail",
        _ => "poor",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oms::{OrderExecution, OrderRequest};
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn day(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(i)
    }

    fn fill(side: Side, quantity: u64, price: f64, commission: f64, i: i64) -> Order {
        let mut order = OrderRequest::new(side, Default::default(), quantity, price)
            .into_order(day(i));
        order.fill(OrderExecution {
            time: day(i),
            price,
            quantity,
            value: price * quantity as f64,
            commission,
        });
        order
    }

    #[test]
    fn test_max_drawdown_and_duration() {
        let (dd, duration) = max_drawdown(&[100.0, 120.0, 90.0, 100.0, 130.0, 125.0]);
        assert_relative_eq!(dd, 0.25);
        assert_eq!(duration, 2);
        assert_eq!(max_drawdown(&[]), (0.0, 0));
        assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]), (0.0, 0));
    }

    #[test]
    fn test_sharpe_on_known_series() {
        let returns = [0.01, 0.02, 0.03];
        // mean 0.02, sample std 0.01
        assert_relative_eq!(
            sharpe_ratio(&returns, 0.0, 252.0),
            2.0 * 252.0_f64.sqrt(),
            epsilon = 1e-9
        );
        assert_eq!(sharpe_ratio(&[0.01, 0.01, 0.01], 0.0, 252.0), 0.0);
        assert_eq!(sharpe_ratio(&[0.01], 0.0, 252.0), 0.0);
    }

    #[test]
    fn test_sortino_and_omega() {
        let returns = [0.02, -0.01, 0.03, -0.02];
        let downside_dev = ((0.0001 + 0.0004) / 4.0_f64).sqrt();
        assert_relative_eq!(
            sortino_ratio(&returns, 0.0, 252.0),
            0.005 / downside_dev * 252.0_f64.sqrt(),
            epsilon = 1e-9
        );
        assert_relative_eq!(omega_ratio(&returns, 0.0), 0.05 / 0.03, epsilon = 1e-12);
        assert_eq!(omega_ratio(&[0.01, 0.02], 0.0), 0.0);
        assert_eq!(sortino_ratio(&[0.01, 0.02], 0.0, 252.0), 0.0);
    }

    #[test]
    fn test_annualize() {
        assert_relative_eq!(annualize(0.21, 504, 252.0), 0.1, epsilon = 1e-12);
        assert_eq!(annualize(0.5, 0, 252.0), 0.0);
        assert_eq!(annualize(-1.5, 10, 252.0), -1.0);
    }

    #[test]
    fn test_round_trips_short_then_long() {
        let fills = vec![
            fill(Side::Sell, 200, 20.0, 7.0, 0),
            fill(Side::Buy, 200, 18.0, 5.0, 1),
            fill(Side::Buy, 200, 16.0, 5.0, 2),
            fill(Side::Sell, 200, 17.0, 6.7, 3),
        ];
        let trips = match_round_trips(&fills);
        assert_eq!(trips.len(), 2);

        assert_eq!(trips[0].direction, Side::Sell);
        assert_relative_eq!(trips[0].pnl, 400.0 - 12.0, epsilon = 1e-9);
        assert_eq!(trips[0].exit_time, day(1));

        assert_eq!(trips[1].direction, Side::Buy);
        assert_relative_eq!(trips[1].pnl, 200.0 - 11.7, epsilon = 1e-9);
    }

    #[test]
    fn test_round_trips_split_lots() {
        let fills = vec![
            fill(Side::Buy, 200, 10.0, 5.0, 0),
            fill(Side::Buy, 200, 9.0, 5.0, 1),
            fill(Side::Sell, 300, 11.0, 6.0, 2),
        ];
        let trips = match_round_trips(&fills);
        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0].quantity, 200);
        assert_eq!(trips[1].quantity, 100);
        assert_relative_eq!(trips[0].pnl, 200.0 - 5.0 - 4.0, epsilon = 1e-9);
        assert_relative_eq!(trips[1].pnl, 200.0 - 2.5 - 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_sqn_and_rating() {
        assert_eq!(system_quality_number(&[10.0]), 0.0);
        let pnls = [1.0, 2.0, 3.0];
        // √3 · 2 / 1
        assert_relative_eq!(system_quality_number(&pnls), 2.0 * 3.0_f64.sqrt());

        assert_eq!(sqn_rating(0.5), "poor");
        assert_eq!(sqn_rating(1.7), "below average");
        assert_eq!(sqn_rating(2.0), "average");
        assert_eq!(sqn_rating(2.5), "good");
        assert_eq!(sqn_rating(3.46), "excellent");
        assert_eq!(sqn_rating(6.0), "superb");
        assert_eq!(sqn_rating(7.0), "holy grail");
    }

    #[test]
    fn test_analyze_flat_equity() {
        let curve: Vec<_> = (0..10).map(|i| (day(i), 1_000.0)).collect();
        let metrics = Analyzer::default().analyze(1_000.0, &curve, &[], &[], 0.0);
        assert_eq!(metrics.total_return, 0.0);
        assert_eq!(metrics.max_drawdown, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.sqn_rating, "poor");
    }

    #[test]
    fn test_analyze_counts_trades() {
        let curve = vec![(day(0), 1_000.0), (day(1), 1_100.0), (day(2), 1_050.0)];
        let candles = vec![
            Candle::new_unchecked(day(0), 10.0, 10.0, 10.0, 10.0, 1.0),
            Candle::new_unchecked(day(2), 12.0, 12.0, 12.0, 12.0, 1.0),
        ];
        let fills = vec![
            fill(Side::Buy, 100, 10.0, 0.0, 0),
            fill(Side::Sell, 100, 12.0, 0.0, 1),
            fill(Side::Sell, 100, 12.0, 0.0, 1),
            fill(Side::Buy, 100, 13.0, 0.0, 2),
        ];
        let metrics = Analyzer::new(252.0, 0.0).analyze(1_000.0, &curve, &candles, &fills, 0.0);

        assert_relative_eq!(metrics.total_return, 0.05, epsilon = 1e-12);
        assert_relative_eq!(metrics.benchmark_return, 0.2, epsilon = 1e-12);
        assert_relative_eq!(metrics.max_drawdown, 50.0 / 1_100.0, epsilon = 1e-12);
        assert_eq!(metrics.total_trades, 2);
        assert_eq!(metrics.winning_trades, 1);
        assert_eq!(metrics.losing_trades, 1);
        assert_relative_eq!(metrics.win_rate, 0.5);
        assert_relative_eq!(metrics.loss_rate, 0.5);
    }
}
