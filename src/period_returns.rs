//! Annual and monthly return breakdown with matrix rendering
//!
//! Each period's return is its last equity value over the last value of the
//! previous period; the first period is measured against the initial capital.

use chrono::{DateTime, Datelike, Utc};
use std::collections::BTreeMap;

/// Year-Month key for organizing data
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            year: dt.year(),
            month: dt.month(),
        }
    }
}

/// Period returns organized by year and month
#[derive(Debug, Clone)]
pub struct PeriodReturns {
    monthly: BTreeMap<YearMonth, f64>,
    annual: BTreeMap<i32, f64>,
}

/// Chain closing values per period into returns
fn chain<K: Ord + Copy>(initial_value: f64, closes: BTreeMap<K, f64>) -> BTreeMap<K, f64> {
    let mut previous = initial_value;
    closes
        .into_iter()
        .map(|(key, close)| {
            let ret = if previous != 0.0 {
                close / previous - 1.0
            } else {
                0.0
            };
            previous = close;
            (key, ret)
        })
        .collect()
}

impl PeriodReturns {
    /// Build from a chronologically ordered equity curve
    pub fn from_equity_curve(initial_value: f64, equity_curve: &[(DateTime<Utc>, f64)]) -> Self {
        let mut month_closes = BTreeMap::new();
        let mut year_closes = BTreeMap::new();

        for &(time, value) in equity_curve {
            month_closes.insert(YearMonth::from_datetime(time), value);
            year_closes.insert(time.year(), value);
        }

        Self {
            monthly: chain(initial_value, month_closes),
            annual: chain(initial_value, year_closes),
        }
    }

    pub fn annual(&self) -> &BTreeMap<i32, f64> {
        &self.annual
    }

    pub fn monthly(&self) -> &BTreeMap<YearMonth, f64> {
        &self.monthly
    }

    /// Return for a specific year and month
    pub fn get(&self, year: i32, month: u32) -> Option<f64> {
        self.monthly.get(&YearMonth::new(year, month)).copied()
    }

    /// Share of months with a positive return
    pub fn positive_month_ratio(&self) -> f64 {
        if self.monthly.is_empty() {
            return 0.0;
        }
        let positive = self.monthly.values().filter(|&&r| r > 0.0).count();
        positive as f64 / self.monthly.len() as f64
    }

    fn format_cell(ret: Option<f64>) -> String {
        match ret {
            Some(r) => format!("{:>7.2}%", r * 100.0),
            None => " ".repeat(8),
        }
    }

    /// Render the monthly return matrix as a formatted string
    pub fn render(&self) -> String {
        if self.monthly.is_empty() {
            return "No equity data to display period returns.".to_string();
        }

        let width = 6 + 13 * 11 + 11;
        let mut output = String::new();

        output.push_str(&format!("\n{}\n", "=".repeat(width)));
        output.push_str("MONTHLY RETURNS (%)\n");
        output.push_str(&format!("{}\n", "=".repeat(width)));

        output.push_str(&format!("{:>6} │", "Year"));
        for name in [
            "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
        ] {
            output.push_str(&format!(" {:>8} │", name));
        }
        output.push_str(&format!(" {:>8}\n", "Year"));
        output.push_str(&format!("{}\n", "-".repeat(width)));

        for (&year, &annual) in &self.annual {
            output.push_str(&format!("{:>6} │", year));
            for month in 1..=12 {
                output.push_str(&format!(" {} │", Self::format_cell(self.get(year, month))));
            }
            output.push_str(&format!(" {}\n", Self::format_cell(Some(annual))));
        }

        output.push_str(&format!("{}\n", "=".repeat(width)));
        let positive = self.monthly.values().filter(|&&r| r > 0.0).count();
        output.push_str(&format!(
            "Positive months: {:.1}% ({} of {})\n",
            self.positive_month_ratio() * 100.0,
            positive,
            self.monthly.len()
        ));
        output.push_str(&format!("{}\n", "=".repeat(width)));

        output
    }
}
