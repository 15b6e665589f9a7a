//! Time-to-Payback
//!
//! How long after entry the unrealized gain first matched the risk actually
//! taken. Risk is the deepest drawdown from entry seen so far; payback is the
//! first bar whose high returns at least that much.
//!
//! The calculation never fails: any missing or unusable input falls back to
//! the trade's total hold time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Price bar with the fields payback needs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub high: f64,
    pub low: f64,
}

impl PriceBar {
    pub fn new(timestamp: DateTime<Utc>, high: f64, low: f64) -> Self {
        Self { timestamp, high, low }
    }
}

/// Entry side of a closed trade
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaybackWindow {
    pub entry_price: Option<f64>,
    pub entry_time: Option<DateTime<Utc>>,
    pub exit_time: Option<DateTime<Utc>>,
    /// Total hold time, returned whenever payback cannot be established
    pub hold_time_days: f64,
}

impl PaybackWindow {
    /// Entry price and a strictly increasing [entry, exit] window, if usable
    pub fn usable(&self) -> Option<(f64, DateTime<Utc>, DateTime<Utc>)> {
        let entry_price = self.entry_price.filter(|p| *p > 0.0)?;
        let entry_time = self.entry_time?;
        let exit_time = self.exit_time?;
        if exit_time <= entry_time {
            return None;
        }
        Some((entry_price, entry_time, exit_time))
    }
}

/// Elapsed days between two instants, floored at zero
pub fn days_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    ((end - start).num_milliseconds() as f64 / MILLIS_PER_DAY).max(0.0)
}

/// Walk the bars and return days until payback, or the hold time.
pub fn time_to_payback_days(window: &PaybackWindow, bars: &[PriceBar]) -> f64 {
    let Some((entry_price, entry_time, _)) = window.usable() else {
        return window.hold_time_days;
    };
    if bars.is_empty() {
        return window.hold_time_days;
    }

    let mut running_min = f64::INFINITY;
    for bar in bars {
        running_min = running_min.min(bar.low);

        let risk_taken = (entry_price - running_min) / entry_price;
        if risk_taken.is_nan() || risk_taken <= 0.0 {
            continue;
        }

        let return_to_high = (bar.high - entry_price) / entry_price;
        if return_to_high >= risk_taken {
            return days_between(entry_time, bar.timestamp);
        }
    }

    window.hold_time_days
}
