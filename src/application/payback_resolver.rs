//! Payback Resolver
//!
//! Resolves a trade's time-to-payback: the producer's own value if it sent
//! one, otherwise a bar walk over the trade window. Price history failures
//! and timeouts never propagate; they fall back to the hold time.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{time_to_payback_days, ClosedTrade};
use crate::ports::{BarQuery, PriceHistoryError, PriceHistoryPort};

/// Where a resolved payback value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaybackSource {
    /// Pre-computed on the trade event
    Supplied,
    /// Bar walk over fetched price history
    PriceHistory,
    /// Total hold time (no usable window, no bars, or query failure)
    HoldTimeFallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedPayback {
    pub days: f64,
    pub source: PaybackSource,
}

impl ResolvedPayback {
    fn fallback(days: f64) -> Self {
        Self {
            days,
            source: PaybackSource::HoldTimeFallback,
        }
    }
}

#[derive(Clone)]
pub struct PaybackResolver {
    prices: Arc<dyn PriceHistoryPort>,
    timeout: Duration,
}

impl PaybackResolver {
    pub fn new(prices: Arc<dyn PriceHistoryPort>, timeout: Duration) -> Self {
        Self { prices, timeout }
    }

    pub async fn resolve(&self, trade: &ClosedTrade) -> ResolvedPayback {
        if let Some(days) = trade.supplied_payback_days() {
            return ResolvedPayback {
                days,
                source: PaybackSource::Supplied,
            };
        }

        let window = trade.payback_window();
        let Some((_, entry_time, exit_time)) = window.usable() else {
            tracing::debug!(
                "Trade {}: no usable entry window, payback = hold time ({:.2}d)",
                trade.trade_id,
                window.hold_time_days
            );
            return ResolvedPayback::fallback(window.hold_time_days);
        };

        let query = BarQuery::new(
            &trade.instrument,
            trade.timeframe.as_deref(),
            entry_time,
            exit_time,
        );

        let bars = match tokio::time::timeout(self.timeout, self.prices.fetch_bars(&query)).await {
            Ok(Ok(bars)) => bars,
            Ok(Err(PriceHistoryError::NotFound(source))) => {
                tracing::debug!(
                    "Trade {}: no price history ({}), payback = hold time",
                    trade.trade_id,
                    source
                );
                return ResolvedPayback::fallback(window.hold_time_days);
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    "Trade {}: price history query for {} failed: {} - using hold time",
                    trade.trade_id,
                    trade.instrument,
                    e
                );
                return ResolvedPayback::fallback(window.hold_time_days);
            }
            Err(_) => {
                tracing::warn!(
                    "Trade {}: price history query for {} timed out after {:?} - using hold time",
                    trade.trade_id,
                    trade.instrument,
                    self.timeout
                );
                return ResolvedPayback::fallback(window.hold_time_days);
            }
        };

        if bars.is_empty() {
            return ResolvedPayback::fallback(window.hold_time_days);
        }

        ResolvedPayback {
            days: time_to_payback_days(&window, &bars),
            source: PaybackSource::PriceHistory,
        }
    }
}
