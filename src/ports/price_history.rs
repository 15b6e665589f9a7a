use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::PriceBar;

/// Price history error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriceHistoryError {
    #[error("No price history for {0}")]
    NotFound(String),

    #[error("Price history I/O error: {0}")]
    IoError(String),

    #[error("Data parsing error: {0}")]
    ParseError(String),

    #[error("Price history query timed out after {0} ms")]
    Timeout(u64),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Historical bar query parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarQuery {
    pub instrument: String,
    pub timeframe: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl BarQuery {
    pub fn new(
        instrument: &str,
        timeframe: Option<&str>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            instrument: instrument.to_string(),
            timeframe: timeframe.map(str::to_string),
            start_time,
            end_time,
        }
    }

    /// Check if a bar falls inside the query window (inclusive)
    pub fn contains(&self, bar: &PriceBar) -> bool {
        bar.timestamp >= self.start_time && bar.timestamp <= self.end_time
    }
}

/// Price history port trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceHistoryPort: Send + Sync {
    /// Fetch bars for the query window in chronological order.
    /// An empty vector is a valid answer.
    async fn fetch_bars(&self, query: &BarQuery) -> Result<Vec<PriceBar>, PriceHistoryError>;
}

/// Price history that never has data; every trade takes the hold-time fallback
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPriceHistory;

#[async_trait]
impl PriceHistoryPort for NoPriceHistory {
    async fn fetch_bars(&self, _query: &BarQuery) -> Result<Vec<PriceBar>, PriceHistoryError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_query_contains() {
        let start = Utc::now();
        let end = start + Duration::days(2);
        let query = BarQuery::new("SOL", Some("1h"), start, end);

        assert!(query.contains(&PriceBar::new(start, 1.0, 1.0)));
        assert!(query.contains(&PriceBar::new(end, 1.0, 1.0)));
        assert!(!query.contains(&PriceBar::new(end + Duration::seconds(1), 1.0, 1.0)));
        assert!(!query.contains(&PriceBar::new(start - Duration::seconds(1), 1.0, 1.0)));
    }

    #[tokio::test]
    async fn test_no_price_history_is_empty() {
        let query = BarQuery::new("SOL", None, Utc::now(), Utc::now());
        assert!(NoPriceHistory.fetch_bars(&query).await.unwrap().is_empty());
    }
}
