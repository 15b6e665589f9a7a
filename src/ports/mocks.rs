use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Pattern, PriceBar};
use crate::ports::price_history::{BarQuery, PriceHistoryError, PriceHistoryPort};
use crate::ports::storage::{PatternStore, StoreError};

/// Price history mock that records queries and serves scripted bars
#[derive(Debug, Default, Clone)]
pub struct ScriptedPriceHistory {
    calls: Arc<Mutex<Vec<BarQuery>>>,
    bars: Arc<Mutex<HashMap<String, Vec<PriceBar>>>>,
    failures: Arc<Mutex<HashMap<String, PriceHistoryError>>>,
    delay: Option<Duration>,
}

impl ScriptedPriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the bars returned for an instrument
    pub fn with_bars(self, instrument: &str, bars: Vec<PriceBar>) -> Self {
        self.bars
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(instrument.to_string(), bars);
        self
    }

    /// Builder method to make every query for an instrument fail
    pub fn with_failure(self, instrument: &str, error: PriceHistoryError) -> Self {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(instrument.to_string(), error);
        self
    }

    /// Builder method to delay every response
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get all recorded queries
    pub fn get_calls(&self) -> Vec<BarQuery> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl PriceHistoryPort for ScriptedPriceHistory {
    async fn fetch_bars(&self, query: &BarQuery) -> Result<Vec<PriceBar>, PriceHistoryError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&query.instrument)
            .cloned();
        if let Some(error) = failure {
            return Err(error);
        }

        let bars = self
            .bars
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&query.instrument)
            .map(|bars| bars.iter().filter(|b| query.contains(b)).cloned().collect())
            .unwrap_or_default();
        Ok(bars)
    }
}

/// Pattern store wrapper that injects failures into writes
///
/// Conflicts are injected before the inner store sees the write, so the
/// stored record stays untouched and a retry reads the same version.
pub struct FaultyPatternStore<S> {
    inner: S,
    conflicts_remaining: Mutex<u32>,
    failing_keys: Mutex<HashSet<String>>,
    write_attempts: Mutex<u32>,
}

impl<S: PatternStore> FaultyPatternStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            conflicts_remaining: Mutex::new(0),
            failing_keys: Mutex::new(HashSet::new()),
            write_attempts: Mutex::new(0),
        }
    }

    /// Builder method: the next `count` writes report a version conflict
    pub fn with_conflicts(self, count: u32) -> Self {
        *self.conflicts_remaining.lock().unwrap_or_else(|e| e.into_inner()) = count;
        self
    }

    /// Builder method: every write to `pattern_key` fails with a backend error
    pub fn with_failing_key(self, pattern_key: &str) -> Self {
        self.failing_keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pattern_key.to_string());
        self
    }

    /// Total write attempts seen, including injected failures
    pub fn write_attempts(&self) -> u32 {
        *self.write_attempts.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: PatternStore> PatternStore for FaultyPatternStore<S> {
    async fn get(&self, pattern_key: &str) -> Result<Option<Pattern>, StoreError> {
        self.inner.get(pattern_key).await
    }

    async fn compare_and_put(&self, pattern: Pattern) -> Result<Pattern, StoreError> {
        *self.write_attempts.lock().unwrap_or_else(|e| e.into_inner()) += 1;

        if self
            .failing_keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&pattern.pattern_key)
        {
            return Err(StoreError::Backend(format!(
                "injected failure for '{}'",
                pattern.pattern_key
            )));
        }

        {
            let mut remaining = self.conflicts_remaining.lock().unwrap_or_else(|e| e.into_inner());
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::VersionConflict {
                    key: pattern.pattern_key.clone(),
                    expected: pattern.version,
                    found: pattern.version + 1,
                });
            }
        }

        self.inner.compare_and_put(pattern).await
    }

    async fn find_by_family(&self, family_id: &str) -> Result<Vec<Pattern>, StoreError> {
        self.inner.find_by_family(family_id).await
    }

    async fn list_module(&self, module: &str) -> Result<Vec<Pattern>, StoreError> {
        self.inner.list_module(module).await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.inner.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryPatternStore;
    use crate::domain::BucketedDimensions;
    use chrono::{Duration as ChronoDuration, Utc};

    #[tokio::test]
    async fn test_scripted_history_records_and_filters() {
        let start = Utc::now();
        let bars = vec![
            PriceBar::new(start, 1.1, 0.9),
            PriceBar::new(start + ChronoDuration::days(5), 1.5, 1.0),
        ];
        let history = ScriptedPriceHistory::new().with_bars("ABC", bars);

        let query = BarQuery::new("ABC", None, start, start + ChronoDuration::days(1));
        let result = history.fetch_bars(&query).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(history.get_calls(), vec![query]);
    }

    #[tokio::test]
    async fn test_scripted_history_failure() {
        let history = ScriptedPriceHistory::new()
            .with_failure("ABC", PriceHistoryError::IoError("disk".to_string()));
        let now = Utc::now();

        let result = history.fetch_bars(&BarQuery::new("ABC", None, now, now)).await;
        assert_eq!(result, Err(PriceHistoryError::IoError("disk".to_string())));

        // Unknown instruments are empty, not errors
        let other = history.fetch_bars(&BarQuery::new("XYZ", None, now, now)).await;
        assert_eq!(other, Ok(Vec::new()));
    }

    #[tokio::test]
    async fn test_faulty_store_injects_conflicts() {
        let store = FaultyPatternStore::new(InMemoryPatternStore::new()).with_conflicts(2);
        let pattern = Pattern::new(
            "k".to_string(),
            "pm".to_string(),
            BucketedDimensions::new(),
            "f".to_string(),
            Vec::new(),
            Utc::now(),
        );

        assert!(store.compare_and_put(pattern.clone()).await.unwrap_err().is_conflict());
        assert!(store.compare_and_put(pattern.clone()).await.unwrap_err().is_conflict());
        assert_eq!(store.compare_and_put(pattern).await.unwrap().version, 1);
        assert_eq!(store.write_attempts(), 3);
    }
}
