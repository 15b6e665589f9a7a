//! File-backed Price History
//!
//! Reads bars from `<bars_dir>/<instrument>_<timeframe>.json` (or
//! `<instrument>.json` when the query has no timeframe). Each file is a JSON
//! array of `{timestamp, high, low}` objects.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::domain::PriceBar;
use crate::ports::{BarQuery, PriceHistoryError, PriceHistoryPort};

/// Directory of per-instrument bar files
#[derive(Debug, Clone)]
pub struct JsonBarDirectory {
    root: PathBuf,
}

impl JsonBarDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the bars for a query
    pub fn file_for(&self, instrument: &str, timeframe: Option<&str>) -> PathBuf {
        let instrument = sanitize(instrument);
        let name = match timeframe {
            Some(tf) => format!("{}_{}.json", instrument, sanitize(tf)),
            None => format!("{}.json", instrument),
        };
        self.root.join(name)
    }
}

/// Keep file names inside the bars directory
fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            c => c,
        })
        .collect()
}

#[async_trait]
impl PriceHistoryPort for JsonBarDirectory {
    async fn fetch_bars(&self, query: &BarQuery) -> Result<Vec<PriceBar>, PriceHistoryError> {
        let path = self.file_for(&query.instrument, query.timeframe.as_deref());

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PriceHistoryError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(PriceHistoryError::IoError(e.to_string())),
        };

        let bars: Vec<PriceBar> = serde_json::from_str(&content)
            .map_err(|e| PriceHistoryError::ParseError(format!("{}: {}", path.display(), e)))?;

        let mut window: Vec<PriceBar> = bars.into_iter().filter(|b| query.contains(b)).collect();
        window.sort_by_key(|b| b.timestamp);

        tracing::debug!(
            "Loaded {} bars for {} from {}",
            window.len(),
            query.instrument,
            path.display()
        );

        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    #[test]
    fn test_file_for() {
        let dir = JsonBarDirectory::new("/data/bars");
        assert_eq!(
            dir.file_for("SOL/USDC", Some("1h")),
            PathBuf::from("/data/bars/SOL-USDC_1h.json")
        );
        assert_eq!(dir.file_for("BONK", None), PathBuf::from("/data/bars/BONK.json"));
    }

    #[tokio::test]
    async fn test_fetch_filters_and_sorts() {
        let dir = tempdir().unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bars = vec![
            PriceBar::new(start + Duration::days(2), 1.2, 1.0),
            PriceBar::new(start, 1.0, 0.9),
            PriceBar::new(start + Duration::days(10), 2.0, 1.5),
        ];
        std::fs::write(
            dir.path().join("SOL_1d.json"),
            serde_json::to_string(&bars).unwrap(),
        )
        .unwrap();

        let source = JsonBarDirectory::new(dir.path());
        let query = BarQuery::new("SOL", Some("1d"), start, start + Duration::days(3));
        let window = source.fetch_bars(&query).await.unwrap();

        assert_eq!(window.len(), 2);
        assert_eq!(window[0].timestamp, start);
        assert_eq!(window[1].timestamp, start + Duration::days(2));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let source = JsonBarDirectory::new(dir.path());
        let now = Utc::now();

        let result = source.fetch_bars(&BarQuery::new("NOPE", None, now, now)).await;
        assert!(matches!(result, Err(PriceHistoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_malformed_file_is_parse_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("BAD.json"), "not json").unwrap();
        let source = JsonBarDirectory::new(dir.path());
        let now = Utc::now();

        let result = source.fetch_bars(&BarQuery::new("BAD", None, now, now)).await;
        assert!(matches!(result, Err(PriceHistoryError::ParseError(_))));
    }
}
