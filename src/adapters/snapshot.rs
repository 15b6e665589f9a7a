//! Store Snapshots
//!
//! Persists the in-memory pattern and baseline stores to a JSON file so a
//! replay can resume from where the previous run stopped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::adapters::memory::{InMemoryBaselineStore, InMemoryPatternStore};
use crate::domain::{BaselineSegment, Pattern, PatternKey};

/// Default snapshot file name
pub const DEFAULT_SNAPSHOT_FILE: &str = "edge_snapshot.json";

#[derive(Error, Debug, Clone)]
pub enum SnapshotError {
    #[error("Failed to serialize snapshot: {0}")]
    SerializationError(String),

    #[error("Failed to deserialize snapshot: {0}")]
    DeserializationError(String),

    #[error("Failed to write snapshot file: {0}")]
    WriteError(String),

    #[error("Failed to read snapshot file: {0}")]
    ReadError(String),

    #[error("Failed to create directory: {0}")]
    DirectoryError(String),
}

/// Full contents of both stores at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub saved_at: DateTime<Utc>,
    pub patterns: Vec<Pattern>,
    pub baselines: Vec<BaselineSegment>,
}

/// Outcome of loading a snapshot on startup
#[derive(Debug, Clone)]
pub enum RecoveryStatus {
    /// No snapshot yet, start empty
    Empty,
    /// Snapshot loaded and validated
    Recovered(StoreSnapshot),
    /// Snapshot unreadable or inconsistent, manual intervention needed
    Corrupted(String),
}

impl StoreSnapshot {
    pub fn empty() -> Self {
        Self {
            saved_at: Utc::now(),
            patterns: Vec::new(),
            baselines: Vec::new(),
        }
    }

    /// Copy the current contents of both stores
    pub async fn capture(patterns: &InMemoryPatternStore, baselines: &InMemoryBaselineStore) -> Self {
        Self {
            saved_at: Utc::now(),
            patterns: patterns.snapshot().await,
            baselines: baselines.snapshot().await,
        }
    }

    /// Rebuild the stores from this snapshot
    pub fn into_stores(self) -> (InMemoryPatternStore, InMemoryBaselineStore) {
        (
            InMemoryPatternStore::from_patterns(self.patterns),
            InMemoryBaselineStore::from_segments(self.baselines),
        )
    }

    /// Save snapshot to disk (write to a temp file, then rename)
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SnapshotError::DirectoryError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| SnapshotError::SerializationError(e.to_string()))?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, content).map_err(|e| SnapshotError::WriteError(e.to_string()))?;
        fs::rename(&tmp_path, path).map_err(|e| SnapshotError::WriteError(e.to_string()))?;

        tracing::info!(
            "Snapshot saved: {} patterns, {} baselines -> {}",
            self.patterns.len(),
            self.baselines.len(),
            path.display()
        );

        Ok(())
    }

    /// Load snapshot from disk
    pub fn load(path: &Path) -> Result<Option<Self>, SnapshotError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|e| SnapshotError::ReadError(e.to_string()))?;

        if content.trim().is_empty() {
            return Ok(None);
        }

        let snapshot: Self = serde_json::from_str(&content)
            .map_err(|e| SnapshotError::DeserializationError(e.to_string()))?;

        tracing::info!(
            "Snapshot loaded: {} patterns, {} baselines (saved {})",
            snapshot.patterns.len(),
            snapshot.baselines.len(),
            snapshot.saved_at
        );

        Ok(Some(snapshot))
    }

    /// Load with validation
    pub fn try_recover(path: &Path) -> RecoveryStatus {
        match Self::load(path) {
            Ok(Some(snapshot)) => match snapshot.validate() {
                Ok(()) => RecoveryStatus::Recovered(snapshot),
                Err(reason) => RecoveryStatus::Corrupted(reason),
            },
            Ok(None) => RecoveryStatus::Empty,
            Err(e) => RecoveryStatus::Corrupted(e.to_string()),
        }
    }

    fn validate(&self) -> Result<(), String> {
        for pattern in &self.patterns {
            PatternKey::parse(&pattern.pattern_key).map_err(|e| e.to_string())?;
            if pattern.stats.n == 0 {
                return Err(format!("Pattern '{}' has no samples", pattern.pattern_key));
            }
            if pattern.version == 0 {
                return Err(format!("Pattern '{}' has version 0", pattern.pattern_key));
            }
        }
        for baseline in &self.baselines {
            if !baseline.mean_rr.is_finite() {
                return Err(format!("Baseline {} has non-finite mean", baseline.key));
            }
        }
        Ok(())
    }

    /// Default snapshot path inside a data directory
    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join(DEFAULT_SNAPSHOT_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BaselineKey, BucketedDimensions, Observation};
    use crate::ports::{BaselineStore, PatternStore};
    use tempfile::tempdir;

    fn stored_pattern(key: &str) -> Pattern {
        let mut pattern = Pattern::new(
            key.to_string(),
            "pm".to_string(),
            BucketedDimensions::new(),
            "module=pm|outcome_class=win".to_string(),
            Vec::new(),
            Utc::now(),
        );
        pattern.stats.observe(&Observation {
            rr: 1.0,
            is_win: true,
            hold_time_days: 1.0,
            time_to_payback_days: 0.5,
        });
        pattern
    }

    async fn populated_stores() -> (InMemoryPatternStore, InMemoryBaselineStore) {
        let patterns = InMemoryPatternStore::new();
        patterns
            .compare_and_put(stored_pattern("module=pm|outcome_class=win"))
            .await
            .unwrap();
        let baselines = InMemoryBaselineStore::new();
        baselines
            .record(&BaselineKey::global("pm"), 0.5, Utc::now())
            .await
            .unwrap();
        (patterns, baselines)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = StoreSnapshot::default_path(dir.path());
        let (patterns, baselines) = populated_stores().await;

        StoreSnapshot::capture(&patterns, &baselines).await.save(&path).unwrap();

        let loaded = StoreSnapshot::load(&path).unwrap().unwrap();
        assert_eq!(loaded.patterns.len(), 1);
        assert_eq!(loaded.baselines.len(), 1);

        let (patterns, baselines) = loaded.into_stores();
        assert_eq!(patterns.count().await.unwrap(), 1);
        let global = baselines.get(&BaselineKey::global("pm")).await.unwrap().unwrap();
        assert_eq!(global.mean_rr, 0.5);
    }

    #[test]
    fn test_load_nonexistent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(StoreSnapshot::load(&path).unwrap().is_none());
        assert!(matches!(StoreSnapshot::try_recover(&path), RecoveryStatus::Empty));
    }

    #[test]
    fn test_try_recover_corrupted_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snap.json");
        fs::write(&path, "{ invalid json }").unwrap();

        assert!(matches!(StoreSnapshot::try_recover(&path), RecoveryStatus::Corrupted(_)));
    }

    #[test]
    fn test_try_recover_invalid_pattern() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snap.json");

        let mut bad = stored_pattern("not-a-key");
        bad.version = 1;
        let snapshot = StoreSnapshot {
            saved_at: Utc::now(),
            patterns: vec![bad],
            baselines: Vec::new(),
        };
        snapshot.save(&path).unwrap();

        assert!(matches!(StoreSnapshot::try_recover(&path), RecoveryStatus::Corrupted(_)));
    }

    #[tokio::test]
    async fn test_try_recover_valid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snap.json");
        let (patterns, baselines) = populated_stores().await;
        StoreSnapshot::capture(&patterns, &baselines).await.save(&path).unwrap();

        assert!(matches!(StoreSnapshot::try_recover(&path), RecoveryStatus::Recovered(_)));
    }

    #[test]
    fn test_save_creates_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("snap.json");

        StoreSnapshot::empty().save(&path).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_empty_file_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snap.json");
        fs::write(&path, "  \n").unwrap();

        assert!(StoreSnapshot::load(&path).unwrap().is_none());
    }
}
