//! In-Memory Pattern Store
//!
//! HashMap-backed pattern table with a family secondary index. One write
//! lock guards each compare-and-swap, so a write based on a stale read is
//! rejected instead of silently overwriting a concurrent update.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

use crate::domain::Pattern;
use crate::ports::{PatternStore, StoreError};

#[derive(Debug, Default)]
struct PatternTable {
    patterns: HashMap<String, Pattern>,
    /// family_id -> pattern keys
    families: HashMap<String, BTreeSet<String>>,
}

impl PatternTable {
    fn index(&mut self, pattern: &Pattern) {
        self.families
            .entry(pattern.family_id.clone())
            .or_default()
            .insert(pattern.pattern_key.clone());
    }

    fn unindex(&mut self, family_id: &str, pattern_key: &str) {
        if let Some(keys) = self.families.get_mut(family_id) {
            keys.remove(pattern_key);
            if keys.is_empty() {
                self.families.remove(family_id);
            }
        }
    }
}

/// Pattern store kept entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryPatternStore {
    table: RwLock<PatternTable>,
}

impl InMemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from previously persisted patterns
    pub fn from_patterns(patterns: Vec<Pattern>) -> Self {
        let mut table = PatternTable::default();
        for pattern in patterns {
            table.index(&pattern);
            table.patterns.insert(pattern.pattern_key.clone(), pattern);
        }
        Self {
            table: RwLock::new(table),
        }
    }

    /// All patterns ordered by key
    pub async fn snapshot(&self) -> Vec<Pattern> {
        let table = self.table.read().await;
        let mut patterns: Vec<Pattern> = table.patterns.values().cloned().collect();
        patterns.sort_by(|a, b| a.pattern_key.cmp(&b.pattern_key));
        patterns
    }
}

#[async_trait]
impl PatternStore for InMemoryPatternStore {
    async fn get(&self, pattern_key: &str) -> Result<Option<Pattern>, StoreError> {
        Ok(self.table.read().await.patterns.get(pattern_key).cloned())
    }

    async fn compare_and_put(&self, mut pattern: Pattern) -> Result<Pattern, StoreError> {
        if pattern.pattern_key.is_empty() {
            return Err(StoreError::InvalidRecord("empty pattern key".to_string()));
        }

        let mut table = self.table.write().await;
        let stored = table.patterns.get(&pattern.pattern_key);
        let found = stored.map_or(0, |p| p.version);
        if found != pattern.version {
            return Err(StoreError::VersionConflict {
                key: pattern.pattern_key.clone(),
                expected: pattern.version,
                found,
            });
        }

        let previous_family = stored
            .filter(|p| p.family_id != pattern.family_id)
            .map(|p| p.family_id.clone());
        if let Some(family_id) = previous_family {
            table.unindex(&family_id, &pattern.pattern_key);
        }

        pattern.version = found + 1;
        table.index(&pattern);
        table.patterns.insert(pattern.pattern_key.clone(), pattern.clone());
        Ok(pattern)
    }

    async fn find_by_family(&self, family_id: &str) -> Result<Vec<Pattern>, StoreError> {
        let table = self.table.read().await;
        let patterns: Vec<Pattern> = table
            .families
            .get(family_id)
            .map(|keys| {
                keys.iter()
                    .filter_map(|key| table.patterns.get(key).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(patterns)
    }

    async fn list_module(&self, module: &str) -> Result<Vec<Pattern>, StoreError> {
        let table = self.table.read().await;
        let mut patterns: Vec<Pattern> = table
            .patterns
            .values()
            .filter(|p| p.module == module)
            .cloned()
            .collect();
        patterns.sort_by(|a, b| a.pattern_key.cmp(&b.pattern_key));
        Ok(patterns)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.table.read().await.patterns.len())
    }
}
