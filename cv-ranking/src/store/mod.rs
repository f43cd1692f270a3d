//! Append-only store of ranking results for one run

pub mod record;
pub mod summary;

pub use record::{CriterionEvaluation, FailureKind, RankingResult, ResultKey, UnitError};
pub use summary::{CallStats, Combination, CompletionCounts, RunMetadata, RunSettings, RunSummary};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::analysis::ComparisonTable;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("result already recorded for {0}")]
    DuplicateKey(ResultKey),
}

/// Results keyed by (pipeline, model, CV id).
///
/// `record` is safe under concurrent writers; tables and summaries are always
/// rebuilt from the current result set.
pub struct ResultStore {
    metadata: RunMetadata,
    results: Mutex<BTreeMap<ResultKey, RankingResult>>,
    stats: Arc<CallStats>,
}

impl ResultStore {
    pub fn new(metadata: RunMetadata) -> Self {
        Self {
            metadata,
            results: Mutex::new(BTreeMap::new()),
            stats: Arc::new(CallStats::new()),
        }
    }

    /// Rebuild a store from persisted records. Call counts are taken from the
    /// per-result usage since the live counters are gone.
    pub fn from_results(metadata: RunMetadata, results: Vec<RankingResult>) -> Result<Self, StoreError> {
        let store = Self::new(metadata);
        for result in results {
            store.stats.record_success(result.usage);
            store.record(result, false)?;
        }
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ResultKey, RankingResult>> {
        // A panicking writer cannot leave a half-inserted entry behind
        self.results.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a result. A second result for the same key is rejected unless
    /// `overwrite` is set, in which case it replaces the first entirely.
    pub fn record(&self, result: RankingResult, overwrite: bool) -> Result<(), StoreError> {
        let key = result.key();
        let mut results = self.lock();
        if !overwrite && results.contains_key(&key) {
            return Err(StoreError::DuplicateKey(key));
        }
        results.insert(key, result);
        Ok(())
    }

    pub fn get(&self, key: &ResultKey) -> Option<RankingResult> {
        self.lock().get(key).cloned()
    }

    /// All results in key order
    pub fn results(&self) -> Vec<RankingResult> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    /// Counters the run's callers report into
    pub fn stats(&self) -> Arc<CallStats> {
        Arc::clone(&self.stats)
    }

    pub fn export_table(&self) -> ComparisonTable {
        ComparisonTable::from_results(&self.results())
    }

    pub fn export_summary(&self) -> RunSummary {
        RunSummary::build(&self.metadata, &self.results(), &self.stats)
    }
}
