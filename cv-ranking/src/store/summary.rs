//! Run metadata, call accounting and the run summary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::record::RankingResult;
use crate::pipelines::{CriteriaBatching, PipelineKind};
use crate::providers::TokenUsage;

/// A (pipeline, model) combination executed in a run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Combination {
    pub pipeline: PipelineKind,
    pub provider: String,
    pub model: String,
}

/// Generation settings snapshot written with the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub parallel_requests: usize,
    pub retry_count: u32,
    pub criteria_batching: CriteriaBatching,
}

/// Created at run start, never mutated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub experiment_name: String,
    pub started_at: DateTime<Utc>,
    pub combinations: Vec<Combination>,
    pub cv_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<RunSettings>,
}

impl RunMetadata {
    pub fn new(
        experiment_name: impl Into<String>,
        combinations: Vec<Combination>,
        cv_ids: Vec<String>,
    ) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            started_at: Utc::now(),
            combinations,
            cv_ids,
            settings: None,
        }
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Reconstruct metadata from persisted records, where no run header was kept
    pub fn from_results(experiment_name: impl Into<String>, results: &[RankingResult]) -> Self {
        let mut combinations: Vec<Combination> = results
            .iter()
            .map(|r| Combination {
                pipeline: r.pipeline,
                provider: r.provider.clone(),
                model: r.model.clone(),
            })
            .collect();
        combinations.sort();
        combinations.dedup();

        let mut cv_ids: Vec<String> = results.iter().map(|r| r.cv_id.clone()).collect();
        cv_ids.sort();
        cv_ids.dedup();

        Self {
            experiment_name: experiment_name.into(),
            started_at: results.iter().map(|r| r.timestamp).min().unwrap_or_else(Utc::now),
            combinations,
            cv_ids,
            settings: None,
        }
    }

    /// Number of (pipeline, model, CV) results a complete run records
    pub fn expected_results(&self) -> usize {
        self.combinations.len() * self.cv_ids.len()
    }

    pub fn pipelines(&self) -> Vec<PipelineKind> {
        let mut pipelines: Vec<_> = self.combinations.iter().map(|c| c.pipeline).collect();
        pipelines.sort();
        pipelines.dedup();
        pipelines
    }

    pub fn models(&self) -> Vec<String> {
        let mut models: Vec<_> = self.combinations.iter().map(|c| c.model.clone()).collect();
        models.sort();
        models.dedup();
        models
    }
}

/// Provider call counters shared by every caller in a run
#[derive(Debug, Default)]
pub struct CallStats {
    calls: AtomicU64,
    failed_calls: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl CallStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, usage: TokenUsage) {
        self.calls.fetch_add(usage.calls as u64, Ordering::Relaxed);
        self.input_tokens.fetch_add(usage.input_tokens, Ordering::Relaxed);
        self.output_tokens.fetch_add(usage.output_tokens, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.failed_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn failed_calls(&self) -> u64 {
        self.failed_calls.load(Ordering::Relaxed)
    }

    pub fn input_tokens(&self) -> u64 {
        self.input_tokens.load(Ordering::Relaxed)
    }

    pub fn output_tokens(&self) -> u64 {
        self.output_tokens.load(Ordering::Relaxed)
    }
}

/// Completed vs failed results for one pipeline or model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionCounts {
    pub completed: usize,
    pub failed: usize,
}

/// Counts for a finished (or partially finished) run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub metadata: RunMetadata,
    pub total_units: usize,
    pub successful_units: usize,
    pub failed_units: usize,
    pub skipped_units: usize,
    pub total_calls: u64,
    pub failed_calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub by_pipeline: BTreeMap<String, CompletionCounts>,
    pub by_model: BTreeMap<String, CompletionCounts>,
}

impl RunSummary {
    pub(crate) fn build(metadata: &RunMetadata, results: &[RankingResult], stats: &CallStats) -> Self {
        let mut by_pipeline: BTreeMap<String, CompletionCounts> = BTreeMap::new();
        let mut by_model: BTreeMap<String, CompletionCounts> = BTreeMap::new();
        let mut successful_units = 0;
        let mut failed_units = 0;

        for result in results {
            let pipeline = by_pipeline.entry(result.pipeline.to_string()).or_default();
            let model = by_model.entry(result.model.clone()).or_default();
            if result.is_success() {
                successful_units += 1;
                pipeline.completed += 1;
                model.completed += 1;
            } else {
                failed_units += 1;
                pipeline.failed += 1;
                model.failed += 1;
            }
        }

        let total_units = metadata.expected_results().max(results.len());

        Self {
            metadata: metadata.clone(),
            total_units,
            successful_units,
            failed_units,
            skipped_units: total_units - results.len(),
            total_calls: stats.calls(),
            failed_calls: stats.failed_calls(),
            input_tokens: stats.input_tokens(),
            output_tokens: stats.output_tokens(),
            by_pipeline,
            by_model,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_units == 0 {
            0.0
        } else {
            self.successful_units as f64 / self.total_units as f64
        }
    }
}
