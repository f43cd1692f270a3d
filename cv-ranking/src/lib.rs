//! CV ranking under competing LLM evaluation pipelines
//!
//! This crate evaluates a set of CVs against a job description and a
//! criteria rubric using several evaluation pipelines and several LLMs, stores
//! every (pipeline, model, CV) rating, and measures how much the ratings
//! disagree.
//!
//! # Features
//!
//! - Four pipelines: one-shot, chain-of-thought, multi-layer (per-criterion
//!   calls plus LLM synthesis) and decomposed-algorithmic (per-criterion calls
//!   plus a deterministic average)
//! - OpenAI, Anthropic and Gemini clients with retry, backoff and client-side
//!   rate limiting
//! - Bounded concurrency with a run deadline and cancellation
//! - Comparison table, variance-based disagreement analysis, JSON/CSV/text outputs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cv_ranking::{
//!     candidates::load_cvs_from_file,
//!     config::Config,
//!     criteria::default_criteria,
//!     pipelines::PipelineKind,
//!     providers::{configured_targets, create_endpoints},
//!     runner::{Executor, ExecutorConfig, RunInput},
//!     store::ResultStore,
//!     analysis::DisagreementAnalyzer,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_or_default();
//!     let endpoints = create_endpoints(&configured_targets(&config), &config)?;
//!     let executor = Executor::new(
//!         endpoints,
//!         PipelineKind::all(),
//!         ExecutorConfig::from_run_config(&config.run),
//!     );
//!
//!     let cvs = load_cvs_from_file("data/cvs.json")?;
//!     let store = Arc::new(ResultStore::new(executor.metadata("pilot", &cvs)));
//!     let input = Arc::new(RunInput::new("Senior Rust engineer", default_criteria(), cvs));
//!     executor.run(input, Arc::clone(&store)).await?;
//!
//!     let report = DisagreementAnalyzer::new().analyze(&store.export_table());
//!     for metric in report.metrics.iter().take(5) {
//!         println!("{}: {:?}", metric.cv_id, metric.stats.variance);
//!     }
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod candidates;
pub mod config;
pub mod criteria;
pub mod pipelines;
pub mod providers;
pub mod reporting;
pub mod runner;
pub mod store;

pub use config::Config;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::analysis::{ComparisonTable, DisagreementAnalyzer, DisagreementReport};
    pub use crate::candidates::{load_cvs_from_file, load_job_description, Cv};
    pub use crate::config::Config;
    pub use crate::criteria::{default_criteria, score_of, CriteriaSet, Criterion, Rating};
    pub use crate::pipelines::{CriteriaBatching, EvaluationInput, Pipeline, PipelineKind};
    pub use crate::providers::{
        create_endpoints, create_provider, CompletionRequest, CompletionResponse, LLMProvider,
        Message, ModelEndpoint, ModelTarget, ProviderError, ProviderResult,
    };
    pub use crate::reporting::{print_console_report, write_run_outputs};
    pub use crate::runner::{Executor, ExecutorConfig, RunError, RunInput};
    pub use crate::store::{RankingResult, ResultKey, ResultStore, RunMetadata, RunSummary};
}
