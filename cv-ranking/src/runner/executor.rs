//! Fan-out of evaluation units over pipelines, models and CVs

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::caller::{CallPolicy, ProviderCaller, RunControl};
use crate::candidates::{find_duplicate_id, Cv};
use crate::config::RunConfig;
use crate::criteria::CriteriaSet;
use crate::pipelines::{CriteriaBatching, EvaluationInput, PipelineKind, PipelineOptions};
use crate::providers::{GenerationOptions, ModelEndpoint};
use crate::store::{Combination, ResultStore, RunMetadata, RunSettings, StoreError};

/// Configuration for the executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum provider calls in flight across the whole run
    pub parallel_requests: usize,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub timeout_ms: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    pub criteria_batching: CriteriaBatching,
    /// Stop issuing calls after this long
    pub deadline: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from_run_config(&RunConfig::default())
    }
}

impl ExecutorConfig {
    pub fn from_run_config(run: &RunConfig) -> Self {
        Self {
            parallel_requests: run.parallel_requests,
            retry_count: run.retry_count,
            retry_delay_ms: run.retry_delay_ms,
            max_retry_delay_ms: run.max_retry_delay_ms,
            timeout_ms: run.timeout_ms,
            temperature: run.temperature,
            max_tokens: run.max_tokens,
            criteria_batching: run.criteria_batching,
            deadline: run.deadline_secs.map(Duration::from_secs),
        }
    }

    pub fn policy(&self) -> CallPolicy {
        CallPolicy {
            retry_count: self.retry_count,
            retry_delay_ms: self.retry_delay_ms,
            max_retry_delay_ms: self.max_retry_delay_ms,
            timeout_ms: self.timeout_ms,
        }
    }

    pub fn settings(&self) -> RunSettings {
        RunSettings {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            parallel_requests: self.parallel_requests,
            retry_count: self.retry_count,
            criteria_batching: self.criteria_batching,
        }
    }
}

/// Run-level failures. Unit failures never surface here; they are recorded.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("no CVs to evaluate")]
    NoCandidates,

    #[error("no criteria to evaluate against")]
    NoCriteria,

    #[error("no (pipeline, model) combination selected")]
    NoCombinations,

    #[error("duplicate CV id: {0}")]
    DuplicateCvId(String),

    #[error("run aborted: {0}")]
    FatalProvider(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything a run evaluates, loaded once and shared read-only
#[derive(Debug, Clone)]
pub struct RunInput {
    pub job_description: String,
    pub criteria: CriteriaSet,
    pub cvs: Vec<Cv>,
}

impl RunInput {
    pub fn new(job_description: impl Into<String>, criteria: CriteriaSet, cvs: Vec<Cv>) -> Self {
        Self {
            job_description: job_description.into(),
            criteria,
            cvs,
        }
    }

    pub fn evaluation(&self) -> EvaluationInput<'_> {
        EvaluationInput::new(&self.job_description, &self.criteria, &self.cvs)
    }
}

/// One independently scheduled piece of work
#[derive(Debug, Clone)]
struct Unit {
    pipeline: PipelineKind,
    endpoint: usize,
    /// Single CV index, or `None` for the whole set
    cv: Option<usize>,
}

/// Executor for running every selected (pipeline, model) combination
pub struct Executor {
    config: ExecutorConfig,
    endpoints: Vec<ModelEndpoint>,
    pipelines: Vec<PipelineKind>,
    progress: Arc<dyn ProgressCallback>,
    cancel: Arc<AtomicBool>,
}

impl Executor {
    pub fn new(endpoints: Vec<ModelEndpoint>, pipelines: Vec<PipelineKind>, config: ExecutorConfig) -> Self {
        Self {
            config,
            endpoints,
            pipelines,
            progress: Arc::new(NoOpProgress),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Setting the returned flag stops the run: no new calls are issued and
    /// units still waiting are not recorded
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn combinations(&self) -> Vec<Combination> {
        self.pipelines
            .iter()
            .flat_map(|&pipeline| {
                self.endpoints.iter().map(move |e| Combination {
                    pipeline,
                    provider: e.provider.name().to_string(),
                    model: e.model.clone(),
                })
            })
            .collect()
    }

    /// Metadata for a run of this executor over `cvs`
    pub fn metadata(&self, experiment_name: impl Into<String>, cvs: &[Cv]) -> RunMetadata {
        RunMetadata::new(
            experiment_name,
            self.combinations(),
            cvs.iter().map(|cv| cv.id.clone()).collect(),
        )
        .with_settings(self.config.settings())
    }

    fn validate(&self, input: &RunInput) -> Result<(), RunError> {
        if input.cvs.is_empty() {
            return Err(RunError::NoCandidates);
        }
        if input.criteria.is_empty() {
            return Err(RunError::NoCriteria);
        }
        if self.endpoints.is_empty() || self.pipelines.is_empty() {
            return Err(RunError::NoCombinations);
        }
        if let Some(id) = find_duplicate_id(&input.cvs) {
            return Err(RunError::DuplicateCvId(id.to_string()));
        }
        Ok(())
    }

    fn plan(&self, cv_count: usize) -> Vec<Unit> {
        let mut units = Vec::new();
        for &pipeline in &self.pipelines {
            let whole_set = pipeline.is_whole_set()
                || self.config.criteria_batching == CriteriaBatching::PerCriterion;
            for endpoint in 0..self.endpoints.len() {
                if whole_set {
                    units.push(Unit { pipeline, endpoint, cv: None });
                } else {
                    units.extend((0..cv_count).map(|cv| Unit {
                        pipeline,
                        endpoint,
                        cv: Some(cv),
                    }));
                }
            }
        }
        units
    }

    /// Evaluate every unit and record results into `store`.
    ///
    /// Preconditions are checked before any call. Unit failures are recorded
    /// as failed results. Units stopped by cancellation or the deadline are
    /// not recorded. A fatal provider error stops the run and is returned
    /// after in-flight units finish; everything recorded so far stays in the
    /// store.
    pub async fn run(&self, input: Arc<RunInput>, store: Arc<ResultStore>) -> Result<(), RunError> {
        self.validate(&input)?;

        let control = Arc::new(RunControl::new(Arc::clone(&self.cancel), self.config.deadline));
        let semaphore = Arc::new(Semaphore::new(self.config.parallel_requests.max(1)));
        let options = PipelineOptions {
            criteria_batching: self.config.criteria_batching,
        };
        let units = self.plan(input.cvs.len());
        let total = units.len();

        tracing::info!(
            "Running {} units ({} pipelines x {} models, {} CVs)",
            total,
            self.pipelines.len(),
            self.endpoints.len(),
            input.cvs.len()
        );
        self.progress.on_progress(0, total);

        let mut handles = Vec::with_capacity(total);
        for unit in units {
            let endpoint = self.endpoints[unit.endpoint].clone();
            let caller = ProviderCaller::new(
                endpoint.provider,
                GenerationOptions::new(&endpoint.model)
                    .with_temperature(self.config.temperature)
                    .with_max_tokens(self.config.max_tokens),
                self.config.policy(),
                Arc::clone(&semaphore),
                Arc::clone(&control),
                store.stats(),
            );
            let input = Arc::clone(&input);
            let store = Arc::clone(&store);
            let progress = Arc::clone(&self.progress);

            handles.push(tokio::spawn(async move {
                run_unit(unit, &input, &caller, options, &store, progress.as_ref()).await
            }));
        }

        let mut completed = 0;
        let mut store_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!("{}", e);
                    store_error.get_or_insert(e);
                }
                Err(e) => tracing::error!("Unit task panicked: {}", e),
            }
            completed += 1;
            self.progress.on_progress(completed, total);
        }

        if let Some(message) = control.fatal_error() {
            return Err(RunError::FatalProvider(message.to_string()));
        }
        if let Some(e) = store_error {
            return Err(e.into());
        }
        if let Some(reason) = control.stop_reason() {
            let summary = store.export_summary();
            tracing::warn!("{}; {} results not recorded", reason, summary.skipped_units);
        }
        Ok(())
    }
}

async fn run_unit(
    unit: Unit,
    input: &RunInput,
    caller: &ProviderCaller,
    options: PipelineOptions,
    store: &ResultStore,
    progress: &dyn ProgressCallback,
) -> Result<(), StoreError> {
    let label = match unit.cv {
        Some(cv) => format!("{} {} {}", unit.pipeline, caller.model(), input.cvs[cv].id),
        None => format!("{} {} (all CVs)", unit.pipeline, caller.model()),
    };

    if let Some(reason) = caller.control().stop_reason() {
        tracing::info!("Skipping {}: {}", label, reason);
        return Ok(());
    }

    tracing::info!("Starting {} on {}", label, caller.provider_name());
    progress.on_unit_start(&label);

    let full = input.evaluation();
    let evaluation = match unit.cv {
        Some(cv) => full.for_cv(&input.cvs[cv]),
        None => full,
    };
    let results = unit.pipeline.build(&options).evaluate(&evaluation, caller).await;

    let mut success = true;
    for result in results {
        if result.is_cancelled() {
            tracing::info!("{} for CV {} not recorded: run stopped", label, result.cv_id);
            success = false;
            continue;
        }
        if let Some(error) = &result.error {
            tracing::error!("{} failed for CV {}: {}", label, result.cv_id, error);
            success = false;
        }
        store.record(result, false)?;
    }

    tracing::info!("Finished {} ({})", label, if success { "ok" } else { "with failures" });
    progress.on_unit_complete(&label, success);
    Ok(())
}

/// Progress callback for tracking execution
pub trait ProgressCallback: Send + Sync {
    fn on_unit_start(&self, unit: &str);
    fn on_unit_complete(&self, unit: &str, success: bool);
    fn on_progress(&self, completed: usize, total: usize);
}

/// Default no-op progress callback
pub struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_unit_start(&self, _unit: &str) {}
    fn on_unit_complete(&self, _unit: &str, _success: bool) {}
    fn on_progress(&self, _completed: usize, _total: usize) {}
}

/// Console progress callback
pub struct ConsoleProgress;

impl ProgressCallback for ConsoleProgress {
    fn on_unit_start(&self, unit: &str) {
        println!("  Starting {}...", unit);
    }

    fn on_unit_complete(&self, unit: &str, success: bool) {
        let status = if success { "OK" } else { "FAILED" };
        println!("  {} {}", status, unit);
    }

    fn on_progress(&self, completed: usize, total: usize) {
        if completed > 0 {
            println!("Progress: {}/{} units complete", completed, total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::default_criteria;
    use crate::providers::{LLMProvider, ScriptedProvider};

    fn executor(pipelines: Vec<PipelineKind>, batching: CriteriaBatching) -> Executor {
        let provider: Arc<dyn LLMProvider> = Arc::new(ScriptedProvider::new("scripted"));
        Executor::new(
            vec![ModelEndpoint::new(Arc::clone(&provider), "m1"), ModelEndpoint::new(provider, "m2")],
            pipelines,
            ExecutorConfig {
                criteria_batching: batching,
                ..ExecutorConfig::default()
            },
        )
    }

    #[test]
    fn test_plan_shapes() {
        let exec = executor(
            vec![PipelineKind::OneShot, PipelineKind::DecomposedAlgorithmic],
            CriteriaBatching::PerCv,
        );
        let units = exec.plan(3);
        // one_shot: 1 unit per model; decomposed: 1 unit per model per CV
        assert_eq!(units.len(), 2 + 2 * 3);
        assert!(units.iter().filter(|u| u.cv.is_none()).all(|u| u.pipeline.is_whole_set()));

        let batched = executor(vec![PipelineKind::MultiLayer], CriteriaBatching::PerCriterion);
        assert_eq!(batched.plan(3).len(), 2);
    }

    #[tokio::test]
    async fn test_preconditions_checked_before_calls() {
        let exec = executor(vec![PipelineKind::OneShot], CriteriaBatching::PerCv);
        let store = Arc::new(ResultStore::new(exec.metadata("t", &[])));

        let empty = Arc::new(RunInput::new("job", default_criteria(), vec![]));
        assert!(matches!(exec.run(empty, Arc::clone(&store)).await, Err(RunError::NoCandidates)));

        let dup = Arc::new(RunInput::new(
            "job",
            default_criteria(),
            vec![Cv::new("a", "x"), Cv::new("a", "y")],
        ));
        assert!(matches!(
            exec.run(dup, Arc::clone(&store)).await,
            Err(RunError::DuplicateCvId(id)) if id == "a"
        ));

        let none = executor(vec![], CriteriaBatching::PerCv);
        let input = Arc::new(RunInput::new("job", default_criteria(), vec![Cv::new("a", "x")]));
        assert!(matches!(none.run(input, store).await, Err(RunError::NoCombinations)));
    }
}
