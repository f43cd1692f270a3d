//! Decomposed-Algorithmic: per-criterion model calls, arithmetic synthesis
//!
//! The overall rating is the mean criterion score rounded half away from zero
//! (`f64::round`) and clamped to the scale, so 2.5 becomes 3 and 1.5 becomes 2.
//! It is a pure function of the criterion evaluations and costs no extra call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::criterion::evaluate_criteria;
use super::{failed_result, CriteriaBatching, EvaluationInput, Pipeline, PipelineKind};
use crate::criteria::Rating;
use crate::runner::ProviderCaller;
use crate::store::{CriterionEvaluation, FailureKind, RankingResult, UnitError};

/// Arithmetic synthesis of a CV's criterion scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub mean: f64,
    pub rating: Rating,
    pub reasoning: String,
}

/// Average the criterion scores into an overall rating.
///
/// Returns `None` when there is nothing to average.
pub fn aggregate(evaluations: &[CriterionEvaluation]) -> Option<Aggregate> {
    if evaluations.is_empty() {
        return None;
    }

    let total: u32 = evaluations.iter().map(|e| e.score as u32).sum();
    let mean = total as f64 / evaluations.len() as f64;
    let rounded = (mean.round() as i64).clamp(1, 4);
    let rating = Rating::from_score(rounded).ok()?;

    let mut reasoning = format!("Average of criterion scores = {:.2} -> {}", mean, rating.score());
    for e in evaluations {
        reasoning.push_str(&format!("\n{}: {} (score: {})", e.criterion, e.rating.label(), e.score));
    }

    Some(Aggregate {
        mean,
        rating,
        reasoning,
    })
}

pub struct DecomposedAlgorithmicPipeline {
    batching: CriteriaBatching,
}

impl DecomposedAlgorithmicPipeline {
    pub fn new(batching: CriteriaBatching) -> Self {
        Self { batching }
    }
}

#[async_trait]
impl Pipeline for DecomposedAlgorithmicPipeline {
    fn kind(&self) -> PipelineKind {
        PipelineKind::DecomposedAlgorithmic
    }

    async fn evaluate(&self, input: &EvaluationInput<'_>, caller: &ProviderCaller) -> Vec<RankingResult> {
        let outcomes = evaluate_criteria(input, caller, self.batching).await;

        input
            .cvs
            .iter()
            .zip(outcomes)
            .map(|(cv, outcome)| {
                // Any failed criterion fails the CV; successful evaluations stay attached
                let result = match (outcome.failure(), aggregate(&outcome.evaluations)) {
                    (Some(error), _) => failed_result(self.kind(), caller, cv, error),
                    (None, Some(agg)) => RankingResult::success(
                        self.kind(),
                        caller.provider_name(),
                        caller.model(),
                        &cv.id,
                        cv.display_name(),
                        agg.rating,
                        agg.reasoning,
                    ),
                    (None, None) => failed_result(
                        self.kind(),
                        caller,
                        cv,
                        UnitError::new(FailureKind::Other, "no criteria to aggregate"),
                    ),
                };
                result
                    .with_evaluations(outcome.evaluations)
                    .with_usage(outcome.usage)
            })
            .collect()
    }
}
