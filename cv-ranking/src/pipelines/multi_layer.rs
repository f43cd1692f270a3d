//! Multi-Layer: per-criterion model calls, then a model synthesis call per CV
//!
//! The final rating comes from the model, so repeating the synthesis over
//! identical criterion evaluations may give a different answer.

use async_trait::async_trait;
use futures::future::join_all;

use super::criterion::{evaluate_criteria, CriteriaOutcome};
use super::parse::parse_synthesis;
use super::prompts::synthesis_prompt;
use super::{failed_result, CriteriaBatching, EvaluationInput, Pipeline, PipelineKind};
use crate::candidates::Cv;
use crate::criteria::Rating;
use crate::providers::TokenUsage;
use crate::runner::ProviderCaller;
use crate::store::{CriterionEvaluation, RankingResult, UnitError};

/// Ask the model for an overall rating from one CV's criterion evaluations
pub async fn synthesize(
    job_description: &str,
    cv: &Cv,
    evaluations: &[CriterionEvaluation],
    caller: &ProviderCaller,
) -> (Result<(Rating, String), UnitError>, TokenUsage) {
    let prompt = synthesis_prompt(job_description, cv, evaluations);
    let response = match caller.generate(&prompt).await {
        Ok(response) => response,
        Err(e) => return (Err(UnitError::from(&e)), TokenUsage::default()),
    };

    let outcome = parse_synthesis(&response.content).map_err(|e| {
        tracing::error!("CV {} synthesis on {}: {}", cv.id, caller.model(), e);
        UnitError::from(&e).with_raw(&response.content)
    });
    (outcome, response.usage())
}

pub struct MultiLayerPipeline {
    batching: CriteriaBatching,
}

impl MultiLayerPipeline {
    pub fn new(batching: CriteriaBatching) -> Self {
        Self { batching }
    }

    async fn finish_cv(
        &self,
        input: &EvaluationInput<'_>,
        caller: &ProviderCaller,
        cv: &Cv,
        outcome: CriteriaOutcome,
    ) -> RankingResult {
        if let Some(error) = outcome.failure() {
            return failed_result(self.kind(), caller, cv, error)
                .with_evaluations(outcome.evaluations)
                .with_usage(outcome.usage);
        }

        let (synthesis, synthesis_usage) =
            synthesize(input.job_description, cv, &outcome.evaluations, caller).await;
        let mut usage = outcome.usage;
        usage.add(synthesis_usage);

        let result = match synthesis {
            Ok((rating, reasoning)) => RankingResult::success(
                self.kind(),
                caller.provider_name(),
                caller.model(),
                &cv.id,
                cv.display_name(),
                rating,
                reasoning,
            ),
            Err(error) => failed_result(self.kind(), caller, cv, error),
        };
        result.with_evaluations(outcome.evaluations).with_usage(usage)
    }
}

#[async_trait]
impl Pipeline for MultiLayerPipeline {
    fn kind(&self) -> PipelineKind {
        PipelineKind::MultiLayer
    }

    async fn evaluate(&self, input: &EvaluationInput<'_>, caller: &ProviderCaller) -> Vec<RankingResult> {
        let outcomes = evaluate_criteria(input, caller, self.batching).await;
        let finishes = input
            .cvs
            .iter()
            .zip(outcomes)
            .map(|(cv, outcome)| self.finish_cv(input, caller, cv, outcome));
        join_all(finishes).await
    }
}
