//! One-Shot: one call rates the whole CV set

use async_trait::async_trait;

use super::parse::{parse_rankings, ParseError, ParsedRanking};
use super::prompts::one_shot_prompt;
use super::{failed_result, EvaluationInput, Pipeline, PipelineKind};
use crate::candidates::Cv;
use crate::providers::TokenUsage;
use crate::runner::ProviderCaller;
use crate::store::{RankingResult, UnitError};

pub struct OneShotPipeline;

#[async_trait]
impl Pipeline for OneShotPipeline {
    fn kind(&self) -> PipelineKind {
        PipelineKind::OneShot
    }

    async fn evaluate(&self, input: &EvaluationInput<'_>, caller: &ProviderCaller) -> Vec<RankingResult> {
        let prompt = one_shot_prompt(input.job_description, input.criteria, input.cvs);
        rank_whole_set(self.kind(), input, caller, &prompt, parse_rankings).await
    }
}

/// Charge a call shared by several results to the first of them, so
/// per-result usage still sums to the run total
pub(crate) fn attribute_shared_usage(results: &mut [RankingResult], usage: TokenUsage) {
    if let Some(first) = results.first_mut() {
        first.usage.add(usage);
    }
}

/// Issue one whole-set prompt and turn the response into one result per CV.
///
/// A provider failure or an unparseable response fails every CV of the set.
/// Parse failures are not retried.
pub(crate) async fn rank_whole_set(
    kind: PipelineKind,
    input: &EvaluationInput<'_>,
    caller: &ProviderCaller,
    prompt: &str,
    parse: fn(&str, &[Cv]) -> Result<Vec<ParsedRanking>, ParseError>,
) -> Vec<RankingResult> {
    let response = match caller.generate(prompt).await {
        Ok(response) => response,
        Err(e) => {
            let error = UnitError::from(&e);
            return input
                .cvs
                .iter()
                .map(|cv| failed_result(kind, caller, cv, error.clone()))
                .collect();
        }
    };

    let mut results: Vec<RankingResult> = match parse(&response.content, input.cvs) {
        Ok(parsed) => input
            .cvs
            .iter()
            .zip(parsed)
            .map(|(cv, ranking)| {
                RankingResult::success(
                    kind,
                    caller.provider_name(),
                    caller.model(),
                    &cv.id,
                    cv.display_name(),
                    ranking.rating,
                    ranking.reasoning,
                )
            })
            .collect(),
        Err(e) => {
            tracing::error!(
                "{} on {}: unparseable ranking response ({} chars): {}",
                kind,
                caller.model(),
                response.content.len(),
                e
            );
            let error = UnitError::from(&e).with_raw(&response.content);
            input
                .cvs
                .iter()
                .map(|cv| failed_result(kind, caller, cv, error.clone()))
                .collect()
        }
    };

    attribute_shared_usage(&mut results, response.usage());
    results
}
