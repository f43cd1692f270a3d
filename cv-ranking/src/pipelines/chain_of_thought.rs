//! Chain-of-Thought: one call with step-by-step scaffolding, only the final
//! ranking block is read

use async_trait::async_trait;

use super::one_shot::rank_whole_set;
use super::parse::parse_final_rankings;
use super::prompts::chain_of_thought_prompt;
use super::{EvaluationInput, Pipeline, PipelineKind};
use crate::runner::ProviderCaller;
use crate::store::RankingResult;

pub struct ChainOfThoughtPipeline;

#[async_trait]
impl Pipeline for ChainOfThoughtPipeline {
    fn kind(&self) -> PipelineKind {
        PipelineKind::ChainOfThought
    }

    async fn evaluate(&self, input: &EvaluationInput<'_>, caller: &ProviderCaller) -> Vec<RankingResult> {
        let prompt = chain_of_thought_prompt(input.job_description, input.criteria, input.cvs);
        rank_whole_set(self.kind(), input, caller, &prompt, parse_final_rankings).await
    }
}
