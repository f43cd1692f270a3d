//! Evaluation strategies
//!
//! Every pipeline turns (job description, criteria, CVs) into one
//! [`RankingResult`] per CV. They differ only in call topology:
//!
//! | Pipeline                 | Provider calls                          | Final rating by |
//! |--------------------------|-----------------------------------------|-----------------|
//! | `one_shot`               | 1 for the whole CV set                  | model           |
//! | `chain_of_thought`       | 1 for the whole CV set                  | model           |
//! | `multi_layer`            | 1 per criterion per CV, +1 synthesis    | model           |
//! | `decomposed_algorithmic` | 1 per criterion per CV                  | arithmetic      |

pub mod chain_of_thought;
pub mod criterion;
pub mod decomposed;
pub mod multi_layer;
pub mod one_shot;
pub mod parse;
pub mod prompts;

pub use chain_of_thought::ChainOfThoughtPipeline;
pub use decomposed::{aggregate, Aggregate, DecomposedAlgorithmicPipeline};
pub use multi_layer::MultiLayerPipeline;
pub use one_shot::OneShotPipeline;
pub use parse::ParseError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::candidates::Cv;
use crate::criteria::CriteriaSet;
use crate::runner::ProviderCaller;
use crate::store::{RankingResult, UnitError};

/// Pipeline identifiers, in report column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    OneShot,
    ChainOfThought,
    MultiLayer,
    DecomposedAlgorithmic,
}

impl PipelineKind {
    pub fn all() -> Vec<PipelineKind> {
        vec![
            PipelineKind::OneShot,
            PipelineKind::ChainOfThought,
            PipelineKind::MultiLayer,
            PipelineKind::DecomposedAlgorithmic,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::OneShot => "one_shot",
            PipelineKind::ChainOfThought => "chain_of_thought",
            PipelineKind::MultiLayer => "multi_layer",
            PipelineKind::DecomposedAlgorithmic => "decomposed_algorithmic",
        }
    }

    /// Rates the whole CV set in a single response
    pub fn is_whole_set(&self) -> bool {
        matches!(self, PipelineKind::OneShot | PipelineKind::ChainOfThought)
    }

    pub fn build(&self, options: &PipelineOptions) -> Box<dyn Pipeline> {
        match self {
            PipelineKind::OneShot => Box::new(OneShotPipeline),
            PipelineKind::ChainOfThought => Box::new(ChainOfThoughtPipeline),
            PipelineKind::MultiLayer => Box::new(MultiLayerPipeline::new(options.criteria_batching)),
            PipelineKind::DecomposedAlgorithmic => {
                Box::new(DecomposedAlgorithmicPipeline::new(options.criteria_batching))
            }
        }
    }
}

impl std::fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PipelineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "one_shot" | "oneshot" => Ok(PipelineKind::OneShot),
            "chain_of_thought" | "cot" => Ok(PipelineKind::ChainOfThought),
            "multi_layer" | "multilayer" => Ok(PipelineKind::MultiLayer),
            "decomposed_algorithmic" | "decomposed" => Ok(PipelineKind::DecomposedAlgorithmic),
            other => Err(format!(
                "unknown pipeline '{}' (expected one of: one_shot, chain_of_thought, multi_layer, decomposed_algorithmic)",
                other
            )),
        }
    }
}

/// How criterion calls are grouped in the decomposed pipelines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriteriaBatching {
    /// One call per (CV, criterion)
    #[default]
    PerCv,
    /// One call per criterion covering every CV
    PerCriterion,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub criteria_batching: CriteriaBatching,
}

/// Read-only inputs shared by every pipeline in a run
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub job_description: &'a str,
    pub criteria: &'a CriteriaSet,
    pub cvs: &'a [Cv],
}

impl<'a> EvaluationInput<'a> {
    pub fn new(job_description: &'a str, criteria: &'a CriteriaSet, cvs: &'a [Cv]) -> Self {
        Self {
            job_description,
            criteria,
            cvs,
        }
    }

    /// The same inputs narrowed to one CV
    pub fn for_cv(&self, cv: &'a Cv) -> Self {
        Self {
            cvs: std::slice::from_ref(cv),
            ..*self
        }
    }
}

/// An evaluation strategy.
///
/// Implementations hold no state across calls. `evaluate` returns exactly one
/// result per input CV, in input order; failures are carried on the result
/// rather than returned as errors so one CV never blocks its siblings.
#[async_trait]
pub trait Pipeline: Send + Sync {
    fn kind(&self) -> PipelineKind;

    async fn evaluate(&self, input: &EvaluationInput<'_>, caller: &ProviderCaller) -> Vec<RankingResult>;
}

/// Failed result for one CV under the caller's combination
pub(crate) fn failed_result(
    kind: PipelineKind,
    caller: &ProviderCaller,
    cv: &Cv,
    error: UnitError,
) -> RankingResult {
    RankingResult::failure(
        kind,
        caller.provider_name(),
        caller.model(),
        &cv.id,
        cv.display_name(),
        error,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_names_round_trip_through_display() {
        for kind in PipelineKind::all() {
            assert_eq!(kind.to_string().parse::<PipelineKind>(), Ok(kind));
        }
        assert_eq!("Chain-Of-Thought".parse::<PipelineKind>(), Ok(PipelineKind::ChainOfThought));
        assert!("two_shot".parse::<PipelineKind>().is_err());
    }

    #[test]
    fn test_build_matches_kind() {
        let options = PipelineOptions::default();
        for kind in PipelineKind::all() {
            assert_eq!(kind.build(&options).kind(), kind);
        }
    }

    #[test]
    fn test_for_cv_narrows_inputs() {
        let criteria = crate::criteria::default_criteria();
        let cvs = vec![Cv::new("a", "A"), Cv::new("b", "B")];
        let input = EvaluationInput::new("job", &criteria, &cvs);
        let narrowed = input.for_cv(&cvs[1]);
        assert_eq!(narrowed.cvs.len(), 1);
        assert_eq!(narrowed.cvs[0].id, "b");
        assert_eq!(narrowed.job_description, "job");
    }
}
