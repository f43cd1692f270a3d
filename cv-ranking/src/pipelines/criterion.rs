//! Per-criterion evaluation shared by Multi-Layer and Decomposed-Algorithmic

use futures::future::join_all;

use super::parse::{parse_batched_evaluations, parse_criterion_evaluation};
use super::prompts::{batched_criterion_prompt, criterion_prompt};
use super::{CriteriaBatching, EvaluationInput};
use crate::candidates::Cv;
use crate::criteria::Criterion;
use crate::providers::TokenUsage;
use crate::runner::ProviderCaller;
use crate::store::{CriterionEvaluation, UnitError};

/// Criterion evaluations gathered for one CV
#[derive(Debug, Clone, Default)]
pub struct CriteriaOutcome {
    /// Successful evaluations, in criteria order
    pub evaluations: Vec<CriterionEvaluation>,
    /// (criterion name, error) for every criterion that failed
    pub failures: Vec<(String, UnitError)>,
    pub usage: TokenUsage,
}

impl CriteriaOutcome {
    fn push(&mut self, criterion: &Criterion, outcome: Result<CriterionEvaluation, UnitError>) {
        match outcome {
            Ok(evaluation) => self.evaluations.push(evaluation),
            Err(error) => self.failures.push((criterion.name.clone(), error)),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// One error describing every failed criterion; kind and raw text come from the first
    pub fn failure(&self) -> Option<UnitError> {
        let (_, first) = self.failures.first()?;
        let total = self.evaluations.len() + self.failures.len();
        let details = self
            .failures
            .iter()
            .map(|(name, e)| format!("{}: {}", name, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        Some(UnitError {
            kind: first.kind,
            message: format!("{} of {} criteria failed ({})", self.failures.len(), total, details),
            raw: first.raw.clone(),
        })
    }
}

async fn evaluate_single(
    job_description: &str,
    criterion: &Criterion,
    cv: &Cv,
    caller: &ProviderCaller,
) -> (Result<CriterionEvaluation, UnitError>, TokenUsage) {
    let prompt = criterion_prompt(job_description, criterion, cv);
    let response = match caller.generate(&prompt).await {
        Ok(response) => response,
        Err(e) => return (Err(UnitError::from(&e)), TokenUsage::default()),
    };

    let outcome = parse_criterion_evaluation(&response.content, cv, criterion).map_err(|e| {
        tracing::warn!("CV {} criterion '{}': {}", cv.id, criterion.name, e);
        UnitError::from(&e).with_raw(&response.content)
    });
    (outcome, response.usage())
}

async fn evaluate_batch(
    job_description: &str,
    criterion: &Criterion,
    cvs: &[Cv],
    caller: &ProviderCaller,
) -> (Result<Vec<CriterionEvaluation>, UnitError>, TokenUsage) {
    let prompt = batched_criterion_prompt(job_description, criterion, cvs);
    let response = match caller.generate(&prompt).await {
        Ok(response) => response,
        Err(e) => return (Err(UnitError::from(&e)), TokenUsage::default()),
    };

    let outcome = parse_batched_evaluations(&response.content, cvs, criterion).map_err(|e| {
        tracing::warn!("Criterion '{}' batch of {} CVs: {}", criterion.name, cvs.len(), e);
        UnitError::from(&e).with_raw(&response.content)
    });
    (outcome, response.usage())
}

/// Evaluate every CV of the input against every criterion.
///
/// Returns one outcome per CV in input order. All criterion calls for the
/// input are issued together; the caller's semaphore bounds how many are in
/// flight.
pub async fn evaluate_criteria(
    input: &EvaluationInput<'_>,
    caller: &ProviderCaller,
    batching: CriteriaBatching,
) -> Vec<CriteriaOutcome> {
    let criteria = input.criteria.criteria();
    let mut outcomes: Vec<CriteriaOutcome> = input.cvs.iter().map(|_| CriteriaOutcome::default()).collect();

    match batching {
        CriteriaBatching::PerCv => {
            let calls = input.cvs.iter().flat_map(move |cv| {
                criteria
                    .iter()
                    .map(move |criterion| evaluate_single(input.job_description, criterion, cv, caller))
            });
            let results = join_all(calls).await;

            for (index, (outcome, usage)) in results.into_iter().enumerate() {
                let slot = &mut outcomes[index / criteria.len()];
                slot.usage.add(usage);
                slot.push(&criteria[index % criteria.len()], outcome);
            }
        }
        CriteriaBatching::PerCriterion => {
            let calls = criteria
                .iter()
                .map(|criterion| evaluate_batch(input.job_description, criterion, input.cvs, caller));
            let results = join_all(calls).await;

            for (criterion, (outcome, usage)) in criteria.iter().zip(results) {
                if let Some(first) = outcomes.first_mut() {
                    first.usage.add(usage);
                }
                match outcome {
                    Ok(evaluations) => {
                        for (slot, evaluation) in outcomes.iter_mut().zip(evaluations) {
                            slot.push(criterion, Ok(evaluation));
                        }
                    }
                    Err(error) => {
                        for slot in outcomes.iter_mut() {
                            slot.push(criterion, Err(error.clone()));
                        }
                    }
                }
            }
        }
    }

    outcomes
}
