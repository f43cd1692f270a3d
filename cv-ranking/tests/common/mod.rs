//! Shared fixtures: a small CV set and a responder that answers every
//! prompt shape the pipelines send

#![allow(dead_code)]

use std::sync::Arc;

use regex::Regex;
use serde_json::json;

use cv_ranking::candidates::Cv;
use cv_ranking::criteria::{default_criteria, Rating};
use cv_ranking::providers::{GenerationOptions, LLMProvider, ProviderResult, ScriptedProvider};
use cv_ranking::runner::{CallPolicy, ExecutorConfig, ProviderCaller, RunInput};

pub const JOB: &str = "Founding operator for a seed-stage recruiting startup.";

pub fn cvs() -> Vec<Cv> {
    vec![
        Cv::new("alice", "# Alice Martin\nFounder, ex-Stripe data lead"),
        Cv::new("bob", "# Bob Stone\nCorporate HR generalist"),
        Cv::new("carol", "# Carol Diaz\nFirst recruiter at two startups"),
    ]
}

pub fn run_input() -> Arc<RunInput> {
    Arc::new(RunInput::new(JOB, default_criteria(), cvs()))
}

/// Per-criterion score for each fixture CV, in default criteria order.
/// Means: alice 3.33 -> 3, bob 1.67 -> 2, carol 3.67 -> 4.
pub fn criterion_scores(cv_id: &str) -> [u8; 3] {
    match cv_id {
        "alice" => [4, 3, 3],
        "bob" => [1, 2, 2],
        "carol" => [4, 4, 3],
        _ => [1, 1, 1],
    }
}

pub fn criterion_rating(cv_id: &str, criterion: &str) -> Rating {
    let index = default_criteria()
        .criteria()
        .iter()
        .position(|c| c.name == criterion)
        .unwrap_or(0);
    Rating::from_score(criterion_scores(cv_id)[index] as i64).unwrap()
}

/// Whole-set ratings returned for one-shot prompts
pub fn one_shot_rating(cv_id: &str) -> Rating {
    match cv_id {
        "alice" => Rating::Good,
        "bob" => Rating::Weak,
        _ => Rating::Excellent,
    }
}

/// Whole-set ratings returned for chain-of-thought prompts
pub fn chain_of_thought_rating(cv_id: &str) -> Rating {
    match cv_id {
        "alice" => Rating::Excellent,
        "bob" => Rating::Weak,
        _ => Rating::Good,
    }
}

/// CV ids in the order their blocks appear in a prompt
pub fn cv_ids(prompt: &str) -> Vec<String> {
    let re = Regex::new(r"CV \(ID: ([^)]+)\):").unwrap();
    let mut ids: Vec<String> = Vec::new();
    for cap in re.captures_iter(prompt) {
        let id = cap[1].to_string();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

pub fn criterion_name(prompt: &str) -> Option<String> {
    let re = Regex::new(r#"against the "([^"]+)" criterion"#).unwrap();
    re.captures(prompt).map(|cap| cap[1].to_string())
}

fn rankings_json(ids: &[String], rating: fn(&str) -> Rating) -> serde_json::Value {
    json!({
        "rankings": ids
            .iter()
            .map(|id| json!({
                "cv_id": id,
                "name": id,
                "rating": rating(id).label(),
                "reasoning": format!("{} reads as {}", id, rating(id).label()),
            }))
            .collect::<Vec<_>>()
    })
}

pub fn synthesis_reply(rating: Rating) -> String {
    json!({"rating": rating.label(), "reasoning": "criteria weighed together"}).to_string()
}

/// Answer any pipeline prompt consistently with the fixture tables.
/// Synthesis always answers `Good`.
pub fn respond(prompt: &str) -> ProviderResult<String> {
    let ids = cv_ids(prompt);

    if prompt.starts_with("Synthesize") {
        return Ok(synthesis_reply(Rating::Good));
    }

    if let Some(criterion) = criterion_name(prompt) {
        if prompt.starts_with("Evaluate each of") {
            let evaluations: Vec<_> = ids
                .iter()
                .map(|id| {
                    json!({
                        "cv_id": id,
                        "rating": criterion_rating(id, &criterion).label(),
                        "evidence": "batched evidence",
                    })
                })
                .collect();
            return Ok(format!("```json\n{}\n```", json!({ "evaluations": evaluations })));
        }
        let id = ids.first().cloned().unwrap_or_default();
        return Ok(json!({
            "cv_id": id,
            "rating": criterion_rating(&id, &criterion).label(),
            "evidence": format!("{} on {}", id, criterion),
        })
        .to_string());
    }

    if prompt.contains("Think through the evaluation") {
        // The reasoning carries a draft JSON object that must be ignored
        let draft = rankings_json(&ids, |_| Rating::NotAFit);
        return Ok(format!(
            "Step 1: looking at each candidate.\nDraft: {}\n\nFINAL RANKING:\n{}",
            draft,
            rankings_json(&ids, chain_of_thought_rating)
        ));
    }

    Ok(format!(
        "Here is my assessment.\n```json\n{}\n```",
        rankings_json(&ids, one_shot_rating)
    ))
}

pub fn scripted(name: &str) -> Arc<ScriptedProvider> {
    Arc::new(ScriptedProvider::new(name).with_responder(respond))
}

pub fn fast_policy() -> CallPolicy {
    CallPolicy {
        retry_count: 2,
        retry_delay_ms: 1,
        max_retry_delay_ms: 4,
        timeout_ms: 2_000,
    }
}

pub fn fast_config() -> ExecutorConfig {
    ExecutorConfig {
        parallel_requests: 4,
        retry_count: 2,
        retry_delay_ms: 1,
        max_retry_delay_ms: 4,
        timeout_ms: 2_000,
        ..ExecutorConfig::default()
    }
}

pub fn caller(provider: Arc<dyn LLMProvider>, model: &str) -> ProviderCaller {
    ProviderCaller::standalone(provider, GenerationOptions::new(model), fast_policy())
}
