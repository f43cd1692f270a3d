//! Structured-response extraction from free-form model output

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::candidates::{normalize_id, Cv};
use crate::criteria::{Criterion, Rating, ValidationError};
use crate::store::CriterionEvaluation;

/// Marker line that opens the final block of a chain-of-thought response
pub const FINAL_RANKING_MARKER: &str = "FINAL RANKING:";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no JSON object found in response")]
    NoJson,

    #[error("malformed JSON: {0}")]
    Json(String),

    #[error("response is missing field '{0}'")]
    MissingField(&'static str),

    #[error("response has no ranking for: {}", .0.join(", "))]
    MissingCandidates(Vec<String>),

    #[error("CV ids collide after normalization: {0}")]
    AmbiguousId(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Extract the first JSON object from noisy model output.
///
/// Handles bare JSON, JSON inside markdown fences and JSON embedded in prose.
pub fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let remainder = &raw[start..];
    find_matching_brace(remainder).map(|end| &remainder[..end])
}

/// Extract the last complete top-level JSON object
pub fn extract_last_json(raw: &str) -> Option<&str> {
    let mut last = None;
    let mut offset = 0;
    while let Some(start) = raw[offset..].find('{') {
        let begin = offset + start;
        match find_matching_brace(&raw[begin..]) {
            Some(end) => {
                last = Some(&raw[begin..begin + end]);
                offset = begin + end;
            }
            None => offset = begin + 1,
        }
    }
    last
}

/// Byte offset just past the brace closing the object that opens `s`.
/// Braces inside JSON strings are not counted.
fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, c) in s.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        if c == '\\' && in_string {
            escape = true;
            continue;
        }
        if c == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        // Tolerates markdown emphasis and heading markers around the marker text
        Regex::new(r"(?i)final\s+ranking\s*\**\s*:").expect("marker pattern is a valid regex")
    })
}

/// Text after the last `FINAL RANKING:` marker, if the response has one
pub fn final_ranking_block(raw: &str) -> Option<&str> {
    marker_regex().find_iter(raw).last().map(|m| &raw[m.end()..])
}

/// String or number, as models emit ids and ratings either way
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RankingsResponse {
    rankings: Option<Vec<RankingEntry>>,
}

#[derive(Debug, Deserialize)]
struct RankingEntry {
    cv_id: Option<Scalar>,
    rating: Option<Scalar>,
    #[serde(default, alias = "rationale")]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct EvaluationEntry {
    cv_id: Option<Scalar>,
    rating: Option<Scalar>,
    #[serde(default, alias = "reasoning", alias = "rationale")]
    evidence: String,
}

#[derive(Debug, Deserialize)]
struct BatchedEvaluations {
    evaluations: Option<Vec<EvaluationEntry>>,
}

#[derive(Debug, Deserialize)]
struct SynthesisResponse {
    rating: Option<Scalar>,
    #[serde(default, alias = "rationale")]
    reasoning: String,
}

/// One CV's rating as read from a whole-set response
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRanking {
    pub cv_id: String,
    pub rating: Rating,
    pub reasoning: String,
}

fn from_json<'de, T: Deserialize<'de>>(json: &'de str) -> Result<T, ParseError> {
    serde_json::from_str(json).map_err(|e| ParseError::Json(e.to_string()))
}

/// Match entries to the expected CVs by id.
///
/// Unknown ids are ignored, a repeated id keeps its first entry and every
/// expected CV without an entry is reported together.
fn match_by_id<T>(
    entries: Vec<T>,
    expected: &[Cv],
    id_of: impl Fn(&T) -> Option<String>,
) -> Result<Vec<T>, ParseError> {
    let mut slots: IndexMap<String, (&Cv, Option<T>)> = IndexMap::with_capacity(expected.len());
    for cv in expected {
        if slots.insert(normalize_id(&cv.id), (cv, None)).is_some() {
            return Err(ParseError::AmbiguousId(cv.id.clone()));
        }
    }

    for entry in entries {
        let Some(id) = id_of(&entry) else {
            tracing::warn!("Ignoring ranking entry without cv_id");
            continue;
        };
        match slots.get_mut(&normalize_id(&id)) {
            Some((_, slot)) if slot.is_none() => *slot = Some(entry),
            Some(_) => tracing::warn!("Ignoring repeated entry for CV {}", id),
            None => tracing::warn!("Ignoring entry for unknown CV {}", id),
        }
    }

    let missing: Vec<String> = slots
        .values()
        .filter(|(_, slot)| slot.is_none())
        .map(|(cv, _)| cv.id.clone())
        .collect();
    if !missing.is_empty() {
        return Err(ParseError::MissingCandidates(missing));
    }

    Ok(slots.into_values().filter_map(|(_, slot)| slot).collect())
}

fn parse_rankings_json(json: &str, expected: &[Cv]) -> Result<Vec<ParsedRanking>, ParseError> {
    let response: RankingsResponse = from_json(json)?;
    let entries = response.rankings.ok_or(ParseError::MissingField("rankings"))?;
    let matched = match_by_id(entries, expected, |e| e.cv_id.clone().map(Scalar::into_string))?;

    expected
        .iter()
        .zip(matched)
        .map(|(cv, entry)| {
            let label = entry.rating.ok_or(ParseError::MissingField("rating"))?.into_string();
            Ok(ParsedRanking {
                cv_id: cv.id.clone(),
                rating: Rating::parse(&label)?,
                reasoning: entry.reasoning,
            })
        })
        .collect()
}

/// Parse a whole-set `{"rankings": [...]}` response, one entry per expected CV in input order
pub fn parse_rankings(raw: &str, expected: &[Cv]) -> Result<Vec<ParsedRanking>, ParseError> {
    parse_rankings_json(extract_json(raw).ok_or(ParseError::NoJson)?, expected)
}

/// Parse a chain-of-thought response, reading only the final ranking block
pub fn parse_final_rankings(raw: &str, expected: &[Cv]) -> Result<Vec<ParsedRanking>, ParseError> {
    let json = match final_ranking_block(raw) {
        Some(block) => extract_json(block),
        None => extract_last_json(raw),
    };
    parse_rankings_json(json.ok_or(ParseError::NoJson)?, expected)
}

fn to_evaluation(
    entry: EvaluationEntry,
    cv: &Cv,
    criterion: &Criterion,
) -> Result<CriterionEvaluation, ParseError> {
    let label = entry.rating.ok_or(ParseError::MissingField("rating"))?.into_string();
    Ok(CriterionEvaluation::from_label(&cv.id, &criterion.name, &label, entry.evidence)?)
}

/// Parse a single `{"cv_id", "rating", "evidence"}` criterion response
pub fn parse_criterion_evaluation(
    raw: &str,
    cv: &Cv,
    criterion: &Criterion,
) -> Result<CriterionEvaluation, ParseError> {
    let entry: EvaluationEntry = from_json(extract_json(raw).ok_or(ParseError::NoJson)?)?;
    if let Some(id) = entry.cv_id.clone().map(Scalar::into_string) {
        if normalize_id(&id) != normalize_id(&cv.id) {
            tracing::warn!("Criterion response names CV {} while evaluating {}", id, cv.id);
        }
    }
    to_evaluation(entry, cv, criterion)
}

/// Parse a `{"evaluations": [...]}` response covering several CVs for one criterion
pub fn parse_batched_evaluations(
    raw: &str,
    cvs: &[Cv],
    criterion: &Criterion,
) -> Result<Vec<CriterionEvaluation>, ParseError> {
    let response: BatchedEvaluations = from_json(extract_json(raw).ok_or(ParseError::NoJson)?)?;
    let entries = response.evaluations.ok_or(ParseError::MissingField("evaluations"))?;
    let matched = match_by_id(entries, cvs, |e| e.cv_id.clone().map(Scalar::into_string))?;
    cvs.iter()
        .zip(matched)
        .map(|(cv, entry)| to_evaluation(entry, cv, criterion))
        .collect()
}

/// Parse a `{"rating", "reasoning"}` synthesis response
pub fn parse_synthesis(raw: &str) -> Result<(Rating, String), ParseError> {
    let response: SynthesisResponse = from_json(extract_json(raw).ok_or(ParseError::NoJson)?)?;
    let label = response.rating.ok_or(ParseError::MissingField("rating"))?.into_string();
    Ok((Rating::parse(&label)?, response.reasoning))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::default_criteria;

    fn cvs(ids: &[&str]) -> Vec<Cv> {
        ids.iter().map(|id| Cv::new(*id, format!("# {}", id))).collect()
    }

    #[test]
    fn test_extract_json_with_fences_and_prose() {
        let input = "Here you go:\n```json\n{\"rankings\": []}\n```\nThanks";
        assert_eq!(extract_json(input), Some("{\"rankings\": []}"));
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("{\"unterminated\": 1"), None);
    }

    #[test]
    fn test_extract_json_braces_in_strings() {
        let wrapped = r#"Result: {"desc": "a {b} c \"q\"", "x": 2} done"#;
        assert_eq!(extract_json(wrapped), Some(r#"{"desc": "a {b} c \"q\"", "x": 2}"#));
    }

    #[test]
    fn test_extract_last_json() {
        let input = r#"first {"a": 1} then {"b": {"c": 2}} end"#;
        assert_eq!(extract_last_json(input), Some(r#"{"b": {"c": 2}}"#));
    }

    #[test]
    fn test_rankings_matched_by_id_not_position() {
        let raw = r#"{"rankings": [
            {"cv_id": "CV2", "name": "B", "rating": "Good", "reasoning": "ok"},
            {"cv_id": "cv1", "name": "A", "rating": 4, "reasoning": "great"}
        ]}"#;
        let parsed = parse_rankings(raw, &cvs(&["cv1", "cv2"])).unwrap();
        assert_eq!(parsed[0].cv_id, "cv1");
        assert_eq!(parsed[0].rating, Rating::Excellent);
        assert_eq!(parsed[1].cv_id, "cv2");
        assert_eq!(parsed[1].rating, Rating::Good);
    }

    #[test]
    fn test_missing_candidates_listed() {
        let raw = r#"{"rankings": [{"cv_id": "cv2", "rating": "Good"}, {"cv_id": "cv9", "rating": "Good"}]}"#;
        let err = parse_rankings(raw, &cvs(&["cv1", "cv2", "cv3"])).unwrap_err();
        assert_eq!(err, ParseError::MissingCandidates(vec!["cv1".into(), "cv3".into()]));
    }

    #[test]
    fn test_duplicate_id_keeps_first() {
        let raw = r#"{"rankings": [
            {"cv_id": "cv1", "rating": "Good"},
            {"cv_id": "cv1", "rating": "Not a Fit"}
        ]}"#;
        let parsed = parse_rankings(raw, &cvs(&["cv1"])).unwrap();
        assert_eq!(parsed[0].rating, Rating::Good);
    }

    #[test]
    fn test_case_colliding_ids_rejected() {
        let raw = r#"{"rankings": [{"cv_id": "CV1", "rating": "Good"}, {"cv_id": "cv1", "rating": "Weak"}]}"#;
        let err = parse_rankings(raw, &cvs(&["CV1", "cv1"])).unwrap_err();
        assert_eq!(err, ParseError::AmbiguousId("cv1".into()));
    }

    #[test]
    fn test_invalid_label_is_validation_error() {
        let raw = r#"{"rankings": [{"cv_id": "cv1", "rating": "Superb"}]}"#;
        let err = parse_rankings(raw, &cvs(&["cv1"])).unwrap_err();
        assert!(matches!(err, ParseError::Validation(ValidationError::UnknownLabel { .. })));
    }

    #[test]
    fn test_final_block_ignores_reasoning_json() {
        let raw = r#"Step 1: cv1 looks like {"rankings": [{"cv_id": "cv1", "rating": "Not a Fit"}]}
Step 2: on reflection...
**FINAL RANKING:**
{"rankings": [{"cv_id": "cv1", "rating": "Excellent", "reasoning": "r"}]}"#;
        let parsed = parse_final_rankings(raw, &cvs(&["cv1"])).unwrap();
        assert_eq!(parsed[0].rating, Rating::Excellent);
    }

    #[test]
    fn test_final_block_falls_back_to_last_object() {
        let raw = r#"draft {"rankings": [{"cv_id": "cv1", "rating": "Weak"}]}
revised {"rankings": [{"cv_id": "cv1", "rating": "Good"}]}"#;
        let parsed = parse_final_rankings(raw, &cvs(&["cv1"])).unwrap();
        assert_eq!(parsed[0].rating, Rating::Good);
    }

    #[test]
    fn test_criterion_and_batched_evaluations() {
        let criteria = default_criteria();
        let criterion = &criteria.criteria()[0];
        let set = cvs(&["cv1", "cv2"]);

        let single = parse_criterion_evaluation(
            r#"```json
{"cv_id": "cv1", "rating": "Weak", "evidence": "little ownership"}
```"#,
            &set[0],
            criterion,
        )
        .unwrap();
        assert_eq!(single.score, 2);
        assert_eq!(single.criterion, criterion.name);

        let batched = parse_batched_evaluations(
            r#"{"evaluations": [
                {"cv_id": "cv2", "rating": "Excellent", "evidence": "x"},
                {"cv_id": "cv1", "rating": "Good", "evidence": "y"}
            ]}"#,
            &set,
            criterion,
        )
        .unwrap();
        assert_eq!(batched[0].cv_id, "cv1");
        assert_eq!(batched[0].score, 3);
        assert_eq!(batched[1].score, 4);
    }

    #[test]
    fn test_synthesis_requires_rating() {
        assert_eq!(
            parse_synthesis(r#"{"reasoning": "no rating"}"#),
            Err(ParseError::MissingField("rating"))
        );
        let (rating, reasoning) = parse_synthesis(r#"{"rating": "Good", "reasoning": "solid"}"#).unwrap();
        assert_eq!(rating, Rating::Good);
        assert_eq!(reasoning, "solid");
    }
}
