//! Ranking records produced by pipelines

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::criteria::{score_of, Rating, ValidationError};
use crate::pipelines::{ParseError, PipelineKind};
use crate::providers::{ProviderError, ProviderErrorKind, TokenUsage};

/// Address of one ranking result within a run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResultKey {
    pub pipeline: PipelineKind,
    pub model: String,
    pub cv_id: String,
}

impl ResultKey {
    pub fn new(pipeline: PipelineKind, model: impl Into<String>, cv_id: impl Into<String>) -> Self {
        Self {
            pipeline,
            model: model.into(),
            cv_id: cv_id.into(),
        }
    }
}

impl std::fmt::Display for ResultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.pipeline, self.model, self.cv_id)
    }
}

/// Why a unit produced no rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    RateLimit,
    InvalidResponse,
    Auth,
    Cancelled,
    Parse,
    Validation,
    Other,
}

impl From<ProviderErrorKind> for FailureKind {
    fn from(kind: ProviderErrorKind) -> Self {
        match kind {
            ProviderErrorKind::Timeout => FailureKind::Timeout,
            ProviderErrorKind::RateLimit => FailureKind::RateLimit,
            ProviderErrorKind::InvalidResponse => FailureKind::InvalidResponse,
            ProviderErrorKind::Auth => FailureKind::Auth,
            ProviderErrorKind::Cancelled => FailureKind::Cancelled,
            ProviderErrorKind::Other => FailureKind::Other,
        }
    }
}

/// Failure attached to a ranking result. `raw` keeps the model text that failed to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitError {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl UnitError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }
}

impl std::fmt::Display for UnitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<&ProviderError> for UnitError {
    fn from(err: &ProviderError) -> Self {
        UnitError::new(err.kind().into(), err.to_string())
    }
}

impl From<&ValidationError> for UnitError {
    fn from(err: &ValidationError) -> Self {
        UnitError::new(FailureKind::Validation, err.to_string())
    }
}

impl From<&ParseError> for UnitError {
    fn from(err: &ParseError) -> Self {
        let kind = match err {
            ParseError::Validation(_) => FailureKind::Validation,
            _ => FailureKind::Parse,
        };
        UnitError::new(kind, err.to_string())
    }
}

/// One model judgement of one CV against one criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionEvaluation {
    pub cv_id: String,
    pub criterion: String,
    pub rating: Rating,
    pub score: u8,
    pub rationale: String,
}

impl CriterionEvaluation {
    /// Build from a raw model label; the score always comes from [`score_of`]
    pub fn from_label(
        cv_id: impl Into<String>,
        criterion: impl Into<String>,
        label: &str,
        rationale: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let rating = Rating::parse(label)?;
        let score = score_of(rating.label())?;
        Ok(Self {
            cv_id: cv_id.into(),
            criterion: criterion.into(),
            rating,
            score,
            rationale: rationale.into(),
        })
    }
}

/// Overall rating of one CV under one (pipeline, model) combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingResult {
    pub pipeline: PipelineKind,
    pub provider: String,
    pub model: String,
    pub cv_id: String,
    pub name: String,
    pub rating: Option<u8>,
    pub rationale: String,
    #[serde(default)]
    pub criterion_evaluations: Vec<CriterionEvaluation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<UnitError>,
    #[serde(default)]
    pub usage: TokenUsage,
    pub timestamp: DateTime<Utc>,
}

impl RankingResult {
    pub fn success(
        pipeline: PipelineKind,
        provider: impl Into<String>,
        model: impl Into<String>,
        cv_id: impl Into<String>,
        name: impl Into<String>,
        rating: Rating,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            provider: provider.into(),
            model: model.into(),
            cv_id: cv_id.into(),
            name: name.into(),
            rating: Some(rating.score()),
            rationale: rationale.into(),
            criterion_evaluations: Vec::new(),
            error: None,
            usage: TokenUsage::default(),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(
        pipeline: PipelineKind,
        provider: impl Into<String>,
        model: impl Into<String>,
        cv_id: impl Into<String>,
        name: impl Into<String>,
        error: UnitError,
    ) -> Self {
        Self {
            pipeline,
            provider: provider.into(),
            model: model.into(),
            cv_id: cv_id.into(),
            name: name.into(),
            rating: None,
            rationale: String::new(),
            criterion_evaluations: Vec::new(),
            error: Some(error),
            usage: TokenUsage::default(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_evaluations(mut self, evaluations: Vec<CriterionEvaluation>) -> Self {
        self.criterion_evaluations = evaluations;
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn key(&self) -> ResultKey {
        ResultKey::new(self.pipeline, &self.model, &self.cv_id)
    }

    pub fn is_success(&self) -> bool {
        self.rating.is_some() && self.error.is_none()
    }

    /// Unit stopped by cancellation or deadline rather than by a real failure
    pub fn is_cancelled(&self) -> bool {
        matches!(&self.error, Some(e) if e.kind == FailureKind::Cancelled)
    }

    pub fn rating_label(&self) -> Option<&'static str> {
        self.rating
            .and_then(|r| Rating::from_score(r as i64).ok())
            .map(|r| r.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_routes_through_score_of() {
        let eval = CriterionEvaluation::from_label("cv1", "Technical T-Shape", " good ", "solid").unwrap();
        assert_eq!(eval.rating, Rating::Good);
        assert_eq!(eval.score, 3);

        let err = CriterionEvaluation::from_label("cv1", "Technical T-Shape", "Outstanding", "")
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownLabel { .. }));
    }

    #[test]
    fn test_failure_record_has_no_rating() {
        let result = RankingResult::failure(
            PipelineKind::OneShot,
            "openai",
            "gpt-4o",
            "cv1",
            "Jane",
            UnitError::new(FailureKind::Timeout, "Timeout after 10ms"),
        );
        assert!(!result.is_success());
        assert!(!result.is_cancelled());
        assert_eq!(result.rating, None);
        assert_eq!(result.key(), ResultKey::new(PipelineKind::OneShot, "gpt-4o", "cv1"));
    }

    #[test]
    fn test_record_json_shape() {
        let result = RankingResult::success(
            PipelineKind::DecomposedAlgorithmic,
            "anthropic",
            "claude",
            "cv2",
            "Sam",
            Rating::Excellent,
            "strong",
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["pipeline"], "decomposed_algorithmic");
        assert_eq!(json["rating"], 4);
        assert!(json.get("error").is_none());
        assert_eq!(result.rating_label(), Some("Excellent"));
    }
}
