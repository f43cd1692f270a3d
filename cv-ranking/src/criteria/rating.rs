//! The 4-point ordinal rating scale
//!
//! Every label-to-score conversion in the crate goes through [`Rating::parse`]
//! (or its shorthand [`score_of`]), so all pipelines share one reading of what
//! a model's label means.

use serde::{Deserialize, Serialize};

/// Rating label outside the fixed scale, or a score outside 1-4
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown rating label: {label:?}")]
    UnknownLabel { label: String },

    #[error("score {score} outside the rating scale 1-4")]
    ScoreOutOfRange { score: i64 },
}

/// Ordinal rating of a candidate, overall or against a single criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    NotAFit,
    Weak,
    Good,
    Excellent,
}

impl Rating {
    /// All ratings, best first
    pub fn all() -> [Rating; 4] {
        [Rating::Excellent, Rating::Good, Rating::Weak, Rating::NotAFit]
    }

    pub fn score(&self) -> u8 {
        match self {
            Rating::Excellent => 4,
            Rating::Good => 3,
            Rating::Weak => 2,
            Rating::NotAFit => 1,
        }
    }

    /// Canonical label, as shown to the model in prompts
    pub fn label(&self) -> &'static str {
        match self {
            Rating::Excellent => "Excellent",
            Rating::Good => "Good",
            Rating::Weak => "Borderline/Weak",
            Rating::NotAFit => "Not a Fit",
        }
    }

    /// Label used in human-readable ranking files
    pub fn fit_label(&self) -> &'static str {
        match self {
            Rating::Excellent => "Excellent Fit",
            Rating::Good => "Good Fit",
            Rating::Weak => "Borderline",
            Rating::NotAFit => "Not a Fit",
        }
    }

    pub fn from_score(score: i64) -> Result<Self, ValidationError> {
        match score {
            4 => Ok(Rating::Excellent),
            3 => Ok(Rating::Good),
            2 => Ok(Rating::Weak),
            1 => Ok(Rating::NotAFit),
            _ => Err(ValidationError::ScoreOutOfRange { score }),
        }
    }

    /// Parse a rating label as written by a model.
    ///
    /// Matching ignores case, surrounding whitespace, markdown emphasis and
    /// quotes. The integer strings `1`-`4` are accepted as scores. Anything
    /// else is rejected rather than defaulted.
    pub fn parse(label: &str) -> Result<Self, ValidationError> {
        let cleaned = label
            .trim()
            .trim_matches(|c: char| c == '*' || c == '"' || c == '\'' || c == '.' || c == '`')
            .trim();
        let normalized = cleaned
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        match normalized.as_str() {
            "excellent" => Ok(Rating::Excellent),
            "good" => Ok(Rating::Good),
            "borderline" | "weak" | "borderline/weak" => Ok(Rating::Weak),
            "not a fit" => Ok(Rating::NotAFit),
            other => match other.parse::<i64>() {
                Ok(score) => Self::from_score(score),
                Err(_) => Err(ValidationError::UnknownLabel {
                    label: label.to_string(),
                }),
            },
        }
    }
}

impl std::str::FromStr for Rating {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rating::parse(s)
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Map a rating label to its integer score
pub fn score_of(label: &str) -> Result<u8, ValidationError> {
    Rating::parse(label).map(|r| r.score())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_score_of_canonical_labels() {
        assert_eq!(score_of("Excellent"), Ok(4));
        assert_eq!(score_of("Good"), Ok(3));
        assert_eq!(score_of("Borderline/Weak"), Ok(2));
        assert_eq!(score_of("Borderline"), Ok(2));
        assert_eq!(score_of("Weak"), Ok(2));
        assert_eq!(score_of("Not a Fit"), Ok(1));
    }

    #[test]
    fn test_score_of_is_bijection_over_scale() {
        let scores: HashSet<u8> = Rating::all()
            .iter()
            .map(|r| score_of(r.label()).unwrap())
            .collect();
        assert_eq!(scores, HashSet::from([1, 2, 3, 4]));

        for rating in Rating::all() {
            assert_eq!(Rating::from_score(rating.score() as i64), Ok(rating));
            assert_eq!(Rating::parse(rating.label()), Ok(rating));
        }
    }

    #[test]
    fn test_parse_tolerates_formatting() {
        assert_eq!(Rating::parse("  **good** "), Ok(Rating::Good));
        assert_eq!(Rating::parse("NOT A  FIT"), Ok(Rating::NotAFit));
        assert_eq!(Rating::parse("\"Excellent\""), Ok(Rating::Excellent));
        assert_eq!(Rating::parse("3"), Ok(Rating::Good));
    }

    #[test]
    fn test_invalid_labels_rejected() {
        assert!(matches!(
            score_of("Outstanding"),
            Err(ValidationError::UnknownLabel { .. })
        ));
        assert!(matches!(score_of(""), Err(ValidationError::UnknownLabel { .. })));
        assert_eq!(
            score_of("5"),
            Err(ValidationError::ScoreOutOfRange { score: 5 })
        );
        assert_eq!(
            Rating::from_score(0),
            Err(ValidationError::ScoreOutOfRange { score: 0 })
        );
    }

    #[test]
    fn test_off_scale_phrasings_rejected() {
        for label in ["Excellent Fit", "good fit", "Weak Fit", "Not Fit", "No Fit", "Borderline / Weak"] {
            assert!(
                matches!(score_of(label), Err(ValidationError::UnknownLabel { .. })),
                "{} should be rejected",
                label
            );
        }
    }

    #[test]
    fn test_unknown_label_keeps_raw_text() {
        let err = Rating::parse("  Maybe? ").unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownLabel {
                label: "  Maybe? ".to_string()
            }
        );
    }
}
