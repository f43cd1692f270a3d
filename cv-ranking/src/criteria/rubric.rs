//! Criteria definitions and markdown rubric loading

use serde::{Deserialize, Serialize};

use super::rating::Rating;

/// Description of what one rating level means for a criterion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingLevel {
    pub rating: Rating,
    pub description: String,
}

/// A single named evaluation criterion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    /// Stable snake_case key used in records
    pub key: String,
    pub name: String,
    pub description: String,
    /// Levels ordered best first
    pub levels: Vec<RatingLevel>,
}

impl Criterion {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: slugify(&name),
            name,
            description: description.into(),
            levels: Vec::new(),
        }
    }

    /// Add (or replace) the description of a rating level
    pub fn level(mut self, rating: Rating, description: impl Into<String>) -> Self {
        let description = description.into();
        match self.levels.iter_mut().find(|l| l.rating == rating) {
            Some(existing) => existing.description = description,
            None => self.levels.push(RatingLevel { rating, description }),
        }
        self.levels.sort_by(|a, b| b.rating.cmp(&a.rating));
        self
    }

    pub fn level_description(&self, rating: Rating) -> Option<&str> {
        self.levels
            .iter()
            .find(|l| l.rating == rating)
            .map(|l| l.description.as_str())
    }

    /// Rubric section for this criterion as embedded in prompts
    pub fn rubric_text(&self) -> String {
        let mut out = format!("# {}\n", self.name);
        if !self.description.is_empty() {
            out.push_str(&self.description);
            out.push('\n');
        }
        for level in &self.levels {
            out.push_str(&format!(
                "## {} ({}):\n{}\n",
                level.rating.label(),
                level.rating.score(),
                level.description
            ));
        }
        out
    }
}

/// Errors in a rubric definition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RubricError {
    #[error("rubric defines no criteria")]
    Empty,

    #[error("duplicate criterion: {0}")]
    DuplicateCriterion(String),

    #[error("criterion {criterion:?} is missing the {missing} level")]
    MissingLevel { criterion: String, missing: &'static str },
}

/// The ordered, immutable set of criteria shared by every pipeline in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaSet {
    criteria: Vec<Criterion>,
}

impl CriteriaSet {
    /// Build a criteria set, checking names are unique and every criterion
    /// describes all four rating levels
    pub fn new(criteria: Vec<Criterion>) -> Result<Self, RubricError> {
        if criteria.is_empty() {
            return Err(RubricError::Empty);
        }

        for (i, criterion) in criteria.iter().enumerate() {
            if criteria[..i].iter().any(|c| c.key == criterion.key) {
                return Err(RubricError::DuplicateCriterion(criterion.name.clone()));
            }
            for rating in Rating::all() {
                if criterion.level_description(rating).is_none() {
                    return Err(RubricError::MissingLevel {
                        criterion: criterion.name.clone(),
                        missing: rating.label(),
                    });
                }
            }
        }

        Ok(Self { criteria })
    }

    /// Parse a markdown rubric.
    ///
    /// Level-1 headings (`# Name`) open a criterion. Deeper headings whose
    /// text is a rating label (`## Excellent:`) open a level; any other text
    /// is appended to the current level, or to the criterion description
    /// before the first level.
    pub fn from_markdown(text: &str) -> Result<Self, RubricError> {
        let mut criteria: Vec<Criterion> = Vec::new();
        let mut current_level: Option<Rating> = None;
        let mut buffer: Vec<String> = Vec::new();

        fn flush(criterion: Option<&mut Criterion>, level: Option<Rating>, buffer: &mut Vec<String>) {
            let text = buffer.join("\n").trim().to_string();
            buffer.clear();
            let Some(criterion) = criterion else { return };
            match level {
                Some(rating) => {
                    let merged = match criterion.level_description(rating) {
                        Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, text),
                        _ => text,
                    };
                    *criterion = criterion.clone().level(rating, merged);
                }
                None if !text.is_empty() => {
                    if !criterion.description.is_empty() {
                        criterion.description.push('\n');
                    }
                    criterion.description.push_str(&text);
                }
                None => {}
            }
        }

        for line in text.lines() {
            let trimmed = line.trim();
            let depth = trimmed.chars().take_while(|c| *c == '#').count();

            if depth == 0 {
                if !trimmed.is_empty() {
                    buffer.push(trimmed.to_string());
                }
                continue;
            }

            let heading = trimmed[depth..].trim().trim_end_matches(':').trim();
            if depth == 1 {
                flush(criteria.last_mut(), current_level, &mut buffer);
                current_level = None;
                criteria.push(Criterion::new(heading, ""));
            } else if let Ok(rating) = Rating::parse(heading) {
                flush(criteria.last_mut(), current_level, &mut buffer);
                current_level = Some(rating);
            } else {
                buffer.push(heading.to_string());
            }
        }
        flush(criteria.last_mut(), current_level, &mut buffer);

        Self::new(criteria)
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn get(&self, key_or_name: &str) -> Option<&Criterion> {
        let wanted = slugify(key_or_name);
        self.criteria.iter().find(|c| c.key == wanted)
    }

    /// Full rubric text, all criteria in order
    pub fn rubric_text(&self) -> String {
        self.criteria
            .iter()
            .map(|c| c.rubric_text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}

/// The founding-operator hiring rubric used when no rubric file is given
pub fn default_criteria() -> CriteriaSet {
    let criteria = vec![
        Criterion::new(
            "Zero-to-One Operator",
            "Hands-on experience building operational systems from scratch in early-stage, \
             high-growth startups; a diagnose, build, then scale mindset.",
        )
        .level(
            Rating::Excellent,
            "Founded a venture-backed company with traction (100K+ ARR, Series A+, or exit); \
             first 10 employees at a startup reaching product-market fit; built new functions from zero.",
        )
        .level(
            Rating::Good,
            "Early founding team (first 20-50 hires) with meaningful traction; led 0-to-1 \
             initiatives; bootstrapped ventures reaching real users or revenue.",
        )
        .level(
            Rating::Weak,
            "Corporate background without startup exposure; joined post-Series B when processes \
             existed; advisory-only without hands-on execution.",
        )
        .level(
            Rating::NotAFit,
            "5+ years exclusively at large corporates with no startup involvement; purely advisory \
             roles; junior roles without demonstrable startup experience.",
        ),
        Criterion::new(
            "Technical T-Shape",
            "Enough technical or analytical depth to partner with engineers on product and \
             small-scale automation; an AI power user.",
        )
        .level(
            Rating::Excellent,
            "Professional engineering or data experience shipping production systems at Series A+ \
             startups; led analytics or ML product work at scale.",
        )
        .level(
            Rating::Good,
            "Strong data/analytics with applied product experience; comfortable prototyping \
             automation; STEM background.",
        )
        .level(
            Rating::Weak,
            "Academic technical background without productised outcomes; general tech roles \
             without deep analytical contribution.",
        )
        .level(
            Rating::NotAFit,
            "Uncomfortable with technical concepts; non-STEM background without compensating \
             analytical achievements.",
        ),
        Criterion::new(
            "Recruitment Mastery",
            "Deep expertise in end-to-end recruitment within early-stage or high-growth technology companies.",
        )
        .level(
            Rating::Excellent,
            "Built a 0-to-1 recruiting function at early-stage tech; created systems and improved \
             hiring metrics; designed processes from scratch.",
        )
        .level(
            Rating::Good,
            "Filled 5+ roles annually with end-to-end ownership; full-cycle recruitment in \
             startups or tech.",
        )
        .level(
            Rating::Weak,
            "Involved in recruiting with limited end-to-end ownership, e.g. interviewed candidates \
             or supported hiring.",
        )
        .level(
            Rating::NotAFit,
            "No evidence of recruiting or interviewing at all.",
        ),
    ];

    CriteriaSet { criteria }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUBRIC: &str = "\
#Zero-to-One Operator
Builds from scratch.
## Excellent:
Founded a venture-backed company.
## Good:
Early founding team.
## Weak:
Corporate only.
## Not a Fit:
Purely advisory roles.

# Technical T-Shape
## Excellent:
Shipped production systems.
## Good:
Strong analytics.
## Borderline:
Academic only.
## Not a Fit:
Avoids technical work.
";

    #[test]
    fn test_parse_markdown_rubric() {
        let set = CriteriaSet::from_markdown(RUBRIC).unwrap();
        assert_eq!(set.len(), 2);

        let first = &set.criteria()[0];
        assert_eq!(first.name, "Zero-to-One Operator");
        assert_eq!(first.key, "zero_to_one_operator");
        assert_eq!(first.description, "Builds from scratch.");
        assert_eq!(
            first.level_description(Rating::NotAFit),
            Some("Purely advisory roles.")
        );

        let second = set.get("Technical T-Shape").unwrap();
        assert_eq!(second.level_description(Rating::Weak), Some("Academic only."));
        assert_eq!(second.levels[0].rating, Rating::Excellent);
        assert_eq!(second.levels[3].rating, Rating::NotAFit);
    }

    #[test]
    fn test_missing_level_rejected() {
        let text = "# Only Criterion\n## Excellent:\nGreat.\n## Good:\nFine.\n";
        let err = CriteriaSet::from_markdown(text).unwrap_err();
        assert!(matches!(err, RubricError::MissingLevel { .. }));
    }

    #[test]
    fn test_empty_rubric_rejected() {
        assert_eq!(CriteriaSet::from_markdown("no headings here"), Err(RubricError::Empty));
        assert_eq!(CriteriaSet::new(Vec::new()), Err(RubricError::Empty));
    }

    #[test]
    fn test_duplicate_criterion_rejected() {
        let c = default_criteria().criteria()[0].clone();
        let err = CriteriaSet::new(vec![c.clone(), c]).unwrap_err();
        assert!(matches!(err, RubricError::DuplicateCriterion(_)));
    }

    #[test]
    fn test_default_criteria_complete() {
        let set = default_criteria();
        assert_eq!(set.len(), 3);
        assert!(CriteriaSet::new(set.criteria().to_vec()).is_ok());
    }

    #[test]
    fn test_rubric_text_contains_scores() {
        let set = default_criteria();
        let text = set.criteria()[2].rubric_text();
        assert!(text.starts_with("# Recruitment Mastery"));
        assert!(text.contains("## Excellent (4):"));
        assert!(text.contains("## Not a Fit (1):"));
    }
}
