//! Evaluation rubric: named criteria on a fixed 4-point rating scale

pub mod rating;
pub mod rubric;

pub use rating::{score_of, Rating, ValidationError};
pub use rubric::{default_criteria, CriteriaSet, Criterion, RatingLevel, RubricError};
