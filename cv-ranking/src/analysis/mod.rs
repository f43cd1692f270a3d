//! Comparison tables and disagreement analysis

pub mod disagreement;
pub mod table;

pub use disagreement::{
    ColumnRating, CvBreakdown, DisagreementAnalyzer, DisagreementMetric, DisagreementReport,
    GroupSummary, GroupVariance, RatingStats,
};
pub use table::{ColumnKey, ComparisonRow, ComparisonTable};
