//! Variance-based disagreement between pipelines and models

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::table::{ColumnKey, ComparisonTable};
use crate::pipelines::PipelineKind;

/// Descriptive statistics of a rating vector.
///
/// Variance is the population variance and is `None` with fewer than two
/// ratings: a single rating shows no disagreement, but it is not evidence of
/// agreement either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub variance: Option<f64>,
    pub std_dev: Option<f64>,
    pub min: Option<u8>,
    pub max: Option<u8>,
    pub range: Option<u8>,
}

impl RatingStats {
    pub fn from_ratings(ratings: &[u8]) -> Self {
        let count = ratings.len();
        let mean = (count > 0).then(|| ratings.iter().map(|&r| r as f64).sum::<f64>() / count as f64);
        let variance = match mean {
            Some(m) if count >= 2 => {
                Some(ratings.iter().map(|&r| (r as f64 - m).powi(2)).sum::<f64>() / count as f64)
            }
            _ => None,
        };
        let min = ratings.iter().copied().min();
        let max = ratings.iter().copied().max();

        Self {
            count,
            mean,
            variance,
            std_dev: variance.map(f64::sqrt),
            min,
            max,
            range: min.zip(max).map(|(lo, hi)| hi - lo),
        }
    }
}

/// One (pipeline, model) cell of a CV's rating vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRating {
    pub pipeline: PipelineKind,
    pub model: String,
    pub rating: u8,
}

/// Disagreement for one CV across every (pipeline, model) column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisagreementMetric {
    pub cv_id: String,
    pub name: String,
    pub ratings: Vec<ColumnRating>,
    #[serde(flatten)]
    pub stats: RatingStats,
    /// Count per rating value 1-4
    pub distribution: BTreeMap<u8, usize>,
}

/// Variance within one group: a single pipeline varying model, or a single
/// model varying pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupVariance {
    pub group: String,
    pub ratings: Vec<u8>,
    pub mean: Option<f64>,
    pub variance: Option<f64>,
}

impl GroupVariance {
    fn new(group: impl Into<String>, ratings: Vec<u8>) -> Self {
        let stats = RatingStats::from_ratings(&ratings);
        Self {
            group: group.into(),
            ratings,
            mean: stats.mean,
            variance: stats.variance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvBreakdown {
    pub cv_id: String,
    pub by_pipeline: Vec<GroupVariance>,
    pub by_model: Vec<GroupVariance>,
}

/// Mean of the defined per-CV variances within one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group: String,
    pub cvs_with_variance: usize,
    pub mean_variance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisagreementReport {
    /// Sorted by variance descending, undefined variance last, ties by CV id
    pub metrics: Vec<DisagreementMetric>,
    /// In CV id order
    pub breakdowns: Vec<CvBreakdown>,
    pub pipeline_summary: Vec<GroupSummary>,
    pub model_summary: Vec<GroupSummary>,
}

impl DisagreementReport {
    pub fn metric(&self, cv_id: &str) -> Option<&DisagreementMetric> {
        self.metrics.iter().find(|m| m.cv_id == cv_id)
    }

    pub fn breakdown(&self, cv_id: &str) -> Option<&CvBreakdown> {
        self.breakdowns.iter().find(|b| b.cv_id == cv_id)
    }
}

fn by_variance_desc(a: &DisagreementMetric, b: &DisagreementMetric) -> Ordering {
    let by_variance = match (a.stats.variance, b.stats.variance) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_variance.then_with(|| a.cv_id.cmp(&b.cv_id))
}

fn summarize(groups: BTreeMap<String, Vec<f64>>) -> Vec<GroupSummary> {
    groups
        .into_iter()
        .map(|(group, variances)| GroupSummary {
            cvs_with_variance: variances.len(),
            mean_variance: (!variances.is_empty())
                .then(|| variances.iter().sum::<f64>() / variances.len() as f64),
            group,
        })
        .collect()
}

/// Computes disagreement metrics from a comparison table
#[derive(Debug, Clone, Copy, Default)]
pub struct DisagreementAnalyzer;

impl DisagreementAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, table: &ComparisonTable) -> DisagreementReport {
        let mut metrics = Vec::with_capacity(table.len());
        let mut breakdowns = Vec::with_capacity(table.len());
        let mut pipeline_variances: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut model_variances: BTreeMap<String, Vec<f64>> = BTreeMap::new();

        for (cv_id, row) in table.rows() {
            let rated: Vec<(&ColumnKey, u8)> = row.rated().collect();
            let values: Vec<u8> = rated.iter().map(|(_, r)| *r).collect();

            let mut distribution: BTreeMap<u8, usize> = (1..=4).map(|r| (r, 0)).collect();
            for &r in &values {
                *distribution.entry(r).or_default() += 1;
            }

            metrics.push(DisagreementMetric {
                cv_id: cv_id.clone(),
                name: row.name.clone(),
                ratings: rated
                    .iter()
                    .map(|(k, r)| ColumnRating {
                        pipeline: k.pipeline,
                        model: k.model.clone(),
                        rating: *r,
                    })
                    .collect(),
                stats: RatingStats::from_ratings(&values),
                distribution,
            });

            let mut per_pipeline: BTreeMap<PipelineKind, Vec<u8>> = BTreeMap::new();
            let mut per_model: BTreeMap<String, Vec<u8>> = BTreeMap::new();
            for (key, rating) in &rated {
                per_pipeline.entry(key.pipeline).or_default().push(*rating);
                per_model.entry(key.model.clone()).or_default().push(*rating);
            }

            let by_pipeline: Vec<GroupVariance> = per_pipeline
                .into_iter()
                .map(|(p, ratings)| GroupVariance::new(p.as_str(), ratings))
                .collect();
            let by_model: Vec<GroupVariance> = per_model
                .into_iter()
                .map(|(m, ratings)| GroupVariance::new(m, ratings))
                .collect();

            for group in &by_pipeline {
                if let Some(v) = group.variance {
                    pipeline_variances.entry(group.group.clone()).or_default().push(v);
                }
            }
            for group in &by_model {
                if let Some(v) = group.variance {
                    model_variances.entry(group.group.clone()).or_default().push(v);
                }
            }

            breakdowns.push(CvBreakdown {
                cv_id: cv_id.clone(),
                by_pipeline,
                by_model,
            });
        }

        for pipeline in table.pipelines() {
            pipeline_variances.entry(pipeline.to_string()).or_default();
        }
        for model in table.models() {
            model_variances.entry(model).or_default();
        }

        metrics.sort_by(by_variance_desc);

        DisagreementReport {
            metrics,
            breakdowns,
            pipeline_summary: summarize(pipeline_variances),
            model_summary: summarize(model_variances),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Rating;
    use crate::store::RankingResult;

    fn rated(pipeline: PipelineKind, model: &str, cv: &str, rating: u8) -> RankingResult {
        RankingResult::success(
            pipeline,
            "p",
            model,
            cv,
            cv,
            Rating::from_score(rating as i64).unwrap(),
            "",
        )
    }

    #[test]
    fn test_variance_values() {
        assert_eq!(RatingStats::from_ratings(&[4, 4, 4, 4]).variance, Some(0.0));
        assert_eq!(RatingStats::from_ratings(&[1, 4]).variance, Some(2.25));
        assert_eq!(RatingStats::from_ratings(&[1, 4]).std_dev, Some(1.5));

        let single = RatingStats::from_ratings(&[3]);
        assert_eq!(single.variance, None);
        assert_eq!(single.std_dev, None);
        assert_eq!(single.mean, Some(3.0));

        let empty = RatingStats::from_ratings(&[]);
        assert_eq!(empty.mean, None);
        assert_eq!(empty.range, None);
    }

    #[test]
    fn test_sorted_by_variance_with_undefined_last() {
        let table = ComparisonTable::from_results(&[
            // b: [1, 4] -> 2.25
            rated(PipelineKind::OneShot, "m1", "b", 1),
            rated(PipelineKind::OneShot, "m2", "b", 4),
            // a: [4, 4] -> 0
            rated(PipelineKind::OneShot, "m1", "a", 4),
            rated(PipelineKind::OneShot, "m2", "a", 4),
            // c: [2, 2] -> 0, ties with a
            rated(PipelineKind::OneShot, "m1", "c", 2),
            rated(PipelineKind::OneShot, "m2", "c", 2),
            // d: single rating -> undefined
            rated(PipelineKind::OneShot, "m1", "d", 3),
        ]);
        let report = DisagreementAnalyzer::new().analyze(&table);
        let order: Vec<&str> = report.metrics.iter().map(|m| m.cv_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c", "d"]);
        assert_eq!(report.metric("d").unwrap().stats.variance, None);
        assert_eq!(report.metric("b").unwrap().stats.range, Some(3));
        assert_eq!(report.metric("b").unwrap().distribution[&1], 1);
        assert_eq!(report.metric("b").unwrap().distribution[&2], 0);
    }

    #[test]
    fn test_breakdowns_isolate_one_axis() {
        let table = ComparisonTable::from_results(&[
            rated(PipelineKind::OneShot, "m1", "cv1", 4),
            rated(PipelineKind::OneShot, "m2", "cv1", 2),
            rated(PipelineKind::DecomposedAlgorithmic, "m1", "cv1", 3),
            rated(PipelineKind::DecomposedAlgorithmic, "m2", "cv1", 3),
        ]);
        let report = DisagreementAnalyzer::new().analyze(&table);
        let breakdown = report.breakdown("cv1").unwrap();

        // one_shot varies by model: [4, 2] -> 1.0; decomposed agrees: [3, 3] -> 0
        let one_shot = breakdown.by_pipeline.iter().find(|g| g.group == "one_shot").unwrap();
        assert_eq!(one_shot.variance, Some(1.0));
        let decomposed = breakdown
            .by_pipeline
            .iter()
            .find(|g| g.group == "decomposed_algorithmic")
            .unwrap();
        assert_eq!(decomposed.variance, Some(0.0));

        // m1 varies by pipeline: [4, 3] -> 0.25
        let m1 = breakdown.by_model.iter().find(|g| g.group == "m1").unwrap();
        assert_eq!(m1.ratings, vec![4, 3]);
        assert_eq!(m1.variance, Some(0.25));

        let summary = report.pipeline_summary.iter().find(|g| g.group == "one_shot").unwrap();
        assert_eq!(summary.mean_variance, Some(1.0));
    }

    #[test]
    fn test_failed_cells_are_excluded() {
        let mut results = vec![rated(PipelineKind::OneShot, "m1", "cv1", 4)];
        results.push(RankingResult::failure(
            PipelineKind::OneShot,
            "p",
            "m2",
            "cv1",
            "cv1",
            crate::store::UnitError::new(crate::store::FailureKind::Timeout, "t"),
        ));
        let report = DisagreementAnalyzer::new().analyze(&ComparisonTable::from_results(&results));
        let metric = report.metric("cv1").unwrap();
        assert_eq!(metric.stats.count, 1);
        assert_eq!(metric.stats.variance, None);
    }
}
