//! JSON and text renderings of a disagreement report

use std::io::Write;
use std::path::Path;

use crate::analysis::{DisagreementReport, GroupVariance};

/// Decimal places for every statistic in the text rendering
pub const STAT_PRECISION: usize = 4;

/// Render an optional statistic; undefined values print as `n/a`
pub fn format_stat(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.*}", STAT_PRECISION, v),
        None => "n/a".to_string(),
    }
}

pub struct DisagreementWriter;

impl DisagreementWriter {
    pub fn write_json(path: impl AsRef<Path>, report: &DisagreementReport) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(report)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    pub fn write_text(path: impl AsRef<Path>, report: &DisagreementReport) -> std::io::Result<()> {
        let mut file = std::fs::File::create(path)?;
        file.write_all(render_text(report).as_bytes())
    }
}

fn render_groups(out: &mut String, title: &str, groups: &[GroupVariance]) {
    if groups.is_empty() {
        return;
    }
    out.push_str(&format!("    {}:\n", title));
    for group in groups {
        let ratings: Vec<String> = group.ratings.iter().map(|r| r.to_string()).collect();
        out.push_str(&format!(
            "      {:<28} [{}] mean={} variance={}\n",
            group.group,
            ratings.join(", "),
            format_stat(group.mean),
            format_stat(group.variance)
        ));
    }
}

pub fn render_text(report: &DisagreementReport) -> String {
    let mut out = String::new();
    out.push_str("=== Disagreement Report ===\n\n");
    out.push_str("CVs by rating variance (highest first):\n");
    out.push_str(&format!("{:-<72}\n", ""));

    for metric in &report.metrics {
        let stats = &metric.stats;
        out.push_str(&format!("{} ({})\n", metric.name, metric.cv_id));
        out.push_str(&format!(
            "  n={} mean={} variance={} std_dev={} range={}\n",
            stats.count,
            format_stat(stats.mean),
            format_stat(stats.variance),
            format_stat(stats.std_dev),
            stats.range.map(|r| r.to_string()).unwrap_or_else(|| "n/a".to_string())
        ));

        let distribution: Vec<String> = metric
            .distribution
            .iter()
            .map(|(rating, count)| format!("{}:{}", rating, count))
            .collect();
        out.push_str(&format!("  distribution {}\n", distribution.join(" ")));

        for rating in &metric.ratings {
            out.push_str(&format!(
                "    {}/{} = {}\n",
                rating.pipeline, rating.model, rating.rating
            ));
        }

        if let Some(breakdown) = report.breakdown(&metric.cv_id) {
            render_groups(&mut out, "by pipeline (varying model)", &breakdown.by_pipeline);
            render_groups(&mut out, "by model (varying pipeline)", &breakdown.by_model);
        }
        out.push('\n');
    }

    out.push_str("Mean variance by pipeline:\n");
    for summary in &report.pipeline_summary {
        out.push_str(&format!(
            "  {:<28} {} ({} CVs)\n",
            summary.group,
            format_stat(summary.mean_variance),
            summary.cvs_with_variance
        ));
    }
    out.push_str("\nMean variance by model:\n");
    for summary in &report.model_summary {
        out.push_str(&format!(
            "  {:<28} {} ({} CVs)\n",
            summary.group,
            format_stat(summary.mean_variance),
            summary.cvs_with_variance
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ComparisonTable, DisagreementAnalyzer};
    use crate::criteria::Rating;
    use crate::pipelines::PipelineKind;
    use crate::store::RankingResult;

    fn report() -> DisagreementReport {
        let results = vec![
            RankingResult::success(PipelineKind::OneShot, "p", "m1", "cv1", "Ann", Rating::Excellent, ""),
            RankingResult::success(PipelineKind::OneShot, "p", "m2", "cv1", "Ann", Rating::Good, ""),
            RankingResult::success(PipelineKind::MultiLayer, "p", "m1", "cv1", "Ann", Rating::NotAFit, ""),
            RankingResult::success(PipelineKind::OneShot, "p", "m1", "cv2", "Ben", Rating::Good, ""),
        ];
        DisagreementAnalyzer::new().analyze(&ComparisonTable::from_results(&results))
    }

    #[test]
    fn test_format_stat() {
        assert_eq!(format_stat(Some(2.25)), "2.2500");
        assert_eq!(format_stat(None), "n/a");
    }

    #[test]
    fn test_text_and_json_share_values() {
        let report = report();
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("disagreement.json");
        let text_path = dir.path().join("disagreement.txt");
        DisagreementWriter::write_json(&json_path, &report).unwrap();
        DisagreementWriter::write_text(&text_path, &report).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        let text = std::fs::read_to_string(&text_path).unwrap();

        let first = &json["metrics"][0];
        assert_eq!(first["cv_id"], "cv1");
        let variance = first["variance"].as_f64().unwrap();
        let mean = first["mean"].as_f64().unwrap();
        assert!(text.contains(&format!("variance={}", format_stat(Some(variance)))));
        assert!(text.contains(&format!("mean={}", format_stat(Some(mean)))));

        // cv2 has a single rating: undefined in both renderings
        let second = &json["metrics"][1];
        assert_eq!(second["cv_id"], "cv2");
        assert!(second["variance"].is_null());
        assert!(text.contains("n=1 mean=3.0000 variance=n/a"));
    }

    #[test]
    fn test_text_lists_breakdowns() {
        let text = render_text(&report());
        assert!(text.contains("by pipeline (varying model)"));
        assert!(text.contains("one_shot/m2 = 3"));
        assert!(text.contains("distribution 1:1 2:0 3:1 4:1"));
    }
}
