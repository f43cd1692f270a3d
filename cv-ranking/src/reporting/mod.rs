//! Run outputs: persisted records, rankings files, comparison CSV, summary
//! and disagreement reports

pub mod disagreement_writer;
pub mod rankings_writer;

pub use disagreement_writer::{format_stat, DisagreementWriter};
pub use rankings_writer::RankingsWriter;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::analysis::{DisagreementAnalyzer, DisagreementReport};
use crate::config::OutputConfig;
use crate::store::{RankingResult, ResultStore, RunSummary};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Files written for one run
#[derive(Debug, Clone, Default)]
pub struct OutputPaths {
    pub dir: PathBuf,
    pub results: PathBuf,
    pub summary: PathBuf,
    pub disagreement_json: PathBuf,
    pub disagreement_text: PathBuf,
    pub comparison_csv: Option<PathBuf>,
    pub rankings: Vec<PathBuf>,
}

pub fn write_results_json(path: impl AsRef<Path>, results: &[RankingResult]) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Load records written by [`write_results_json`]
pub fn read_results_json(path: impl AsRef<Path>) -> Result<Vec<RankingResult>, ReportError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn write_summary_json(path: impl AsRef<Path>, summary: &RunSummary) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Write every output for the store's current result set under
/// `<results_dir>/<experiment_name>/`
pub fn write_run_outputs(
    store: &ResultStore,
    output: &OutputConfig,
) -> Result<(OutputPaths, DisagreementReport), ReportError> {
    let dir = Path::new(&output.results_dir).join(&store.metadata().experiment_name);
    write_outputs_to(&dir, store, output)
}

pub fn write_outputs_to(
    dir: &Path,
    store: &ResultStore,
    output: &OutputConfig,
) -> Result<(OutputPaths, DisagreementReport), ReportError> {
    std::fs::create_dir_all(dir)?;

    let results = store.results();
    let table = store.export_table();
    let report = DisagreementAnalyzer::new().analyze(&table);

    let paths = OutputPaths {
        dir: dir.to_path_buf(),
        results: dir.join("results.json"),
        summary: dir.join("summary.json"),
        disagreement_json: dir.join("disagreement.json"),
        disagreement_text: dir.join("disagreement.txt"),
        comparison_csv: output.write_csv.then(|| dir.join("comparison.csv")),
        rankings: if output.write_rankings_text {
            RankingsWriter::write_rankings(dir, &results)?
        } else {
            Vec::new()
        },
    };

    write_results_json(&paths.results, &results)?;
    write_summary_json(&paths.summary, &store.export_summary())?;
    DisagreementWriter::write_json(&paths.disagreement_json, &report)?;
    DisagreementWriter::write_text(&paths.disagreement_text, &report)?;
    if let Some(csv) = &paths.comparison_csv {
        RankingsWriter::write_comparison_csv(csv, &table)?;
    }

    info!(dir = %dir.display(), results = results.len(), "Wrote run outputs");
    Ok((paths, report))
}

/// Print the run summary and the most disputed CVs
pub fn print_console_report(summary: &RunSummary, report: &DisagreementReport) {
    println!("\n=== CV Ranking Results: {} ===\n", summary.metadata.experiment_name);
    println!(
        "Units: {} total, {} succeeded, {} failed, {} skipped ({:.1}% success)",
        summary.total_units,
        summary.successful_units,
        summary.failed_units,
        summary.skipped_units,
        summary.success_rate() * 100.0
    );
    println!(
        "Calls: {} ({} failed), tokens: {} in / {} out\n",
        summary.total_calls, summary.failed_calls, summary.input_tokens, summary.output_tokens
    );

    println!("By pipeline:");
    println!("{:-<50}", "");
    for (pipeline, counts) in &summary.by_pipeline {
        println!("  {:<28} {} ok, {} failed", pipeline, counts.completed, counts.failed);
    }

    println!("\nBy model:");
    println!("{:-<50}", "");
    for (model, counts) in &summary.by_model {
        println!("  {:<28} {} ok, {} failed", model, counts.completed, counts.failed);
    }

    let disputed: Vec<_> = report
        .metrics
        .iter()
        .filter(|m| m.stats.variance.is_some_and(|v| v > 0.0))
        .take(10)
        .collect();
    if !disputed.is_empty() {
        println!("\nHighest disagreement:");
        println!("{:-<50}", "");
        for (i, metric) in disputed.iter().enumerate() {
            println!(
                "  {}. {} ({}) variance={} range={}",
                i + 1,
                metric.name,
                metric.cv_id,
                format_stat(metric.stats.variance),
                metric.stats.range.unwrap_or(0)
            );
        }
    }

    println!("\n{:=<50}", "");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Rating;
    use crate::pipelines::PipelineKind;
    use crate::store::{Combination, FailureKind, RunMetadata, UnitError};

    fn store() -> ResultStore {
        let metadata = RunMetadata::new(
            "exp",
            vec![Combination {
                pipeline: PipelineKind::OneShot,
                provider: "openai".into(),
                model: "gpt-4o".into(),
            }],
            vec!["cv1".into(), "cv2".into()],
        );
        let store = ResultStore::new(metadata);
        store
            .record(
                RankingResult::success(PipelineKind::OneShot, "openai", "gpt-4o", "cv1", "Ann", Rating::Good, "ok"),
                false,
            )
            .unwrap();
        store
            .record(
                RankingResult::failure(
                    PipelineKind::OneShot,
                    "openai",
                    "gpt-4o",
                    "cv2",
                    "Ben",
                    UnitError::new(FailureKind::Parse, "no JSON").with_raw("garbage"),
                ),
                false,
            )
            .unwrap();
        store
    }

    #[test]
    fn test_write_outputs_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = store();
        let (paths, report) = write_outputs_to(dir.path(), &store, &OutputConfig::default()).unwrap();

        assert!(paths.summary.exists());
        assert!(paths.disagreement_text.exists());
        assert_eq!(paths.rankings.len(), 1);
        assert_eq!(report.metrics.len(), 2);

        let csv = std::fs::read_to_string(paths.comparison_csv.unwrap()).unwrap();
        assert!(csv.contains("cv2,Ben,\n"));

        let reloaded = read_results_json(&paths.results).unwrap();
        assert_eq!(reloaded, store.results());
        assert_eq!(reloaded[1].error.as_ref().unwrap().raw.as_deref(), Some("garbage"));

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.summary).unwrap()).unwrap();
        assert_eq!(summary["successful_units"], 1);
        assert_eq!(summary["failed_units"], 1);
    }

    #[test]
    fn test_optional_outputs_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputConfig {
            write_csv: false,
            write_rankings_text: false,
            ..OutputConfig::default()
        };
        let (paths, _) = write_outputs_to(dir.path(), &store(), &output).unwrap();
        assert!(paths.comparison_csv.is_none());
        assert!(paths.rankings.is_empty());
        assert!(!dir.path().join("comparison.csv").exists());
    }
}
