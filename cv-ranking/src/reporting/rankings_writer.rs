//! Per-combination rankings files and the comparison CSV

use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::analysis::ComparisonTable;
use crate::pipelines::PipelineKind;
use crate::store::RankingResult;

/// Write human-readable rankings and comparison tables
pub struct RankingsWriter;

impl RankingsWriter {
    /// Write one `<pipeline>_<model>_rankings.txt` per combination present in
    /// `results`. Returns the written paths in combination order.
    pub fn write_rankings(dir: impl AsRef<Path>, results: &[RankingResult]) -> std::io::Result<Vec<PathBuf>> {
        let mut groups: BTreeMap<(PipelineKind, &str), Vec<&RankingResult>> = BTreeMap::new();
        for result in results {
            groups.entry((result.pipeline, result.model.as_str())).or_default().push(result);
        }

        let mut paths = Vec::with_capacity(groups.len());
        let mut used = HashSet::new();
        for ((pipeline, model), group) in groups {
            // distinct model ids can sanitize to the same name
            let base = rankings_file_name(pipeline, model);
            let mut name = base.clone();
            let mut n = 2;
            while !used.insert(name.clone()) {
                name = base.replace("_rankings.txt", &format!("_{}_rankings.txt", n));
                n += 1;
            }
            let path = dir.as_ref().join(name);
            let mut file = std::fs::File::create(&path)?;
            file.write_all(render_rankings(pipeline, model, &group).as_bytes())?;
            paths.push(path);
        }
        Ok(paths)
    }

    /// Write the CV x (pipeline, model) rating matrix as CSV
    pub fn write_comparison_csv(path: impl AsRef<Path>, table: &ComparisonTable) -> std::io::Result<()> {
        let mut file = std::fs::File::create(path)?;
        file.write_all(render_comparison_csv(table).as_bytes())
    }
}

/// File name for one combination's rankings; model ids may carry `/` or `:`
pub fn rankings_file_name(pipeline: PipelineKind, model: &str) -> String {
    let model: String = model
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    format!("{}_{}_rankings.txt", pipeline, model)
}

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Rated entries first by rating descending, then name; failed entries last
pub fn render_rankings(pipeline: PipelineKind, model: &str, results: &[&RankingResult]) -> String {
    let mut sorted: Vec<&RankingResult> = results.to_vec();
    sorted.sort_by(|a, b| {
        b.rating
            .cmp(&a.rating)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.cv_id.cmp(&b.cv_id))
    });

    let mut out = String::new();
    out.push_str(&format!("# Rankings: {} / {}\n", pipeline, model));
    if let Some(first) = sorted.iter().map(|r| r.timestamp).min() {
        out.push_str(&format!("# Generated: {}\n", format_timestamp(&first)));
    }
    out.push('\n');

    for (i, result) in sorted.iter().enumerate() {
        match (result.rating, result.rating_label(), &result.error) {
            (Some(score), Some(label), None) => {
                out.push_str(&format!(
                    "{}. {} ({}) - {} [{}]\n",
                    i + 1,
                    result.name,
                    result.cv_id,
                    label,
                    score
                ));
                if !result.rationale.is_empty() {
                    for line in result.rationale.lines() {
                        out.push_str(&format!("   {}\n", line));
                    }
                }
            }
            (_, _, error) => {
                let message = error.as_ref().map(|e| e.message.as_str()).unwrap_or("no rating");
                out.push_str(&format!(
                    "{}. {} ({}) - FAILED: {}\n",
                    i + 1,
                    result.name,
                    result.cv_id,
                    message
                ));
            }
        }
    }

    out
}

/// Quote a CSV field when it contains a delimiter, quote or line break
pub fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn render_comparison_csv(table: &ComparisonTable) -> String {
    let columns: Vec<_> = table.columns().collect();

    let mut header = vec!["cv_id".to_string(), "name".to_string()];
    header.extend(columns.iter().map(|c| csv_field(&c.to_string())));

    let mut out = header.join(",");
    out.push('\n');

    for (cv_id, row) in table.rows() {
        let mut fields = vec![csv_field(cv_id), csv_field(&row.name)];
        fields.extend(columns.iter().map(|column| {
            row.ratings
                .get(*column)
                .copied()
                .flatten()
                .map(|r| r.to_string())
                .unwrap_or_default()
        }));
        out.push_str(&fields.join(","));
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Rating;
    use crate::store::{FailureKind, UnitError};

    fn rated(cv: &str, name: &str, rating: Rating) -> RankingResult {
        RankingResult::success(PipelineKind::OneShot, "openai", "gpt-4o", cv, name, rating, "fits")
    }

    #[test]
    fn test_file_name_sanitizes_model() {
        assert_eq!(
            rankings_file_name(PipelineKind::MultiLayer, "models/gemini-1.5:pro"),
            "multi_layer_models_gemini-1.5_pro_rankings.txt"
        );
    }

    #[test]
    fn test_rankings_sorted_with_failures_last() {
        let failed = RankingResult::failure(
            PipelineKind::OneShot,
            "openai",
            "gpt-4o",
            "cv0",
            "Aaron",
            UnitError::new(FailureKind::Timeout, "Timeout after 100ms"),
        );
        let results = [
            rated("cv1", "Zoe", Rating::Good),
            failed,
            rated("cv2", "Bob", Rating::Excellent),
            rated("cv3", "Alice", Rating::Good),
        ];
        let refs: Vec<&RankingResult> = results.iter().collect();
        let text = render_rankings(PipelineKind::OneShot, "gpt-4o", &refs);
        let lines: Vec<&str> = text.lines().filter(|l| l.starts_with(char::is_numeric)).collect();

        assert_eq!(lines[0], "1. Bob (cv2) - Excellent [4]");
        assert_eq!(lines[1], "2. Alice (cv3) - Good [3]");
        assert_eq!(lines[2], "3. Zoe (cv1) - Good [3]");
        assert_eq!(lines[3], "4. Aaron (cv0) - FAILED: Timeout after 100ms");
    }

    #[test]
    fn test_csv_quotes_and_empty_cells() {
        let results = vec![
            rated("cv1", "Smith, Jane", Rating::Weak),
            RankingResult::failure(
                PipelineKind::MultiLayer,
                "openai",
                "gpt-4o",
                "cv1",
                "Smith, Jane",
                UnitError::new(FailureKind::Parse, "bad"),
            ),
        ];
        let csv = render_comparison_csv(&ComparisonTable::from_results(&results));
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "cv_id,name,one_shot/gpt-4o,multi_layer/gpt-4o");
        assert_eq!(lines[1], "cv1,\"Smith, Jane\",2,");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_write_rankings_files() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![rated("cv1", "Zoe", Rating::Good)];
        let paths = RankingsWriter::write_rankings(dir.path(), &results).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("one_shot_gpt-4o_rankings.txt"));
        let text = std::fs::read_to_string(&paths[0]).unwrap();
        assert!(text.contains("1. Zoe (cv1) - Good [3]"));
    }

    #[test]
    fn test_colliding_model_names_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut slash = rated("cv1", "Zoe", Rating::Good);
        slash.model = "org/model".into();
        let mut colon = rated("cv1", "Zoe", Rating::Weak);
        colon.model = "org:model".into();

        let paths = RankingsWriter::write_rankings(dir.path(), &[slash, colon]).unwrap();
        assert_eq!(paths.len(), 2);
        assert_ne!(paths[0], paths[1]);
        assert!(paths[0].ends_with("one_shot_org_model_rankings.txt"));
        assert!(paths[1].ends_with("one_shot_org_model_2_rankings.txt"));
        assert!(std::fs::read_to_string(&paths[1]).unwrap().contains("one_shot / org:model"));
    }
}
