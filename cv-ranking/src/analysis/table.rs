//! Cross-tabulation of ratings: rows by CV, columns by (pipeline, model)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::pipelines::PipelineKind;
use crate::store::RankingResult;

/// Column of the comparison table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnKey {
    pub pipeline: PipelineKind,
    pub model: String,
}

impl ColumnKey {
    pub fn new(pipeline: PipelineKind, model: impl Into<String>) -> Self {
        Self {
            pipeline,
            model: model.into(),
        }
    }
}

impl std::fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.pipeline, self.model)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComparisonRow {
    pub name: String,
    /// `None` marks a failed unit
    pub ratings: BTreeMap<ColumnKey, Option<u8>>,
}

impl ComparisonRow {
    /// Non-null ratings in column order
    pub fn rated(&self) -> impl Iterator<Item = (&ColumnKey, u8)> {
        self.ratings.iter().filter_map(|(k, r)| r.map(|r| (k, r)))
    }
}

/// Derived view over a result set; rebuilt on demand, never edited in place.
///
/// Built from sorted maps, so the same result set gives the same table
/// whatever the insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComparisonTable {
    columns: BTreeSet<ColumnKey>,
    rows: BTreeMap<String, ComparisonRow>,
}

impl ComparisonTable {
    pub fn from_results(results: &[RankingResult]) -> Self {
        let mut table = Self::default();
        for result in results {
            let column = ColumnKey::new(result.pipeline, &result.model);
            table.columns.insert(column.clone());

            let row = table.rows.entry(result.cv_id.clone()).or_insert_with(|| ComparisonRow {
                name: result.name.clone(),
                ratings: BTreeMap::new(),
            });
            // Smallest non-empty name wins so row names do not depend on order
            if row.name.is_empty() || (!result.name.is_empty() && result.name < row.name) {
                row.name = result.name.clone();
            }
            row.ratings.insert(column, result.rating);
        }
        table
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnKey> {
        self.columns.iter()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Rows in CV id order
    pub fn rows(&self) -> impl Iterator<Item = (&String, &ComparisonRow)> {
        self.rows.iter()
    }

    pub fn row(&self, cv_id: &str) -> Option<&ComparisonRow> {
        self.rows.get(cv_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rating in one cell; `None` for a failed unit or a missing cell
    pub fn rating(&self, cv_id: &str, column: &ColumnKey) -> Option<u8> {
        self.rows.get(cv_id)?.ratings.get(column).copied().flatten()
    }

    pub fn pipelines(&self) -> BTreeSet<PipelineKind> {
        self.columns.iter().map(|c| c.pipeline).collect()
    }

    pub fn models(&self) -> BTreeSet<String> {
        self.columns.iter().map(|c| c.model.clone()).collect()
    }
}
