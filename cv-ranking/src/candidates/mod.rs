//! Candidate documents (CVs) and job description loading

pub mod loader;

pub use loader::{load_cvs_from_file, load_cvs_from_str, load_job_description, LoadError};

use serde::{Deserialize, Serialize};

/// A candidate document. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cv {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
}

impl Cv {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            content: content.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name shown in reports: the explicit name, else the first content
    /// line with markdown markers stripped, else the id
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return name.to_string();
        }

        let first_line = self
            .content
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("");
        let stripped: String = first_line.chars().filter(|c| *c != '#' && *c != '_').collect();
        let stripped = stripped.trim();

        if stripped.is_empty() {
            self.id.clone()
        } else {
            stripped.to_string()
        }
    }
}

/// Keep only the CVs whose ids are listed, preserving load order
pub fn filter_by_ids(cvs: Vec<Cv>, ids: &[String]) -> Vec<Cv> {
    cvs.into_iter().filter(|cv| ids.iter().any(|id| id == &cv.id)).collect()
}

/// Id form used when matching model output back to CVs: trimmed, case-folded
pub fn normalize_id(id: &str) -> String {
    id.trim().to_lowercase()
}

/// First id that collides with an earlier one once normalized, if any
pub fn find_duplicate_id(cvs: &[Cv]) -> Option<&str> {
    let mut seen = std::collections::HashSet::new();
    cvs.iter()
        .map(|cv| cv.id.as_str())
        .find(|id| !seen.insert(normalize_id(id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_prefers_explicit_name() {
        let cv = Cv::new("cv_001", "# Jane Doe\nFounder").with_name("J. Doe");
        assert_eq!(cv.display_name(), "J. Doe");
    }

    #[test]
    fn test_display_name_from_first_line() {
        let cv = Cv::new("cv_001", "\n## Jane_Doe \nFounder");
        assert_eq!(cv.display_name(), "JaneDoe");
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        assert_eq!(Cv::new("cv_002", "  \n").display_name(), "cv_002");
        assert_eq!(Cv::new("cv_003", "###").display_name(), "cv_003");
    }

    #[test]
    fn test_filter_and_duplicates() {
        let cvs = vec![Cv::new("a", "x"), Cv::new("b", "y"), Cv::new("a", "z")];
        assert_eq!(find_duplicate_id(&cvs), Some("a"));

        let kept = filter_by_ids(cvs, &["b".to_string()]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "b");
    }

    #[test]
    fn test_duplicates_compare_normalized_ids() {
        let cvs = vec![Cv::new("CV1", "x"), Cv::new(" cv1 ", "y")];
        assert_eq!(find_duplicate_id(&cvs), Some(" cv1 "));
        assert_eq!(find_duplicate_id(&[Cv::new("cv1", "x"), Cv::new("cv2", "y")]), None);
    }
}
