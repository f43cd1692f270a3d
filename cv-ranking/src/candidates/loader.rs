//! CV loading from JSON files

use std::path::Path;

use serde::Deserialize;

use super::Cv;

/// Error type for candidate and job description loading
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Empty input: {0}")]
    Empty(String),
}

/// On-disk CV entry; `cv_id` and `text` are accepted as aliases
#[derive(Debug, Deserialize)]
struct RawCv {
    #[serde(alias = "cv_id")]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(alias = "text")]
    content: Option<String>,
}

/// Either a bare array of CVs or an object with a `cvs` array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CvFile {
    List(Vec<RawCv>),
    Wrapped { cvs: Vec<RawCv> },
}

/// Load CVs from a JSON file
pub fn load_cvs_from_file(path: impl AsRef<Path>) -> Result<Vec<Cv>, LoadError> {
    let content = std::fs::read_to_string(path)?;
    load_cvs_from_str(&content)
}

/// Load CVs from a JSON string, keeping file order
pub fn load_cvs_from_str(content: &str) -> Result<Vec<Cv>, LoadError> {
    let file: CvFile =
        serde_json::from_str(content).map_err(|e| LoadError::Parse(e.to_string()))?;
    let raw = match file {
        CvFile::List(list) => list,
        CvFile::Wrapped { cvs } => cvs,
    };

    raw.into_iter()
        .enumerate()
        .map(|(idx, entry)| {
            let id = entry
                .id
                .filter(|id| !id.trim().is_empty())
                .ok_or_else(|| LoadError::MissingField(format!("CV {}: id", idx)))?;
            let content = entry
                .content
                .ok_or_else(|| LoadError::MissingField(format!("CV {}: content", id)))?;
            Ok(Cv {
                id: id.trim().to_string(),
                name: entry.name,
                content,
            })
        })
        .collect()
}

/// Load a job description from a text or markdown file
pub fn load_job_description(path: impl AsRef<Path>) -> Result<String, LoadError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(LoadError::Empty(format!(
            "job description {} is empty",
            path.display()
        )));
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_array() {
        let json = r#"[
            {"id": "cv_001", "name": "Ada", "content": "Founder"},
            {"cv_id": "cv_002", "text": "Engineer"}
        ]"#;
        let cvs = load_cvs_from_str(json).unwrap();
        assert_eq!(cvs.len(), 2);
        assert_eq!(cvs[0].name.as_deref(), Some("Ada"));
        assert_eq!(cvs[1].id, "cv_002");
        assert_eq!(cvs[1].content, "Engineer");
    }

    #[test]
    fn test_load_wrapped() {
        let json = r#"{"cvs": [{"id": " cv_9 ", "content": "x"}]}"#;
        let cvs = load_cvs_from_str(json).unwrap();
        assert_eq!(cvs[0].id, "cv_9");
    }

    #[test]
    fn test_missing_content() {
        let json = r#"[{"id": "cv_001"}]"#;
        assert!(matches!(
            load_cvs_from_str(json),
            Err(LoadError::MissingField(_))
        ));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(load_cvs_from_str("not json"), Err(LoadError::Parse(_))));
    }

    #[test]
    fn test_load_job_description() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.md");
        std::fs::write(&path, "\n  Founding Operator  \n").unwrap();
        assert_eq!(load_job_description(&path).unwrap(), "Founding Operator");

        std::fs::write(&path, "   ").unwrap();
        assert!(matches!(load_job_description(&path), Err(LoadError::Empty(_))));
    }
}
