use std::io::BufReader;
use std::path::Path;

use crate::error::{PipelineError, Result};

use super::model::{ConceptRecord, Dataset};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a concept export from a JSON file.
///
/// Expected schema (what the engine's `.export` command writes):
///
/// ```json
/// [
///   { "term": "tiger", "usage": 50, "vector": [1234, 5678, ...] },
///   { "term": {"Compound": ["Inheritance", ["tiger", "animal"]]}, "usage": 12, "vector": [...] },
///   ...
/// ]
/// ```
///
/// An empty array loads fine; rejecting it is the pipeline's job.
pub fn load_file(path: &Path) -> Result<Dataset> {
    if !path.exists() {
        return Err(PipelineError::NotFound(path.to_path_buf()));
    }

    let file = std::fs::File::open(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let records: Vec<ConceptRecord> = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| PipelineError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let dataset = Dataset::new(records);
    if dataset.is_empty() {
        log::warn!("{} holds no concepts", path.display());
    } else {
        log::info!("Loading {} concepts from {}", dataset.len(), path.display());
    }
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::data::model::Term;

    fn write_json(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_records_in_file_order() {
        let file = write_json(
            r#"[
                {"term": "cat", "usage": 10, "vector": [33554431]},
                {"term": {"Atom": "dog"}, "usage": 1, "vector": [1125899873288192]}
            ]"#,
        );
        let ds = load_file(file.path()).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.records[0].term, Term::atom("cat"));
        assert_eq!(ds.records[1].term, Term::atom("dog"));
        assert_eq!(ds.usages(), vec![10, 1]);
    }

    #[test]
    fn empty_array_is_accepted() {
        let file = write_json("[]");
        let ds = load_file(file.path()).unwrap();
        assert!(ds.is_empty());
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[test]
    fn malformed_content_is_a_parse_error() {
        for body in [
            "not json",
            r#"{"term": "cat"}"#,
            r#"[{"term": "cat", "usage": 1}]"#,
            r#"[{"term": "cat", "usage": 1, "vector": ["x"]}]"#,
        ] {
            let file = write_json(body);
            let err = load_file(file.path()).unwrap_err();
            assert!(matches!(err, PipelineError::Parse { .. }), "{body}: {err}");
        }
    }
}
