//! JSONL corpus loading.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Corpus loading errors.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("corpus file not found at {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read one JSON document per line.
///
/// Blank lines are ignored and lines that do not parse are skipped with a
/// warning, so one bad record never sinks the whole corpus.
pub fn load_jsonl(path: &Path) -> Result<Vec<Value>, CorpusError> {
    if !path.exists() {
        return Err(CorpusError::NotFound(path.to_path_buf()));
    }

    let reader = BufReader::new(File::open(path)?);
    let mut documents = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(doc) => documents.push(doc),
            Err(e) => warn!("Skipping corpus line {}: {}", line_no + 1, e),
        }
    }

    debug!("Loaded {} documents from {}", documents.len(), path.display());
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_load_jsonl_skips_bad_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(file, r#"{{"content":"Cats need annual checkups","title":"Cat Care"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{{ not json").unwrap();
        writeln!(file, r#"{{"text":"Dogs require rabies vaccination"}}"#).unwrap();

        let docs = load_jsonl(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["title"], "Cat Care");
    }

    #[test]
    fn test_missing_corpus() {
        let dir = tempdir().unwrap();
        let result = load_jsonl(&dir.path().join("absent.jsonl"));
        assert!(matches!(result, Err(CorpusError::NotFound(_))));
    }
}
