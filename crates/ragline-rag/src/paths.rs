//! Path utilities for ragline data directories.

use std::path::PathBuf;

/// Get the ragline data directory (~/.ragline/).
///
/// Falls back to a relative `.ragline` when no home directory is known.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".ragline"))
        .unwrap_or_else(|| PathBuf::from(".ragline"))
}

/// Get the index directory (~/.ragline/indexes/).
pub fn index_dir() -> PathBuf {
    data_dir().join("indexes")
}

/// Get the default index file (~/.ragline/indexes/index.json).
pub fn default_index_path() -> PathBuf {
    index_dir().join("index.json")
}

/// Get the default corpus file (~/.ragline/corpus/data.jsonl).
pub fn default_corpus_path() -> PathBuf {
    data_dir().join("corpus").join("data.jsonl")
}
